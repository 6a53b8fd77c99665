use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

pub type FilterField = String;
pub type FilterValue = String;

/// Selected values per facet field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<FilterField, Vec<FilterValue>>",
    into = "BTreeMap<FilterField, Vec<FilterValue>>"
)]
pub struct ActiveFilter {
    // present fields hold at least one value, in toggle order, no repeats
    fields: BTreeMap<FilterField, Vec<FilterValue>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    One(FilterValue),
    Many(Vec<FilterValue>),
}

impl Selection {
    pub fn into_values(self) -> Vec<FilterValue> {
        match self {
            Selection::One(value) => vec![value],
            Selection::Many(values) => values,
        }
    }
}

impl From<&str> for Selection {
    fn from(value: &str) -> Self {
        Selection::One(value.to_string())
    }
}

impl From<String> for Selection {
    fn from(value: String) -> Self {
        Selection::One(value)
    }
}

impl From<Vec<String>> for Selection {
    fn from(values: Vec<String>) -> Self {
        Selection::Many(values)
    }
}

impl From<&[&str]> for Selection {
    fn from(values: &[&str]) -> Self {
        Selection::Many(values.iter().map(|v| v.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Selection {
    fn from(values: [&str; N]) -> Self {
        Selection::Many(values.iter().map(|v| v.to_string()).collect())
    }
}

impl ActiveFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: BTreeMap<FilterField, Vec<FilterValue>>) -> Self {
        let mut fields = BTreeMap::new();
        for (field, values) in map {
            let mut unique: Vec<FilterValue> = Vec::with_capacity(values.len());
            for value in values {
                if !unique.contains(&value) {
                    unique.push(value);
                }
            }
            if !unique.is_empty() {
                fields.insert(field, unique);
            }
        }
        Self { fields }
    }

    /// A value that is already selected is removed, otherwise it is
    /// appended. An empty value, or a field left with nothing selected,
    /// removes the field. With `exclusive` set, a field that still has
    /// values afterwards is collapsed to just the toggled value.
    pub fn toggle(&mut self, field: &str, selection: impl Into<Selection>, exclusive: bool) {
        for value in selection.into().into_values() {
            let current = self.fields.entry(field.to_string()).or_default();
            toggle_value(current, &value);
            let drop_field = value.is_empty() || current.is_empty();

            if drop_field {
                self.fields.remove(field);
            } else if exclusive {
                self.fields.insert(field.to_string(), vec![value.clone()]);
            }
            trace!(field, value = %value, exclusive, dropped = drop_field, "toggled filter value");
        }
    }

    pub fn values(&self, field: &str) -> &[FilterValue] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, field: &str, value: &str) -> bool {
        self.values(field).iter().any(|v| v == value)
    }

    pub fn has_values(&self) -> bool {
        self.fields.values().any(|values| !values.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FilterField, &Vec<FilterValue>)> {
        self.fields.iter()
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }
}

impl From<BTreeMap<FilterField, Vec<FilterValue>>> for ActiveFilter {
    fn from(map: BTreeMap<FilterField, Vec<FilterValue>>) -> Self {
        Self::from_map(map)
    }
}

impl From<ActiveFilter> for BTreeMap<FilterField, Vec<FilterValue>> {
    fn from(filter: ActiveFilter) -> Self {
        filter.fields
    }
}

fn toggle_value(values: &mut Vec<FilterValue>, value: &str) {
    if let Some(pos) = values.iter().position(|v| v == value) {
        values.remove(pos);
    } else {
        values.push(value.to_string());
    }
}
