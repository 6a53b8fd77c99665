use std::collections::BTreeMap;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CreatedKey {
    From,
    FromTime,
    To,
    TimezoneOffset,
}

impl CreatedKey {
    pub fn as_key(self) -> &'static str {
        match self {
            Self::From => "created_from",
            Self::FromTime => "created_from_time",
            Self::To => "created_to",
            Self::TimezoneOffset => "timezone_offset",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "created_from" | "from" => Some(Self::From),
            "created_from_time" | "from_time" => Some(Self::FromTime),
            "created_to" | "to" => Some(Self::To),
            "timezone_offset" | "offset" => Some(Self::TimezoneOffset),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, String>",
    into = "BTreeMap<String, String>"
)]
pub struct CreatedFilter {
    values: BTreeMap<CreatedKey, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreatedPatch {
    changes: BTreeMap<CreatedKey, Option<String>>,
}

impl CreatedPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: CreatedKey, value: impl Into<String>) -> Self {
        self.changes.insert(key, Some(value.into()));
        self
    }

    pub fn clear(mut self, key: CreatedKey) -> Self {
        self.changes.insert(key, None);
        self
    }

    /// Parses `key=value`; an empty value after `=` is an explicit clear.
    pub fn parse_assignment(mut self, raw: &str) -> anyhow::Result<Self> {
        let (k, v) = raw
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {raw}"))?;
        let key = CreatedKey::from_key(k.trim())
            .ok_or_else(|| anyhow!("unknown created filter key: {}", k.trim()))?;
        let value = v.trim();
        self.changes
            .insert(key, (!value.is_empty()).then(|| value.to_string()));
        Ok(self)
    }
}

impl CreatedFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: CreatedKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }

    /// Draft-then-override merge, then every falsy value is dropped.
    pub fn merged(&self, patch: &CreatedPatch) -> Self {
        let mut values = self.values.clone();
        for (key, change) in &patch.changes {
            match change {
                Some(value) => {
                    values.insert(*key, value.clone());
                }
                None => {
                    values.remove(key);
                }
            }
        }
        values.retain(|_, value| is_truthy(value));
        trace!(keys = values.len(), "merged created filter");
        Self { values }
    }

    pub fn has_values(&self) -> bool {
        self.values.values().any(|value| is_truthy(value))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CreatedKey, &str)> {
        self.values.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

impl From<BTreeMap<String, String>> for CreatedFilter {
    fn from(map: BTreeMap<String, String>) -> Self {
        let values = map
            .into_iter()
            .filter(|(_, value)| is_truthy(value))
            .filter_map(|(key, value)| CreatedKey::from_key(&key).map(|k| (k, value)))
            .collect();
        Self { values }
    }
}

impl From<CreatedFilter> for BTreeMap<String, String> {
    fn from(filter: CreatedFilter) -> Self {
        filter
            .values
            .into_iter()
            .map(|(k, v)| (k.as_key().to_string(), v))
            .collect()
    }
}

fn is_truthy(value: &str) -> bool {
    !value.trim().is_empty()
}
