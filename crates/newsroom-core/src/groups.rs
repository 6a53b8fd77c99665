use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::filter::FilterField;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterGroup {
    pub field: FilterField,
    pub label: String,
    #[serde(default)]
    pub open: bool,
}

impl FilterGroup {
    pub fn new(field: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            label: label.into(),
            open: false,
        }
    }
}

pub fn default_groups() -> Vec<FilterGroup> {
    vec![
        FilterGroup::new("sttdepartment", "Department"),
        FilterGroup::new("sttgenre", "Genre"),
        FilterGroup::new("sttversion", "Version"),
    ]
}

pub fn parse_groups(spec: &str) -> anyhow::Result<Vec<FilterGroup>> {
    let mut groups = Vec::new();
    for raw in spec.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let (field, label) = raw.split_once(':').unwrap_or((raw, raw));
        let field = field.trim();
        if field.is_empty() {
            return Err(anyhow!("group entry has an empty field: {raw}"));
        }
        groups.push(FilterGroup::new(field, label.trim()));
    }
    Ok(groups)
}

/// Flips the open flag of the group rendering `field`. Returns the new
/// state, or `None` when no group has that field.
pub fn toggle_open(groups: &mut [FilterGroup], field: &str) -> Option<bool> {
    let Some(group) = groups.iter_mut().find(|g| g.field == field) else {
        debug!(field, "no filter group for field; ignoring toggle");
        return None;
    };
    group.open = !group.open;
    Some(group.open)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_flips_one_group() {
        let mut groups = default_groups();
        assert_eq!(toggle_open(&mut groups, "sttgenre"), Some(true));
        assert!(groups[1].open);
        assert!(!groups[0].open);
        assert_eq!(toggle_open(&mut groups, "sttgenre"), Some(false));
        assert_eq!(toggle_open(&mut groups, "missing"), None);
    }

    #[test]
    fn parses_group_list() {
        let groups = parse_groups("genre:Genre, subject").unwrap();
        assert_eq!(
            groups,
            vec![
                FilterGroup::new("genre", "Genre"),
                FilterGroup::new("subject", "subject")
            ]
        );
        assert!(parse_groups(":Label").is_err());
    }
}
