use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::created::CreatedFilter;
use crate::filter::ActiveFilter;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedState {
    #[serde(default)]
    pub active: ActiveFilter,
    #[serde(default)]
    pub created: CreatedFilter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_date: Option<DateTime<Utc>>,
}

impl CommittedState {
    pub fn results_filtered(&self) -> bool {
        self.active.has_values()
            || self.created.has_values()
            || self.query.as_deref().is_some_and(|q| !q.trim().is_empty())
    }
}

pub trait CommittedStore {
    fn committed(&self) -> &CommittedState;

    fn publish(&mut self, active: ActiveFilter, created: CreatedFilter) -> anyhow::Result<()>;

    fn clear_filters(&mut self) -> anyhow::Result<()>;

    fn set_active_date(&mut self, date: Option<DateTime<Utc>>) -> anyhow::Result<()>;

    fn active_date(&self) -> Option<DateTime<Utc>> {
        self.committed().active_date
    }

    fn results_filtered(&self) -> bool {
        self.committed().results_filtered()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: CommittedState,
}

impl MemoryStore {
    pub fn new(state: CommittedState) -> Self {
        Self { state }
    }
}

impl CommittedStore for MemoryStore {
    fn committed(&self) -> &CommittedState {
        &self.state
    }

    fn publish(&mut self, active: ActiveFilter, created: CreatedFilter) -> anyhow::Result<()> {
        self.state.active = active;
        self.state.created = created;
        Ok(())
    }

    fn clear_filters(&mut self) -> anyhow::Result<()> {
        self.state.active.clear();
        self.state.created.clear();
        Ok(())
    }

    fn set_active_date(&mut self, date: Option<DateTime<Utc>>) -> anyhow::Result<()> {
        self.state.active_date = date;
        Ok(())
    }
}

/// Committed state kept as one JSON document inside the data directory.
#[derive(Debug)]
pub struct FileStore {
    pub path: PathBuf,
    state: CommittedState,
}

impl FileStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;
        let path = data_dir.join("committed.json");

        let state = if path.exists() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            if text.trim().is_empty() {
                CommittedState::default()
            } else {
                serde_json::from_str(&text)
                    .with_context(|| format!("invalid committed state in {}", path.display()))?
            }
        } else {
            CommittedState::default()
        };

        info!(
            file = %path.display(),
            filtered = state.results_filtered(),
            "opened committed state"
        );
        Ok(Self { path, state })
    }

    pub fn replace(&mut self, state: CommittedState) -> anyhow::Result<()> {
        self.commit(state)
    }

    // In-memory state only changes once the file is written.
    fn commit(&mut self, next: CommittedState) -> anyhow::Result<()> {
        save_atomic(&self.path, &next)?;
        self.state = next;
        Ok(())
    }
}

#[tracing::instrument(skip(path, state))]
fn save_atomic(path: &Path, state: &CommittedState) -> anyhow::Result<()> {
    debug!(file = %path.display(), "saving committed state atomically");
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    let serialized = serde_json::to_string_pretty(state)?;
    writeln!(temp, "{serialized}")?;
    temp.flush()?;
    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;
    Ok(())
}

impl CommittedStore for FileStore {
    fn committed(&self) -> &CommittedState {
        &self.state
    }

    fn publish(&mut self, active: ActiveFilter, created: CreatedFilter) -> anyhow::Result<()> {
        self.commit(CommittedState {
            active,
            created,
            ..self.state.clone()
        })
    }

    fn clear_filters(&mut self) -> anyhow::Result<()> {
        self.commit(CommittedState {
            active: ActiveFilter::new(),
            created: CreatedFilter::new(),
            ..self.state.clone()
        })
    }

    fn set_active_date(&mut self, date: Option<DateTime<Utc>>) -> anyhow::Result<()> {
        self.commit(CommittedState {
            active_date: date,
            ..self.state.clone()
        })
    }
}
