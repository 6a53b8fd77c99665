use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::created::{CreatedFilter, CreatedPatch};
use crate::datetime::Granularity;
use crate::filter::{ActiveFilter, FilterValue, Selection};
use crate::groups::{self, FilterGroup};
use crate::query::{Aggregations, Bucket};
use crate::store::{CommittedState, CommittedStore};

/// Runs a search with whatever the store has committed. Fire-and-forget:
/// superseding a stale request is the fetcher's job.
pub trait ItemFetcher {
    fn fetch_items(&mut self, committed: &CommittedState);
}

pub trait DateSelector {
    fn select_date(&mut self, date: DateTime<Utc>, granularity: Granularity);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftStatus {
    Clean,
    Dirty,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftState {
    pub active: ActiveFilter,
    pub created: CreatedFilter,
    pub groups: Vec<FilterGroup>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelFlags {
    pub reset_available: bool,
    pub results_filtered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupView<'a> {
    pub group: &'a FilterGroup,
    pub active: &'a ActiveFilter,
    pub buckets: &'a [Bucket],
}

impl GroupView<'_> {
    pub fn is_selected(&self, value: &str) -> bool {
        self.active.contains(&self.group.field, value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedView<'a> {
    pub created: &'a CreatedFilter,
}

pub struct FilterController<S, F> {
    draft: DraftState,
    status: DraftStatus,
    store: S,
    fetcher: F,
    date_selector: Option<Box<dyn DateSelector>>,
}

impl<S, F> FilterController<S, F>
where
    S: CommittedStore,
    F: ItemFetcher,
{
    #[tracing::instrument(skip_all)]
    pub fn mount(store: S, fetcher: F, groups: Vec<FilterGroup>) -> Self {
        let committed = store.committed();
        let draft = DraftState {
            active: committed.active.clone(),
            created: committed.created.clone(),
            groups,
        };
        debug!(
            fields = draft.active.iter().count(),
            created_keys = draft.created.iter().count(),
            "mounted filter controller"
        );
        Self {
            draft,
            status: DraftStatus::Clean,
            store,
            fetcher,
            date_selector: None,
        }
    }

    pub fn with_date_selector(mut self, selector: Box<dyn DateSelector>) -> Self {
        self.date_selector = Some(selector);
        self
    }

    pub fn draft(&self) -> &DraftState {
        &self.draft
    }

    pub fn status(&self) -> DraftStatus {
        self.status
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn into_parts(self) -> (S, F) {
        (self.store, self.fetcher)
    }

    pub fn toggle_group_open(&mut self, field: &str) -> Option<bool> {
        groups::toggle_open(&mut self.draft.groups, field)
    }

    #[tracing::instrument(skip(self, selection))]
    pub fn update_filter(&mut self, field: &str, selection: impl Into<Selection>, exclusive: bool) {
        let mut next = self.draft.active.clone();
        next.toggle(field, selection, exclusive);
        self.draft.active = next;
        self.refresh_status();
    }

    #[tracing::instrument(skip(self, patch))]
    pub fn set_created_filter(&mut self, patch: &CreatedPatch) {
        self.draft.created = self.draft.created.merged(patch);
        self.refresh_status();
    }

    pub fn is_reset_available(&self) -> bool {
        self.draft.active.has_values() || self.draft.created.has_values()
    }

    pub fn panel_flags(&self) -> PanelFlags {
        PanelFlags {
            reset_available: self.is_reset_available(),
            results_filtered: self.store.results_filtered(),
        }
    }

    pub fn group_views<'a>(&'a self, aggs: &'a Aggregations) -> Vec<GroupView<'a>> {
        self.draft
            .groups
            .iter()
            .map(|group| GroupView {
                group,
                active: &self.draft.active,
                buckets: aggs.buckets(&group.field),
            })
            .collect()
    }

    pub fn created_view(&self) -> CreatedView<'_> {
        CreatedView {
            created: &self.draft.created,
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn commit_and_search(&mut self) -> anyhow::Result<()> {
        self.store
            .publish(self.draft.active.clone(), self.draft.created.clone())?;
        self.status = DraftStatus::Clean;
        info!(
            fields = self.draft.active.iter().count(),
            created_keys = self.draft.created.iter().count(),
            "committed filters"
        );
        self.fetcher.fetch_items(self.store.committed());
        Ok(())
    }

    /// Clears draft and committed filters, fetches once, then re-anchors
    /// date navigation on the active date (or now) when a selector exists.
    #[tracing::instrument(skip(self))]
    pub fn reset_all(&mut self) -> anyhow::Result<()> {
        self.store.clear_filters()?;
        self.draft.active = ActiveFilter::new();
        self.draft.created = CreatedFilter::new();
        self.status = DraftStatus::Clean;
        info!("reset all filters");
        self.fetcher.fetch_items(self.store.committed());

        if let Some(selector) = self.date_selector.as_mut() {
            let date = self.store.active_date().unwrap_or_else(Utc::now);
            debug!(date = %date, "re-anchoring date navigation");
            selector.select_date(date, Granularity::Day);
        }
        Ok(())
    }

    pub fn selected(&self, field: &str) -> &[FilterValue] {
        self.draft.active.values(field)
    }

    fn refresh_status(&mut self) {
        let committed = self.store.committed();
        self.status = if self.draft.active == committed.active
            && self.draft.created == committed.created
        {
            DraftStatus::Clean
        } else {
            DraftStatus::Dirty
        };
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use chrono::TimeZone;

    use super::*;
    use crate::created::CreatedKey;
    use crate::groups::default_groups;
    use crate::store::MemoryStore;

    #[derive(Default)]
    struct CountingFetcher {
        calls: Vec<CommittedState>,
    }

    impl ItemFetcher for CountingFetcher {
        fn fetch_items(&mut self, committed: &CommittedState) {
            self.calls.push(committed.clone());
        }
    }

    struct RecordingSelector(Rc<RefCell<Vec<(DateTime<Utc>, Granularity)>>>);

    impl DateSelector for RecordingSelector {
        fn select_date(&mut self, date: DateTime<Utc>, granularity: Granularity) {
            self.0.borrow_mut().push((date, granularity));
        }
    }

    fn controller(state: CommittedState) -> FilterController<MemoryStore, CountingFetcher> {
        FilterController::mount(
            MemoryStore::new(state),
            CountingFetcher::default(),
            default_groups(),
        )
    }

    #[test]
    fn draft_edits_stay_local_until_commit() {
        let mut ctl = controller(CommittedState::default());
        ctl.update_filter("genre", "sport", false);

        assert_eq!(ctl.status(), DraftStatus::Dirty);
        assert!(ctl.store().committed().active.is_empty());
        assert!(ctl.fetcher().calls.is_empty());

        ctl.commit_and_search().unwrap();
        assert_eq!(ctl.status(), DraftStatus::Clean);
        assert_eq!(ctl.store().committed().active.values("genre"), ["sport"]);
        assert_eq!(ctl.selected("genre"), ["sport"]);
        assert_eq!(ctl.fetcher().calls.len(), 1);
    }

    #[test]
    fn toggling_back_returns_to_clean() {
        let mut ctl = controller(CommittedState::default());
        ctl.update_filter("genre", "sport", false);
        ctl.update_filter("genre", "sport", false);
        assert_eq!(ctl.status(), DraftStatus::Clean);
        assert!(!ctl.is_reset_available());
    }

    #[test]
    fn reset_availability_follows_draft() {
        let mut ctl = controller(CommittedState::default());
        assert!(!ctl.is_reset_available());

        ctl.set_created_filter(&CreatedPatch::new().set(CreatedKey::From, "2020-01-01"));
        assert!(ctl.is_reset_available());

        ctl.set_created_filter(&CreatedPatch::new().clear(CreatedKey::From));
        assert!(!ctl.is_reset_available());

        ctl.update_filter("genre", "sport", true);
        assert!(ctl.panel_flags().reset_available);
        assert!(!ctl.panel_flags().results_filtered);
    }

    #[test]
    fn reset_clears_everything_and_fetches_once() {
        let mut active = ActiveFilter::new();
        active.toggle("genre", ["sport", "news"], false);
        let mut ctl = controller(CommittedState {
            active,
            ..Default::default()
        });
        ctl.set_created_filter(&CreatedPatch::new().set(CreatedKey::To, "2020-01-31"));

        ctl.reset_all().unwrap();
        assert!(ctl.draft().active.is_empty());
        assert!(ctl.draft().created.is_empty());
        assert!(!ctl.store().committed().results_filtered());
        assert_eq!(ctl.fetcher().calls.len(), 1);

        let after_one = ctl.draft().clone();
        let committed_after_one = ctl.store().committed().clone();
        ctl.reset_all().unwrap();
        assert_eq!(ctl.draft(), &after_one);
        assert_eq!(ctl.store().committed(), &committed_after_one);
        assert_eq!(ctl.status(), DraftStatus::Clean);
        assert_eq!(ctl.fetcher().calls.len(), 2);
    }

    #[test]
    fn reset_anchors_on_active_date_when_selector_present() {
        let anchor = Utc.with_ymd_and_hms(2020, 3, 4, 12, 0, 0).unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut ctl = controller(CommittedState {
            active_date: Some(anchor),
            ..Default::default()
        })
        .with_date_selector(Box::new(RecordingSelector(Rc::clone(&log))));

        ctl.reset_all().unwrap();
        assert_eq!(log.borrow().as_slice(), &[(anchor, Granularity::Day)]);
    }

    #[test]
    fn reset_falls_back_to_now() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut ctl = controller(CommittedState::default())
            .with_date_selector(Box::new(RecordingSelector(Rc::clone(&log))));

        let before = Utc::now();
        ctl.reset_all().unwrap();
        let after = Utc::now();

        let calls = log.borrow();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].0 >= before && calls[0].0 <= after);
        assert_eq!(calls[0].1, Granularity::Day);
    }

    #[test]
    fn commit_publishes_copy_without_touching_draft() {
        let mut ctl = controller(CommittedState::default());
        ctl.update_filter("genre", ["sport", "news"], false);
        let before = ctl.draft().clone();

        ctl.commit_and_search().unwrap();
        assert_eq!(ctl.draft(), &before);
        assert_eq!(ctl.fetcher().calls[0].active, before.active);
    }

    #[test]
    fn group_views_pair_groups_with_buckets() {
        let mut ctl = controller(CommittedState::default());
        ctl.update_filter("sttgenre", "Sport", false);
        assert_eq!(ctl.toggle_group_open("sttgenre"), Some(true));

        let aggs = Aggregations::from_pairs([(
            "sttgenre",
            vec![Bucket::new("Sport", 3), Bucket::new("News", 1)],
        )]);
        let views = ctl.group_views(&aggs);
        assert_eq!(views.len(), 3);
        assert!(views[1].group.open);
        assert_eq!(views[1].buckets.len(), 2);
        assert!(views[1].is_selected("Sport"));
        assert!(views[0].buckets.is_empty());
        assert!(ctl.created_view().created.is_empty());
    }
}
