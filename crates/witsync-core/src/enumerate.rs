//! Paged enumeration of root item ids in the source project.

use std::collections::VecDeque;

use tracing::debug;

use crate::client::{Exclusion, WorkItemQuery, WorkItemService};
use crate::config::DEFAULT_PAGE_SIZE;
use crate::error::ServiceError;

/// Which source items count as roots for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootSelection {
    pub types: Vec<String>,
    pub max: Option<usize>,
    /// Exclusive lower bound; pass the last id of a previous run to resume.
    pub after_id: u64,
    pub exclude: Option<Exclusion>,
    pub page_size: usize,
}

impl RootSelection {
    #[must_use]
    pub fn new(types: Vec<String>) -> Self {
        Self {
            types,
            max: None,
            after_id: 0,
            exclude: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    #[must_use]
    pub const fn with_max(mut self, max: Option<usize>) -> Self {
        self.max = max;
        self
    }

    #[must_use]
    pub const fn with_after_id(mut self, after_id: u64) -> Self {
        self.after_id = after_id;
        self
    }

    #[must_use]
    pub fn with_exclusion(mut self, exclude: Option<Exclusion>) -> Self {
        self.exclude = exclude;
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

/// Lazy, strictly increasing sequence of root ids.
///
/// Each page is one query bounded by the page size. Iteration ends on an
/// empty page or when `max` ids have been produced. A failed query is
/// yielded once, after which the iterator is exhausted.
pub struct ParentEnumerator<'a> {
    service: &'a dyn WorkItemService,
    selection: RootSelection,
    frontier: u64,
    produced: usize,
    page: VecDeque<u64>,
    done: bool,
}

impl<'a> ParentEnumerator<'a> {
    #[must_use]
    pub fn new(service: &'a dyn WorkItemService, selection: RootSelection) -> Self {
        let frontier = selection.after_id;
        Self {
            service,
            selection,
            frontier,
            produced: 0,
            page: VecDeque::new(),
            done: false,
        }
    }

    /// Highest id produced so far (or the starting bound).
    #[must_use]
    pub const fn frontier(&self) -> u64 {
        self.frontier
    }

    fn remaining(&self) -> Option<usize> {
        self.selection
            .max
            .map(|max| max.saturating_sub(self.produced))
    }

    fn fetch_page(&mut self) -> Result<(), ServiceError> {
        let limit = self
            .remaining()
            .map_or(self.selection.page_size, |left| {
                left.min(self.selection.page_size)
            });
        let query = WorkItemQuery::Roots {
            types: self.selection.types.clone(),
            after_id: self.frontier,
            exclude: self.selection.exclude.clone(),
        };
        let ids = self.service.query(&query, Some(limit))?;
        debug!(after_id = self.frontier, count = ids.len(), "fetched root page");

        let mut last = self.frontier;
        for id in ids {
            if id > last {
                self.page.push_back(id);
                last = id;
            }
        }
        Ok(())
    }
}

impl Iterator for ParentEnumerator<'_> {
    type Item = Result<u64, ServiceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.remaining() == Some(0) {
            self.done = true;
            return None;
        }

        if self.page.is_empty() {
            if let Err(err) = self.fetch_page() {
                self.done = true;
                return Some(Err(err));
            }
        }

        let Some(id) = self.page.pop_front() else {
            self.done = true;
            return None;
        };
        self.frontier = id;
        self.produced += 1;
        Some(Ok(id))
    }
}

impl std::iter::FusedIterator for ParentEnumerator<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::InMemoryService;
    use crate::model::{WorkEntity, fields};

    fn service_with_bundles(ids: &[u64]) -> InMemoryService {
        let service = InMemoryService::new("S");
        for id in ids {
            service.insert(WorkEntity::new(*id).with_field(fields::WORK_ITEM_TYPE, "Work Bundle"));
        }
        service
    }

    fn selection() -> RootSelection {
        RootSelection::new(vec!["Work Bundle".to_string()])
    }

    #[test]
    fn pages_through_everything_in_order() {
        let service = service_with_bundles(&[1, 2, 3, 4, 5, 6, 7]);
        let ids: Vec<u64> = ParentEnumerator::new(&service, selection().with_page_size(3))
            .collect::<Result<_, _>>()
            .expect("enumerates");
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn max_and_after_id_bound_the_sequence() {
        let service = service_with_bundles(&[10, 20, 30, 40, 50]);
        let sel = selection().with_after_id(20).with_max(Some(2)).with_page_size(1);
        let ids: Vec<u64> = ParentEnumerator::new(&service, sel)
            .collect::<Result<_, _>>()
            .expect("enumerates");
        assert_eq!(ids, vec![30, 40]);
    }

    #[test]
    fn resuming_from_last_seen_id_continues_exactly() {
        let service = service_with_bundles(&[3, 6, 9, 12]);
        let mut first = ParentEnumerator::new(&service, selection().with_max(Some(2)));
        let head: Vec<u64> = first.by_ref().map(|r| r.expect("id")).collect();
        assert_eq!(head, vec![3, 6]);

        let resumed: Vec<u64> =
            ParentEnumerator::new(&service, selection().with_after_id(first.frontier()))
                .map(|r| r.expect("id"))
                .collect();
        assert_eq!(resumed, vec![9, 12]);
    }

    #[test]
    fn zero_max_yields_nothing() {
        let service = service_with_bundles(&[1]);
        let mut ids = ParentEnumerator::new(&service, selection().with_max(Some(0)));
        assert!(ids.next().is_none());
    }
}
