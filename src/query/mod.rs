//! Filtering, ordering and paging of sample lists.

pub mod filter;
pub mod sort;

pub use filter::{Filters, TagState, TypeFilter};
pub use sort::{Sort, SortKey};

use crate::db::models::Sample;
use serde::Serialize;

/// Filter then order `samples`. A shuffle gets a fresh permutation per call.
pub fn apply(samples: &[Sample], filters: &Filters, sort: Sort) -> Vec<Sample> {
    let mut hits = filters.apply(samples);
    sort::sort_samples(&mut hits, sort, rand::random());
    hits.into_iter().cloned().collect()
}

/// One page of a browse result.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Page {
    pub items: Vec<Sample>,
    /// 0-based.
    pub page: usize,
    pub page_count: usize,
    /// Samples matching the filters, across all pages.
    pub total: usize,
}

/// Browse state: filters, sort and page index over a sample list.
///
/// Any filter or sort change resets the page to 0. The shuffle order stays
/// fixed while paging and changes only on [`Browser::reshuffle`].
#[derive(Debug, Clone)]
pub struct Browser {
    filters: Filters,
    sort: Sort,
    page: usize,
    page_size: usize,
    shuffle_seed: u64,
}

impl Browser {
    pub fn new(page_size: usize) -> Self {
        Self {
            filters: Filters::default(),
            sort: Sort::default(),
            page: 0,
            page_size: page_size.max(1),
            shuffle_seed: rand::random(),
        }
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    pub fn sort(&self) -> Sort {
        self.sort
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn set_filters(&mut self, filters: Filters) {
        self.filters = filters;
        self.page = 0;
    }

    /// Edit the filters in place.
    pub fn update_filters(&mut self, edit: impl FnOnce(&mut Filters)) {
        edit(&mut self.filters);
        self.page = 0;
    }

    pub fn set_sort(&mut self, sort: Sort) {
        if sort.key == SortKey::Shuffle {
            self.shuffle_seed = rand::random();
        }
        self.sort = sort;
        self.page = 0;
    }

    pub fn reshuffle(&mut self) {
        self.set_sort(Sort {
            key: SortKey::Shuffle,
            descending: false,
        });
    }

    pub fn set_page(&mut self, page: usize) {
        self.page = page;
    }

    /// Compute the current page of `samples`. A page index past the end is
    /// clamped to the last page.
    pub fn view(&mut self, samples: &[Sample]) -> Page {
        let mut hits = self.filters.apply(samples);
        sort::sort_samples(&mut hits, self.sort, self.shuffle_seed);

        let total = hits.len();
        let page_count = total.div_ceil(self.page_size).max(1);
        self.page = self.page.min(page_count - 1);

        let items = hits
            .into_iter()
            .skip(self.page * self.page_size)
            .take(self.page_size)
            .cloned()
            .collect();
        Page {
            items,
            page: self.page,
            page_count,
            total,
        }
    }
}
