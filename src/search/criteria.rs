// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Application-level search criteria and result pages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::Query;

/// One page of results, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub number: usize,
    pub size: usize,
}

impl Page {
    pub fn new(number: usize, size: usize) -> Self {
        Self {
            number: number.max(1),
            size,
        }
    }

    /// Offset of the first hit, saturating for out-of-range pages
    pub fn start(&self) -> usize {
        self.number.saturating_sub(1).saturating_mul(self.size)
    }
}

/// What to search for.
///
/// Either an explicit [`Query`] or a non-blank query string must be set; the
/// explicit query wins when both are.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchCriteria {
    types: Vec<String>,
    query_string: Option<String>,
    query: Option<Query>,
    /// (field, descending) in insertion order
    sorts: Vec<(String, bool)>,
    page: Option<Page>,
}

impl SearchCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Free-text criteria over the given document types.
    pub fn query_string_for<I, S>(types: I, query: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new().types(types).query_string(query)
    }

    #[must_use]
    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.types.push(type_name.into());
        self
    }

    #[must_use]
    pub fn types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types.extend(types.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn query_string(mut self, query: impl Into<String>) -> Self {
        self.query_string = Some(query.into());
        self
    }

    #[must_use]
    pub fn query(mut self, query: Query) -> Self {
        self.query = Some(query);
        self
    }

    /// Add a sort; a field sorted twice keeps its first position.
    #[must_use]
    pub fn sort(mut self, field: impl Into<String>, descending: bool) -> Self {
        let field = field.into();
        match self.sorts.iter_mut().find(|(f, _)| *f == field) {
            Some(existing) => existing.1 = descending,
            None => self.sorts.push((field, descending)),
        }
        self
    }

    #[must_use]
    pub fn paged(mut self, page: Page) -> Self {
        self.page = Some(page);
        self
    }

    pub fn type_names(&self) -> &[String] {
        &self.types
    }

    pub fn get_query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    pub fn get_query(&self) -> Option<&Query> {
        self.query.as_ref()
    }

    pub fn sorts(&self) -> &[(String, bool)] {
        &self.sorts
    }

    pub fn page(&self) -> Option<Page> {
        self.page
    }
}

/// A page of decoded results.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultPage<T> {
    /// `None` when unpaged
    pub page: Option<Page>,
    pub total_results: u64,
    pub took: Duration,
    pub result: Vec<T>,
}

impl<T> ResultPage<T> {
    pub fn empty(page: Option<Page>) -> Self {
        Self {
            page,
            total_results: 0,
            took: Duration::ZERO,
            result: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.result.len()
    }

    pub fn is_empty(&self) -> bool {
        self.result.is_empty()
    }

    pub fn total_pages(&self) -> u64 {
        match self.page {
            Some(page) if page.size > 0 => self.total_results.div_ceil(page.size as u64),
            _ => u64::from(self.total_results > 0),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> ResultPage<U> {
        ResultPage {
            page: self.page,
            total_results: self.total_results,
            took: self.took,
            result: self.result.into_iter().map(f).collect(),
        }
    }
}
