// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Criteria → engine request.
//!
//! ```text
//! SearchCriteria { types: [article], query_string: "title:hel*", sorts: [date desc] }
//!     ↓
//! SearchRequest  { indices: [index_article], query: Wildcard(title, hel*), sorts: [date desc],
//!                  from: 0, size: 10000, timeout: 10s }
//! ```
//!
//! Criteria naming no types search every registered index.

use std::sync::Arc;
use std::time::Duration;

use super::{Query, SearchCriteria};
use crate::catalog::{index_name_for, Catalog};
use crate::cluster::{SearchRequest, SortSpec};
use crate::error::SearchError;

/// Page size ceiling for unpaged requests.
pub const DEFAULT_MAX_PAGE_SIZE: usize = 10_000;
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

/// `field:pattern` where the pattern holds a `?` or `*`.
///
/// Mirrors the full-match pattern `\w+:.*[?*].*`: the field is ASCII word
/// characters up to the first colon and no line breaks are allowed.
pub fn split_wildcard(query: &str) -> Option<(&str, &str)> {
    if query.contains(['\n', '\r']) {
        return None;
    }
    let (field, pattern) = query.split_once(':')?;
    let is_word = !field.is_empty() && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    (is_word && pattern.contains(['?', '*'])).then_some((field, pattern))
}

#[derive(Debug, Clone)]
pub struct QueryTranslator {
    catalog: Arc<Catalog>,
    max_page_size: usize,
    timeout: Duration,
}

impl QueryTranslator {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            timeout: DEFAULT_SEARCH_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_max_page_size(mut self, size: usize) -> Self {
        self.max_page_size = size;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_page_size(&self) -> usize {
        self.max_page_size
    }

    /// Index of a document type. Unregistered names still follow the naming rule.
    pub fn index_for(&self, type_name: &str) -> String {
        self.catalog
            .entity_type_for(type_name)
            .map(|t| t.index_name().to_string())
            .unwrap_or_else(|| index_name_for(type_name))
    }

    /// Target indices: the named types, or every registered index when none are named.
    pub fn indices_for(&self, criteria: &SearchCriteria) -> Vec<String> {
        match criteria.type_names() {
            [] => self.catalog.iter().map(|t| t.index_name().to_string()).collect(),
            names => names.iter().map(|t| self.index_for(t)).collect(),
        }
    }

    pub fn build(&self, criteria: &SearchCriteria) -> Result<SearchRequest, SearchError> {
        let query = match (criteria.get_query(), criteria.get_query_string()) {
            (Some(query), _) => query.clone(),
            (None, Some(text)) if !text.trim().is_empty() => Self::parse_query_string(text),
            _ => {
                return Err(SearchError::InvalidArgument(
                    "criteria carries neither a query nor a query string".into(),
                ))
            }
        };

        let (from, size) = match criteria.page() {
            Some(page) => (page.start(), page.size),
            None => (0, self.max_page_size),
        };

        Ok(SearchRequest {
            indices: self.indices_for(criteria),
            query,
            sorts: criteria
                .sorts()
                .iter()
                .map(|(field, descending)| SortSpec {
                    field: field.clone(),
                    descending: *descending,
                })
                .collect(),
            from,
            size,
            timeout: self.timeout,
            aggregation: None,
            ignore_unavailable: true,
        })
    }

    fn parse_query_string(text: &str) -> Query {
        match split_wildcard(text) {
            Some((field, pattern)) => Query::wildcard(field, pattern),
            None => Query::query_string(text),
        }
    }
}
