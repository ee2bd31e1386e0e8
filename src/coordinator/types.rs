// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the search service coordinator.

use std::time::Duration;

/// What this process knows about a type's index.
///
/// Tracked per document type; [`super::SearchService::ensure`] moves a type to
/// `Mapped`, rebuild moves every type back to `Absent` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexState {
    /// Not known to exist
    #[default]
    Absent,
    /// Exists, mapping not yet applied by this process
    Created,
    /// Exists with the current mapping
    Mapped,
}

impl std::fmt::Display for IndexState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absent => write!(f, "Absent"),
            Self::Created => write!(f, "Created"),
            Self::Mapped => write!(f, "Mapped"),
        }
    }
}

/// Outcome of [`super::SearchService::initialize`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitReport {
    /// Types whose index is mapped
    pub ready: Vec<String>,
    /// (type, error) of types that failed; startup continues past them
    pub failed: Vec<(String, String)>,
}

impl InitReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Counters of one type's bulk reindex.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReindexReport {
    pub type_name: String,
    /// Records handed over by the primary store
    pub records: usize,
    /// Records that encoded to nothing and were left out
    pub skipped: usize,
    pub batches: usize,
    /// Items listed in batch failure manifests
    pub failed_items: usize,
    /// Batches lost to transport failures
    pub failed_batches: usize,
}

impl ReindexReport {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Default::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed_items == 0 && self.failed_batches == 0
    }
}

/// Aggregate outcome of a completed rebuild.
///
/// Rebuild is best-effort: a failing type is recorded and the rest go on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RebuildReport {
    /// Indices dropped before recreation
    pub dropped: Vec<String>,
    pub reindexed: Vec<ReindexReport>,
    /// (type, error) for every step that failed
    pub failures: Vec<(String, String)>,
    pub took: Duration,
}

impl RebuildReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.reindexed.iter().all(ReindexReport::is_clean)
    }

    pub fn total_records(&self) -> usize {
        self.reindexed.iter().map(|r| r.records).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RebuildOutcome {
    /// Another rebuild holds the lock; nothing was done
    AlreadyRunning,
    Completed(RebuildReport),
}

impl RebuildOutcome {
    pub fn report(&self) -> Option<&RebuildReport> {
        match self {
            Self::AlreadyRunning => None,
            Self::Completed(report) => Some(report),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebuild_report_completeness() {
        let mut report = RebuildReport::default();
        assert!(report.is_complete());

        let mut article = ReindexReport::new("article");
        article.records = 40;
        report.reindexed.push(article.clone());
        assert!(report.is_complete());
        assert_eq!(report.total_records(), 40);

        article.failed_items = 1;
        report.reindexed.push(article);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_outcome_report() {
        assert!(RebuildOutcome::AlreadyRunning.report().is_none());
        let outcome = RebuildOutcome::Completed(RebuildReport::default());
        assert!(outcome.report().is_some());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(IndexState::default().to_string(), "Absent");
        assert_eq!(IndexState::Mapped.to_string(), "Mapped");
    }
}
