// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use thiserror::Error;

use crate::cluster::ClusterError;
use crate::coordination::LockError;
use crate::schema::SchemaError;
use crate::storage::StorageError;

/// Errors surfaced by the search service API.
#[derive(Error, Debug)]
pub enum SearchError {
    /// Caller input is unusable (e.g. criteria without any query)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// Document type tag or entity type not in the catalog
    #[error("Unknown document type '{0}'")]
    UnknownType(String),
    #[error("Failed to decode '{doc_type}/{id}': {reason}")]
    Decode {
        doc_type: String,
        id: String,
        reason: String,
    },
    #[error("Failed to encode '{0}'")]
    Encode(String),
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),
    #[error("Primary store error: {0}")]
    Storage(#[from] StorageError),
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),
}

impl SearchError {
    pub(crate) fn decode(doc_type: &str, id: &str, reason: impl ToString) -> Self {
        Self::Decode {
            doc_type: doc_type.to_string(),
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }
}
