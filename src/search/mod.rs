// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Search Infrastructure
//!
//! # Architecture
//!
//! ```text
//! SearchCriteria (types, query string | Query, sorts, page)
//!     ↓ QueryTranslator
//! SearchRequest (indices, Query AST, sorts, from/size, timeout)
//!     ↓
//!     ├─→ MemoryCluster evaluates the AST directly
//!     └─→ RediSearchTranslator → FT.SEARCH syntax
//! ```
//!
//! # Query Language
//!
//! Free-text criteria are parsed as query strings: terms separated by
//! whitespace, all required (`AND`). A `field:pattern` string whose pattern
//! holds `?` or `*` becomes a wildcard query on that field instead.
//!
//! ```text
//! rust async            - both terms, any field
//! title:rust            - term scoped to one field
//! title:ru*             - wildcard on one field
//! ```

mod criteria;
mod query_builder;
mod translator;

pub use criteria::{Page, ResultPage, SearchCriteria};
pub use query_builder::{FieldOperator, FieldQuery, Operator, Query, QueryBuilder, QueryNode, QueryValue};
pub use translator::{split_wildcard, QueryTranslator, DEFAULT_MAX_PAGE_SIZE, DEFAULT_SEARCH_TIMEOUT};
