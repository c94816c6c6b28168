/*
 * Copyright 2025-present ScyllaDB
 * SPDX-License-Identifier: LicenseRef-ScyllaDB-Source-Available-1.0
 */

pub mod actor;
pub mod doc;
pub mod opensearch;

pub use actor::SearchFilters;
pub use actor::SearchHits;
pub use actor::SearchIndex;
pub(crate) use actor::SearchIndexExt;
pub use doc::PostDoc;
