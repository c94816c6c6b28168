/*
 * Copyright 2025-present ScyllaDB
 * SPDX-License-Identifier: LicenseRef-ScyllaDB-Source-Available-1.0
 */

use crate::search::doc::PostDoc;
use crate::CategoryId;
use crate::PostId;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tracing::warn;

#[derive(Clone, Debug, Default)]
pub struct SearchFilters {
    pub category_id: Option<CategoryId>,
    pub search: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct SearchHits {
    pub hits: Vec<PostDoc>,
    pub total: u64,
}

/// Boundary to the full-text search engine. Every operation reports a plain
/// outcome, backend failures are logged behind this seam and never propagate
/// to callers. Retrying is the callers' business.
pub enum SearchIndex {
    /// Drops any index under the configured name, then creates it with the
    /// fixed posts mapping. Destructive, only the rebuild path may send this.
    CreateIndex {
        tx: oneshot::Sender<bool>,
    },

    /// Idempotent, a missing index reports success.
    DeleteIndex {
        tx: oneshot::Sender<bool>,
    },

    IndexExists {
        tx: oneshot::Sender<bool>,
    },

    /// Makes recent writes visible to readers. Operational use only.
    RefreshIndex {
        tx: oneshot::Sender<bool>,
    },

    /// Upsert by document id.
    IndexPost {
        doc: PostDoc,
        tx: oneshot::Sender<bool>,
    },

    /// Doc-as-upsert partial update, safe when the document does not exist yet.
    UpdatePost {
        doc: PostDoc,
        tx: oneshot::Sender<bool>,
    },

    /// Succeeds only when the backend actually deleted a document. Deleting a
    /// missing document reports failure, unlike DeleteIndex.
    DeletePost {
        id: PostId,
        tx: oneshot::Sender<bool>,
    },

    /// One batched upsert, succeeds when no per-item errors are reported.
    BulkIndexPosts {
        docs: Vec<PostDoc>,
        tx: oneshot::Sender<bool>,
    },

    /// Published documents only, newest first. Failures degrade to an empty
    /// result set.
    SearchPosts {
        filters: SearchFilters,
        from: usize,
        size: usize,
        tx: oneshot::Sender<SearchHits>,
    },
}

pub(crate) trait SearchIndexExt {
    async fn create_index(&self) -> bool;
    async fn delete_index(&self) -> bool;
    async fn index_exists(&self) -> bool;
    async fn refresh_index(&self) -> bool;
    async fn index_post(&self, doc: PostDoc) -> bool;
    async fn update_post(&self, doc: PostDoc) -> bool;
    async fn delete_post(&self, id: PostId) -> bool;
    async fn bulk_index_posts(&self, docs: Vec<PostDoc>) -> bool;
    async fn search_posts(&self, filters: SearchFilters, from: usize, size: usize) -> SearchHits;
}

impl SearchIndexExt for mpsc::Sender<SearchIndex> {
    async fn create_index(&self) -> bool {
        request(self, |tx| SearchIndex::CreateIndex { tx }).await
    }

    async fn delete_index(&self) -> bool {
        request(self, |tx| SearchIndex::DeleteIndex { tx }).await
    }

    async fn index_exists(&self) -> bool {
        request(self, |tx| SearchIndex::IndexExists { tx }).await
    }

    async fn refresh_index(&self) -> bool {
        request(self, |tx| SearchIndex::RefreshIndex { tx }).await
    }

    async fn index_post(&self, doc: PostDoc) -> bool {
        request(self, |tx| SearchIndex::IndexPost { doc, tx }).await
    }

    async fn update_post(&self, doc: PostDoc) -> bool {
        request(self, |tx| SearchIndex::UpdatePost { doc, tx }).await
    }

    async fn delete_post(&self, id: PostId) -> bool {
        request(self, |tx| SearchIndex::DeletePost { id, tx }).await
    }

    async fn bulk_index_posts(&self, docs: Vec<PostDoc>) -> bool {
        request(self, |tx| SearchIndex::BulkIndexPosts { docs, tx }).await
    }

    async fn search_posts(&self, filters: SearchFilters, from: usize, size: usize) -> SearchHits {
        let (tx, rx) = oneshot::channel();
        if self
            .send(SearchIndex::SearchPosts {
                filters,
                from,
                size,
                tx,
            })
            .await
            .is_err()
        {
            warn!("SearchIndexExt::search_posts: unable to send request");
            return SearchHits::default();
        }
        rx.await.unwrap_or_else(|err| {
            warn!("SearchIndexExt::search_posts: unable to recv response: {err}");
            SearchHits::default()
        })
    }
}

/// One-shot refresh for the operational command surface.
pub async fn refresh(index: &mpsc::Sender<SearchIndex>) -> bool {
    index.refresh_index().await
}

async fn request(
    index: &mpsc::Sender<SearchIndex>,
    msg: impl FnOnce(oneshot::Sender<bool>) -> SearchIndex,
) -> bool {
    let (tx, rx) = oneshot::channel();
    if index.send(msg(tx)).await.is_err() {
        warn!("SearchIndexExt: unable to send request");
        return false;
    }
    rx.await.unwrap_or_else(|err| {
        warn!("SearchIndexExt: unable to recv response: {err}");
        false
    })
}
