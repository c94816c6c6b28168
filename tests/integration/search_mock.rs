/*
 * Copyright 2025-present ScyllaDB
 * SPDX-License-Identifier: LicenseRef-ScyllaDB-Source-Available-1.0
 */

use blog_search::search::PostDoc;
use blog_search::search::SearchHits;
use blog_search::search::SearchIndex;
use blog_search::PostId;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::RwLock;
use tokio::sync::mpsc;

/// In-memory stand-in for the search index actor. Honors the same contract as
/// the real backend: upsert by id, published-only search sorted newest first,
/// and deleting a missing document reports failure.
#[derive(Clone)]
pub(crate) struct SearchMock(Arc<RwLock<SearchState>>);

struct SearchState {
    docs: HashMap<PostId, PostDoc>,
    fail_update_ids: HashSet<PostId>,
    exists: bool,
}

pub(crate) fn new() -> (mpsc::Sender<SearchIndex>, SearchMock) {
    let (tx, mut rx) = mpsc::channel(10);
    let index = SearchMock(Arc::new(RwLock::new(SearchState {
        docs: HashMap::new(),
        fail_update_ids: HashSet::new(),
        exists: true,
    })));
    tokio::spawn({
        let index = index.clone();
        async move {
            while let Some(msg) = rx.recv().await {
                process(&index, msg);
            }
        }
    });
    (tx, index)
}

impl SearchMock {
    pub(crate) fn doc(&self, id: PostId) -> Option<PostDoc> {
        self.0.read().unwrap().docs.get(&id).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.0.read().unwrap().docs.len()
    }

    /// Make every subsequent update of this document report failure.
    pub(crate) fn fail_updates_for(&self, id: PostId) {
        self.0.write().unwrap().fail_update_ids.insert(id);
    }

    /// Drop all documents behind the service's back, simulating index drift.
    pub(crate) fn clear_docs(&self) {
        self.0.write().unwrap().docs.clear();
    }
}

fn process(index: &SearchMock, msg: SearchIndex) {
    let mut state = index.0.write().unwrap();
    match msg {
        SearchIndex::CreateIndex { tx } => {
            state.docs.clear();
            state.exists = true;
            let _ = tx.send(true);
        }

        SearchIndex::DeleteIndex { tx } => {
            state.docs.clear();
            state.exists = false;
            let _ = tx.send(true);
        }

        SearchIndex::IndexExists { tx } => {
            let _ = tx.send(state.exists);
        }

        SearchIndex::RefreshIndex { tx } => {
            let _ = tx.send(true);
        }

        SearchIndex::IndexPost { doc, tx } => {
            state.docs.insert(doc.id, doc);
            let _ = tx.send(true);
        }

        SearchIndex::UpdatePost { doc, tx } => {
            if state.fail_update_ids.contains(&doc.id) {
                let _ = tx.send(false);
            } else {
                state.docs.insert(doc.id, doc);
                let _ = tx.send(true);
            }
        }

        SearchIndex::DeletePost { id, tx } => {
            let _ = tx.send(state.docs.remove(&id).is_some());
        }

        SearchIndex::BulkIndexPosts { docs, tx } => {
            for doc in docs {
                state.docs.insert(doc.id, doc);
            }
            let _ = tx.send(true);
        }

        SearchIndex::SearchPosts {
            filters,
            from,
            size,
            tx,
        } => {
            let mut matches: Vec<&PostDoc> = state
                .docs
                .values()
                .filter(|doc| doc.is_published)
                .filter(|doc| filters.category_id.is_none_or(|id| doc.category_id == id))
                .filter(|doc| match filters.search.as_deref() {
                    None | Some("") => true,
                    Some(query) => {
                        let query = query.to_lowercase();
                        doc.name.to_lowercase().contains(&query)
                            || doc.description.to_lowercase().contains(&query)
                            || doc
                                .category_name
                                .as_deref()
                                .is_some_and(|name| name.to_lowercase().contains(&query))
                    }
                })
                .collect();
            matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            let total = matches.len() as u64;
            let hits = matches.into_iter().skip(from).take(size).cloned().collect();
            let _ = tx.send(SearchHits { hits, total });
        }
    }
}
