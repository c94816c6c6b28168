/*
 * Copyright 2025-present ScyllaDB
 * SPDX-License-Identifier: LicenseRef-ScyllaDB-Source-Available-1.0
 */

use crate::db::Db;
use crate::db::DbExt;
use crate::search::doc::PostDoc;
use crate::search::SearchIndex;
use crate::search::SearchIndexExt;
use crate::CategoryRecord;
use crate::PostId;
use crate::PostRecord;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::time;
use tracing::debug;
use tracing::debug_span;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;
use tracing::Instrument;

/// A mutation of the source of truth, recorded right after the relational
/// write has been acknowledged. For a deleted post only the id survives, the
/// row is gone by the time the job runs.
#[derive(Clone, Debug)]
pub enum ChangeEvent {
    PostCreated(PostRecord),
    PostUpdated(PostRecord),
    PostDeleted(PostId),
    CategoryUpdated(CategoryRecord),
}

#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Attempts per job before it is given up on.
    pub max_attempts: u32,
    /// Base delay between attempts, grows linearly with the attempt number.
    pub retry_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

pub enum Sync {
    /// Fire-and-forget: the mutation path never waits for index convergence.
    Schedule { event: ChangeEvent },

    /// Rebuild the whole index from the relational store. The optional reply
    /// reports whether the rebuild succeeded.
    Recreate { tx: Option<oneshot::Sender<bool>> },
}

pub(crate) trait SyncExt {
    async fn schedule(&self, event: ChangeEvent);
    async fn recreate_index(&self);
    async fn recreate_index_wait(&self) -> bool;
}

impl SyncExt for mpsc::Sender<Sync> {
    async fn schedule(&self, event: ChangeEvent) {
        self.send(Sync::Schedule { event })
            .await
            .unwrap_or_else(|err| warn!("SyncExt::schedule: unable to send request: {err}"));
    }

    async fn recreate_index(&self) {
        self.send(Sync::Recreate { tx: None })
            .await
            .unwrap_or_else(|err| warn!("SyncExt::recreate_index: unable to send request: {err}"));
    }

    async fn recreate_index_wait(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        if self.send(Sync::Recreate { tx: Some(tx) }).await.is_err() {
            warn!("SyncExt::recreate_index_wait: unable to send request");
            return false;
        }
        rx.await.unwrap_or_else(|err| {
            warn!("SyncExt::recreate_index_wait: unable to recv response: {err}");
            false
        })
    }
}

pub fn new(
    db: mpsc::Sender<Db>,
    search: mpsc::Sender<SearchIndex>,
    config: SyncConfig,
) -> mpsc::Sender<Sync> {
    const CHANNEL_SIZE: usize = 100;
    let (tx, mut rx) = mpsc::channel(CHANNEL_SIZE);

    tokio::spawn(
        async move {
            debug!("starting");

            while let Some(msg) = rx.recv().await {
                let (job, ack) = match msg {
                    Sync::Schedule { event } => (SyncJob::from(event), None),
                    Sync::Recreate { tx } => (SyncJob::RecreateIndex, tx),
                };
                // jobs run concurrently, there is no ordering across entities
                tokio::spawn(run_job(
                    job,
                    db.clone(),
                    search.clone(),
                    config.clone(),
                    ack,
                ));
            }

            debug!("finished");
        }
        .instrument(debug_span!("sync")),
    );

    tx
}

/// Rebuild through the queue so the retry budget applies, and wait for the
/// outcome. Used by the operational command surface.
pub async fn recreate_queued(
    db: mpsc::Sender<Db>,
    search: mpsc::Sender<SearchIndex>,
    config: SyncConfig,
) -> bool {
    new(db, search, config).recreate_index_wait().await
}

/// Run the whole-index rebuild inline, bypassing the queue and its retries.
pub async fn run_recreate(db: &mpsc::Sender<Db>, search: &mpsc::Sender<SearchIndex>) -> bool {
    match execute(&SyncJob::RecreateIndex, db, search).await {
        Ok(done) => done,
        Err(err) => {
            error!("unable to recreate index: {err}");
            false
        }
    }
}

enum SyncJob {
    IndexPost { post: PostRecord },
    UpdatePost { post: PostRecord },
    DeletePost { id: PostId },
    UpdateCategoryPosts { category: CategoryRecord },
    RecreateIndex,
}

impl From<ChangeEvent> for SyncJob {
    fn from(event: ChangeEvent) -> Self {
        match event {
            ChangeEvent::PostCreated(post) => SyncJob::IndexPost { post },
            ChangeEvent::PostUpdated(post) => SyncJob::UpdatePost { post },
            ChangeEvent::PostDeleted(id) => SyncJob::DeletePost { id },
            ChangeEvent::CategoryUpdated(category) => SyncJob::UpdateCategoryPosts { category },
        }
    }
}

/// At-least-once execution: an error is treated as transient and retried with
/// a growing delay until the attempt budget runs out, then the job is dropped
/// with a terminal log line. A clean `false` from the index is logged inside
/// the job and ends it without another attempt.
async fn run_job(
    job: SyncJob,
    db: mpsc::Sender<Db>,
    search: mpsc::Sender<SearchIndex>,
    config: SyncConfig,
    ack: Option<oneshot::Sender<bool>>,
) {
    let mut attempt = 0;
    let outcome = loop {
        attempt += 1;
        match execute(&job, &db, &search).await {
            Ok(done) => break done,
            Err(err) if attempt < config.max_attempts => {
                warn!("sync job failed on attempt {attempt}, retrying: {err}");
                time::sleep(config.retry_delay * attempt).await;
            }
            Err(err) => {
                failed(&job, &err);
                break false;
            }
        }
    };
    if let Some(ack) = ack {
        if ack.send(outcome).is_err() {
            trace!("run_job: ack receiver dropped");
        }
    }
}

/// Terminal failure hook: the job exhausted its attempts and is dropped, all
/// that remains is the failure context for whoever inspects the logs.
fn failed(job: &SyncJob, err: &anyhow::Error) {
    match job {
        SyncJob::IndexPost { post } => {
            error!("index job for post {} given up: {err}", post.id);
        }
        SyncJob::UpdatePost { post } => {
            error!("update job for post {} given up: {err}", post.id);
        }
        SyncJob::DeletePost { id } => {
            error!("delete job for post {id} given up: {err}");
        }
        SyncJob::UpdateCategoryPosts { category } => {
            error!(
                "cascade job for category {} ({}) given up: {err}",
                category.id, category.name
            );
        }
        SyncJob::RecreateIndex => {
            error!("index recreation job given up: {err}");
        }
    }
}

async fn execute(
    job: &SyncJob,
    db: &mpsc::Sender<Db>,
    search: &mpsc::Sender<SearchIndex>,
) -> anyhow::Result<bool> {
    match job {
        SyncJob::IndexPost { post } => {
            let (category_name, user_name) =
                db.get_post_refs(post.category_id, post.user_id).await?;
            let doc = PostDoc::new(post, category_name, user_name);
            if search.index_post(doc).await {
                info!("post {} indexed", post.id);
                Ok(true)
            } else {
                error!("unable to index post {}", post.id);
                Ok(false)
            }
        }

        SyncJob::UpdatePost { post } => {
            let (category_name, user_name) =
                db.get_post_refs(post.category_id, post.user_id).await?;
            let doc = PostDoc::new(post, category_name, user_name);
            if search.update_post(doc).await {
                info!("post {} updated in index", post.id);
                Ok(true)
            } else {
                error!("unable to update post {} in index", post.id);
                Ok(false)
            }
        }

        SyncJob::DeletePost { id } => {
            if search.delete_post(*id).await {
                info!("post {id} deleted from index");
                Ok(true)
            } else {
                error!("unable to delete post {id} from index");
                Ok(false)
            }
        }

        SyncJob::UpdateCategoryPosts { category } => {
            let posts = db.get_posts_for_index(Some(category.id)).await?;
            if posts.is_empty() {
                info!("no posts to update for category {}", category.id);
                return Ok(true);
            }

            let mut updated = 0usize;
            for entry in &posts {
                let doc = PostDoc::new(
                    &entry.post,
                    entry.category_name.clone(),
                    entry.user_name.clone(),
                );
                // one stubborn document must not hold back the rest
                if search.update_post(doc).await {
                    updated += 1;
                } else {
                    warn!(
                        "unable to update post {} after category {} change",
                        entry.post.id, category.id
                    );
                }
            }
            info!(
                "updated {updated}/{} posts after category {} change",
                posts.len(),
                category.id
            );
            Ok(true)
        }

        SyncJob::RecreateIndex => {
            info!("recreating search index");
            if !search.create_index().await {
                error!("unable to create search index");
                return Ok(false);
            }

            let posts = db.get_posts_for_index(None).await?;
            if posts.is_empty() {
                info!("no posts to reindex");
                return Ok(true);
            }

            let docs = posts
                .iter()
                .map(|entry| {
                    PostDoc::new(
                        &entry.post,
                        entry.category_name.clone(),
                        entry.user_name.clone(),
                    )
                })
                .collect();
            if search.bulk_index_posts(docs).await {
                info!("reindexed {} posts", posts.len());
                Ok(true)
            } else {
                error!("unable to bulk index posts");
                Ok(false)
            }
        }
    }
}
