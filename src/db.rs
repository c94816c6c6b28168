/*
 * Copyright 2025-present ScyllaDB
 * SPDX-License-Identifier: LicenseRef-ScyllaDB-Source-Available-1.0
 */

use crate::CategoryId;
use crate::CategoryRecord;
use crate::KeyspaceName;
use crate::PostEntry;
use crate::PostId;
use crate::PostRecord;
use crate::ScyllaDbUri;
use crate::UserId;
use anyhow::Context;
use chrono::DateTime;
use chrono::Utc;
use futures::TryStreamExt;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::statement::prepared::PreparedStatement;
use scylla::value::CqlValue;
use scylla::value::Row;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tracing::debug;
use tracing::debug_span;
use tracing::Instrument;

type GetPostR = anyhow::Result<Option<PostEntry>>;
type GetPostsForIndexR = anyhow::Result<Vec<PostEntry>>;
type GetPostRefsR = anyhow::Result<(Option<String>, Option<String>)>;
type PutPostR = anyhow::Result<()>;
type DeletePostR = anyhow::Result<()>;
type NextIdR = anyhow::Result<i32>;
type GetCategoryR = anyhow::Result<Option<CategoryRecord>>;
type GetCategoriesR = anyhow::Result<Vec<CategoryRecord>>;
type CategoryNameTakenR = anyhow::Result<bool>;
type CategoryHasPostsR = anyhow::Result<bool>;
type PutCategoryR = anyhow::Result<()>;
type DeleteCategoryR = anyhow::Result<()>;

pub enum Db {
    GetPostBySlug {
        slug: String,
        tx: oneshot::Sender<GetPostR>,
    },

    GetPostById {
        id: PostId,
        tx: oneshot::Sender<GetPostR>,
    },

    /// Posts with category/author names resolved, for (re)indexing. `None`
    /// fetches the whole table.
    GetPostsForIndex {
        category: Option<CategoryId>,
        tx: oneshot::Sender<GetPostsForIndexR>,
    },

    GetPostRefs {
        category_id: CategoryId,
        user_id: UserId,
        tx: oneshot::Sender<GetPostRefsR>,
    },

    PutPost {
        post: PostRecord,
        tx: oneshot::Sender<PutPostR>,
    },

    DeletePost {
        id: PostId,
        tx: oneshot::Sender<DeletePostR>,
    },

    NextPostId {
        tx: oneshot::Sender<NextIdR>,
    },

    NextCategoryId {
        tx: oneshot::Sender<NextIdR>,
    },

    GetCategory {
        id: CategoryId,
        tx: oneshot::Sender<GetCategoryR>,
    },

    GetCategories {
        tx: oneshot::Sender<GetCategoriesR>,
    },

    CategoryNameTaken {
        name: String,
        exclude: Option<CategoryId>,
        tx: oneshot::Sender<CategoryNameTakenR>,
    },

    CategoryHasPosts {
        id: CategoryId,
        tx: oneshot::Sender<CategoryHasPostsR>,
    },

    PutCategory {
        category: CategoryRecord,
        tx: oneshot::Sender<PutCategoryR>,
    },

    DeleteCategory {
        id: CategoryId,
        tx: oneshot::Sender<DeleteCategoryR>,
    },
}

pub(crate) trait DbExt {
    async fn get_post_by_slug(&self, slug: String) -> GetPostR;

    async fn get_post_by_id(&self, id: PostId) -> GetPostR;

    async fn get_posts_for_index(&self, category: Option<CategoryId>) -> GetPostsForIndexR;

    async fn get_post_refs(&self, category_id: CategoryId, user_id: UserId) -> GetPostRefsR;

    async fn put_post(&self, post: PostRecord) -> PutPostR;

    async fn delete_post(&self, id: PostId) -> DeletePostR;

    async fn next_post_id(&self) -> NextIdR;

    async fn next_category_id(&self) -> NextIdR;

    async fn get_category(&self, id: CategoryId) -> GetCategoryR;

    async fn get_categories(&self) -> GetCategoriesR;

    async fn category_name_taken(&self, name: String, exclude: Option<CategoryId>)
    -> CategoryNameTakenR;

    async fn category_has_posts(&self, id: CategoryId) -> CategoryHasPostsR;

    async fn put_category(&self, category: CategoryRecord) -> PutCategoryR;

    async fn delete_category(&self, id: CategoryId) -> DeleteCategoryR;
}

impl DbExt for mpsc::Sender<Db> {
    async fn get_post_by_slug(&self, slug: String) -> GetPostR {
        let (tx, rx) = oneshot::channel();
        self.send(Db::GetPostBySlug { slug, tx }).await?;
        rx.await?
    }

    async fn get_post_by_id(&self, id: PostId) -> GetPostR {
        let (tx, rx) = oneshot::channel();
        self.send(Db::GetPostById { id, tx }).await?;
        rx.await?
    }

    async fn get_posts_for_index(&self, category: Option<CategoryId>) -> GetPostsForIndexR {
        let (tx, rx) = oneshot::channel();
        self.send(Db::GetPostsForIndex { category, tx }).await?;
        rx.await?
    }

    async fn get_post_refs(&self, category_id: CategoryId, user_id: UserId) -> GetPostRefsR {
        let (tx, rx) = oneshot::channel();
        self.send(Db::GetPostRefs {
            category_id,
            user_id,
            tx,
        })
        .await?;
        rx.await?
    }

    async fn put_post(&self, post: PostRecord) -> PutPostR {
        let (tx, rx) = oneshot::channel();
        self.send(Db::PutPost { post, tx }).await?;
        rx.await?
    }

    async fn delete_post(&self, id: PostId) -> DeletePostR {
        let (tx, rx) = oneshot::channel();
        self.send(Db::DeletePost { id, tx }).await?;
        rx.await?
    }

    async fn next_post_id(&self) -> NextIdR {
        let (tx, rx) = oneshot::channel();
        self.send(Db::NextPostId { tx }).await?;
        rx.await?
    }

    async fn next_category_id(&self) -> NextIdR {
        let (tx, rx) = oneshot::channel();
        self.send(Db::NextCategoryId { tx }).await?;
        rx.await?
    }

    async fn get_category(&self, id: CategoryId) -> GetCategoryR {
        let (tx, rx) = oneshot::channel();
        self.send(Db::GetCategory { id, tx }).await?;
        rx.await?
    }

    async fn get_categories(&self) -> GetCategoriesR {
        let (tx, rx) = oneshot::channel();
        self.send(Db::GetCategories { tx }).await?;
        rx.await?
    }

    async fn category_name_taken(
        &self,
        name: String,
        exclude: Option<CategoryId>,
    ) -> CategoryNameTakenR {
        let (tx, rx) = oneshot::channel();
        self.send(Db::CategoryNameTaken { name, exclude, tx }).await?;
        rx.await?
    }

    async fn category_has_posts(&self, id: CategoryId) -> CategoryHasPostsR {
        let (tx, rx) = oneshot::channel();
        self.send(Db::CategoryHasPosts { id, tx }).await?;
        rx.await?
    }

    async fn put_category(&self, category: CategoryRecord) -> PutCategoryR {
        let (tx, rx) = oneshot::channel();
        self.send(Db::PutCategory { category, tx }).await?;
        rx.await?
    }

    async fn delete_category(&self, id: CategoryId) -> DeleteCategoryR {
        let (tx, rx) = oneshot::channel();
        self.send(Db::DeleteCategory { id, tx }).await?;
        rx.await?
    }
}

pub async fn new(uri: ScyllaDbUri, keyspace: KeyspaceName) -> anyhow::Result<mpsc::Sender<Db>> {
    let session = SessionBuilder::new()
        .known_node(uri.0.as_str())
        .build()
        .await
        .context("db session")?;
    let store = Arc::new(Store::new(session, keyspace).await?);

    const CHANNEL_SIZE: usize = 10;
    let (tx, mut rx) = mpsc::channel(CHANNEL_SIZE);

    tokio::spawn(
        async move {
            debug!("starting");
            while let Some(msg) = rx.recv().await {
                tokio::spawn(process(Arc::clone(&store), msg));
            }
            debug!("finished");
        }
        .instrument(debug_span!("db")),
    );

    Ok(tx)
}

async fn process(store: Arc<Store>, msg: Db) {
    match msg {
        Db::GetPostBySlug { slug, tx } => {
            send(tx, store.get_post_by_slug(&slug).await);
        }
        Db::GetPostById { id, tx } => {
            send(tx, store.get_post_by_id(id).await);
        }
        Db::GetPostsForIndex { category, tx } => {
            send(tx, store.get_posts_for_index(category).await);
        }
        Db::GetPostRefs {
            category_id,
            user_id,
            tx,
        } => {
            send(tx, store.get_post_refs(category_id, user_id).await);
        }
        Db::PutPost { post, tx } => {
            send(tx, store.put_post(&post).await);
        }
        Db::DeletePost { id, tx } => {
            send(tx, store.delete_post(id).await);
        }
        Db::NextPostId { tx } => {
            send(tx, store.next_id("posts").await);
        }
        Db::NextCategoryId { tx } => {
            send(tx, store.next_id("categories").await);
        }
        Db::GetCategory { id, tx } => {
            send(tx, store.get_category(id).await);
        }
        Db::GetCategories { tx } => {
            send(tx, store.get_categories().await);
        }
        Db::CategoryNameTaken { name, exclude, tx } => {
            send(tx, store.category_name_taken(&name, exclude).await);
        }
        Db::CategoryHasPosts { id, tx } => {
            send(tx, store.category_has_posts(id).await);
        }
        Db::PutCategory { category, tx } => {
            send(tx, store.put_category(&category).await);
        }
        Db::DeleteCategory { id, tx } => {
            send(tx, store.delete_category(id).await);
        }
    }
}

fn send<T>(tx: oneshot::Sender<T>, value: T) {
    if tx.send(value).is_err() {
        debug!("db::process: response receiver dropped");
    }
}

// id, name, slug, description, image, category_id, user_id, is_published, created_at, updated_at
type PostRow = (
    i32,
    String,
    String,
    String,
    Option<String>,
    i32,
    i32,
    bool,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn post_from_row(row: PostRow) -> PostRecord {
    let (id, name, slug, description, image, category_id, user_id, is_published, created_at, updated_at) =
        row;
    PostRecord {
        id: id.into(),
        name,
        slug,
        description,
        image,
        category_id: category_id.into(),
        user_id: user_id.into(),
        is_published,
        created_at,
        updated_at,
    }
}

struct Store {
    session: Session,
    st_get_post_by_slug: PreparedStatement,
    st_get_post_by_id: PreparedStatement,
    st_get_posts: PreparedStatement,
    st_get_posts_by_category: PreparedStatement,
    st_put_post: PreparedStatement,
    st_delete_post: PreparedStatement,
    st_first_post_in_category: PreparedStatement,
    st_get_category: PreparedStatement,
    st_get_categories: PreparedStatement,
    st_get_category_by_name: PreparedStatement,
    st_put_category: PreparedStatement,
    st_delete_category: PreparedStatement,
    st_get_user_name: PreparedStatement,
    st_seq_init: PreparedStatement,
    st_seq_get: PreparedStatement,
    st_seq_bump: PreparedStatement,
}

const POST_COLUMNS: &str =
    "id, name, slug, description, image, category_id, user_id, is_published, created_at, updated_at";

impl Store {
    async fn new(session: Session, keyspace: KeyspaceName) -> anyhow::Result<Self> {
        Self::ensure_schema(&session, &keyspace).await?;
        Ok(Self {
            st_get_post_by_slug: session
                .prepare(format!(
                    "SELECT {POST_COLUMNS} FROM {keyspace}.posts WHERE slug = ?"
                ))
                .await
                .context("get_post_by_slug")?,
            st_get_post_by_id: session
                .prepare(format!(
                    "SELECT {POST_COLUMNS} FROM {keyspace}.posts WHERE id = ?"
                ))
                .await
                .context("get_post_by_id")?,
            st_get_posts: session
                .prepare(format!("SELECT {POST_COLUMNS} FROM {keyspace}.posts"))
                .await
                .context("get_posts")?,
            st_get_posts_by_category: session
                .prepare(format!(
                    "SELECT {POST_COLUMNS} FROM {keyspace}.posts WHERE category_id = ?"
                ))
                .await
                .context("get_posts_by_category")?,
            st_put_post: session
                .prepare(format!(
                    "INSERT INTO {keyspace}.posts ({POST_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
                ))
                .await
                .context("put_post")?,
            st_delete_post: session
                .prepare(format!("DELETE FROM {keyspace}.posts WHERE id = ?"))
                .await
                .context("delete_post")?,
            st_first_post_in_category: session
                .prepare(format!(
                    "SELECT id FROM {keyspace}.posts WHERE category_id = ? LIMIT 1"
                ))
                .await
                .context("first_post_in_category")?,
            st_get_category: session
                .prepare(format!(
                    "SELECT id, name, slug FROM {keyspace}.categories WHERE id = ?"
                ))
                .await
                .context("get_category")?,
            st_get_categories: session
                .prepare(format!("SELECT id, name, slug FROM {keyspace}.categories"))
                .await
                .context("get_categories")?,
            st_get_category_by_name: session
                .prepare(format!(
                    "SELECT id FROM {keyspace}.categories WHERE name = ?"
                ))
                .await
                .context("get_category_by_name")?,
            st_put_category: session
                .prepare(format!(
                    "INSERT INTO {keyspace}.categories (id, name, slug) VALUES (?, ?, ?)"
                ))
                .await
                .context("put_category")?,
            st_delete_category: session
                .prepare(format!("DELETE FROM {keyspace}.categories WHERE id = ?"))
                .await
                .context("delete_category")?,
            st_get_user_name: session
                .prepare(format!("SELECT name FROM {keyspace}.users WHERE id = ?"))
                .await
                .context("get_user_name")?,
            st_seq_init: session
                .prepare(format!(
                    "INSERT INTO {keyspace}.sequences (name, next) VALUES (?, 0) IF NOT EXISTS"
                ))
                .await
                .context("seq_init")?,
            st_seq_get: session
                .prepare(format!("SELECT next FROM {keyspace}.sequences WHERE name = ?"))
                .await
                .context("seq_get")?,
            st_seq_bump: session
                .prepare(format!(
                    "UPDATE {keyspace}.sequences SET next = ? WHERE name = ? IF next = ?"
                ))
                .await
                .context("seq_bump")?,
            session,
        })
    }

    async fn ensure_schema(session: &Session, keyspace: &KeyspaceName) -> anyhow::Result<()> {
        let ddl = [
            format!(
                "CREATE KEYSPACE IF NOT EXISTS {keyspace} \
                 WITH replication = {{'class': 'NetworkTopologyStrategy', 'replication_factor': 1}}"
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {keyspace}.posts ( \
                 id int PRIMARY KEY, name text, slug text, description text, image text, \
                 category_id int, user_id int, is_published boolean, \
                 created_at timestamp, updated_at timestamp)"
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {keyspace}.categories ( \
                 id int PRIMARY KEY, name text, slug text)"
            ),
            format!("CREATE TABLE IF NOT EXISTS {keyspace}.users (id int PRIMARY KEY, name text)"),
            format!(
                "CREATE TABLE IF NOT EXISTS {keyspace}.sequences (name text PRIMARY KEY, next bigint)"
            ),
            format!("CREATE INDEX IF NOT EXISTS ON {keyspace}.posts (slug)"),
            format!("CREATE INDEX IF NOT EXISTS ON {keyspace}.posts (category_id)"),
            format!("CREATE INDEX IF NOT EXISTS ON {keyspace}.categories (name)"),
        ];
        for stmt in ddl {
            session
                .query_unpaged(stmt.as_str(), ())
                .await
                .with_context(|| format!("schema: {stmt}"))?;
        }
        Ok(())
    }

    async fn get_post_by_slug(&self, slug: &str) -> GetPostR {
        let row = self
            .session
            .execute_unpaged(&self.st_get_post_by_slug, (slug,))
            .await?
            .into_rows_result()?
            .maybe_first_row::<PostRow>()?;
        match row {
            Some(row) => Ok(Some(self.entry_for(post_from_row(row)).await?)),
            None => Ok(None),
        }
    }

    async fn get_post_by_id(&self, id: PostId) -> GetPostR {
        let row = self
            .session
            .execute_unpaged(&self.st_get_post_by_id, (id,))
            .await?
            .into_rows_result()?
            .maybe_first_row::<PostRow>()?;
        match row {
            Some(row) => Ok(Some(self.entry_for(post_from_row(row)).await?)),
            None => Ok(None),
        }
    }

    async fn entry_for(&self, post: PostRecord) -> anyhow::Result<PostEntry> {
        let (category_name, user_name) = self.get_post_refs(post.category_id, post.user_id).await?;
        Ok(PostEntry {
            post,
            category_name,
            user_name,
        })
    }

    async fn get_posts_for_index(&self, category: Option<CategoryId>) -> GetPostsForIndexR {
        let pager = match category {
            Some(id) => {
                self.session
                    .execute_iter(self.st_get_posts_by_category.clone(), (id,))
                    .await?
            }
            None => self.session.execute_iter(self.st_get_posts.clone(), ()).await?,
        };
        let posts: Vec<PostRecord> = pager
            .rows_stream::<PostRow>()?
            .map_ok(post_from_row)
            .try_collect()
            .await?;

        // category/author names are resolved once per distinct id
        let mut category_names: HashMap<CategoryId, Option<String>> = HashMap::new();
        let mut user_names: HashMap<UserId, Option<String>> = HashMap::new();
        let mut entries = Vec::with_capacity(posts.len());
        for post in posts {
            if !category_names.contains_key(&post.category_id) {
                let name = self.category_name(post.category_id).await?;
                category_names.insert(post.category_id, name);
            }
            if !user_names.contains_key(&post.user_id) {
                let name = self.user_name(post.user_id).await?;
                user_names.insert(post.user_id, name);
            }
            entries.push(PostEntry {
                category_name: category_names[&post.category_id].clone(),
                user_name: user_names[&post.user_id].clone(),
                post,
            });
        }
        Ok(entries)
    }

    async fn get_post_refs(&self, category_id: CategoryId, user_id: UserId) -> GetPostRefsR {
        Ok((
            self.category_name(category_id).await?,
            self.user_name(user_id).await?,
        ))
    }

    async fn category_name(&self, id: CategoryId) -> anyhow::Result<Option<String>> {
        Ok(self
            .session
            .execute_unpaged(&self.st_get_category, (id,))
            .await?
            .into_rows_result()?
            .maybe_first_row::<(i32, String, String)>()?
            .map(|(_, name, _)| name))
    }

    async fn user_name(&self, id: UserId) -> anyhow::Result<Option<String>> {
        Ok(self
            .session
            .execute_unpaged(&self.st_get_user_name, (id,))
            .await?
            .into_rows_result()?
            .maybe_first_row::<(String,)>()?
            .map(|(name,)| name))
    }

    async fn put_post(&self, post: &PostRecord) -> PutPostR {
        self.session
            .execute_unpaged(
                &self.st_put_post,
                (
                    post.id,
                    &post.name,
                    &post.slug,
                    &post.description,
                    &post.image,
                    post.category_id,
                    post.user_id,
                    post.is_published,
                    post.created_at,
                    post.updated_at,
                ),
            )
            .await?;
        Ok(())
    }

    async fn delete_post(&self, id: PostId) -> DeletePostR {
        self.session
            .execute_unpaged(&self.st_delete_post, (id,))
            .await?;
        Ok(())
    }

    async fn get_category(&self, id: CategoryId) -> GetCategoryR {
        Ok(self
            .session
            .execute_unpaged(&self.st_get_category, (id,))
            .await?
            .into_rows_result()?
            .maybe_first_row::<(i32, String, String)>()?
            .map(|(id, name, slug)| CategoryRecord {
                id: id.into(),
                name,
                slug,
            }))
    }

    async fn get_categories(&self) -> GetCategoriesR {
        Ok(self
            .session
            .execute_iter(self.st_get_categories.clone(), ())
            .await?
            .rows_stream::<(i32, String, String)>()?
            .map_ok(|(id, name, slug)| CategoryRecord {
                id: id.into(),
                name,
                slug,
            })
            .try_collect()
            .await?)
    }

    async fn category_name_taken(&self, name: &str, exclude: Option<CategoryId>) -> CategoryNameTakenR {
        let found = self
            .session
            .execute_unpaged(&self.st_get_category_by_name, (name,))
            .await?
            .into_rows_result()?
            .maybe_first_row::<(i32,)>()?;
        Ok(match found {
            Some((id,)) => exclude != Some(id.into()),
            None => false,
        })
    }

    async fn category_has_posts(&self, id: CategoryId) -> CategoryHasPostsR {
        Ok(self
            .session
            .execute_unpaged(&self.st_first_post_in_category, (id,))
            .await?
            .into_rows_result()?
            .maybe_first_row::<(i32,)>()?
            .is_some())
    }

    async fn put_category(&self, category: &CategoryRecord) -> PutCategoryR {
        self.session
            .execute_unpaged(
                &self.st_put_category,
                (category.id, &category.name, &category.slug),
            )
            .await?;
        Ok(())
    }

    async fn delete_category(&self, id: CategoryId) -> DeleteCategoryR {
        self.session
            .execute_unpaged(&self.st_delete_category, (id,))
            .await?;
        Ok(())
    }

    /// Allocate the next id of a sequence with a compare-and-set loop. The
    /// sequence row is seeded once, concurrent allocators retry on a lost race.
    async fn next_id(&self, name: &str) -> NextIdR {
        self.session
            .execute_unpaged(&self.st_seq_init, (name,))
            .await?;
        loop {
            let (current,) = self
                .session
                .execute_unpaged(&self.st_seq_get, (name,))
                .await?
                .into_rows_result()?
                .first_row::<(i64,)>()?;
            let result = self
                .session
                .execute_unpaged(&self.st_seq_bump, (current + 1, name, current))
                .await?
                .into_rows_result()?;
            let applied = matches!(
                result.first_row::<Row>()?.columns.first(),
                Some(Some(CqlValue::Boolean(true)))
            );
            if applied {
                return Ok(i32::try_from(current + 1).context("sequence overflow")?);
            }
        }
    }
}
