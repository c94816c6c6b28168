/*
 * Copyright 2025-present ScyllaDB
 * SPDX-License-Identifier: LicenseRef-ScyllaDB-Source-Available-1.0
 */

//! Post mutations. Every write ends with exactly one change event handed to
//! the sync queue, scheduled only after the relational write was acknowledged
//! so an index job can never race a read that finds nothing.

use crate::db::Db;
use crate::db::DbExt;
use crate::slug::slugify;
use crate::sync::ChangeEvent;
use crate::sync::Sync;
use crate::sync::SyncExt;
use crate::BlogError;
use crate::CategoryId;
use crate::PostEntry;
use crate::PostId;
use crate::PostRecord;
use crate::UserId;
use chrono::Utc;
use tokio::sync::mpsc::Sender;

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct CreatePost {
    pub name: String,
    pub description: String,
    pub category_id: CategoryId,
    pub user_id: UserId,
    #[serde(default)]
    pub is_published: bool,
    /// Storage key of an already uploaded image
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct UpdatePost {
    pub name: String,
    pub description: String,
    pub category_id: CategoryId,
    #[serde(default)]
    pub is_published: Option<bool>,
    #[serde(default)]
    pub image: Option<String>,
}

pub async fn create(
    db: &Sender<Db>,
    sync: &Sender<Sync>,
    req: CreatePost,
) -> Result<PostRecord, BlogError> {
    if req.name.trim().is_empty() {
        return Err(BlogError::PostCreation("name must not be empty".to_string()));
    }
    if db.get_category(req.category_id).await?.is_none() {
        return Err(BlogError::PostCreation(format!(
            "unknown category {}",
            req.category_id
        )));
    }

    let id: PostId = db.next_post_id().await?.into();
    let now = Utc::now();
    let post = PostRecord {
        id,
        slug: slugify(&req.name),
        name: req.name,
        description: req.description,
        image: req.image,
        category_id: req.category_id,
        user_id: req.user_id,
        is_published: req.is_published,
        created_at: now,
        updated_at: now,
    };
    db.put_post(post.clone())
        .await
        .map_err(|err| BlogError::PostCreation(err.to_string()))?;

    sync.schedule(ChangeEvent::PostCreated(post.clone())).await;
    Ok(post)
}

pub async fn update(
    db: &Sender<Db>,
    sync: &Sender<Sync>,
    id: PostId,
    req: UpdatePost,
) -> Result<PostRecord, BlogError> {
    let Some(entry) = db.get_post_by_id(id).await? else {
        return Err(BlogError::PostNotFound(format!("id {id}")));
    };
    if db.get_category(req.category_id).await?.is_none() {
        return Err(BlogError::PostCreation(format!(
            "unknown category {}",
            req.category_id
        )));
    }

    let mut post = entry.post;
    // the slug is derived from the name once and only follows name changes
    if post.name != req.name {
        post.slug = slugify(&req.name);
    }
    post.name = req.name;
    post.description = req.description;
    post.category_id = req.category_id;
    if let Some(is_published) = req.is_published {
        post.is_published = is_published;
    }
    if let Some(image) = req.image {
        post.image = Some(image);
    }
    post.updated_at = Utc::now();

    db.put_post(post.clone()).await?;

    sync.schedule(ChangeEvent::PostUpdated(post.clone())).await;
    Ok(post)
}

pub async fn delete(db: &Sender<Db>, sync: &Sender<Sync>, id: PostId) -> Result<(), BlogError> {
    if db.get_post_by_id(id).await?.is_none() {
        return Err(BlogError::PostNotFound(format!("id {id}")));
    }
    db.delete_post(id).await?;

    sync.schedule(ChangeEvent::PostDeleted(id)).await;
    Ok(())
}

pub async fn get_by_slug(db: &Sender<Db>, slug: &str) -> Result<PostEntry, BlogError> {
    db.get_post_by_slug(slug.to_string())
        .await?
        .ok_or_else(|| BlogError::PostNotFound(format!("slug '{slug}'")))
}

pub async fn get_by_id(db: &Sender<Db>, id: PostId) -> Result<PostEntry, BlogError> {
    db.get_post_by_id(id)
        .await?
        .ok_or_else(|| BlogError::PostNotFound(format!("id {id}")))
}
