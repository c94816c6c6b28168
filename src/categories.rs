/*
 * Copyright 2025-present ScyllaDB
 * SPDX-License-Identifier: LicenseRef-ScyllaDB-Source-Available-1.0
 */

//! Category mutations. Renames fan out to every post of the category through
//! a single CategoryUpdated event; deletion is refused while posts still
//! reference the category.

use crate::db::Db;
use crate::db::DbExt;
use crate::slug::slugify;
use crate::sync::ChangeEvent;
use crate::sync::Sync;
use crate::sync::SyncExt;
use crate::BlogError;
use crate::CategoryId;
use crate::CategoryRecord;
use tokio::sync::mpsc::Sender;

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct CategoryInput {
    pub name: String,
}

pub async fn create(db: &Sender<Db>, req: CategoryInput) -> Result<CategoryRecord, BlogError> {
    if req.name.trim().is_empty() {
        return Err(BlogError::CategoryCreation(
            "name must not be empty".to_string(),
        ));
    }
    if db.category_name_taken(req.name.clone(), None).await? {
        return Err(BlogError::CategoryCreation(format!(
            "name '{}' is already in use",
            req.name
        )));
    }

    let id: CategoryId = db.next_category_id().await?.into();
    let category = CategoryRecord {
        id,
        slug: slugify(&req.name),
        name: req.name,
    };
    db.put_category(category.clone())
        .await
        .map_err(|err| BlogError::CategoryCreation(err.to_string()))?;
    Ok(category)
}

pub async fn update(
    db: &Sender<Db>,
    sync: &Sender<Sync>,
    id: CategoryId,
    req: CategoryInput,
) -> Result<CategoryRecord, BlogError> {
    let Some(mut category) = db.get_category(id).await? else {
        return Err(BlogError::CategoryNotFound(format!("id {id}")));
    };
    if req.name.trim().is_empty() {
        return Err(BlogError::CategoryCreation(
            "name must not be empty".to_string(),
        ));
    }
    if db.category_name_taken(req.name.clone(), Some(id)).await? {
        return Err(BlogError::CategoryCreation(format!(
            "name '{}' is already in use",
            req.name
        )));
    }

    category.slug = slugify(&req.name);
    category.name = req.name;
    db.put_category(category.clone())
        .await
        .map_err(|err| BlogError::CategoryCreation(err.to_string()))?;

    sync.schedule(ChangeEvent::CategoryUpdated(category.clone()))
        .await;
    Ok(category)
}

pub async fn delete(db: &Sender<Db>, id: CategoryId) -> Result<(), BlogError> {
    if db.get_category(id).await?.is_none() {
        return Err(BlogError::CategoryNotFound(format!("id {id}")));
    }
    if db.category_has_posts(id).await? {
        return Err(BlogError::CategoryInUse(id));
    }
    db.delete_category(id).await?;
    Ok(())
}

pub async fn list(db: &Sender<Db>) -> Result<Vec<CategoryRecord>, BlogError> {
    Ok(db.get_categories().await?)
}
