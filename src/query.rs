/*
 * Copyright 2025-present ScyllaDB
 * SPDX-License-Identifier: LicenseRef-ScyllaDB-Source-Available-1.0
 */

//! Read-only search façade. Everything served here comes from the index, the
//! relational store is never touched; the price is eventual consistency and
//! the reward is that a broken index degrades to an empty page, not an error.

use crate::search::PostDoc;
use crate::search::SearchFilters;
use crate::search::SearchIndex;
use crate::search::SearchIndexExt;
use crate::CategoryId;
use crate::PostEntry;
use crate::PostId;
use crate::StorageUrl;
use crate::UserId;
use chrono::DateTime;
use chrono::Utc;
use tokio::sync::mpsc::Sender;
use url::form_urlencoded;

#[derive(Clone, Debug, serde::Deserialize, utoipa::IntoParams)]
pub struct GetPostsParams {
    pub category_id: Option<CategoryId>,
    pub search: Option<String>,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_per_page")]
    pub per_page: usize,
}

fn default_page() -> usize {
    1
}

fn default_per_page() -> usize {
    9
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
/// Read model of a post as served to clients, denormalized names included
pub struct PostView {
    pub id: PostId,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub category_id: CategoryId,
    pub category_name: Option<String>,
    pub user_id: UserId,
    pub user_name: Option<String>,
    pub is_published: bool,
    pub image: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PostView {
    pub fn from_doc(doc: PostDoc, storage: &StorageUrl) -> Self {
        Self {
            image_url: doc.image.as_deref().map(|key| storage.resolve(key)),
            id: doc.id,
            name: doc.name,
            slug: doc.slug,
            description: doc.description,
            category_id: doc.category_id,
            category_name: doc.category_name,
            user_id: doc.user_id,
            user_name: doc.user_name,
            is_published: doc.is_published,
            image: doc.image,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        }
    }

    pub fn from_entry(entry: PostEntry, storage: &StorageUrl) -> Self {
        Self::from_doc(
            PostDoc::new(&entry.post, entry.category_name, entry.user_name),
            storage,
        )
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct PostPage {
    pub posts: Vec<PostView>,
    pub total: u64,
    pub page: usize,
    pub per_page: usize,
    pub last_page: usize,
    pub next_page_url: Option<String>,
    pub prev_page_url: Option<String>,
}

pub async fn get_posts(
    search: &Sender<SearchIndex>,
    storage: &StorageUrl,
    path: &str,
    params: GetPostsParams,
) -> PostPage {
    let page = params.page.max(1);
    let per_page = params.per_page.max(1);
    let from = (page - 1) * per_page;

    let filters = SearchFilters {
        category_id: params.category_id,
        search: params.search.clone(),
    };
    let hits = search.search_posts(filters, from, per_page).await;

    let posts = hits
        .hits
        .into_iter()
        .map(|doc| PostView::from_doc(doc, storage))
        .collect();
    let last_page = (hits.total as usize).div_ceil(per_page).max(1);

    PostPage {
        next_page_url: (page < last_page).then(|| page_url(path, &params, page + 1)),
        prev_page_url: (page > 1).then(|| page_url(path, &params, page - 1)),
        posts,
        total: hits.total,
        page,
        per_page,
        last_page,
    }
}

/// Link to another page of the same result set, original filters preserved.
fn page_url(path: &str, params: &GetPostsParams, page: usize) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    query.append_pair("page", &page.to_string());
    query.append_pair("per_page", &params.per_page.max(1).to_string());
    if let Some(category_id) = params.category_id {
        query.append_pair("category_id", &category_id.to_string());
    }
    if let Some(search) = params.search.as_deref() {
        if !search.is_empty() {
            query.append_pair("search", search);
        }
    }
    format!("{path}?{}", query.finish())
}
