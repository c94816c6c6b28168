/*
 * Copyright 2025-present ScyllaDB
 * SPDX-License-Identifier: LicenseRef-ScyllaDB-Source-Available-1.0
 */

use crate::CategoryId;
use crate::PostId;
use crate::PostRecord;
use crate::UserId;
use chrono::DateTime;
use chrono::Utc;

/// The denormalized shape of a post as stored in the search index. The
/// document id equals the post id, which is what makes upserts and deletes
/// idempotent.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct PostDoc {
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
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PostDoc {
    /// Project a post row plus its eagerly resolved category/author names.
    /// Missing references map to null name fields, never to an error.
    pub fn new(post: &PostRecord, category_name: Option<String>, user_name: Option<String>) -> Self {
        Self {
            id: post.id,
            name: post.name.clone(),
            slug: post.slug.clone(),
            description: post.description.clone(),
            category_id: post.category_id,
            category_name,
            user_id: post.user_id,
            user_name,
            is_published: post.is_published,
            image: post.image.clone(),
            created_at: post.created_at,
            updated_at: post.updated_at,
        }
    }
}
