/*
 * Copyright 2025-present ScyllaDB
 * SPDX-License-Identifier: LicenseRef-ScyllaDB-Source-Available-1.0
 */

pub mod categories;
pub mod db;
mod httproutes;
pub mod httpserver;
pub mod posts;
pub mod query;
pub mod search;
pub mod slug;
pub mod sync;

use crate::db::Db;
use crate::httproutes::AppState;
use crate::search::SearchIndex;
use crate::sync::SyncConfig;
use chrono::DateTime;
use chrono::Utc;
use scylla::cluster::metadata::ColumnType;
use scylla::cluster::metadata::NativeType;
use scylla::serialize::value::SerializeValue;
use scylla::serialize::writers::CellWriter;
use scylla::serialize::writers::WrittenCellProof;
use scylla::serialize::SerializationError;
use std::net::SocketAddr;
use tokio::signal;
use tokio::sync::mpsc;

#[derive(Clone, derive_more::From, derive_more::Display)]
pub struct ScyllaDbUri(pub String);

#[derive(Clone, derive_more::From, derive_more::Display)]
/// Keyspace holding the posts/categories/users tables
pub struct KeyspaceName(pub String);

#[derive(Clone, Debug, derive_more::From, derive_more::Display)]
/// Name of the search index all post documents live in
pub struct IndexName(pub String);

#[derive(Clone, derive_more::From, derive_more::Display)]
/// Public base URL stored image keys are resolved against
pub struct StorageUrl(pub String);

impl StorageUrl {
    pub fn resolve(&self, key: &str) -> String {
        format!("{}/{key}", self.0.trim_end_matches('/'))
    }
}

#[derive(derive_more::From)]
pub struct HttpServerAddr(pub SocketAddr);

#[derive(
    Copy,
    Clone,
    Hash,
    Eq,
    PartialEq,
    Debug,
    serde::Serialize,
    serde::Deserialize,
    derive_more::From,
    derive_more::Display,
    utoipa::ToSchema,
)]
/// Post identifier, doubles as the search document id
pub struct PostId(pub i32);

impl SerializeValue for PostId {
    fn serialize<'b>(
        &self,
        typ: &ColumnType,
        writer: CellWriter<'b>,
    ) -> Result<WrittenCellProof<'b>, SerializationError> {
        serialize_int(self.0, typ, writer)
    }
}

#[derive(
    Copy,
    Clone,
    Hash,
    Eq,
    PartialEq,
    Debug,
    serde::Serialize,
    serde::Deserialize,
    derive_more::From,
    derive_more::Display,
    utoipa::ToSchema,
)]
pub struct CategoryId(pub i32);

impl SerializeValue for CategoryId {
    fn serialize<'b>(
        &self,
        typ: &ColumnType,
        writer: CellWriter<'b>,
    ) -> Result<WrittenCellProof<'b>, SerializationError> {
        serialize_int(self.0, typ, writer)
    }
}

#[derive(
    Copy,
    Clone,
    Hash,
    Eq,
    PartialEq,
    Debug,
    serde::Serialize,
    serde::Deserialize,
    derive_more::From,
    derive_more::Display,
    utoipa::ToSchema,
)]
pub struct UserId(pub i32);

impl SerializeValue for UserId {
    fn serialize<'b>(
        &self,
        typ: &ColumnType,
        writer: CellWriter<'b>,
    ) -> Result<WrittenCellProof<'b>, SerializationError> {
        serialize_int(self.0, typ, writer)
    }
}

fn serialize_int<'b>(
    value: i32,
    typ: &ColumnType,
    writer: CellWriter<'b>,
) -> Result<WrittenCellProof<'b>, SerializationError> {
    use {
        scylla::serialize::value::{
            BuiltinSerializationError, BuiltinSerializationErrorKind, BuiltinTypeCheckError,
            BuiltinTypeCheckErrorKind,
        },
        std::any,
    };

    match typ {
        ColumnType::Native(NativeType::Int) => {
            writer.set_value(value.to_be_bytes().as_slice()).map_err(|_| {
                SerializationError::new(BuiltinSerializationError {
                    rust_name: any::type_name::<i32>(),
                    got: typ.clone().into_owned(),
                    kind: BuiltinSerializationErrorKind::ValueOverflow,
                })
            })
        }
        _ => Err(SerializationError::new(BuiltinTypeCheckError {
            rust_name: any::type_name::<i32>(),
            got: typ.clone().into_owned(),
            kind: BuiltinTypeCheckErrorKind::MismatchedType {
                expected: &[ColumnType::Native(NativeType::Int)],
            },
        })),
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
/// A post row as stored in the relational store
pub struct PostRecord {
    pub id: PostId,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub image: Option<String>,
    pub category_id: CategoryId,
    pub user_id: UserId,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct CategoryRecord {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
}

#[derive(Clone, Debug)]
/// A post with its category and author names already resolved
pub struct PostEntry {
    pub post: PostRecord,
    pub category_name: Option<String>,
    pub user_name: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum BlogError {
    #[error("post not found: {0}")]
    PostNotFound(String),

    #[error("category not found: {0}")]
    CategoryNotFound(String),

    #[error("category {0} still has posts assigned")]
    CategoryInUse(CategoryId),

    #[error("failed to create post: {0}")]
    PostCreation(String),

    #[error("failed to create category: {0}")]
    CategoryCreation(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub async fn run(
    addr: HttpServerAddr,
    storage: StorageUrl,
    db: mpsc::Sender<Db>,
    search: mpsc::Sender<SearchIndex>,
    sync_config: SyncConfig,
) -> anyhow::Result<(mpsc::Sender<httpserver::HttpServer>, SocketAddr)> {
    let sync = sync::new(db.clone(), search.clone(), sync_config);
    httpserver::new(
        addr,
        AppState {
            db,
            search,
            sync,
            storage,
        },
    )
    .await
}

pub async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await
    };
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
