/*
 * Copyright 2025-present ScyllaDB
 * SPDX-License-Identifier: LicenseRef-ScyllaDB-Source-Available-1.0
 */

use crate::search::actor::SearchFilters;
use crate::search::actor::SearchHits;
use crate::search::actor::SearchIndex;
use crate::search::doc::PostDoc;
use crate::IndexName;
use crate::PostId;
use opensearch::auth::Credentials;
use opensearch::http::request::JsonBody;
use opensearch::http::response::Response;
use opensearch::http::transport::SingleNodeConnectionPool;
use opensearch::http::transport::TransportBuilder;
use opensearch::http::StatusCode;
use opensearch::http::Url;
use opensearch::indices::IndicesCreateParts;
use opensearch::indices::IndicesDeleteParts;
use opensearch::indices::IndicesExistsParts;
use opensearch::indices::IndicesRefreshParts;
use opensearch::BulkParts;
use opensearch::DeleteParts;
use opensearch::IndexParts;
use opensearch::OpenSearch;
use opensearch::SearchParts;
use opensearch::UpdateParts;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Semaphore;
use tracing::debug;
use tracing::debug_span;
use tracing::error;
use tracing::trace;
use tracing::warn;
use tracing::Instrument;

#[derive(Clone)]
pub struct SearchConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    pub index: IndexName,
}

pub fn new(config: SearchConfig) -> anyhow::Result<mpsc::Sender<SearchIndex>> {
    let client = Arc::new(create_client(&config)?);
    let index = Arc::new(config.index);

    const CHANNEL_SIZE: usize = 10;
    let (tx, mut rx) = mpsc::channel(CHANNEL_SIZE);

    tokio::spawn({
        let span_index = index.clone();
        async move {
            debug!("starting");

            // The transport keeps a single connection to the backend, so only
            // a couple of requests are allowed in flight, the rest waits in
            // the channel.
            let semaphore = Arc::new(Semaphore::new(2));

            while let Some(msg) = rx.recv().await {
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };
                tokio::spawn({
                    let index = Arc::clone(&index);
                    let client = Arc::clone(&client);
                    async move {
                        process(msg, &index, &client).await;
                        drop(permit);
                    }
                });
            }

            debug!("finished");
        }
        .instrument(debug_span!("search-index", "{span_index}"))
    });

    Ok(tx)
}

fn create_client(config: &SearchConfig) -> anyhow::Result<OpenSearch> {
    let address = Url::parse(&config.url)?;
    let conn_pool = SingleNodeConnectionPool::new(address);
    let transport = TransportBuilder::new(conn_pool)
        .auth(Credentials::Basic(
            config.username.clone(),
            config.password.clone(),
        ))
        .disable_proxy()
        .build()?;
    Ok(OpenSearch::new(transport))
}

async fn process(msg: SearchIndex, index: &IndexName, client: &OpenSearch) {
    match msg {
        SearchIndex::CreateIndex { tx } => reply(tx, create_index(index, client).await),
        SearchIndex::DeleteIndex { tx } => reply(tx, delete_index(index, client).await),
        SearchIndex::IndexExists { tx } => reply(tx, index_exists(index, client).await),
        SearchIndex::RefreshIndex { tx } => reply(tx, refresh_index(index, client).await),
        SearchIndex::IndexPost { doc, tx } => reply(tx, index_post(index, client, &doc).await),
        SearchIndex::UpdatePost { doc, tx } => reply(tx, update_post(index, client, &doc).await),
        SearchIndex::DeletePost { id, tx } => reply(tx, delete_post(index, client, id).await),
        SearchIndex::BulkIndexPosts { docs, tx } => {
            reply(tx, bulk_index_posts(index, client, &docs).await)
        }
        SearchIndex::SearchPosts {
            filters,
            from,
            size,
            tx,
        } => reply(tx, search_posts(index, client, &filters, from, size).await),
    }
}

fn reply<T>(tx: tokio::sync::oneshot::Sender<T>, value: T) {
    if tx.send(value).is_err() {
        trace!("process: response receiver dropped");
    }
}

async fn body_of(
    response: Result<Response, opensearch::Error>,
) -> Result<serde_json::Value, opensearch::Error> {
    response?.json::<serde_json::Value>().await
}

async fn create_index(index: &IndexName, client: &OpenSearch) -> bool {
    if index_exists(index, client).await && !delete_index(index, client).await {
        return false;
    }

    let response = client
        .indices()
        .create(IndicesCreateParts::Index(index.0.as_str()))
        .body(index_template())
        .send()
        .await;
    match body_of(response).await {
        Ok(body) => body["acknowledged"].as_bool().unwrap_or(false),
        Err(err) => {
            error!("create_index: unable to create index {index}: {err}");
            false
        }
    }
}

async fn delete_index(index: &IndexName, client: &OpenSearch) -> bool {
    if !index_exists(index, client).await {
        return true;
    }

    let response = client
        .indices()
        .delete(IndicesDeleteParts::Index(&[index.0.as_str()]))
        .send()
        .await;
    match body_of(response).await {
        Ok(body) => body["acknowledged"].as_bool().unwrap_or(false),
        Err(err) => {
            error!("delete_index: unable to delete index {index}: {err}");
            false
        }
    }
}

async fn index_exists(index: &IndexName, client: &OpenSearch) -> bool {
    let response = client
        .indices()
        .exists(IndicesExistsParts::Index(&[index.0.as_str()]))
        .send()
        .await;
    match response {
        Ok(response) => response.status_code() == StatusCode::OK,
        Err(err) => {
            error!("index_exists: unable to check index {index}: {err}");
            false
        }
    }
}

async fn refresh_index(index: &IndexName, client: &OpenSearch) -> bool {
    let response = client
        .indices()
        .refresh(IndicesRefreshParts::Index(&[index.0.as_str()]))
        .send()
        .await;
    match response.and_then(Response::error_for_status_code) {
        Ok(_) => true,
        Err(err) => {
            error!("refresh_index: unable to refresh index {index}: {err}");
            false
        }
    }
}

async fn index_post(index: &IndexName, client: &OpenSearch, doc: &PostDoc) -> bool {
    let response = client
        .index(IndexParts::IndexId(index.0.as_str(), &doc.id.to_string()))
        .body(doc)
        .send()
        .await;
    match body_of(response).await {
        Ok(body) => matches!(body["result"].as_str(), Some("created" | "updated")),
        Err(err) => {
            error!("index_post: unable to index post {}: {err}", doc.id);
            false
        }
    }
}

async fn update_post(index: &IndexName, client: &OpenSearch, doc: &PostDoc) -> bool {
    let response = client
        .update(UpdateParts::IndexId(index.0.as_str(), &doc.id.to_string()))
        .body(json!({
            "doc": doc,
            "doc_as_upsert": true,
        }))
        .send()
        .await;
    match body_of(response).await {
        Ok(body) => matches!(body["result"].as_str(), Some("updated" | "created" | "noop")),
        Err(err) => {
            error!("update_post: unable to update post {}: {err}", doc.id);
            false
        }
    }
}

async fn delete_post(index: &IndexName, client: &OpenSearch, id: PostId) -> bool {
    let response = client
        .delete(DeleteParts::IndexId(index.0.as_str(), &id.to_string()))
        .send()
        .await;
    match body_of(response).await {
        Ok(body) => body["result"].as_str() == Some("deleted"),
        Err(err) => {
            error!("delete_post: unable to delete post {id}: {err}");
            false
        }
    }
}

async fn bulk_index_posts(index: &IndexName, client: &OpenSearch, docs: &[PostDoc]) -> bool {
    let mut body: Vec<JsonBody<serde_json::Value>> = Vec::with_capacity(docs.len() * 2);
    for doc in docs {
        body.push(json!({"index": {"_index": index.0.as_str(), "_id": doc.id.to_string()}}).into());
        match serde_json::to_value(doc) {
            Ok(value) => body.push(value.into()),
            Err(err) => {
                error!("bulk_index_posts: unable to serialize post {}: {err}", doc.id);
                return false;
            }
        }
    }
    if body.is_empty() {
        return true;
    }

    let response = client
        .bulk(BulkParts::Index(index.0.as_str()))
        .body(body)
        .send()
        .await;
    match body_of(response).await {
        Ok(body) => !body["errors"].as_bool().unwrap_or(false),
        Err(err) => {
            error!("bulk_index_posts: unable to bulk index {} posts: {err}", docs.len());
            false
        }
    }
}

async fn search_posts(
    index: &IndexName,
    client: &OpenSearch,
    filters: &SearchFilters,
    from: usize,
    size: usize,
) -> SearchHits {
    let response = client
        .search(SearchParts::Index(&[index.0.as_str()]))
        .body(search_body(filters, from, size))
        .send()
        .await;
    let body = match body_of(response).await {
        Ok(body) => body,
        Err(err) => {
            error!("search_posts: search request failed: {err}");
            return SearchHits::default();
        }
    };

    let hits = body["hits"]["hits"]
        .as_array()
        .map(|hits| {
            hits.iter()
                .filter_map(|hit| {
                    serde_json::from_value::<PostDoc>(hit["_source"].clone())
                        .inspect_err(|err| warn!("search_posts: malformed document: {err}"))
                        .ok()
                })
                .collect()
        })
        .unwrap_or_default();
    let total = body["hits"]["total"]["value"].as_u64().unwrap_or(0);
    SearchHits { hits, total }
}

/// Query restricted to published posts, optionally narrowed by category and a
/// weighted multi-field text match, newest first.
fn search_body(filters: &SearchFilters, from: usize, size: usize) -> serde_json::Value {
    let mut must = vec![json!({"term": {"is_published": true}})];

    if let Some(category_id) = filters.category_id {
        must.push(json!({"term": {"category_id": category_id}}));
    }

    if let Some(search) = filters.search.as_deref() {
        if !search.is_empty() {
            must.push(json!({
                "multi_match": {
                    "query": search,
                    "fields": ["name^2", "description", "category_name"],
                }
            }));
        }
    }

    json!({
        "query": {"bool": {"must": must}},
        "sort": [{"created_at": {"order": "desc"}}],
        "from": from,
        "size": size,
    })
}

fn index_template() -> serde_json::Value {
    json!({
        "mappings": {
            "properties": {
                "id": {"type": "integer"},
                "name": {
                    "type": "text",
                    "analyzer": "standard",
                    "fields": {
                        "keyword": {"type": "keyword"}
                    }
                },
                "slug": {"type": "keyword"},
                "description": {
                    "type": "text",
                    "analyzer": "standard"
                },
                "category_id": {"type": "integer"},
                "category_name": {
                    "type": "text",
                    "fields": {
                        "keyword": {"type": "keyword"}
                    }
                },
                "user_id": {"type": "integer"},
                "user_name": {
                    "type": "text",
                    "fields": {
                        "keyword": {"type": "keyword"}
                    }
                },
                "is_published": {"type": "boolean"},
                "image": {"type": "keyword"},
                "created_at": {"type": "date"},
                "updated_at": {"type": "date"},
            }
        },
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 0,
            "analysis": {
                "analyzer": {
                    "standard": {
                        "type": "standard",
                        "stopwords": "_english_"
                    }
                }
            }
        }
    })
}
