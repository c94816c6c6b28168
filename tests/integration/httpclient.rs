/*
 * Copyright 2025-present ScyllaDB
 * SPDX-License-Identifier: LicenseRef-ScyllaDB-Source-Available-1.0
 */

use blog_search::query::PostPage;
use blog_search::CategoryId;
use blog_search::CategoryRecord;
use blog_search::PostId;
use reqwest::Client;
use reqwest::Response;
use reqwest::StatusCode;
use std::net::SocketAddr;

pub(crate) struct HttpClient {
    client: Client,
    url_api: String,
}

impl HttpClient {
    pub(crate) fn new(addr: SocketAddr) -> Self {
        Self {
            url_api: format!("http://{addr}/api/v1"),
            client: Client::new(),
        }
    }

    pub(crate) async fn blog(&self, query: &[(&str, String)]) -> PostPage {
        self.client
            .get(format!("{}/blog", self.url_api))
            .query(query)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    pub(crate) async fn blog_post(&self, slug: &str) -> Response {
        self.client
            .get(format!("{}/blog/{slug}", self.url_api))
            .send()
            .await
            .unwrap()
    }

    pub(crate) async fn create_post(&self, body: &serde_json::Value) -> Response {
        self.client
            .post(format!("{}/posts", self.url_api))
            .json(body)
            .send()
            .await
            .unwrap()
    }

    pub(crate) async fn update_post(&self, id: PostId, body: &serde_json::Value) -> Response {
        self.client
            .put(format!("{}/posts/{id}", self.url_api))
            .json(body)
            .send()
            .await
            .unwrap()
    }

    pub(crate) async fn delete_post(&self, id: PostId) -> Response {
        self.client
            .delete(format!("{}/posts/{id}", self.url_api))
            .send()
            .await
            .unwrap()
    }

    pub(crate) async fn create_category(&self, name: &str) -> Response {
        self.client
            .post(format!("{}/categories", self.url_api))
            .json(&serde_json::json!({"name": name}))
            .send()
            .await
            .unwrap()
    }

    pub(crate) async fn create_category_ok(&self, name: &str) -> CategoryRecord {
        let response = self.create_category(name).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        response.json().await.unwrap()
    }

    pub(crate) async fn update_category(&self, id: CategoryId, name: &str) -> Response {
        self.client
            .put(format!("{}/categories/{id}", self.url_api))
            .json(&serde_json::json!({"name": name}))
            .send()
            .await
            .unwrap()
    }

    pub(crate) async fn delete_category(&self, id: CategoryId) -> Response {
        self.client
            .delete(format!("{}/categories/{id}", self.url_api))
            .send()
            .await
            .unwrap()
    }

    pub(crate) async fn recreate_index(&self, sync: bool) -> Response {
        self.client
            .post(format!("{}/index/recreate", self.url_api))
            .query(&[("sync", sync.to_string())])
            .send()
            .await
            .unwrap()
    }

    pub(crate) async fn refresh_index(&self) -> Response {
        self.client
            .post(format!("{}/index/refresh", self.url_api))
            .send()
            .await
            .unwrap()
    }
}
