/*
 * Copyright 2025-present ScyllaDB
 * SPDX-License-Identifier: LicenseRef-ScyllaDB-Source-Available-1.0
 */

use crate::db_mock;
use crate::db_mock::DbMock;
use crate::httpclient::HttpClient;
use crate::search_mock;
use crate::search_mock::SearchMock;
use blog_search::httpserver::HttpServer;
use blog_search::search::PostDoc;
use blog_search::search::SearchIndex;
use blog_search::sync::SyncConfig;
use blog_search::PostId;
use blog_search::PostRecord;
use blog_search::StorageUrl;
use blog_search::UserId;
use reqwest::StatusCode;
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task;
use tokio::time;

struct TestApp {
    client: HttpClient,
    db: DbMock,
    search: SearchMock,
    search_tx: mpsc::Sender<SearchIndex>,
    _server_actor: mpsc::Sender<HttpServer>,
}

async fn start() -> TestApp {
    crate::enable_tracing();

    let (db_actor, db) = db_mock::new();
    let (search_actor, search) = search_mock::new();
    let search_tx = search_actor.clone();

    let (server_actor, addr) = blog_search::run(
        SocketAddr::from(([127, 0, 0, 1], 0)).into(),
        StorageUrl::from("/storage".to_string()),
        db_actor,
        search_actor,
        SyncConfig {
            max_attempts: 3,
            retry_delay: Duration::from_millis(10),
        },
    )
    .await
    .unwrap();

    TestApp {
        client: HttpClient::new(addr),
        db,
        search,
        search_tx,
        _server_actor: server_actor,
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    time::timeout(Duration::from_secs(10), async {
        while !condition() {
            task::yield_now().await;
        }
    })
    .await
    .expect("index did not converge in time");
}

const AUTHOR: UserId = UserId(11);

fn post_body(name: &str, category_id: blog_search::CategoryId, published: bool) -> serde_json::Value {
    json!({
        "name": name,
        "description": format!("all about {name}"),
        "category_id": category_id,
        "user_id": AUTHOR,
        "is_published": published,
    })
}

#[tokio::test]
async fn created_post_becomes_searchable() {
    let app = start().await;
    app.db.add_user(AUTHOR, "Ann Author");
    let category = app.client.create_category_ok("Tech").await;
    assert_eq!(category.slug, "tech");

    let response = app
        .client
        .create_post(&json!({
            "name": "Web Development & Design",
            "description": "all about the web",
            "category_id": category.id,
            "user_id": AUTHOR,
            "is_published": true,
            "image": "posts/web.png",
        }))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let post: PostRecord = response.json().await.unwrap();
    assert_eq!(post.slug, "web-development-design");

    wait_until(|| app.search.doc(post.id).is_some()).await;

    // the document is exactly the mapper's projection of the post
    let doc = app.search.doc(post.id).unwrap();
    assert_eq!(
        doc,
        PostDoc::new(&post, Some("Tech".to_string()), Some("Ann Author".to_string()))
    );

    let page = app.client.blog(&[]).await;
    assert_eq!(page.total, 1);
    let view = &page.posts[0];
    assert_eq!(view.id, post.id);
    assert_eq!(view.category_name.as_deref(), Some("Tech"));
    assert_eq!(view.user_name.as_deref(), Some("Ann Author"));
    assert_eq!(view.image_url.as_deref(), Some("/storage/posts/web.png"));

    // the slug page is served from the relational store
    let shown = app.client.blog_post("web-development-design").await;
    assert_eq!(shown.status(), StatusCode::OK);
}

#[tokio::test]
async fn unpublished_posts_never_surface() {
    let app = start().await;
    let category = app.client.create_category_ok("Tech").await;

    let draft = app
        .client
        .create_post(&post_body("A draft", category.id, false))
        .await;
    let draft: PostRecord = draft.json().await.unwrap();
    let published = app
        .client
        .create_post(&post_body("Published news", category.id, true))
        .await;
    let published: PostRecord = published.json().await.unwrap();

    // both are indexed, only the published one is searchable
    wait_until(|| app.search.len() == 2).await;

    let page = app.client.blog(&[]).await;
    assert_eq!(page.total, 1);
    assert_eq!(page.posts[0].id, published.id);

    let filtered = app
        .client
        .blog(&[("search", "draft".to_string())])
        .await;
    assert_eq!(filtered.total, 0);
    assert!(!filtered.posts.iter().any(|post| post.id == draft.id));
}

#[tokio::test]
async fn pagination_and_links() {
    let app = start().await;
    let category = app.client.create_category_ok("Tech").await;

    for i in 0..20 {
        let response = app
            .client
            .create_post(&post_body(&format!("Post number {i}"), category.id, true))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }
    wait_until(|| app.search.len() == 20).await;

    let page = app
        .client
        .blog(&[("page", "2".to_string()), ("per_page", "9".to_string())])
        .await;
    assert_eq!(page.posts.len(), 9);
    assert_eq!(page.total, 20);
    assert_eq!(page.page, 2);
    assert_eq!(page.per_page, 9);
    assert_eq!(page.last_page, 3);

    let next = page.next_page_url.as_deref().unwrap();
    assert!(next.contains("page=3"), "unexpected link {next}");
    assert!(next.contains("per_page=9"), "unexpected link {next}");
    let prev = page.prev_page_url.as_deref().unwrap();
    assert!(prev.contains("page=1"), "unexpected link {prev}");

    let last = app
        .client
        .blog(&[("page", "3".to_string()), ("per_page", "9".to_string())])
        .await;
    assert_eq!(last.posts.len(), 2);
    assert_eq!(last.next_page_url, None);

    // filters survive in the links
    let filtered = app
        .client
        .blog(&[
            ("per_page", "9".to_string()),
            ("category_id", category.id.to_string()),
            ("search", "number".to_string()),
        ])
        .await;
    let next = filtered.next_page_url.as_deref().unwrap();
    assert!(next.contains(&format!("category_id={}", category.id)), "unexpected link {next}");
    assert!(next.contains("search=number"), "unexpected link {next}");
}

#[tokio::test]
async fn category_filter_and_free_text() {
    let app = start().await;
    let tech = app.client.create_category_ok("Tech").await;
    let sports = app.client.create_category_ok("Sports").await;

    let rust_post: PostRecord = app
        .client
        .create_post(&post_body("Rust ownership explained", tech.id, true))
        .await
        .json()
        .await
        .unwrap();
    app.client
        .create_post(&post_body("Football season recap", sports.id, true))
        .await;
    wait_until(|| app.search.len() == 2).await;

    let tech_page = app
        .client
        .blog(&[("category_id", tech.id.to_string())])
        .await;
    assert_eq!(tech_page.total, 1);
    assert!(tech_page.posts.iter().all(|post| post.category_id == tech.id));

    let found = app
        .client
        .blog(&[("search", "ownership".to_string())])
        .await;
    assert_eq!(found.total, 1);
    assert_eq!(found.posts[0].id, rust_post.id);

    // a query with no matches is an empty page, not an error
    let empty = app
        .client
        .blog(&[("search", "no such words anywhere".to_string())])
        .await;
    assert_eq!(empty.total, 0);
    assert!(empty.posts.is_empty());
}

#[tokio::test]
async fn category_rename_cascades_to_documents() {
    let app = start().await;
    let category = app.client.create_category_ok("Old").await;

    let mut ids = Vec::new();
    for i in 0..3 {
        let post: PostRecord = app
            .client
            .create_post(&post_body(&format!("Cascade target {i}"), category.id, true))
            .await
            .json()
            .await
            .unwrap();
        ids.push(post.id);
    }
    wait_until(|| app.search.len() == 3).await;

    let response = app.client.update_category(category.id, "New").await;
    assert_eq!(response.status(), StatusCode::OK);
    wait_until(|| {
        ids.iter().all(|id| {
            app.search
                .doc(*id)
                .is_some_and(|doc| doc.category_name.as_deref() == Some("New"))
        })
    })
    .await;

    // one failing document does not hold back its siblings
    app.search.fail_updates_for(ids[0]);
    let response = app.client.update_category(category.id, "Newer").await;
    assert_eq!(response.status(), StatusCode::OK);
    wait_until(|| {
        ids[1..].iter().all(|id| {
            app.search
                .doc(*id)
                .is_some_and(|doc| doc.category_name.as_deref() == Some("Newer"))
        })
    })
    .await;
    assert_eq!(
        app.search.doc(ids[0]).unwrap().category_name.as_deref(),
        Some("New")
    );
}

#[tokio::test]
async fn deleted_post_leaves_the_index() {
    let app = start().await;
    let category = app.client.create_category_ok("Tech").await;

    let post: PostRecord = app
        .client
        .create_post(&post_body("Short lived", category.id, true))
        .await
        .json()
        .await
        .unwrap();
    wait_until(|| app.search.doc(post.id).is_some()).await;

    let response = app.client.delete_post(post.id).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    wait_until(|| app.search.doc(post.id).is_none()).await;
    assert!(app.db.post(post.id).is_none());

    // deleting a document that is already gone reports failure, the index
    // treats it as an anomaly rather than an idempotent success
    let (tx, rx) = oneshot::channel();
    app.search_tx
        .send(SearchIndex::DeletePost { id: post.id, tx })
        .await
        .unwrap();
    assert!(!rx.await.unwrap());
}

#[tokio::test]
async fn recreate_rebuilds_from_the_store() {
    let app = start().await;

    // an empty table rebuilds into an empty, queryable index
    let response = app.client.recreate_index(true).await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = app.client.blog(&[]).await;
    assert_eq!(page.total, 0);

    let category = app.client.create_category_ok("Tech").await;
    for i in 0..3 {
        app.client
            .create_post(&post_body(&format!("Survivor {i}"), category.id, true))
            .await;
    }
    wait_until(|| app.search.len() == 3).await;

    // drifted documents come back from the source of truth
    app.search.clear_docs();
    let response = app.client.recreate_index(true).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.search.len(), 3);

    // the queued flavor converges too
    app.search.clear_docs();
    let response = app.client.recreate_index(false).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    wait_until(|| app.search.len() == 3).await;

    let response = app.client.refresh_index().await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn repeated_update_converges_to_one_document() {
    let app = start().await;
    let category = app.client.create_category_ok("Tech").await;

    let post: PostRecord = app
        .client
        .create_post(&post_body("Hello World", category.id, true))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(post.slug, "hello-world");
    wait_until(|| app.search.doc(post.id).is_some()).await;

    let body = json!({
        "name": "Hello World",
        "description": "updated description",
        "category_id": category.id,
    });
    for _ in 0..2 {
        let response = app.client.update_post(post.id, &body).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    wait_until(|| {
        app.search
            .doc(post.id)
            .is_some_and(|doc| doc.description == "updated description")
    })
    .await;
    // same id, same content, no duplicates
    assert_eq!(app.search.len(), 1);
    let doc = app.search.doc(post.id).unwrap();
    assert_eq!(doc.slug, "hello-world");
    assert!(doc.is_published, "update without the flag keeps the old value");

    // the slug follows a rename
    let response = app
        .client
        .update_post(
            post.id,
            &json!({
                "name": "Hello Rust",
                "description": "updated description",
                "category_id": category.id,
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let renamed: PostRecord = response.json().await.unwrap();
    assert_eq!(renamed.slug, "hello-rust");
    wait_until(|| {
        app.search
            .doc(post.id)
            .is_some_and(|doc| doc.slug == "hello-rust")
    })
    .await;
}

#[tokio::test]
async fn not_found_and_validation_mapping() {
    let app = start().await;
    let category = app.client.create_category_ok("Tech").await;

    let missing = PostId(999);
    assert_eq!(
        app.client.blog_post("no-such-slug").await.status(),
        StatusCode::NOT_FOUND
    );
    let body = json!({
        "name": "x",
        "description": "y",
        "category_id": category.id,
    });
    assert_eq!(
        app.client.update_post(missing, &body).await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        app.client.delete_post(missing).await.status(),
        StatusCode::NOT_FOUND
    );

    // creation failures carry a 422 and the cause
    let unknown_category = app
        .client
        .create_post(&json!({
            "name": "x",
            "description": "y",
            "category_id": 999,
            "user_id": AUTHOR,
        }))
        .await;
    assert_eq!(unknown_category.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let empty_name = app
        .client
        .create_post(&json!({
            "name": "   ",
            "description": "y",
            "category_id": category.id,
            "user_id": AUTHOR,
        }))
        .await;
    assert_eq!(empty_name.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // category rules: unique names, no deletion while posts reference it
    assert_eq!(
        app.client.create_category("Tech").await.status(),
        StatusCode::UNPROCESSABLE_ENTITY
    );
    assert_eq!(
        app.client.update_category(999.into(), "Other").await.status(),
        StatusCode::NOT_FOUND
    );

    let post: PostRecord = app
        .client
        .create_post(&post_body("Guarded", category.id, true))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(
        app.client.delete_category(category.id).await.status(),
        StatusCode::CONFLICT
    );
    app.client.delete_post(post.id).await;
    assert_eq!(
        app.client.delete_category(category.id).await.status(),
        StatusCode::NO_CONTENT
    );
}
