/*
 * Copyright 2025-present ScyllaDB
 * SPDX-License-Identifier: LicenseRef-ScyllaDB-Source-Available-1.0
 */

use anyhow::anyhow;
use anyhow::bail;
use blog_search::db;
use blog_search::search::opensearch;
use blog_search::search::opensearch::SearchConfig;
use blog_search::sync;
use blog_search::sync::SyncConfig;
use blog_search::KeyspaceName;
use blog_search::ScyllaDbUri;
use blog_search::StorageUrl;
use std::net::ToSocketAddrs;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

// The service is IO bound end to end: every slow operation is a database or
// search-engine round trip, so one network thread is enough and background
// work runs as tasks on it.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    _ = dotenvy::dotenv();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?)
        .with(fmt::layer().with_target(false))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("recreate-index") => {
            let inline = args.iter().any(|arg| arg == "--sync");
            recreate_index(inline).await
        }
        Some("refresh-index") => refresh_index().await,
        Some(cmd) => bail!("unknown command: {cmd}"),
        None => serve().await,
    }
}

async fn serve() -> anyhow::Result<ExitCode> {
    let addr = dotenvy::var("BLOG_SEARCH_URI")
        .unwrap_or("127.0.0.1:6080".to_string())
        .to_socket_addrs()?
        .next()
        .ok_or(anyhow!("Unable to parse BLOG_SEARCH_URI env (host:port)"))?
        .into();

    let db_actor = db::new(scylladb_uri(), keyspace()).await?;
    let search_actor = opensearch::new(search_config())?;

    let (_server_actor, addr) = blog_search::run(
        addr,
        storage_url(),
        db_actor,
        search_actor,
        sync_config(),
    )
    .await?;
    tracing::info!("listening on {addr}");
    blog_search::wait_for_shutdown().await;

    Ok(ExitCode::SUCCESS)
}

async fn recreate_index(inline: bool) -> anyhow::Result<ExitCode> {
    let db_actor = db::new(scylladb_uri(), keyspace()).await?;
    let search_actor = opensearch::new(search_config())?;

    let done = if inline {
        sync::run_recreate(&db_actor, &search_actor).await
    } else {
        sync::recreate_queued(db_actor, search_actor, sync_config()).await
    };
    Ok(exit_code(done))
}

async fn refresh_index() -> anyhow::Result<ExitCode> {
    let search_actor = opensearch::new(search_config())?;
    Ok(exit_code(blog_search::search::actor::refresh(&search_actor).await))
}

fn exit_code(done: bool) -> ExitCode {
    if done {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn scylladb_uri() -> ScyllaDbUri {
    dotenvy::var("SCYLLADB_URI")
        .unwrap_or("127.0.0.1:9042".to_string())
        .into()
}

fn keyspace() -> KeyspaceName {
    dotenvy::var("BLOG_KEYSPACE").unwrap_or("blog".to_string()).into()
}

fn search_config() -> SearchConfig {
    let addr = dotenvy::var("OPENSEARCH_ADDRESS").unwrap_or("http://localhost".to_string());
    let port = dotenvy::var("OPENSEARCH_PORT").unwrap_or("9200".to_string());
    SearchConfig {
        url: format!("{addr}:{port}"),
        username: dotenvy::var("OPENSEARCH_USERNAME").unwrap_or("admin".to_string()),
        password: dotenvy::var("OPENSEARCH_PASSWORD").unwrap_or("admin".to_string()),
        index: dotenvy::var("OPENSEARCH_INDEX")
            .unwrap_or("blog_posts".to_string())
            .into(),
    }
}

fn storage_url() -> StorageUrl {
    dotenvy::var("STORAGE_PUBLIC_URL")
        .unwrap_or("/storage".to_string())
        .into()
}

fn sync_config() -> SyncConfig {
    let defaults = SyncConfig::default();
    SyncConfig {
        max_attempts: dotenvy::var("SYNC_MAX_ATTEMPTS")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(defaults.max_attempts),
        retry_delay: dotenvy::var("SYNC_RETRY_DELAY_MS")
            .ok()
            .and_then(|value| value.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry_delay),
    }
}
