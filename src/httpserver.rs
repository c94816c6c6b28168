/*
 * Copyright 2025-present ScyllaDB
 * SPDX-License-Identifier: LicenseRef-ScyllaDB-Source-Available-1.0
 */

use crate::httproutes;
use crate::httproutes::AppState;
use crate::HttpServerAddr;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::sync::mpsc::Sender;
use tokio::sync::Notify;

pub enum HttpServer {}

pub(crate) async fn new(
    addr: HttpServerAddr,
    state: AppState,
) -> anyhow::Result<(Sender<HttpServer>, SocketAddr)> {
    let listener = TcpListener::bind(addr.0).await?;
    let addr = listener.local_addr()?;

    // minimal size as channel is used as a lifetime guard
    const CHANNEL_SIZE: usize = 1;
    let (tx, mut rx) = mpsc::channel(CHANNEL_SIZE);

    let notify = Arc::new(Notify::new());

    tokio::spawn({
        let notify = Arc::clone(&notify);
        async move {
            while rx.recv().await.is_some() {}
            notify.notify_one();
        }
    });

    tokio::spawn(async move {
        axum::serve(listener, httproutes::new(state))
            .with_graceful_shutdown(async move {
                notify.notified().await;
            })
            .await
            .expect("failed to run web server");
    });

    Ok((tx, addr))
}
