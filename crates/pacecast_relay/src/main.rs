/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

mod channel;
mod hub;

use anyhow::Context;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use pacecast_push::crypto::{OsCrypto, SystemClock};
use pacecast_push::{PushEncryptionEngine, PushSender, SqliteStore, VapidCredentials, WebPushSender};
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, info_span, warn};

use crate::channel::{Frame, OUTBOX_CAPACITY};
use crate::hub::ChannelHub;

#[derive(Clone)]
struct RelayConfig {
    bind: SocketAddr,
    db_path: PathBuf,
    max_channel_id_len: usize,
    vapid_public_key: Option<String>,
    vapid_private_key: Option<String>,
    vapid_subject: Option<String>,
    http_timeout_secs: u64,
    http_connect_timeout_secs: u64,
}

#[derive(Clone)]
struct AppState {
    cfg: Arc<RelayConfig>,
    hub: ChannelHub,
    vapid_public_key: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = load_config()?;
    let store = SqliteStore::open(&cfg.db_path).context("db init")?;
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.http_timeout_secs))
        .connect_timeout(Duration::from_secs(cfg.http_connect_timeout_secs))
        .build()
        .context("http client init")?;

    let clock = Arc::new(SystemClock);
    let vapid = load_vapid(&cfg).map(Arc::new);
    let vapid_public_key = vapid.as_ref().map(|v| v.public_key_base64url().to_string());
    let sender: Option<Arc<dyn PushSender>> = vapid.map(|vapid| {
        let engine = PushEncryptionEngine::new(vapid, Arc::new(OsCrypto), clock.clone());
        Arc::new(WebPushSender::new(http.clone(), engine)) as Arc<dyn PushSender>
    });
    if sender.is_some() {
        info!("web push enabled");
    }

    let state = AppState {
        cfg: Arc::new(cfg.clone()),
        hub: ChannelHub::new(Arc::new(store), sender, clock),
        vapid_public_key,
    };
    let app = build_router(state);

    info!("pacecast_relay listening on http://{}", cfg.bind);
    let listener = tokio::net::TcpListener::bind(cfg.bind)
        .await
        .with_context(|| format!("bind {}", cfg.bind))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")?;
    Ok(())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/:channel", get(channel_ws))
        .route("/vapid-public-key", get(vapid_public_key))
        .fallback(liveness)
        .layer(TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
            info_span!("http", method = %req.method(), uri = %req.uri())
        }))
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("install ctrl-c handler failed: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

fn load_config() -> anyhow::Result<RelayConfig> {
    let bind = std::env::var("PACECAST_RELAY_BIND").unwrap_or_else(|_| "0.0.0.0:8788".to_string());
    let bind: SocketAddr = bind.parse().context("PACECAST_RELAY_BIND invalid")?;
    let db_path = std::env::var("PACECAST_RELAY_DB").unwrap_or_else(|_| "pacecast_relay.db".to_string());
    let max_channel_id_len = std::env::var("PACECAST_RELAY_MAX_CHANNEL_ID_LEN")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(128)
        .clamp(8, 512);
    let http_timeout_secs = std::env::var("PACECAST_PUSH_HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(30)
        .clamp(5, 120);
    let http_connect_timeout_secs = std::env::var("PACECAST_PUSH_HTTP_CONNECT_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(10)
        .clamp(1, 60);

    Ok(RelayConfig {
        bind,
        db_path: PathBuf::from(db_path),
        max_channel_id_len,
        vapid_public_key: env_nonempty("VAPID_PUBLIC_KEY"),
        vapid_private_key: env_nonempty("VAPID_PRIVATE_KEY"),
        vapid_subject: env_nonempty("VAPID_SUBJECT"),
        http_timeout_secs,
        http_connect_timeout_secs,
    })
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Push stays off unless all three VAPID values are present and consistent.
fn load_vapid(cfg: &RelayConfig) -> Option<VapidCredentials> {
    match (&cfg.vapid_public_key, &cfg.vapid_private_key, &cfg.vapid_subject) {
        (Some(public), Some(private), Some(subject)) => {
            match VapidCredentials::from_base64url(public, private, subject) {
                Ok(vapid) => Some(vapid),
                Err(e) => {
                    warn!("VAPID credentials rejected, push disabled: {e:#}");
                    None
                }
            }
        }
        (None, None, None) => {
            info!("VAPID not configured, push disabled");
            None
        }
        _ => {
            warn!("VAPID credentials incomplete, push disabled");
            None
        }
    }
}

async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn vapid_public_key(State(state): State<AppState>) -> Response {
    match state.vapid_public_key {
        Some(key) => Json(serde_json::json!({ "key": key })).into_response(),
        None => (StatusCode::NOT_FOUND, "push not configured").into_response(),
    }
}

async fn channel_ws(State(state): State<AppState>, Path(channel): Path<String>, ws: WebSocketUpgrade) -> Response {
    if channel.trim().is_empty() || channel.len() > state.cfg.max_channel_id_len {
        debug!(len = channel.len(), "channel id rejected");
        return (StatusCode::BAD_REQUEST, "invalid channel id").into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(state, channel, socket))
}

async fn handle_socket(state: AppState, channel: String, socket: WebSocket) {
    let conn = state.hub.next_connection_id();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOX_CAPACITY);

    let relay = state.hub.join(&channel, conn, tx).await;
    info!(%channel, conn, "socket joined");

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let cancel = CancellationToken::new();
    let cancel_reader = cancel.clone();
    let cancel_writer = cancel.clone();
    let reader_relay = relay.clone();
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Text(text) => {
                    reader_relay.on_message(Frame::Text(text.as_str()), conn).await;
                }
                Message::Binary(_) => {
                    reader_relay.on_message(Frame::Binary, conn).await;
                }
                Message::Close(_) => break,
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
        cancel_reader.cancel();
    });

    // Stop writer when socket closes.
    let writer2 = tokio::spawn(async move {
        tokio::select! {
          _ = cancel_writer.cancelled() => {}
          _ = writer => {}
        }
    });

    let _ = tokio::join!(writer2, reader);

    state.hub.leave(&relay, conn).await;
    info!(%channel, conn, "socket left");
}
