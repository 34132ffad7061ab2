//! Axum-based HTTP gateway for Telegram webhook delivery.
//!
//! The webhook handler acknowledges Telegram immediately and hands the update
//! to the router on a tracked background task; Telegram retries slow or
//! failing webhooks, and a retried update would be relayed twice.

use crate::relay::RelayRouter;
use crate::telegram::Update;
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB); Telegram updates are far smaller.
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout to shed slow clients.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

const SECRET_TOKEN_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";

/// Shared state for all axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<RelayRouter>,
    /// Value Telegram echoes back in the secret-token header. `None` disables
    /// webhook authentication.
    pub secret_token: Option<Arc<str>>,
    /// Tracks in-flight update processing so shutdown can drain it.
    pub tracker: TaskTracker,
}

/// Constant-time string comparison for the secret token.
///
/// Does not short-circuit on length mismatch; always iterates over the longer
/// input, padding the shorter with zeros.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let len_diff = a.len() ^ b.len();
    let max_len = a.len().max(b.len());
    let mut byte_diff = 0u8;
    for i in 0..max_len {
        let x = *a.get(i).unwrap_or(&0);
        let y = *b.get(i).unwrap_or(&0);
        byte_diff |= x ^ y;
    }
    (len_diff == 0) & (byte_diff == 0)
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handle_health))
        .route("/webhook", post(handle_webhook))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
        .fallback(handle_not_found)
}

/// Bind and serve until Ctrl+C, then drain in-flight update processing.
pub async fn run_gateway(host: &str, port: u16, state: AppState) -> Result<()> {
    if state.secret_token.is_none() {
        tracing::warn!(
            "No webhook secret token configured; accepting unauthenticated webhook requests"
        );
    }

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Gateway listening on http://{addr}");

    let tracker = state.tracker.clone();
    let app = build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received, draining in-flight updates");
        })
        .await
        .context("Gateway server error")?;

    tracker.close();
    tracker.wait().await;
    tracing::info!("Gateway stopped");
    Ok(())
}

/// GET / — liveness probe.
async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn handle_not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}

/// POST /webhook — Telegram update delivery.
///
/// Authentication first, then parsing. The happy path returns 200 before the
/// update is processed.
async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Update>, JsonRejection>,
) -> impl IntoResponse {
    if let Some(ref expected) = state.secret_token {
        let presented = headers
            .get(SECRET_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !constant_time_eq(presented, expected) {
            tracing::warn!("Webhook rejected: invalid or missing secret token header");
            return (StatusCode::UNAUTHORIZED, "Unauthorized");
        }
    }

    let Json(update) = match body {
        Ok(body) => body,
        Err(e) => {
            tracing::error!("Webhook payload error: {e}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
        }
    };

    tracing::debug!("Accepted update {}", update.update_id);
    let router = Arc::clone(&state.router);
    state.tracker.spawn(async move {
        router.process_update(update).await;
    });

    (StatusCode::OK, "OK")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{Blacklist, CorrelationStore, RelaySettings};
    use crate::scheduler::TaskScheduler;
    use crate::storage::MemoryKv;
    use crate::telegram::{BotApi, BotCommand, ChatRef};
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use http_body_util::BodyExt;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct SinkApi {
        copies: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl BotApi for SinkApi {
        async fn copy_message(
            &self,
            _to: &ChatRef,
            _from: &ChatRef,
            message_id: i64,
            _reply_to: Option<i64>,
        ) -> anyhow::Result<i64> {
            self.copies.lock().push(message_id);
            Ok(message_id + 1000)
        }
        async fn send_message(
            &self,
            _chat: &ChatRef,
            _text: &str,
            _reply_to: Option<i64>,
        ) -> anyhow::Result<i64> {
            Ok(1)
        }
        async fn edit_message_text(
            &self,
            _chat: &ChatRef,
            _message_id: i64,
            _text: &str,
        ) -> anyhow::Result<()> {
            Ok(())
        }
        async fn edit_message_caption(
            &self,
            _chat: &ChatRef,
            _message_id: i64,
            _caption: &str,
        ) -> anyhow::Result<()> {
            Ok(())
        }
        async fn delete_message(&self, _chat: &ChatRef, _message_id: i64) -> anyhow::Result<bool> {
            Ok(true)
        }
        async fn set_my_commands(
            &self,
            _chat: &ChatRef,
            _commands: &[BotCommand],
        ) -> anyhow::Result<bool> {
            Ok(true)
        }
        async fn set_chat_menu_button(&self, _chat: &ChatRef) -> anyhow::Result<bool> {
            Ok(true)
        }
    }

    fn state_with_secret(api: Arc<SinkApi>, secret: Option<&str>) -> AppState {
        let kv = Arc::new(MemoryKv::new());
        let api_dyn: Arc<dyn BotApi> = api;
        let scheduler = TaskScheduler::new(kv.clone(), api_dyn.clone());
        let router = RelayRouter::new(
            api_dyn,
            CorrelationStore::new(kv.clone(), Duration::from_secs(60), 10),
            Blacklist::new(kv),
            scheduler,
            RelaySettings {
                owner_id: 1,
                bot_id: 2,
                welcome_text: "Welcome!".into(),
                notice_delete_delay: Duration::from_secs(10),
            },
        );
        AppState {
            router: Arc::new(router),
            secret_token: secret.map(Arc::from),
            tracker: TaskTracker::new(),
        }
    }

    fn update_json(message_id: i64) -> Json<Update> {
        let raw = serde_json::json!({
            "update_id": 1,
            "message": {
                "message_id": message_id,
                "from": {"id": 99, "first_name": "Ada"},
                "chat": {"id": 99},
                "text": "hi",
            }
        });
        Json(serde_json::from_value(raw).unwrap())
    }

    async fn response_parts(response: axum::response::Response) -> (StatusCode, String) {
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    #[tokio::test]
    async fn webhook_rejects_missing_and_wrong_secret() {
        let api = Arc::new(SinkApi::default());
        let state = state_with_secret(api.clone(), Some("s3cret"));

        let response = handle_webhook(State(state.clone()), HeaderMap::new(), Ok(update_json(7)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut headers = HeaderMap::new();
        headers.insert(SECRET_TOKEN_HEADER, HeaderValue::from_static("wrong"));
        let response = handle_webhook(State(state.clone()), headers, Ok(update_json(7)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        state.tracker.close();
        state.tracker.wait().await;
        assert!(api.copies.lock().is_empty());
    }

    #[tokio::test]
    async fn webhook_accepts_matching_secret_and_processes_in_background() {
        let api = Arc::new(SinkApi::default());
        let state = state_with_secret(api.clone(), Some("s3cret"));

        let mut headers = HeaderMap::new();
        headers.insert(SECRET_TOKEN_HEADER, HeaderValue::from_static("s3cret"));
        let response = handle_webhook(State(state.clone()), headers, Ok(update_json(7)))
            .await
            .into_response();
        let (status, body) = response_parts(response).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");

        state.tracker.close();
        state.tracker.wait().await;
        assert_eq!(*api.copies.lock(), vec![7]);
    }

    #[tokio::test]
    async fn webhook_without_configured_secret_skips_the_check() {
        let api = Arc::new(SinkApi::default());
        let state = state_with_secret(api.clone(), None);

        let response = handle_webhook(State(state.clone()), HeaderMap::new(), Ok(update_json(3)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        state.tracker.close();
        state.tracker.wait().await;
        assert_eq!(*api.copies.lock(), vec![3]);
    }

    #[tokio::test]
    async fn unparseable_payload_is_a_server_error() {
        use axum::extract::FromRequest;

        let api = Arc::new(SinkApi::default());
        let state = state_with_secret(api, None);

        let request = axum::http::Request::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(axum::body::Body::from("not json"))
            .unwrap();
        let rejection = Json::<Update>::from_request(request, &()).await;

        let response = handle_webhook(State(state), HeaderMap::new(), rejection)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn health_probe_answers_ok() {
        let response = handle_health().await.into_response();
        let (status, body) = response_parts(response).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }

    #[tokio::test]
    async fn unknown_paths_are_not_found() {
        let response = handle_not_found().await.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn constant_time_eq_compares_exactly() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
        // Zero padding of the shorter input must not mask a length mismatch.
        assert!(!constant_time_eq("abc\0", "abc"));
        assert!(!constant_time_eq("", "x"));
        assert!(constant_time_eq("", ""));
    }
}
