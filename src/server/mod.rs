//! HTTP 入口（axum）
//!
//! - POST /api/chat：`{message, sessionId?}` → text/event-stream；空消息返回 400 `{error}`
//! - POST /api/session/reset：`{sessionId?}` → `{sessionId}`
//! - GET  /api/session/:id/history：`{sessionId, turns}`
//! - GET  /api/tools：工具定义
//! - GET  /api/health：`OK`

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;

use crate::core::{AgentError, ChatService};
use crate::transport::sse_lines;

pub const SESSION_HEADER: &str = "x-session-id";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    #[serde(default)]
    message: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResetRequest {
    #[serde(default)]
    session_id: Option<String>,
}

pub fn router(service: Arc<ChatService>) -> Router {
    Router::new()
        .route("/api/chat", post(api_chat))
        .route("/api/session/reset", post(api_session_reset))
        .route("/api/session/:id/history", get(api_session_history))
        .route("/api/tools", get(api_tools))
        .route("/api/health", get(|| async { "OK" }))
        .with_state(service)
}

fn error_response(err: &AgentError) -> Response {
    let status = match err {
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        AgentError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

async fn api_chat(
    State(service): State<Arc<ChatService>>,
    Json(req): Json<ChatRequest>,
) -> Response {
    let chat = match service.chat(req.session_id, &req.message) {
        Ok(chat) => chat,
        Err(e) => {
            tracing::debug!(error = %e, "chat request rejected");
            return error_response(&e);
        }
    };
    tracing::info!(session_id = %chat.session_id, created = chat.created, "chat stream opened");

    // 客户端断开时 body 被丢弃，编排任务随之在下一个挂起点退出
    let body = sse_lines(chat.frames).map(|line| Ok::<_, Infallible>(Bytes::from(line)));
    let mut res = Response::new(Body::from_stream(body));
    let headers = res.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    match HeaderValue::from_str(&chat.session_id) {
        Ok(v) => {
            headers.insert(SESSION_HEADER, v);
        }
        Err(_) => tracing::warn!("session id is not a valid header value, header omitted"),
    }
    res
}

async fn api_session_reset(
    State(service): State<Arc<ChatService>>,
    req: Option<Json<ResetRequest>>,
) -> Json<serde_json::Value> {
    let req = req.map(|Json(r)| r).unwrap_or_default();
    let old = req.session_id.filter(|s| !s.is_empty());
    let session_id = service.reset(old.as_deref());
    Json(json!({ "sessionId": session_id }))
}

async fn api_session_history(
    State(service): State<Arc<ChatService>>,
    Path(id): Path<String>,
) -> Response {
    match service.history(&id).await {
        Ok(turns) => Json(json!({ "sessionId": id, "turns": turns })).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn api_tools(State(service): State<Arc<ChatService>>) -> Response {
    Json(service.tool_definitions()).into_response()
}
