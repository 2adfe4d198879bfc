//! Router assembly and serving.

use std::net::SocketAddr;

use {
    axum::{
        Router,
        response::Json,
        routing::{MethodRouter, get, post},
    },
    tokio_util::sync::CancellationToken,
    tower_http::{
        cors::CorsLayer,
        request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
        sensitive_headers::SetSensitiveHeadersLayer,
        trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer},
    },
    tracing::{Level, info},
};

use crate::{keys, messages, platforms, state::AppState, webhooks};

/// The authenticated API surface as an explicit table. Required scopes
/// are enforced by each handler via `AuthContext::require_scope`.
fn route_table() -> Vec<(&'static str, MethodRouter<AppState>)> {
    vec![
        // messages: messages:send / messages:read
        (
            "/api/v1/projects/{slug}/messages/send",
            post(messages::send),
        ),
        (
            "/api/v1/projects/{slug}/messages/status/{job_id}",
            get(messages::status),
        ),
        (
            "/api/v1/projects/{slug}/messages/retry/{job_id}",
            post(messages::retry),
        ),
        (
            "/api/v1/projects/{slug}/messages/queue/metrics",
            get(messages::queue_metrics),
        ),
        // platforms: platforms:read / platforms:write
        (
            "/api/v1/projects/{slug}/platforms",
            post(platforms::create).get(platforms::list),
        ),
        (
            "/api/v1/projects/{slug}/platforms/{id}",
            get(platforms::find_one)
                .patch(platforms::update)
                .delete(platforms::remove),
        ),
        (
            "/api/v1/projects/{slug}/platforms/{id}/register-webhook",
            post(platforms::register_webhook),
        ),
        // keys: keys:read / keys:write
        (
            "/api/v1/projects/{slug}/keys",
            post(keys::create).get(keys::list),
        ),
        (
            "/api/v1/projects/{slug}/keys/{id}",
            axum::routing::delete(keys::revoke),
        ),
    ]
}

#[must_use]
pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        // Inbound webhooks authenticate by token, not API key.
        .route("/webhooks/{platform}/{token}", post(webhooks::receive))
        .route(
            "/webhooks/{platform}/{token}/{*rest}",
            post(webhooks::receive_with_rest),
        );
    for (path, method_router) in route_table() {
        router = router.route(path, method_router);
    }

    router
        .layer(SetSensitiveHeadersLayer::new([
            axum::http::header::AUTHORIZATION,
            axum::http::HeaderName::from_static(crate::auth::API_KEY_HEADER),
        ]))
        .layer(
            TraceLayer::new_for_http()
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "data": {"status": "healthy", "timestamp": chrono::Utc::now()},
    }))
}

/// Bind and serve until the shutdown token fires.
pub async fn serve(
    state: AppState,
    port: u16,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let router = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "gateway listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
