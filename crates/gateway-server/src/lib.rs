//! OpenAI-compatible HTTP gateway in front of the Claude CLI.
//!
//! Request flow: router → bearer auth → validator → parameter translator →
//! completion service → Claude subprocess events → JSON response or SSE
//! chunk stream → session append.

pub mod auth;
pub mod backend;
pub mod error;
pub mod routes;
pub mod service;
pub mod sessions;
pub mod state;
pub mod streaming;
pub mod translate;

use axum::http::HeaderValue;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use gateway_core::GatewayConfig;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: state::AppState) -> Router {
    let cors = cors_layer(&app_state.config);

    Router::new()
        // Chat completions (JSON or SSE, branching on `stream`)
        .route(
            "/v1/chat/completions",
            post(routes::chat::create_chat_completion),
        )
        // Models
        .route("/v1/models", get(routes::models::list_models))
        // Sessions — `stats` before `{id}` so the static segment wins
        .route("/v1/sessions", get(routes::sessions::list_sessions))
        .route("/v1/sessions", post(routes::sessions::not_implemented))
        .route("/v1/sessions/stats", get(routes::sessions::session_stats))
        .route("/v1/sessions/{id}", get(routes::sessions::get_session))
        .route("/v1/sessions/{id}", delete(routes::sessions::delete_session))
        .route("/v1/sessions/{id}", patch(routes::sessions::not_implemented))
        // Introspection
        .route("/health", get(routes::misc::health))
        .route("/v1/auth/status", get(routes::misc::auth_status))
        .route("/v1/compatibility", post(routes::misc::compatibility))
        .route("/v1/debug/request", post(routes::misc::debug_request))
        .fallback(fallback_not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(axum::middleware::from_fn_with_state(
            app_state.clone(),
            auth::require_api_key,
        ))
        .with_state(app_state)
}

fn cors_layer(config: &GatewayConfig) -> CorsLayer {
    if config.allow_any_origin() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

async fn fallback_not_found(req: axum::extract::Request) -> error::AppError {
    error::AppError::not_found(format!("no route for {} {}", req.method(), req.uri().path()))
}

/// Start the gateway server.
///
/// Binds `0.0.0.0:<port>`, spawns the session sweeper, and serves until
/// SIGINT. Shutdown asks every live SSE stream to terminate with an error
/// event and `[DONE]` before the listener closes.
pub async fn serve(config: GatewayConfig) -> std::io::Result<()> {
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(config, listener).await
}

/// Start on a pre-bound listener — lets callers pass port 0 and read the
/// actual port before starting.
pub async fn serve_on(
    config: GatewayConfig,
    listener: tokio::net::TcpListener,
) -> std::io::Result<()> {
    let actual_port = listener.local_addr()?.port();
    tracing::info!("claude gateway listening on http://localhost:{actual_port}");

    let app_state = state::AppState::new(config);
    let streams = app_state.streams.clone();
    let app = build_router(app_state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down, closing live streams");
            streams.shutdown_all();
        })
        .await
}
