pub mod engine;
pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use engine::Engine;

/// Build the axum Router around an already constructed engine.
/// Used by `serve()` and available for integration testing.
pub fn build_router(engine: Engine) -> Router {
    router(state::AppState::new(engine))
}

pub fn router(app_state: state::AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Events (SSE)
        .route("/api/events", get(routes::events::sse_events))
        // Reads
        .route("/api/queue", get(routes::queue::get_queue))
        .route("/api/aggregates", get(routes::aggregates::get_aggregates))
        .route(
            "/api/conversation",
            get(routes::conversation::get_conversation),
        )
        // Selection
        .route(
            "/api/selection",
            get(routes::selection::get_selection).put(routes::selection::put_selection),
        )
        .route("/api/selection/card", post(routes::selection::select_card))
        // Mutations
        .route("/api/cards/{id}/approve", post(routes::cards::approve))
        .route("/api/cards/{id}/override", post(routes::cards::override_card))
        .route("/api/cards/{id}/edit", post(routes::cards::edit))
        .route("/api/cards/{id}/escalate", post(routes::cards::escalate))
        // Focus
        .route("/api/focus", post(routes::focus::focus))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Start the facade on `port`.
pub async fn serve(engine: Engine, port: u16, open_browser: bool) -> anyhow::Result<()> {
    let addr = format!("127.0.0.1:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(engine, listener, open_browser).await
}

/// Start the facade on a pre-bound listener, so the caller can read the
/// actual port first (useful with `port = 0`).
pub async fn serve_on(
    engine: Engine,
    listener: tokio::net::TcpListener,
    open_browser: bool,
) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app = build_router(engine);

    tracing::info!("reviewq listening on http://localhost:{actual_port}");

    if open_browser {
        let url = format!("http://localhost:{actual_port}");
        let _ = open::that(&url);
    }

    axum::serve(listener, app).await?;
    Ok(())
}
