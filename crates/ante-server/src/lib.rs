//! `ante-server`: the turn engine behind the game bridge.
//!
//! The game pushes states to `POST /state` and polls `GET /action`; the
//! [`orchestrator::Orchestrator`] turns each state into at most one stored
//! decision. Observers follow along on `GET /api/events`.

pub mod analysis;
pub mod error;
pub mod game;
pub mod hub;
mod offload;
pub mod orchestrator;
pub mod reflection;
pub mod routes;
pub mod runtime;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use runtime::{AgentDecider, AppState, Runtime};

/// Build the axum Router with all routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Game bridge
        .route("/state", post(routes::ingest::post_state))
        .route("/action", get(routes::ingest::get_action))
        // Observers (SSE)
        .route("/api/events", get(routes::events::sse_events))
        // Runs
        .route("/api/runs", get(routes::runs::list_runs))
        .route(
            "/api/runs/{id}",
            get(routes::runs::get_run).delete(routes::runs::delete_run),
        )
        .route("/api/current-run", get(routes::runs::current_run))
        .route(
            "/api/runs/{id}/continue/{turn}",
            post(routes::runs::continue_run),
        )
        .route(
            "/api/runs/{id}/snapshots",
            get(routes::runs::list_snapshots),
        )
        .route("/api/runs/{id}/reflect", post(routes::runs::reflect_run))
        // Notes
        .route("/api/notes", get(routes::notes::list_notes))
        .route("/api/notes/{kind}/{name}", get(routes::notes::get_note))
        .route(
            "/api/notes/{kind}/{name}/history",
            get(routes::notes::note_history),
        )
        .route(
            "/api/notes/{kind}/{name}/version/{v}",
            get(routes::notes::note_version),
        )
        // Game process
        .route("/game/start", post(routes::game::start_game))
        .route("/game/stop", post(routes::game::stop_game))
        .route("/game/status", get(routes::game::game_status))
        .route("/game/win", post(routes::game::record_win))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app)
}

/// Bind `host:port` from the runtime's config and serve until Ctrl-C.
pub async fn serve(runtime: Arc<Runtime>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", runtime.config.server.host, runtime.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(runtime, listener).await
}

/// Serve on a pre-bound listener.
///
/// Unlike `serve`, this accepts a `TcpListener` that was already bound so the
/// caller can read the actual port before starting (useful when `port = 0` and
/// the OS picks a free port).
pub async fn serve_on(runtime: Arc<Runtime>, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let actual = listener.local_addr()?;
    tracing::info!("ante server listening on http://{actual}");

    if runtime.config.game.autostart {
        let seed = offload::with_store(&runtime.store, |store| {
            Ok(store
                .current_run()?
                .and_then(|id| store.seed(&id).ok().flatten()))
        })
        .await?;
        if let Err(e) = runtime.game.start(game::Launch::NewRun { seed }).await {
            tracing::error!("could not start game: {e:#}");
        }
    }

    let app = build_router(runtime.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    runtime.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("could not listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
