//! The game-facing pair: push a state, poll for the action.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use super::blocking;
use crate::error::AppError;
use crate::runtime::AppState;
use ante_core::action::Decision;

/// POST /state: accept a game state. The decision is made in the
/// background; poll `GET /action` for it.
pub async fn post_state(
    State(app): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let run_id = blocking(move || {
        let ingested = app.orchestrator.ingest(body)?;
        Ok(ingested.run_id)
    })
    .await?;
    Ok(Json(json!({ "status": "received", "run_id": run_id })))
}

/// GET /action: hand out the newest undelivered decision, at most once.
pub async fn get_action(State(app): State<AppState>) -> Result<Json<Value>, AppError> {
    let taken = blocking(move || {
        let Some(run_id) = app.store.current_run()? else {
            return Ok(None);
        };
        Ok(app.store.take_pending(&run_id)?)
    })
    .await?;

    let Some(entry) = taken else {
        return Ok(Json(json!({ "status": "pending" })));
    };
    let decision: Decision = serde_json::from_value(entry.payload)?;
    tracing::info!(
        run_id = %entry.run_id,
        turn = entry.turn,
        command = %decision.action.command(),
        "action delivered"
    );
    Ok(Json(json!({
        "status": "ready",
        "action": decision.action.verb,
        "positions": decision.action.positions,
    })))
}
