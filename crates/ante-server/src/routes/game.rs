use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::blocking;
use crate::error::AppError;
use crate::game::Launch;
use crate::runtime::AppState;
use ante_core::state::GameOverStats;
use ante_core::store::Outcome;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StartRequest {
    pub seed: Option<String>,
    /// Resume from the save file on disk instead of starting a new run.
    #[serde(rename = "continue")]
    pub resume: bool,
}

/// POST /game/start
pub async fn start_game(
    State(app): State<AppState>,
    Json(req): Json<StartRequest>,
) -> Result<Json<Value>, AppError> {
    let launch = if req.resume {
        Launch::Continue
    } else {
        Launch::NewRun { seed: req.seed }
    };
    let pid = app.game.start(launch).await?;
    Ok(Json(json!({ "status": "started", "pid": pid })))
}

/// POST /game/stop
pub async fn stop_game(State(app): State<AppState>) -> Json<Value> {
    let outcome = app.game.stop().await;
    Json(json!({ "status": outcome }))
}

/// GET /game/status
pub async fn game_status(State(app): State<AppState>) -> Json<Value> {
    Json(json!(app.game.status().await))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WinRequest {
    pub best_hand: Option<i64>,
    pub final_ante: Option<i64>,
    pub final_round: Option<i64>,
}

impl WinRequest {
    fn stats(&self) -> Option<GameOverStats> {
        Some(GameOverStats {
            best_hand: self.best_hand?,
            final_ante: self.final_ante?,
            final_round: self.final_round?,
        })
    }
}

/// POST /game/win: the game reports a won run. The current run is closed
/// as won and a fresh run takes its place.
pub async fn record_win(
    State(app): State<AppState>,
    Json(req): Json<WinRequest>,
) -> Result<Json<Value>, AppError> {
    let store = app.store.clone();
    let run_id = blocking(move || {
        store
            .current_run()?
            .ok_or_else(|| AppError::not_found("no current run"))
    })
    .await?;

    let next_run = app
        .orchestrator
        .finish_run(&run_id, Outcome::Won, req.stats())
        .await?;
    Ok(Json(json!({
        "status": "won",
        "run_id": run_id,
        "next_run": next_run,
    })))
}
