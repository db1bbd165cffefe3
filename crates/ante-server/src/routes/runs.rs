use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use super::blocking;
use crate::error::AppError;
use crate::game::Launch;
use crate::runtime::AppState;
use ante_core::store::BlobKind;
use ante_core::CoreError;

/// GET /api/runs: every run, newest first.
pub async fn list_runs(State(app): State<AppState>) -> Result<Json<Value>, AppError> {
    let runs = blocking(move || Ok(app.store.list_runs()?)).await?;
    Ok(Json(json!(runs)))
}

/// GET /api/runs/{id}: the run record and its full turn history.
pub async fn get_run(
    State(app): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    blocking(move || {
        let run = app.store.require_run(&run_id)?;
        let turns = app.store.run_history(&run_id)?;
        Ok(Json(json!({ "run": run, "turns": turns })))
    })
    .await
}

/// DELETE /api/runs/{id}: purge the run, its turns and its blobs.
pub async fn delete_run(
    State(app): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    blocking(move || {
        app.store.require_run(&run_id)?;
        app.store.purge_run(&run_id)?;
        tracing::info!(run_id = %run_id, "run purged");
        Ok(Json(json!({ "status": "deleted", "run_id": run_id })))
    })
    .await
}

/// GET /api/current-run
pub async fn current_run(State(app): State<AppState>) -> Result<Json<Value>, AppError> {
    let run_id = blocking(move || Ok(app.store.current_run()?)).await?;
    Ok(Json(json!({ "run_id": run_id })))
}

/// GET /api/runs/{id}/snapshots: saved game files and screenshots per turn.
pub async fn list_snapshots(
    State(app): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    blocking(move || {
        app.store.require_run(&run_id)?;
        let blobs = app.store.list_blobs(&run_id)?;
        Ok(Json(json!(blobs)))
    })
    .await
}

/// POST /api/runs/{id}/continue/{turn}: rewind a run to `turn`: restore the
/// save captured there, drop everything from that turn on and make the run
/// current again.
pub async fn continue_run(
    State(app): State<AppState>,
    Path((run_id, turn)): Path<(String, u64)>,
) -> Result<Json<Value>, AppError> {
    let Some(save_path) = app.config.game.save_path.clone() else {
        return Err(AppError::bad_request("game.save_path is not configured"));
    };

    let store = app.store.clone();
    let rid = run_id.clone();
    let removed = blocking(move || {
        store.require_run(&rid)?;
        let save = store.blob(&rid, turn, BlobKind::Save)?.ok_or_else(|| {
            CoreError::SnapshotNotFound {
                run_id: rid.clone(),
                turn,
            }
        })?;
        ante_core::io::atomic_write(&save_path, &save)?;
        Ok(store.truncate_run_from(&rid, turn)?)
    })
    .await?;
    tracing::info!(run_id = %run_id, turn, removed, "run rewound");

    if app.config.game.autostart {
        app.game.start(Launch::Continue).await?;
    }

    Ok(Json(json!({
        "status": "continued",
        "run_id": run_id,
        "turn": turn,
        "removed": removed,
    })))
}

/// POST /api/runs/{id}/reflect: regenerate notes and the narrative for a run.
pub async fn reflect_run(
    State(app): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let store = app.store.clone();
    let rid = run_id.clone();
    blocking(move || Ok(store.require_run(&rid)?)).await?;

    let reflection = app.orchestrator.reflector().reflect(&run_id, None).await?;
    Ok(Json(json!({ "run_id": run_id, "reflection": reflection })))
}
