use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::blocking;
use crate::error::AppError;
use crate::runtime::AppState;
use ante_core::objects::ObjectKind;

#[derive(Debug, Default, Deserialize)]
pub struct NotesQuery {
    pub kind: Option<String>,
}

/// GET /api/notes: latest version of every note, optionally one kind only.
pub async fn list_notes(
    State(app): State<AppState>,
    Query(query): Query<NotesQuery>,
) -> Result<Json<Value>, AppError> {
    blocking(move || {
        let kind = query.kind.as_deref().map(str::parse::<ObjectKind>).transpose()?;
        let notes: Vec<_> = app
            .store
            .latest_notes()?
            .into_iter()
            .filter(|n| kind.map_or(true, |k| n.kind == k))
            .collect();
        Ok(Json(json!(notes)))
    })
    .await
}

/// GET /api/notes/{kind}/{name}
pub async fn get_note(
    State(app): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    blocking(move || {
        let kind: ObjectKind = kind.parse()?;
        let note = app
            .store
            .read_note(&name, kind)?
            .ok_or_else(|| AppError::not_found(format!("no note for {name} ({kind})")))?;
        Ok(Json(json!(note)))
    })
    .await
}

/// GET /api/notes/{kind}/{name}/history: every version, newest first.
pub async fn note_history(
    State(app): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    blocking(move || {
        let kind: ObjectKind = kind.parse()?;
        let versions = app.store.note_history(&name, kind)?;
        if versions.is_empty() {
            return Err(AppError::not_found(format!("no note for {name} ({kind})")));
        }
        Ok(Json(json!(versions)))
    })
    .await
}

/// GET /api/notes/{kind}/{name}/version/{v}
pub async fn note_version(
    State(app): State<AppState>,
    Path((kind, name, version)): Path<(String, String, u32)>,
) -> Result<Json<Value>, AppError> {
    blocking(move || {
        let kind: ObjectKind = kind.parse()?;
        let note = app.store.note_version(&name, kind, version)?.ok_or_else(|| {
            AppError::not_found(format!("no version {version} of {name} ({kind})"))
        })?;
        Ok(Json(json!(note)))
    })
    .await
}
