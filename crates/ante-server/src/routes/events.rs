use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt as _;

use super::blocking;
use crate::error::AppError;
use crate::hub::ObserverMessage;
use crate::runtime::AppState;

/// Entries replayed to a newly connected observer.
const HISTORY_LIMIT: usize = 200;

/// GET /api/events: SSE observer stream. The first message carries recent
/// history across runs; state updates, decisions and reflections follow.
pub async fn sse_events(State(app): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let store = app.store.clone();
    let history = blocking(move || Ok(store.combined_history(HISTORY_LIMIT)?)).await?;

    let rx = app
        .hub
        .subscribe(Some(ObserverMessage::History { data: history }));
    let stream = ReceiverStream::new(rx).map(|msg| Event::default().json_data(&msg));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
