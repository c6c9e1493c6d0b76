//! Server-sent change events for realtime client sync.
//!
//! Each connection receives the caller's change events from the moment it
//! opens; there is no catch-up. A lagged receiver gets a `resync` event
//! telling the client to refetch its collections.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use tokio_stream::{Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::extract::CurrentUser;
use crate::state::AppState;

pub async fn sync_events_handler(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.change_subscriber.subscribe();
    let stream = BroadcastStream::new(receiver).filter_map(move |item| match item {
        Ok(event) if event.user_id == user_id => {
            let sse_event = match Event::default().event("change").json_data(&event) {
                Ok(sse_event) => sse_event,
                Err(_) => Event::default().event("resync"),
            };
            Some(Ok(sse_event))
        }
        Ok(_) => None,
        Err(BroadcastStreamRecvError::Lagged(_)) => Some(Ok(Event::default().event("resync"))),
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
