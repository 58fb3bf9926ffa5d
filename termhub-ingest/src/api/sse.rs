//! Server-sent events stream of ingest progress
//!
//! Subscribers get every event from subscription onward. A keep-alive
//! comment goes out during quiet periods so proxies hold the connection.

use crate::AppState;
use axum::extract::State;
use axum::response::sse::{Event, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// GET /events
pub async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            match tokio::time::timeout(KEEP_ALIVE_INTERVAL, rx.recv()).await {
                Ok(Ok(event)) => {
                    match serde_json::to_string(&event) {
                        Ok(json) => {
                            yield Ok(Event::default().event(event.event_type()).data(json));
                        }
                        Err(err) => {
                            tracing::error!(error = %err, "Failed to serialize event for SSE");
                        }
                    }
                }
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "SSE subscriber lagged, events dropped");
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => break,
                Err(_) => {
                    yield Ok(Event::default().comment("keep-alive"));
                }
            }
        }
    };

    Sse::new(stream)
}
