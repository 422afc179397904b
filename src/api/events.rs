//! Server-sent event streams of the realtime broadcast.
//!
//! Streams are not part of the openapi document, `EventSource` clients
//! cannot be generated from it anyway.
use std::time::Duration;

use aide::axum::ApiRouter;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::routing::get;
use futures::{Stream, StreamExt};
use log::debug;
use serde::Deserialize;

use crate::broadcast::{Event, EventBroadcaster, EventFilter, Topic};
use crate::database::AppState;
use crate::error::ServiceResult;
use crate::extract::{Path, Query};
use crate::request_state::RequestState;

use super::guest::session_by_token;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .route("/events", get(staff_events))
        .route("/guest/:token/events", get(guest_events))
        .with_state(app_state)
}

fn to_sse(event: Event) -> Result<SseEvent, axum::Error> {
    SseEvent::default().event(event.kind.clone()).json_data(&event)
}

fn event_stream(
    events: &EventBroadcaster,
    filter: EventFilter,
) -> Sse<impl Stream<Item = Result<SseEvent, axum::Error>>> {
    Sse::new(events.stream(filter).map(to_sse)).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("ping"),
    )
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub topic: Option<Topic>,
}

/// All events of one topic, or of every topic without `topic`.
async fn staff_events(
    state: RequestState,
    Query(query): Query<EventsQuery>,
) -> ServiceResult<Sse<impl Stream<Item = Result<SseEvent, axum::Error>>>> {
    let user = state.session_require()?;
    debug!("User {} subscribed to {:?} events", user.username, query.topic);

    Ok(event_stream(
        &state.events,
        EventFilter {
            topic: query.topic,
            session_id: None,
        },
    ))
}

/// Events of the guest's own dining session.
async fn guest_events(
    mut state: RequestState,
    Path(token): Path<String>,
) -> ServiceResult<Sse<impl Stream<Item = Result<SseEvent, axum::Error>>>> {
    let session = session_by_token(&mut state.db, &token).await?;

    Ok(event_stream(
        &state.events,
        EventFilter {
            topic: None,
            session_id: Some(session.id),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_query_is_lowercase() {
        let query: EventsQuery = serde_json::from_str(r#"{"topic":"kitchen"}"#).unwrap();
        assert_eq!(query.topic, Some(Topic::Kitchen));
        let query: EventsQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.topic, None);
    }
}
