//! Realtime notifications for dashboards, kitchen screens and guest devices.
//!
//! Emitting is fire-and-forget: events go to whoever is subscribed at that
//! moment, there is no acknowledgement and no replay. Subscribers that fall
//! behind by more than the channel capacity skip the missed events.
use chrono::Utc;
use futures::stream::{self, Stream};
use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Tables,
    Sessions,
    Orders,
    Kitchen,
    Menu,
    Flowtrak,
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct Event {
    pub topic: Topic,
    pub kind: String,
    /// Dining session the event belongs to, lets guest devices filter their own
    pub session_id: Option<u64>,
    pub payload: serde_json::Value,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EventFilter {
    pub topic: Option<Topic>,
    pub session_id: Option<u64>,
}

impl EventFilter {
    pub fn matches(&self, event: &Event) -> bool {
        self.topic.map_or(true, |t| t == event.topic)
            && self
                .session_id
                .map_or(true, |id| event.session_id == Some(id))
    }
}

#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<Event>,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn emit<T: Serialize>(&self, topic: Topic, kind: &str, session_id: Option<u64>, payload: &T) {
        let payload = match serde_json::to_value(payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Could not serialize '{}' event: {}", kind, e);
                return;
            }
        };

        let event = Event {
            topic,
            kind: kind.to_owned(),
            session_id,
            payload,
            timestamp: Utc::now().to_rfc3339(),
        };

        // no subscribers is not an error
        match self.sender.send(event) {
            Ok(receivers) => debug!("Event '{}' sent to {} subscribers", kind, receivers),
            Err(_) => debug!("Event '{}' dropped, nobody is listening", kind),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Stream of all future events matching `filter`.
    pub fn stream(&self, filter: EventFilter) -> impl Stream<Item = Event> + Send + 'static {
        stream::unfold(self.subscribe(), move |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(event) if filter.matches(&event) => return Some((event, receiver)),
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Event subscriber lagged, skipped {} events", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use serde_json::json;

    use super::*;

    #[test]
    fn emit_without_subscribers_is_fine() {
        let broadcaster = EventBroadcaster::new(4);
        broadcaster.emit(Topic::Tables, "table.updated", None, &json!({"id": 1}));
    }

    #[tokio::test]
    async fn subscribers_receive_events() {
        let broadcaster = EventBroadcaster::new(4);
        let mut receiver = broadcaster.subscribe();

        broadcaster.emit(Topic::Orders, "order.created", Some(3), &json!({"id": 9}));

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.topic, Topic::Orders);
        assert_eq!(event.kind, "order.created");
        assert_eq!(event.session_id, Some(3));
        assert_eq!(event.payload, json!({"id": 9}));
    }

    #[tokio::test]
    async fn stream_applies_filter() {
        let broadcaster = EventBroadcaster::new(16);
        let stream = broadcaster.stream(EventFilter {
            topic: Some(Topic::Kitchen),
            session_id: Some(2),
        });
        tokio::pin!(stream);

        broadcaster.emit(Topic::Orders, "order.created", Some(2), &json!({}));
        broadcaster.emit(Topic::Kitchen, "item.status", Some(1), &json!({}));
        broadcaster.emit(Topic::Kitchen, "item.status", Some(2), &json!({"ok": true}));

        let event = stream.next().await.unwrap();
        assert_eq!(event.topic, Topic::Kitchen);
        assert_eq!(event.session_id, Some(2));
        assert_eq!(event.payload, json!({"ok": true}));
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_old_events() {
        let broadcaster = EventBroadcaster::new(2);
        let stream = broadcaster.stream(EventFilter::default());
        tokio::pin!(stream);

        for i in 0..5 {
            broadcaster.emit(Topic::Menu, "menu.updated", None, &json!({ "n": i }));
        }

        let event = stream.next().await.unwrap();
        assert_eq!(event.payload, json!({"n": 3}));
        let event = stream.next().await.unwrap();
        assert_eq!(event.payload, json!({"n": 4}));
    }

    #[test]
    fn topic_names_are_lowercase() {
        assert_eq!(serde_json::to_value(Topic::Flowtrak).unwrap(), json!("flowtrak"));
        let topic: Topic = serde_json::from_value(json!("kitchen")).unwrap();
        assert_eq!(topic, Topic::Kitchen);
    }
}
