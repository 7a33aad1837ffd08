//! Live WebSocket broadcast of record updates
//!
//! - `GET /`   - latest record as JSON, 404 until the first update
//! - `GET /ws` - stream of `{data, updatedKey}` frames; late joiners get an
//!   `"all"` snapshot first
//!
//! Delivery is at-most-once. Each subscriber has a one-slot channel and a
//! subscriber that has not drained it misses the update.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use hds_relay_core::{ExportError, Exporter, HealthRecord, UpdateMessage};

/// Messages a subscriber may hold before further updates are dropped
pub const SUBSCRIBER_CAPACITY: usize = 1;

type Outbox = mpsc::Sender<Arc<UpdateMessage>>;

/// Registry of live stream subscribers
#[derive(Clone, Default)]
pub struct BroadcastHub {
    subscribers: Arc<Mutex<HashMap<Uuid, Outbox>>>,
}

/// Result of one publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishStats {
    pub delivered: usize,
    pub dropped: usize,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber; it is removed again when the subscription drops
    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let id = Uuid::new_v4();
        self.subscribers.lock().insert(id, sender);
        Subscription {
            id,
            receiver,
            hub: self.clone(),
        }
    }

    /// Offer `message` to every subscriber without waiting on any of them
    pub fn publish(&self, message: UpdateMessage) -> PublishStats {
        let message = Arc::new(message);
        let mut stats = PublishStats::default();
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|id, outbox| match outbox.try_send(Arc::clone(&message)) {
            Ok(()) => {
                stats.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                stats.dropped += 1;
                tracing::debug!(subscriber = %id, "Subscriber busy, dropping update");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
        stats
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    fn remove(&self, id: &Uuid) {
        self.subscribers.lock().remove(id);
    }
}

/// One registered stream subscriber
pub struct Subscription {
    id: Uuid,
    receiver: mpsc::Receiver<Arc<UpdateMessage>>,
    hub: BroadcastHub,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next update; `None` once the hub has dropped this subscriber
    pub async fn recv(&mut self) -> Option<Arc<UpdateMessage>> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<UpdateMessage>> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.remove(&self.id);
    }
}

/// Exporter serving the latest record and a live update stream
#[derive(Default)]
pub struct BroadcastServer {
    latest: RwLock<HealthRecord>,
    hub: BroadcastHub,
}

impl BroadcastServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/", get(get_latest))
            .route("/ws", get(connect))
            .with_state(Arc::clone(self))
    }

    /// Copy of the most recently exported record
    pub fn latest(&self) -> HealthRecord {
        self.latest.read().clone()
    }

    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    async fn stream_updates(self: Arc<Self>, socket: WebSocket, addr: SocketAddr) {
        let mut subscription = self.hub.subscribe();
        tracing::info!(
            addr = %addr,
            current = self.hub.subscriber_count(),
            "New WebSocket connection"
        );

        let (mut sender, mut receiver) = socket.split();

        let latest = self.latest();
        if latest.is_populated() {
            if let Err(e) = send_frame(&mut sender, &UpdateMessage::snapshot(latest)).await {
                tracing::error!(addr = %addr, error = %e, "Writing message");
                return;
            }
        }

        loop {
            tokio::select! {
                inbound = receiver.next() => match inbound {
                    None | Some(Ok(Message::Close(_))) => break,
                    Some(Err(e)) => {
                        tracing::debug!(addr = %addr, error = %e, "Reading message");
                        break;
                    }
                    Some(Ok(_)) => {}
                },
                outbound = subscription.recv() => match outbound {
                    Some(message) => {
                        if let Err(e) = send_frame(&mut sender, &message).await {
                            tracing::error!(addr = %addr, error = %e, "Writing message");
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        drop(subscription);
        tracing::info!(
            addr = %addr,
            current = self.hub.subscriber_count(),
            "Closing WebSocket connection"
        );
    }
}

impl Exporter for BroadcastServer {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    fn update(&self, record: &HealthRecord, key: &str) -> Result<(), ExportError> {
        *self.latest.write() = record.clone();
        let stats = self.hub.publish(UpdateMessage::new(record.clone(), key));
        if stats.dropped > 0 {
            tracing::debug!(
                delivered = stats.delivered,
                dropped = stats.dropped,
                "Broadcast update"
            );
        }
        Ok(())
    }
}

async fn send_frame<S>(sender: &mut S, message: &UpdateMessage) -> Result<(), ExportError>
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
{
    let json = serde_json::to_string(message).map_err(|e| ExportError::Encode(e.to_string()))?;
    sender
        .send(Message::Text(json))
        .await
        .map_err(|e| ExportError::Transport(e.to_string()))
}

/// GET / - latest record
async fn get_latest(State(server): State<Arc<BroadcastServer>>) -> Response {
    let latest = server.latest();
    if !latest.is_populated() {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(latest).into_response()
}

/// GET /ws - live update stream
async fn connect(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(server): State<Arc<BroadcastServer>>,
) -> Response {
    ws.on_upgrade(move |socket| server.stream_updates(socket, addr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn record_with_heart_rate(rate: f64) -> HealthRecord {
        let mut record = HealthRecord::new();
        record.apply("heartRate", rate);
        record
    }

    #[test]
    fn test_publish_reaches_all_subscribers() {
        let hub = BroadcastHub::new();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        let stats = hub.publish(UpdateMessage::new(record_with_heart_rate(70.0), "heartRate"));
        assert_eq!(stats, PublishStats { delivered: 2, dropped: 0 });

        assert_eq!(a.try_recv().unwrap().data.heart_rate, 70);
        assert_eq!(b.try_recv().unwrap().updated_key, "heartRate");
    }

    #[test]
    fn test_stalled_subscriber_does_not_block_others() {
        let hub = BroadcastHub::new();
        let mut stalled = hub.subscribe();
        let mut live = hub.subscribe();

        hub.publish(UpdateMessage::new(record_with_heart_rate(70.0), "heartRate"));
        assert!(live.try_recv().is_some());

        // `stalled` never drained its slot, so this one is dropped for it only
        let stats = hub.publish(UpdateMessage::new(record_with_heart_rate(75.0), "heartRate"));
        assert_eq!(stats, PublishStats { delivered: 1, dropped: 1 });
        assert_eq!(live.try_recv().unwrap().data.heart_rate, 75);

        assert_eq!(stalled.try_recv().unwrap().data.heart_rate, 70);
        assert!(stalled.try_recv().is_none());
        assert_eq!(hub.subscriber_count(), 2);
    }

    #[test]
    fn test_subscription_drop_deregisters() {
        let hub = BroadcastHub::new();
        let first = hub.subscribe();
        let second = hub.subscribe();
        assert_ne!(first.id(), second.id());
        assert_eq!(hub.subscriber_count(), 2);

        drop(first);
        assert_eq!(hub.subscriber_count(), 1);
        drop(second);
        assert_eq!(hub.subscriber_count(), 0);

        let stats = hub.publish(UpdateMessage::snapshot(HealthRecord::new()));
        assert_eq!(stats, PublishStats::default());
    }

    #[test]
    fn test_update_caches_record_and_publishes() {
        let server = BroadcastServer::new();
        let mut subscription = server.hub().subscribe();

        server
            .update(&record_with_heart_rate(80.0), "heartRate")
            .unwrap();

        assert_eq!(server.latest().heart_rate, 80);
        let message = subscription.try_recv().unwrap();
        assert_eq!(message.updated_key, "heartRate");
        assert_eq!(message.data.heart_rate, 80);
    }

    #[tokio::test]
    async fn test_get_latest_not_found_before_first_update() {
        let server = Arc::new(BroadcastServer::new());
        let response = server
            .router()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_latest_returns_snapshot() {
        let server = Arc::new(BroadcastServer::new());
        server
            .update(&record_with_heart_rate(80.0), "heartRate")
            .unwrap();

        let response = server
            .router()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["heartRate"], 80);
        assert_eq!(json["stepCount"], 0);
        assert!(json["time"].as_str().unwrap().starts_with('2'));
    }
}
