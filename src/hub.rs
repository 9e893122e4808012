// src/hub.rs - In-process realtime broadcast hub
//
// Connections join rooms keyed by city, role or user id; publishes fan an
// event out to every current member of one room. Delivery is best-effort and
// at-most-once: there is no backlog, and a connection that is not joined at
// publish time never sees the event. A failed or missing delivery is logged
// and never surfaces to the HTTP request that triggered the publish.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::auth::UserRole;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

// ==================== EVENT CATALOGUE ====================

pub mod events {
    pub const EMERGENCY_CREATED: &str = "emergency.created";
    pub const EMERGENCY_RESPONSE: &str = "emergency.response";
    pub const BLOOD_REQUEST_CREATED: &str = "blood.request.created";
    pub const BLOOD_REQUEST_ACCEPTED: &str = "blood.request.accepted";
    pub const BLOOD_REQUEST_CANCELLED: &str = "blood.request.cancelled";
}

// ==================== ROOMS ====================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoomKey {
    City(String),
    Role(UserRole),
    User(String),
}

impl std::fmt::Display for RoomKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomKey::City(city) => write!(f, "city:{}", city),
            RoomKey::Role(role) => write!(f, "role:{}", role),
            RoomKey::User(id) => write!(f, "user:{}", id),
        }
    }
}

/// Sending side of one connected client.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub id: u64,
    sender: mpsc::UnboundedSender<String>,
}

impl ClientHandle {
    fn send(&self, frame: String) -> bool {
        self.sender.send(frame).is_ok()
    }

    fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

// ==================== HUB ====================

#[derive(Default)]
pub struct BroadcastHub {
    rooms: RwLock<HashMap<RoomKey, Vec<ClientHandle>>>,
    next_id: AtomicU64,
    connections: AtomicU64,
    events_published: AtomicU64,
    delivery_failures: AtomicU64,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection and hand back its handle.
    pub fn connect(&self, sender: mpsc::UnboundedSender<String>) -> ClientHandle {
        self.connections.fetch_add(1, Ordering::Relaxed);
        ClientHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            sender,
        }
    }

    /// Add the connection to each room, skipping rooms it is already in.
    pub fn join(&self, client: &ClientHandle, rooms: &[RoomKey]) {
        let mut table = match self.rooms.write() {
            Ok(table) => table,
            Err(_) => {
                tracing::error!("Hub room table lock poisoned, join dropped");
                return;
            }
        };
        for room in rooms {
            let members = table.entry(room.clone()).or_default();
            if !members.iter().any(|m| m.id == client.id) {
                members.push(client.clone());
                tracing::debug!("Connection {} joined {}", client.id, room);
            }
        }
    }

    /// Deliver an event to every current member of `room`. Returns the
    /// number of connections the frame was handed to.
    pub fn publish(&self, room: &RoomKey, event: &str, payload: Value) -> usize {
        self.events_published.fetch_add(1, Ordering::Relaxed);
        let frame = json!({ "event": event, "data": payload }).to_string();

        let mut table = match self.rooms.write() {
            Ok(table) => table,
            Err(_) => {
                tracing::error!("Hub room table lock poisoned, publish '{}' dropped", event);
                return 0;
            }
        };

        let Some(members) = table.get_mut(room) else {
            tracing::debug!("Publish '{}' to empty room {}", event, room);
            return 0;
        };
        members.retain(|m| !m.is_closed());

        let mut delivered = 0;
        for member in members.iter() {
            if member.send(frame.clone()) {
                delivered += 1;
            } else {
                self.delivery_failures.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Failed to deliver '{}' to connection {}", event, member.id);
            }
        }
        if members.is_empty() {
            table.remove(room);
        }

        tracing::debug!("Published '{}' to {} ({} connections)", event, room, delivered);
        delivered
    }

    /// Remove the connection from every room it belongs to.
    pub fn disconnect(&self, client_id: u64) {
        let mut table = match self.rooms.write() {
            Ok(table) => table,
            Err(_) => {
                tracing::error!("Hub room table lock poisoned, disconnect dropped");
                return;
            }
        };
        table.retain(|_, members| {
            members.retain(|m| m.id != client_id);
            !members.is_empty()
        });
        self.connections.fetch_sub(1, Ordering::Relaxed);
        tracing::debug!("Connection {} disconnected", client_id);
    }

    pub fn connection_count(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }

    pub fn delivery_failures(&self) -> u64 {
        self.delivery_failures.load(Ordering::Relaxed)
    }

    pub fn room_size(&self, room: &RoomKey) -> usize {
        self.rooms
            .read()
            .map(|table| table.get(room).map(|m| m.len()).unwrap_or(0))
            .unwrap_or(0)
    }
}

// ==================== JOIN HANDSHAKE ====================

/// First text frame sent by a client after the upgrade.
#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub city: Option<String>,
    pub role: Option<String>,
    #[serde(rename = "userId", alias = "user_id")]
    pub user_id: Option<String>,
}

impl JoinRequest {
    pub fn rooms(&self) -> Vec<RoomKey> {
        let mut rooms = Vec::new();
        if let Some(city) = self.city.as_deref().filter(|c| !c.trim().is_empty()) {
            rooms.push(RoomKey::City(city.trim().to_string()));
        }
        if let Some(role) = self.role.as_deref() {
            match UserRole::from_str(role) {
                Some(role) => rooms.push(RoomKey::Role(role)),
                None => tracing::warn!("Join handshake carried unknown role '{}'", role),
            }
        }
        if let Some(user_id) = self.user_id.as_deref().filter(|u| !u.is_empty()) {
            rooms.push(RoomKey::User(user_id.to_string()));
        }
        rooms
    }
}

// ==================== WEBSOCKET ENDPOINT ====================

pub async fn ws_endpoint(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<Arc<AppState>>,
) -> ApiResult<HttpResponse> {
    let (response, session, msg_stream) = actix_ws::handle(&req, stream)
        .map_err(|e| ApiError::InternalServerError(format!("WebSocket upgrade failed: {}", e)))?;

    let hub = app_state.hub.clone();
    actix_web::rt::spawn(run_connection(hub, session, msg_stream));

    Ok(response)
}

async fn run_connection(
    hub: Arc<BroadcastHub>,
    mut session: actix_ws::Session,
    mut msg_stream: actix_ws::MessageStream,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let client = hub.connect(tx);
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    // First tick completes immediately; skip it
    heartbeat.tick().await;

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(frame) => {
                        if session.text(frame).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = msg_stream.next() => {
                match inbound {
                    Some(Ok(actix_ws::Message::Text(text))) => {
                        handle_client_frame(&hub, &client, &mut session, &text).await;
                    }
                    Some(Ok(actix_ws::Message::Ping(bytes))) => {
                        if session.pong(&bytes).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(actix_ws::Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!("WebSocket protocol error on connection {}: {}", client.id, e);
                        break;
                    }
                }
            }
            _ = heartbeat.tick() => {
                if session.ping(b"").await.is_err() {
                    break;
                }
            }
        }
    }

    hub.disconnect(client.id);
    let _ = session.close(None).await;
}

async fn handle_client_frame(
    hub: &BroadcastHub,
    client: &ClientHandle,
    session: &mut actix_ws::Session,
    text: &str,
) {
    let join: JoinRequest = match serde_json::from_str(text) {
        Ok(join) => join,
        Err(e) => {
            tracing::debug!("Ignoring malformed client frame: {}", e);
            return;
        }
    };

    let rooms = join.rooms();
    hub.join(client, &rooms);

    let room_names: Vec<String> = rooms.iter().map(|r| r.to_string()).collect();
    let ack = json!({ "event": "joined", "data": { "rooms": room_names } }).to_string();
    if session.text(ack).await.is_err() {
        tracing::debug!("Connection {} went away before join ack", client.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle_pair(hub: &BroadcastHub) -> (ClientHandle, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (hub.connect(tx), rx)
    }

    #[tokio::test]
    async fn test_publish_reaches_room_members_only() {
        let hub = BroadcastHub::new();
        let (metro, mut metro_rx) = handle_pair(&hub);
        let (coastal, mut coastal_rx) = handle_pair(&hub);

        hub.join(&metro, &[RoomKey::City("Metro".into())]);
        hub.join(&coastal, &[RoomKey::City("Coastal".into())]);

        let delivered = hub.publish(
            &RoomKey::City("Metro".into()),
            events::EMERGENCY_CREATED,
            json!({"id": "e1"}),
        );
        assert_eq!(delivered, 1);

        let frame = metro_rx.try_recv().expect("metro member receives");
        let parsed: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["event"], events::EMERGENCY_CREATED);
        assert_eq!(parsed["data"]["id"], "e1");

        assert!(coastal_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_join_is_idempotent() {
        let hub = BroadcastHub::new();
        let (donor, mut rx) = handle_pair(&hub);
        let room = RoomKey::Role(UserRole::Donor);

        hub.join(&donor, &[room.clone()]);
        hub.join(&donor, &[room.clone()]);
        assert_eq!(hub.room_size(&room), 1);

        hub.publish(&room, events::EMERGENCY_CREATED, json!({}));
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err(), "single membership, single delivery");
    }

    #[tokio::test]
    async fn test_connection_joins_multiple_rooms() {
        let hub = BroadcastHub::new();
        let (donor, mut rx) = handle_pair(&hub);
        hub.join(
            &donor,
            &[
                RoomKey::City("Metro".into()),
                RoomKey::Role(UserRole::Donor),
                RoomKey::User("d1".into()),
            ],
        );

        hub.publish(&RoomKey::City("Metro".into()), events::EMERGENCY_CREATED, json!({}));
        hub.publish(&RoomKey::User("d1".into()), events::EMERGENCY_RESPONSE, json!({}));
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_disconnect_removes_from_all_rooms() {
        let hub = BroadcastHub::new();
        let (donor, mut rx) = handle_pair(&hub);
        hub.join(
            &donor,
            &[RoomKey::City("Metro".into()), RoomKey::Role(UserRole::Donor)],
        );

        hub.disconnect(donor.id);

        assert_eq!(
            hub.publish(&RoomKey::City("Metro".into()), events::EMERGENCY_CREATED, json!({})),
            0
        );
        assert_eq!(
            hub.publish(&RoomKey::Role(UserRole::Donor), events::EMERGENCY_CREATED, json!({})),
            0
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_to_unknown_room_is_noop() {
        let hub = BroadcastHub::new();
        assert_eq!(
            hub.publish(&RoomKey::User("ghost".into()), events::BLOOD_REQUEST_CREATED, json!({})),
            0
        );
    }

    #[tokio::test]
    async fn test_closed_receiver_is_pruned() {
        let hub = BroadcastHub::new();
        let (client, rx) = handle_pair(&hub);
        let room = RoomKey::City("Metro".into());
        hub.join(&client, &[room.clone()]);
        drop(rx);

        assert_eq!(hub.publish(&room, events::EMERGENCY_CREATED, json!({})), 0);
        assert_eq!(hub.room_size(&room), 0);
    }

    #[test]
    fn test_join_request_rooms() {
        let join: JoinRequest =
            serde_json::from_str(r#"{"city":"Metro","role":"donor","userId":"d1"}"#).unwrap();
        let rooms = join.rooms();
        assert_eq!(rooms.len(), 3);
        assert!(rooms.contains(&RoomKey::City("Metro".into())));
        assert!(rooms.contains(&RoomKey::Role(UserRole::Donor)));
        assert!(rooms.contains(&RoomKey::User("d1".into())));

        let join: JoinRequest = serde_json::from_str(r#"{"role":"wizard"}"#).unwrap();
        assert!(join.rooms().is_empty());
    }

    #[test]
    fn test_room_key_display() {
        assert_eq!(RoomKey::City("Metro".into()).to_string(), "city:Metro");
        assert_eq!(RoomKey::Role(UserRole::BloodBank).to_string(), "role:bloodbank");
        assert_eq!(RoomKey::User("u9".into()).to_string(), "user:u9");
    }
}
