//! Room management for pub/sub
//!
//! A room is a logical broadcast group: every connection following one
//! conversation, or every connected agent.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use livechat_shared::ConversationId;

use super::connection::Connection;
use super::events::ServerEvent;

/// Broadcast group key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    /// The customer plus any agent that took the conversation over
    Conversation(ConversationId),
    /// Every connected agent dashboard
    Agents,
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::Conversation(id) => write!(f, "conversation:{id}"),
            Room::Agents => f.write_str("agents"),
        }
    }
}

/// Manages rooms for broadcasting events
pub struct RoomManager {
    /// Map of room -> list of connections
    rooms: Arc<RwLock<HashMap<Room, Vec<Arc<Connection>>>>>,
}

impl RoomManager {
    /// Create a new room manager
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Add a connection to a room. Joining twice is a no-op.
    pub async fn join(&self, room: Room, conn: Arc<Connection>) {
        let mut rooms = self.rooms.write().await;
        let members = rooms.entry(room).or_default();
        if members.iter().any(|c| c.id == conn.id) {
            return;
        }
        members.push(Arc::clone(&conn));

        tracing::debug!(
            room = %room,
            connection_id = %conn.id,
            room_size = members.len(),
            "Connection joined room"
        );
    }

    /// Remove a connection from a room
    pub async fn leave(&self, room: &Room, connection_id: &Uuid) {
        let mut rooms = self.rooms.write().await;
        if let Some(conns) = rooms.get_mut(room) {
            conns.retain(|c| c.id != *connection_id);

            // Clean up empty rooms
            if conns.is_empty() {
                rooms.remove(room);
                tracing::debug!(room = %room, "Removed empty room");
            } else {
                tracing::debug!(
                    room = %room,
                    connection_id = %connection_id,
                    room_size = conns.len(),
                    "Connection left room"
                );
            }
        }
    }

    /// Broadcast an event to all connections in a room
    ///
    /// Silently ignores send errors (closed connections will be cleaned up).
    /// Returns the number of connections that accepted the event.
    pub async fn broadcast(&self, room: &Room, event: ServerEvent) -> usize {
        let rooms = self.rooms.read().await;
        let Some(conns) = rooms.get(room) else {
            tracing::debug!(room = %room, "No subscribers for room");
            return 0;
        };

        let mut success_count = 0;
        let mut failed_count = 0;
        for conn in conns {
            match conn.send(event.clone()) {
                Ok(()) => success_count += 1,
                Err(_) => {
                    failed_count += 1;
                    tracing::warn!(
                        connection_id = %conn.id,
                        "Failed to send event to connection (likely closed)"
                    );
                }
            }
        }

        tracing::debug!(
            room = %room,
            recipients = success_count,
            failed = failed_count,
            "Broadcast event to room"
        );
        success_count
    }

    /// Remove a connection from all rooms
    pub async fn remove_connection(&self, connection_id: &Uuid) {
        let mut rooms = self.rooms.write().await;
        let mut removed_from = 0;

        for conns in rooms.values_mut() {
            let before_len = conns.len();
            conns.retain(|c| c.id != *connection_id);
            if conns.len() < before_len {
                removed_from += 1;
            }
        }

        // Clean up empty rooms
        rooms.retain(|_, conns| !conns.is_empty());

        if removed_from > 0 {
            tracing::debug!(
                connection_id = %connection_id,
                room_count = removed_from,
                "Removed connection from rooms"
            );
        }
    }

    pub async fn is_member(&self, room: &Room, connection_id: &Uuid) -> bool {
        let rooms = self.rooms.read().await;
        rooms
            .get(room)
            .is_some_and(|conns| conns.iter().any(|c| c.id == *connection_id))
    }

    /// Get room size (number of connections)
    pub async fn get_room_size(&self, room: &Room) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(room).map(|v| v.len()).unwrap_or(0)
    }

    /// Get total number of active rooms
    pub async fn get_room_count(&self) -> usize {
        let rooms = self.rooms.read().await;
        rooms.len()
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new()
    }
}
