//! WebSocket state management
//!
//! Maintains the connections, rooms, and presence of one server instance.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use livechat_shared::AgentId;

use super::connection::Connection;
use super::events::ServerEvent;
use super::presence::{Presence, PresenceRegistry};
use super::room::{Room, RoomManager};

/// WebSocket state shared across all connections of a server instance
#[derive(Clone)]
pub struct WebSocketState {
    /// All active connections indexed by connection id
    pub connections: Arc<RwLock<HashMap<Uuid, Arc<Connection>>>>,

    /// Room manager for conversation and agent rooms
    pub rooms: Arc<RoomManager>,

    /// Identity behind each connection
    pub presence: Arc<PresenceRegistry>,
}

impl WebSocketState {
    /// Create new WebSocket state
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            rooms: Arc::new(RoomManager::new()),
            presence: Arc::new(PresenceRegistry::new()),
        }
    }

    /// Add a connection
    pub async fn add_connection(&self, conn: Connection) -> Arc<Connection> {
        let conn = Arc::new(conn);
        let mut connections = self.connections.write().await;
        connections.insert(conn.id, Arc::clone(&conn));

        tracing::info!(
            connection_id = %conn.id,
            total_connections = connections.len(),
            "WebSocket connection added"
        );

        conn
    }

    /// Remove a connection along with its rooms and presence entries
    pub async fn remove_connection(&self, connection_id: &Uuid) -> Option<Presence> {
        let mut connections = self.connections.write().await;
        connections.remove(connection_id)?;

        self.rooms.remove_connection(connection_id).await;
        let presence = self.presence.remove(connection_id).await;

        tracing::info!(
            connection_id = %connection_id,
            presence = ?presence,
            remaining_connections = connections.len(),
            "WebSocket connection removed"
        );

        presence
    }

    /// Get a connection by ID
    pub async fn get_connection(&self, connection_id: &Uuid) -> Option<Arc<Connection>> {
        let connections = self.connections.read().await;
        connections.get(connection_id).cloned()
    }

    /// Send an event to one connection; false if it is gone
    pub async fn send_to(&self, connection_id: &Uuid, event: ServerEvent) -> bool {
        match self.get_connection(connection_id).await {
            Some(conn) => conn.send(event).is_ok(),
            None => false,
        }
    }

    /// Send an event to an agent's current connection; false if not connected
    pub async fn send_to_agent(&self, agent_id: &AgentId, event: ServerEvent) -> bool {
        match self.presence.agent_connection(agent_id).await {
            Some(connection_id) => self.send_to(&connection_id, event).await,
            None => false,
        }
    }

    pub async fn join_room(&self, room: Room, connection_id: &Uuid) -> bool {
        match self.get_connection(connection_id).await {
            Some(conn) => {
                self.rooms.join(room, conn).await;
                true
            }
            None => false,
        }
    }

    pub async fn leave_room(&self, room: &Room, connection_id: &Uuid) {
        self.rooms.leave(room, connection_id).await;
    }

    pub async fn broadcast(&self, room: &Room, event: ServerEvent) -> usize {
        self.rooms.broadcast(room, event).await
    }

    /// Get total number of active connections
    pub async fn connection_count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }

    /// Get statistics about the WebSocket state
    pub async fn get_stats(&self) -> WebSocketStats {
        let (customers, agents) = self.presence.counts().await;

        WebSocketStats {
            active_connections: self.connection_count().await,
            active_rooms: self.rooms.get_room_count().await,
            connected_customers: customers,
            connected_agents: agents,
        }
    }
}

impl Default for WebSocketState {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about WebSocket connections
#[derive(Debug, Clone, serde::Serialize)]
pub struct WebSocketStats {
    pub active_connections: usize,
    pub active_rooms: usize,
    pub connected_customers: usize,
    pub connected_agents: usize,
}
