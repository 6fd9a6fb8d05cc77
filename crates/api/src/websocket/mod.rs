//! WebSocket support for live chat
//!
//! Customers and agents share one endpoint; the first join event decides
//! which side a connection is on.
//!
//! # Architecture
//!
//! - **Connection**: One socket and its outbound event channel
//! - **Room**: Conversation rooms plus the agents room, for broadcasting events
//! - **Presence**: Who is behind each connection
//! - **State**: Per-instance WebSocket state shared across all connections
//! - **Handler**: Axum WebSocket route handler
//! - **Events**: Type-safe event definitions for client/server communication

pub mod connection;
pub mod events;
pub mod handler;
pub mod presence;
pub mod room;
pub mod state;

pub use handler::ws_handler;
pub use state::WebSocketState;
