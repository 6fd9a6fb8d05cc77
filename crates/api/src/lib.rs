//! LiveChat API Library
//!
//! Conversation sessions, the customer/agent WebSocket endpoint, automated
//! replies, and the HTTP API around them.

pub mod config;
pub mod error;
pub mod reply;
pub mod routes;
pub mod session;
pub mod state;
pub mod websocket;

pub use config::Config;
pub use error::{ApiError, ApiResult, SessionError, SessionResult};
pub use session::SessionService;
pub use state::AppState;
