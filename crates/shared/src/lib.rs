//! LiveChat Shared Types and Persistence
//!
//! Conversation types, the session store contract and its backends, shared by
//! the API server and its tests.

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use db::*;
pub use error::*;
pub use store::{
    AppendOutcome, ConversationFilter, ConversationPage, ConversationStore,
    MemoryConversationStore, PgConversationStore, StatusUpdate,
};
pub use types::*;
