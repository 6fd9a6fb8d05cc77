//! Error types for conversation persistence

use thiserror::Error;

use crate::types::{ConversationId, CustomerId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Conversation not found: {0}")]
    NotFound(ConversationId),

    #[error("Customer {0} already has a live conversation")]
    LiveConversationExists(CustomerId),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt conversation record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
