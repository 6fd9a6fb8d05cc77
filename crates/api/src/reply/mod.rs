//! Automated reply generation
//!
//! The generator is an opaque collaborator: given the customer's message, a
//! bounded slice of history, and what we know about the customer, it returns
//! reply text. Callers never trust it to finish; a late result is simply
//! ignored.

pub mod openai;
pub mod pace;

use std::time::Duration;

use async_trait::async_trait;
use livechat_shared::{CustomerInfo, Message};

pub use openai::OpenAiReplyGenerator;
pub use pace::TypingPace;

/// Posted when generation fails or times out
pub const FALLBACK_REPLY: &str = "I'm having trouble processing your request right now. Let me connect you with a human agent who can help you better.";

/// Model name recorded on fallback messages
pub const FALLBACK_MODEL: &str = "fallback";

/// Input to a reply generator
#[derive(Debug, Clone)]
pub struct ReplyRequest {
    /// Content of the customer message being answered
    pub message: String,
    /// Messages preceding it, oldest first
    pub history: Vec<Message>,
    pub customer_info: CustomerInfo,
}

/// Informational data about a generated reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyMeta {
    pub model: Option<String>,
    pub tokens_used: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct GeneratedReply {
    pub text: String,
    /// Generator-chosen render delay; computed from the text when absent
    pub render_delay: Option<Duration>,
    pub meta: ReplyMeta,
}

#[derive(Debug, thiserror::Error)]
pub enum ReplyError {
    #[error("Reply generator is not configured")]
    NotConfigured,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Upstream returned an empty reply")]
    EmptyReply,
}

impl ReplyError {
    /// Returns true if this error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            ReplyError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ReplyError::Upstream { status, .. } => *status == 429 || *status >= 500,
            ReplyError::NotConfigured | ReplyError::EmptyReply => false,
        }
    }
}

/// Produces automated replies
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(&self, request: ReplyRequest) -> Result<GeneratedReply, ReplyError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ReplyError::Upstream {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(ReplyError::Upstream {
            status: 429,
            body: String::new()
        }
        .is_transient());
        assert!(!ReplyError::Upstream {
            status: 401,
            body: String::new()
        }
        .is_transient());
        assert!(!ReplyError::NotConfigured.is_transient());
    }
}
