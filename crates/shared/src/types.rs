//! Conversation domain types shared across the live-chat server

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// ID Wrappers
// =============================================================================

/// Conversation ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ConversationId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Declares an opaque string identifier issued by a client.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Stable customer identifier minted by the chat widget
    CustomerId
);

string_id!(
    /// Identifier of a human support agent
    AgentId
);

string_id!(
    /// Message identifier, doubling as the idempotency key for client retries
    MessageId
);

impl MessageId {
    /// Server-generated message id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Lifecycle status of a conversation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    /// Collecting customer details before assistance begins
    #[default]
    Survey,
    /// The automated responder answers customer messages
    Automated,
    /// A human agent owns the conversation
    HumanControlled,
    /// Terminal
    Closed,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Survey => "survey",
            ConversationStatus::Automated => "automated",
            ConversationStatus::HumanControlled => "human_controlled",
            ConversationStatus::Closed => "closed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConversationStatus::Closed)
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown conversation status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for ConversationStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "survey" => Ok(ConversationStatus::Survey),
            "automated" => Ok(ConversationStatus::Automated),
            "human_controlled" => Ok(ConversationStatus::HumanControlled),
            "closed" => Ok(ConversationStatus::Closed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSender {
    Customer,
    Automated,
    Agent,
}

// =============================================================================
// Customer Info
// =============================================================================

/// Contact details accumulated during the survey phase.
///
/// Known fields have typed slots; anything else the widget reports lands in
/// `extra`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shop_customer_id: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl CustomerInfo {
    /// Set a field by its wire name (camelCase or snake_case).
    pub fn set_field(&mut self, field: &str, value: String) {
        let slot = match field {
            "name" => &mut self.name,
            "email" => &mut self.email,
            "ipAddress" | "ip_address" => &mut self.ip_address,
            "userAgent" | "user_agent" => &mut self.user_agent,
            "shopCustomerId" | "shop_customer_id" => &mut self.shop_customer_id,
            other => {
                self.extra.insert(other.to_string(), value);
                return;
            }
        };
        *slot = Some(value);
    }

    /// Both required survey fields (`name`, `email`) are present and non-blank
    pub fn is_survey_complete(&self) -> bool {
        fn present(v: &Option<String>) -> bool {
            v.as_deref().is_some_and(|s| !s.trim().is_empty())
        }
        present(&self.name) && present(&self.email)
    }
}

// =============================================================================
// Messages
// =============================================================================

/// Informational data attached to automated replies. Never read by routing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,
}

impl MessageMetadata {
    pub fn is_empty(&self) -> bool {
        self.render_delay_ms.is_none() && self.model.is_none() && self.tokens_used.is_none()
    }
}

/// A single chat message. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender: MessageSender,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    #[serde(default, skip_serializing_if = "MessageMetadata::is_empty")]
    pub metadata: MessageMetadata,
}

impl Message {
    /// Customer message; honors the client-supplied id when present
    pub fn customer(id: Option<MessageId>, content: impl Into<String>) -> Self {
        Self {
            id: id.unwrap_or_else(MessageId::generate),
            sender: MessageSender::Customer,
            content: content.into(),
            timestamp: OffsetDateTime::now_utc(),
            agent_id: None,
            metadata: MessageMetadata::default(),
        }
    }

    pub fn automated(content: impl Into<String>, metadata: MessageMetadata) -> Self {
        Self {
            id: MessageId::generate(),
            sender: MessageSender::Automated,
            content: content.into(),
            timestamp: OffsetDateTime::now_utc(),
            agent_id: None,
            metadata,
        }
    }

    pub fn agent(agent_id: AgentId, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::generate(),
            sender: MessageSender::Agent,
            content: content.into(),
            timestamp: OffsetDateTime::now_utc(),
            agent_id: Some(agent_id),
            metadata: MessageMetadata::default(),
        }
    }
}

// =============================================================================
// Conversation
// =============================================================================

/// A customer conversation and its full message history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub customer_id: CustomerId,
    pub customer_info: CustomerInfo,
    pub status: ConversationStatus,
    pub messages: Vec<Message>,
    pub survey_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub agent_takeover_at: Option<OffsetDateTime>,
    pub is_live: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub closed_at: Option<OffsetDateTime>,
}

impl Conversation {
    /// Fresh live conversation in the survey phase
    pub fn new(customer_id: CustomerId, customer_info: CustomerInfo) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: ConversationId::new(),
            customer_id,
            customer_info,
            status: ConversationStatus::Survey,
            messages: Vec::new(),
            survey_completed: false,
            agent_id: None,
            agent_takeover_at: None,
            is_live: true,
            created_at: now,
            updated_at: now,
            closed_at: None,
        }
    }

    pub fn has_message(&self, id: &MessageId) -> bool {
        self.messages.iter().any(|m| &m.id == id)
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Up to `limit` messages immediately preceding message `id`, oldest first.
    ///
    /// Falls back to the tail of the whole sequence when `id` is unknown.
    pub fn history_before(&self, id: &MessageId, limit: usize) -> &[Message] {
        let end = self
            .messages
            .iter()
            .position(|m| &m.id == id)
            .unwrap_or(self.messages.len());
        let start = end.saturating_sub(limit);
        &self.messages[start..end]
    }
}
