//! WebSocket event types and serialization
//!
//! Defines all client-to-server and server-to-client event types
//! with type-safe serde serialization. Frames are JSON objects tagged by
//! `type` (snake_case) with camelCase fields.

use livechat_shared::{
    AgentId, ConversationId, ConversationStatus, CustomerId, CustomerInfo, Message, MessageId,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Events sent from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Customer opens the chat widget
    JoinChat {
        customer_id: CustomerId,
        #[serde(default)]
        customer_info: CustomerInfo,
    },

    /// Customer message; `message_id` makes retries idempotent
    SendMessage {
        content: String,
        #[serde(default)]
        message_id: Option<MessageId>,
    },

    /// One answer of the intake survey
    SurveyResponse { field: String, value: String },

    /// Agent opens the dashboard
    JoinAdmin { agent_id: AgentId },

    /// Agent takes the conversation away from the automated responder
    TakeoverConversation {
        conversation_id: ConversationId,
        agent_id: AgentId,
    },

    /// Agent reply in a conversation it owns
    AgentMessage {
        conversation_id: ConversationId,
        content: String,
        agent_id: AgentId,
    },

    /// Agent ends a conversation
    CloseConversation { conversation_id: ConversationId },

    /// Heartbeat ping to keep connection alive
    Ping,
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Events sent from server to client
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Sent to a customer after `join_chat` with the full history
    ConversationJoined {
        conversation_id: ConversationId,
        status: ConversationStatus,
        messages: Vec<Message>,
        survey_completed: bool,
    },

    /// New message in the conversation room
    MessageReceived { message: Message },

    /// Automated responder typing state
    TypingIndicator { is_typing: bool },

    /// Reply to a survey answer
    SurveyUpdated {
        survey_completed: bool,
        status: ConversationStatus,
    },

    /// A human agent took over the conversation
    AgentJoined { agent_id: AgentId },

    ConversationClosed { conversation_id: ConversationId },

    /// Dashboard live update (agents room)
    ConversationUpdate {
        conversation_id: ConversationId,
        status: ConversationStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        customer_info: Option<CustomerInfo>,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_live: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        agent_id: Option<AgentId>,
    },

    /// Message notification for the dashboard (agents room)
    NewMessage {
        conversation_id: ConversationId,
        message: Message,
        customer_info: CustomerInfo,
    },

    /// Agent join acknowledged
    AdminJoined { agent_id: AgentId },

    /// Takeover acknowledged, sent directly to the agent
    TakeoverSuccess { conversation_id: ConversationId },

    /// Heartbeat response
    Pong,

    /// Error message
    Error { code: String, message: String },

    /// Connection acknowledged
    Connected { connection_id: Uuid },
}
