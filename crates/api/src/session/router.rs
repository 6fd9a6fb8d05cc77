//! Message router
//!
//! Every message is persisted before anything is broadcast. Rooms:
//! - conversation room: the customer's tabs and the owning agent
//! - agents room: every connected dashboard
//! - direct: one agent's latest connection

use std::sync::Arc;

use livechat_shared::{
    AgentId, AppendOutcome, Conversation, ConversationId, ConversationStore, Message, MessageId,
};

use super::machine;
use crate::error::{SessionError, SessionResult};
use crate::websocket::events::ServerEvent;
use crate::websocket::room::Room;
use crate::websocket::WebSocketState;

/// A message that went through the router
#[derive(Debug, Clone)]
pub struct RoutedMessage {
    /// Conversation as returned by the append
    pub conversation: Conversation,
    pub message: Message,
    /// The message id was already present; nothing was written or broadcast
    pub duplicate: bool,
}

#[derive(Clone)]
pub struct MessageRouter {
    store: Arc<dyn ConversationStore>,
    ws: WebSocketState,
}

impl MessageRouter {
    pub fn new(store: Arc<dyn ConversationStore>, ws: WebSocketState) -> Self {
        Self { store, ws }
    }

    /// Persist a customer message and fan it out to the room and the agents.
    ///
    /// A repeated `message_id` is acknowledged without a second write.
    pub async fn route_customer_message(
        &self,
        conversation_id: ConversationId,
        content: &str,
        message_id: Option<MessageId>,
    ) -> SessionResult<RoutedMessage> {
        let content = validate_content(content)?;
        let conversation = self.load(conversation_id).await?;
        machine::accepts_customer_message(&conversation)?;

        let message = Message::customer(message_id, content);
        let outcome = self
            .store
            .append_message(conversation_id, message.clone())
            .await?;

        let duplicate = outcome.is_duplicate();
        let conversation = outcome.into_conversation();
        if duplicate {
            tracing::debug!(
                conversation_id = %conversation_id,
                message_id = %message.id,
                "Duplicate customer message ignored"
            );
        } else {
            self.fan_out(&conversation, &message).await;
        }

        Ok(RoutedMessage {
            conversation,
            message,
            duplicate,
        })
    }

    /// Persist an agent reply. Only the owning agent may speak, and its
    /// messages go to the conversation room only.
    pub async fn route_agent_message(
        &self,
        conversation_id: ConversationId,
        content: &str,
        agent_id: &AgentId,
    ) -> SessionResult<RoutedMessage> {
        let content = validate_content(content)?;
        let conversation = self.load(conversation_id).await?;
        machine::authorize_agent_message(&conversation, agent_id)?;

        let message = Message::agent(agent_id.clone(), content);
        let conversation = self
            .store
            .append_message(conversation_id, message.clone())
            .await?
            .into_conversation();

        self.to_conversation(
            conversation_id,
            ServerEvent::MessageReceived {
                message: message.clone(),
            },
        )
        .await;

        Ok(RoutedMessage {
            conversation,
            message,
            duplicate: false,
        })
    }

    /// Persist an automated message without broadcasting it.
    ///
    /// Returns the updated conversation when the message was written.
    pub async fn append_automated(
        &self,
        conversation_id: ConversationId,
        message: Message,
    ) -> SessionResult<Option<Conversation>> {
        match self.store.append_message(conversation_id, message).await? {
            AppendOutcome::Appended(conversation) => Ok(Some(conversation)),
            AppendOutcome::Duplicate(_) => Ok(None),
        }
    }

    /// Broadcast an already persisted automated message
    pub async fn broadcast_automated(&self, conversation: &Conversation, message: &Message) {
        self.fan_out(conversation, message).await;
    }

    pub async fn to_conversation(
        &self,
        conversation_id: ConversationId,
        event: ServerEvent,
    ) -> usize {
        self.ws
            .broadcast(&Room::Conversation(conversation_id), event)
            .await
    }

    pub async fn to_agents(&self, event: ServerEvent) -> usize {
        self.ws.broadcast(&Room::Agents, event).await
    }

    /// Deliver to an agent's latest connection; false when it is offline
    pub async fn to_agent(&self, agent_id: &AgentId, event: ServerEvent) -> bool {
        self.ws.send_to_agent(agent_id, event).await
    }

    async fn fan_out(&self, conversation: &Conversation, message: &Message) {
        self.to_conversation(
            conversation.id,
            ServerEvent::MessageReceived {
                message: message.clone(),
            },
        )
        .await;
        self.to_agents(ServerEvent::NewMessage {
            conversation_id: conversation.id,
            message: message.clone(),
            customer_info: conversation.customer_info.clone(),
        })
        .await;
    }

    async fn load(&self, conversation_id: ConversationId) -> SessionResult<Conversation> {
        self.store
            .find_by_id(conversation_id)
            .await?
            .ok_or(SessionError::NotFound("Conversation"))
    }
}

fn validate_content(content: &str) -> SessionResult<&str> {
    let content = content.trim();
    if content.is_empty() {
        Err(SessionError::Validation("Message content is required".to_string()))
    } else {
        Ok(content)
    }
}
