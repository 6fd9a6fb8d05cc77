//! Session service
//!
//! Entry point for every client intent, from sockets and HTTP alike.

use std::sync::Arc;

use livechat_shared::{
    AgentId, Conversation, ConversationFilter, ConversationId, ConversationPage,
    ConversationStore, CustomerId, CustomerInfo, Message, MessageId, StoreError,
};
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::locks::ConversationLocks;
use super::machine::{self, TransitionKind};
use super::orchestrator::AutoReplyOrchestrator;
use super::router::MessageRouter;
use crate::config::{ReplyConfig, TypingConfig};
use crate::error::{SessionError, SessionResult};
use crate::reply::{ReplyGenerator, TypingPace};
use crate::websocket::events::ServerEvent;
use crate::websocket::presence::Presence;
use crate::websocket::room::Room;
use crate::websocket::WebSocketState;

/// Result of a customer `send_message`
#[derive(Debug)]
pub struct SendOutcome {
    pub message: Message,
    pub duplicate: bool,
    /// Background automated reply, when one was started
    pub auto_reply: Option<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn ConversationStore>,
    ws: WebSocketState,
    router: MessageRouter,
    orchestrator: AutoReplyOrchestrator,
    locks: Arc<ConversationLocks>,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        ws: WebSocketState,
        generator: Arc<dyn ReplyGenerator>,
        reply: &ReplyConfig,
        typing: TypingConfig,
    ) -> Self {
        let locks = Arc::new(ConversationLocks::new());
        let router = MessageRouter::new(Arc::clone(&store), ws.clone());
        let orchestrator = AutoReplyOrchestrator::new(
            Arc::clone(&store),
            router.clone(),
            generator,
            Arc::clone(&locks),
            TypingPace::new(typing),
            reply.history_window,
            reply.timeout,
        );

        Self {
            store,
            ws,
            router,
            orchestrator,
            locks,
        }
    }

    pub fn ws(&self) -> &WebSocketState {
        &self.ws
    }

    // =========================================================================
    // Customer
    // =========================================================================

    /// Attach a customer connection to its live conversation, creating one
    /// when needed.
    pub async fn join_chat(
        &self,
        connection_id: Uuid,
        customer_id: CustomerId,
        customer_info: CustomerInfo,
    ) -> SessionResult<Conversation> {
        let (opened, created) = self
            .open_conversation(customer_id.clone(), customer_info)
            .await?;

        let previous = self
            .ws
            .presence
            .register_customer(connection_id, customer_id.clone(), opened.id)
            .await;
        if let Some(Presence::Customer {
            conversation_id, ..
        }) = previous
        {
            if conversation_id != opened.id {
                self.ws
                    .leave_room(&Room::Conversation(conversation_id), &connection_id)
                    .await;
            }
        }
        self.ws
            .join_room(Room::Conversation(opened.id), &connection_id)
            .await;

        // Snapshot after joining the room: anything appended earlier is in the
        // snapshot and anything later arrives as a room event. Clients drop
        // overlap by message id.
        let conversation = self.load(opened.id).await?;

        self.ws
            .send_to(
                &connection_id,
                ServerEvent::ConversationJoined {
                    conversation_id: conversation.id,
                    status: conversation.status,
                    messages: conversation.messages.clone(),
                    survey_completed: conversation.survey_completed,
                },
            )
            .await;

        self.router
            .to_agents(ServerEvent::ConversationUpdate {
                conversation_id: conversation.id,
                status: conversation.status,
                customer_info: Some(conversation.customer_info.clone()),
                is_live: Some(true),
                agent_id: conversation.agent_id.clone(),
            })
            .await;

        tracing::info!(
            connection_id = %connection_id,
            customer_id = %customer_id,
            conversation_id = %conversation.id,
            created = created,
            "Customer joined chat"
        );

        Ok(conversation)
    }

    /// Customer message from a joined connection
    pub async fn send_message(
        &self,
        connection_id: Uuid,
        content: &str,
        message_id: Option<MessageId>,
    ) -> SessionResult<SendOutcome> {
        let conversation_id = self.joined_conversation(&connection_id).await?;
        let routed = self
            .router
            .route_customer_message(conversation_id, content, message_id)
            .await?;

        let automate = !routed.duplicate && machine::routes_to_automation(&routed.conversation);
        let auto_reply = if automate {
            Some(
                self.orchestrator
                    .spawn(routed.conversation, routed.message.clone()),
            )
        } else {
            None
        };

        Ok(SendOutcome {
            message: routed.message,
            duplicate: routed.duplicate,
            auto_reply,
        })
    }

    /// Record one survey answer for the connection's conversation
    pub async fn survey_response(
        &self,
        connection_id: Uuid,
        field: &str,
        value: &str,
    ) -> SessionResult<Conversation> {
        let conversation_id = self.joined_conversation(&connection_id).await?;

        let (conversation, kind) = {
            let _guard = self.locks.lock(conversation_id).await;
            let current = self.load(conversation_id).await?;
            let transition = machine::survey_response(&current, field, value)?;
            let updated = self
                .store
                .update_status(conversation_id, transition.update)
                .await?;
            (updated, transition.kind)
        };

        self.ws
            .send_to(
                &connection_id,
                ServerEvent::SurveyUpdated {
                    survey_completed: conversation.survey_completed,
                    status: conversation.status,
                },
            )
            .await;

        if kind == TransitionKind::SurveyCompleted {
            if let Some(handoff) = conversation.last_message() {
                self.router
                    .to_conversation(
                        conversation_id,
                        ServerEvent::MessageReceived {
                            message: handoff.clone(),
                        },
                    )
                    .await;
            }
            tracing::info!(conversation_id = %conversation_id, "Survey completed");
        }

        self.router
            .to_agents(ServerEvent::ConversationUpdate {
                conversation_id,
                status: conversation.status,
                customer_info: Some(conversation.customer_info.clone()),
                is_live: Some(conversation.is_live),
                agent_id: None,
            })
            .await;

        Ok(conversation)
    }

    // =========================================================================
    // Agent
    // =========================================================================

    pub async fn join_admin(&self, connection_id: Uuid, agent_id: AgentId) -> SessionResult<()> {
        if agent_id.as_str().trim().is_empty() {
            return Err(SessionError::Validation("agentId is required".to_string()));
        }

        self.ws
            .presence
            .register_agent(connection_id, agent_id.clone())
            .await;
        self.ws.join_room(Room::Agents, &connection_id).await;
        self.ws
            .send_to(
                &connection_id,
                ServerEvent::AdminJoined {
                    agent_id: agent_id.clone(),
                },
            )
            .await;

        tracing::info!(
            connection_id = %connection_id,
            agent_id = %agent_id,
            "Agent joined dashboard"
        );
        Ok(())
    }

    /// Hand a conversation to a human agent
    pub async fn takeover(
        &self,
        connection_id: Uuid,
        conversation_id: ConversationId,
        agent_id: AgentId,
    ) -> SessionResult<Conversation> {
        let (conversation, kind) = {
            let _guard = self.locks.lock(conversation_id).await;
            let current = self.load(conversation_id).await?;
            let transition = machine::takeover(&current, &agent_id, OffsetDateTime::now_utc())?;
            let updated = self
                .store
                .update_status(conversation_id, transition.update)
                .await?;
            (updated, transition.kind)
        };

        if let TransitionKind::TakenOver {
            previous_agent: Some(previous),
        } = &kind
        {
            if previous != &agent_id {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    previous_agent = %previous,
                    agent_id = %agent_id,
                    "Conversation reassigned to another agent"
                );
            }
        }

        self.ws
            .join_room(Room::Conversation(conversation_id), &connection_id)
            .await;
        self.router
            .to_conversation(
                conversation_id,
                ServerEvent::AgentJoined {
                    agent_id: agent_id.clone(),
                },
            )
            .await;
        self.router
            .to_agents(ServerEvent::ConversationUpdate {
                conversation_id,
                status: conversation.status,
                customer_info: None,
                is_live: None,
                agent_id: Some(agent_id.clone()),
            })
            .await;

        let ack = ServerEvent::TakeoverSuccess { conversation_id };
        if !self.router.to_agent(&agent_id, ack.clone()).await {
            self.ws.send_to(&connection_id, ack).await;
        }

        tracing::info!(
            conversation_id = %conversation_id,
            agent_id = %agent_id,
            "Conversation taken over"
        );
        Ok(conversation)
    }

    pub async fn agent_message(
        &self,
        conversation_id: ConversationId,
        content: &str,
        agent_id: &AgentId,
    ) -> SessionResult<Message> {
        let _guard = self.locks.lock(conversation_id).await;
        let routed = self
            .router
            .route_agent_message(conversation_id, content, agent_id)
            .await?;
        Ok(routed.message)
    }

    /// Close a conversation. Closing twice changes nothing.
    pub async fn close(&self, conversation_id: ConversationId) -> SessionResult<Conversation> {
        let (conversation, closed_now) = {
            let _guard = self.locks.lock(conversation_id).await;
            let current = self.load(conversation_id).await?;
            match machine::close(&current, OffsetDateTime::now_utc()) {
                Some(transition) => (
                    self.store
                        .update_status(conversation_id, transition.update)
                        .await?,
                    true,
                ),
                None => (current, false),
            }
        };

        if closed_now {
            self.router
                .to_conversation(
                    conversation_id,
                    ServerEvent::ConversationClosed { conversation_id },
                )
                .await;
            self.router
                .to_agents(ServerEvent::ConversationUpdate {
                    conversation_id,
                    status: conversation.status,
                    customer_info: None,
                    is_live: Some(false),
                    agent_id: None,
                })
                .await;
            tracing::info!(conversation_id = %conversation_id, "Conversation closed");
        }

        Ok(conversation)
    }

    /// Forget everything tied to a dropped connection
    pub async fn disconnect(&self, connection_id: Uuid) -> Option<Presence> {
        self.ws.remove_connection(&connection_id).await
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Find the customer's live conversation or start one.
    ///
    /// Returns whether the conversation was created.
    pub async fn open_conversation(
        &self,
        customer_id: CustomerId,
        customer_info: CustomerInfo,
    ) -> SessionResult<(Conversation, bool)> {
        if customer_id.as_str().trim().is_empty() {
            return Err(SessionError::Validation("customerId is required".to_string()));
        }

        if let Some(existing) = self.store.find_live_by_customer(&customer_id).await? {
            return Ok((existing, false));
        }

        match self
            .store
            .create(Conversation::new(customer_id.clone(), customer_info))
            .await
        {
            Ok(created) => Ok((created, true)),
            // Lost a race with another join for the same customer
            Err(StoreError::LiveConversationExists(_)) => self
                .store
                .find_live_by_customer(&customer_id)
                .await?
                .map(|existing| (existing, false))
                .ok_or_else(|| SessionError::Upstream("Live conversation vanished".to_string())),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> SessionResult<Conversation> {
        self.load(conversation_id).await
    }

    pub async fn customer_conversations(
        &self,
        customer_id: &CustomerId,
        limit: usize,
    ) -> SessionResult<Vec<Conversation>> {
        Ok(self.store.list_by_customer(customer_id, limit).await?)
    }

    /// One dashboard page; `page` counts from 1
    pub async fn list_conversations(
        &self,
        filter: &ConversationFilter,
        page: usize,
        limit: usize,
    ) -> SessionResult<ConversationPage> {
        let offset = page.saturating_sub(1).saturating_mul(limit);
        Ok(self.store.list_conversations(filter, offset, limit).await?)
    }

    async fn joined_conversation(&self, connection_id: &Uuid) -> SessionResult<ConversationId> {
        self.ws
            .presence
            .customer_conversation(connection_id)
            .await
            .ok_or_else(|| SessionError::Validation("Join a chat first".to_string()))
    }

    async fn load(&self, conversation_id: ConversationId) -> SessionResult<Conversation> {
        self.store
            .find_by_id(conversation_id)
            .await?
            .ok_or(SessionError::NotFound("Conversation"))
    }
}
