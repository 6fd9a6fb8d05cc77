//! Automated-reply orchestration
//!
//! One task per eligible customer message: show typing, ask the generator,
//! wait out the render delay, then append only if the conversation is still
//! automated. A takeover that lands while the task sleeps wins.

use std::sync::Arc;
use std::time::Duration;

use livechat_shared::{Conversation, ConversationId, ConversationStore, Message, MessageMetadata};
use tokio::task::JoinHandle;

use super::locks::ConversationLocks;
use super::machine;
use super::router::MessageRouter;
use crate::error::SessionResult;
use crate::reply::{ReplyGenerator, ReplyRequest, TypingPace, FALLBACK_MODEL, FALLBACK_REPLY};
use crate::websocket::events::ServerEvent;

#[derive(Clone)]
pub struct AutoReplyOrchestrator {
    store: Arc<dyn ConversationStore>,
    router: MessageRouter,
    generator: Arc<dyn ReplyGenerator>,
    locks: Arc<ConversationLocks>,
    pace: TypingPace,
    history_window: usize,
    timeout: Duration,
}

impl AutoReplyOrchestrator {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        router: MessageRouter,
        generator: Arc<dyn ReplyGenerator>,
        locks: Arc<ConversationLocks>,
        pace: TypingPace,
        history_window: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            router,
            generator,
            locks,
            pace,
            history_window,
            timeout,
        }
    }

    /// Answer `trigger` in the background
    pub fn spawn(&self, conversation: Conversation, trigger: Message) -> JoinHandle<()> {
        let orchestrator = self.clone();
        tokio::spawn(async move { orchestrator.run(conversation, trigger).await })
    }

    async fn run(&self, conversation: Conversation, trigger: Message) {
        let conversation_id = conversation.id;
        self.router
            .to_conversation(conversation_id, ServerEvent::TypingIndicator { is_typing: true })
            .await;

        let (message, delay) = self.compose(&conversation, &trigger).await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let delivered = match self.deliver(conversation_id, message.clone()).await {
            Ok(delivered) => delivered,
            Err(e) => {
                tracing::error!(
                    conversation_id = %conversation_id,
                    error = %e,
                    "Failed to persist automated reply"
                );
                None
            }
        };

        self.router
            .to_conversation(conversation_id, ServerEvent::TypingIndicator { is_typing: false })
            .await;

        if let Some(conversation) = delivered {
            self.router.broadcast_automated(&conversation, &message).await;
            tracing::info!(
                conversation_id = %conversation_id,
                message_id = %message.id,
                render_delay_ms = delay.as_millis() as u64,
                "Automated reply delivered"
            );
        }
    }

    /// Ask the generator, degrading to the fallback reply on any failure
    async fn compose(&self, conversation: &Conversation, trigger: &Message) -> (Message, Duration) {
        let request = ReplyRequest {
            message: trigger.content.clone(),
            history: conversation
                .history_before(&trigger.id, self.history_window)
                .to_vec(),
            customer_info: conversation.customer_info.clone(),
        };

        let generated = tokio::time::timeout(self.timeout, self.generator.generate(request)).await;
        let failure = match generated {
            Ok(Ok(reply)) if !reply.text.trim().is_empty() => {
                let text = reply.text.trim();
                let delay = reply
                    .render_delay
                    .unwrap_or_else(|| self.pace.render_delay(text));
                let metadata = MessageMetadata {
                    render_delay_ms: Some(delay.as_millis() as u64),
                    model: reply.meta.model,
                    tokens_used: reply.meta.tokens_used,
                };
                return (Message::automated(text, metadata), delay);
            }
            Ok(Ok(_)) => "empty reply".to_string(),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {}ms", self.timeout.as_millis()),
        };

        tracing::warn!(
            conversation_id = %conversation.id,
            error = %failure,
            "Reply generation failed; sending fallback"
        );

        let metadata = MessageMetadata {
            render_delay_ms: None,
            model: Some(FALLBACK_MODEL.to_string()),
            tokens_used: None,
        };
        (Message::automated(FALLBACK_REPLY, metadata), Duration::ZERO)
    }

    /// Re-check and append under the conversation lock
    async fn deliver(
        &self,
        conversation_id: ConversationId,
        message: Message,
    ) -> SessionResult<Option<Conversation>> {
        let _guard = self.locks.lock(conversation_id).await;

        let Some(current) = self.store.find_by_id(conversation_id).await? else {
            return Ok(None);
        };
        if !machine::routes_to_automation(&current) {
            tracing::info!(
                conversation_id = %conversation_id,
                status = %current.status,
                "Discarding automated reply; conversation left automated mode"
            );
            return Ok(None);
        }

        self.router.append_automated(conversation_id, message).await
    }
}
