//! In-process conversation store

use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::{AppendOutcome, ConversationFilter, ConversationPage, ConversationStore, StatusUpdate};
use crate::error::{StoreError, StoreResult};
use crate::types::{Conversation, ConversationId, CustomerId, Message};

/// Conversation store backed by a map. Used when no database is configured
/// and in tests.
#[derive(Default)]
pub struct MemoryConversationStore {
    conversations: RwLock<HashMap<ConversationId, Conversation>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored conversations
    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn find_live_by_customer(
        &self,
        customer_id: &CustomerId,
    ) -> StoreResult<Option<Conversation>> {
        let conversations = self.conversations.read().await;
        Ok(conversations
            .values()
            .filter(|c| c.is_live && &c.customer_id == customer_id)
            .max_by_key(|c| c.created_at)
            .cloned())
    }

    async fn find_by_id(&self, id: ConversationId) -> StoreResult<Option<Conversation>> {
        Ok(self.conversations.read().await.get(&id).cloned())
    }

    async fn create(&self, conversation: Conversation) -> StoreResult<Conversation> {
        let mut conversations = self.conversations.write().await;

        let live_exists = conversation.is_live
            && conversations
                .values()
                .any(|c| c.is_live && c.customer_id == conversation.customer_id);
        if live_exists {
            return Err(StoreError::LiveConversationExists(conversation.customer_id));
        }

        conversations.insert(conversation.id, conversation.clone());
        tracing::debug!(
            conversation_id = %conversation.id,
            customer_id = %conversation.customer_id,
            "Conversation created"
        );
        Ok(conversation)
    }

    async fn append_message(
        &self,
        id: ConversationId,
        message: Message,
    ) -> StoreResult<AppendOutcome> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if conversation.has_message(&message.id) {
            return Ok(AppendOutcome::Duplicate(conversation.clone()));
        }

        conversation.messages.push(message);
        conversation.updated_at = OffsetDateTime::now_utc();
        Ok(AppendOutcome::Appended(conversation.clone()))
    }

    async fn update_status(
        &self,
        id: ConversationId,
        update: StatusUpdate,
    ) -> StoreResult<Conversation> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        update.apply(conversation);
        Ok(conversation.clone())
    }

    async fn list_by_customer(
        &self,
        customer_id: &CustomerId,
        limit: usize,
    ) -> StoreResult<Vec<Conversation>> {
        let conversations = self.conversations.read().await;
        let mut matching: Vec<Conversation> = conversations
            .values()
            .filter(|c| &c.customer_id == customer_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn list_conversations(
        &self,
        filter: &ConversationFilter,
        offset: usize,
        limit: usize,
    ) -> StoreResult<ConversationPage> {
        let conversations = self.conversations.read().await;
        let mut matching: Vec<&Conversation> =
            conversations.values().filter(|c| filter.matches(c)).collect();
        matching.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        Ok(ConversationPage {
            total: matching.len() as u64,
            conversations: matching
                .into_iter()
                .skip(offset)
                .take(limit)
                .cloned()
                .collect(),
        })
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
