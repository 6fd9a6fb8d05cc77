//! Session store contract
//!
//! The store is the single durable record of every conversation. Each method
//! is atomic with respect to a single conversation: an append either lands
//! completely (and is visible to the next read) or not at all.

mod memory;
mod postgres;

pub use memory::MemoryConversationStore;
pub use postgres::PgConversationStore;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::error::StoreResult;
use crate::types::{
    AgentId, Conversation, ConversationId, ConversationStatus, CustomerId, CustomerInfo, Message,
};

/// Status fields written together by a state transition.
///
/// Every status field is written as given, so build updates from the current
/// record with [`StatusUpdate::from_conversation`] and change only what the
/// transition touches. `customer_info` and `append` are applied only when set,
/// in the same write as the status fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: ConversationStatus,
    pub survey_completed: bool,
    pub agent_id: Option<AgentId>,
    pub agent_takeover_at: Option<OffsetDateTime>,
    pub is_live: bool,
    pub closed_at: Option<OffsetDateTime>,
    pub customer_info: Option<CustomerInfo>,
    pub append: Option<Message>,
}

impl StatusUpdate {
    pub fn from_conversation(conversation: &Conversation) -> Self {
        Self {
            status: conversation.status,
            survey_completed: conversation.survey_completed,
            agent_id: conversation.agent_id.clone(),
            agent_takeover_at: conversation.agent_takeover_at,
            is_live: conversation.is_live,
            closed_at: conversation.closed_at,
            customer_info: None,
            append: None,
        }
    }

    pub(crate) fn apply(self, conversation: &mut Conversation) {
        conversation.status = self.status;
        conversation.survey_completed = self.survey_completed;
        conversation.agent_id = self.agent_id;
        conversation.agent_takeover_at = self.agent_takeover_at;
        conversation.is_live = self.is_live;
        conversation.closed_at = self.closed_at;
        if let Some(info) = self.customer_info {
            conversation.customer_info = info;
        }
        if let Some(message) = self.append {
            conversation.messages.push(message);
        }
        conversation.updated_at = OffsetDateTime::now_utc();
    }
}

/// Dashboard list filters. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationFilter {
    pub status: Option<ConversationStatus>,
    pub is_live: Option<bool>,
    pub agent_id: Option<AgentId>,
    /// Case-insensitive substring of the customer's name or email
    pub search: Option<String>,
}

impl ConversationFilter {
    pub fn matches(&self, conversation: &Conversation) -> bool {
        if self.status.is_some_and(|status| status != conversation.status) {
            return false;
        }
        if self.is_live.is_some_and(|live| live != conversation.is_live) {
            return false;
        }
        if let Some(agent_id) = &self.agent_id {
            if conversation.agent_id.as_ref() != Some(agent_id) {
                return false;
            }
        }
        match &self.search {
            Some(term) => {
                let term = term.to_lowercase();
                let info = &conversation.customer_info;
                [&info.name, &info.email]
                    .into_iter()
                    .flatten()
                    .any(|field| field.to_lowercase().contains(&term))
            }
            None => true,
        }
    }
}

/// A page of conversations plus the number matching overall
#[derive(Debug, Clone)]
pub struct ConversationPage {
    pub conversations: Vec<Conversation>,
    pub total: u64,
}

/// Result of an idempotent append
#[derive(Debug, Clone)]
pub enum AppendOutcome {
    /// The message was appended; carries the updated conversation
    Appended(Conversation),
    /// A message with the same id already exists; nothing was written
    Duplicate(Conversation),
}

impl AppendOutcome {
    pub fn conversation(&self) -> &Conversation {
        match self {
            AppendOutcome::Appended(c) | AppendOutcome::Duplicate(c) => c,
        }
    }

    pub fn into_conversation(self) -> Conversation {
        match self {
            AppendOutcome::Appended(c) | AppendOutcome::Duplicate(c) => c,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, AppendOutcome::Duplicate(_))
    }
}

/// Durable conversation storage
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Newest live conversation for a customer
    async fn find_live_by_customer(&self, customer_id: &CustomerId)
        -> StoreResult<Option<Conversation>>;

    async fn find_by_id(&self, id: ConversationId) -> StoreResult<Option<Conversation>>;

    /// Insert a new conversation.
    ///
    /// Fails with [`crate::StoreError::LiveConversationExists`] when the
    /// customer already has a live conversation.
    async fn create(&self, conversation: Conversation) -> StoreResult<Conversation>;

    /// Append a message unless one with the same id is already present
    async fn append_message(&self, id: ConversationId, message: Message)
        -> StoreResult<AppendOutcome>;

    async fn update_status(&self, id: ConversationId, update: StatusUpdate)
        -> StoreResult<Conversation>;

    /// A customer's conversations, newest first
    async fn list_by_customer(&self, customer_id: &CustomerId, limit: usize)
        -> StoreResult<Vec<Conversation>>;

    /// One page of conversations matching `filter`, most recently active
    /// first, with the total match count
    async fn list_conversations(
        &self,
        filter: &ConversationFilter,
        offset: usize,
        limit: usize,
    ) -> StoreResult<ConversationPage>;

    /// Backend reachability check
    async fn ping(&self) -> StoreResult<()>;
}
