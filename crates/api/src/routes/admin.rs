//! Agent dashboard routes

use axum::{
    extract::{Path, Query, State},
    Json,
};
use livechat_shared::{
    AgentId, Conversation, ConversationFilter, ConversationId, ConversationStatus, CustomerId,
    CustomerInfo,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::parse_conversation_id;
use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListConversationsQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
    pub status: Option<String>,
    pub is_live: Option<bool>,
    pub agent_id: Option<AgentId>,
    /// Matches customer name or email
    pub search: Option<String>,
}

impl ListConversationsQuery {
    fn filter(&self) -> ApiResult<ConversationFilter> {
        let status = self
            .status
            .as_deref()
            .map(str::parse::<ConversationStatus>)
            .transpose()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;

        Ok(ConversationFilter {
            status,
            is_live: self.is_live,
            agent_id: self.agent_id.clone().filter(|id| !id.as_str().is_empty()),
            search: self
                .search
                .as_deref()
                .map(str::trim)
                .filter(|term| !term.is_empty())
                .map(str::to_string),
        })
    }
}

/// Dashboard row; message bodies are left out
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminConversationSummary {
    pub id: ConversationId,
    pub customer_id: CustomerId,
    pub customer_info: CustomerInfo,
    pub status: ConversationStatus,
    pub is_live: bool,
    pub agent_id: Option<AgentId>,
    pub message_count: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub agent_takeover_at: Option<OffsetDateTime>,
}

impl From<Conversation> for AdminConversationSummary {
    fn from(c: Conversation) -> Self {
        Self {
            message_count: c.messages.len(),
            id: c.id,
            customer_id: c.customer_id,
            customer_info: c.customer_info,
            status: c.status,
            is_live: c.is_live,
            agent_id: c.agent_id,
            created_at: c.created_at,
            updated_at: c.updated_at,
            agent_takeover_at: c.agent_takeover_at,
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: u64,
    pub pages: u64,
}

impl Pagination {
    pub fn new(page: usize, limit: usize, total: u64) -> Self {
        let per_page = (limit as u64).max(1);
        Self {
            page,
            limit,
            total,
            pages: total.div_ceil(per_page),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AdminConversationList {
    pub conversations: Vec<AdminConversationSummary>,
    pub pagination: Pagination,
}

/// Filtered, paged conversations, most recently active first
pub async fn list_conversations(
    State(state): State<AppState>,
    Query(query): Query<ListConversationsQuery>,
) -> ApiResult<Json<AdminConversationList>> {
    let filter = query.filter()?;
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let result = state
        .sessions
        .list_conversations(&filter, page, limit)
        .await?;

    Ok(Json(AdminConversationList {
        conversations: result.conversations.into_iter().map(Into::into).collect(),
        pagination: Pagination::new(page, limit, result.total),
    }))
}

/// Full conversation record
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> ApiResult<Json<Conversation>> {
    let conversation_id = parse_conversation_id(&conversation_id)?;
    Ok(Json(state.sessions.get_conversation(conversation_id).await?))
}
