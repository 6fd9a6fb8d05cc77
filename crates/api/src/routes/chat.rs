//! Customer-facing chat routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use livechat_shared::{
    Conversation, ConversationId, ConversationStatus, CustomerId, CustomerInfo, Message,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::parse_conversation_id;
use crate::{error::ApiResult, state::AppState};

/// Conversations returned per customer
const CUSTOMER_HISTORY_LIMIT: usize = 10;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationHistory {
    pub id: ConversationId,
    pub status: ConversationStatus,
    pub messages: Vec<Message>,
    pub customer_info: CustomerInfo,
    pub survey_completed: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Conversation> for ConversationHistory {
    fn from(c: Conversation) -> Self {
        Self {
            id: c.id,
            status: c.status,
            messages: c.messages,
            customer_info: c.customer_info,
            survey_completed: c.survey_completed,
            created_at: c.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub status: ConversationStatus,
    pub last_message: Option<Message>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub is_live: bool,
}

impl From<Conversation> for ConversationSummary {
    fn from(mut c: Conversation) -> Self {
        Self {
            id: c.id,
            status: c.status,
            last_message: c.messages.pop(),
            created_at: c.created_at,
            is_live: c.is_live,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenConversationRequest {
    pub customer_id: CustomerId,
    #[serde(default)]
    pub customer_info: CustomerInfo,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenConversationResponse {
    pub id: ConversationId,
    pub status: ConversationStatus,
    pub messages: Vec<Message>,
    pub survey_completed: bool,
}

#[derive(Debug, Serialize)]
pub struct CloseConversationResponse {
    pub success: bool,
}

/// Full history of one conversation
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> ApiResult<Json<ConversationHistory>> {
    let conversation_id = parse_conversation_id(&conversation_id)?;
    let conversation = state.sessions.get_conversation(conversation_id).await?;
    Ok(Json(conversation.into()))
}

/// A customer's most recent conversations
pub async fn customer_conversations(
    State(state): State<AppState>,
    Path(customer_id): Path<CustomerId>,
) -> ApiResult<Json<Vec<ConversationSummary>>> {
    let conversations = state
        .sessions
        .customer_conversations(&customer_id, CUSTOMER_HISTORY_LIMIT)
        .await?;
    Ok(Json(conversations.into_iter().map(Into::into).collect()))
}

/// Reuse the customer's live conversation (200) or start one (201)
pub async fn open_conversation(
    State(state): State<AppState>,
    Json(req): Json<OpenConversationRequest>,
) -> ApiResult<(StatusCode, Json<OpenConversationResponse>)> {
    let (conversation, created) = state
        .sessions
        .open_conversation(req.customer_id, req.customer_info)
        .await?;

    if created {
        tracing::info!(
            conversation_id = %conversation.id,
            customer_id = %conversation.customer_id,
            "Conversation created over HTTP"
        );
    }

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(OpenConversationResponse {
            id: conversation.id,
            status: conversation.status,
            messages: conversation.messages,
            survey_completed: conversation.survey_completed,
        }),
    ))
}

/// Close a conversation and notify its room and the agents
pub async fn close_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> ApiResult<Json<CloseConversationResponse>> {
    let conversation_id = parse_conversation_id(&conversation_id)?;
    state.sessions.close(conversation_id).await?;
    Ok(Json(CloseConversationResponse { success: true }))
}
