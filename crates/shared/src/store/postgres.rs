//! PostgreSQL conversation store
//!
//! Messages live in a JSONB array column. Appends are a single `UPDATE` that
//! concatenates onto the array, so the row lock serializes concurrent writers
//! and the duplicate check in the `WHERE` clause is re-evaluated after any
//! lock wait.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{AppendOutcome, ConversationFilter, ConversationPage, ConversationStore, StatusUpdate};
use crate::error::{StoreError, StoreResult};
use crate::types::{AgentId, Conversation, ConversationId, CustomerId, CustomerInfo, Message};

/// PostgreSQL unique violation
const UNIQUE_VIOLATION: &str = "23505";

const SELECT_COLUMNS: &str = r#"
    id, customer_id, customer_info, status, messages, survey_completed,
    agent_id, agent_takeover_at, is_live, created_at, updated_at, closed_at
"#;

#[derive(Debug, FromRow)]
struct ConversationRow {
    id: Uuid,
    customer_id: String,
    customer_info: Json<CustomerInfo>,
    status: String,
    messages: Json<Vec<Message>>,
    survey_completed: bool,
    agent_id: Option<String>,
    agent_takeover_at: Option<OffsetDateTime>,
    is_live: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    closed_at: Option<OffsetDateTime>,
}

impl TryFrom<ConversationRow> for Conversation {
    type Error = StoreError;

    fn try_from(row: ConversationRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse()
            .map_err(|e: crate::types::UnknownStatus| StoreError::Corrupt(e.to_string()))?;

        Ok(Conversation {
            id: ConversationId(row.id),
            customer_id: CustomerId(row.customer_id),
            customer_info: row.customer_info.0,
            status,
            messages: row.messages.0,
            survey_completed: row.survey_completed,
            agent_id: row.agent_id.map(AgentId),
            agent_takeover_at: row.agent_takeover_at,
            is_live: row.is_live,
            created_at: row.created_at,
            updated_at: row.updated_at,
            closed_at: row.closed_at,
        })
    }
}

/// Dashboard filter clause. Each bind is NULL when its filter is unset.
const FILTER_CLAUSE: &str = r#"
    ($1::text IS NULL OR status = $1)
    AND ($2::boolean IS NULL OR is_live = $2)
    AND ($3::text IS NULL OR agent_id = $3)
    AND ($4::text IS NULL
         OR customer_info->>'name' ILIKE $4 ESCAPE '\'
         OR customer_info->>'email' ILIKE $4 ESCAPE '\')
"#;

/// `ILIKE` pattern matching `term` anywhere, with wildcards in `term` escaped
fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn into_conversations(rows: Vec<ConversationRow>) -> StoreResult<Vec<Conversation>> {
    rows.into_iter().map(Conversation::try_from).collect()
}

/// Conversation store backed by the `conversations` table
#[derive(Clone)]
pub struct PgConversationStore {
    pool: PgPool,
}

impl PgConversationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn find_live_by_customer(
        &self,
        customer_id: &CustomerId,
    ) -> StoreResult<Option<Conversation>> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM conversations
             WHERE customer_id = $1 AND is_live
             ORDER BY created_at DESC
             LIMIT 1"
        ))
        .bind(customer_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Conversation::try_from).transpose()
    }

    async fn find_by_id(&self, id: ConversationId) -> StoreResult<Option<Conversation>> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM conversations WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Conversation::try_from).transpose()
    }

    async fn create(&self, conversation: Conversation) -> StoreResult<Conversation> {
        let result = sqlx::query_as::<_, ConversationRow>(&format!(
            "INSERT INTO conversations (
                id, customer_id, customer_info, status, messages, survey_completed,
                agent_id, agent_takeover_at, is_live, created_at, updated_at, closed_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             RETURNING {SELECT_COLUMNS}"
        ))
        .bind(conversation.id.0)
        .bind(conversation.customer_id.as_str())
        .bind(Json(&conversation.customer_info))
        .bind(conversation.status.as_str())
        .bind(Json(&conversation.messages))
        .bind(conversation.survey_completed)
        .bind(conversation.agent_id.as_ref().map(AgentId::as_str))
        .bind(conversation.agent_takeover_at)
        .bind(conversation.is_live)
        .bind(conversation.created_at)
        .bind(conversation.updated_at)
        .bind(conversation.closed_at)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Conversation::try_from(row),
            Err(sqlx::Error::Database(db_err))
                if db_err.code().is_some_and(|code| code == UNIQUE_VIOLATION) =>
            {
                Err(StoreError::LiveConversationExists(conversation.customer_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn append_message(
        &self,
        id: ConversationId,
        message: Message,
    ) -> StoreResult<AppendOutcome> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "UPDATE conversations
             SET messages = messages || jsonb_build_array($2::jsonb),
                 updated_at = NOW()
             WHERE id = $1
               AND NOT (messages @> jsonb_build_array(jsonb_build_object('id', $3::text)))
             RETURNING {SELECT_COLUMNS}"
        ))
        .bind(id.0)
        .bind(Json(&message))
        .bind(message.id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(AppendOutcome::Appended(row.try_into()?)),
            // Either the id is already present or the conversation is gone
            None => match self.find_by_id(id).await? {
                Some(existing) => Ok(AppendOutcome::Duplicate(existing)),
                None => Err(StoreError::NotFound(id)),
            },
        }
    }

    async fn update_status(
        &self,
        id: ConversationId,
        update: StatusUpdate,
    ) -> StoreResult<Conversation> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "UPDATE conversations
             SET status = $2,
                 survey_completed = $3,
                 agent_id = $4,
                 agent_takeover_at = $5,
                 is_live = $6,
                 closed_at = $7,
                 customer_info = COALESCE($8, customer_info),
                 messages = CASE
                     WHEN $9::jsonb IS NULL THEN messages
                     ELSE messages || jsonb_build_array($9::jsonb)
                 END,
                 updated_at = NOW()
             WHERE id = $1
             RETURNING {SELECT_COLUMNS}"
        ))
        .bind(id.0)
        .bind(update.status.as_str())
        .bind(update.survey_completed)
        .bind(update.agent_id.as_ref().map(AgentId::as_str))
        .bind(update.agent_takeover_at)
        .bind(update.is_live)
        .bind(update.closed_at)
        .bind(update.customer_info.as_ref().map(Json))
        .bind(update.append.as_ref().map(Json))
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(StoreError::NotFound(id))?.try_into()
    }

    async fn list_by_customer(
        &self,
        customer_id: &CustomerId,
        limit: usize,
    ) -> StoreResult<Vec<Conversation>> {
        let rows = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM conversations
             WHERE customer_id = $1
             ORDER BY created_at DESC
             LIMIT $2"
        ))
        .bind(customer_id.as_str())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        into_conversations(rows)
    }

    async fn list_conversations(
        &self,
        filter: &ConversationFilter,
        offset: usize,
        limit: usize,
    ) -> StoreResult<ConversationPage> {
        let status = filter.status.map(|s| s.as_str());
        let agent_id = filter.agent_id.as_ref().map(AgentId::as_str);
        let search = filter.search.as_deref().map(contains_pattern);

        let rows = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM conversations
             WHERE {FILTER_CLAUSE}
             ORDER BY updated_at DESC
             LIMIT $5 OFFSET $6"
        ))
        .bind(status)
        .bind(filter.is_live)
        .bind(agent_id)
        .bind(search.as_deref())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM conversations WHERE {FILTER_CLAUSE}"
        ))
        .bind(status)
        .bind(filter.is_live)
        .bind(agent_id)
        .bind(search.as_deref())
        .fetch_one(&self.pool)
        .await?;

        Ok(ConversationPage {
            conversations: into_conversations(rows)?,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
