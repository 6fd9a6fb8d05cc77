//! Conversation state machine
//!
//! ```text
//! survey ──(name + email)──▶ automated ──(takeover)──▶ human_controlled ─┐
//!    │                          │                          ▲   (re-takeover)
//!    │                          │                          └──────────────┘
//!    └──────────────────────────┴──────────────(close)──────────▶ closed
//! ```
//!
//! Transitions are pure: each takes the current record and yields the
//! [`StatusUpdate`] to persist. Callers hold the conversation lock between
//! reading the record and writing the update.

use livechat_shared::{
    AgentId, Conversation, ConversationStatus, Message, MessageMetadata, StatusUpdate,
};
use time::OffsetDateTime;

use crate::error::{SessionError, SessionResult};

/// Appended when the survey completes
pub const HANDOFF_MESSAGE: &str = "Thanks! We're transferring you over to a rep!";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionKind {
    /// Survey answer stored; no status change
    SurveyFieldRecorded,
    /// `survey → automated` with the handoff message
    SurveyCompleted,
    /// `automated | human_controlled → human_controlled`
    TakenOver { previous_agent: Option<AgentId> },
    /// `* → closed`
    Closed,
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub kind: TransitionKind,
    pub update: StatusUpdate,
}

/// Record one survey answer, completing the survey when both required fields
/// are present for the first time.
pub fn survey_response(
    conversation: &Conversation,
    field: &str,
    value: &str,
) -> SessionResult<Transition> {
    let field = field.trim();
    let value = value.trim();
    if field.is_empty() {
        return Err(SessionError::Validation("Survey field is required".to_string()));
    }
    if value.is_empty() {
        return Err(SessionError::Validation(format!("A value for '{field}' is required")));
    }
    if conversation.status.is_terminal() {
        return Err(SessionError::Validation("Conversation is closed".to_string()));
    }

    let mut info = conversation.customer_info.clone();
    info.set_field(field, value.to_string());

    let mut update = StatusUpdate::from_conversation(conversation);
    let completes = !conversation.survey_completed
        && conversation.status == ConversationStatus::Survey
        && info.is_survey_complete();
    update.customer_info = Some(info);

    if !completes {
        return Ok(Transition {
            kind: TransitionKind::SurveyFieldRecorded,
            update,
        });
    }

    update.survey_completed = true;
    update.status = ConversationStatus::Automated;
    update.append = Some(Message::automated(HANDOFF_MESSAGE, MessageMetadata::default()));
    Ok(Transition {
        kind: TransitionKind::SurveyCompleted,
        update,
    })
}

/// Hand the conversation to `agent_id`. Last writer wins between agents.
pub fn takeover(
    conversation: &Conversation,
    agent_id: &AgentId,
    now: OffsetDateTime,
) -> SessionResult<Transition> {
    if agent_id.as_str().trim().is_empty() {
        return Err(SessionError::Validation("agentId is required".to_string()));
    }

    match conversation.status {
        ConversationStatus::Closed => Err(SessionError::Validation(
            "Conversation is closed".to_string(),
        )),
        ConversationStatus::Survey => Err(SessionError::Validation(
            "Conversation has not finished the survey".to_string(),
        )),
        ConversationStatus::Automated | ConversationStatus::HumanControlled => {
            let mut update = StatusUpdate::from_conversation(conversation);
            update.status = ConversationStatus::HumanControlled;
            update.agent_id = Some(agent_id.clone());
            update.agent_takeover_at = Some(now);
            Ok(Transition {
                kind: TransitionKind::TakenOver {
                    previous_agent: conversation.agent_id.clone(),
                },
                update,
            })
        }
    }
}

/// Close the conversation. `None` when it is already closed.
pub fn close(conversation: &Conversation, now: OffsetDateTime) -> Option<Transition> {
    if conversation.status.is_terminal() {
        return None;
    }

    let mut update = StatusUpdate::from_conversation(conversation);
    update.status = ConversationStatus::Closed;
    update.is_live = false;
    update.closed_at = Some(now);
    update.agent_id = None;
    Some(Transition {
        kind: TransitionKind::Closed,
        update,
    })
}

/// An agent may speak only in a conversation it currently owns
pub fn authorize_agent_message(
    conversation: &Conversation,
    agent_id: &AgentId,
) -> SessionResult<()> {
    let owns = conversation.status == ConversationStatus::HumanControlled
        && conversation.agent_id.as_ref() == Some(agent_id);
    if owns {
        Ok(())
    } else {
        Err(SessionError::Unauthorized(format!(
            "Agent {agent_id} does not own this conversation"
        )))
    }
}

/// Customers can write until the conversation closes
pub fn accepts_customer_message(conversation: &Conversation) -> SessionResult<()> {
    if conversation.status.is_terminal() {
        Err(SessionError::Validation("Conversation is closed".to_string()))
    } else {
        Ok(())
    }
}

/// Whether customer messages should reach the automated responder
pub fn routes_to_automation(conversation: &Conversation) -> bool {
    conversation.status == ConversationStatus::Automated
}

/// `agent_id` is set exactly when a human controls the conversation
pub fn agent_invariant_holds(conversation: &Conversation) -> bool {
    conversation.agent_id.is_some() == (conversation.status == ConversationStatus::HumanControlled)
}
