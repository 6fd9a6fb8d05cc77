//! End-to-end session tests
//!
//! Drives the session service the way socket handlers do, against the
//! in-memory store and a scripted reply generator. Time is paused, so render
//! delays elapse instantly once every task is idle.
//!
//! ## Test Coverage
//! - Survey → automated handoff
//! - Automated replies, fallback, and typing indicators
//! - Takeover racing an in-flight reply
//! - Agent ownership, duplicate message ids, idempotent close
//! - One live conversation per customer
//! - Rejoining while messages land, failed persistence

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use livechat_api::config::{ReplyConfig, TypingConfig};
use livechat_api::reply::{
    GeneratedReply, ReplyError, ReplyGenerator, ReplyMeta, ReplyRequest, FALLBACK_MODEL,
    FALLBACK_REPLY,
};
use livechat_api::session::{SessionService, HANDOFF_MESSAGE};
use livechat_api::websocket::connection::Connection;
use livechat_api::websocket::events::ServerEvent;
use livechat_api::websocket::WebSocketState;
use livechat_api::SessionError;
use livechat_shared::{
    AgentId, AppendOutcome, Conversation, ConversationFilter, ConversationId, ConversationPage,
    ConversationStatus, ConversationStore, CustomerId, CustomerInfo, MemoryConversationStore,
    Message, MessageId, MessageSender, StatusUpdate, StoreError, StoreResult,
};
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

// ============================================================================
// Test Utilities
// ============================================================================

#[derive(Clone)]
enum Script {
    Reply {
        text: &'static str,
        delay: Option<Duration>,
    },
    Fail,
    Hang,
}

struct ScriptedGenerator {
    script: Script,
    requests: Mutex<Vec<ReplyRequest>>,
}

impl ScriptedGenerator {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<ReplyRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReplyGenerator for ScriptedGenerator {
    async fn generate(&self, request: ReplyRequest) -> Result<GeneratedReply, ReplyError> {
        self.requests.lock().unwrap().push(request);
        match self.script.clone() {
            Script::Reply { text, delay } => Ok(GeneratedReply {
                text: text.to_string(),
                render_delay: delay,
                meta: ReplyMeta {
                    model: Some("scripted".to_string()),
                    tokens_used: Some(7),
                },
            }),
            Script::Fail => Err(ReplyError::Upstream {
                status: 500,
                body: "boom".to_string(),
            }),
            Script::Hang => std::future::pending().await,
        }
    }
}

/// In-memory store that can fail appends and pause a live lookup after its
/// read, to widen race windows deterministically
#[derive(Default)]
struct TestStore {
    inner: MemoryConversationStore,
    fail_appends: AtomicBool,
    hold_live_lookup: AtomicBool,
    lookup_read: Notify,
    lookup_release: Notify,
}

#[async_trait]
impl ConversationStore for TestStore {
    async fn find_live_by_customer(
        &self,
        customer_id: &CustomerId,
    ) -> StoreResult<Option<Conversation>> {
        let found = self.inner.find_live_by_customer(customer_id).await?;
        if self.hold_live_lookup.swap(false, Ordering::SeqCst) {
            self.lookup_read.notify_one();
            self.lookup_release.notified().await;
        }
        Ok(found)
    }

    async fn find_by_id(&self, id: ConversationId) -> StoreResult<Option<Conversation>> {
        self.inner.find_by_id(id).await
    }

    async fn create(&self, conversation: Conversation) -> StoreResult<Conversation> {
        self.inner.create(conversation).await
    }

    async fn append_message(
        &self,
        id: ConversationId,
        message: Message,
    ) -> StoreResult<AppendOutcome> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.append_message(id, message).await
    }

    async fn update_status(
        &self,
        id: ConversationId,
        update: StatusUpdate,
    ) -> StoreResult<Conversation> {
        self.inner.update_status(id, update).await
    }

    async fn list_by_customer(
        &self,
        customer_id: &CustomerId,
        limit: usize,
    ) -> StoreResult<Vec<Conversation>> {
        self.inner.list_by_customer(customer_id, limit).await
    }

    async fn list_conversations(
        &self,
        filter: &ConversationFilter,
        offset: usize,
        limit: usize,
    ) -> StoreResult<ConversationPage> {
        self.inner.list_conversations(filter, offset, limit).await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.inner.ping().await
    }
}

struct Harness {
    store: Arc<TestStore>,
    ws: WebSocketState,
    sessions: SessionService,
    generator: Arc<ScriptedGenerator>,
}

impl Harness {
    fn new(script: Script) -> Self {
        let store = Arc::new(TestStore::default());
        let ws = WebSocketState::new();
        let generator = ScriptedGenerator::new(script);
        let reply = ReplyConfig {
            timeout: Duration::from_secs(5),
            ..ReplyConfig::default()
        };
        let sessions = SessionService::new(
            store.clone(),
            ws.clone(),
            generator.clone(),
            &reply,
            TypingConfig::default(),
        );
        Self {
            store,
            ws,
            sessions,
            generator,
        }
    }

    async fn connect(&self) -> (Uuid, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = self.ws.add_connection(Connection::new(tx)).await;
        (conn.id, rx)
    }

    /// Customer c1 who finished the survey as Al / a@b.com
    async fn automated_customer(
        &self,
    ) -> (Uuid, mpsc::UnboundedReceiver<ServerEvent>, Conversation) {
        let (conn, mut rx) = self.connect().await;
        self.sessions
            .join_chat(conn, CustomerId::from("c1"), CustomerInfo::default())
            .await
            .unwrap();
        self.sessions.survey_response(conn, "name", "Al").await.unwrap();
        let conversation = self
            .sessions
            .survey_response(conn, "email", "a@b.com")
            .await
            .unwrap();
        drain(&mut rx);
        (conn, rx, conversation)
    }

    async fn agent(&self, agent_id: &str) -> (Uuid, mpsc::UnboundedReceiver<ServerEvent>) {
        let (conn, mut rx) = self.connect().await;
        self.sessions
            .join_admin(conn, AgentId::from(agent_id))
            .await
            .unwrap();
        drain(&mut rx);
        (conn, rx)
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn typing_states(events: &[ServerEvent]) -> Vec<bool> {
    events
        .iter()
        .filter_map(|e| match e {
            ServerEvent::TypingIndicator { is_typing } => Some(*is_typing),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Survey
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_survey_hands_off_to_automation() {
    let h = Harness::new(Script::Reply {
        text: "unused",
        delay: None,
    });
    let (conn, mut rx) = h.connect().await;

    let joined = h
        .sessions
        .join_chat(conn, CustomerId::from("c1"), CustomerInfo::default())
        .await
        .unwrap();
    assert_eq!(joined.status, ConversationStatus::Survey);
    assert!(matches!(
        drain(&mut rx).as_slice(),
        [ServerEvent::ConversationJoined { survey_completed: false, .. }]
    ));

    let after_name = h.sessions.survey_response(conn, "name", "Al").await.unwrap();
    assert_eq!(after_name.status, ConversationStatus::Survey);
    assert!(after_name.messages.is_empty());

    let after_email = h
        .sessions
        .survey_response(conn, "email", "a@b.com")
        .await
        .unwrap();
    assert_eq!(after_email.status, ConversationStatus::Automated);
    assert!(after_email.survey_completed);
    assert_eq!(after_email.customer_info.name.as_deref(), Some("Al"));
    assert_eq!(after_email.messages.len(), 1);
    assert_eq!(after_email.messages[0].content, HANDOFF_MESSAGE);
    assert_eq!(after_email.messages[0].sender, MessageSender::Automated);

    let events = drain(&mut rx);
    assert!(matches!(
        events.as_slice(),
        [
            ServerEvent::SurveyUpdated { survey_completed: false, .. },
            ServerEvent::SurveyUpdated {
                survey_completed: true,
                status: ConversationStatus::Automated
            },
            ServerEvent::MessageReceived { .. },
        ]
    ));
}

#[tokio::test(start_paused = true)]
async fn test_survey_requires_join() {
    let h = Harness::new(Script::Fail);
    let (conn, _rx) = h.connect().await;

    let err = h.sessions.survey_response(conn, "name", "Al").await.unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));
}

// ============================================================================
// Automated replies
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_automated_reply_after_render_delay() {
    let h = Harness::new(Script::Reply {
        text: "We ship worldwide.",
        delay: None,
    });
    let (conn, mut rx, conversation) = h.automated_customer().await;

    let outcome = h
        .sessions
        .send_message(conn, "Do you ship to Canada?", None)
        .await
        .unwrap();
    outcome.auto_reply.expect("automated reply should start").await.unwrap();

    let events = drain(&mut rx);
    assert_eq!(typing_states(&events), vec![true, false]);
    match events.last() {
        Some(ServerEvent::MessageReceived { message }) => {
            assert_eq!(message.sender, MessageSender::Automated);
            assert_eq!(message.content, "We ship worldwide.");
            assert_eq!(message.metadata.model.as_deref(), Some("scripted"));
            assert_eq!(message.metadata.tokens_used, Some(7));
            assert!(message.metadata.render_delay_ms.unwrap() >= 800);
        }
        other => panic!("Expected automated message last, got {other:?}"),
    }

    let requests = h.generator.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].message, "Do you ship to Canada?");
    // History holds what came before the trigger
    assert_eq!(requests[0].history.len(), 1);
    assert_eq!(requests[0].history[0].content, HANDOFF_MESSAGE);
    assert_eq!(requests[0].customer_info.name.as_deref(), Some("Al"));

    let stored = h.store.find_by_id(conversation.id).await.unwrap().unwrap();
    assert_eq!(stored.messages.len(), 3);
    assert_eq!(stored.messages[1].sender, MessageSender::Customer);
}

#[tokio::test(start_paused = true)]
async fn test_generator_failure_sends_fallback() {
    let h = Harness::new(Script::Fail);
    let (conn, mut rx, _) = h.automated_customer().await;

    let outcome = h.sessions.send_message(conn, "hello?", None).await.unwrap();
    outcome.auto_reply.unwrap().await.unwrap();

    let events = drain(&mut rx);
    assert_eq!(typing_states(&events), vec![true, false]);
    match events.last() {
        Some(ServerEvent::MessageReceived { message }) => {
            assert_eq!(message.content, FALLBACK_REPLY);
            assert_eq!(message.metadata.model.as_deref(), Some(FALLBACK_MODEL));
            assert_eq!(message.metadata.render_delay_ms, None);
        }
        other => panic!("Expected fallback message last, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_generator_timeout_sends_fallback() {
    let h = Harness::new(Script::Hang);
    let (conn, mut rx, _) = h.automated_customer().await;

    let outcome = h.sessions.send_message(conn, "anyone?", None).await.unwrap();
    outcome.auto_reply.unwrap().await.unwrap();

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        ServerEvent::MessageReceived { message } if message.content == FALLBACK_REPLY
    )));
    assert_eq!(typing_states(&events), vec![true, false]);
}

#[tokio::test(start_paused = true)]
async fn test_takeover_during_render_delay_discards_reply() {
    let h = Harness::new(Script::Reply {
        text: "too late",
        delay: Some(Duration::from_secs(5)),
    });
    let (customer, mut customer_rx, conversation) = h.automated_customer().await;
    let (agent, _agent_rx) = h.agent("ag1").await;

    let outcome = h.sessions.send_message(customer, "help", None).await.unwrap();
    let in_flight = outcome.auto_reply.unwrap();

    // Let the orchestrator reach its render delay
    tokio::time::sleep(Duration::from_secs(1)).await;
    h.sessions
        .takeover(agent, conversation.id, AgentId::from("ag1"))
        .await
        .unwrap();
    in_flight.await.unwrap();

    let stored = h.sessions.get_conversation(conversation.id).await.unwrap();
    assert_eq!(stored.status, ConversationStatus::HumanControlled);
    assert_eq!(stored.agent_id, Some(AgentId::from("ag1")));
    assert!(stored.messages.iter().all(|m| m.content != "too late"));
    assert_eq!(stored.messages.len(), 2);

    let events = drain(&mut customer_rx);
    assert_eq!(typing_states(&events), vec![true, false]);
    assert!(events
        .iter()
        .any(|e| matches!(e, ServerEvent::AgentJoined { agent_id } if agent_id.as_str() == "ag1")));
}

#[tokio::test(start_paused = true)]
async fn test_human_controlled_messages_skip_automation() {
    let h = Harness::new(Script::Reply {
        text: "should not appear",
        delay: None,
    });
    let (customer, _rx, conversation) = h.automated_customer().await;
    let (agent, mut agent_rx) = h.agent("ag1").await;

    h.sessions
        .takeover(agent, conversation.id, AgentId::from("ag1"))
        .await
        .unwrap();
    let ack = drain(&mut agent_rx);
    assert!(ack
        .iter()
        .any(|e| matches!(
            e,
            ServerEvent::TakeoverSuccess { conversation_id } if *conversation_id == conversation.id
        )));

    let outcome = h.sessions.send_message(customer, "hi", None).await.unwrap();
    assert!(outcome.auto_reply.is_none());
    assert!(h.generator.requests().is_empty());

    // The owning agent joined the room and sees the customer message
    let events = drain(&mut agent_rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, ServerEvent::MessageReceived { message } if message.content == "hi")));
}

// ============================================================================
// Agents
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_non_owner_agent_message_rejected() {
    let h = Harness::new(Script::Fail);
    let (_customer, _rx, conversation) = h.automated_customer().await;
    let (agent, _agent_rx) = h.agent("ag1").await;
    h.sessions
        .takeover(agent, conversation.id, AgentId::from("ag1"))
        .await
        .unwrap();
    let before = h.sessions.get_conversation(conversation.id).await.unwrap();

    let err = h
        .sessions
        .agent_message(conversation.id, "hijack", &AgentId::from("ag2"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Unauthorized(_)));
    assert_eq!(err.code(), "UNAUTHORIZED");

    let after = h.sessions.get_conversation(conversation.id).await.unwrap();
    assert_eq!(before.messages, after.messages);

    let message = h
        .sessions
        .agent_message(conversation.id, "Hi Al, I'm here", &AgentId::from("ag1"))
        .await
        .unwrap();
    assert_eq!(message.sender, MessageSender::Agent);
    assert_eq!(message.agent_id, Some(AgentId::from("ag1")));
}

#[tokio::test(start_paused = true)]
async fn test_takeover_rules() {
    let h = Harness::new(Script::Fail);
    let (agent, _agent_rx) = h.agent("ag1").await;
    let (customer, _rx) = h.connect().await;
    let survey = h
        .sessions
        .join_chat(customer, CustomerId::from("c2"), CustomerInfo::default())
        .await
        .unwrap();

    let err = h
        .sessions
        .takeover(agent, survey.id, AgentId::from("ag1"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));

    let missing = h
        .sessions
        .takeover(agent, livechat_shared::ConversationId::new(), AgentId::from("ag1"))
        .await
        .unwrap_err();
    assert!(matches!(missing, SessionError::NotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn test_retakeover_last_writer_wins() {
    let h = Harness::new(Script::Fail);
    let (_customer, _rx, conversation) = h.automated_customer().await;
    let (first, _first_rx) = h.agent("ag1").await;
    let (second, _second_rx) = h.agent("ag2").await;

    h.sessions
        .takeover(first, conversation.id, AgentId::from("ag1"))
        .await
        .unwrap();
    let taken = h
        .sessions
        .takeover(second, conversation.id, AgentId::from("ag2"))
        .await
        .unwrap();

    assert_eq!(taken.agent_id, Some(AgentId::from("ag2")));
    assert!(h
        .sessions
        .agent_message(conversation.id, "still mine?", &AgentId::from("ag1"))
        .await
        .is_err());
}

// ============================================================================
// Messages
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_duplicate_message_id_is_ignored() {
    let h = Harness::new(Script::Reply {
        text: "ok",
        delay: None,
    });
    let (conn, _rx, conversation) = h.automated_customer().await;
    let id = Some(MessageId::from("msg_1700000000000"));

    let first = h.sessions.send_message(conn, "hi", id.clone()).await.unwrap();
    first.auto_reply.unwrap().await.unwrap();

    let retry = h.sessions.send_message(conn, "hi", id).await.unwrap();
    assert!(retry.duplicate);
    assert!(retry.auto_reply.is_none());

    let stored = h.sessions.get_conversation(conversation.id).await.unwrap();
    let copies = stored
        .messages
        .iter()
        .filter(|m| m.id.as_str() == "msg_1700000000000")
        .count();
    assert_eq!(copies, 1);
    assert_eq!(h.generator.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_agents_see_customer_messages() {
    let h = Harness::new(Script::Fail);
    let (_agent, mut agent_rx) = h.agent("ag1").await;
    let (conn, _rx) = h.connect().await;
    h.sessions
        .join_chat(conn, CustomerId::from("c3"), CustomerInfo::default())
        .await
        .unwrap();

    let events = drain(&mut agent_rx);
    assert!(matches!(
        events.as_slice(),
        [ServerEvent::ConversationUpdate { is_live: Some(true), .. }]
    ));

    let outcome = h.sessions.send_message(conn, "before survey", None).await.unwrap();
    assert!(outcome.auto_reply.is_none());
    let events = drain(&mut agent_rx);
    assert!(matches!(events.as_slice(), [ServerEvent::NewMessage { .. }]));
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_close_is_idempotent() {
    let h = Harness::new(Script::Fail);
    let (customer, mut rx, conversation) = h.automated_customer().await;
    let (agent, _agent_rx) = h.agent("ag1").await;
    h.sessions
        .takeover(agent, conversation.id, AgentId::from("ag1"))
        .await
        .unwrap();
    drain(&mut rx);

    let closed = h.sessions.close(conversation.id).await.unwrap();
    assert_eq!(closed.status, ConversationStatus::Closed);
    assert!(!closed.is_live);
    assert_eq!(closed.agent_id, None);
    let closed_at = closed.closed_at.expect("closedAt recorded");
    assert!(matches!(
        drain(&mut rx).as_slice(),
        [ServerEvent::ConversationClosed { .. }]
    ));

    tokio::time::sleep(Duration::from_secs(60)).await;
    let again = h.sessions.close(conversation.id).await.unwrap();
    assert_eq!(again.closed_at, Some(closed_at));
    assert!(drain(&mut rx).is_empty());

    let err = h.sessions.send_message(customer, "hello?", None).await.unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));
}

#[tokio::test(start_paused = true)]
async fn test_one_live_conversation_per_customer() {
    let h = Harness::new(Script::Fail);
    let (first_tab, _rx1) = h.connect().await;
    let (second_tab, _rx2) = h.connect().await;

    let first = h
        .sessions
        .join_chat(first_tab, CustomerId::from("c1"), CustomerInfo::default())
        .await
        .unwrap();
    let second = h
        .sessions
        .join_chat(second_tab, CustomerId::from("c1"), CustomerInfo::default())
        .await
        .unwrap();
    assert_eq!(first.id, second.id);

    h.sessions.close(first.id).await.unwrap();
    let (third_tab, _rx3) = h.connect().await;
    let fresh = h
        .sessions
        .join_chat(third_tab, CustomerId::from("c1"), CustomerInfo::default())
        .await
        .unwrap();
    assert_ne!(fresh.id, first.id);
    assert_eq!(fresh.status, ConversationStatus::Survey);

    let history = h
        .sessions
        .customer_conversations(&CustomerId::from("c1"), 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history.iter().filter(|c| c.is_live).count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_opens_share_one_conversation() {
    let h = Harness::new(Script::Fail);
    let customer = CustomerId::from("c9");

    let (a, b) = tokio::join!(
        h.sessions.open_conversation(customer.clone(), CustomerInfo::default()),
        h.sessions.open_conversation(customer.clone(), CustomerInfo::default()),
    );
    let (a, a_created) = a.unwrap();
    let (b, b_created) = b.unwrap();

    assert_eq!(a.id, b.id);
    assert!(a_created ^ b_created);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_clears_presence() {
    let h = Harness::new(Script::Fail);
    let (customer, _rx, _) = h.automated_customer().await;
    let (agent, _agent_rx) = h.agent("ag1").await;

    h.sessions.disconnect(customer).await;
    h.sessions.disconnect(agent).await;

    let stats = h.ws.get_stats().await;
    assert_eq!(stats.active_connections, 0);
    assert_eq!(stats.connected_customers, 0);
    assert_eq!(stats.connected_agents, 0);

    let err = h.sessions.send_message(customer, "gone", None).await.unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));
}

// ============================================================================
// Reconnects and persistence failures
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_rejoin_sees_message_sent_while_joining() {
    let h = Harness::new(Script::Fail);
    let (_first_tab, _rx, conversation) = h.automated_customer().await;
    let (agent, _agent_rx) = h.agent("ag1").await;
    h.sessions
        .takeover(agent, conversation.id, AgentId::from("ag1"))
        .await
        .unwrap();

    // Second tab's live lookup reads, then stalls until released
    let (second_tab, mut second_rx) = h.connect().await;
    h.store.hold_live_lookup.store(true, Ordering::SeqCst);
    let joining = {
        let sessions = h.sessions.clone();
        tokio::spawn(async move {
            sessions
                .join_chat(second_tab, CustomerId::from("c1"), CustomerInfo::default())
                .await
        })
    };
    h.store.lookup_read.notified().await;

    h.sessions
        .agent_message(conversation.id, "are you there?", &AgentId::from("ag1"))
        .await
        .unwrap();
    h.store.lookup_release.notify_one();
    let joined = joining.await.unwrap().unwrap();

    assert!(joined.messages.iter().any(|m| m.content == "are you there?"));
    let seen = drain(&mut second_rx).iter().any(|e| match e {
        ServerEvent::ConversationJoined { messages, .. } => {
            messages.iter().any(|m| m.content == "are you there?")
        }
        ServerEvent::MessageReceived { message } => message.content == "are you there?",
        _ => false,
    });
    assert!(seen, "second tab never saw the agent message");
}

#[tokio::test(start_paused = true)]
async fn test_failed_customer_append_is_not_broadcast() {
    let h = Harness::new(Script::Reply {
        text: "unused",
        delay: None,
    });
    let (customer, mut rx, conversation) = h.automated_customer().await;
    let (_agent, mut agent_rx) = h.agent("ag1").await;
    h.store.fail_appends.store(true, Ordering::SeqCst);

    let err = h.sessions.send_message(customer, "hello", None).await.unwrap_err();
    assert!(matches!(err, SessionError::Upstream(_)));
    assert_eq!(err.code(), "UPSTREAM_FAILURE");

    assert!(drain(&mut rx).is_empty());
    assert!(drain(&mut agent_rx).is_empty());
    assert!(h.generator.requests().is_empty());
    let stored = h.store.find_by_id(conversation.id).await.unwrap().unwrap();
    assert_eq!(stored.messages.len(), conversation.messages.len());
}

#[tokio::test(start_paused = true)]
async fn test_failed_automated_append_is_not_broadcast() {
    let h = Harness::new(Script::Reply {
        text: "never stored",
        delay: Some(Duration::from_secs(1)),
    });
    let (customer, mut rx, conversation) = h.automated_customer().await;

    let outcome = h.sessions.send_message(customer, "hello", None).await.unwrap();
    h.store.fail_appends.store(true, Ordering::SeqCst);
    outcome.auto_reply.unwrap().await.unwrap();

    let events = drain(&mut rx);
    assert_eq!(typing_states(&events), vec![true, false]);
    assert!(!events.iter().any(|e| matches!(
        e,
        ServerEvent::MessageReceived { message } if message.sender == MessageSender::Automated
    )));

    let stored = h.store.find_by_id(conversation.id).await.unwrap().unwrap();
    assert!(stored.messages.iter().all(|m| m.content != "never stored"));
}
