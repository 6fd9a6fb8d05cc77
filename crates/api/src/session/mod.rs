//! Conversation sessions: state machine, routing, and automated replies

pub mod locks;
pub mod machine;
pub mod orchestrator;
pub mod router;
pub mod service;

pub use locks::ConversationLocks;
pub use machine::HANDOFF_MESSAGE;
pub use orchestrator::AutoReplyOrchestrator;
pub use router::{MessageRouter, RoutedMessage};
pub use service::{SendOutcome, SessionService};
