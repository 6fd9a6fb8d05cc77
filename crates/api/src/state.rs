//! Application state

use std::sync::Arc;

use livechat_shared::ConversationStore;

use crate::config::Config;
use crate::reply::ReplyGenerator;
use crate::session::SessionService;
use crate::websocket::WebSocketState;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn ConversationStore>,
    pub ws_state: WebSocketState,
    pub sessions: SessionService,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn ConversationStore>,
        generator: Arc<dyn ReplyGenerator>,
    ) -> Self {
        let ws_state = WebSocketState::new();
        let sessions = SessionService::new(
            Arc::clone(&store),
            ws_state.clone(),
            generator,
            &config.reply,
            config.typing,
        );

        Self {
            config: Arc::new(config),
            store,
            ws_state,
            sessions,
        }
    }
}
