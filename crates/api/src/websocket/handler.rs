//! WebSocket handler for Axum
//!
//! Upgrades `/ws`, pumps outbound events from the connection channel, and
//! dispatches inbound events to the session service one at a time.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{stream::StreamExt, SinkExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::SessionResult;
use crate::session::SessionService;
use crate::state::AppState;

use super::{
    connection::Connection,
    events::{ClientEvent, ServerEvent},
};

/// WebSocket handler - upgrades HTTP connection to WebSocket.
///
/// Identity is claimed by the first `join_chat` or `join_admin` event.
pub async fn ws_handler(ws: WebSocketUpgrade, State(app_state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, app_state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Create channel for sending events to this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let ws_state = app_state.ws_state.clone();
    let conn = ws_state.add_connection(Connection::new(tx)).await;
    let connection_id = conn.id;

    // Send connection acknowledgment
    let _ = conn.send(ServerEvent::Connected { connection_id });

    // Spawn task to send messages to client
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to serialize WebSocket event");
                }
            }
        }
    });

    // Events of one connection are handled in order
    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(
                    connection_id = %connection_id,
                    error = ?e,
                    "WebSocket receive error"
                );
                break;
            }
        };

        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => {
                    handle_client_event(event, &conn, &app_state.sessions).await;
                }
                Err(e) => {
                    tracing::warn!(
                        connection_id = %connection_id,
                        error = %e,
                        "Failed to parse client event"
                    );
                    let _ = conn.send(ServerEvent::Error {
                        code: "INVALID_EVENT".to_string(),
                        message: "Invalid event format".to_string(),
                    });
                }
            },
            Message::Close(_) => {
                tracing::info!(connection_id = %connection_id, "WebSocket close frame received");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                // Axum handles ping/pong automatically
            }
            Message::Binary(_) => {}
        }
    }

    // Cleanup on disconnect
    let presence = app_state.sessions.disconnect(connection_id).await;
    tracing::info!(
        connection_id = %connection_id,
        presence = ?presence,
        "WebSocket connection closed"
    );

    send_task.abort();
}

/// Dispatch one client event, reporting failures to the sender only
async fn handle_client_event(
    event: ClientEvent,
    conn: &Arc<Connection>,
    sessions: &SessionService,
) {
    let event_type = event_name(&event);
    if let Err(e) = dispatch(event, conn, sessions).await {
        tracing::warn!(
            connection_id = %conn.id,
            event = event_type,
            code = e.code(),
            error = %e,
            "Client event failed"
        );
        let _ = conn.send(ServerEvent::Error {
            code: e.code().to_string(),
            message: e.client_message(),
        });
    }
}

async fn dispatch(
    event: ClientEvent,
    conn: &Arc<Connection>,
    sessions: &SessionService,
) -> SessionResult<()> {
    match event {
        ClientEvent::JoinChat {
            customer_id,
            customer_info,
        } => {
            sessions.join_chat(conn.id, customer_id, customer_info).await?;
        }

        ClientEvent::SendMessage {
            content,
            message_id,
        } => {
            // The automated reply runs detached; dropping the handle does not cancel it
            sessions.send_message(conn.id, &content, message_id).await?;
        }

        ClientEvent::SurveyResponse { field, value } => {
            sessions.survey_response(conn.id, &field, &value).await?;
        }

        ClientEvent::JoinAdmin { agent_id } => {
            sessions.join_admin(conn.id, agent_id).await?;
        }

        ClientEvent::TakeoverConversation {
            conversation_id,
            agent_id,
        } => {
            sessions.takeover(conn.id, conversation_id, agent_id).await?;
        }

        ClientEvent::AgentMessage {
            conversation_id,
            content,
            agent_id,
        } => {
            sessions
                .agent_message(conversation_id, &content, &agent_id)
                .await?;
        }

        ClientEvent::CloseConversation { conversation_id } => {
            sessions.close(conversation_id).await?;
        }

        ClientEvent::Ping => {
            let _ = conn.send(ServerEvent::Pong);
        }
    }

    Ok(())
}

fn event_name(event: &ClientEvent) -> &'static str {
    match event {
        ClientEvent::JoinChat { .. } => "join_chat",
        ClientEvent::SendMessage { .. } => "send_message",
        ClientEvent::SurveyResponse { .. } => "survey_response",
        ClientEvent::JoinAdmin { .. } => "join_admin",
        ClientEvent::TakeoverConversation { .. } => "takeover_conversation",
        ClientEvent::AgentMessage { .. } => "agent_message",
        ClientEvent::CloseConversation { .. } => "close_conversation",
        ClientEvent::Ping => "ping",
    }
}
