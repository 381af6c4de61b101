//! Websocket handler for Axum
//!
//! Upgrades authenticated connections, pumps the outbound channel into the
//! socket, and answers the client's keep-alive pings.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::Response,
};
use futures::{stream::StreamExt, SinkExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::state::AppState;

use super::{
    events::{ClientEvent, ServerEvent},
    session::{Outbound, Session},
};

#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    token: String,
}

/// Websocket handler - upgrades the HTTP connection after validating the
/// token passed as a query parameter (browsers cannot set headers here)
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
    Query(params): Query<WebSocketQuery>,
) -> Result<Response, StatusCode> {
    let claims = match app_state.jwt.validate_access_token(&params.token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!(error = %e, "Websocket auth failed: invalid token");
            return Err(StatusCode::UNAUTHORIZED);
        }
    };
    let user_id = claims.sub;

    tracing::info!(user_id = %user_id, "Websocket connection upgrade requested");

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, user_id, app_state)))
}

/// Handle one live connection until it disconnects or is reaped
async fn handle_socket(socket: WebSocket, user_id: Uuid, app_state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Channel feeding the socket writer task
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

    let session = Arc::new(Session::new(user_id, tx));
    let session_id = session.id;
    app_state.registry.register(Arc::clone(&session));

    // Acknowledge before anything else so the client learns its session id
    let _ = session.send(ServerEvent::Connected { session_id });

    // Writer task: pumps outbound commands into the socket
    let send_task = tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            match command {
                Outbound::Event(event) => match serde_json::to_string(&event) {
                    Ok(json) => {
                        if sender.send(Message::Text(json)).await.is_err() {
                            break; // Connection closed
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = ?e, "Failed to serialize live event");
                    }
                },
                Outbound::Probe => {
                    if sender.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Reader loop
    while let Some(msg) = receiver.next().await {
        let Ok(msg) = msg else { break };
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(ClientEvent::Ping) => {
                    session.touch();
                    let _ = session.send(ServerEvent::Pong);
                }
                Err(e) => {
                    tracing::warn!(
                        error = ?e,
                        message = %text,
                        "Unrecognized client event"
                    );
                    let _ = session.send(ServerEvent::Error {
                        message: "Invalid event format".to_string(),
                    });
                }
            },
            Message::Pong(_) => {
                // Answer to a liveness probe
                session.touch();
            }
            Message::Close(_) => {
                tracing::info!(session_id = %session_id, "Close frame received");
                break;
            }
            Message::Ping(_) => {
                // Axum answers transport pings automatically
                session.touch();
            }
            _ => {} // Ignore binary frames
        }
    }

    // Teardown; nothing is replayed for events missed from here on
    tracing::info!(session_id = %session_id, user_id = %user_id, "Session closing");
    app_state.registry.unregister(user_id, session_id);
    send_task.abort();
}
