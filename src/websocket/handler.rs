use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::models::{DocumentId, WsEvent};
use crate::ws::viewer::{Viewer, OUTBOUND_CAPACITY};
use crate::ws::SyncEngine;
use crate::services::auth_service::get_auth_token;
use crate::AppState;

/// Connection parameters, taken from the query string.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    #[serde(rename = "docId")]
    pub doc_id: Option<String>,
    pub name: Option<String>,
    pub token: Option<String>,
}

/// WebSocket handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    info!("New WebSocket connection attempt");
    let handshake = validate_handshake(&params);
    let token = get_auth_token(&headers, params.token.as_deref());

    ws.on_upgrade(move |socket| async move {
        let (doc_id, name) = match handshake {
            Ok(handshake) => handshake,
            Err(reason) => return reject(socket, reason).await,
        };
        if let Err(reason) = authorize(&state, &name, token).await {
            return reject(socket, reason).await;
        }
        handle_socket(socket, doc_id, name, state).await
    })
}

/// Both `docId` and `name` are mandatory; `docId` must be numeric.
pub fn validate_handshake(params: &ConnectParams) -> Result<(DocumentId, String), &'static str> {
    let doc_id = params
        .doc_id
        .as_deref()
        .and_then(|id| id.trim().parse::<DocumentId>().ok())
        .ok_or("No docId provided or wrong format")?;
    let name = params
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or("No name provided or wrong format")?;
    Ok((doc_id, name.to_string()))
}

async fn authorize(state: &AppState, name: &str, token: Option<String>) -> Result<(), &'static str> {
    let Some(identity) = &state.identity else {
        return Ok(());
    };
    let token = token.ok_or("No identity token provided")?;
    match identity.verify(name, &token).await {
        Ok(true) => Ok(()),
        Ok(false) => Err("Identity token rejected"),
        Err(e) => {
            error!("Identity verification for '{}' failed: {}", name, e);
            Err("Identity verification failed")
        }
    }
}

fn policy_close(reason: impl Into<String>) -> Message {
    let reason: String = reason.into();
    Message::Close(Some(CloseFrame {
        code: close_code::POLICY,
        reason: reason.into(),
    }))
}

async fn reject(mut socket: WebSocket, reason: &str) {
    warn!("Refusing WebSocket connection: {}", reason);
    if socket.send(policy_close(reason)).await.is_err() {
        warn!("Client went away before the refusal was sent");
    }
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, doc_id: DocumentId, name: String, state: AppState) {
    // Split the socket into sender and receiver
    let (mut sender, mut receiver) = socket.split();

    // Everything addressed to this viewer goes through one queue, drained
    // into the socket by a single writer task
    let (outbound, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);

    let viewer = match state.engine.join(doc_id, &name, outbound).await {
        Ok(viewer) => viewer,
        Err(e) => {
            warn!("Refusing viewer '{}' on document {}: {}", name, doc_id, e);
            if sender.send(policy_close(e.to_string())).await.is_err() {
                warn!("Client went away before the refusal was sent");
            }
            return;
        }
    };
    info!("WebSocket connection established for document {} as '{}' ({})", doc_id, name, viewer.id);

    let mut send_task = tokio::spawn(async move {
        while let Some(text) = outbound_rx.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let engine = state.engine.clone();
    let reader = viewer.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if !handle_frame(&engine, &reader, message).await {
                break;
            }
        }
    });

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    state.engine.leave(&viewer).await;
    info!("WebSocket connection terminated for '{}' on document {}", name, doc_id);
}

/// Process one inbound frame. Returns false once the connection should end.
async fn handle_frame(engine: &SyncEngine, viewer: &Viewer, message: Message) -> bool {
    match message {
        Message::Text(text) => {
            engine.handle_message(viewer, &text).await;
            true
        }
        Message::Binary(_) => viewer.send_event(&WsEvent::error("Binary messages are not supported")),
        Message::Close(_) => false,
        // Ping/pong is answered by the protocol layer
        _ => true,
    }
}
