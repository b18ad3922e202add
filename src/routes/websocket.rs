use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::{
    error::{AppError, AppResult},
    middleware::auth::MaybeAdmin,
    models::auth::AdminSession,
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct WsQueryParams {
    /// For clients that cannot send the session cookie.
    pub token: Option<String>,
}

/// `GET /api/schools/live`: pushes `{type: "snapshot", schools, stats}` on
/// connect and after every change to the school records.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    MaybeAdmin(session): MaybeAdmin,
    Query(params): Query<WsQueryParams>,
) -> AppResult<Response> {
    let admin = match (session, params.token) {
        (Some(admin), _) => admin,
        (None, Some(token)) => state.auth.decode_token(&token)?,
        (None, None) => return Err(AppError::Unauthorized("Not signed in".into())),
    };
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, admin)))
}

async fn handle_socket(socket: WebSocket, state: AppState, admin: AdminSession) {
    info!("Live school feed opened by {}", admin.email);
    let (mut sender, mut receiver) = socket.split();
    let mut feed = state.schools.listen_for_changes();

    // Store changes → WebSocket. Aborting the task drops the feed, which
    // unsubscribes it.
    let mut feed_task = tokio::spawn(async move {
        while let Some(next) = feed.next().await {
            let msg = match next {
                Ok(snapshot) => json!({
                    "type": "snapshot",
                    "schools": snapshot.schools,
                    "stats": snapshot.stats,
                }),
                Err(e) => {
                    warn!("School snapshot failed: {}", e);
                    json!({ "type": "error", "error": e.to_string() })
                }
            };
            if sender
                .send(Message::Text(msg.to_string().into()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    // The client only sends control frames; a close ends the feed.
    let mut client_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut feed_task) => client_task.abort(),
        _ = (&mut client_task) => feed_task.abort(),
    }

    info!("Live school feed closed for {}", admin.email);
}
