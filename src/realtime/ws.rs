use axum::{
    debug_handler,
    extract::{ws::{Message, WebSocket}, Query, State, WebSocketUpgrade},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::{session::CurrentUser, AppError, AppResult, AppState};

use super::{Filter, Hub};

#[derive(Debug, Deserialize)]
pub struct RealtimeQuery {
    tables: Option<String>,
    offer_id: Option<Uuid>,
    #[serde(default)]
    mine: bool,
}

impl RealtimeQuery {
    fn into_filter(self, user_id: Uuid) -> AppResult<Filter> {
        let tables = match self.tables {
            Some(raw) => Filter::parse_tables(&raw).map_err(AppError::bad_request)?,
            None => Vec::new(),
        };
        Ok(Filter {
            tables,
            offer_id: self.offer_id,
            user_id: self.mine.then_some(user_id),
        })
    }
}

#[debug_handler(state = AppState)]
pub async fn realtime_ws(
    CurrentUser(user_id): CurrentUser,
    Query(query): Query<RealtimeQuery>,
    State(hub): State<Hub>,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let filter = query.into_filter(user_id)?;

    tracing::debug!(%user_id, ?filter, "realtime subscriber");
    Ok(ws.on_upgrade(move |socket| forward_changes(socket, hub, filter)).into_response())
}

async fn forward_changes(mut socket: WebSocket, hub: Hub, filter: Filter) {
    let mut rx = hub.subscribe();

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(change) => {
                        if !filter.matches(&change) {
                            continue;
                        }
                        let Ok(text) = serde_json::to_string(&change) else {
                            continue;
                        };
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!("realtime subscriber lagged by {n} changes");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}
