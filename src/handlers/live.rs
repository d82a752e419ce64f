use crate::{auth::Principal, errors::ServiceError, events::LiveEvent, AppState};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Opens a live feed for one warehouse. Browsers pass the token as `?access_token=`.
#[utoipa::path(
    get,
    path = "/ws/warehouses/{warehouse_id}",
    params(("warehouse_id" = i32, Path, description = "Warehouse to follow")),
    responses(
        (status = 101, description = "Switching to WebSocket"),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not a member of this warehouse", body = crate::errors::ErrorResponse)
    ),
    tag = "live"
)]
pub async fn warehouse_feed(
    State(state): State<AppState>,
    principal: Principal,
    Path(warehouse_id): Path<i32>,
    ws: WebSocketUpgrade,
) -> Result<Response, ServiceError> {
    if principal.warehouse_id != Some(warehouse_id) {
        return Err(ServiceError::Forbidden(format!(
            "Not a member of warehouse {}",
            warehouse_id
        )));
    }

    // Subscribe before the upgrade so nothing published during the handshake is lost
    let receiver = state.live.subscribe(warehouse_id);
    let user_id = principal.user_id;
    Ok(ws.on_upgrade(move |socket| relay_events(socket, receiver, warehouse_id, user_id)))
}

async fn relay_events(
    mut socket: WebSocket,
    mut receiver: broadcast::Receiver<LiveEvent>,
    warehouse_id: i32,
    user_id: i64,
) {
    info!(warehouse_id, user_id, "Live subscriber connected");
    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.tick().await;

    loop {
        tokio::select! {
            result = receiver.recv() => {
                match result {
                    Ok(event) => {
                        let json = match serde_json::to_string(&event) {
                            Ok(json) => json,
                            Err(err) => {
                                warn!(warehouse_id, error = %err, "Failed to encode live event");
                                continue;
                            }
                        };
                        if socket.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(warehouse_id, skipped, "Live subscriber lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            _ = ping.tick() => {
                if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
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

    info!(warehouse_id, user_id, "Live subscriber disconnected");
}
