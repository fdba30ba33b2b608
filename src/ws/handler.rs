//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{MatchHandle, PlayerInput};
use crate::http::ApiError;
use crate::util::rate_limit::PlayerRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Replies addressed to one connection only
const DIRECT_CHANNEL_CAPACITY: usize = 16;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub match_id: Uuid,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let handle = state
        .match_registry
        .get(&query.match_id)
        .ok_or_else(|| ApiError::NotFound(format!("no running match {}", query.match_id)))?;

    let rate_limit = state.config.input_rate_limit;
    info!(match_id = %handle.id, "WebSocket upgrade for match");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, handle, rate_limit)))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, handle: MatchHandle, rate_limit: u32) {
    let connection_id = Uuid::new_v4();
    info!(match_id = %handle.id, %connection_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    // Subscribe before the welcome so no tick falls between the two
    let tick_rx = handle.subscribe();

    let welcome = ServerMsg::Welcome {
        match_id: handle.id,
        tick: handle.tick(),
        server_time: unix_millis(),
    };
    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(%connection_id, error = %e, "Failed to send welcome");
        return;
    }

    run_session(connection_id, &handle, ws_sink, ws_stream, tick_rx, rate_limit).await;

    info!(match_id = %handle.id, %connection_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    connection_id: Uuid,
    handle: &MatchHandle,
    ws_sink: SplitSink<WebSocket, Message>,
    ws_stream: SplitStream<WebSocket>,
    tick_rx: broadcast::Receiver<ServerMsg>,
    rate_limit: u32,
) {
    let (direct_tx, direct_rx) = mpsc::channel(DIRECT_CHANNEL_CAPACITY);

    let mut writer_handle = tokio::spawn(write_loop(connection_id, ws_sink, tick_rx, direct_rx));
    let reader = read_loop(
        connection_id,
        ws_stream,
        handle.input_tx.clone(),
        direct_tx,
        PlayerRateLimiter::new(rate_limit),
    );

    tokio::select! {
        _ = &mut writer_handle => {}
        _ = reader => {}
    }
    writer_handle.abort();
}

/// Writer task: tick broadcasts and direct replies -> WebSocket
async fn write_loop(
    connection_id: Uuid,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut tick_rx: broadcast::Receiver<ServerMsg>,
    mut direct_rx: mpsc::Receiver<ServerMsg>,
) {
    loop {
        let msg = tokio::select! {
            received = tick_rx.recv() => match received {
                Ok(msg) => msg,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(
                        %connection_id,
                        lagged_count = n,
                        "Client lagged, skipping {} ticks", n
                    );
                    // Continue - don't disconnect for lag
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(%connection_id, "Tick channel closed");
                    break;
                }
            },
            Some(reply) = direct_rx.recv() => reply,
        };

        let is_end = matches!(msg, ServerMsg::MatchEnd { .. });
        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            debug!(%connection_id, error = %e, "WebSocket send failed");
            break;
        }
        if is_end {
            let _ = ws_sink.send(Message::Close(None)).await;
            break;
        }
    }
}

/// Reader loop: WebSocket -> match task
async fn read_loop(
    connection_id: Uuid,
    mut ws_stream: SplitStream<WebSocket>,
    input_tx: mpsc::Sender<PlayerInput>,
    direct_tx: mpsc::Sender<ServerMsg>,
    rate_limiter: PlayerRateLimiter,
) {
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(%connection_id, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(ClientMsg::Input { input }) => {
                        if input_tx.send(input).await.is_err() {
                            debug!(%connection_id, "Input channel closed");
                            break;
                        }
                    }
                    Ok(ClientMsg::Ping { t }) => {
                        let pong = ServerMsg::Pong {
                            t,
                            server_time: unix_millis(),
                        };
                        let _ = direct_tx.try_send(pong);
                    }
                    Err(e) => {
                        warn!(%connection_id, error = %e, "Failed to parse client message");
                        let _ = direct_tx.try_send(ServerMsg::Error {
                            code: "bad_message".to_string(),
                            message: e.to_string(),
                        });
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(%connection_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(%connection_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(%connection_id, error = %e, "WebSocket error");
                break;
            }
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
