use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use bugle_chat::MessageService;
use bugle_db::Database;
use bugle_gateway::registry::OutboundFrame;
use bugle_gateway::{BroadcastDispatcher, ConnId, ConnectionRegistry, PresenceTracker};
use bugle_types::api::Claims;
use bugle_types::events::{GatewayCommand, GatewayEvent};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Everything a live connection needs, cloned per socket.
#[derive(Clone)]
pub struct Gateway {
    pub registry: Arc<ConnectionRegistry>,
    pub presence: PresenceTracker,
    pub dispatcher: BroadcastDispatcher,
    pub messages: MessageService,
    pub db: Arc<Database>,
}

/// Handle a pre-authenticated WebSocket connection. The JWT was already
/// validated at the HTTP upgrade layer (main.rs), so the connection is
/// registered immediately and goes straight into the event loop.
pub async fn handle_connection(socket: WebSocket, gateway: Gateway, claims: Claims) {
    let (mut sender, mut receiver) = socket.split();

    let conn_id: ConnId = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundFrame>();
    gateway.registry.register(conn_id, claims.sub, tx);

    info!("{} ({}) connected to gateway", claims.name, claims.sub);

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Writer task: broadcast frames -> client, with heartbeat. Frames for
    // one connection go through one mpsc, so per-connection ordering holds.
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                frame = rx.recv() => {
                    let Some(frame) = frame else { break };
                    if sender.send(Message::Text(frame.to_string().into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Reader task: commands from the client. Bad frames are logged and
    // dropped; the connection stays open for subsequent valid ones.
    let gw = gateway.clone();
    let claims_recv = claims.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&gw, conn_id, &claims_recv, cmd).await,
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            claims_recv.name,
                            claims_recv.sub,
                            e,
                            &text[..text.len().min(200)]
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // Evict first, then announce: the departed connection must not appear
    // in the recomputed presence lists.
    let left_channels = gateway.registry.unsubscribe_all(conn_id);
    for channel_id in left_channels {
        gateway.dispatcher.broadcast(
            channel_id,
            &GatewayEvent::UserLeft {
                channel_id,
                user_id: claims.sub,
                user_name: claims.name.clone(),
                online_users: gateway.presence.online_users(channel_id),
            },
        );
    }

    info!("{} ({}) disconnected from gateway", claims.name, claims.sub);
}

async fn handle_command(gateway: &Gateway, conn_id: ConnId, claims: &Claims, cmd: GatewayCommand) {
    match cmd {
        GatewayCommand::Join { channel_id } => {
            // Membership is the read gate; joins by non-members are dropped.
            let db = gateway.db.clone();
            let user_id = claims.sub;
            let member = tokio::task::spawn_blocking(move || {
                db.is_member(&channel_id.to_string(), &user_id.to_string())
            })
            .await;
            match member {
                Ok(Ok(true)) => {}
                Ok(Ok(false)) => {
                    warn!(
                        "{} ({}) join rejected for channel {}: not a member",
                        claims.name, claims.sub, channel_id
                    );
                    return;
                }
                Ok(Err(e)) => {
                    warn!("membership lookup failed: {:#}", e);
                    return;
                }
                Err(e) => {
                    warn!("spawn_blocking join error: {}", e);
                    return;
                }
            }

            gateway.registry.subscribe(conn_id, channel_id);
            info!("{} ({}) joined channel {}", claims.name, claims.sub, channel_id);

            gateway.dispatcher.broadcast(
                channel_id,
                &GatewayEvent::UserJoined {
                    channel_id,
                    user_id: claims.sub,
                    user_name: claims.name.clone(),
                    user_role: claims.role,
                    online_users: gateway.presence.online_users(channel_id),
                },
            );
        }

        GatewayCommand::Message { channel_id, body } => {
            let service = gateway.messages.clone();
            let author_id = claims.sub;
            let result = tokio::task::spawn_blocking(move || {
                service.post_message(channel_id, author_id, &body)
            })
            .await;
            match result {
                // The service broadcast on success; nothing more to do.
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    warn!(
                        "{} ({}) message to channel {} dropped: {}",
                        claims.name, claims.sub, channel_id, e
                    );
                }
                Err(e) => {
                    warn!("spawn_blocking join error: {}", e);
                }
            }
        }
    }
}
