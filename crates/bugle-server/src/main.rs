mod connection;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, patch, post},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use bugle_api::middleware::require_auth;
use bugle_api::{AppState, AppStateInner, admin, messages, pins, reactions};
use bugle_chat::{ChatConfig, MessageService, PinService, ReactionAggregator};
use bugle_gateway::{BroadcastDispatcher, ConnectionRegistry, PresenceTracker};
use bugle_types::api::Claims;

use crate::connection::Gateway;

#[derive(Clone)]
struct GatewayState {
    gateway: Gateway,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bugle=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("BUGLE_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("BUGLE_DB_PATH").unwrap_or_else(|_| "bugle.db".into());
    let host = std::env::var("BUGLE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("BUGLE_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let chat_config = ChatConfig::from_env();

    // Init database
    let db = Arc::new(bugle_db::Database::open(&PathBuf::from(&db_path))?);

    // Shared state: one registry per server instance, torn down with it.
    let registry = Arc::new(ConnectionRegistry::new());
    let dispatcher = BroadcastDispatcher::new(registry.clone());
    let presence = PresenceTracker::new(registry.clone());
    let message_service = MessageService::new(db.clone(), dispatcher.clone(), chat_config);
    let reaction_service = ReactionAggregator::new(db.clone(), dispatcher.clone());
    let pin_service = PinService::new(db.clone(), dispatcher.clone());

    let app_state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        messages: message_service.clone(),
        reactions: reaction_service,
        pins: pin_service,
        jwt_secret: jwt_secret.clone(),
    });

    let gateway_state = GatewayState {
        gateway: Gateway {
            registry,
            presence,
            dispatcher,
            messages: message_service,
            db,
        },
        jwt_secret,
    };

    // Routes
    let protected_routes = Router::new()
        .route("/messages", post(messages::post_message))
        .route("/messages/{message_id}/reply", post(messages::post_reply))
        .route(
            "/messages/{message_id}/reactions",
            post(reactions::toggle_reaction).get(reactions::list_reactions),
        )
        .route(
            "/messages/{message_id}/pin",
            post(pins::pin_message).delete(pins::unpin_message),
        )
        .route("/channels/{channel_id}/messages", get(messages::list_messages))
        .route(
            "/channels/{channel_id}/moderation",
            patch(admin::update_channel_moderation),
        )
        .route(
            "/users/{user_id}/mute",
            post(admin::mute_user).delete(admin::unmute_user),
        )
        .layer(middleware::from_fn_with_state(app_state.clone(), require_auth))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(gateway_state);

    let app = Router::new()
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Bugle server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct GatewayAuth {
    token: String,
}

/// The socket endpoint authenticates before upgrading: a bad `?token=`
/// gets a 401 and no WebSocket at all.
async fn ws_upgrade(
    State(state): State<GatewayState>,
    Query(auth): Query<GatewayAuth>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let claims = decode::<Claims>(
        &auth.token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?
    .claims;

    Ok(ws.on_upgrade(move |socket| connection::handle_connection(socket, state.gateway, claims)))
}
