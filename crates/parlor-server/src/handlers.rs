//! Connection handlers for the Parlor server.
//!
//! This module drives the per-connection gateway lifecycle: accept the
//! WebSocket, authenticate into the room, dispatch inbound commands to the
//! router, deliver outbound frames, and detect disconnect.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use bytes::BytesMut;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parlor_core::{Moderation, RouteError, Router as RoomRouter};
use parlor_protocol::{codec, ClientFrame, Participant, ParticipantId, ServerFrame};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The message router.
    pub router: RoomRouter,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let moderation = Moderation::new(
            config.auth.room_password.clone(),
            config.auth.admin_password.clone(),
        );

        Self {
            router: RoomRouter::new(moderation),
            config,
        }
    }
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone()));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    // Build router
    let app = Router::new()
        .route(&config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    // Bind and serve
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Parlor server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.router.stats();
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "participants": stats.participants,
        "muted": stats.muted,
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection.
///
/// Each connection moves through `Connected -> Authenticated ->
/// Disconnected`; the `session` option holds the participant once
/// authentication succeeds. Commands received before authentication are
/// ignored, and an unauthenticated disconnect routes nothing.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    let connection_id = ParticipantId::generate();

    debug!(connection = %connection_id, "WebSocket connected");

    // Split the WebSocket
    let (mut sender, mut receiver) = socket.split();

    // Delivery channel; the sending half is registered with the roster at
    // authentication.
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerFrame>();

    // Gateway state machine: `Some` once authenticated.
    let mut session: Option<Participant> = None;

    // Read buffer for partial frames
    let mut read_buffer = BytesMut::with_capacity(4096);

    'conn: loop {
        tokio::select! {
            biased;

            // Deliver frames routed to this connection
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(frame) => {
                        let kicked = matches!(frame, ServerFrame::Kicked);
                        if send_frame(&mut sender, &frame).await.is_err() {
                            break 'conn;
                        }
                        // Notify-then-terminate: the kick notice has been
                        // written; tear the transport down.
                        if kicked {
                            debug!(connection = %connection_id, "Kicked; closing transport");
                            break 'conn;
                        }
                    }
                    None => {
                        debug!(connection = %connection_id, "Delivery channel closed");
                        break 'conn;
                    }
                }
            }

            // Receive from WebSocket
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        let start = Instant::now();
                        metrics::record_message(data.len(), "inbound");
                        read_buffer.extend_from_slice(&data);

                        // Try to decode frames
                        loop {
                            match codec::decode_from::<ClientFrame>(&mut read_buffer) {
                                Ok(Some(frame)) => {
                                    if let Err(e) = handle_frame(
                                        frame,
                                        &connection_id,
                                        &mut session,
                                        &state,
                                        &mut sender,
                                        &outbound_tx,
                                    ).await {
                                        error!(connection = %connection_id, error = %e, "Frame handling error");
                                        break 'conn;
                                    }
                                }
                                Ok(None) => break,
                                Err(e) => {
                                    warn!(connection = %connection_id, error = %e, "Protocol error");
                                    metrics::record_error("protocol");
                                    break 'conn;
                                }
                            }
                        }

                        metrics::record_latency(start.elapsed().as_secs_f64());
                    }
                    Some(Ok(Message::Text(text))) => {
                        // Treat text as binary
                        read_buffer.extend_from_slice(text.as_bytes());
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break 'conn;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pongs
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break 'conn;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break 'conn;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break 'conn;
                    }
                }
            }
        }
    }

    // Authenticated connections announce their departure; an
    // unauthenticated close routes nothing. Idempotent after a kick.
    if session.is_some() {
        state.router.leave(&connection_id);
        metrics::set_active_participants(state.router.stats().participants);
    }

    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Handle a decoded frame.
async fn handle_frame(
    frame: ClientFrame,
    connection_id: &ParticipantId,
    session: &mut Option<Participant>,
    state: &Arc<AppState>,
    sender: &mut SplitSink<WebSocket, Message>,
    outbound: &mpsc::UnboundedSender<ServerFrame>,
) -> Result<()> {
    match frame {
        ClientFrame::Join {
            name,
            password,
            admin,
        } => {
            if session.is_some() {
                debug!(connection = %connection_id, "Join while authenticated; ignoring");
                return Ok(());
            }

            match state.router.join(
                connection_id.clone(),
                &name,
                &password,
                admin,
                outbound.clone(),
            ) {
                Ok(participant) => {
                    metrics::set_active_participants(state.router.stats().participants);
                    *session = Some(participant);
                }
                Err(e) => {
                    warn!(connection = %connection_id, error = %e, "Join rejected");
                    metrics::record_error("auth");
                    send_frame(sender, &ServerFrame::alert(e.to_string())).await?;
                }
            }
        }

        ClientFrame::Chat { content } => {
            let Some(participant) = session.as_ref() else {
                return Ok(());
            };

            // The payload cap is enforced here, before the router sees the
            // content.
            let result = if content.payload_size() > state.config.limits.max_payload_bytes {
                Err(RouteError::PayloadTooLarge)
            } else {
                state.router.chat(&participant.id, content)
            };

            if let Err(e) = result {
                debug!(connection = %connection_id, error = %e, "Chat rejected");
                metrics::record_error("route");
                send_frame(sender, &ServerFrame::alert(e.to_string())).await?;
            }
        }

        ClientFrame::Typing { active } => {
            if let Some(participant) = session.as_ref() {
                state.router.typing(&participant.id, active);
            }
        }

        ClientFrame::Admin { action } => {
            let Some(participant) = session.as_ref() else {
                return Ok(());
            };

            if let Err(e) = state.router.admin(&participant.id, action) {
                metrics::record_error("route");
                send_frame(sender, &ServerFrame::alert(e.to_string())).await?;
            }
            // A kick may have changed the participant count
            metrics::set_active_participants(state.router.stats().participants);
        }
    }

    Ok(())
}

/// Send a frame to the WebSocket.
async fn send_frame(sender: &mut SplitSink<WebSocket, Message>, frame: &ServerFrame) -> Result<()> {
    let data = codec::encode(frame)?;
    metrics::record_message(data.len(), "outbound");
    sender.send(Message::Binary(data.to_vec())).await?;
    Ok(())
}
