//! WebSocket transport
//!
//! Accepts TCP connections, authenticates the upgrade request and runs one
//! task pair per connection:
//! - the reader parses client frames and hands them to the request handler
//! - the writer drains the connection's outbound channel into the socket
//!
//! Clients authenticate during the handshake with a bearer token in the
//! `Authorization` header or a `token` query parameter. Requests without a
//! valid token never get upgraded.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tracing::{debug, error, info, warn};
use tungstenite::http::StatusCode;
use tungstenite::http::header::AUTHORIZATION;
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::protocol::{CloseFrame, Message as WsMessage};
use uuid::Uuid;

use crate::auth::{Principal, TokenVerifier};
use crate::broker::Broker;
use crate::supervisor::Supervisor;
use crate::transport::connections::{Outbound, WsTransport};
use crate::transport::handler::{handle_request, parse_request};

/// Everything a connection task needs, cheap to clone per connection.
#[derive(Debug, Clone)]
pub struct Gateway {
    supervisor: Supervisor,
    transport: Arc<WsTransport>,
    verifier: TokenVerifier,
    max_connections: usize,
}

impl Gateway {
    pub fn new(
        supervisor: Supervisor,
        transport: Arc<WsTransport>,
        verifier: TokenVerifier,
        max_connections: usize,
    ) -> Self {
        Self {
            supervisor,
            transport,
            verifier,
            max_connections,
        }
    }

    pub fn broker(&self) -> &Arc<Broker> {
        self.supervisor.broker()
    }

    async fn handle_connection(self, stream: TcpStream, peer: SocketAddr) {
        let mut principal: Option<Principal> = None;
        let callback = |request: &Request, response: Response| {
            if self.broker().connection_count() >= self.max_connections {
                warn!(%peer, "rejecting connection: server at capacity");
                return Err(reject(StatusCode::SERVICE_UNAVAILABLE, "server at capacity"));
            }
            let token = extract_token(request).unwrap_or_default();
            match self.verifier.verify(&token) {
                Ok(verified) => {
                    principal = Some(verified);
                    Ok(response)
                }
                Err(e) => {
                    warn!(%peer, error = %e, "handshake rejected");
                    Err(reject(StatusCode::UNAUTHORIZED, "authentication failed"))
                }
            }
        };

        let ws_stream = match accept_hdr_async(stream, callback).await {
            Ok(ws) => ws,
            Err(e) => {
                debug!(%peer, error = %e, "WebSocket handshake failed");
                return;
            }
        };
        let Some(principal) = principal else {
            return;
        };

        let id = format!("conn-{}", Uuid::new_v4());
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

        self.transport.attach(&id, tx);
        if let Err(e) = self.broker().connect(id.clone(), principal) {
            error!(connection = %id, error = %e, "failed to register connection");
            self.transport.detach(&id);
            return;
        }

        // Forward queued frames broker -> client until told to close.
        let mut writer = {
            let id = id.clone();
            tokio::spawn(async move {
                while let Some(outbound) = rx.recv().await {
                    match outbound {
                        Outbound::Frame(msg) => {
                            if let Err(e) = ws_sender.send(msg).await {
                                debug!(connection = %id, error = %e, "failed to send frame");
                                break;
                            }
                        }
                        Outbound::Close(reason) => {
                            let frame = CloseFrame {
                                code: CloseCode::Normal,
                                reason: reason.into(),
                            };
                            let _ = ws_sender.send(WsMessage::Close(Some(frame))).await;
                            break;
                        }
                    }
                }
                debug!(connection = %id, "send loop closed");
            })
        };

        let reason = loop {
            tokio::select! {
                frame = ws_receiver.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => self.on_text(&id, text.as_str()),
                    Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {
                        self.supervisor.heartbeat(&id);
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break "client closed",
                    Some(Ok(_)) => {
                        debug!(connection = %id, "ignoring non-text frame");
                    }
                    Some(Err(e)) => {
                        debug!(connection = %id, error = %e, "read failed");
                        break "transport error";
                    }
                },
                _ = &mut writer => break "send loop closed",
            }
        };

        self.supervisor.on_disconnect(&id, reason);
        self.transport.detach(&id);
        writer.abort();
        info!(connection = %id, reason, "connection closed");
    }

    fn on_text(&self, id: &str, text: &str) {
        let reply = match parse_request(text) {
            Ok(request) => handle_request(&self.supervisor, id, request),
            Err(reply) => {
                warn!(
                    connection = %id,
                    frame = %text.chars().take(100).collect::<String>(),
                    "invalid client message"
                );
                reply
            }
        };

        if let Some(frame) = reply {
            if let Err(e) = self.transport.send_frame(id, &frame) {
                debug!(connection = %id, error = %e, "failed to queue reply");
            }
        }
    }
}

/// Binds `addr` and serves connections until the task is dropped.
pub async fn start_websocket_server(addr: String, gateway: Gateway) -> std::io::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!("WebSocket server listening on ws://{addr}");
    serve(listener, gateway).await;
    Ok(())
}

/// Accept loop over an already bound listener.
pub async fn serve(listener: TcpListener, gateway: Gateway) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let gateway = gateway.clone();
                tokio::spawn(gateway.handle_connection(stream, peer));
            }
            Err(e) => warn!(error = %e, "failed to accept connection"),
        }
    }
}

fn extract_token(request: &Request) -> Option<String> {
    let bearer = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string);

    bearer.or_else(|| {
        let query = request.uri().query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "token")
            .map(|(_, value)| value.into_owned())
    })
}

fn reject(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}
