//! WebSocket signaling server
//!
//! Accepts WebSocket upgrades on the configured path and runs one
//! [`Session`] worker per connection.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::error::SignalingError;
use super::message::ServerMessage;
use super::registry::SessionRegistry;
use super::session::{CloseSignal, Session, SessionEvent};
use crate::config::ServerConfig;
use crate::engine::PeerConnectionFactory;

/// How long shutdown waits for sessions to release their connections
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Signaling server state
#[derive(Clone)]
pub struct SignalingServer {
    config: Arc<ServerConfig>,
    factory: Arc<dyn PeerConnectionFactory>,
    registry: Arc<SessionRegistry>,
    tls: Option<TlsAcceptor>,
}

impl SignalingServer {
    /// Create a new signaling server
    pub fn new(config: ServerConfig, factory: Arc<dyn PeerConnectionFactory>) -> Self {
        Self {
            config: Arc::new(config),
            factory,
            registry: Arc::new(SessionRegistry::new()),
            tls: None,
        }
    }

    /// Serve `wss://` instead of `ws://`
    pub fn with_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.registry.clone()
    }

    /// Bind the configured address and serve forever
    pub async fn run(&self) -> Result<(), SignalingError> {
        self.run_until(std::future::pending()).await
    }

    /// Bind the configured address and serve until `shutdown` resolves
    pub async fn run_until<F>(&self, shutdown: F) -> Result<(), SignalingError>
    where
        F: Future<Output = ()>,
    {
        let addr = self.config.bind_addr()?;
        let listener = TcpListener::bind(addr).await?;
        info!("Signaling server listening on {}{}", addr, self.config.ws_path);
        self.serve(listener, shutdown).await
    }

    /// Accept connections from `listener` until `shutdown` resolves.
    ///
    /// On shutdown every live session is signalled to tear down its
    /// connection, and connection tasks get [`SHUTDOWN_GRACE`] to finish
    /// before they are aborted.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<(), SignalingError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Signaling server shutting down ({} live sessions)", self.registry.len());
                    self.registry.close_all();
                    break;
                }
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        warn!("Connection task failed: {}", e);
                    }
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr)) => {
                            info!("New signaling connection from {}", peer_addr);
                            let server = self.clone();
                            connections.spawn(async move {
                                server.accept(stream, peer_addr).await;
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
            }
        }

        let drain = async {
            while connections.join_next().await.is_some() {}
        };
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_ok();
        if !drained {
            warn!("Aborting {} connections still open after shutdown", connections.len());
            connections.shutdown().await;
        }

        Ok(())
    }

    async fn accept(self, stream: TcpStream, peer_addr: SocketAddr) {
        let result = match &self.tls {
            Some(acceptor) => match acceptor.accept(stream).await {
                Ok(tls_stream) => self.handle_connection(tls_stream, peer_addr).await,
                Err(e) => {
                    warn!("TLS handshake failed for {}: {}", peer_addr, e);
                    return;
                }
            },
            None => self.handle_connection(stream, peer_addr).await,
        };

        if let Err(e) = result {
            warn!("Connection error for {}: {}", peer_addr, e);
        }
    }

    /// Handle a single WebSocket connection
    async fn handle_connection<S>(&self, stream: S, peer_addr: SocketAddr) -> Result<(), SignalingError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let ws_path = self.config.ws_path.clone();
        let check_path = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            if request.uri().path() == ws_path {
                Ok(response)
            } else {
                let mut rejection = ErrorResponse::new(Some("Not Found".to_string()));
                *rejection.status_mut() = StatusCode::NOT_FOUND;
                Err(rejection)
            }
        };

        let ws_stream = accept_hdr_async(stream, check_path)
            .await
            .map_err(|e| SignalingError::Handshake(e.to_string()))?;

        let session_id = Uuid::new_v4();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerMessage>();
        let close = CloseSignal::new();

        self.registry.insert(session_id, peer_addr, close.clone());
        info!(event = "ws.open", %session_id, ip = %peer_addr, "Session opened");

        let session = Session::new(
            session_id,
            self.factory.clone(),
            self.config.engine_config(),
            events_tx.clone(),
            outbound_tx,
        );
        let worker = tokio::spawn(session.run(events_rx, close.clone()));

        let (mut write, mut read) = ws_stream.split();

        // Ends once the session (the only outbound sender) has stopped
        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let json = match serde_json::to_string(&message) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize outbound message: {}", e);
                        continue;
                    }
                };
                if write.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
            let _ = write.close().await;
        });

        loop {
            let frame = tokio::select! {
                _ = close.closed() => break,
                frame = read.next() => frame,
            };
            let text = match frame {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Binary(data))) => String::from_utf8_lossy(&data).into_owned(),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    error!(event = "ws.error", %session_id, error = %e, "WebSocket error");
                    break;
                }
            };
            if events_tx.send(SessionEvent::Inbound(text)).is_err() {
                break;
            }
        }

        close.close();
        drop(events_tx);
        self.registry.remove(&session_id);

        if let Err(e) = worker.await {
            warn!(%session_id, "Session worker panicked: {}", e);
        }
        let _ = writer.await;

        Ok(())
    }
}
