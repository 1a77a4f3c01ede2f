//! WebSocket listener: accept loop, admission, and session hand-off.
//!
//! For every accepted TCP connection the server:
//!
//! 1. Rejects the HTTP upgrade with **404** if the path is not `/ws`, or with
//!    **503 "Device already connected"** if a session is live.  Nothing is
//!    read from a rejected peer.
//! 2. Completes the upgrade with the 5 KB frame limit.
//! 3. Waits (up to the read timeout) for the first frame, decodes it, and runs
//!    it through the [`Authenticator`].  On any failure the connection is
//!    closed without an error frame.
//! 4. Creates a [`Session`], claims the [`SessionContext`] slot, starts the
//!    pumps with the [`EventRouter`] as the message sink, and waits for the
//!    session to close so the slot can be released.
//!
//! The accept loop polls `listener.accept()` with a 200 ms timeout so it can
//! notice the shared `running` flag being cleared (see `main.rs`).

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use eco_core::protocol::messages::WS_PATH;
use eco_core::{decode_message, Message, ProtocolError};
use futures_util::StreamExt;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{accept_hdr_async_with_config, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::application::{
    AuthError, Authenticator, ContextError, DeviceLink, EventRouter, MessageSink, SessionContext,
};
use crate::domain::DaemonConfig;
use crate::infrastructure::session::{websocket_config, Session, SessionConfig};

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Body of the 503 sent while another device session is live.
pub const ALREADY_CONNECTED_BODY: &str = "Device already connected";

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that stop the server itself.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("listener error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a single connection attempt did not become a session.
#[derive(Debug, Error)]
enum AdmissionError {
    #[error("handshake failed: {0}")]
    Handshake(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("no credentials within {0:?}")]
    Timeout(Duration),
    #[error("connection ended before credentials")]
    NoCredentials,
    #[error("first frame was not a data frame")]
    UnexpectedFrame,
    #[error("bad first frame: {0}")]
    Decode(#[from] ProtocolError),
    #[error("authentication failed for device {device_id:?}: {source}")]
    Auth {
        device_id: String,
        #[source]
        source: AuthError,
    },
    #[error(transparent)]
    Busy(#[from] ContextError),
}

// ── Server ────────────────────────────────────────────────────────────────────

/// Shared, cloneable state handed to each connection task.
#[derive(Clone)]
struct Admission {
    config: Arc<DaemonConfig>,
    authenticator: Arc<Authenticator>,
    context: Arc<SessionContext>,
    router: Arc<EventRouter>,
}

/// The device listener.
pub struct Server {
    listener: TcpListener,
    admission: Admission,
}

impl Server {
    /// Binds the listener on `config.bind_addr`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::BindFailed`] if the address is unavailable.
    pub async fn bind(
        config: DaemonConfig,
        context: Arc<SessionContext>,
        router: Arc<EventRouter>,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| ServerError::BindFailed {
                addr: config.bind_addr,
                source,
            })?;

        let admission = Admission {
            authenticator: Arc::new(Authenticator::new(config.credential.clone())),
            config: Arc::new(config),
            context,
            router,
        };
        Ok(Self {
            listener,
            admission,
        })
    }

    /// The address actually bound (useful when binding port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until `running` is cleared.
    pub async fn run(&self, running: Arc<AtomicBool>) {
        if let Ok(addr) = self.listener.local_addr() {
            info!("listening for devices on {addr}");
        }

        while running.load(Ordering::Relaxed) {
            match timeout(ACCEPT_POLL_INTERVAL, self.listener.accept()).await {
                Ok(Ok((stream, peer))) => {
                    debug!(%peer, "incoming connection");
                    let admission = self.admission.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, peer, admission).await;
                    });
                }
                Ok(Err(e)) => error!("accept error: {e}"),
                Err(_) => {
                    // No connection within the poll interval; re-check the flag.
                }
            }
        }

        info!("shutdown flag set; stopping accept loop");
    }

    /// Stops the live session, if any.
    pub fn shutdown(&self) {
        self.admission.context.stop_current();
    }
}

// ── Per-connection handling ───────────────────────────────────────────────────

async fn handle_connection(stream: TcpStream, peer: SocketAddr, admission: Admission) {
    let session = match admit(stream, peer, &admission).await {
        Ok(session) => session,
        Err(AdmissionError::Handshake(e)) => {
            debug!(%peer, "upgrade refused or failed: {e}");
            return;
        }
        Err(e @ AdmissionError::Busy(_)) => {
            info!(%peer, "{e}");
            return;
        }
        Err(e) => {
            warn!(%peer, "connection rejected: {e}");
            return;
        }
    };

    info!(%peer, session = %session.id(), device = %session.device_id(), "device connected");
    session.closed().await;
    admission.context.detach(session.id());
    info!(%peer, session = %session.id(), "device disconnected");
}

/// Runs the upgrade and the authentication gate; on success returns a live
/// session that is attached to the context and pumping.
async fn admit(
    stream: TcpStream,
    peer: SocketAddr,
    admission: &Admission,
) -> Result<Arc<Session>, AdmissionError> {
    let busy = admission.context.is_connected();
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        if req.uri().path() != WS_PATH {
            return Err(error_response(StatusCode::NOT_FOUND, "Not found"));
        }
        if busy {
            info!(%peer, "refusing upgrade: device already connected");
            return Err(error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                ALREADY_CONNECTED_BODY,
            ));
        }
        Ok(resp)
    };

    let mut ws = accept_hdr_async_with_config(stream, callback, Some(websocket_config())).await?;

    let read_timeout = admission.config.read_timeout;
    let first = match timeout(read_timeout, first_frame(&mut ws)).await {
        Ok(Ok(msg)) => msg,
        Ok(Err(e)) => {
            close_quietly(&mut ws).await;
            return Err(e);
        }
        Err(_) => {
            close_quietly(&mut ws).await;
            return Err(AdmissionError::Timeout(read_timeout));
        }
    };

    let device_id = match admission.authenticator.authenticate(&first) {
        Ok(id) => id,
        Err(source) => {
            close_quietly(&mut ws).await;
            return Err(AdmissionError::Auth {
                device_id: first.device_id,
                source,
            });
        }
    };

    let (session, queue) = Session::new(device_id, SessionConfig::from(admission.config.as_ref()));
    let link: Arc<dyn DeviceLink> = session.clone();
    if let Err(e) = admission.context.try_attach(link) {
        session.stop();
        close_quietly(&mut ws).await;
        return Err(e.into());
    }

    let sink: Arc<dyn MessageSink> = admission.router.clone();
    session.spawn_pumps(ws, queue, sink);
    Ok(session)
}

/// Reads until the first data frame and decodes it.  Pings and pongs are skipped.
async fn first_frame(ws: &mut WebSocketStream<TcpStream>) -> Result<Message, AdmissionError> {
    loop {
        let bytes = match ws.next().await {
            None => return Err(AdmissionError::NoCredentials),
            Some(Err(e)) => return Err(e.into()),
            Some(Ok(WsMessage::Text(text))) => text.into_bytes(),
            Some(Ok(WsMessage::Binary(data))) => data,
            Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => continue,
            Some(Ok(_)) => return Err(AdmissionError::UnexpectedFrame),
        };
        return Ok(decode_message(&bytes)?);
    }
}

async fn close_quietly(ws: &mut WebSocketStream<TcpStream>) {
    if let Err(e) = ws.close(None).await {
        debug!("close after rejection: {e}");
    }
}

fn error_response(status: StatusCode, body: &str) -> ErrorResponse {
    let mut resp = ErrorResponse::new(Some(body.to_string()));
    *resp.status_mut() = status;
    resp
}

// ── Tests ─────────────────────────────────────────────────────────────────────
