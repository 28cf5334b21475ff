//! Interactive terminal session to one device agent.
//!
//! A session moves `Connecting -> Open -> Closed` exactly once and never
//! reconnects. Every exit path (caller close, remote close, transport
//! error, failed connect) releases the terminal surface.

use std::{fmt, sync::Arc};

use agent_link_core::{DeviceContext, DeviceId, LinkConfig};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::{
    connector::{Connector, Duplex},
    protocol::{ControlMessage, Dimensions, Frame},
    surface::TerminalSurface,
};

/// Session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("term-{}", Uuid::new_v4().simple()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a session closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The caller closed it.
    Local,
    /// The agent closed it, or hung up.
    Remote(Option<String>),
    /// The channel failed or could not be opened.
    Error(String),
}

/// Transport state of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportState {
    Connecting,
    Open,
    Closed(CloseReason),
}

impl TransportState {
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }

    #[must_use]
    pub const fn close_reason(&self) -> Option<&CloseReason> {
        match self {
            Self::Closed(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Session error.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid terminal endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("session is closed")]
    Closed,

    #[error("failed to encode control frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Options for [`AgentSession::open`].
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Caller-supplied identifier; generated when absent.
    pub session_id: Option<SessionId>,
    /// Size announced right after the init frame.
    pub dimensions: Option<Dimensions>,
}

impl SessionOptions {
    #[must_use]
    pub fn with_session_id(mut self, id: impl Into<SessionId>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    #[must_use]
    pub const fn with_dimensions(mut self, dimensions: Dimensions) -> Self {
        self.dimensions = Some(dimensions);
        self
    }
}

/// Build the URI a session connects to.
///
/// `{terminal_endpoint}/terminal/{device_id}?session_id={id}&org_id={org}`
///
/// # Errors
/// Returns [`SessionError::InvalidEndpoint`] if the endpoint cannot carry a path.
pub fn session_uri(
    terminal_endpoint: &Url,
    ctx: &DeviceContext,
    session_id: &SessionId,
) -> Result<Url, SessionError> {
    let mut uri = terminal_endpoint.clone();
    uri.path_segments_mut()
        .map_err(|()| SessionError::InvalidEndpoint(terminal_endpoint.to_string()))?
        .pop_if_empty()
        .push("terminal")
        .push(ctx.device_id.as_str());
    uri.set_query(None);
    uri.query_pairs_mut()
        .append_pair("session_id", session_id.as_str())
        .append_pair("org_id", &ctx.organization_id);
    Ok(uri)
}

enum Outbound {
    Frame(Frame),
    Close,
}

/// Releases the surface when the session task ends, however it ends.
struct SurfaceGuard(Arc<dyn TerminalSurface>);

impl Drop for SurfaceGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Move to `Closed` unless already there. Returns whether this call did it.
fn close_state(state: &watch::Sender<TransportState>, reason: CloseReason) -> bool {
    state.send_if_modified(|s| {
        if s.is_closed() {
            return false;
        }
        *s = TransportState::Closed(reason);
        true
    })
}

/// Interactive terminal session.
///
/// Owned exclusively by the opener. Dropping it closes the session.
pub struct AgentSession {
    id: SessionId,
    device_id: DeviceId,
    state: Arc<watch::Sender<TransportState>>,
    dimensions: watch::Sender<Option<Dimensions>>,
    outbound: mpsc::UnboundedSender<Outbound>,
    closing: CancellationToken,
    task: Option<JoinHandle<CloseReason>>,
}

impl AgentSession {
    /// Start a session and return immediately in `Connecting`.
    ///
    /// Must be called from within a Tokio runtime. Input sent before the
    /// channel opens is queued behind the init frame.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidEndpoint`] if no session URI can be
    /// built; the surface is released in that case too.
    pub fn open<C, S>(
        connector: Arc<C>,
        config: &LinkConfig,
        ctx: &DeviceContext,
        surface: Arc<S>,
        options: SessionOptions,
    ) -> Result<Self, SessionError>
    where
        C: Connector + ?Sized + 'static,
        S: TerminalSurface + 'static,
    {
        let guard = SurfaceGuard(surface);
        let id = options.session_id.unwrap_or_else(SessionId::generate);
        let uri = session_uri(&config.terminal_endpoint, ctx, &id)?;

        let state = Arc::new(watch::Sender::new(TransportState::Connecting));
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let closing = CancellationToken::new();

        tracing::info!(session_id = %id, device_id = %ctx.device_id, "Opening session");

        let driver = Driver {
            id: id.clone(),
            state: Arc::clone(&state),
            outbound: outbound_rx,
            closing: closing.clone(),
            initial: options.dimensions,
            surface: guard,
        };
        let task = tokio::spawn(driver.run(connector, uri));

        Ok(Self {
            id,
            device_id: ctx.device_id.clone(),
            state,
            dimensions: watch::Sender::new(options.dimensions),
            outbound,
            closing,
            task: Some(task),
        })
    }

    #[must_use]
    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    #[must_use]
    pub const fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Current transport state.
    #[must_use]
    pub fn state(&self) -> TransportState {
        self.state.borrow().clone()
    }

    /// Subscribe to transport state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TransportState> {
        self.state.subscribe()
    }

    /// Last dimensions sent to the agent.
    #[must_use]
    pub fn dimensions(&self) -> Option<Dimensions> {
        *self.dimensions.borrow()
    }

    fn enqueue(&self, msg: Outbound) -> Result<(), SessionError> {
        if self.state.borrow().is_closed() {
            return Err(SessionError::Closed);
        }
        self.outbound.send(msg).map_err(|_| SessionError::Closed)
    }

    /// Send raw keystrokes. Empty input is ignored.
    ///
    /// # Errors
    /// Returns [`SessionError::Closed`] once the session is closed.
    pub fn send_input(&self, data: &[u8]) -> Result<(), SessionError> {
        if data.is_empty() {
            return Ok(());
        }
        self.enqueue(Outbound::Frame(Frame::input(data)))
    }

    /// Report a new surface size. Unchanged dimensions send nothing.
    ///
    /// # Errors
    /// Returns [`SessionError::Closed`] once the session is closed.
    pub fn resize(&self, dimensions: Dimensions) -> Result<(), SessionError> {
        if self.state.borrow().is_closed() {
            return Err(SessionError::Closed);
        }
        let changed = self.dimensions.send_if_modified(|d| {
            if *d == Some(dimensions) {
                return false;
            }
            *d = Some(dimensions);
            true
        });
        if !changed {
            return Ok(());
        }
        let frame = Frame::control(&ControlMessage::from(dimensions))?;
        self.enqueue(Outbound::Frame(frame))
    }

    /// Close the session. A no-op once closed.
    ///
    /// The state becomes `Closed(Local)` immediately; queued input is still
    /// flushed ahead of the close handshake.
    pub fn close(&self) {
        if !close_state(&self.state, CloseReason::Local) {
            return;
        }
        tracing::info!(session_id = %self.id, "Closing session");
        let _ = self.outbound.send(Outbound::Close);
        self.closing.cancel();
    }

    /// Wait until the session is closed.
    pub async fn wait_closed(&self) -> CloseReason {
        let mut rx = self.state.subscribe();
        let reason = match rx.wait_for(TransportState::is_closed).await {
            Ok(state) => state.close_reason().cloned(),
            Err(_) => None,
        };
        reason.unwrap_or(CloseReason::Local)
    }

    /// Wait for the session task to finish; the surface has been released
    /// when this returns.
    pub async fn join(mut self) -> CloseReason {
        let Some(task) = self.task.take() else {
            return self.wait_closed().await;
        };
        match task.await {
            Ok(reason) => reason,
            Err(e) => {
                close_state(&self.state, CloseReason::Error(e.to_string()));
                CloseReason::Error(e.to_string())
            }
        }
    }
}

impl Drop for AgentSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Owns the channel and the surface for the life of one session.
///
/// The surface guard drops when `run` returns.
struct Driver {
    id: SessionId,
    state: Arc<watch::Sender<TransportState>>,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    closing: CancellationToken,
    initial: Option<Dimensions>,
    surface: SurfaceGuard,
}

impl Driver {
    async fn run<C>(mut self, connector: Arc<C>, uri: Url) -> CloseReason
    where
        C: Connector + ?Sized,
    {
        let reason = self.drive(connector.as_ref(), &uri).await;
        close_state(&self.state, reason.clone());
        let reason = self
            .state
            .borrow()
            .close_reason()
            .cloned()
            .unwrap_or(reason);
        tracing::info!(session_id = %self.id, reason = ?reason, "Session closed");
        reason
    }

    async fn drive<C>(&mut self, connector: &C, uri: &Url) -> CloseReason
    where
        C: Connector + ?Sized,
    {
        let connected = tokio::select! {
            biased;
            () = self.closing.cancelled() => return CloseReason::Local,
            result = connector.connect(uri) => result,
        };
        let Duplex {
            mut sink,
            mut stream,
        } = match connected {
            Ok(duplex) => duplex,
            Err(e) => {
                tracing::warn!(session_id = %self.id, error = %e, "Session connect failed");
                return CloseReason::Error(e.to_string());
            }
        };

        if self.closing.is_cancelled() {
            let _ = sink.send(Frame::Close(None)).await;
            return CloseReason::Local;
        }

        if let Err(e) = sink.send(Frame::init()).await {
            return CloseReason::Error(e.to_string());
        }
        if let Some(dimensions) = self.initial {
            let sent = match Frame::control(&ControlMessage::from(dimensions)) {
                Ok(frame) => sink.send(frame).await,
                Err(e) => return CloseReason::Error(e.to_string()),
            };
            if let Err(e) = sent {
                return CloseReason::Error(e.to_string());
            }
        }
        self.state.send_if_modified(|s| {
            if *s != TransportState::Connecting {
                return false;
            }
            *s = TransportState::Open;
            true
        });
        tracing::debug!(session_id = %self.id, "Session open");

        loop {
            tokio::select! {
                msg = self.outbound.recv() => match msg {
                    Some(Outbound::Frame(frame)) => {
                        if let Err(e) = sink.send(frame).await {
                            return CloseReason::Error(e.to_string());
                        }
                    }
                    Some(Outbound::Close) | None => {
                        let _ = sink.send(Frame::Close(None)).await;
                        let _ = sink.close().await;
                        return CloseReason::Local;
                    }
                },
                inbound = stream.next() => match inbound {
                    Some(Ok(Frame::Close(reason))) => return CloseReason::Remote(reason),
                    Some(Ok(frame)) => {
                        if let Some(data) = frame.payload().filter(|d| !d.is_empty()) {
                            self.surface.0.write(&data);
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(
                            session_id = %self.id,
                            error = %e,
                            "Session transport failed"
                        );
                        return CloseReason::Error(e.to_string());
                    }
                    None => return CloseReason::Remote(None),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::{
        channel::{AgentEnd, ChannelConnector},
        surface::ScreenBuffer,
    };

    fn config() -> LinkConfig {
        LinkConfig::local()
            .unwrap()
            .with_terminal_endpoint(Url::parse("ws://agent.test/api/").unwrap())
    }

    fn ctx() -> DeviceContext {
        DeviceContext::new("org-1", "dev-1")
    }

    fn open(options: SessionOptions) -> (AgentSession, AgentEnd, Arc<ScreenBuffer>) {
        let (connector, agent) = ChannelConnector::pair();
        let surface = Arc::new(ScreenBuffer::new());
        let session = AgentSession::open(
            Arc::new(connector),
            &config(),
            &ctx(),
            Arc::clone(&surface),
            options,
        )
        .unwrap();
        (session, agent, surface)
    }

    async fn wait_open(session: &AgentSession) {
        session
            .subscribe()
            .wait_for(TransportState::is_open)
            .await
            .unwrap();
    }

    #[test]
    fn test_session_uri() {
        let uri = session_uri(
            &Url::parse("wss://relay.example.com/").unwrap(),
            &ctx(),
            &SessionId::from("term-abc"),
        )
        .unwrap();
        assert_eq!(
            uri.as_str(),
            "wss://relay.example.com/terminal/dev-1?session_id=term-abc&org_id=org-1"
        );
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert!(a.as_str().starts_with("term-"));
        assert_eq!(a.as_str().len(), "term-".len() + 32);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_init_frame_precedes_input() {
        let (session, mut agent, _surface) = open(SessionOptions::default());
        // Queued while still connecting.
        session.send_input(b"ls -la\r").unwrap();

        assert_eq!(agent.recv().await, Some(Frame::init()));
        assert_eq!(agent.recv().await, Some(Frame::input(b"ls -la\r")));
        assert_eq!(
            agent.connected_uri().unwrap().as_str(),
            format!(
                "ws://agent.test/api/terminal/dev-1?session_id={}&org_id=org-1",
                session.id()
            )
        );
    }

    #[tokio::test]
    async fn test_resize_sends_one_text_frame() {
        let (session, mut agent, _surface) = open(SessionOptions::default());
        wait_open(&session).await;

        session.resize(Dimensions::new(120, 40)).unwrap();
        session.resize(Dimensions::new(120, 40)).unwrap();
        session.close();

        let frames = agent.recv_until_close().await;
        let texts: Vec<_> = frames
            .iter()
            .filter(|f| matches!(f, Frame::Text(_)))
            .collect();
        let binaries: Vec<_> = frames
            .iter()
            .filter(|f| matches!(f, Frame::Binary(_)))
            .collect();

        assert_eq!(texts.len(), 1);
        assert_eq!(
            texts[0].as_control(),
            Some(ControlMessage::Resize { cols: 120, rows: 40 })
        );
        // Only the init frame.
        assert_eq!(binaries, vec![&Frame::init()]);
        assert_eq!(session.dimensions(), Some(Dimensions::new(120, 40)));
    }

    #[tokio::test]
    async fn test_initial_dimensions_follow_init() {
        let (_session, mut agent, _surface) =
            open(SessionOptions::default().with_dimensions(Dimensions::new(80, 24)));

        assert_eq!(agent.recv().await, Some(Frame::init()));
        let resize = agent.recv().await.unwrap();
        assert_eq!(
            resize.as_control(),
            Some(ControlMessage::Resize { cols: 80, rows: 24 })
        );
    }

    #[tokio::test]
    async fn test_output_reaches_surface_verbatim() {
        let (session, agent, surface) = open(SessionOptions::default());
        let mut rx = surface.subscribe().unwrap();
        wait_open(&session).await;

        agent.send_text("hello ");
        agent.send_binary(b"\x1b[1mworld\x1b[0m");

        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"hello "));
        assert_eq!(
            rx.recv().await.unwrap(),
            Bytes::from_static(b"\x1b[1mworld\x1b[0m")
        );
        assert_eq!(surface.history(), b"hello \x1b[1mworld\x1b[0m");
    }

    #[tokio::test]
    async fn test_local_close_releases_surface() {
        let (session, mut agent, surface) = open(SessionOptions::default());
        let _rx = surface.subscribe().unwrap();
        wait_open(&session).await;

        session.close();
        assert_eq!(session.state(), TransportState::Closed(CloseReason::Local));
        // Second close is a no-op.
        session.close();
        assert!(session.send_input(b"x").is_err());

        assert_eq!(session.join().await, CloseReason::Local);
        assert!(surface.is_released());
        assert_eq!(surface.listener_count(), 0);
        assert_eq!(agent.recv_until_close().await.last(), Some(&Frame::Close(None)));
    }

    #[tokio::test]
    async fn test_remote_close_releases_surface() {
        let (session, agent, surface) = open(SessionOptions::default());
        wait_open(&session).await;
        agent.send_text("bye\r\n");
        agent.close(Some("logout"));

        let reason = session.wait_closed().await;
        assert_eq!(reason, CloseReason::Remote(Some("logout".into())));
        assert_eq!(session.join().await, reason);
        assert!(surface.is_released());
        assert!(surface.history().is_empty());
    }

    #[tokio::test]
    async fn test_agent_hangup_is_remote_close() {
        let (session, agent, surface) = open(SessionOptions::default());
        wait_open(&session).await;
        drop(agent);

        assert_eq!(session.join().await, CloseReason::Remote(None));
        assert!(surface.is_released());
    }

    #[tokio::test]
    async fn test_transport_error_releases_surface() {
        let (session, agent, surface) = open(SessionOptions::default());
        wait_open(&session).await;
        agent.fail("connection reset");

        let reason = session.wait_closed().await;
        assert!(matches!(&reason, CloseReason::Error(m) if m.contains("connection reset")));
        assert!(session.send_input(b"x").is_err());
        assert!(matches!(session.resize(Dimensions::new(1, 1)), Err(SessionError::Closed)));
        session.join().await;
        assert!(surface.is_released());
    }

    #[tokio::test]
    async fn test_connect_failure_closes() {
        let surface = Arc::new(ScreenBuffer::new());
        let session = AgentSession::open(
            Arc::new(ChannelConnector::refusing("agent offline")),
            &config(),
            &ctx(),
            Arc::clone(&surface),
            SessionOptions::default().with_session_id("term-fixed"),
        )
        .unwrap();
        assert_eq!(session.id().as_str(), "term-fixed");

        let reason = session.join().await;
        assert!(matches!(reason, CloseReason::Error(m) if m.contains("agent offline")));
        assert!(surface.is_released());
    }

    /// Connector whose handshake never completes.
    struct Stalled;

    #[async_trait::async_trait]
    impl Connector for Stalled {
        async fn connect(&self, _uri: &Url) -> Result<Duplex, crate::TransportError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_close_while_connecting() {
        let surface = Arc::new(ScreenBuffer::new());
        let session = AgentSession::open(
            Arc::new(Stalled),
            &config(),
            &ctx(),
            Arc::clone(&surface),
            SessionOptions::default(),
        )
        .unwrap();
        assert_eq!(session.state(), TransportState::Connecting);

        session.close();
        assert_eq!(session.state(), TransportState::Closed(CloseReason::Local));
        let reason = tokio::time::timeout(Duration::from_secs(5), session.join())
            .await
            .unwrap();
        assert_eq!(reason, CloseReason::Local);
        assert!(surface.is_released());
    }

    #[tokio::test]
    async fn test_drop_closes_session() {
        let (session, mut agent, surface) = open(SessionOptions::default());
        wait_open(&session).await;
        drop(session);

        let frames = tokio::time::timeout(Duration::from_secs(5), agent.recv_until_close())
            .await
            .unwrap();
        assert_eq!(frames.last(), Some(&Frame::Close(None)));
        tokio::time::timeout(Duration::from_secs(5), async {
            while !surface.is_released() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }
}
