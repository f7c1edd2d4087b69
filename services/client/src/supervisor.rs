//! The connection supervisor ("nanny", §4.6): one per `(server, room,
//! username)`, auto-reconnecting with linear backoff, lending short-lived
//! session borrows to callers via `wait_open`/`do`/`try_do`.
//!
//! The reconnect shape follows `UplinkSession::connect`, generalized into an
//! explicit state machine per §9 ("daemon with panic restart") rather than
//! inlining reconnect logic into the main loop.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use net_protocol::{ProtocolVersion, RoomName, Username};
use net_transport::ProtoConn;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::handshake::{self, Credentials, HandshakeError};
use crate::session_logic::ClientLogic;

/// `state ∈ {closed, opening, open}` (§4.6, §3 "Supervised client session").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Opening,
    Open,
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("supervisor is permanently closed")]
    Closed,
    #[error("wait cancelled")]
    Cancelled,
    #[error("session is not currently open")]
    NotOpen,
}

/// A short-lived snapshot of the currently open session (§4.6 "borrow
/// semantics"). Callers must not retain this across suspension points —
/// a reconnect can invalidate it the moment this struct is dropped.
#[derive(Clone)]
pub struct SessionHandle {
    pub conn: Arc<dyn ProtoConn>,
    pub version: ProtocolVersion,
}

/// Dials the address this supervisor is configured for and runs the
/// handshake (§4.6 "attempt to dial, negotiate, authenticate outside the
/// lock"). A trait so the daemon is testable against an in-memory dialer.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(
        &self,
        address: &str,
        client_version: ProtocolVersion,
        credentials: &Credentials,
    ) -> Result<SessionHandle, DialError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DialError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
}

/// The production [`Dialer`]: resolves `address` (`host:port`), opens a QUIC
/// connection off `endpoint`, and runs the lobby handshake over it (§4.3, §6).
pub struct QuicDialer {
    endpoint: quinn::Endpoint,
}

impl QuicDialer {
    pub fn new(endpoint: quinn::Endpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl Dialer for QuicDialer {
    async fn dial(
        &self,
        address: &str,
        client_version: ProtocolVersion,
        credentials: &Credentials,
    ) -> Result<SessionHandle, DialError> {
        let (host, _) = address
            .rsplit_once(':')
            .ok_or_else(|| DialError::Connect(format!("address {address} is missing a port")))?;

        let socket_addr = tokio::net::lookup_host(address)
            .await
            .map_err(|e| DialError::Connect(e.to_string()))?
            .next()
            .ok_or_else(|| DialError::Connect(format!("{address} resolved to no addresses")))?;

        let conn = net_transport::endpoint::connect(&self.endpoint, socket_addr, host)
            .await
            .map_err(|e| DialError::Connect(e.to_string()))?;
        let conn: Arc<dyn ProtoConn> = Arc::new(conn);

        let version = handshake::run_handshake(&*conn, client_version, credentials).await?;
        Ok(SessionHandle { conn, version })
    }
}

struct Inner {
    address: RwLock<String>,
    credentials: RwLock<Credentials>,
    state: RwLock<SessionState>,
    session: RwLock<Option<SessionHandle>>,
    /// Cancelled to tear down the current session from outside the daemon
    /// (`disconnect`/`close`); replaced each time a session opens.
    session_scope: RwLock<CancellationToken>,
    open_signal: RwLock<Arc<Notify>>,
    should_reconnect: AtomicBool,
    closed: AtomicBool,
    current_backoff: RwLock<Duration>,
    backoff_ceiling: Duration,
    client_version: ProtocolVersion,
    daemon: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// One supervised, auto-reconnecting session (§4.6, Glossary "Nanny").
pub struct Supervisor {
    inner: Arc<Inner>,
    dialer: Arc<dyn Dialer>,
    logic: Arc<dyn ClientLogic>,
}

const DEFAULT_BACKOFF_CEILING: Duration = Duration::from_secs(30);
const BACKOFF_STEP: Duration = Duration::from_secs(1);

impl Supervisor {
    pub fn new(
        address: String,
        credentials: Credentials,
        client_version: ProtocolVersion,
        dialer: Arc<dyn Dialer>,
        logic: Arc<dyn ClientLogic>,
    ) -> Arc<Self> {
        let inner = Arc::new(Inner {
            address: RwLock::new(address),
            credentials: RwLock::new(credentials),
            state: RwLock::new(SessionState::Closed),
            session: RwLock::new(None),
            session_scope: RwLock::new(CancellationToken::new()),
            open_signal: RwLock::new(Arc::new(Notify::new())),
            should_reconnect: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            current_backoff: RwLock::new(BACKOFF_STEP),
            backoff_ceiling: DEFAULT_BACKOFF_CEILING,
            client_version,
            daemon: std::sync::Mutex::new(None),
        });
        Arc::new(Self { inner, dialer, logic })
    }

    pub async fn state(&self) -> SessionState {
        *self.inner.state.read().await
    }

    /// Update the address/credentials this supervisor dials next time it
    /// reconnects (§4.7 "changes take effect on the next reconnect"). Does
    /// not interrupt a currently open session.
    pub async fn reconfigure(&self, address: Option<String>, room: Option<RoomName>, username: Option<Username>, password: Option<String>) {
        if let Some(address) = address {
            *self.inner.address.write().await = address;
        }
        let mut creds = self.inner.credentials.write().await;
        if let Some(room) = room {
            creds.room = room;
        }
        if let Some(username) = username {
            creds.username = username;
        }
        if let Some(password) = password {
            creds.password = password;
        }
    }

    /// Block until the state becomes `open`, `ctx` cancels, or the
    /// supervisor closes permanently (§4.6).
    pub async fn wait_open(&self, ctx: &CancellationToken) -> Result<SessionHandle, SupervisorError> {
        loop {
            if self.inner.closed.load(Ordering::SeqCst) {
                return Err(SupervisorError::Closed);
            }
            // Register interest in the current signal *before* checking
            // session state: `Notify::notified()` snapshots the waiter set
            // at creation time, so a `notify_waiters()` landing between the
            // state check and the await below is still observed instead of
            // being lost until the next backoff tick.
            let signal = self.inner.open_signal.read().await.clone();
            let notified = signal.notified();
            if let Some(session) = self.inner.session.read().await.clone() {
                return Ok(session);
            }
            tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(SupervisorError::Cancelled),
                () = notified => {}
            }
        }
    }

    /// `wait_open` then invoke `f(session)` (§4.6 convenience).
    pub async fn do_with<F, Fut, T>(&self, ctx: &CancellationToken, f: F) -> Result<T, SupervisorError>
    where
        F: FnOnce(SessionHandle) -> Fut,
        Fut: Future<Output = T>,
    {
        let session = self.wait_open(ctx).await?;
        Ok(f(session).await)
    }

    /// Invoke `f(session)` only if currently open, else `not_open` (§4.6).
    pub async fn try_do<F, Fut, T>(&self, f: F) -> Result<T, SupervisorError>
    where
        F: FnOnce(SessionHandle) -> Fut,
        Fut: Future<Output = T>,
    {
        let session = self.inner.session.read().await.clone().ok_or(SupervisorError::NotOpen)?;
        Ok(f(session).await)
    }

    /// Enable reconnection and start the daemon if it isn't running (§4.6).
    pub fn connect(self: &Arc<Self>) {
        self.inner.should_reconnect.store(true, Ordering::SeqCst);
        let mut daemon = self.inner.daemon.lock().unwrap();
        if daemon.as_ref().is_none_or(JoinHandle::is_finished) {
            *daemon = Some(spawn_daemon(self.inner.clone(), self.dialer.clone(), self.logic.clone()));
        }
    }

    /// Disable reconnection and close the current session, if any (§4.6).
    pub async fn disconnect(&self) {
        self.inner.should_reconnect.store(false, Ordering::SeqCst);
        self.close_current_session().await;
    }

    /// Permanent shutdown: also closes the logic object (§4.6).
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.should_reconnect.store(false, Ordering::SeqCst);
        self.close_current_session().await;
        self.logic.close().await;
    }

    async fn close_current_session(&self) {
        self.inner.session_scope.read().await.cancel();
        if let Some(session) = self.inner.session.read().await.clone() {
            session.conn.close_with_reason("disconnected").await;
        }
    }
}

/// Spawn the daemon as its own task so a caught panic can respawn a fresh
/// one with the same parameters, rather than relying on unwinding
/// recursion (§9 "daemon with panic restart").
fn spawn_daemon(inner: Arc<Inner>, dialer: Arc<dyn Dialer>, logic: Arc<dyn ClientLogic>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let inner2 = inner.clone();
            let dialer2 = dialer.clone();
            let logic2 = logic.clone();
            let result = tokio::spawn(daemon_loop(inner2, dialer2, logic2)).await;
            match result {
                Ok(()) => break,
                Err(panic) => {
                    tracing::error!(?panic, "supervisor daemon panicked; recovering");
                    panic_recover(&inner).await;
                    if inner.closed.load(Ordering::SeqCst) || !inner.should_reconnect.load(Ordering::SeqCst) {
                        break;
                    }
                    // loop again with a freshly spawned daemon_loop
                }
            }
        }
    })
}

/// Close any orphaned session and reset to `closed` with a fresh signal
/// (§4.6 "panic safety").
async fn panic_recover(inner: &Arc<Inner>) {
    inner.session_scope.read().await.cancel();
    if let Some(session) = inner.session.write().await.take() {
        session.conn.close_with_reason("supervisor daemon restarting").await;
    }
    *inner.state.write().await = SessionState::Closed;
    *inner.open_signal.write().await = Arc::new(Notify::new());
}

/// The reconnect loop: dial, negotiate, authenticate outside the lock; on
/// failure back off linearly; on success publish the session, signal
/// `open_signal`, reset backoff, and block until the session ends (§4.6).
async fn daemon_loop(inner: Arc<Inner>, dialer: Arc<dyn Dialer>, logic: Arc<dyn ClientLogic>) {
    loop {
        if inner.closed.load(Ordering::SeqCst) || !inner.should_reconnect.load(Ordering::SeqCst) {
            return;
        }

        set_state(&inner, SessionState::Opening).await;

        let address = inner.address.read().await.clone();
        let credentials = inner.credentials.read().await.clone();

        match dialer.dial(&address, inner.client_version, &credentials).await {
            Ok(session) => {
                let scope = CancellationToken::new();
                *inner.session_scope.write().await = scope.clone();
                *inner.session.write().await = Some(session.clone());
                set_state(&inner, SessionState::Open).await;
                signal_open(&inner).await;
                *inner.current_backoff.write().await = BACKOFF_STEP;

                run_serve_loop_until_ended(session.conn.clone(), logic.clone(), scope).await;

                *inner.session.write().await = None;
                set_state(&inner, SessionState::Closed).await;
                replace_open_signal(&inner).await;
            }
            Err(e) => {
                tracing::debug!(error = %e, %address, "supervisor dial failed");
                let backoff = next_backoff(&inner).await;
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

async fn set_state(inner: &Arc<Inner>, state: SessionState) {
    *inner.state.write().await = state;
}

/// Wake every current `wait_open` caller exactly once, then leave this
/// `Notify` in place — it is only replaced on the *next* away-from-open
/// transition (§4.6 "closed once, replace signal").
async fn signal_open(inner: &Arc<Inner>) {
    inner.open_signal.read().await.notify_waiters();
}

async fn replace_open_signal(inner: &Arc<Inner>) {
    *inner.open_signal.write().await = Arc::new(Notify::new());
}

async fn next_backoff(inner: &Arc<Inner>) -> Duration {
    let mut backoff = inner.current_backoff.write().await;
    let next = (*backoff + BACKOFF_STEP).min(inner.backoff_ceiling);
    *backoff = next;
    next
}

/// Accept incoming bidis on `conn` and hand each to `logic`, panic-isolated
/// per bidi like `server::room`'s read loop. Returns when the connection
/// ends or `scope` is cancelled by `disconnect`/`close`.
async fn run_serve_loop_until_ended(conn: Arc<dyn ProtoConn>, logic: Arc<dyn ClientLogic>, scope: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            () = scope.cancelled() => {
                conn.close_with_reason("disconnected").await;
                return;
            }
            incoming = conn.wait_for_incoming_bidi(&scope) => {
                match incoming {
                    Ok(bidi) => {
                        let logic = logic.clone();
                        tokio::spawn(async move {
                            if let Err(panic) = tokio::spawn(async move { logic.handle_incoming_bidi(bidi).await }).await {
                                tracing::error!(?panic, "client bidi handler panicked; isolated by its supervisor");
                            }
                        });
                    }
                    Err(_) => return,
                }
            }
        }
    }
}
