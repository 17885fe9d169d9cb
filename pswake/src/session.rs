//! Second-screen session
//!
//! A [`Session`] owns one TCP connection to the device. Opening it sends
//! the client hello; a background reader task answers the server hello
//! with the handshake, installs the session cipher, acknowledges
//! heartbeats and fans every inbound message out as a [`SessionEvent`].
//!
//! # Examples
//!
//! ```no_run
//! use pswake::{Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> pswake::Result<()> {
//!     let config = SessionConfig::new("1234567890", "192.168.1.20".parse().unwrap())
//!         .with_auto_login(false);
//!
//!     let session = Session::connect(config).await?;
//!     session.login("12345678").await?;
//!     session.start_title("CUSA00001").await?;
//!     session.close().await?;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use pswake_core::{
    CipherState, ClientMessage, DdpMessage, LoginRequest, OskChange, OskCommand, OskStart,
    ProtocolState, ServerMessage, SessionState, crypto::wrap_session_key,
};
use pswake_transport::{DdpSocket, FrameReader, FrameWriter, TcpTransport};
use pswake_types::{LoginResult, RemoteKey};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, trace, warn};

use crate::config::{LoginOptions, SessionConfig};
use crate::error::{Error, Result};
use crate::events::{EVENT_CAPACITY, SessionEvent};

/// Progress of the current login
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginState {
    Pending,
    Done(LoginResult),
    Closed,
}

/// Connection to a device's session port
///
/// Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    state: ProtocolState,
    status: watch::Sender<SessionState>,
    writer: tokio::sync::Mutex<Option<FrameWriter>>,
    events: broadcast::Sender<SessionEvent>,
    login: watch::Sender<LoginState>,
    login_lock: tokio::sync::Mutex<()>,
    reader: Mutex<Option<JoinHandle<()>>>,
    connected_at: Mutex<Option<Instant>>,
    last_login: Mutex<Option<LoginResult>>,
}

impl Session {
    /// Create a disconnected session
    pub fn new(config: SessionConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (status, _) = watch::channel(SessionState::Disconnected);
        let (login, _) = watch::channel(LoginState::Closed);

        Self {
            inner: Arc::new(SessionInner {
                config,
                state: ProtocolState::new(),
                status,
                writer: tokio::sync::Mutex::new(None),
                events,
                login,
                login_lock: tokio::sync::Mutex::new(()),
                reader: Mutex::new(None),
                connected_at: Mutex::new(None),
                last_login: Mutex::new(None),
            }),
        }
    }

    /// Create and open a session
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        let session = Self::new(config);
        session.open().await?;
        Ok(session)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.state()
    }

    /// Check if the socket is open (logged in or not)
    pub fn is_connected(&self) -> bool {
        self.inner.state.is_connected()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.state.is_ready()
    }

    /// When the current connection was established
    pub fn connected_at(&self) -> Option<Instant> {
        *self.inner.connected_at.lock()
    }

    /// Result of the most recent login attempt
    pub fn last_login_result(&self) -> Option<LoginResult> {
        *self.inner.last_login.lock()
    }

    /// Receive events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Open the TCP connection and start the handshake
    ///
    /// Sends the wake hints first when configured, and retries while the
    /// device refuses the connection.
    ///
    /// # Errors
    ///
    /// Fails if the session is already open, if every connect attempt
    /// fails, or if the client hello cannot be sent.
    pub async fn open(&self) -> Result<()> {
        let generation = self.inner.state.begin_connect()?;
        self.inner.publish_state();

        if let Err(e) = self.establish(generation).await {
            if self.inner.state.generation() == generation {
                self.inner.state.close();
                self.inner.publish_state();
            }
            return Err(e);
        }

        Ok(())
    }

    /// Run one connect step unless the attempt of `generation` is closed
    /// first
    async fn unless_closed<T>(
        &self,
        generation: u64,
        step: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let state = &self.inner.state;
        let mut status = self.inner.status.subscribe();
        let closed = status.wait_for(|current| {
            *current == SessionState::Disconnected || state.generation() != generation
        });

        tokio::select! {
            result = step => result,
            _ = closed => {
                debug!("Connect to {} abandoned by close", self.inner.config.host);
                Err(Error::NotConnected)
            }
        }
    }

    async fn establish(&self, generation: u64) -> Result<()> {
        let config = &self.inner.config;

        if config.send_wake_hints {
            self.unless_closed(generation, async {
                self.send_wake_hints().await;
                sleep(config.wake_hint_delay).await;
                Ok::<_, Error>(())
            })
            .await?;
        }

        let host = match config.host {
            IpAddr::V4(v4) => v4.to_string(),
            IpAddr::V6(v6) => format!("[{}]", v6),
        };

        info!("Connecting to {}:{}...", host, config.port);

        let connect = retry_on_refused(config.connect_attempts, config.connect_retry_delay, |_| {
            let mut transport = TcpTransport::new(host.clone(), config.port)
                .with_connect_timeout(config.connect_timeout);
            async move { Ok(transport.connect().await?) }
        });
        let (reader, mut writer) = self.unless_closed(generation, connect).await?;

        // Close takes the writer lock after marking the state, so the
        // hello only goes out while this attempt is still current
        {
            let mut slot = self.inner.writer.lock().await;
            if self.inner.state.generation() != generation || self.inner.state.connected().is_err() {
                debug!("Connect to {} closed before the client hello", host);
                if let Err(e) = writer.shutdown().await {
                    debug!("Socket shutdown failed: {}", e);
                }
                return Err(Error::NotConnected);
            }

            writer.send(&ClientMessage::ClientHello).await?;
            *slot = Some(writer);
        }

        *self.inner.connected_at.lock() = Some(Instant::now());
        self.inner.login.send_replace(LoginState::Pending);
        self.inner.publish_state();
        self.inner.emit(SessionEvent::Connected);

        let task = tokio::spawn(read_loop(Arc::downgrade(&self.inner), reader, generation));
        if let Some(previous) = self.inner.reader.lock().replace(task) {
            previous.abort();
        }
        if self.inner.state.generation() != generation || !self.inner.state.is_connected() {
            if let Some(task) = self.inner.reader.lock().take() {
                task.abort();
            }
            return Err(Error::NotConnected);
        }

        debug!("Client hello sent (generation {})", generation);
        Ok(())
    }

    async fn send_wake_hints(&self) {
        let config = &self.inner.config;
        let target = SocketAddr::new(config.host, config.ddp_port);
        let bind = match config.host {
            IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };

        let sent = async {
            let socket = DdpSocket::bind(bind).await?;
            socket.send(&DdpMessage::wakeup_hint(&config.account_id), target).await?;
            socket.send(&DdpMessage::launch(&config.account_id), target).await
        }
        .await;

        match sent {
            Ok(()) => trace!("Sent wake hints to {}", target),
            Err(e) => warn!("Failed to send wake hints to {}: {}", target, e),
        }
    }

    /// Log in to the device
    ///
    /// Waits for the handshake first. Each attempt that gets no answer
    /// within the login timeout is retried until the retries run out,
    /// after which a synthesized `Timeout` result is reported.
    ///
    /// Accepts a PIN code directly or full [`LoginOptions`].
    ///
    /// # Errors
    ///
    /// `LoginFailed` carries the device's result code; codes 20 and 22
    /// mean more input (PIN or passcode) is needed.
    pub async fn login(&self, options: impl Into<LoginOptions>) -> Result<()> {
        let options = options.into();
        let inner = &self.inner;
        let config = &inner.config;

        let _guard = inner.login_lock.lock().await;
        if inner.state.is_ready() {
            return Ok(());
        }

        let limit = options.timeout.unwrap_or(config.login_timeout);
        self.wait_for_handshake(config.connect_timeout.max(limit)).await?;

        let attempts = options.retries.unwrap_or(config.login_retries).max(1);
        let request = LoginRequest::new(config.account_id.as_str())
            .with_pin_code(options.pin_code.unwrap_or_else(|| config.pin_code.clone()))
            .with_pass_code(options.pass_code.unwrap_or_else(|| config.pass_code.clone()))
            .with_model(config.model_name.as_str());

        let mut results = inner.login.subscribe();

        for attempt in 1..=attempts {
            inner.login.send_replace(LoginState::Pending);
            results.borrow_and_update();

            debug!(attempt, "Logging in to {}", config.host);
            self.send(ClientMessage::Login(request.clone())).await?;

            let outcome = timeout(limit, async {
                results
                    .wait_for(|state| *state != LoginState::Pending)
                    .await
                    .map(|state| *state)
            })
            .await;

            match outcome {
                Ok(Ok(LoginState::Done(result))) => return login_outcome(result),
                Ok(_) => return Err(Error::NotConnected),
                Err(_) if attempt < attempts => {
                    warn!(attempt, "No login result after {:?}; retrying", limit);
                    inner.emit(SessionEvent::LoginRetry { attempt });
                    sleep(config.login_retry_delay).await;
                }
                Err(_) => {}
            }
        }

        let result = LoginResult::timeout();
        warn!("Login timed out after {} attempts", attempts);
        *inner.last_login.lock() = Some(result);
        inner.login.send_replace(LoginState::Done(result));
        inner.emit(SessionEvent::LoginResult(result));
        login_outcome(result)
    }

    /// Wait for the current login to finish
    ///
    /// Useful with automatic login, which starts on its own after the
    /// handshake.
    pub async fn wait_for_login(&self, limit: Duration) -> Result<LoginResult> {
        let mut results = self.inner.login.subscribe();

        let state = timeout(limit, async {
            results
                .wait_for(|state| *state != LoginState::Pending)
                .await
                .map(|state| *state)
        })
        .await
        .map_err(|_| Error::Timeout("login result"))?;

        match state {
            Ok(LoginState::Done(result)) => Ok(result),
            _ => Err(Error::NotConnected),
        }
    }

    async fn wait_for_handshake(&self, limit: Duration) -> Result<()> {
        let mut status = self.inner.status.subscribe();

        let state = timeout(limit, async {
            status
                .wait_for(|state| {
                    matches!(
                        state,
                        SessionState::AwaitingLogin | SessionState::Ready | SessionState::Disconnected
                    )
                })
                .await
                .map(|state| *state)
        })
        .await
        .map_err(|_| Error::Timeout("server hello"))?;

        match state {
            Ok(SessionState::AwaitingLogin | SessionState::Ready) => Ok(()),
            _ => Err(Error::NotConnected),
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.inner.state.state() {
            SessionState::Ready => Ok(()),
            SessionState::Disconnected => Err(Error::NotConnected),
            _ => Err(Error::NotLoggedIn),
        }
    }

    async fn send(&self, message: ClientMessage) -> Result<()> {
        self.inner.send(&message).await
    }

    /// Send and wait for the event `matcher` accepts
    async fn request<T>(
        &self,
        message: ClientMessage,
        what: &'static str,
        limit: Duration,
        mut matcher: impl FnMut(&SessionEvent) -> Option<T>,
    ) -> Result<T> {
        let mut events = self.subscribe();
        self.send(message).await?;

        let wait = async {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::Disconnected) => return Err(Error::NotConnected),
                    Ok(event) => {
                        if let Some(value) = matcher(&event) {
                            return Ok(value);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Missed {} events waiting for {}", skipped, what);
                    }
                    Err(broadcast::error::RecvError::Closed) => return Err(Error::NotConnected),
                }
            }
        };

        timeout(limit, wait)
            .await
            .map_err(|_| Error::Timeout(what))?
    }

    /// Send one remote-control op
    pub async fn remote_control(&self, key: RemoteKey, hold_ms: u32) -> Result<()> {
        self.ensure_ready()?;
        trace!("Remote control {} (hold {}ms)", key, hold_ms);
        self.send(ClientMessage::RemoteControl { key, hold_ms }).await
    }

    /// Start a title by id, e.g. `CUSA00001`
    pub async fn start_title(&self, title_id: &str) -> Result<()> {
        self.ensure_ready()?;

        let message = ClientMessage::BootRequest {
            title_id: title_id.to_string(),
        };
        let status = self
            .request(message, "boot result", self.inner.config.command_timeout, |event| {
                match event {
                    SessionEvent::BootResult(status) => Some(*status),
                    _ => None,
                }
            })
            .await?;

        check_status("boot", status)?;
        info!("Started {}", title_id);
        Ok(())
    }

    /// Put the device into standby
    pub async fn request_standby(&self) -> Result<()> {
        self.ensure_ready()?;

        let status = self
            .request(
                ClientMessage::StandbyRequest,
                "standby result",
                self.inner.config.command_timeout,
                |event| match event {
                    SessionEvent::StandbyResult(status) => Some(*status),
                    _ => None,
                },
            )
            .await?;

        check_status("standby", status)?;
        info!("Standby requested");
        Ok(())
    }

    /// Ask the device to hand over its on-screen keyboard
    ///
    /// # Errors
    ///
    /// `CommandFailed` if no keyboard is showing or it cannot be
    /// controlled.
    pub async fn start_osk(&self) -> Result<OskStart> {
        self.ensure_ready()?;

        let start = self
            .request(
                ClientMessage::OskStart,
                "keyboard start result",
                self.inner.config.command_timeout,
                |event| match event {
                    SessionEvent::OskStartResult(start) => Some(start.clone()),
                    _ => None,
                },
            )
            .await?;

        check_status("keyboard start", start.status)?;
        Ok(start)
    }

    /// Replace the keyboard text
    ///
    /// The caret defaults to the end of the text.
    pub async fn change_osk_text(&self, text: &str, caret: Option<usize>) -> Result<()> {
        self.ensure_ready()?;
        self.send(ClientMessage::OskChangeString(OskChange::new(text, caret)))
            .await
    }

    pub async fn osk_command(&self, command: OskCommand) -> Result<()> {
        self.ensure_ready()?;
        self.send(ClientMessage::OskControl(command)).await
    }

    /// Log out, keeping the connection open
    pub async fn logout(&self) -> Result<()> {
        self.ensure_ready()?;

        let status = self
            .request(
                ClientMessage::Logout,
                "logout result",
                self.inner.config.logout_timeout,
                |event| match event {
                    SessionEvent::LogoutResult(status) => Some(*status),
                    _ => None,
                },
            )
            .await?;

        check_status("logout", status)
    }

    /// Say goodbye and close the connection
    ///
    /// Safe to call more than once.
    pub async fn close(&self) -> Result<()> {
        let generation = self.inner.state.generation();

        {
            let mut writer = self.inner.writer.lock().await;
            if let Some(writer) = writer.as_mut().filter(|w| w.is_encrypted()) {
                if let Err(e) = writer.send(&ClientMessage::Bye).await {
                    debug!("Failed to send bye: {}", e);
                }
            }
        }

        self.inner.teardown(generation).await;

        if let Some(task) = self.inner.reader.lock().take() {
            task.abort();
        }

        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.inner.config.host)
            .field("port", &self.inner.config.port)
            .field("state", &self.inner.state.state())
            .finish()
    }
}

impl SessionInner {
    fn emit(&self, event: SessionEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    fn publish_state(&self) {
        self.status.send_replace(self.state.state());
    }

    async fn send(&self, message: &ClientMessage) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(Error::NotConnected)?;

        trace!("Sending {}", message.kind());
        writer.send(message).await?;
        Ok(())
    }

    /// Close the connection of `generation`, if still current
    async fn teardown(&self, generation: u64) {
        if self.state.generation() != generation || !self.state.close() {
            return;
        }

        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("Socket shutdown failed: {}", e);
            }
        }

        self.login.send_replace(LoginState::Closed);
        self.publish_state();
        self.emit(SessionEvent::Disconnected);

        info!("Disconnected from {}", self.config.host);
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if let Some(task) = self.reader.get_mut().take() {
            task.abort();
        }
    }
}

async fn read_loop(inner: Weak<SessionInner>, mut reader: FrameReader, generation: u64) {
    let failure = loop {
        let packet = match reader.read_packet().await {
            Ok(packet) => packet,
            Err(e) if e.is_disconnect() => break None,
            Err(e) => break Some(Error::from(e)),
        };

        let Some(inner) = inner.upgrade() else {
            return;
        };
        if inner.state.generation() != generation {
            return;
        }

        let message = match ServerMessage::decode(&packet) {
            Ok(message) => message,
            Err(e) => {
                warn!("Ignoring malformed {}: {}", packet.kind, e);
                continue;
            }
        };

        let session = Session { inner };
        if let Err(e) = session.handle(message, &mut reader).await {
            break Some(e);
        }
    };

    let Some(inner) = inner.upgrade() else {
        return;
    };

    if let Some(e) = failure {
        warn!("Session with {} failed: {}", inner.config.host, e);
        inner.emit(SessionEvent::Error(e.to_string()));
    }
    inner.teardown(generation).await;
}

impl Session {
    async fn handle(&self, message: ServerMessage, reader: &mut FrameReader) -> Result<()> {
        let inner = &self.inner;
        trace!("Received {}", message.kind());

        match message {
            ServerMessage::ServerHello { status, seed } => {
                if status != 0 {
                    return Err(Error::CommandFailed {
                        command: "hello",
                        status,
                    });
                }

                let wrapped = wrap_session_key(inner.config.public_key_pem.as_deref())?;
                let handshake = ClientMessage::handshake(&wrapped, &seed)?;
                let (encryptor, decryptor) = CipherState::new(&seed)?.into_parts();

                {
                    let mut writer = inner.writer.lock().await;
                    let writer = writer.as_mut().ok_or(Error::NotConnected)?;
                    writer.send(&handshake).await?;
                    writer.set_encryptor(encryptor);
                }
                reader.set_decryptor(decryptor);

                inner.state.hello_received()?;
                inner.publish_state();
                inner.emit(SessionEvent::Hello);
                debug!("Handshake sent; session is encrypted");

                if inner.config.auto_login {
                    let session = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = session.login(LoginOptions::default()).await {
                            warn!("Automatic login failed: {}", e);
                        }
                    });
                }
            }
            ServerMessage::LoginResult { code } => {
                let result = LoginResult::from_code(code);

                if result.is_success() && !inner.state.is_ready() {
                    inner.send(&ClientMessage::Status(0)).await?;
                    inner.state.logged_in()?;
                    inner.publish_state();
                    info!("Logged in to {}", inner.config.host);
                } else if !result.is_success() {
                    debug!("Login result: {}", result);
                }

                *inner.last_login.lock() = Some(result);
                inner.login.send_replace(LoginState::Done(result));
                inner.emit(SessionEvent::LoginResult(result));
                if result.is_success() {
                    inner.emit(SessionEvent::Ready);
                }
            }
            ServerMessage::ServerStatus { status } => {
                inner.send(&ClientMessage::Status(0)).await?;
                inner.emit(SessionEvent::ServerStatus(status));
            }
            ServerMessage::LogoutResult { status } => {
                if status == 0 && inner.state.is_ready() {
                    inner.state.logged_out()?;
                    inner.publish_state();
                    inner.login.send_replace(LoginState::Pending);
                }
                inner.emit(SessionEvent::LogoutResult(status));
            }
            ServerMessage::BootResult { status } => inner.emit(SessionEvent::BootResult(status)),
            ServerMessage::StandbyResult { status } => {
                inner.emit(SessionEvent::StandbyResult(status))
            }
            ServerMessage::OskStartResult(start) => inner.emit(SessionEvent::OskStartResult(start)),
            ServerMessage::OskStringChanged(changed) => {
                inner.emit(SessionEvent::OskStringChanged(changed))
            }
            ServerMessage::OskCommand(command) => inner.emit(SessionEvent::OskCommand(command)),
            ServerMessage::Invalid => {
                warn!("Device rejected a packet");
                inner.emit(SessionEvent::Invalid);
            }
            ServerMessage::Unknown { kind, payload } => {
                debug!("Unhandled {} ({} bytes)", kind, payload.len());
                inner.emit(SessionEvent::Unknown { kind, payload });
            }
        }

        Ok(())
    }
}

fn login_outcome(result: LoginResult) -> Result<()> {
    match result.error {
        None => Ok(()),
        Some(kind) => Err(Error::login_failed(kind, result.result_code)),
    }
}

fn check_status(command: &'static str, status: i32) -> Result<()> {
    if status == 0 {
        Ok(())
    } else {
        Err(Error::CommandFailed { command, status })
    }
}

/// Run `op` until it stops failing with `ConnectionRefused`
///
/// `op` receives the 1-based attempt number.
pub(crate) async fn retry_on_refused<T, F, Fut>(attempts: u32, delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Err(Error::ConnectionRefused(addr)) if attempt < attempts => {
                debug!(attempt, "{} refused the connection; retrying in {:?}", addr, delay);
                sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}
