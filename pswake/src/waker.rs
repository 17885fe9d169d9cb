//! Wake flow
//!
//! Find the device, send it the stored credentials in a WAKEUP datagram,
//! poll until it reports itself awake, then optionally log in.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use pswake_core::DdpMessage;
use pswake_transport::DdpSocket;
use pswake_types::{Credentials, DeviceStatus, LoginErrorKind, LoginResult};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, trace, warn};

use crate::config::{LoginOptions, SessionConfig, WakeConfig};
use crate::credentials::CredentialStore;
use crate::discovery::Discovery;
use crate::dummy::DummyDevice;
use crate::error::{Error, Result};
use crate::events::{Notification, TracingInterface, UserInterface};
use crate::session::{Session, retry_on_refused};

/// What a finished wake produced
#[derive(Debug)]
pub enum WakeOutcome {
    /// Device is awake; no session was kept
    Awake(DeviceStatus),

    /// Device is awake and this session is logged in
    Session(Session),
}

impl WakeOutcome {
    pub fn into_session(self) -> Option<Session> {
        match self {
            Self::Session(session) => Some(session),
            Self::Awake(_) => None,
        }
    }
}

/// Wakes devices from standby
pub struct Waker {
    store: Arc<dyn CredentialStore>,
    config: WakeConfig,
    ui: Arc<dyn UserInterface>,
    discovery: Discovery,
}

impl Waker {
    pub fn new(store: Arc<dyn CredentialStore>, config: WakeConfig) -> Self {
        Self::with_interface(store, config, Arc::new(TracingInterface))
    }

    pub fn with_interface(
        store: Arc<dyn CredentialStore>,
        config: WakeConfig,
        ui: Arc<dyn UserInterface>,
    ) -> Self {
        let discovery = Discovery::new(config.discovery.clone());
        Self {
            store,
            config,
            ui,
            discovery,
        }
    }

    pub fn config(&self) -> &WakeConfig {
        &self.config
    }

    pub fn discovery(&self) -> &Discovery {
        &self.discovery
    }

    /// Wake `device`, or the first device that answers a search
    ///
    /// # Errors
    ///
    /// - `NeedCredentials` when the store has none; the interface is
    ///   notified and the caller should run [`Waker::request_credentials`]
    /// - `AlreadyAwake` if the device is on and `error_if_awake` is set
    /// - `DidNotWakeInTime` if it never reports itself awake
    /// - `LoginFailed` when the automatic login is refused
    pub async fn wake(&self, device: Option<DeviceStatus>) -> Result<WakeOutcome> {
        let device = match device {
            Some(device) => device,
            None => self.discovery.find_any(self.config.detect_timeout).await?,
        };

        let credentials = match self.store.read().await {
            Ok(credentials) => credentials,
            Err(Error::CredentialsNotFound(location)) => {
                debug!("No credentials at {}", location);
                self.ui
                    .notify(&Notification::NeedCredentials(Some(device.clone())));
                return Err(Error::NeedCredentials);
            }
            Err(e) => return Err(e),
        };

        if !device.is_standby() {
            if self.config.error_if_awake {
                return Err(Error::AlreadyAwake);
            }
            debug!("{} is already awake", device);
        }

        self.send_wakeup(&device, &credentials).await?;
        self.ui.notify(&Notification::DeviceNotified(device.clone()));
        let device = self.wait_until_awake(device.address).await?;

        if !self.config.auto_login {
            return Ok(WakeOutcome::Awake(device));
        }

        self.ui.notify(&Notification::LoggingIn(device.clone()));
        let session = self.open_session(&device, &credentials).await?;

        if self.config.keep_socket {
            Ok(WakeOutcome::Session(session))
        } else {
            session.close().await?;
            Ok(WakeOutcome::Awake(device))
        }
    }

    async fn send_wakeup(&self, device: &DeviceStatus, credentials: &Credentials) -> Result<()> {
        let target = SocketAddr::new(device.address, self.config.discovery.ddp_port);
        let socket = DdpSocket::bind(self.config.discovery.bind_addr).await?;

        socket.send(&DdpMessage::wakeup(credentials), target).await?;
        info!("WAKEUP sent to {}", target);
        Ok(())
    }

    /// Poll the device until it reports itself awake
    ///
    /// One poll per interval against a fixed deadline; gives up when less
    /// than one interval of budget remains.
    async fn wait_until_awake(&self, address: IpAddr) -> Result<DeviceStatus> {
        let budget = self.config.wake_budget();
        let poll_interval = self.config.poll_interval;
        let deadline = Instant::now() + budget;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining <= poll_interval {
                warn!("{} did not wake within {:?}", address, budget);
                return Err(Error::DidNotWakeInTime(budget));
            }

            sleep(poll_interval).await;

            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.discovery.find_by_address(address, remaining).await {
                Ok(device) if device.is_awake() => {
                    info!("{} is awake", device);
                    return Ok(device);
                }
                Ok(device) => trace!("{} is still {}", address, device.status),
                Err(Error::NotFound) => trace!("No answer from {}", address),
                Err(e) => return Err(e),
            }
        }
    }

    /// Connect to an awake device and log in without a PIN
    async fn open_session(&self, device: &DeviceStatus, credentials: &Credentials) -> Result<Session> {
        let config = SessionConfig::new(credentials.user_credential.as_str(), device.address)
            .with_port(self.config.session_port.unwrap_or(device.port))
            .with_ddp_port(self.config.discovery.ddp_port)
            .with_pass_code(self.config.pass_code.as_str())
            .with_auto_login(false);
        let config = (self.config.session)(config);

        let attempts = config.connect_attempts;
        let delay = config.connect_retry_delay;
        let single = config.with_connect_retries(1, delay);

        let session = retry_on_refused(attempts, delay, |attempt| {
            if attempt > 1 {
                self.ui.notify(&Notification::ConnectRetry { attempt });
            }
            Session::connect(single.clone())
        })
        .await?;

        if let Err(e) = self.login(&session).await {
            if let Err(close) = session.close().await {
                debug!("Close after failed login: {}", close);
            }
            return Err(e);
        }

        Ok(session)
    }

    async fn login(&self, session: &Session) -> Result<()> {
        let (kind, code) = match session.login(LoginOptions::default()).await {
            Ok(()) => return Ok(()),
            Err(Error::LoginFailed { kind, code }) => (kind, code),
            Err(e) => return Err(e),
        };

        let result = session
            .last_login_result()
            .unwrap_or_else(|| LoginResult::from_code(code));
        self.ui.notify(&Notification::LoginResult(result));

        if !matches!(kind, LoginErrorKind::PinNeeded | LoginErrorKind::PasscodeNeeded) {
            return Err(Error::login_failed(kind, code));
        }

        match self.ui.prompt_for_pin().await? {
            Some(pin_code) => {
                debug!("Retrying login with a PIN");
                session.login(pin_code).await
            }
            None => Err(Error::login_failed(kind, code)),
        }
    }

    /// Capture credentials from the second-screen app and store them
    ///
    /// Impersonates a standby console at `bind` (normally port 987 on
    /// all interfaces) until the app sends it a WAKEUP.
    pub async fn request_credentials(&self, bind: SocketAddr) -> Result<Credentials> {
        let dummy = DummyDevice::bind(bind).await?;
        self.ui.notify(&Notification::AwaitingCredentials);

        let credentials = dummy.wait_for_wakeup().await?;
        self.store.write(&credentials).await?;

        info!("Stored new credentials");
        Ok(credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiscoveryConfig;
    use crate::credentials::{MemoryCredentialStore, MockCredentialStore};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use pswake_core::constants::STATUS_AWAKE;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Notification>>,
    }

    #[async_trait::async_trait]
    impl UserInterface for Recorder {
        async fn prompt_for_pin(&self) -> Result<Option<String>> {
            Ok(None)
        }

        fn notify(&self, notification: &Notification) {
            self.seen.lock().push(notification.clone());
        }
    }

    fn local() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    fn credentials() -> Credentials {
        Credentials::new("a", "C", "24680")
    }

    fn config_for(target: SocketAddr) -> WakeConfig {
        WakeConfig::default()
            .with_auto_login(false)
            .with_timeout(Duration::from_secs(3))
            .with_min_wait(Duration::from_secs(3))
            .with_poll_interval(Duration::from_millis(100))
            .with_detect_timeout(Duration::from_secs(2))
            .with_discovery(
                DiscoveryConfig::default()
                    .with_bind_addr(local())
                    .with_target(target)
                    .with_ddp_port(target.port())
                    .with_search_interval(Duration::from_millis(50)),
            )
    }

    #[tokio::test]
    async fn test_missing_credentials_asks_for_them() {
        let dummy = Arc::new(DummyDevice::bind(local()).await.unwrap());
        let target = dummy.local_addr().unwrap();
        let server = {
            let dummy = dummy.clone();
            tokio::spawn(async move { while dummy.next_request().await.is_ok() {} })
        };

        let mut store = MockCredentialStore::new();
        store
            .expect_read()
            .returning(|| Err(Error::CredentialsNotFound("nowhere".into())));
        store.expect_write().never();

        let ui = Arc::new(Recorder::default());
        let waker = Waker::with_interface(Arc::new(store), config_for(target), ui.clone());

        let result = waker.wake(None).await;
        assert!(matches!(result, Err(Error::NeedCredentials)));
        assert!(matches!(
            ui.seen.lock().as_slice(),
            [Notification::NeedCredentials(Some(_))]
        ));

        server.abort();
    }

    #[tokio::test]
    async fn test_awake_device_is_an_error_when_configured() {
        let dummy = Arc::new(DummyDevice::bind(local()).await.unwrap());
        dummy.set_status(STATUS_AWAKE);
        let target = dummy.local_addr().unwrap();
        let server = {
            let dummy = dummy.clone();
            tokio::spawn(async move { while dummy.next_request().await.is_ok() {} })
        };

        let store = Arc::new(MemoryCredentialStore::new(Some(credentials())));
        let waker = Waker::new(store, config_for(target));

        assert!(matches!(waker.wake(None).await, Err(Error::AlreadyAwake)));

        server.abort();
    }

    #[tokio::test]
    async fn test_awake_device_still_gets_wakeup_when_allowed() {
        let dummy = Arc::new(DummyDevice::bind(local()).await.unwrap());
        dummy.set_status(STATUS_AWAKE);
        let target = dummy.local_addr().unwrap();
        let (captured_tx, captured_rx) = tokio::sync::oneshot::channel();
        let server = {
            let dummy = dummy.clone();
            tokio::spawn(async move {
                let received = dummy.wait_for_wakeup().await.unwrap();
                let _ = captured_tx.send(received);
                while dummy.next_request().await.is_ok() {}
            })
        };

        let waker = Waker::new(
            Arc::new(MemoryCredentialStore::new(Some(credentials()))),
            config_for(target).with_error_if_awake(false),
        );
        let outcome = waker.wake(None).await.unwrap();
        assert!(matches!(outcome, WakeOutcome::Awake(device) if device.is_awake()));

        let captured = tokio::time::timeout(Duration::from_secs(2), captured_rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(captured, credentials());

        server.abort();
    }

    #[tokio::test]
    async fn test_wakes_standby_device() {
        let dummy = Arc::new(DummyDevice::bind(local()).await.unwrap());
        let target = dummy.local_addr().unwrap();

        let server = {
            let dummy = dummy.clone();
            tokio::spawn(async move {
                let received = dummy.wait_for_wakeup().await.unwrap();
                dummy.set_status(STATUS_AWAKE);
                while dummy.next_request().await.is_ok() {}
                received
            })
        };

        let ui = Arc::new(Recorder::default());
        let store = Arc::new(MemoryCredentialStore::new(Some(credentials())));
        let waker = Waker::with_interface(store, config_for(target), ui.clone());

        let outcome = waker.wake(None).await.unwrap();
        let WakeOutcome::Awake(device) = outcome else {
            panic!("expected no session");
        };
        assert!(device.is_awake());
        assert!(matches!(
            ui.seen.lock().first(),
            Some(Notification::DeviceNotified(_))
        ));

        server.abort();
    }

    #[tokio::test]
    async fn test_gives_up_when_device_stays_asleep() {
        let dummy = Arc::new(DummyDevice::bind(local()).await.unwrap());
        let target = dummy.local_addr().unwrap();
        let server = {
            let dummy = dummy.clone();
            tokio::spawn(async move { while dummy.next_request().await.is_ok() {} })
        };

        let store = Arc::new(MemoryCredentialStore::new(Some(credentials())));
        let config = config_for(target)
            .with_timeout(Duration::from_millis(600))
            .with_min_wait(Duration::from_millis(600));
        let waker = Waker::new(store, config);

        let started = std::time::Instant::now();
        let result = waker.wake(None).await;
        let elapsed = started.elapsed();

        assert!(matches!(result, Err(Error::DidNotWakeInTime(_))));
        // detection plus the budget plus at most one poll interval
        assert!(elapsed < Duration::from_millis(600 + 100 + 2000));

        server.abort();
    }

    #[tokio::test]
    async fn test_request_credentials_stores_them() {
        let store = Arc::new(MemoryCredentialStore::default());
        let waker = Arc::new(Waker::new(store.clone(), WakeConfig::default()));

        // Bind the impersonator ourselves to learn its port first
        let reserved = DdpSocket::bind(local()).await.unwrap();
        let bind = reserved.local_addr().unwrap();
        drop(reserved);

        let capture = {
            let waker = waker.clone();
            tokio::spawn(async move { waker.request_credentials(bind).await })
        };

        let app = DdpSocket::bind(local()).await.unwrap();
        let wanted = credentials();
        let captured = loop {
            app.send(&DdpMessage::wakeup(&wanted), bind).await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            if capture.is_finished() {
                break capture.await.unwrap().unwrap();
            }
        };

        assert_eq!(captured, wanted);
        assert_eq!(store.get(), Some(wanted));
    }
}
