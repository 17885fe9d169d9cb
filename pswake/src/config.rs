//! Configuration
//!
//! Builder-style settings for each component. Every default is a timing
//! or port observed against real device firmware; the ports are
//! overridable so the stack can be pointed at a local fake device.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use pswake_core::{DDP_PORT, DEFAULT_PORT, constants};

/// Settings for one session connection
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Account id presented at login (the `user-credential`)
    pub account_id: String,
    pub host: IpAddr,
    pub port: u16,

    /// Port that receives the pre-connect wake hints
    pub ddp_port: u16,
    pub pin_code: String,
    pub pass_code: String,
    pub auto_login: bool,
    pub model_name: String,

    /// Send WAKEUP and LAUNCH hints before opening TCP
    pub send_wake_hints: bool,
    pub wake_hint_delay: Duration,

    pub connect_timeout: Duration,
    /// Total connect attempts when the device refuses the connection
    pub connect_attempts: u32,
    pub connect_retry_delay: Duration,

    pub login_timeout: Duration,
    /// Total login attempts when no result arrives
    pub login_retries: u32,
    pub login_retry_delay: Duration,

    /// How long to wait for a correlated command result
    pub command_timeout: Duration,
    pub logout_timeout: Duration,

    /// PEM public key the session key is wrapped with; embedded key if unset
    ///
    /// The embedded key is a stand-in that only local fakes accept. A real
    /// console rejects the handshake unless its vendor key is set here.
    pub public_key_pem: Option<String>,
}

impl SessionConfig {
    pub fn new(account_id: impl Into<String>, host: IpAddr) -> Self {
        Self {
            account_id: account_id.into(),
            host,
            port: DEFAULT_PORT,
            ddp_port: DDP_PORT,
            pin_code: String::new(),
            pass_code: String::new(),
            auto_login: true,
            model_name: constants::login::MODEL_NAME.to_string(),
            send_wake_hints: true,
            wake_hint_delay: Duration::from_millis(500),
            connect_timeout: Duration::from_secs(5),
            connect_attempts: 5,
            connect_retry_delay: Duration::from_secs(1),
            login_timeout: Duration::from_secs(5),
            login_retries: 3,
            login_retry_delay: Duration::from_secs(2),
            command_timeout: Duration::from_secs(10),
            logout_timeout: Duration::from_secs(15),
            public_key_pem: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_ddp_port(mut self, port: u16) -> Self {
        self.ddp_port = port;
        self
    }

    pub fn with_pin_code(mut self, pin_code: impl Into<String>) -> Self {
        self.pin_code = pin_code.into();
        self
    }

    pub fn with_pass_code(mut self, pass_code: impl Into<String>) -> Self {
        self.pass_code = pass_code.into();
        self
    }

    pub fn with_auto_login(mut self, auto_login: bool) -> Self {
        self.auto_login = auto_login;
        self
    }

    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    pub fn with_wake_hints(mut self, send: bool) -> Self {
        self.send_wake_hints = send;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_connect_retries(mut self, attempts: u32, delay: Duration) -> Self {
        self.connect_attempts = attempts;
        self.connect_retry_delay = delay;
        self
    }

    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    pub fn with_login_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.login_retries = retries;
        self.login_retry_delay = delay;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_logout_timeout(mut self, timeout: Duration) -> Self {
        self.logout_timeout = timeout;
        self
    }

    /// Wrap the session key with `pem`; required for real hardware
    pub fn with_public_key_pem(mut self, pem: impl Into<String>) -> Self {
        self.public_key_pem = Some(pem.into());
        self
    }
}

/// Per-call login overrides
///
/// Unset fields fall back to the session's [`SessionConfig`].
#[derive(Debug, Clone, Default)]
pub struct LoginOptions {
    pub pin_code: Option<String>,
    pub pass_code: Option<String>,
    pub timeout: Option<Duration>,
    pub retries: Option<u32>,
}

impl LoginOptions {
    pub fn with_pin_code(mut self, pin_code: impl Into<String>) -> Self {
        self.pin_code = Some(pin_code.into());
        self
    }

    pub fn with_pass_code(mut self, pass_code: impl Into<String>) -> Self {
        self.pass_code = Some(pass_code.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }
}

impl From<&str> for LoginOptions {
    fn from(pin_code: &str) -> Self {
        Self::default().with_pin_code(pin_code)
    }
}

impl From<String> for LoginOptions {
    fn from(pin_code: String) -> Self {
        Self::default().with_pin_code(pin_code)
    }
}

/// Discovery socket settings
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Local address the scan socket binds to
    pub bind_addr: SocketAddr,

    /// Where `SRCH` requests go when scanning for any device
    pub target: SocketAddr,

    /// Port used when a scan targets one known address
    pub ddp_port: u16,
    pub search_interval: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            target: SocketAddr::new(IpAddr::V4(Ipv4Addr::from(constants::BROADCAST_ADDR)), DDP_PORT),
            ddp_port: DDP_PORT,
            search_interval: Duration::from_secs(1),
        }
    }
}

impl DiscoveryConfig {
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_target(mut self, target: SocketAddr) -> Self {
        self.target = target;
        self
    }

    pub fn with_ddp_port(mut self, port: u16) -> Self {
        self.ddp_port = port;
        self
    }

    pub fn with_search_interval(mut self, interval: Duration) -> Self {
        self.search_interval = interval;
        self
    }
}

/// Wake orchestration settings
#[derive(Debug, Clone)]
pub struct WakeConfig {
    /// Log in once the device is awake
    pub auto_login: bool,

    /// Fail if the device is not in standby
    pub error_if_awake: bool,

    /// Hand the logged-in session back instead of closing it
    pub keep_socket: bool,

    /// Budget for the device to report awake
    pub timeout: Duration,

    /// Lower bound on `timeout`
    pub min_wait: Duration,
    pub poll_interval: Duration,

    /// Budget for locating a device when none is given
    pub detect_timeout: Duration,
    pub pass_code: String,
    pub discovery: DiscoveryConfig,

    /// Port the session connects to after waking; advertised port if unset
    pub session_port: Option<u16>,

    /// Adjusts each session opened after waking
    pub session: fn(SessionConfig) -> SessionConfig,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            auto_login: true,
            error_if_awake: true,
            keep_socket: false,
            timeout: Duration::from_secs(30),
            min_wait: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            detect_timeout: Duration::from_secs(10),
            pass_code: String::new(),
            discovery: DiscoveryConfig::default(),
            session_port: None,
            session: |config| config,
        }
    }
}

impl WakeConfig {
    pub fn with_auto_login(mut self, auto_login: bool) -> Self {
        self.auto_login = auto_login;
        self
    }

    pub fn with_error_if_awake(mut self, error_if_awake: bool) -> Self {
        self.error_if_awake = error_if_awake;
        self
    }

    pub fn with_keep_socket(mut self, keep_socket: bool) -> Self {
        self.keep_socket = keep_socket;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_min_wait(mut self, min_wait: Duration) -> Self {
        self.min_wait = min_wait;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_detect_timeout(mut self, timeout: Duration) -> Self {
        self.detect_timeout = timeout;
        self
    }

    pub fn with_pass_code(mut self, pass_code: impl Into<String>) -> Self {
        self.pass_code = pass_code.into();
        self
    }

    pub fn with_discovery(mut self, discovery: DiscoveryConfig) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn with_session_port(mut self, port: u16) -> Self {
        self.session_port = Some(port);
        self
    }

    pub fn with_session(mut self, adjust: fn(SessionConfig) -> SessionConfig) -> Self {
        self.session = adjust;
        self
    }

    /// Effective wait budget
    pub fn wake_budget(&self) -> Duration {
        self.timeout.max(self.min_wait)
    }
}

/// Device facade settings
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Specific device to control; first one found if unset
    pub address: Option<IpAddr>,
    pub auto_login: bool,
    pub pass_code: String,

    /// Budget for network operations such as detection
    pub timeout: Duration,

    /// Minimum time between connecting and the first key
    pub post_connect_key_delay: Duration,
    pub key_delay: Duration,
    pub ps_key_delay: Duration,
    pub turn_off_retry_delay: Duration,
    pub wake: WakeConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: None,
            auto_login: true,
            pass_code: String::new(),
            timeout: Duration::from_secs(10),
            post_connect_key_delay: Duration::from_millis(1500),
            key_delay: Duration::from_millis(200),
            ps_key_delay: Duration::from_millis(1000),
            turn_off_retry_delay: Duration::from_millis(500),
            wake: WakeConfig::default(),
        }
    }
}

impl DeviceConfig {
    pub fn with_address(mut self, address: IpAddr) -> Self {
        self.address = Some(address);
        self
    }

    pub fn with_auto_login(mut self, auto_login: bool) -> Self {
        self.auto_login = auto_login;
        self
    }

    pub fn with_pass_code(mut self, pass_code: impl Into<String>) -> Self {
        self.pass_code = pass_code.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_key_delays(mut self, post_connect: Duration, key: Duration, ps_key: Duration) -> Self {
        self.post_connect_key_delay = post_connect;
        self.key_delay = key;
        self.ps_key_delay = ps_key;
        self
    }

    pub fn with_turn_off_retry_delay(mut self, delay: Duration) -> Self {
        self.turn_off_retry_delay = delay;
        self
    }

    pub fn with_wake(mut self, wake: WakeConfig) -> Self {
        self.wake = wake;
        self
    }

    /// Wake settings the facade uses: keep the socket, never fail on awake
    pub fn facade_wake_config(&self) -> WakeConfig {
        self.wake
            .clone()
            .with_keep_socket(true)
            .with_error_if_awake(false)
            .with_auto_login(self.auto_login)
            .with_pass_code(self.pass_code.clone())
            .with_detect_timeout(self.timeout)
    }
}
