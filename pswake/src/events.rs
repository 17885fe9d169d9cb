//! Session events and the user-interaction surface

use async_trait::async_trait;
use bytes::Bytes;
use pswake_core::{OskCommand, OskStart, OskStringChanged, PacketType};
use pswake_types::{DeviceStatus, LoginResult, RemoteKey};
use tracing::{error, info, warn};

use crate::error::Result;

/// Capacity of each session's event channel
pub const EVENT_CAPACITY: usize = 64;

/// Something that happened on a session
///
/// Delivered on the channel returned by `Session::subscribe`. Every
/// subscriber sees every event from the moment it subscribed.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// TCP connected and client hello sent
    Connected,

    /// Server hello handled and handshake sent
    Hello,

    /// A login attempt finished
    LoginResult(LoginResult),

    /// A login attempt timed out and will be retried
    LoginRetry { attempt: u32 },

    /// Logged in; commands are accepted
    Ready,

    /// Device heartbeat (already acknowledged)
    ServerStatus(i32),

    BootResult(i32),
    StandbyResult(i32),
    LogoutResult(i32),
    OskStartResult(OskStart),
    OskStringChanged(OskStringChanged),

    /// Device closed or submitted the keyboard
    OskCommand(OskCommand),

    /// Device rejected a packet
    Invalid,

    /// Packet type this library does not interpret
    Unknown { kind: PacketType, payload: Bytes },

    /// Terminal failure; a `Disconnected` follows
    Error(String),

    Disconnected,
}

/// Progress reported to the user-interaction surface
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Wake datagram sent to the device
    DeviceNotified(DeviceStatus),

    /// Logging in to an awake device
    LoggingIn(DeviceStatus),

    /// A login finished without success
    LoginResult(LoginResult),

    /// Credentials are missing; acquire them and wake again
    NeedCredentials(Option<DeviceStatus>),

    /// A registration device is listening for the credentials
    AwaitingCredentials,

    /// Connect was refused and will be retried
    ConnectRetry { attempt: u32 },

    /// A key was delivered
    SentKey(RemoteKey),

    Error(String),
}

/// Where the library asks for input and reports progress
///
/// The library never owns prompting or presentation; it calls this.
#[async_trait]
pub trait UserInterface: Send + Sync {
    /// Ask for a registration PIN; `None` if the user has none to give
    async fn prompt_for_pin(&self) -> Result<Option<String>>;

    fn notify(&self, notification: &Notification);
}

/// Logs notifications through `tracing` and never supplies a PIN
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingInterface;

#[async_trait]
impl UserInterface for TracingInterface {
    async fn prompt_for_pin(&self) -> Result<Option<String>> {
        Ok(None)
    }

    fn notify(&self, notification: &Notification) {
        match notification {
            Notification::DeviceNotified(device) => info!("WAKEUP sent to {}", device),
            Notification::LoggingIn(device) => info!("Logging in to {}", device),
            Notification::LoginResult(result) => warn!("Login result: {}", result),
            Notification::NeedCredentials(device) => match device {
                Some(device) => warn!("Credentials needed to wake {}", device),
                None => warn!("Credentials needed"),
            },
            Notification::AwaitingCredentials => {
                info!("Registration device is available; wake it from the second-screen app")
            }
            Notification::ConnectRetry { attempt } => {
                info!(attempt, "Login connect refused; retrying soon")
            }
            Notification::SentKey(key) => info!("Sent {}", key),
            Notification::Error(message) => error!("{}", message),
        }
    }
}
