//! Seams between the device facade and the network
//!
//! [`Connection`] is what the facade needs from a live session and
//! [`DeviceLink`] is how it finds, wakes and connects to its device.
//! [`Session`] and [`WakeLink`] are the network-backed implementations.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pswake_core::{OskCommand, OskStart};
use pswake_types::{DeviceStatus, LoginResult, RemoteKey};
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::config::LoginOptions;
use crate::error::Result;
use crate::events::SessionEvent;
use crate::session::Session;
use crate::waker::{WakeOutcome, Waker};

/// Live connection to a device
#[async_trait]
pub trait Connection: Send + Sync {
    fn is_connected(&self) -> bool;

    fn connected_at(&self) -> Option<Instant>;

    fn last_login_result(&self) -> Option<LoginResult>;

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;

    async fn login(&self, options: LoginOptions) -> Result<()>;

    async fn remote_control(&self, key: RemoteKey, hold_ms: u32) -> Result<()>;

    async fn start_title(&self, title_id: &str) -> Result<()>;

    async fn request_standby(&self) -> Result<()>;

    async fn start_osk(&self) -> Result<OskStart>;

    async fn change_osk_text(&self, text: &str, caret: Option<usize>) -> Result<()>;

    async fn osk_command(&self, command: OskCommand) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
impl Connection for Session {
    fn is_connected(&self) -> bool {
        Session::is_connected(self)
    }

    fn connected_at(&self) -> Option<Instant> {
        Session::connected_at(self)
    }

    fn last_login_result(&self) -> Option<LoginResult> {
        Session::last_login_result(self)
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        Session::subscribe(self)
    }

    async fn login(&self, options: LoginOptions) -> Result<()> {
        Session::login(self, options).await
    }

    async fn remote_control(&self, key: RemoteKey, hold_ms: u32) -> Result<()> {
        Session::remote_control(self, key, hold_ms).await
    }

    async fn start_title(&self, title_id: &str) -> Result<()> {
        Session::start_title(self, title_id).await
    }

    async fn request_standby(&self) -> Result<()> {
        Session::request_standby(self).await
    }

    async fn start_osk(&self) -> Result<OskStart> {
        Session::start_osk(self).await
    }

    async fn change_osk_text(&self, text: &str, caret: Option<usize>) -> Result<()> {
        Session::change_osk_text(self, text, caret).await
    }

    async fn osk_command(&self, command: OskCommand) -> Result<()> {
        Session::osk_command(self, command).await
    }

    async fn close(&self) -> Result<()> {
        Session::close(self).await
    }
}

/// How a facade reaches its device
#[async_trait]
pub trait DeviceLink: Send + Sync {
    /// Fresh status of the device
    async fn detect(&self) -> Result<DeviceStatus>;

    /// Wake `device` if needed and connect to it
    ///
    /// `None` means the device was woken but no session was kept.
    async fn connect(&self, device: &DeviceStatus) -> Result<Option<Arc<dyn Connection>>>;
}

/// Discovery and the wake flow over the local network
pub struct WakeLink {
    waker: Waker,
    address: Option<IpAddr>,
    detect_timeout: Duration,
}

impl WakeLink {
    /// Target `address`, or the first device that answers
    ///
    /// The waker should keep its socket, or `connect` never yields one.
    pub fn new(waker: Waker, address: Option<IpAddr>, detect_timeout: Duration) -> Self {
        Self {
            waker,
            address,
            detect_timeout,
        }
    }

    pub fn waker(&self) -> &Waker {
        &self.waker
    }
}

#[async_trait]
impl DeviceLink for WakeLink {
    async fn detect(&self) -> Result<DeviceStatus> {
        let discovery = self.waker.discovery();
        match self.address {
            Some(address) => discovery.find_by_address(address, self.detect_timeout).await,
            None => discovery.find_any(self.detect_timeout).await,
        }
    }

    async fn connect(&self, device: &DeviceStatus) -> Result<Option<Arc<dyn Connection>>> {
        match self.waker.wake(Some(device.clone())).await? {
            WakeOutcome::Session(session) => Ok(Some(Arc::new(session))),
            WakeOutcome::Awake(_) => Ok(None),
        }
    }
}
