//! High-level device interface

use std::sync::Arc;

use parking_lot::Mutex;
use pswake_types::{DeviceStatus, KeyPress, LoginResult, RemoteKey};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::config::{DeviceConfig, LoginOptions};
use crate::credentials::CredentialStore;
use crate::error::{Error, Result};
use crate::events::{Notification, TracingInterface, UserInterface};
use crate::link::{Connection, DeviceLink, WakeLink};
use crate::osk::OnScreenKeyboard;
use crate::waker::Waker;

/// One console
///
/// Keeps a single connection open across calls so repeated commands do
/// not flash connect and disconnect notices on the TV. Every command
/// wakes the device and logs in first if needed.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use pswake::{Device, DeviceConfig, FileCredentialStore};
///
/// #[tokio::main]
/// async fn main() -> pswake::Result<()> {
///     let store = Arc::new(FileCredentialStore::in_home_dir());
///     let device = Device::new(store, DeviceConfig::default());
///
///     device.send_key_names(&["ps", "right", "enter"]).await?;
///     device.turn_off().await?;
///     device.close().await?;
///     Ok(())
/// }
/// ```
pub struct Device {
    config: DeviceConfig,
    link: Arc<dyn DeviceLink>,
    ui: Arc<dyn UserInterface>,
    live: tokio::sync::Mutex<Option<Arc<dyn Connection>>>,
    commands: tokio::sync::Mutex<()>,
    keyboard: Mutex<Option<Arc<OnScreenKeyboard>>>,
}

impl Device {
    /// Create a device reached over the local network
    pub fn new(store: Arc<dyn CredentialStore>, config: DeviceConfig) -> Self {
        Self::with_interface(store, config, Arc::new(TracingInterface))
    }

    pub fn with_interface(
        store: Arc<dyn CredentialStore>,
        config: DeviceConfig,
        ui: Arc<dyn UserInterface>,
    ) -> Self {
        let waker = Waker::with_interface(store, config.facade_wake_config(), ui.clone());
        let link = WakeLink::new(waker, config.address, config.timeout);
        Self::with_link(Arc::new(link), config, ui)
    }

    /// Create a device reached through a custom link
    pub fn with_link(link: Arc<dyn DeviceLink>, config: DeviceConfig, ui: Arc<dyn UserInterface>) -> Self {
        Self {
            config,
            link,
            ui,
            live: tokio::sync::Mutex::new(None),
            commands: tokio::sync::Mutex::new(()),
            keyboard: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Check if a connection is currently open
    pub async fn is_connected(&self) -> bool {
        self.live
            .lock()
            .await
            .as_ref()
            .is_some_and(|connection| connection.is_connected())
    }

    /// Fresh status snapshot
    pub async fn status(&self) -> Result<DeviceStatus> {
        self.link.detect().await
    }

    /// Connection to the device, waking it if needed
    ///
    /// Concurrent callers share one connection attempt.
    pub async fn open_socket(&self) -> Result<Arc<dyn Connection>> {
        let mut live = self.live.lock().await;
        if let Some(connection) = current(&live) {
            return Ok(connection);
        }

        let device = self.link.detect().await?;
        self.connect_locked(&mut live, &device)
            .await?
            .ok_or(Error::NotLoggedIn)
    }

    /// Connection if the device is awake, `None` if it is not
    async fn connect_if_awake(&self) -> Result<Option<Arc<dyn Connection>>> {
        let device = self.link.detect().await?;
        if !device.is_awake() {
            debug!("{} is not awake", device);
            return Ok(None);
        }

        let mut live = self.live.lock().await;
        if let Some(connection) = current(&live) {
            return Ok(Some(connection));
        }
        self.connect_locked(&mut live, &device).await
    }

    async fn connect_locked(
        &self,
        live: &mut Option<Arc<dyn Connection>>,
        device: &DeviceStatus,
    ) -> Result<Option<Arc<dyn Connection>>> {
        if let Some(stale) = live.take() {
            if let Err(e) = stale.close().await {
                debug!("Closing stale connection: {}", e);
            }
        }
        self.keyboard.lock().take();

        let connection = self.link.connect(device).await?;
        if connection.is_some() {
            info!("Connected to {}", device);
        }
        live.clone_from(&connection);
        Ok(connection)
    }

    /// Make sure the connection is logged in
    ///
    /// A login that already finished is not repeated; its failure is
    /// reported again.
    async fn ensure_logged_in(&self, connection: &Arc<dyn Connection>) -> Result<()> {
        match connection.last_login_result() {
            Some(LoginResult { error: None, .. }) => Ok(()),
            Some(LoginResult {
                error: Some(kind),
                result_code,
            }) => Err(Error::login_failed(kind, result_code)),
            None => {
                let options = LoginOptions::default().with_pass_code(self.config.pass_code.clone());
                connection.login(options).await
            }
        }
    }

    /// Connect, waking the device if needed, and log in
    pub async fn login(&self) -> Result<Arc<dyn Connection>> {
        let connection = self.open_socket().await?;
        self.ensure_logged_in(&connection).await?;
        Ok(connection)
    }

    /// Wake the device if it is not already on
    pub async fn turn_on(&self) -> Result<()> {
        let mut live = self.live.lock().await;
        if current(&live).is_some() {
            return Ok(());
        }

        let device = self.link.detect().await?;
        self.connect_locked(&mut live, &device).await?;
        Ok(())
    }

    /// Put the device into standby
    ///
    /// Does nothing if it is not awake. A refused standby request is
    /// retried once on a fresh connection.
    pub async fn turn_off(&self) -> Result<()> {
        let _commands = self.commands.lock().await;

        let Some(connection) = self.connect_if_awake().await? else {
            return Ok(());
        };
        self.ensure_logged_in(&connection).await?;

        let Err(e) = connection.request_standby().await else {
            return Ok(());
        };

        warn!("Standby request failed ({}); retrying on a new connection", e);
        self.drop_connection().await;
        sleep(self.config.turn_off_retry_delay).await;

        let Some(connection) = self.connect_if_awake().await? else {
            return Ok(());
        };
        self.ensure_logged_in(&connection).await?;
        connection.request_standby().await
    }

    /// Start a title by id, e.g. `CUSA00001`
    pub async fn start_title(&self, title_id: &str) -> Result<()> {
        let connection = self.login().await?;
        connection.start_title(title_id).await
    }

    /// Parse `name[:holdMillis]` entries and send them
    pub async fn send_key_names(&self, names: &[&str]) -> Result<()> {
        let keys = names
            .iter()
            .map(|name| name.parse::<KeyPress>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| match e {
                pswake_types::Error::InvalidKeyName(name) => Error::InvalidKeyName(name),
                other => Error::Types(other),
            })?;

        self.send_keys(&keys).await
    }

    /// Send a key sequence through the remote-control channel
    ///
    /// Opens the channel, then taps or holds each key in order and
    /// closes the channel again. Sequences from concurrent callers do
    /// not interleave.
    pub async fn send_keys(&self, keys: &[KeyPress]) -> Result<()> {
        if keys.is_empty() {
            return Err(Error::NoKeys);
        }

        let _commands = self.commands.lock().await;
        let connection = self.login().await?;

        if let Some(connected_at) = connection.connected_at() {
            let ready_at = connected_at + self.config.post_connect_key_delay;
            if ready_at > Instant::now() {
                // The device ignores OPEN_RC sent too soon after connecting
                sleep(ready_at - Instant::now()).await;
            }
        }

        connection.remote_control(RemoteKey::OpenRc, 0).await?;
        sleep(self.config.key_delay).await;

        for press in keys {
            connection.remote_control(press.key, 0).await?;

            if press.is_held() {
                sleep(press.hold).await;
                let hold_ms = u32::try_from(press.hold.as_millis()).unwrap_or(u32::MAX);
                connection.remote_control(press.key, hold_ms).await?;
            }

            // KEY_OFF after a held PS breaks the long press
            if !(press.key == RemoteKey::Ps && press.is_held()) {
                connection.remote_control(RemoteKey::KeyOff, 0).await?;
            }

            if !press.key.is_channel_control() {
                self.ui.notify(&Notification::SentKey(press.key));
            }

            let delay = if press.key == RemoteKey::Ps {
                self.config.ps_key_delay
            } else {
                self.config.key_delay
            };
            sleep(delay).await;
        }

        connection.remote_control(RemoteKey::CloseRc, 0).await?;
        sleep(self.config.key_delay).await;

        Ok(())
    }

    /// Control the on-screen keyboard
    ///
    /// Reuses the open keyboard while it stays active.
    ///
    /// # Errors
    ///
    /// `CommandFailed` if no text field is focused.
    pub async fn get_keyboard(&self) -> Result<Arc<OnScreenKeyboard>> {
        if let Some(keyboard) = self.keyboard.lock().as_ref().filter(|k| k.is_active()) {
            return Ok(keyboard.clone());
        }

        let connection = self.login().await?;
        let keyboard = Arc::new(OnScreenKeyboard::open(connection).await?);
        *self.keyboard.lock() = Some(keyboard.clone());

        Ok(keyboard)
    }

    /// Close the connection, if any
    pub async fn close(&self) -> Result<()> {
        let connection = self.live.lock().await.take();
        self.keyboard.lock().take();

        match connection {
            Some(connection) => connection.close().await,
            None => Ok(()),
        }
    }

    async fn drop_connection(&self) {
        if let Err(e) = self.close().await {
            debug!("Close before retry failed: {}", e);
        }
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("address", &self.config.address)
            .field("auto_login", &self.config.auto_login)
            .finish()
    }
}

fn current(live: &Option<Arc<dyn Connection>>) -> Option<Arc<dyn Connection>> {
    live.as_ref()
        .filter(|connection| connection.is_connected())
        .cloned()
}
