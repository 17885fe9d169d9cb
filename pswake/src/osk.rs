//! On-screen keyboard control

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use pswake_core::{OskCommand, OskStart};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::events::SessionEvent;
use crate::link::Connection;

/// Control over a keyboard the device is showing
///
/// Becomes inactive once either side closes it; every method then fails
/// with `KeyboardInactive`.
pub struct OnScreenKeyboard {
    connection: Arc<dyn Connection>,
    start: OskStart,
    active: Arc<AtomicBool>,
    watcher: JoinHandle<()>,
}

impl OnScreenKeyboard {
    /// Take over the keyboard currently on screen
    ///
    /// # Errors
    ///
    /// `CommandFailed` if no text field is focused on the device.
    pub async fn open(connection: Arc<dyn Connection>) -> Result<Self> {
        let events = connection.subscribe();
        let start = connection.start_osk().await?;

        let active = Arc::new(AtomicBool::new(true));
        let watcher = tokio::spawn(watch_for_close(events, active.clone()));

        debug!("Keyboard opened (type {})", start.osk_type);

        Ok(Self {
            connection,
            start,
            active,
            watcher,
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Details reported when the keyboard was opened
    pub fn start_info(&self) -> &OskStart {
        &self.start
    }

    pub fn max_length(&self) -> Option<i32> {
        self.start.max_length
    }

    pub fn initial_text(&self) -> Option<&str> {
        self.start.initial_text.as_deref()
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(Error::KeyboardInactive)
        }
    }

    /// Replace the text; the caret defaults to the end
    pub async fn set_text(&self, text: &str, caret: Option<usize>) -> Result<()> {
        self.ensure_active()?;
        self.connection.change_osk_text(text, caret).await
    }

    /// Submit the text and close the keyboard
    pub async fn submit(&self) -> Result<()> {
        self.finish(OskCommand::Return).await
    }

    /// Close the keyboard without submitting
    pub async fn close(&self) -> Result<()> {
        self.finish(OskCommand::Close).await
    }

    async fn finish(&self, command: OskCommand) -> Result<()> {
        self.ensure_active()?;
        self.active.store(false, Ordering::Release);
        self.watcher.abort();
        self.connection.osk_command(command).await
    }
}

impl std::fmt::Debug for OnScreenKeyboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnScreenKeyboard")
            .field("start", &self.start)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Drop for OnScreenKeyboard {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

async fn watch_for_close(mut events: broadcast::Receiver<SessionEvent>, active: Arc<AtomicBool>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::OskCommand(command)) => {
                debug!("Device sent keyboard {}", command);
                break;
            }
            Ok(SessionEvent::Disconnected) | Err(broadcast::error::RecvError::Closed) => break,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Keyboard watcher missed {} events", skipped);
            }
        }
    }

    active.store(false, Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoginOptions;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use pswake_types::{LoginResult, RemoteKey};
    use std::time::Duration;
    use tokio::time::Instant;

    struct FakeKeyboardHost {
        events: broadcast::Sender<SessionEvent>,
        start_status: i32,
        sent: Mutex<Vec<String>>,
    }

    impl FakeKeyboardHost {
        fn new(start_status: i32) -> Arc<Self> {
            Arc::new(Self {
                events: broadcast::channel(16).0,
                start_status,
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Connection for FakeKeyboardHost {
        fn is_connected(&self) -> bool {
            true
        }

        fn connected_at(&self) -> Option<Instant> {
            None
        }

        fn last_login_result(&self) -> Option<LoginResult> {
            None
        }

        fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
            self.events.subscribe()
        }

        async fn login(&self, _options: LoginOptions) -> Result<()> {
            Ok(())
        }

        async fn remote_control(&self, _key: RemoteKey, _hold_ms: u32) -> Result<()> {
            Ok(())
        }

        async fn start_title(&self, _title_id: &str) -> Result<()> {
            Ok(())
        }

        async fn request_standby(&self) -> Result<()> {
            Ok(())
        }

        async fn start_osk(&self) -> Result<OskStart> {
            if self.start_status != 0 {
                return Err(Error::CommandFailed {
                    command: "keyboard start",
                    status: self.start_status,
                });
            }
            Ok(OskStart {
                status: 0,
                osk_type: 2,
                max_length: Some(64),
                initial_text: Some("hi".into()),
            })
        }

        async fn change_osk_text(&self, text: &str, caret: Option<usize>) -> Result<()> {
            self.sent.lock().push(format!("text:{}:{:?}", text, caret));
            Ok(())
        }

        async fn osk_command(&self, command: OskCommand) -> Result<()> {
            self.sent.lock().push(format!("command:{}", command));
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_set_text_then_submit() {
        let host = FakeKeyboardHost::new(0);
        let keyboard = OnScreenKeyboard::open(host.clone()).await.unwrap();

        assert!(keyboard.is_active());
        assert_eq!(keyboard.max_length(), Some(64));
        assert_eq!(keyboard.initial_text(), Some("hi"));

        keyboard.set_text("hello", None).await.unwrap();
        keyboard.submit().await.unwrap();

        assert!(!keyboard.is_active());
        assert!(matches!(keyboard.set_text("x", None).await, Err(Error::KeyboardInactive)));
        assert!(matches!(keyboard.close().await, Err(Error::KeyboardInactive)));
        assert_eq!(
            *host.sent.lock(),
            vec!["text:hello:None".to_string(), "command:return".to_string()]
        );
    }

    #[tokio::test]
    async fn test_device_close_deactivates() {
        let host = FakeKeyboardHost::new(0);
        let keyboard = OnScreenKeyboard::open(host.clone()).await.unwrap();

        host.events
            .send(SessionEvent::OskCommand(OskCommand::Close))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(1);
        while keyboard.is_active() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(!keyboard.is_active());
        assert!(matches!(keyboard.submit().await, Err(Error::KeyboardInactive)));
        assert!(host.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_open_fails_without_text_field() {
        let host = FakeKeyboardHost::new(1);
        let result = OnScreenKeyboard::open(host).await;
        assert!(matches!(
            result,
            Err(Error::CommandFailed { status: 1, .. })
        ));
    }
}
