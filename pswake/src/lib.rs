//! # pswake
//!
//! Discover, wake and remote-control game consoles over the
//! second-screen protocol.
//!
//! ## Features
//!
//! - Discovery over UDP broadcast
//! - Wake from standby with stored credentials
//! - Encrypted session with login, remote-control keys, title launch
//!   and standby
//! - On-screen keyboard control
//! - Credential capture by impersonating a console
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use pswake::{FileCredentialStore, WakeConfig, WakeOutcome, Waker};
//!
//! #[tokio::main]
//! async fn main() -> pswake::Result<()> {
//!     let store = Arc::new(FileCredentialStore::in_home_dir());
//!     let waker = Waker::new(store, WakeConfig::default().with_keep_socket(true));
//!
//!     if let WakeOutcome::Session(session) = waker.wake(None).await? {
//!         session.start_title("CUSA00001").await?;
//!         session.close().await?;
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod credentials;
pub mod device;
pub mod discovery;
pub mod dummy;
pub mod error;
pub mod events;
pub mod link;
pub mod osk;
pub mod session;
pub mod waker;

// Re-exports
pub use config::{DeviceConfig, DiscoveryConfig, LoginOptions, SessionConfig, WakeConfig};
pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use device::Device;
pub use discovery::{Discovery, Scan};
pub use dummy::DummyDevice;
pub use error::{Error, Result};
pub use events::{Notification, SessionEvent, TracingInterface, UserInterface};
pub use link::{Connection, DeviceLink, WakeLink};
pub use osk::OnScreenKeyboard;
pub use session::Session;
pub use waker::{WakeOutcome, Waker};

// Re-export protocol types
pub use pswake_core::{OskCommand, OskStart, PacketType, SessionState};
pub use pswake_types::{
    Credentials, DeviceStatus, KeyPress, LoginErrorKind, LoginResult, RemoteKey, StatusCode,
};
