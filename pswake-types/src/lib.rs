//! Type definitions for pswake

pub mod credentials;
pub mod device_status;
pub mod error;
pub mod login;
pub mod remote_key;

pub use credentials::Credentials;
pub use device_status::{DeviceStatus, StatusCode};
pub use error::{Error, Result};
pub use login::{LoginErrorKind, LoginResult};
pub use remote_key::{KeyPress, RemoteKey};
