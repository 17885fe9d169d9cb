//! High-level error types

use pswake_types::LoginErrorKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] pswake_core::Error),

    #[error("Transport error: {0}")]
    Transport(pswake_transport::Error),

    #[error("Type error: {0}")]
    Types(#[from] pswake_types::Error),

    /// Discovery deadline passed with no matching device
    #[error("No matching device found")]
    NotFound,

    /// Wake requested for a device that is not in standby
    #[error("Device is already awake")]
    AlreadyAwake,

    #[error("Device did not wake within {0:?}")]
    DidNotWakeInTime(std::time::Duration),

    #[error("Device not connected")]
    NotConnected,

    #[error("Session is not logged in")]
    NotLoggedIn,

    #[error("Login failed: {kind} (code {code})")]
    LoginFailed { kind: LoginErrorKind, code: i32 },

    /// TCP listener not up yet; retryable
    #[error("Connection refused by {0}")]
    ConnectionRefused(String),

    #[error("{command} failed with status {status}")]
    CommandFailed { command: &'static str, status: i32 },

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Unknown key name: {0}")]
    InvalidKeyName(String),

    #[error("No keys to send")]
    NoKeys,

    #[error("Cannot perform that action on an inactive keyboard")]
    KeyboardInactive,

    /// Control signal: credentials must be acquired before waking
    #[error("Credentials are needed; run the registration flow first")]
    NeedCredentials,

    #[error("No stored credentials at {0}")]
    CredentialsNotFound(String),

    #[error("Credentials format error: {0}")]
    Credentials(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<pswake_transport::Error> for Error {
    fn from(e: pswake_transport::Error) -> Self {
        match e {
            pswake_transport::Error::ConnectionRefused(addr) => Self::ConnectionRefused(addr),
            pswake_transport::Error::NotConnected => Self::NotConnected,
            pswake_transport::Error::Core(core) => Self::Core(core),
            other => Self::Transport(other),
        }
    }
}

impl Error {
    /// Check if retrying the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionRefused(_)
                | Self::Timeout(_)
                | Self::Transport(pswake_transport::Error::ConnectionTimeout)
                | Self::LoginFailed {
                    kind: LoginErrorKind::Busy | LoginErrorKind::Timeout,
                    ..
                }
        )
    }

    /// Check if the caller can make progress by supplying more input
    pub fn needs_input(&self) -> bool {
        match self {
            Self::NeedCredentials | Self::CredentialsNotFound(_) => true,
            Self::LoginFailed { kind, .. } => kind.needs_input(),
            _ => false,
        }
    }

    /// Check if the operation cannot proceed without outside change
    pub fn is_terminal(&self) -> bool {
        !self.is_retryable() && !self.needs_input()
    }

    pub(crate) fn login_failed(kind: LoginErrorKind, code: i32) -> Self {
        Self::LoginFailed { kind, code }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_are_flattened() {
        let refused: Error = pswake_transport::Error::ConnectionRefused("1.2.3.4:997".into()).into();
        assert!(matches!(refused, Error::ConnectionRefused(_)));
        assert!(refused.is_retryable());

        let closed: Error = pswake_transport::Error::NotConnected.into();
        assert!(matches!(closed, Error::NotConnected));
        assert!(closed.is_terminal());

        let crypto: Error =
            pswake_transport::Error::Core(pswake_core::Error::CryptoNotInitialized).into();
        assert!(matches!(
            crypto,
            Error::Core(pswake_core::Error::CryptoNotInitialized)
        ));
    }

    #[test]
    fn test_pin_needed_is_not_terminal() {
        let err = Error::login_failed(LoginErrorKind::PinNeeded, 20);
        assert!(err.needs_input());
        assert!(!err.is_terminal());

        let err = Error::login_failed(LoginErrorKind::Other(11), 11);
        assert!(err.is_terminal());
    }

    #[test]
    fn test_need_credentials_is_a_signal() {
        assert!(Error::NeedCredentials.needs_input());
        assert!(!Error::NeedCredentials.is_retryable());
    }
}
