//! Login outcomes

use std::fmt;

/// Why a login attempt did not succeed
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LoginErrorKind {
    /// Device wants a registration PIN (code 20)
    PinNeeded,

    /// Account has a passcode set (code 22)
    PasscodeNeeded,

    /// Passcode did not match (code 24)
    PasscodeMismatch,

    /// Login manager is busy (code 30)
    Busy,

    /// No result arrived before retries ran out
    Timeout,

    /// Any other non-zero result code
    Other(i32),
}

impl LoginErrorKind {
    pub fn from_code(code: i32) -> Self {
        match code {
            20 => Self::PinNeeded,
            22 => Self::PasscodeNeeded,
            24 => Self::PasscodeMismatch,
            30 => Self::Busy,
            other => Self::Other(other),
        }
    }

    /// More input from the user could turn this into a success
    pub fn needs_input(&self) -> bool {
        matches!(self, Self::PinNeeded | Self::PasscodeNeeded | Self::PasscodeMismatch)
    }
}

impl fmt::Display for LoginErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PinNeeded => f.write_str("PIN_IS_NEEDED"),
            Self::PasscodeNeeded => f.write_str("PASSCODE_IS_NEEDED"),
            Self::PasscodeMismatch => f.write_str("PASSCODE_IS_UNMATCHED"),
            Self::Busy => f.write_str("LOGIN_MGR_BUSY"),
            Self::Timeout => f.write_str("Timeout"),
            Self::Other(_) => f.write_str("LOGIN_FAILED"),
        }
    }
}

/// Result of one login attempt
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LoginResult {
    pub result_code: i32,
    pub error: Option<LoginErrorKind>,
}

impl LoginResult {
    /// Result code synthesized when every attempt timed out
    pub const TIMEOUT_CODE: i32 = -1;

    pub fn from_code(result_code: i32) -> Self {
        let error = (result_code != 0).then(|| LoginErrorKind::from_code(result_code));
        Self { result_code, error }
    }

    pub fn timeout() -> Self {
        Self {
            result_code: Self::TIMEOUT_CODE,
            error: Some(LoginErrorKind::Timeout),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl fmt::Display for LoginResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.error {
            None => f.write_str("OK"),
            Some(kind) => write!(f, "{} ({})", kind, self.result_code),
        }
    }
}
