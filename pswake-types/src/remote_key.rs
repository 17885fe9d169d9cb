//! Remote-control buttons

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Remote-control button codes
///
/// Values are the op codes sent in a remote-control packet.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RemoteKey {
    Up = 1,
    Down = 2,
    Right = 4,
    Left = 8,
    Enter = 16,
    Back = 32,
    Option = 64,
    Ps = 128,
    KeyOff = 256,
    Cancel = 512,
    OpenRc = 1024,
    CloseRc = 2048,
}

impl RemoteKey {
    pub const ALL: [RemoteKey; 12] = [
        Self::Up,
        Self::Down,
        Self::Right,
        Self::Left,
        Self::Enter,
        Self::Back,
        Self::Option,
        Self::Ps,
        Self::KeyOff,
        Self::Cancel,
        Self::OpenRc,
        Self::CloseRc,
    ];

    pub fn code(&self) -> u32 {
        *self as u32
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::Right => "RIGHT",
            Self::Left => "LEFT",
            Self::Enter => "ENTER",
            Self::Back => "BACK",
            Self::Option => "OPTION",
            Self::Ps => "PS",
            Self::KeyOff => "KEY_OFF",
            Self::Cancel => "CANCEL",
            Self::OpenRc => "OPEN_RC",
            Self::CloseRc => "CLOSE_RC",
        }
    }

    /// Channel control keys, as opposed to buttons a user presses
    pub fn is_channel_control(&self) -> bool {
        matches!(self, Self::OpenRc | Self::CloseRc)
    }
}

impl TryFrom<u32> for RemoteKey {
    type Error = Error;

    fn try_from(code: u32) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|key| key.code() == code)
            .ok_or_else(|| Error::InvalidKeyName(format!("code {}", code)))
    }
}

impl FromStr for RemoteKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|key| key.name() == upper)
            .ok_or_else(|| Error::InvalidKeyName(s.to_string()))
    }
}

impl fmt::Display for RemoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One entry of a key sequence: a button and an optional hold time
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct KeyPress {
    pub key: RemoteKey,
    pub hold: Duration,
}

impl KeyPress {
    pub fn tap(key: RemoteKey) -> Self {
        Self {
            key,
            hold: Duration::ZERO,
        }
    }

    pub fn hold(key: RemoteKey, hold: Duration) -> Self {
        Self { key, hold }
    }

    pub fn is_held(&self) -> bool {
        !self.hold.is_zero()
    }
}

impl From<RemoteKey> for KeyPress {
    fn from(key: RemoteKey) -> Self {
        Self::tap(key)
    }
}

/// Parses `name` or `name:holdMillis`, e.g. `ps:1000`
impl FromStr for KeyPress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            None => Ok(Self::tap(s.parse()?)),
            Some((name, millis)) => {
                let key = name.parse()?;
                let millis: u64 = millis
                    .trim()
                    .parse()
                    .map_err(|_| Error::Parse(format!("invalid hold time in {:?}", s)))?;
                Ok(Self::hold(key, Duration::from_millis(millis)))
            }
        }
    }
}
