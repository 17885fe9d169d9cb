//! Packet type tags

use std::fmt;

/// Packet type tags
///
/// Some tags are shared by a request and the device's matching
/// notification (`OskChangeString`, `OskControl`) and by both hello
/// packets; direction decides which message body applies.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PacketType {
    // Handshake
    Hello,
    Handshake,
    Invalid,
    Bye,

    // Login
    Login,
    LoginResult,
    Logout,
    LogoutResult,

    // Heartbeat
    Status,
    ServerStatus,

    // Titles and power
    BootRequest,
    BootResult,
    StandbyRequest,
    StandbyResult,

    // Remote control
    RemoteControl,

    // On-screen keyboard
    OskStart,
    OskStartResult,
    OskChangeString,
    OskControl,

    /// Tag this implementation does not know
    Unknown(i32),
}

impl PacketType {
    pub const HELLO_TAG: i32 = 0x6f636370;

    pub fn raw(&self) -> i32 {
        match self {
            Self::Hello => Self::HELLO_TAG,
            Self::Invalid => 0,
            Self::Bye => 4,
            Self::LoginResult => 7,
            Self::BootRequest => 10,
            Self::BootResult => 11,
            Self::OskStart => 12,
            Self::OskStartResult => 13,
            Self::OskChangeString => 14,
            Self::OskControl => 16,
            Self::ServerStatus => 18,
            Self::Status => 20,
            Self::StandbyRequest => 26,
            Self::StandbyResult => 27,
            Self::RemoteControl => 28,
            Self::Login => 30,
            Self::Handshake => 32,
            Self::Logout => 34,
            Self::LogoutResult => 35,
            Self::Unknown(raw) => *raw,
        }
    }

    /// Get protocol name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hello => "HELLO",
            Self::Handshake => "HANDSHAKE",
            Self::Invalid => "INVALID",
            Self::Bye => "BYE",
            Self::Login => "LOGIN",
            Self::LoginResult => "LOGIN_RESULT",
            Self::Logout => "LOGOUT",
            Self::LogoutResult => "LOGOUT_RESULT",
            Self::Status => "STATUS",
            Self::ServerStatus => "SERVER_STATUS",
            Self::BootRequest => "BOOT_REQUEST",
            Self::BootResult => "BOOT_RESULT",
            Self::StandbyRequest => "STANDBY_REQUEST",
            Self::StandbyResult => "STANDBY_RESULT",
            Self::RemoteControl => "REMOTE_CONTROL",
            Self::OskStart => "OSK_START",
            Self::OskStartResult => "OSK_START_RESULT",
            Self::OskChangeString => "OSK_CHANGE_STRING",
            Self::OskControl => "OSK_CONTROL",
            Self::Unknown(_) => "UNKNOWN",
        }
    }

    /// Check if the device answers this request with a result packet
    pub fn expects_result(&self) -> bool {
        matches!(
            self,
            Self::Login | Self::Logout | Self::BootRequest | Self::StandbyRequest | Self::OskStart
        )
    }
}

impl From<PacketType> for i32 {
    fn from(kind: PacketType) -> i32 {
        kind.raw()
    }
}

impl From<i32> for PacketType {
    fn from(value: i32) -> Self {
        match value {
            Self::HELLO_TAG => Self::Hello,
            0 => Self::Invalid,
            4 => Self::Bye,
            7 => Self::LoginResult,
            10 => Self::BootRequest,
            11 => Self::BootResult,
            12 => Self::OskStart,
            13 => Self::OskStartResult,
            14 => Self::OskChangeString,
            16 => Self::OskControl,
            18 => Self::ServerStatus,
            20 => Self::Status,
            26 => Self::StandbyRequest,
            27 => Self::StandbyResult,
            28 => Self::RemoteControl,
            30 => Self::Login,
            32 => Self::Handshake,
            34 => Self::Logout,
            35 => Self::LogoutResult,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.raw())
    }
}
