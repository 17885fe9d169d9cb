//! Device status snapshots reported by discovery responses

use std::fmt;
use std::net::IpAddr;

/// Status code carried in the status line of a discovery response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// `200 Ok`: the device is on
    Awake,

    /// `620 Server Standby`: the device is in rest mode and can be woken
    Standby,

    /// Anything else the firmware may report
    Other(u16),
}

impl StatusCode {
    pub const AWAKE: u16 = 200;
    pub const STANDBY: u16 = 620;

    pub fn code(&self) -> u16 {
        match self {
            Self::Awake => Self::AWAKE,
            Self::Standby => Self::STANDBY,
            Self::Other(code) => *code,
        }
    }
}

impl From<u16> for StatusCode {
    fn from(code: u16) -> Self {
        match code {
            Self::AWAKE => Self::Awake,
            Self::STANDBY => Self::Standby,
            other => Self::Other(other),
        }
    }
}

/// Device status
///
/// An immutable snapshot taken from one discovery response. A fresh
/// snapshot is produced on every discovery round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatus {
    /// Parsed status code
    pub status_code: StatusCode,

    /// Full status line, e.g. `620 Server Standby`
    pub status_line: String,

    /// Short status text, e.g. `Standby` or `Ok`
    pub status: String,

    /// Address the response came from
    pub address: IpAddr,

    /// Session (TCP) port advertised by the device
    pub port: u16,

    /// Stable device identifier
    pub host_id: String,

    /// User-assigned device name
    pub host_name: String,

    /// Hardware family, e.g. `PS4`
    pub host_type: Option<String>,

    /// Discovery protocol version
    pub protocol_version: String,

    /// Firmware version
    pub system_version: Option<String>,

    /// Title currently running, if any
    pub running_title_id: Option<String>,

    /// Display name of the running title
    pub running_title_name: Option<String>,
}

impl DeviceStatus {
    pub fn is_awake(&self) -> bool {
        self.status_code == StatusCode::Awake
    }

    pub fn is_standby(&self) -> bool {
        self.status_code == StatusCode::Standby
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] @ {} ({})",
            self.host_name, self.host_id, self.address, self.status_line
        )
    }
}
