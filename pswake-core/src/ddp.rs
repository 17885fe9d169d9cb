//! Device discovery protocol (DDP) messages
//!
//! DDP datagrams are newline-delimited text with an HTTP-like first
//! line:
//!
//! ```text
//! SRCH * HTTP/1.1                      HTTP/1.1 620 Server Standby
//! device-discovery-protocol-version:…  host-id:1234567890AB
//!                                      host-request-port:997
//!                                      device-discovery-protocol-version:…
//! ```
//!
//! Requests carry a type token (`SRCH`, `WAKEUP`, `LAUNCH`); responses
//! carry a status line. Every datagram ends with the protocol version row.

use pswake_types::{Credentials, DeviceStatus, StatusCode};
use std::fmt;
use std::net::IpAddr;

use crate::{
    DEFAULT_PORT,
    constants::{DDP_VERSION, keys},
    error::{Error, Result},
};

const HTTP_PREFIX: &str = "HTTP/1.1";

/// First-line kind of a DDP datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DdpKind {
    Search,
    Wakeup,
    Launch,
    /// Device response with its status line, e.g. `200 Ok`
    Device { status_line: String },
    /// Request type this implementation does not handle
    Other(String),
}

impl DdpKind {
    fn request_token(&self) -> Option<&str> {
        match self {
            Self::Search => Some("SRCH"),
            Self::Wakeup => Some("WAKEUP"),
            Self::Launch => Some("LAUNCH"),
            Self::Other(token) => Some(token),
            Self::Device { .. } => None,
        }
    }

    fn from_token(token: &str) -> Self {
        match token {
            "SRCH" => Self::Search,
            "WAKEUP" => Self::Wakeup,
            "LAUNCH" => Self::Launch,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for DdpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device { status_line } => write!(f, "{} {}", HTTP_PREFIX, status_line),
            other => write!(f, "{} * {}", other.request_token().unwrap_or_default(), HTTP_PREFIX),
        }
    }
}

/// One DDP datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DdpMessage {
    pub kind: DdpKind,

    /// Rows in the order they appear, version row excluded on encode
    pub fields: Vec<(String, String)>,
}

impl DdpMessage {
    pub fn new(kind: DdpKind) -> Self {
        Self {
            kind,
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    /// Search request
    pub fn search() -> Self {
        Self::new(DdpKind::Search)
    }

    /// Wake request carrying full credentials
    pub fn wakeup(credentials: &Credentials) -> Self {
        credentials
            .fields()
            .into_iter()
            .fold(Self::new(DdpKind::Wakeup), |msg, (key, value)| {
                msg.with_field(key, value)
            })
    }

    /// Wake hint sent ahead of a session connect
    pub fn wakeup_hint(user_credential: &str) -> Self {
        Self::new(DdpKind::Wakeup).with_field(Credentials::USER_CREDENTIAL_KEY, user_credential)
    }

    /// Launch hint sent ahead of a session connect
    pub fn launch(user_credential: &str) -> Self {
        Self::new(DdpKind::Launch).with_field(Credentials::USER_CREDENTIAL_KEY, user_credential)
    }

    /// Device response as a console would send it
    pub fn device_response(
        status_line: &str,
        host_id: &str,
        host_name: &str,
        request_port: u16,
    ) -> Self {
        Self::new(DdpKind::Device {
            status_line: status_line.to_string(),
        })
        .with_field(keys::HOST_ID, host_id)
        .with_field(keys::HOST_TYPE, "PS4")
        .with_field(keys::HOST_NAME, host_name)
        .with_field(keys::HOST_REQUEST_PORT, request_port.to_string())
    }

    /// First value for `key`
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_device(&self) -> bool {
        matches!(self.kind, DdpKind::Device { .. })
    }

    /// Parse a datagram
    ///
    /// Rows split on the first `:`; rows with an empty value are dropped.
    pub fn parse(datagram: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(datagram)
            .map_err(|e| Error::Ddp(format!("datagram is not UTF-8: {}", e)))?;

        let mut lines = text.split('\n').map(|line| line.trim_end_matches('\r'));
        let first = lines
            .next()
            .filter(|line| !line.is_empty())
            .ok_or_else(|| Error::Ddp("empty datagram".into()))?;

        let kind = if let Some(rest) = first.strip_prefix(HTTP_PREFIX) {
            DdpKind::Device {
                status_line: rest.trim_start().to_string(),
            }
        } else {
            let token = first.split(' ').next().unwrap_or(first);
            DdpKind::from_token(token)
        };

        let fields = lines
            .filter_map(|line| line.split_once(':'))
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();

        Ok(Self { kind, fields })
    }

    /// Encode to datagram bytes, version row last
    pub fn encode(&self) -> Vec<u8> {
        let mut text = format!("{}\n", self.kind);
        for (key, value) in self.fields.iter().filter(|(k, _)| k != keys::PROTOCOL_VERSION) {
            text.push_str(key);
            text.push(':');
            text.push_str(value);
            text.push('\n');
        }
        text.push_str(keys::PROTOCOL_VERSION);
        text.push(':');
        text.push_str(DDP_VERSION);
        text.push('\n');
        text.into_bytes()
    }

    /// Credentials carried by a WAKEUP request, if complete
    pub fn credentials(&self) -> Option<Credentials> {
        Some(Credentials::new(
            self.field(Credentials::CLIENT_TYPE_KEY)?,
            self.field(Credentials::AUTH_TYPE_KEY)?,
            self.field(Credentials::USER_CREDENTIAL_KEY)?,
        ))
    }

    /// Convert a device response into a status snapshot
    pub fn to_device_status(&self, address: IpAddr) -> Result<DeviceStatus> {
        let DdpKind::Device { status_line } = &self.kind else {
            return Err(Error::Ddp(format!("{} is not a device response", self.kind)));
        };

        let parts: Vec<&str> = status_line.split(' ').collect();
        let code = parts[0]
            .parse::<u16>()
            .map_err(|_| Error::Ddp(format!("bad status line: {}", status_line)))?;
        let status = if parts.len() == 2 {
            parts[1]
        } else {
            parts.get(2).copied().unwrap_or_default()
        };

        let port = match self.field(keys::HOST_REQUEST_PORT) {
            Some(port) => port
                .trim()
                .parse()
                .map_err(|_| Error::Ddp(format!("bad host-request-port: {}", port)))?,
            None => DEFAULT_PORT,
        };

        let owned = |key: &str| self.field(key).map(str::to_string);

        Ok(DeviceStatus {
            status_code: StatusCode::from(code),
            status_line: status_line.clone(),
            status: status.to_string(),
            address,
            port,
            host_id: owned(keys::HOST_ID).unwrap_or_default(),
            host_name: owned(keys::HOST_NAME).unwrap_or_default(),
            host_type: owned(keys::HOST_TYPE),
            protocol_version: owned(keys::PROTOCOL_VERSION).unwrap_or_default(),
            system_version: owned(keys::SYSTEM_VERSION),
            running_title_id: owned(keys::RUNNING_APP_TITLE_ID),
            running_title_name: owned(keys::RUNNING_APP_NAME),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{STATUS_AWAKE, STATUS_STANDBY};
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;

    const LOCAL: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20));

    #[test]
    fn test_encode_search() {
        let encoded = DdpMessage::search().encode();
        assert_eq!(
            String::from_utf8(encoded).unwrap(),
            "SRCH * HTTP/1.1\ndevice-discovery-protocol-version:00020020\n"
        );
    }

    #[test]
    fn test_wakeup_carries_credentials_in_order() {
        let creds = Credentials::new("a", "C", "12345");
        let text = String::from_utf8(DdpMessage::wakeup(&creds).encode()).unwrap();

        assert_eq!(
            text,
            "WAKEUP * HTTP/1.1\n\
             client-type:a\n\
             auth-type:C\n\
             user-credential:12345\n\
             device-discovery-protocol-version:00020020\n"
        );
    }

    #[test]
    fn test_parse_standby_response() {
        let datagram = b"HTTP/1.1 620 Server Standby\r\n\
            host-id:1234567890AB\r\n\
            host-type:PS4\r\n\
            host-name:Living Room\r\n\
            host-request-port:997\r\n\
            device-discovery-protocol-version:00020020\r\n";

        let message = DdpMessage::parse(datagram).unwrap();
        let status = message.to_device_status(LOCAL).unwrap();

        assert_eq!(status.status_code, StatusCode::Standby);
        assert_eq!(status.status_line, STATUS_STANDBY);
        assert_eq!(status.status, "Standby");
        assert_eq!(status.host_id, "1234567890AB");
        assert_eq!(status.host_name, "Living Room");
        assert_eq!(status.port, 997);
        assert_eq!(status.protocol_version, "00020020");
        assert_eq!(status.address, LOCAL);
    }

    #[test]
    fn test_parse_awake_response_two_part_status() {
        let datagram = b"HTTP/1.1 200 Ok\n\
            host-id:ABC\n\
            host-request-port:1997\n\
            running-app-titleid:CUSA00001\n\
            running-app-name:\n";

        let status = DdpMessage::parse(datagram)
            .unwrap()
            .to_device_status(LOCAL)
            .unwrap();

        assert!(status.is_awake());
        assert_eq!(status.status_line, STATUS_AWAKE);
        assert_eq!(status.status, "Ok");
        assert_eq!(status.port, 1997);
        assert_eq!(status.running_title_id.as_deref(), Some("CUSA00001"));
        assert_eq!(status.running_title_name, None);
    }

    #[test]
    fn test_parse_splits_on_first_colon() {
        let message = DdpMessage::parse(b"LAUNCH * HTTP/1.1\nuser-credential:a:b\n").unwrap();
        assert_eq!(message.kind, DdpKind::Launch);
        assert_eq!(message.field("user-credential"), Some("a:b"));
    }

    #[test]
    fn test_parse_request_recovers_credentials() {
        let creds = Credentials::new("a", "C", "12345");
        let message = DdpMessage::parse(&DdpMessage::wakeup(&creds).encode()).unwrap();

        assert_eq!(message.kind, DdpKind::Wakeup);
        assert_eq!(message.credentials(), Some(creds));
        assert_eq!(DdpMessage::search().credentials(), None);
    }

    #[test]
    fn test_request_is_not_a_device() {
        let message = DdpMessage::search();
        assert!(!message.is_device());
        assert!(matches!(message.to_device_status(LOCAL), Err(Error::Ddp(_))));
    }

    #[test]
    fn test_empty_datagram_rejected() {
        assert!(DdpMessage::parse(b"").is_err());
        assert!(DdpMessage::parse(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_device_response_round_trip() {
        let response = DdpMessage::device_response(STATUS_STANDBY, "ID", "Den", 997);
        let parsed = DdpMessage::parse(&response.encode()).unwrap();
        let status = parsed.to_device_status(LOCAL).unwrap();

        assert!(status.is_standby());
        assert_eq!(status.host_type.as_deref(), Some("PS4"));
    }
}
