//! Typed message bodies
//!
//! [`ClientMessage`] covers everything this side sends, [`ServerMessage`]
//! everything the device sends. Both convert to and from [`Packet`];
//! decoding is direction-specific because some type tags are shared.

use bytes::{BufMut, Bytes, BytesMut};
use pswake_types::RemoteKey;
use std::fmt;

use crate::{
    PROTOCOL_VERSION,
    constants::{LOGIN_MAGIC, lengths, login, widths},
    error::{Error, Result},
    field::{put_padded_str, put_utf16, read_i32, read_padded_str, read_utf16, utf16_len},
    packet::Packet,
    packet_type::PacketType,
};

/// Login packet fields
#[derive(Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub pass_code: String,
    pub account_id: String,
    pub app_label: String,
    pub os_version: String,
    pub model: String,
    pub pin_code: String,
}

impl LoginRequest {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            pass_code: String::new(),
            account_id: account_id.into(),
            app_label: login::APP_LABEL.to_string(),
            os_version: login::OS_VERSION.to_string(),
            model: login::MODEL_NAME.to_string(),
            pin_code: String::new(),
        }
    }

    pub fn with_pin_code(mut self, pin_code: impl Into<String>) -> Self {
        self.pin_code = pin_code.into();
        self
    }

    pub fn with_pass_code(mut self, pass_code: impl Into<String>) -> Self {
        self.pass_code = pass_code.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("account_id", &"<redacted>")
            .field("model", &self.model)
            .field("has_pin_code", &!self.pin_code.is_empty())
            .field("has_pass_code", &!self.pass_code.is_empty())
            .finish()
    }
}

/// Keyboard text update sent to the device
///
/// The pre-edit and edit ranges are written exactly as given; their
/// meaning on the device side is not documented.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OskChange {
    pub pre_edit_index: i32,
    pub pre_edit_length: i32,
    pub caret_index: i32,
    pub edit_index: i32,
    pub edit_length: i32,
    pub text: String,
}

impl OskChange {
    /// Replace the keyboard text, caret at `caret` or after the last unit
    pub fn new(text: impl Into<String>, caret: Option<usize>) -> Self {
        let text = text.into();
        let caret_index = caret.unwrap_or_else(|| utf16_len(&text)) as i32;
        Self {
            caret_index,
            text,
            ..Default::default()
        }
    }
}

/// Keyboard command, in either direction
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum OskCommand {
    Return = 0,
    Close = 1,
}

impl OskCommand {
    /// Any id other than 0 closes the keyboard
    pub fn from_id(id: i32) -> Self {
        if id == 0 { Self::Return } else { Self::Close }
    }

    pub fn id(&self) -> i32 {
        *self as i32
    }
}

impl fmt::Display for OskCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Return => f.write_str("return"),
            Self::Close => f.write_str("close"),
        }
    }
}

/// Answer to an OSK start request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OskStart {
    pub status: i32,
    pub osk_type: i32,
    pub max_length: Option<i32>,
    pub initial_text: Option<String>,
}

/// Edit block of a keyboard change notification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OskEdit {
    pub edit_index: i32,
    pub edit_length: i32,
    pub caret_index: i32,
    pub text: String,
}

/// Keyboard text changed on the device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OskStringChanged {
    pub pre_edit_index: i32,
    pub pre_edit_length: i32,
    pub edit: Option<OskEdit>,
}

/// Messages sent to the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    ClientHello,
    Handshake { wrapped_key: Bytes, seed: Bytes },
    Login(LoginRequest),
    Status(i32),
    BootRequest { title_id: String },
    RemoteControl { key: RemoteKey, hold_ms: u32 },
    StandbyRequest,
    OskStart,
    OskChangeString(OskChange),
    OskControl(OskCommand),
    Bye,
    Logout,
}

impl ClientMessage {
    /// Build a handshake, checking both sizes the device enforces
    pub fn handshake(wrapped_key: &[u8], seed: &[u8]) -> Result<Self> {
        if wrapped_key.len() != widths::WRAPPED_KEY {
            return Err(Error::InvalidKeySize {
                expected: widths::WRAPPED_KEY,
                actual: wrapped_key.len(),
            });
        }
        if seed.len() != widths::SEED {
            return Err(Error::InvalidSeedSize(seed.len()));
        }

        Ok(Self::Handshake {
            wrapped_key: Bytes::copy_from_slice(wrapped_key),
            seed: Bytes::copy_from_slice(seed),
        })
    }

    pub fn kind(&self) -> PacketType {
        match self {
            Self::ClientHello => PacketType::Hello,
            Self::Handshake { .. } => PacketType::Handshake,
            Self::Login(_) => PacketType::Login,
            Self::Status(_) => PacketType::Status,
            Self::BootRequest { .. } => PacketType::BootRequest,
            Self::RemoteControl { .. } => PacketType::RemoteControl,
            Self::StandbyRequest => PacketType::StandbyRequest,
            Self::OskStart => PacketType::OskStart,
            Self::OskChangeString(_) => PacketType::OskChangeString,
            Self::OskControl(_) => PacketType::OskControl,
            Self::Bye => PacketType::Bye,
            Self::Logout => PacketType::Logout,
        }
    }

    /// Check if this message is sent before the cipher exists
    pub fn is_plaintext(&self) -> bool {
        matches!(self, Self::ClientHello | Self::Handshake { .. })
    }

    pub fn encode(&self) -> Packet {
        let mut body = BytesMut::new();

        match self {
            Self::ClientHello => {
                body.put_i32_le(PROTOCOL_VERSION);
                body.put_i32_le(0);
                body.put_bytes(0, lengths::CLIENT_HELLO - 16);
            }
            Self::Handshake { wrapped_key, seed } => {
                body.put_slice(wrapped_key);
                body.put_slice(seed);
            }
            Self::Login(request) => {
                put_padded_str(&mut body, &request.pass_code, widths::PASS_CODE);
                body.put_i32_le(LOGIN_MAGIC);
                put_padded_str(&mut body, &request.account_id, widths::ACCOUNT_ID);
                put_padded_str(&mut body, &request.app_label, widths::APP_LABEL);
                put_padded_str(&mut body, &request.os_version, widths::OS_VERSION);
                put_padded_str(&mut body, &request.model, widths::MODEL);
                put_padded_str(&mut body, &request.pin_code, widths::PIN_CODE);
            }
            Self::Status(status) => body.put_i32_le(*status),
            Self::BootRequest { title_id } => {
                put_padded_str(&mut body, title_id, widths::TITLE_ID);
            }
            Self::RemoteControl { key, hold_ms } => {
                body.put_i32_le(key.code() as i32);
                body.put_i32_le(*hold_ms as i32);
            }
            Self::OskChangeString(change) => {
                body.put_i32_le(change.pre_edit_index);
                body.put_i32_le(change.pre_edit_length);
                body.put_i32_le(change.caret_index);
                body.put_i32_le(change.edit_index);
                body.put_i32_le(change.edit_length);
                put_utf16(&mut body, &change.text);
            }
            Self::OskControl(command) => body.put_i32_le(command.id()),
            Self::StandbyRequest | Self::OskStart | Self::Bye | Self::Logout => {}
        }

        Packet::with_payload(self.kind(), body.freeze())
    }

    /// Decode a packet received from a client
    pub fn decode(packet: &Packet) -> Result<Self> {
        let body = packet.payload.as_ref();

        let message = match packet.kind {
            PacketType::Hello => {
                expect_len(packet, lengths::CLIENT_HELLO)?;
                Self::ClientHello
            }
            PacketType::Handshake => {
                expect_len(packet, lengths::HANDSHAKE)?;
                Self::handshake(
                    &body[..widths::WRAPPED_KEY],
                    &body[widths::WRAPPED_KEY..],
                )?
            }
            PacketType::Login => {
                expect_len(packet, lengths::LOGIN)?;
                let mut offset = 0;
                let mut next = |width: usize| {
                    let value = read_padded_str(body, offset, width);
                    offset += width;
                    value
                };
                let pass_code = next(widths::PASS_CODE)?;
                let _magic = next(4)?;
                Self::Login(LoginRequest {
                    pass_code,
                    account_id: next(widths::ACCOUNT_ID)?,
                    app_label: next(widths::APP_LABEL)?,
                    os_version: next(widths::OS_VERSION)?,
                    model: next(widths::MODEL)?,
                    pin_code: next(widths::PIN_CODE)?,
                })
            }
            PacketType::Status => Self::Status(read_i32(body, 0)?),
            PacketType::BootRequest => Self::BootRequest {
                title_id: read_padded_str(body, 0, widths::TITLE_ID)?,
            },
            PacketType::RemoteControl => Self::RemoteControl {
                key: RemoteKey::try_from(read_i32(body, 0)? as u32)?,
                hold_ms: read_i32(body, 4)?.max(0) as u32,
            },
            PacketType::StandbyRequest => Self::StandbyRequest,
            PacketType::OskStart => Self::OskStart,
            PacketType::OskChangeString => Self::OskChangeString(OskChange {
                pre_edit_index: read_i32(body, 0)?,
                pre_edit_length: read_i32(body, 4)?,
                caret_index: read_i32(body, 8)?,
                edit_index: read_i32(body, 12)?,
                edit_length: read_i32(body, 16)?,
                text: read_utf16(body, 20),
            }),
            PacketType::OskControl => Self::OskControl(OskCommand::from_id(read_i32(body, 0)?)),
            PacketType::Bye => Self::Bye,
            PacketType::Logout => Self::Logout,
            other => {
                return Err(Error::MalformedPacket(format!(
                    "{} is not a client message",
                    other
                )));
            }
        };

        Ok(message)
    }
}

/// Messages received from the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    ServerHello { status: i32, seed: [u8; 16] },
    Invalid,
    LoginResult { code: i32 },
    BootResult { status: i32 },
    OskStartResult(OskStart),
    OskStringChanged(OskStringChanged),
    OskCommand(OskCommand),
    ServerStatus { status: i32 },
    StandbyResult { status: i32 },
    LogoutResult { status: i32 },
    /// Type this implementation does not interpret
    Unknown { kind: PacketType, payload: Bytes },
}

/// Body offset of the seed in the server hello
const SEED_OFFSET: usize = 12;

/// Body length past which OSK packets carry their extended block
const OSK_EXTENDED_BODY: usize = 28;

impl ServerMessage {
    pub fn kind(&self) -> PacketType {
        match self {
            Self::ServerHello { .. } => PacketType::Hello,
            Self::Invalid => PacketType::Invalid,
            Self::LoginResult { .. } => PacketType::LoginResult,
            Self::BootResult { .. } => PacketType::BootResult,
            Self::OskStartResult(_) => PacketType::OskStartResult,
            Self::OskStringChanged(_) => PacketType::OskChangeString,
            Self::OskCommand(_) => PacketType::OskControl,
            Self::ServerStatus { .. } => PacketType::ServerStatus,
            Self::StandbyResult { .. } => PacketType::StandbyResult,
            Self::LogoutResult { .. } => PacketType::LogoutResult,
            Self::Unknown { kind, .. } => *kind,
        }
    }

    /// Decode a packet received from the device
    pub fn decode(packet: &Packet) -> Result<Self> {
        let body = packet.payload.as_ref();

        let message = match packet.kind {
            PacketType::Hello => {
                expect_len(packet, lengths::SERVER_HELLO)?;
                let mut seed = [0u8; 16];
                seed.copy_from_slice(&body[SEED_OFFSET..SEED_OFFSET + widths::SEED]);
                Self::ServerHello {
                    status: read_i32(body, 4)?,
                    seed,
                }
            }
            PacketType::Invalid => Self::Invalid,
            PacketType::LoginResult => Self::LoginResult {
                code: read_i32(body, 0)?,
            },
            PacketType::BootResult => Self::BootResult {
                status: read_i32(body, 0)?,
            },
            PacketType::OskStartResult => {
                let mut start = OskStart {
                    status: read_i32(body, 0)?,
                    osk_type: read_i32(body, 4)?,
                    ..Default::default()
                };
                if body.len() > OSK_EXTENDED_BODY {
                    start.max_length = Some(read_i32(body, 24)?);
                    start.initial_text = Some(read_utf16(body, 28));
                }
                Self::OskStartResult(start)
            }
            PacketType::OskChangeString => {
                let mut changed = OskStringChanged {
                    pre_edit_index: read_i32(body, 0)?,
                    pre_edit_length: read_i32(body, 4)?,
                    edit: None,
                };
                if body.len() > OSK_EXTENDED_BODY {
                    changed.edit = Some(OskEdit {
                        edit_index: read_i32(body, 24)?,
                        edit_length: read_i32(body, 28)?,
                        caret_index: read_i32(body, 32)?,
                        text: read_utf16(body, 36),
                    });
                }
                Self::OskStringChanged(changed)
            }
            PacketType::OskControl => Self::OskCommand(OskCommand::from_id(read_i32(body, 0)?)),
            PacketType::ServerStatus => Self::ServerStatus {
                status: read_i32(body, 0)?,
            },
            PacketType::StandbyResult => Self::StandbyResult {
                status: read_i32(body, 0)?,
            },
            PacketType::LogoutResult => Self::LogoutResult {
                status: read_i32(body, 0)?,
            },
            kind => Self::Unknown {
                kind,
                payload: packet.payload.clone(),
            },
        };

        Ok(message)
    }

    /// Encode as the device would
    pub fn encode(&self) -> Packet {
        let mut body = BytesMut::new();

        match self {
            Self::ServerHello { status, seed } => {
                body.put_i32_le(PROTOCOL_VERSION);
                body.put_i32_le(*status);
                body.put_i32_le(0);
                body.put_slice(seed);
            }
            Self::Invalid => {}
            Self::LoginResult { code } => body.put_i32_le(*code),
            Self::BootResult { status }
            | Self::ServerStatus { status }
            | Self::StandbyResult { status }
            | Self::LogoutResult { status } => body.put_i32_le(*status),
            Self::OskStartResult(start) => {
                body.put_i32_le(start.status);
                body.put_i32_le(start.osk_type);
                if let Some(max_length) = start.max_length {
                    body.put_bytes(0, 16);
                    body.put_i32_le(max_length);
                    put_utf16(&mut body, start.initial_text.as_deref().unwrap_or_default());
                    pad_past_extended(&mut body);
                }
            }
            Self::OskStringChanged(changed) => {
                body.put_i32_le(changed.pre_edit_index);
                body.put_i32_le(changed.pre_edit_length);
                if let Some(edit) = &changed.edit {
                    body.put_bytes(0, 16);
                    body.put_i32_le(edit.edit_index);
                    body.put_i32_le(edit.edit_length);
                    body.put_i32_le(edit.caret_index);
                    put_utf16(&mut body, &edit.text);
                }
            }
            Self::OskCommand(command) => body.put_i32_le(command.id()),
            Self::Unknown { payload, .. } => body.put_slice(payload),
        }

        Packet::with_payload(self.kind(), body.freeze())
    }
}

/// Keep an extended OSK body longer than the threshold even with no text
fn pad_past_extended(body: &mut BytesMut) {
    if body.len() <= OSK_EXTENDED_BODY {
        body.put_bytes(0, OSK_EXTENDED_BODY + 2 - body.len());
    }
}

fn expect_len(packet: &Packet, expected: usize) -> Result<()> {
    if packet.len() < expected {
        return Err(Error::MalformedPacket(format!(
            "{} needs {} bytes, got {}",
            packet.kind,
            expected,
            packet.len()
        )));
    }
    Ok(())
}
