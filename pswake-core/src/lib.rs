//! # pswake-core
//!
//! Core protocol implementation for second-screen console control.
//!
//! This crate provides the low-level protocol primitives:
//! - Packet structure and encoding/decoding
//! - Typed client and server message bodies
//! - Session cipher (AES-128-CBC stream) and handshake key wrapping
//! - Device discovery protocol (DDP) text messages
//! - Protocol state tracking and constants

pub mod constants;
pub mod crypto;
pub mod ddp;
pub mod error;
pub mod field;
pub mod message;
pub mod packet;
pub mod packet_type;
pub mod session;

pub use crypto::{CipherState, Decryptor, Encryptor};
pub use ddp::{DdpKind, DdpMessage};
pub use error::{Error, Result};
pub use message::{ClientMessage, LoginRequest, OskChange, OskCommand, OskStart, OskStringChanged, ServerMessage};
pub use packet::Packet;
pub use packet_type::PacketType;
pub use session::{ProtocolState, SessionState};

/// Client protocol version sent in the hello packet
pub const PROTOCOL_VERSION: i32 = 0x20000;

/// Default session (TCP) port
pub const DEFAULT_PORT: u16 = 997;

/// Discovery and wake (UDP) port
pub const DDP_PORT: u16 = 987;

/// Maximum packet size (64KB)
pub const MAX_PACKET_SIZE: usize = 65535;

/// Packet header size
pub const HEADER_SIZE: usize = 8;
