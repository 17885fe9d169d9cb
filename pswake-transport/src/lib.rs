//! Transport layer for the session and discovery protocols
//!
//! Provides the length-framed TCP session stream (with the session
//! cipher applied per direction) and the UDP discovery socket.

pub mod error;
pub mod tcp;
pub mod udp;

pub use error::{Error, Result};
pub use tcp::{FrameReader, FrameWriter, TcpTransport};
pub use udp::DdpSocket;
