//! Error types for pswake-core

/// Result type alias for pswake-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Packet is too short to be valid
    #[error("Packet too short: expected at least {expected} bytes, got {actual} bytes")]
    PacketTooShort {
        expected: usize,
        actual: usize,
    },

    /// Declared length does not match the bytes present
    #[error("Length mismatch: header declares {declared} bytes, buffer has {actual} bytes")]
    LengthMismatch {
        declared: usize,
        actual: usize,
    },

    /// Packet body does not fit its type
    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    /// Encryption requested before the handshake derived a session key
    #[error("Crypto not initialized - handshake has not completed")]
    CryptoNotInitialized,

    /// Hello seed is not 16 bytes
    #[error("Invalid seed size: expected 16 bytes, got {0}")]
    InvalidSeedSize(usize),

    /// Wrapped session key is not the size the device accepts
    #[error("Invalid wrapped key size: expected {expected} bytes, got {actual} bytes")]
    InvalidKeySize {
        expected: usize,
        actual: usize,
    },

    /// Public key could not be parsed
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// RSA encryption failed
    #[error("RSA error: {0}")]
    Rsa(#[from] rsa::Error),

    /// Invalid session state
    #[error("Invalid session state: {0}")]
    InvalidSessionState(String),

    /// Discovery datagram could not be understood
    #[error("Invalid discovery message: {0}")]
    Ddp(String),

    /// Value-level error
    #[error(transparent)]
    Types(#[from] pswake_types::Error),
}

impl Error {
    /// Check if error came from bytes received off the wire
    pub fn is_wire_error(&self) -> bool {
        matches!(
            self,
            Self::PacketTooShort { .. }
                | Self::LengthMismatch { .. }
                | Self::MalformedPacket(_)
                | Self::Ddp(_)
        )
    }
}
