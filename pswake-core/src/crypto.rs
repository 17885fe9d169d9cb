//! Session cipher
//!
//! After the hello exchange both sides run AES-128-CBC with an all-zero
//! key and the 16-byte seed from the server hello as IV. The chain is
//! never reset: each direction keeps one encryptor (or decryptor) whose
//! CBC state carries from one packet into the next.
//!
//! The key itself reaches the device wrapped with the vendor's RSA
//! public key (OAEP, SHA-1) inside the handshake packet.

use aes::Aes128;
use bytes::BytesMut;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, generic_array::GenericArray};
use rsa::{Oaep, RsaPublicKey, pkcs8::DecodePublicKey};
use std::fmt;
use tracing::{debug, trace};

use crate::{
    constants::widths,
    error::{Error, Result},
    packet::Packet,
};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Cipher block size
pub const BLOCK_SIZE: usize = 16;

/// Symmetric session key
pub const SESSION_KEY: [u8; 16] = [0; 16];

/// Stand-in public key for the handshake
///
/// Accepted only by local fakes; real devices need their vendor key
/// passed to [`wrap_session_key`].
pub const DEVICE_PUBLIC_KEY_PEM: &str = include_str!("device_public_key.pem");

/// Round `len` up to the next block boundary
pub fn padded_len(len: usize) -> usize {
    len.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

fn ensure_aligned(buf: &[u8]) -> Result<()> {
    if buf.len() % BLOCK_SIZE != 0 {
        return Err(Error::MalformedPacket(format!(
            "ciphertext length {} is not a multiple of {}",
            buf.len(),
            BLOCK_SIZE
        )));
    }
    Ok(())
}

/// Outbound half of the session cipher
pub struct Encryptor {
    inner: Aes128CbcEnc,
}

impl Encryptor {
    fn new(seed: &[u8; 16]) -> Self {
        Self {
            inner: Aes128CbcEnc::new(&SESSION_KEY.into(), seed.into()),
        }
    }

    /// Encrypt whole blocks in place, advancing the chain
    pub fn encrypt_blocks(&mut self, buf: &mut [u8]) -> Result<()> {
        ensure_aligned(buf)?;
        for chunk in buf.chunks_exact_mut(BLOCK_SIZE) {
            self.inner.encrypt_block_mut(GenericArray::from_mut_slice(chunk));
        }
        Ok(())
    }

    /// Encode, zero-pad and encrypt a packet
    pub fn seal(&mut self, packet: &Packet) -> BytesMut {
        let mut buf = packet.encode();
        buf.resize(padded_len(buf.len()), 0);
        for chunk in buf.chunks_exact_mut(BLOCK_SIZE) {
            self.inner.encrypt_block_mut(GenericArray::from_mut_slice(chunk));
        }
        trace!(kind = %packet.kind, sealed_len = buf.len(), "Sealed packet");
        buf
    }
}

impl fmt::Debug for Encryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encryptor").finish_non_exhaustive()
    }
}

/// Inbound half of the session cipher
pub struct Decryptor {
    inner: Aes128CbcDec,
}

impl Decryptor {
    fn new(seed: &[u8; 16]) -> Self {
        Self {
            inner: Aes128CbcDec::new(&SESSION_KEY.into(), seed.into()),
        }
    }

    /// Decrypt whole blocks in place, advancing the chain
    pub fn decrypt_blocks(&mut self, buf: &mut [u8]) -> Result<()> {
        ensure_aligned(buf)?;
        for chunk in buf.chunks_exact_mut(BLOCK_SIZE) {
            self.inner.decrypt_block_mut(GenericArray::from_mut_slice(chunk));
        }
        Ok(())
    }

    /// Decrypt one complete padded frame and strip the padding
    pub fn open(&mut self, frame: &[u8]) -> Result<Packet> {
        let mut buf = frame.to_vec();
        self.decrypt_blocks(&mut buf)?;

        let declared = Packet::peek_length(&buf)?;
        if declared > buf.len() {
            return Err(Error::LengthMismatch {
                declared,
                actual: buf.len(),
            });
        }
        buf.truncate(declared);
        Packet::decode(&buf)
    }
}

impl fmt::Debug for Decryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decryptor").finish_non_exhaustive()
    }
}

/// Both directions of one connection's cipher
///
/// Owned by exactly one connection; dropped on disconnect.
#[derive(Debug)]
pub struct CipherState {
    encryptor: Encryptor,
    decryptor: Decryptor,
}

impl CipherState {
    /// Derive session keys from the server hello seed
    ///
    /// # Errors
    ///
    /// Returns `InvalidSeedSize` unless `seed` is exactly 16 bytes.
    pub fn new(seed: &[u8]) -> Result<Self> {
        let seed: &[u8; 16] = seed
            .try_into()
            .map_err(|_| Error::InvalidSeedSize(seed.len()))?;

        debug!("Derived session cipher from hello seed");

        Ok(Self {
            encryptor: Encryptor::new(seed),
            decryptor: Decryptor::new(seed),
        })
    }

    pub fn encrypt(&mut self, packet: &Packet) -> BytesMut {
        self.encryptor.seal(packet)
    }

    pub fn decrypt(&mut self, frame: &[u8]) -> Result<Packet> {
        self.decryptor.open(frame)
    }

    /// Split into independent halves for a reader and a writer task
    pub fn into_parts(self) -> (Encryptor, Decryptor) {
        (self.encryptor, self.decryptor)
    }
}

/// Wrap the session key for the handshake packet
///
/// Uses the embedded device key unless `public_key_pem` is given.
///
/// # Errors
///
/// Returns `InvalidPublicKey` if the PEM cannot be parsed and
/// `InvalidKeySize` if the result is not exactly 256 bytes, which the
/// device would reject.
pub fn wrap_session_key(public_key_pem: Option<&str>) -> Result<[u8; widths::WRAPPED_KEY]> {
    let pem = public_key_pem.unwrap_or(DEVICE_PUBLIC_KEY_PEM);
    let key = RsaPublicKey::from_public_key_pem(pem)
        .map_err(|e| Error::InvalidPublicKey(e.to_string()))?;

    let mut rng = rand::thread_rng();
    let wrapped = key.encrypt(&mut rng, Oaep::new::<sha1::Sha1>(), &SESSION_KEY)?;

    wrapped
        .as_slice()
        .try_into()
        .map_err(|_| Error::InvalidKeySize {
            expected: widths::WRAPPED_KEY,
            actual: wrapped.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet_type::PacketType;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const SEED: [u8; 16] = [7; 16];

    fn peers() -> (CipherState, CipherState) {
        (CipherState::new(&SEED).unwrap(), CipherState::new(&SEED).unwrap())
    }

    #[test]
    fn test_padded_len() {
        assert_eq!(padded_len(8), 16);
        assert_eq!(padded_len(16), 16);
        assert_eq!(padded_len(384), 384);
        assert_eq!(padded_len(12), 16);
    }

    #[test]
    fn test_invalid_seed_size() {
        assert!(matches!(
            CipherState::new(&[0; 12]),
            Err(Error::InvalidSeedSize(12))
        ));
    }

    #[test]
    fn test_seal_pads_to_block() {
        let (mut client, _) = peers();
        let sealed = client.encrypt(&Packet::with_payload(PacketType::Status, vec![0; 4]));
        assert_eq!(sealed.len(), 16);
        assert_ne!(&sealed[..4], &[12, 0, 0, 0]);
    }

    #[test]
    fn test_chain_carries_across_packets() {
        let (mut client, mut device) = peers();
        let first = Packet::with_payload(PacketType::Status, vec![0; 4]);
        let second = Packet::new(PacketType::StandbyRequest);

        let sealed_first = client.encrypt(&first);
        let sealed_second = client.encrypt(&second);

        // Same plaintext block encrypts differently once the chain moved
        let mut fresh = CipherState::new(&SEED).unwrap();
        assert_ne!(sealed_second, fresh.encrypt(&second));

        assert_eq!(device.decrypt(&sealed_first).unwrap(), first);
        assert_eq!(device.decrypt(&sealed_second).unwrap(), second);
    }

    #[test]
    fn test_split_halves_interoperate() {
        let (client, device) = peers();
        let (mut encryptor, _) = client.into_parts();
        let (_, mut decryptor) = device.into_parts();

        let packet = Packet::with_payload(PacketType::BootRequest, b"CUSA00001\0\0\0\0\0\0\0".to_vec());
        let sealed = encryptor.seal(&packet);
        assert_eq!(decryptor.open(&sealed).unwrap(), packet);
    }

    #[test]
    fn test_unaligned_ciphertext_rejected() {
        let (_, mut device) = peers();
        assert!(matches!(
            device.decrypt(&[0; 20]),
            Err(Error::MalformedPacket(_))
        ));
    }

    #[test]
    fn test_wrapped_key_is_256_bytes() {
        let wrapped = wrap_session_key(None).unwrap();
        assert_eq!(wrapped.len(), 256);
    }

    #[test]
    fn test_invalid_public_key() {
        assert!(matches!(
            wrap_session_key(Some("not a key")),
            Err(Error::InvalidPublicKey(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_seal_open_round_trip(
            tag in 0i32..64,
            payloads in proptest::collection::vec(
                proptest::collection::vec(any::<u8>(), 0..200),
                1..5,
            ),
        ) {
            let (mut client, mut device) = peers();
            for payload in payloads {
                let packet = Packet::with_payload(PacketType::from(tag), payload);
                let sealed = client.encrypt(&packet);
                prop_assert_eq!(sealed.len() % BLOCK_SIZE, 0);
                prop_assert_eq!(device.decrypt(&sealed).unwrap(), packet);
            }
        }
    }
}
