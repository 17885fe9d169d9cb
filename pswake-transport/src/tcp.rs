//! TCP session transport
//!
//! A connected stream is split into a [`FrameReader`] and a
//! [`FrameWriter`] so one task can block on inbound packets while others
//! send. Each half owns its direction of the session cipher.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use pswake_core::{
    ClientMessage, Decryptor, Encryptor, HEADER_SIZE, MAX_PACKET_SIZE, Packet,
    crypto::{BLOCK_SIZE, padded_len},
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::*;

/// TCP transport for the session port
pub struct TcpTransport {
    addr: String,
    port: u16,
    socket_addr: Option<SocketAddr>,
    connect_timeout: Duration,
}

impl TcpTransport {
    /// Create new TCP transport
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
            socket_addr: None,
            connect_timeout: Duration::from_secs(5),
        }
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Resolve address to SocketAddr
    async fn resolve_addr(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.socket_addr {
            return Ok(addr);
        }

        let addr_str = format!("{}:{}", self.addr, self.port);

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host(&addr_str)
            .await
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", addr_str, e)))?
            .collect();

        let addr = addrs
            .first()
            .ok_or_else(|| Error::InvalidAddress(format!("No addresses found for {}", addr_str)))?;

        self.socket_addr = Some(*addr);
        Ok(*addr)
    }

    /// Open the stream and split it
    ///
    /// # Errors
    ///
    /// `ConnectionRefused` is reported separately from other I/O errors
    /// so callers can retry while the device brings its listener up.
    pub async fn connect(&mut self) -> Result<(FrameReader, FrameWriter)> {
        let addr = self.resolve_addr().await?;

        debug!("Connecting to {}...", addr);

        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::ConnectionTimeout)?
            .map_err(|e| match e.kind() {
                io::ErrorKind::ConnectionRefused => Error::ConnectionRefused(addr.to_string()),
                _ => Error::Io(e),
            })?;

        debug!("Connected to {}", addr);

        split(stream)
    }

    pub fn remote_addr(&self) -> String {
        self.socket_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| format!("{}:{}", self.addr, self.port))
    }
}

/// Split a connected stream into framed halves, both without a cipher
pub fn split(stream: TcpStream) -> Result<(FrameReader, FrameWriter)> {
    // Disable Nagle's algorithm for low latency
    stream.set_nodelay(true)?;

    let peer = stream.peer_addr()?;
    let (read, write) = stream.into_split();

    Ok((
        FrameReader {
            half: read,
            decryptor: None,
            peer,
        },
        FrameWriter {
            half: Some(write),
            encryptor: None,
            peer,
        },
    ))
}

fn map_eof(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::ConnectionClosed
    } else {
        Error::Io(e)
    }
}

fn check_length(declared: usize) -> Result<()> {
    if declared > MAX_PACKET_SIZE {
        return Err(Error::FrameTooLarge(declared));
    }
    Ok(())
}

/// Inbound half of a session stream
pub struct FrameReader {
    half: OwnedReadHalf,
    decryptor: Option<Decryptor>,
    peer: SocketAddr,
}

impl FrameReader {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Decrypt every following frame
    pub fn set_decryptor(&mut self, decryptor: Decryptor) {
        self.decryptor = Some(decryptor);
    }

    pub fn is_encrypted(&self) -> bool {
        self.decryptor.is_some()
    }

    /// Read one complete packet
    ///
    /// Returns `ConnectionClosed` when the peer closes the stream.
    pub async fn read_packet(&mut self) -> Result<Packet> {
        let packet = match self.decryptor.as_mut() {
            None => {
                let mut header = [0u8; HEADER_SIZE];
                self.half.read_exact(&mut header).await.map_err(map_eof)?;

                let declared = Packet::peek_length(&header)?;
                check_length(declared)?;

                let mut frame = BytesMut::zeroed(declared);
                frame[..HEADER_SIZE].copy_from_slice(&header);
                self.half
                    .read_exact(&mut frame[HEADER_SIZE..])
                    .await
                    .map_err(map_eof)?;

                Packet::decode(&frame)?
            }
            Some(decryptor) => {
                let mut first = [0u8; BLOCK_SIZE];
                self.half.read_exact(&mut first).await.map_err(map_eof)?;
                decryptor.decrypt_blocks(&mut first)?;

                let declared = Packet::peek_length(&first)?;
                check_length(declared)?;

                let mut frame = BytesMut::zeroed(padded_len(declared));
                frame[..BLOCK_SIZE].copy_from_slice(&first);
                self.half
                    .read_exact(&mut frame[BLOCK_SIZE..])
                    .await
                    .map_err(map_eof)?;
                decryptor.decrypt_blocks(&mut frame[BLOCK_SIZE..])?;

                frame.truncate(declared);
                Packet::decode(&frame)?
            }
        };

        trace!(peer = %self.peer, "<< {:?}", packet);
        Ok(packet)
    }
}

/// Outbound half of a session stream
pub struct FrameWriter {
    half: Option<OwnedWriteHalf>,
    encryptor: Option<Encryptor>,
    peer: SocketAddr,
}

impl FrameWriter {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Encrypt every following sealed send
    pub fn set_encryptor(&mut self, encryptor: Encryptor) {
        self.encryptor = Some(encryptor);
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryptor.is_some()
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        let half = self.half.as_mut().ok_or(Error::NotConnected)?;

        trace!("Sending {} bytes: {:02X?}", frame.len(), &frame[..frame.len().min(16)]);

        half.write_all(frame).await?;
        half.flush().await?;
        Ok(())
    }

    /// Send without encryption
    pub async fn send_plain(&mut self, packet: &Packet) -> Result<()> {
        trace!(peer = %self.peer, ">> {:?}", packet);
        self.write_frame(&packet.encode()).await
    }

    /// Send through the session cipher
    ///
    /// # Errors
    ///
    /// Returns `CryptoNotInitialized` before the handshake installed an
    /// encryptor; nothing is written in that case.
    pub async fn send_sealed(&mut self, packet: &Packet) -> Result<()> {
        let encryptor = self
            .encryptor
            .as_mut()
            .ok_or(pswake_core::Error::CryptoNotInitialized)?;

        trace!(peer = %self.peer, ">> {:?}", packet);
        let sealed = encryptor.seal(packet);
        self.write_frame(&sealed).await
    }

    /// Send a client message, sealed unless it belongs to the handshake
    pub async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        let packet = message.encode();
        if message.is_plaintext() {
            self.send_plain(&packet).await
        } else {
            self.send_sealed(&packet).await
        }
    }

    /// Close the write side; later sends fail with `NotConnected`
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(mut half) = self.half.take() {
            debug!("Disconnecting from {}...", self.peer);

            // Graceful shutdown
            let _ = half.shutdown().await;
        }
        self.encryptor = None;
        Ok(())
    }
}

impl Drop for FrameWriter {
    fn drop(&mut self) {
        if self.half.is_some() {
            warn!(peer = %self.peer, "Session stream dropped while still connected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use pswake_core::{CipherState, PacketType, ServerMessage};
    use tokio::net::TcpListener;

    async fn pair() -> ((FrameReader, FrameWriter), (FrameReader, FrameWriter)) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut transport = TcpTransport::new("127.0.0.1", port);
        let (client, accepted) = tokio::join!(transport.connect(), listener.accept());

        (client.unwrap(), split(accepted.unwrap().0).unwrap())
    }

    #[tokio::test]
    async fn test_plain_exchange() {
        let ((_, mut client_tx), (mut device_rx, _)) = pair().await;

        client_tx.send(&ClientMessage::ClientHello).await.unwrap();
        let packet = device_rx.read_packet().await.unwrap();

        assert_eq!(packet.kind, PacketType::Hello);
        assert_eq!(packet.len(), 28);
    }

    #[tokio::test]
    async fn test_sealed_exchange_both_directions() {
        let ((mut client_rx, mut client_tx), (mut device_rx, mut device_tx)) = pair().await;
        let seed = [3u8; 16];

        let (enc, dec) = CipherState::new(&seed).unwrap().into_parts();
        client_tx.set_encryptor(enc);
        client_rx.set_decryptor(dec);
        let (enc, dec) = CipherState::new(&seed).unwrap().into_parts();
        device_tx.set_encryptor(enc);
        device_rx.set_decryptor(dec);

        let sent = [
            ClientMessage::Status(0),
            ClientMessage::BootRequest {
                title_id: "CUSA00001".into(),
            },
            ClientMessage::StandbyRequest,
        ];
        for message in &sent {
            client_tx.send(message).await.unwrap();
        }
        for message in &sent {
            let packet = device_rx.read_packet().await.unwrap();
            assert_eq!(&ClientMessage::decode(&packet).unwrap(), message);
        }

        let reply = ServerMessage::StandbyResult { status: 0 };
        device_tx.send_sealed(&reply.encode()).await.unwrap();
        let packet = client_rx.read_packet().await.unwrap();
        assert_eq!(ServerMessage::decode(&packet).unwrap(), reply);
    }

    #[tokio::test]
    async fn test_sealed_send_without_cipher_fails() {
        let ((_, mut client_tx), _) = pair().await;

        let result = client_tx.send(&ClientMessage::StandbyRequest).await;
        assert!(matches!(
            result,
            Err(Error::Core(pswake_core::Error::CryptoNotInitialized))
        ));
    }

    #[tokio::test]
    async fn test_send_after_shutdown_fails() {
        let ((_, mut client_tx), _) = pair().await;
        client_tx.shutdown().await.unwrap();

        let result = client_tx.send(&ClientMessage::ClientHello).await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_peer_close_reports_closed() {
        let ((mut client_rx, _client_tx), (device_rx, mut device_tx)) = pair().await;
        device_tx.shutdown().await.unwrap();
        drop(device_rx);

        let result = client_rx.read_packet().await;
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = TcpTransport::new("127.0.0.1", port).connect().await;
        assert!(matches!(result, Err(Error::ConnectionRefused(_))));
    }

    #[tokio::test]
    async fn test_tcp_transport_invalid_address() {
        let mut transport = TcpTransport::new("invalid..address", 997)
            .with_connect_timeout(Duration::from_millis(100));

        let result = transport.connect().await;
        assert!(result.is_err());
    }
}
