//! UDP transport for discovery and wake datagrams
//!
//! The device listens on port 987 for `SRCH`, `WAKEUP` and `LAUNCH`
//! requests and answers searches from the same port.

use std::net::SocketAddr;

use pswake_core::DdpMessage;
use tokio::net::UdpSocket;
use tracing::{debug, trace};

use crate::error::*;

/// Largest datagram the device sends
const MAX_DATAGRAM: usize = 2048;

/// Broadcast-enabled UDP socket speaking DDP
#[derive(Debug)]
pub struct DdpSocket {
    socket: UdpSocket,
}

impl DdpSocket {
    /// Bind to `addr` with broadcast enabled
    ///
    /// Bind errors propagate immediately.
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        socket.set_broadcast(true)?;

        debug!("DDP socket bound to {}", socket.local_addr()?);

        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Send one datagram
    pub async fn send(&self, message: &DdpMessage, to: SocketAddr) -> Result<()> {
        let data = message.encode();

        trace!(
            "Sending {} bytes via UDP to {}: {:?}",
            data.len(),
            to,
            String::from_utf8_lossy(&data)
        );

        self.socket.send_to(&data, to).await?;
        Ok(())
    }

    /// Receive the next datagram that parses as DDP
    ///
    /// Datagrams that are not DDP text are logged and skipped.
    pub async fn recv(&self) -> Result<(DdpMessage, SocketAddr)> {
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            let (n, from) = self.socket.recv_from(&mut buf).await?;

            trace!(
                "Received {} bytes via UDP from {}: {:?}",
                n,
                from,
                String::from_utf8_lossy(&buf[..n])
            );

            match DdpMessage::parse(&buf[..n]) {
                Ok(message) => return Ok((message, from)),
                Err(e) => debug!("Ignoring datagram from {}: {}", from, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use pswake_core::{DdpKind, constants::STATUS_STANDBY};

    fn local() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn test_search_and_answer() {
        let client = DdpSocket::bind(local()).await.unwrap();
        let device = DdpSocket::bind(local()).await.unwrap();
        let device_addr = device.local_addr().unwrap();

        client.send(&DdpMessage::search(), device_addr).await.unwrap();
        let (request, from) = device.recv().await.unwrap();
        assert_eq!(request.kind, DdpKind::Search);

        let response = DdpMessage::device_response(STATUS_STANDBY, "ID", "Den", 997);
        device.send(&response, from).await.unwrap();

        let (reply, reply_from) = client.recv().await.unwrap();
        assert_eq!(reply_from, device_addr);
        assert!(reply.is_device());
    }

    #[tokio::test]
    async fn test_non_ddp_datagrams_are_skipped() {
        let client = DdpSocket::bind(local()).await.unwrap();
        let device = DdpSocket::bind(local()).await.unwrap();
        let device_addr = device.local_addr().unwrap();

        let raw = UdpSocket::bind(local()).await.unwrap();
        raw.send_to(&[0xff, 0xfe, 0xfd], device_addr).await.unwrap();
        client.send(&DdpMessage::search(), device_addr).await.unwrap();

        let (request, _) = device.recv().await.unwrap();
        assert_eq!(request.kind, DdpKind::Search);
    }

    #[tokio::test]
    async fn test_bind_error_propagates() {
        let first = DdpSocket::bind(local()).await.unwrap();
        let taken = first.local_addr().unwrap();

        assert!(DdpSocket::bind(taken).await.is_err());
    }
}
