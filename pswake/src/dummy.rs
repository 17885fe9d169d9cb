//! Standby impersonator used to capture wake credentials
//!
//! The second-screen app only registers with consoles it discovers, so
//! capturing credentials means pretending to be one: answer searches as
//! a standby console and wait for the app to wake it.

use std::net::SocketAddr;

use parking_lot::RwLock;
use pswake_core::{DEFAULT_PORT, DdpKind, DdpMessage, constants::STATUS_STANDBY};
use pswake_transport::DdpSocket;
use pswake_types::Credentials;
use tracing::{debug, info};

use crate::error::Result;

/// Fake console answering discovery requests
#[derive(Debug)]
pub struct DummyDevice {
    socket: DdpSocket,
    status_line: RwLock<String>,
    host_id: String,
    host_name: String,
    session_port: u16,
}

impl DummyDevice {
    pub const DEFAULT_HOST_ID: &'static str = "1234567890AB";
    pub const DEFAULT_HOST_NAME: &'static str = "PS4-Waker";

    /// Bind and start out in standby
    ///
    /// The app only searches port 987, which usually needs elevated
    /// privileges to bind.
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = DdpSocket::bind(addr).await?;

        Ok(Self {
            socket,
            status_line: RwLock::new(STATUS_STANDBY.to_string()),
            host_id: Self::DEFAULT_HOST_ID.to_string(),
            host_name: Self::DEFAULT_HOST_NAME.to_string(),
            session_port: DEFAULT_PORT,
        })
    }

    pub fn with_identity(mut self, host_id: impl Into<String>, host_name: impl Into<String>) -> Self {
        self.host_id = host_id.into();
        self.host_name = host_name.into();
        self
    }

    /// Session port to advertise
    pub fn with_session_port(mut self, port: u16) -> Self {
        self.session_port = port;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Status line used in answers from now on, e.g. `200 Ok`
    pub fn set_status(&self, status_line: impl Into<String>) {
        *self.status_line.write() = status_line.into();
    }

    pub fn set_standby(&self) {
        self.set_status(STATUS_STANDBY);
    }

    /// Receive the next request, answering it first if it is a search
    pub async fn next_request(&self) -> Result<(DdpMessage, SocketAddr)> {
        let (request, from) = self.socket.recv().await?;

        if request.kind == DdpKind::Search {
            let status_line = self.status_line.read().clone();
            let response = DdpMessage::device_response(
                &status_line,
                &self.host_id,
                &self.host_name,
                self.session_port,
            );
            self.socket.send(&response, from).await?;
            debug!("Answered search from {} with {}", from, status_line);
        }

        Ok((request, from))
    }

    /// Serve requests until a WAKEUP with full credentials arrives
    pub async fn wait_for_wakeup(&self) -> Result<Credentials> {
        loop {
            let (request, from) = self.next_request().await?;

            if request.kind != DdpKind::Wakeup {
                continue;
            }
            match request.credentials() {
                Some(credentials) => {
                    info!("Captured credentials from {}", from);
                    return Ok(credentials);
                }
                None => debug!("Ignoring incomplete WAKEUP from {}", from),
            }
        }
    }
}
