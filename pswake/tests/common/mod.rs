//! Localhost stand-in for a console's session port

#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use pswake::SessionConfig;
use pswake_core::{CipherState, ClientMessage, ServerMessage};
use pswake_transport::{FrameReader, FrameWriter, tcp::split};
use tokio::net::TcpListener;
use tokio::time::timeout;

pub const SEED: [u8; 16] = *b"0123456789abcdef";

/// How long a test waits for any single packet
pub const PACKET_WAIT: Duration = Duration::from_secs(5);

pub fn localhost() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

pub fn local_udp() -> SocketAddr {
    SocketAddr::new(localhost(), 0)
}

/// Session settings pointed at `port` without wake hints
pub fn session_config(port: u16) -> SessionConfig {
    SessionConfig::new("4815162342", localhost())
        .with_port(port)
        .with_wake_hints(false)
        .with_auto_login(false)
}

pub struct FakeConsole {
    listener: TcpListener,
}

impl FakeConsole {
    pub async fn bind() -> Self {
        Self {
            listener: TcpListener::bind((localhost(), 0)).await.unwrap(),
        }
    }

    pub fn port(&self) -> u16 {
        self.listener.local_addr().unwrap().port()
    }

    pub async fn accept(&self) -> ConsoleConnection {
        let (stream, _) = timeout(PACKET_WAIT, self.listener.accept())
            .await
            .expect("no client connected")
            .unwrap();
        let (reader, writer) = split(stream).unwrap();
        ConsoleConnection { reader, writer }
    }

    /// Accept and run the handshake
    pub async fn accept_handshaken(&self) -> ConsoleConnection {
        let mut connection = self.accept().await;
        connection.handshake().await;
        connection
    }
}

pub struct ConsoleConnection {
    reader: FrameReader,
    writer: FrameWriter,
}

impl ConsoleConnection {
    /// Answer the client hello and install the session cipher
    pub async fn handshake(&mut self) {
        assert_eq!(self.recv_plain().await, ClientMessage::ClientHello);

        let hello = ServerMessage::ServerHello { status: 0, seed: SEED };
        self.writer.send_plain(&hello.encode()).await.unwrap();

        match self.recv_plain().await {
            ClientMessage::Handshake { wrapped_key, seed } => {
                assert_eq!(wrapped_key.len(), 256);
                assert_eq!(seed.as_ref(), &SEED);
            }
            other => panic!("expected handshake, got {:?}", other),
        }

        let (encryptor, decryptor) = CipherState::new(&SEED).unwrap().into_parts();
        self.reader.set_decryptor(decryptor);
        self.writer.set_encryptor(encryptor);
    }

    /// Send a server hello with a failing status
    pub async fn reject_hello(&mut self, status: i32) {
        assert_eq!(self.recv_plain().await, ClientMessage::ClientHello);
        let hello = ServerMessage::ServerHello { status, seed: SEED };
        self.writer.send_plain(&hello.encode()).await.unwrap();
    }

    async fn recv_plain(&mut self) -> ClientMessage {
        self.recv().await
    }

    pub async fn recv(&mut self) -> ClientMessage {
        let packet = timeout(PACKET_WAIT, self.reader.read_packet())
            .await
            .expect("no packet from client")
            .unwrap();
        ClientMessage::decode(&packet).unwrap()
    }

    /// Next packet, or `None` once the client hung up
    pub async fn try_recv(&mut self) -> Option<ClientMessage> {
        let packet = timeout(PACKET_WAIT, self.reader.read_packet())
            .await
            .expect("client neither sent nor closed")
            .ok()?;
        Some(ClientMessage::decode(&packet).unwrap())
    }

    pub async fn send(&mut self, message: ServerMessage) {
        self.writer.send_sealed(&message.encode()).await.unwrap();
    }

    /// Receive the login and answer it with `code`
    pub async fn answer_login(&mut self, code: i32) -> pswake_core::LoginRequest {
        let request = match self.recv().await {
            ClientMessage::Login(request) => request,
            other => panic!("expected login, got {:?}", other),
        };
        self.send(ServerMessage::LoginResult { code }).await;
        if code == 0 {
            assert_eq!(self.recv().await, ClientMessage::Status(0));
        }
        request
    }

    pub async fn hang_up(mut self) {
        self.writer.shutdown().await.unwrap();
    }
}
