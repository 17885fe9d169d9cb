//! Session behavior against a fake console on localhost

mod common;

use std::time::Duration;

use common::{FakeConsole, session_config};
use pretty_assertions::assert_eq;
use pswake::{
    Error, LoginErrorKind, LoginOptions, OnScreenKeyboard, RemoteKey, Session, SessionEvent,
    SessionState,
};
use pswake_core::{ClientMessage, OskCommand, OskStart, ServerMessage};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::timeout;

async fn next_matching(
    events: &mut broadcast::Receiver<SessionEvent>,
    mut wanted: impl FnMut(&SessionEvent) -> bool,
) -> SessionEvent {
    timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.unwrap();
            if wanted(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event never arrived")
}

async fn ready_session(console: &FakeConsole) -> (Session, common::ConsoleConnection) {
    let config = session_config(console.port()).with_auto_login(true);
    let (session, connection) = tokio::join!(Session::connect(config), async {
        let mut connection = console.accept_handshaken().await;
        connection.answer_login(0).await;
        connection
    });

    let session = session.unwrap();
    let result = session.wait_for_login(Duration::from_secs(5)).await.unwrap();
    assert!(result.is_success());
    (session, connection)
}

#[tokio::test]
async fn test_handshake_and_automatic_login() {
    let console = FakeConsole::bind().await;
    let config = session_config(console.port()).with_auto_login(true);

    let (session, request) = tokio::join!(Session::connect(config), async {
        let mut connection = console.accept_handshaken().await;
        let request = connection.answer_login(0).await;
        (connection, request)
    });
    let session = session.unwrap();
    let (_connection, request) = request;

    assert_eq!(request.account_id, "4815162342");
    assert_eq!(request.pin_code, "");
    assert_eq!(request.model, "PS4 Waker");

    session.wait_for_login(Duration::from_secs(5)).await.unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    assert!(session.last_login_result().unwrap().is_success());
}

#[tokio::test]
async fn test_pin_needed_keeps_session_open() {
    let console = FakeConsole::bind().await;
    let session = Session::new(session_config(console.port()));

    let (opened, mut connection) = tokio::join!(session.open(), console.accept_handshaken());
    opened.unwrap();

    let (first, _) = tokio::join!(session.login(LoginOptions::default()), connection.answer_login(20));
    assert!(matches!(
        first,
        Err(Error::LoginFailed {
            kind: LoginErrorKind::PinNeeded,
            code: 20
        })
    ));
    assert!(session.is_connected());
    assert_eq!(session.state(), SessionState::AwaitingLogin);

    let (second, request) = tokio::join!(session.login("1234"), connection.answer_login(0));
    second.unwrap();
    assert_eq!(request.pin_code, "1234");
    assert!(session.is_ready());

    // Exactly one login carried the PIN; the next packet is a command
    session.remote_control(RemoteKey::Enter, 0).await.unwrap();
    assert_eq!(
        connection.recv().await,
        ClientMessage::RemoteControl {
            key: RemoteKey::Enter,
            hold_ms: 0
        }
    );
}

#[tokio::test]
async fn test_login_without_answer_times_out() {
    let console = FakeConsole::bind().await;
    let config = session_config(console.port())
        .with_login_timeout(Duration::from_millis(200))
        .with_login_retries(2, Duration::from_millis(50));
    let session = Session::new(config);

    let (opened, mut connection) = tokio::join!(session.open(), console.accept_handshaken());
    opened.unwrap();
    let mut events = session.subscribe();

    let (result, logins) = tokio::join!(session.login(LoginOptions::default()), async {
        let mut logins = 0;
        for _ in 0..2 {
            if let ClientMessage::Login(_) = connection.recv().await {
                logins += 1;
            }
        }
        logins
    });

    assert_eq!(logins, 2);
    assert!(matches!(
        result,
        Err(Error::LoginFailed {
            kind: LoginErrorKind::Timeout,
            code: -1
        })
    ));
    assert!(matches!(
        next_matching(&mut events, |e| matches!(e, SessionEvent::LoginRetry { .. })).await,
        SessionEvent::LoginRetry { attempt: 1 }
    ));
}

#[tokio::test]
async fn test_heartbeat_is_acknowledged() {
    let console = FakeConsole::bind().await;
    let (session, mut connection) = ready_session(&console).await;
    let mut events = session.subscribe();

    connection.send(ServerMessage::ServerStatus { status: 0 }).await;

    assert_eq!(connection.recv().await, ClientMessage::Status(0));
    assert_eq!(
        next_matching(&mut events, |e| matches!(e, SessionEvent::ServerStatus(_))).await,
        SessionEvent::ServerStatus(0)
    );
}

#[tokio::test]
async fn test_commands_wait_for_results() {
    let console = FakeConsole::bind().await;
    let (session, mut connection) = ready_session(&console).await;

    let (started, _) = tokio::join!(session.start_title("CUSA00001"), async {
        assert_eq!(
            connection.recv().await,
            ClientMessage::BootRequest {
                title_id: "CUSA00001".into()
            }
        );
        connection.send(ServerMessage::BootResult { status: 0 }).await;
    });
    started.unwrap();

    let (standby, _) = tokio::join!(session.request_standby(), async {
        assert_eq!(connection.recv().await, ClientMessage::StandbyRequest);
        connection.send(ServerMessage::StandbyResult { status: 1 }).await;
    });
    assert!(matches!(
        standby,
        Err(Error::CommandFailed {
            command: "standby",
            status: 1
        })
    ));
}

#[tokio::test]
async fn test_logout_returns_to_awaiting_login() {
    let console = FakeConsole::bind().await;
    let (session, mut connection) = ready_session(&console).await;

    let (logged_out, _) = tokio::join!(session.logout(), async {
        assert_eq!(connection.recv().await, ClientMessage::Logout);
        connection.send(ServerMessage::LogoutResult { status: 0 }).await;
    });
    logged_out.unwrap();

    assert_eq!(session.state(), SessionState::AwaitingLogin);
    assert!(matches!(
        session.remote_control(RemoteKey::Up, 0).await,
        Err(Error::NotLoggedIn)
    ));
}

#[tokio::test]
async fn test_keyboard_round_trip() {
    let console = FakeConsole::bind().await;
    let (session, mut connection) = ready_session(&console).await;
    let session = Arc::new(session);

    let (keyboard, _) = tokio::join!(OnScreenKeyboard::open(session.clone()), async {
        assert_eq!(connection.recv().await, ClientMessage::OskStart);
        connection
            .send(ServerMessage::OskStartResult(OskStart {
                status: 0,
                osk_type: 1,
                max_length: Some(32),
                initial_text: Some("ab".into()),
            }))
            .await;
    });
    let keyboard = keyboard.unwrap();
    assert_eq!(keyboard.initial_text(), Some("ab"));

    keyboard.set_text("héllo", None).await.unwrap();
    match connection.recv().await {
        ClientMessage::OskChangeString(change) => {
            assert_eq!(change.text, "héllo");
            assert_eq!(change.caret_index, 5);
        }
        other => panic!("expected text change, got {:?}", other),
    }

    connection.send(ServerMessage::OskCommand(OskCommand::Close)).await;
    timeout(Duration::from_secs(5), async {
        while keyboard.is_active() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert!(matches!(keyboard.submit().await, Err(Error::KeyboardInactive)));
}

#[tokio::test]
async fn test_close_says_bye() {
    let console = FakeConsole::bind().await;
    let (session, mut connection) = ready_session(&console).await;
    let mut events = session.subscribe();

    session.close().await.unwrap();

    assert_eq!(connection.try_recv().await, Some(ClientMessage::Bye));
    assert_eq!(connection.try_recv().await, None);
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(
        next_matching(&mut events, |e| matches!(e, SessionEvent::Disconnected)).await,
        SessionEvent::Disconnected
    );
    assert!(matches!(
        session.remote_control(RemoteKey::Up, 0).await,
        Err(Error::NotConnected)
    ));

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_device_hang_up_disconnects() {
    let console = FakeConsole::bind().await;
    let (session, connection) = ready_session(&console).await;
    let mut events = session.subscribe();

    connection.hang_up().await;

    next_matching(&mut events, |e| matches!(e, SessionEvent::Disconnected)).await;
    assert!(!session.is_connected());
    assert!(matches!(session.start_title("CUSA00001").await, Err(Error::NotConnected)));
}

#[tokio::test]
async fn test_rejected_hello_ends_session() {
    let console = FakeConsole::bind().await;
    let session = Session::new(session_config(console.port()));
    let mut events = session.subscribe();

    let (opened, mut connection) = tokio::join!(session.open(), console.accept());
    opened.unwrap();
    connection.reject_hello(5).await;

    let error = next_matching(&mut events, |e| matches!(e, SessionEvent::Error(_))).await;
    assert!(matches!(error, SessionEvent::Error(message) if message.contains("hello")));
    next_matching(&mut events, |e| matches!(e, SessionEvent::Disconnected)).await;
    assert!(matches!(session.login("1234").await, Err(Error::NotConnected)));
}

#[tokio::test]
async fn test_refused_connects_are_retried() {
    // Reserve a port, then leave it closed for a while
    let port = FakeConsole::bind().await.port();
    let config = session_config(port).with_connect_retries(5, Duration::from_millis(200));

    let console = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(450)).await;
        let listener = tokio::net::TcpListener::bind((common::localhost(), port))
            .await
            .unwrap();
        let (stream, _) = listener.accept().await.unwrap();
        stream
    });

    let session = Session::connect(config).await.unwrap();
    assert!(session.is_connected());
    console.await.unwrap();
}

#[tokio::test]
async fn test_refused_connects_give_up() {
    let port = FakeConsole::bind().await.port();
    let config = session_config(port).with_connect_retries(2, Duration::from_millis(50));

    let result = Session::connect(config).await;

    assert!(matches!(result, Err(Error::ConnectionRefused(_))));
}

#[tokio::test]
async fn test_close_while_connect_is_refused() {
    let port = FakeConsole::bind().await.port();
    let session = Session::new(
        session_config(port).with_connect_retries(20, Duration::from_millis(100)),
    );

    let opening = tokio::spawn({
        let session = session.clone();
        async move { session.open().await }
    });
    tokio::time::sleep(Duration::from_millis(150)).await;
    session.close().await.unwrap();

    // A listener showing up now must not see the abandoned attempt
    let listener = tokio::net::TcpListener::bind((common::localhost(), port))
        .await
        .unwrap();

    let opened = timeout(Duration::from_secs(1), opening).await.unwrap().unwrap();
    assert!(matches!(opened, Err(Error::NotConnected)));
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(
        timeout(Duration::from_millis(500), listener.accept())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_close_during_wake_hint_delay_sends_nothing() {
    let listener = tokio::net::TcpListener::bind((common::localhost(), 0))
        .await
        .unwrap();
    let hints = tokio::net::UdpSocket::bind(common::local_udp()).await.unwrap();

    let mut config = session_config(listener.local_addr().unwrap().port())
        .with_wake_hints(true)
        .with_ddp_port(hints.local_addr().unwrap().port());
    config.wake_hint_delay = Duration::from_secs(2);
    let session = Session::new(config);
    let mut events = session.subscribe();

    let opening = tokio::spawn({
        let session = session.clone();
        async move { session.open().await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    session.close().await.unwrap();

    let opened = timeout(Duration::from_millis(500), opening)
        .await
        .expect("open kept waiting after close")
        .unwrap();
    assert!(matches!(opened, Err(Error::NotConnected)));
    next_matching(&mut events, |e| matches!(e, SessionEvent::Disconnected)).await;
    assert!(
        timeout(Duration::from_millis(500), listener.accept())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_close_before_server_hello() {
    let console = FakeConsole::bind().await;
    let session = Session::new(session_config(console.port()));
    let mut events = session.subscribe();

    let (opened, mut connection) = tokio::join!(session.open(), console.accept());
    opened.unwrap();
    assert_eq!(connection.recv().await, ClientMessage::ClientHello);
    assert_eq!(session.state(), SessionState::AwaitingHello);

    session.close().await.unwrap();

    // Not encrypted yet, so no bye; just the hang-up
    assert_eq!(connection.try_recv().await, None);
    assert_eq!(session.state(), SessionState::Disconnected);
    next_matching(&mut events, |e| matches!(e, SessionEvent::Disconnected)).await;
    assert!(matches!(session.login("1234").await, Err(Error::NotConnected)));
}
