//! Wake a console and log in
//!
//! Runs the registration flow first if no credentials are stored:
//! start this, then pick "PS4-Waker" in the second-screen app.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use pswake::{Error, FileCredentialStore, WakeConfig, WakeOutcome, Waker};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> pswake::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let store = Arc::new(FileCredentialStore::in_home_dir());
    let mut config = WakeConfig::default().with_keep_socket(true);
    if let Ok(pass_code) = std::env::var("PASS_CODE") {
        config = config.with_pass_code(pass_code);
    }

    let waker = Waker::new(store, config);

    let outcome = match waker.wake(None).await {
        Err(Error::NeedCredentials) => {
            let bind = SocketAddr::from((Ipv4Addr::UNSPECIFIED, pswake_core::DDP_PORT));
            waker.request_credentials(bind).await?;
            waker.wake(None).await?
        }
        other => other?,
    };

    match outcome {
        WakeOutcome::Session(session) => {
            println!("Logged in: {:?}", session);
            session.close().await?;
        }
        WakeOutcome::Awake(device) => println!("Awake: {}", device),
    }

    Ok(())
}
