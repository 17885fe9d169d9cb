//! Send a key sequence, e.g. `cargo run --example remote -- ps right enter:500`

use std::sync::Arc;

use pswake::{Device, DeviceConfig, FileCredentialStore};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> pswake::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut keys: Vec<String> = std::env::args().skip(1).collect();
    if keys.is_empty() {
        keys = vec!["ps".into()];
    }
    let names: Vec<&str> = keys.iter().map(String::as_str).collect();

    let mut config = DeviceConfig::default();
    if let Some(address) = std::env::var("DEVICE_IP").ok().and_then(|ip| ip.parse().ok()) {
        config = config.with_address(address);
    }

    let device = Device::new(Arc::new(FileCredentialStore::in_home_dir()), config);

    device.send_key_names(&names).await?;
    println!("Sent {}", names.join(" "));

    device.close().await?;
    Ok(())
}
