//! Device discovery over UDP
//!
//! A [`Scan`] repeatedly sends `SRCH` requests and yields every device
//! response until its deadline passes or it is closed.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use pswake_core::DdpMessage;
use pswake_transport::DdpSocket;
use pswake_types::DeviceStatus;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep_until};
use tracing::{debug, trace, warn};

use crate::config::DiscoveryConfig;
use crate::error::{Error, Result};

/// Discovery client
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    config: DiscoveryConfig,
}

impl Discovery {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Start scanning toward the configured target
    ///
    /// With no timeout the scan runs until closed or dropped.
    pub async fn scan(&self, timeout: Option<Duration>) -> Result<Scan> {
        self.scan_to(self.config.target, timeout).await
    }

    async fn scan_to(&self, target: SocketAddr, timeout: Option<Duration>) -> Result<Scan> {
        let socket = DdpSocket::bind(self.config.bind_addr).await?;
        let deadline = timeout.map(|t| Instant::now() + t);
        let search_interval = self.config.search_interval;

        let (tx, rx) = mpsc::channel(16);

        debug!("Scanning for devices at {}", target);

        let task = tokio::spawn(async move {
            let search = DdpMessage::search();
            let mut ticker = interval(search_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let expired = async {
                match deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };
            tokio::pin!(expired);

            // Set after a receive error; cleared by the next search
            let mut backing_off = false;

            loop {
                tokio::select! {
                    _ = &mut expired => {
                        trace!("Scan deadline reached");
                        break;
                    }
                    _ = ticker.tick() => {
                        backing_off = false;
                        if let Err(e) = socket.send(&search, target).await {
                            warn!("Failed to send search to {}: {}", target, e);
                        }
                    }
                    received = socket.recv(), if !backing_off => {
                        let (message, from) = match received {
                            Ok(received) => received,
                            Err(e) => {
                                // Often an ICMP rejection of the last search
                                debug!("Discovery receive failed: {}", e);
                                backing_off = true;
                                continue;
                            }
                        };
                        if !message.is_device() {
                            continue;
                        }
                        match message.to_device_status(from.ip()) {
                            Ok(device) => {
                                if tx.send((device, from)).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => debug!("Ignoring response from {}: {}", from, e),
                        }
                    }
                }
            }
        });

        Ok(Scan { rx, task })
    }

    /// First device accepted by `predicate`
    ///
    /// The predicate sees each host once per search; repeated answers
    /// from a host it already rejected are skipped.
    ///
    /// Returns the device with the address its answer came from.
    pub async fn find_first_matching<F>(
        &self,
        predicate: F,
        timeout: Duration,
    ) -> Result<(DeviceStatus, SocketAddr)>
    where
        F: FnMut(&DeviceStatus, SocketAddr) -> bool,
    {
        let scan = self.scan(Some(timeout)).await?;
        first_matching(scan, predicate).await
    }

    /// First device that answers
    pub async fn find_any(&self, timeout: Duration) -> Result<DeviceStatus> {
        let (device, _) = self.find_first_matching(|_, _| true, timeout).await?;
        Ok(device)
    }

    /// Device answering from `address`
    ///
    /// Searches are sent directly to the address rather than broadcast.
    pub async fn find_by_address(&self, address: IpAddr, timeout: Duration) -> Result<DeviceStatus> {
        let target = SocketAddr::new(address, self.config.ddp_port);
        let scan = self.scan_to(target, Some(timeout)).await?;
        let (device, _) = first_matching(scan, |_, from| from.ip() == address).await?;
        Ok(device)
    }
}

async fn first_matching<F>(mut scan: Scan, mut predicate: F) -> Result<(DeviceStatus, SocketAddr)>
where
    F: FnMut(&DeviceStatus, SocketAddr) -> bool,
{
    let mut seen = HashSet::new();

    while let Some((device, from)) = scan.next().await {
        if !seen.insert(device.host_id.clone()) {
            continue;
        }
        if predicate(&device, from) {
            debug!("Found {} at {}", device, from);
            return Ok((device, from));
        }
    }

    Err(Error::NotFound)
}

/// Running discovery scan
#[derive(Debug)]
pub struct Scan {
    rx: mpsc::Receiver<(DeviceStatus, SocketAddr)>,
    task: JoinHandle<()>,
}

impl Scan {
    /// Next response, `None` once the scan has ended
    pub async fn next(&mut self) -> Option<(DeviceStatus, SocketAddr)> {
        self.rx.recv().await
    }

    /// Stop searching
    pub fn close(&mut self) {
        self.task.abort();
        self.rx.close();
    }
}

impl Drop for Scan {
    fn drop(&mut self) {
        self.task.abort();
    }
}
