//! LAN announcement of a running output.
//!
//! A beacon repeatedly sends `{"Name":..,"Port":..}` as one UDP datagram to
//! a multicast group so receivers can list the outputs on the network.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::TeleportError;

/// The announced payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Port")]
    pub port: u16,
}

impl Announcement {
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            port,
        }
    }
}

/// Name to announce: `identifier` when set, else the host name.
pub fn resolve_name(identifier: &str) -> Result<String, TeleportError> {
    let identifier = identifier.trim();
    if !identifier.is_empty() {
        return Ok(identifier.to_string());
    }

    hostname::get()
        .map_err(|e| TeleportError::Startup(format!("cannot determine host name: {e}")))?
        .into_string()
        .map_err(|_| TeleportError::Startup("host name is not valid UTF-8".into()))
}

/// Periodic sender of one [`Announcement`].
#[derive(Debug)]
pub struct Beacon {
    socket: UdpSocket,
    target: SocketAddr,
    payload: Vec<u8>,
    interval: Duration,
}

impl Beacon {
    pub async fn bind(
        announcement: &Announcement,
        target: SocketAddr,
        interval: Duration,
    ) -> Result<Self, TeleportError> {
        let local: SocketAddr = if target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| TeleportError::Startup(format!("cannot bind discovery socket: {e}")))?;
        if target.is_ipv4() {
            // Stay on the local network segment.
            socket.set_multicast_ttl_v4(1)?;
        }

        Ok(Self {
            socket,
            target,
            payload: serde_json::to_vec(announcement)?,
            interval,
        })
    }

    /// Announce every interval until `cancel` fires.
    ///
    /// Send errors are logged once per failure streak and never end the loop.
    pub async fn run(self, cancel: CancellationToken) {
        info!(target_addr = %self.target, "discovery beacon started");
        let mut ticker = tokio::time::interval(self.interval);
        let mut failing = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.socket.send_to(&self.payload, self.target).await {
                Ok(_) if failing => {
                    debug!("discovery send recovered");
                    failing = false;
                }
                Ok(_) => {}
                Err(e) if !failing => {
                    warn!(target_addr = %self.target, "discovery send failed: {e}");
                    failing = true;
                }
                Err(_) => {}
            }
        }
        debug!("discovery beacon stopped");
    }
}
