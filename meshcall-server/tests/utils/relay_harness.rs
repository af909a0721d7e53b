use anyhow::{Context, Result, bail};
use meshcall_core::RoomId;
use meshcall_server::{RelayConfig, RelayService, serve_listener};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

/// Timeout for relay-side state to catch up (ms).
pub const RELAY_TIMEOUT_MS: u64 = 5000;

pub struct TestRelay {
    pub addr: SocketAddr,
    pub service: RelayService,
}

impl TestRelay {
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Wait until exactly `count` identities are bound in `room`.
    pub async fn wait_for_members(&self, room: &str, count: usize) -> Result<()> {
        let room = RoomId::from(room);
        let deadline = tokio::time::Instant::now() + Duration::from_millis(RELAY_TIMEOUT_MS);
        while self.service.peers_in(&room).len() != count {
            if tokio::time::Instant::now() >= deadline {
                bail!(
                    "room {} has {:?}, expected {} members",
                    room,
                    self.service.peers_in(&room),
                    count
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Ok(())
    }
}

/// Start a relay on an ephemeral loopback port.
pub async fn start_relay() -> Result<TestRelay> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("Failed to bind test relay")?;
    let addr = listener.local_addr()?;
    let service = RelayService::new();

    let config = RelayConfig {
        bind: addr,
        ..Default::default()
    };
    let relay_service = service.clone();
    tokio::spawn(async move {
        if let Err(e) = serve_listener(listener, relay_service, &config).await {
            tracing::error!("[TestRelay] stopped: {}", e);
        }
    });

    Ok(TestRelay { addr, service })
}
