//! Periodic connectivity probing.
//!
//! The monitor publishes a boolean on a `watch` channel; the orchestrator
//! reads it between batches and pauses dispatch while it is `false`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Answers "is the network reachable right now?".
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_up(&self) -> bool;
}

/// Opens (and immediately drops) a TCP connection to a well-known address,
/// by default the public resolver at `8.8.8.8:53`.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    addr: SocketAddr,
    timeout: Duration,
}

impl TcpProbe {
    #[must_use]
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout }
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([8, 8, 8, 8], 53)),
            timeout: Duration::from_secs(3),
        }
    }
}

#[async_trait]
impl ConnectivityProbe for TcpProbe {
    async fn is_up(&self) -> bool {
        matches!(
            tokio::time::timeout(self.timeout, tokio::net::TcpStream::connect(self.addr)).await,
            Ok(Ok(_))
        )
    }
}

/// Spawns a task that probes every `interval` until `cancel` fires and
/// returns the receiving side of the published state. The initial value is
/// `true`; a run starts optimistic and pauses on the first failed probe.
#[must_use]
pub fn spawn_connectivity_monitor(
    probe: Arc<dyn ConnectivityProbe>,
    interval: Duration,
    cancel: CancellationToken,
) -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(true);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(10)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tx.closed() => break,
                _ = ticker.tick() => {}
            }
            let up = probe.is_up().await;
            let changed = tx.send_if_modified(|current| {
                if *current == up {
                    false
                } else {
                    *current = up;
                    true
                }
            });
            if changed {
                if up {
                    tracing::info!("connectivity restored");
                } else {
                    tracing::warn!("connectivity lost");
                }
            }
        }
        tracing::debug!("connectivity monitor stopped");
    });
    rx
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    struct Switch(AtomicBool);

    #[async_trait]
    impl ConnectivityProbe for Switch {
        async fn is_up(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_publishes_state_changes() {
        let probe = Arc::new(Switch(AtomicBool::new(true)));
        let cancel = CancellationToken::new();
        let mut rx = spawn_connectivity_monitor(probe.clone(), Duration::from_secs(5), cancel.clone());
        assert!(*rx.borrow());

        probe.0.store(false, Ordering::SeqCst);
        rx.changed().await.unwrap();
        assert!(!*rx.borrow_and_update());

        probe.0.store(true, Ordering::SeqCst);
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());

        cancel.cancel();
        assert!(rx.changed().await.is_err());
    }
}
