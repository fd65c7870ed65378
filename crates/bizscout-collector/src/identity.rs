//! Request pacing and outbound identity rotation.
//!
//! One [`IdentityController`] is shared by every worker of a run. Pacing
//! reserves a send slot under a single lock so concurrent callers are spaced
//! out relative to each other, then sleeps outside the lock.

use std::sync::Mutex;
use std::time::Duration;

use rand::Rng;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;

/// Delay range applied once the run has issued more than `above_requests` requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayBand {
    pub above_requests: u64,
    pub min: Duration,
    pub max: Duration,
}

/// Stepped delay schedule plus an absolute floor between consecutive requests.
#[derive(Debug, Clone)]
pub struct PacingPolicy {
    /// Bands in any order; the highest matching `above_requests` wins.
    pub bands: Vec<DelayBand>,
    pub min_interval: Duration,
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self {
            bands: vec![
                DelayBand {
                    above_requests: 0,
                    min: Duration::from_millis(100),
                    max: Duration::from_millis(500),
                },
                DelayBand {
                    above_requests: 10,
                    min: Duration::from_millis(500),
                    max: Duration::from_millis(1000),
                },
                DelayBand {
                    above_requests: 20,
                    min: Duration::from_millis(1000),
                    max: Duration::from_millis(2000),
                },
            ],
            min_interval: Duration::ZERO,
        }
    }
}

impl PacingPolicy {
    /// A policy that never waits. Used by tests and offline drivers.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            bands: Vec::new(),
            min_interval: Duration::ZERO,
        }
    }

    /// Returns the band that applies to the `request_count`-th request.
    #[must_use]
    pub fn band_for(&self, request_count: u64) -> Option<&DelayBand> {
        self.bands
            .iter()
            .filter(|b| request_count > b.above_requests || b.above_requests == 0)
            .max_by_key(|b| b.above_requests)
    }

    fn sample_gap(&self, request_count: u64) -> Duration {
        let sampled = self.band_for(request_count).map_or(Duration::ZERO, |band| {
            let lo = u64::try_from(band.min.as_millis()).unwrap_or(u64::MAX);
            let hi = u64::try_from(band.max.as_millis()).unwrap_or(u64::MAX);
            if hi <= lo {
                band.min
            } else {
                Duration::from_millis(rand::rng().random_range(lo..=hi))
            }
        });
        sampled.max(self.min_interval)
    }
}

/// Outbound identity markers cycled through during a run.
#[derive(Debug, Clone, Default)]
pub struct IdentityPool {
    pub user_agents: Vec<String>,
    pub proxies: Vec<String>,
    /// Control endpoint of a local anonymity network; when set, rotation
    /// also requests a fresh circuit.
    pub circuit_control: Option<String>,
}

impl IdentityPool {
    fn is_empty(&self) -> bool {
        self.user_agents.is_empty() && self.proxies.is_empty() && self.circuit_control.is_none()
    }
}

/// Snapshot of the identity workers should present on their next request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
    pub request_count: u64,
    pub last_request: Option<Instant>,
}

/// Result of [`IdentityController::rotate_identity`].
#[derive(Debug, Clone)]
pub struct Rotation {
    pub identity: Identity,
    /// `false` when the pool was empty and nothing changed.
    pub changed: bool,
    /// Address of the circuit control endpoint to signal, if configured.
    pub new_circuit: Option<String>,
}

#[derive(Debug)]
struct State {
    ua_index: usize,
    proxy_index: usize,
    request_count: u64,
    last_request: Option<Instant>,
}

/// Shared pacing and identity state for one collection run.
#[derive(Debug)]
pub struct IdentityController {
    policy: PacingPolicy,
    pool: IdentityPool,
    state: Mutex<State>,
}

impl IdentityController {
    #[must_use]
    pub fn new(policy: PacingPolicy, pool: IdentityPool) -> Self {
        Self {
            policy,
            pool,
            state: Mutex::new(State {
                ua_index: 0,
                proxy_index: 0,
                request_count: 0,
                last_request: None,
            }),
        }
    }

    /// Waits until this caller may issue its next outbound request.
    ///
    /// The delay grows with the cumulative request count of the run (see
    /// [`PacingPolicy`]) and is measured from the previous reserved slot, so
    /// callers racing each other are serialized rather than bunched.
    pub async fn before_request(&self) {
        let slot = {
            let mut state = self.lock();
            state.request_count += 1;
            let gap = self.policy.sample_gap(state.request_count);
            let now = Instant::now();
            let slot = match state.last_request {
                Some(last) if last + gap > now => last + gap,
                _ => now,
            };
            state.last_request = Some(slot);
            slot
        };
        tokio::time::sleep_until(slot).await;
    }

    /// Returns the identity to use for the next request without changing it.
    #[must_use]
    pub fn current(&self) -> Identity {
        let state = self.lock();
        self.snapshot(&state)
    }

    /// Advances user agent and proxy round-robin. Never blocks on I/O and
    /// never fails; an empty pool yields an unchanged snapshot.
    pub fn rotate_identity(&self) -> Rotation {
        let mut state = self.lock();
        if self.pool.is_empty() {
            return Rotation {
                identity: self.snapshot(&state),
                changed: false,
                new_circuit: None,
            };
        }
        if !self.pool.user_agents.is_empty() {
            state.ua_index = (state.ua_index + 1) % self.pool.user_agents.len();
        }
        if !self.pool.proxies.is_empty() {
            state.proxy_index = (state.proxy_index + 1) % self.pool.proxies.len();
        }
        Rotation {
            identity: self.snapshot(&state),
            changed: true,
            new_circuit: self.pool.circuit_control.clone(),
        }
    }

    /// Number of requests paced so far in this run.
    #[must_use]
    pub fn request_count(&self) -> u64 {
        self.lock().request_count
    }

    fn snapshot(&self, state: &State) -> Identity {
        Identity {
            user_agent: self.pool.user_agents.get(state.ua_index).cloned(),
            proxy: self.pool.proxies.get(state.proxy_index).cloned(),
            request_count: state.request_count,
            last_request: state.last_request,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned lock only means another worker panicked mid-update; the
        // counters are still usable.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Ask a local anonymity-network daemon for a fresh circuit.
///
/// Speaks the control-port protocol: authenticate (empty password / cookie
/// disabled) then `SIGNAL NEWNYM`.
///
/// # Errors
///
/// Returns an I/O error if the control port is unreachable or refuses the
/// signal.
pub async fn request_new_circuit(control_addr: &str) -> std::io::Result<()> {
    let mut stream = tokio::time::timeout(
        Duration::from_secs(5),
        tokio::net::TcpStream::connect(control_addr),
    )
    .await
    .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "control port timeout"))??;

    stream
        .write_all(b"AUTHENTICATE \"\"\r\nSIGNAL NEWNYM\r\n")
        .await?;

    let mut buf = [0u8; 256];
    let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "control port timeout"))??;
    let reply = String::from_utf8_lossy(&buf[..n]);
    if reply.lines().all(|line| line.starts_with("250")) && n > 0 {
        Ok(())
    } else {
        Err(std::io::Error::other(format!(
            "circuit renewal refused: {}",
            reply.trim()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_policy(ms: u64) -> PacingPolicy {
        PacingPolicy {
            bands: vec![DelayBand {
                above_requests: 0,
                min: Duration::from_millis(ms),
                max: Duration::from_millis(ms),
            }],
            min_interval: Duration::ZERO,
        }
    }

    fn pool(uas: &[&str], proxies: &[&str]) -> IdentityPool {
        IdentityPool {
            user_agents: uas.iter().map(|s| (*s).to_owned()).collect(),
            proxies: proxies.iter().map(|s| (*s).to_owned()).collect(),
            circuit_control: None,
        }
    }

    #[test]
    fn band_selection_steps_with_request_count() {
        let policy = PacingPolicy::default();
        assert_eq!(policy.band_for(1).unwrap().above_requests, 0);
        assert_eq!(policy.band_for(10).unwrap().above_requests, 0);
        assert_eq!(policy.band_for(11).unwrap().above_requests, 10);
        assert_eq!(policy.band_for(21).unwrap().above_requests, 20);
    }

    #[test]
    fn sampled_gap_stays_within_band() {
        let policy = PacingPolicy::default();
        for _ in 0..50 {
            let gap = policy.sample_gap(25);
            assert!(gap >= Duration::from_millis(1000) && gap <= Duration::from_millis(2000));
        }
    }

    #[test]
    fn min_interval_is_a_floor() {
        let mut policy = fixed_policy(10);
        policy.min_interval = Duration::from_millis(300);
        assert_eq!(policy.sample_gap(1), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn first_request_is_immediate_and_later_ones_are_spaced() {
        let ctl = IdentityController::new(fixed_policy(200), IdentityPool::default());
        let start = Instant::now();
        ctl.before_request().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        ctl.before_request().await;
        assert_eq!(start.elapsed(), Duration::from_millis(200));
        ctl.before_request().await;
        assert_eq!(start.elapsed(), Duration::from_millis(400));
        assert_eq!(ctl.request_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_time_counts_toward_the_gap() {
        let ctl = IdentityController::new(fixed_policy(200), IdentityPool::default());
        ctl.before_request().await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        let before = Instant::now();
        ctl.before_request().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_are_serialized() {
        let ctl = std::sync::Arc::new(IdentityController::new(
            fixed_policy(100),
            IdentityPool::default(),
        ));
        let start = Instant::now();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ctl = std::sync::Arc::clone(&ctl);
                tokio::spawn(async move { ctl.before_request().await })
            })
            .collect();
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[test]
    fn rotation_cycles_round_robin() {
        let ctl = IdentityController::new(PacingPolicy::disabled(), pool(&["a", "b"], &["p1", "p2", "p3"]));
        assert_eq!(ctl.current().user_agent.as_deref(), Some("a"));
        assert_eq!(ctl.current().proxy.as_deref(), Some("p1"));

        let r = ctl.rotate_identity();
        assert!(r.changed);
        assert_eq!(r.identity.user_agent.as_deref(), Some("b"));
        assert_eq!(r.identity.proxy.as_deref(), Some("p2"));

        let r = ctl.rotate_identity();
        assert_eq!(r.identity.user_agent.as_deref(), Some("a"));
        assert_eq!(r.identity.proxy.as_deref(), Some("p3"));

        let r = ctl.rotate_identity();
        assert_eq!(r.identity.proxy.as_deref(), Some("p1"));
    }

    #[test]
    fn empty_pool_rotation_is_a_no_op() {
        let ctl = IdentityController::new(PacingPolicy::disabled(), IdentityPool::default());
        let r = ctl.rotate_identity();
        assert!(!r.changed);
        assert!(r.identity.user_agent.is_none());
        assert!(r.identity.proxy.is_none());
        assert!(r.new_circuit.is_none());
    }

    #[test]
    fn rotation_requests_circuit_when_configured() {
        let mut p = pool(&[], &[]);
        p.circuit_control = Some("127.0.0.1:9051".to_owned());
        let ctl = IdentityController::new(PacingPolicy::disabled(), p);
        let r = ctl.rotate_identity();
        assert!(r.changed);
        assert_eq!(r.new_circuit.as_deref(), Some("127.0.0.1:9051"));
    }
}
