//! Heartbeat loop
//!
//! Every tick snapshots the announcement state, encodes it and sends it
//! through the broadcast socket. Consecutive send failures are counted; the
//! loop gives up with [`Error::FailureCeiling`] once the ceiling is reached.
//! There is no backoff, so the ceiling is a fixed wall-clock budget of
//! `interval * ceiling`.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::config::HeartbeatConfig;
use crate::error::{Error, Result};
use crate::network::BroadcastSender;
use crate::shutdown::ShutdownListener;
use crate::status::SharedState;

/// Consecutive send failure tracking
#[derive(Debug, Clone)]
pub struct FailureCounter {
    consecutive: u32,
    ceiling: Option<u32>,
}

impl FailureCounter {
    /// `None` never escalates
    pub fn new(ceiling: Option<u32>) -> Self {
        Self {
            consecutive: 0,
            ceiling,
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    /// Count a failure. Returns true once the ceiling is reached.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive = self.consecutive.saturating_add(1);
        self.is_exhausted()
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.ceiling, Some(ceiling) if self.consecutive >= ceiling)
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn ceiling(&self) -> Option<u32> {
        self.ceiling
    }
}

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Sent(usize),
    /// Send failed; carries the consecutive failure count
    Failed(u32),
    /// Encoding failed, nothing was sent
    Skipped,
}

/// Counters shared with whoever wants to observe the loop
#[derive(Debug, Default)]
pub struct HeartbeatStats {
    sent: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    consecutive_failures: AtomicU32,
}

/// Point-in-time copy of [`HeartbeatStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatStatsSnapshot {
    pub sent: u64,
    pub failed: u64,
    pub skipped: u64,
    pub consecutive_failures: u32,
}

impl HeartbeatStats {
    pub fn snapshot(&self) -> HeartbeatStatsSnapshot {
        HeartbeatStatsSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
        }
    }
}

pub struct Heartbeat {
    state: SharedState,
    sender: Arc<dyn BroadcastSender>,
    interval: Duration,
    max_datagram_size: usize,
    failures: FailureCounter,
    stats: Arc<HeartbeatStats>,
}

impl Heartbeat {
    pub fn new(state: SharedState, sender: Arc<dyn BroadcastSender>, config: &HeartbeatConfig) -> Self {
        Self {
            state,
            sender,
            interval: config.interval(),
            max_datagram_size: config.max_datagram_size,
            failures: FailureCounter::new(config.ceiling()),
            stats: Arc::new(HeartbeatStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<HeartbeatStats> {
        self.stats.clone()
    }

    /// Run one announcement cycle
    pub fn tick(&mut self) -> Result<TickOutcome> {
        let announcement = self.state.snapshot();

        let payload = match announcement.encode_bounded(self.max_datagram_size) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("Skipping heartbeat, announcement could not be encoded: {}", e);
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                return Ok(TickOutcome::Skipped);
            }
        };

        match self.sender.send(&payload) {
            Ok(bytes) => {
                if self.failures.consecutive() > 0 {
                    tracing::info!(
                        after = self.failures.consecutive(),
                        "Heartbeat send recovered"
                    );
                }
                self.failures.record_success();
                self.stats.sent.fetch_add(1, Ordering::Relaxed);
                self.stats.consecutive_failures.store(0, Ordering::Relaxed);
                tracing::debug!(
                    status = %announcement.status,
                    bytes,
                    destination = %self.sender.destination(),
                    "Heartbeat sent"
                );
                Ok(TickOutcome::Sent(bytes))
            }
            Err(e) => {
                let exhausted = self.failures.record_failure();
                let consecutive = self.failures.consecutive();
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .consecutive_failures
                    .store(consecutive, Ordering::Relaxed);

                if exhausted {
                    tracing::error!(
                        failures = consecutive,
                        destination = %self.sender.destination(),
                        "Heartbeat failure ceiling reached: {}",
                        e
                    );
                    return Err(Error::FailureCeiling {
                        failures: consecutive,
                    });
                }

                tracing::warn!(
                    failures = consecutive,
                    ceiling = ?self.failures.ceiling(),
                    "Heartbeat send failed: {}",
                    e
                );
                Ok(TickOutcome::Failed(consecutive))
            }
        }
    }

    /// Tick on a fixed interval until shutdown or the failure ceiling
    pub async fn run(mut self, mut shutdown: ShutdownListener) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            ceiling = ?self.failures.ceiling(),
            destination = %self.sender.destination(),
            "Heartbeat started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => {
                    tracing::info!("Heartbeat stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    self.tick()?;
                }
            }
        }
    }
}
