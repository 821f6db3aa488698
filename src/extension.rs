//! Host lifecycle
//!
//! [`bootstrap`] runs the one-time startup sequence and returns typed fatal
//! errors. [`Extension`] owns the two background tasks: `start` spawns them
//! on the current runtime and returns, `shutdown` cancels both, and `wait`
//! reports how the heartbeat ended.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::BeaconConfig;
use crate::error::{Error, Result};
use crate::heartbeat::{Heartbeat, HeartbeatStats};
use crate::logs::{receiver_stream, LogEventReceiver, LogWatcher};
use crate::network::{open_broadcast_socket, resolve_target, BroadcastSender, RawBroadcastSocket};
use crate::shutdown::{shutdown_channel, ShutdownTrigger};
use crate::status::{AnnouncementState, SharedState};

/// Resolve the broadcast target and open the socket for it
pub fn bootstrap(config: &BeaconConfig) -> Result<RawBroadcastSocket> {
    let target = resolve_target(&config.discovery)?;
    Ok(open_broadcast_socket(&target)?)
}

/// Announcement state for this process as described by `config`
pub fn initial_state(config: &BeaconConfig) -> SharedState {
    Arc::new(AnnouncementState::new(
        config.announce.version.clone(),
        config.otlp_endpoint(),
        config.logs.capacity,
    ))
}

pub struct Extension {
    state: SharedState,
    watcher: Option<LogWatcher>,
    heartbeat: Option<Heartbeat>,
    events: Option<LogEventReceiver>,
    stats: Arc<HeartbeatStats>,
    trigger: ShutdownTrigger,
    watcher_task: Option<JoinHandle<()>>,
    heartbeat_task: Option<JoinHandle<Result<()>>>,
    /// Outcome of a joined heartbeat not yet returned from `wait`
    heartbeat_result: Option<Result<()>>,
}

impl Extension {
    pub fn new(
        config: &BeaconConfig,
        state: SharedState,
        sender: Arc<dyn BroadcastSender>,
        events: LogEventReceiver,
    ) -> Self {
        let heartbeat = Heartbeat::new(state.clone(), sender, &config.heartbeat);
        let stats = heartbeat.stats();
        let (trigger, _) = shutdown_channel();

        Self {
            watcher: Some(LogWatcher::new(state.clone(), config.logs.readiness_marker.clone())),
            heartbeat: Some(heartbeat),
            events: Some(events),
            state,
            stats,
            trigger,
            watcher_task: None,
            heartbeat_task: None,
            heartbeat_result: None,
        }
    }

    /// Bootstrap from `config` and start immediately
    pub fn launch(config: &BeaconConfig, events: LogEventReceiver) -> Result<Self> {
        config.validate()?;
        let socket = bootstrap(config)?;
        let mut extension = Self::new(config, initial_state(config), Arc::new(socket), events);
        extension.start()?;
        Ok(extension)
    }

    /// Spawn the log watcher and heartbeat. Must be called within a tokio
    /// runtime; a second call is a configuration error.
    pub fn start(&mut self) -> Result<()> {
        let (watcher, heartbeat, events) =
            match (self.watcher.take(), self.heartbeat.take(), self.events.take()) {
                (Some(w), Some(h), Some(e)) => (w, h, e),
                _ => return Err(Error::Config("beacon already started".into())),
            };

        tracing::info!(
            pid = self.state.pid(),
            version = self.state.version(),
            "Starting collector beacon"
        );

        self.watcher_task = Some(tokio::spawn(
            watcher.run(receiver_stream(events), self.trigger.listener()),
        ));
        self.heartbeat_task = Some(tokio::spawn(heartbeat.run(self.trigger.listener())));
        Ok(())
    }

    /// Signal both tasks to stop; a send already in flight completes
    pub fn shutdown(&self) {
        tracing::info!("Shutting down collector beacon");
        self.trigger.trigger();
    }

    /// Wait for the heartbeat to end, then stop the watcher.
    ///
    /// Returns `Err(Error::FailureCeiling)` if the heartbeat gave up. Safe to
    /// race in `select!`: dropping the future leaves the tasks joinable, and a
    /// heartbeat outcome joined before the drop is returned by the next call.
    pub async fn wait(&mut self) -> Result<()> {
        if let Some(task) = self.heartbeat_task.as_mut() {
            let joined = task.await;
            self.heartbeat_task = None;
            self.heartbeat_result = Some(joined.map_err(|e| Error::Task(e.to_string())).and_then(|r| r));
        }

        self.trigger.trigger();
        if let Some(task) = self.watcher_task.as_mut() {
            let joined = task.await;
            self.watcher_task = None;
            if let Err(e) = joined {
                tracing::warn!("Log watcher task ended abnormally: {}", e);
            }
        }
        self.heartbeat_result.take().unwrap_or(Ok(()))
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn stats(&self) -> Arc<HeartbeatStats> {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkError;
    use crate::logs::{log_channel, LogEvent};
    use crate::status::Status;
    use std::net::{Ipv4Addr, SocketAddrV4};
    use std::time::Duration;

    struct NullSender;

    impl BroadcastSender for NullSender {
        fn send(&self, payload: &[u8]) -> std::result::Result<usize, NetworkError> {
            Ok(payload.len())
        }

        fn destination(&self) -> SocketAddrV4 {
            SocketAddrV4::new(Ipv4Addr::BROADCAST, 1)
        }
    }

    struct DeadSender;

    impl BroadcastSender for DeadSender {
        fn send(&self, _payload: &[u8]) -> std::result::Result<usize, NetworkError> {
            Err(NetworkError::Send("network unreachable".into()))
        }

        fn destination(&self) -> SocketAddrV4 {
            SocketAddrV4::new(Ipv4Addr::BROADCAST, 1)
        }
    }

    fn config() -> BeaconConfig {
        let mut config = BeaconConfig::default();
        config.heartbeat.interval_ms = 10;
        config.heartbeat.failure_ceiling = 3;
        config
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let config = config();
        let (tx, rx) = log_channel();
        let state = initial_state(&config);
        let mut extension = Extension::new(&config, state, Arc::new(NullSender), rx);

        extension.start().unwrap();
        assert!(extension.start().is_err());

        tx.send(LogEvent::new(config.logs.readiness_marker.clone())).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(extension.state().status(), Status::Ready);

        extension.shutdown();
        extension.wait().await.unwrap();
        assert!(extension.stats().snapshot().sent > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_reports_failure_ceiling() {
        let config = config();
        let (_tx, rx) = log_channel();
        let mut extension = Extension::new(&config, initial_state(&config), Arc::new(DeadSender), rx);

        extension.start().unwrap();
        let result = extension.wait().await;

        assert!(matches!(result, Err(Error::FailureCeiling { failures: 3 })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ceiling_survives_cancelled_wait() {
        let config = config();
        let (tx, rx) = log_channel();
        let mut extension = Extension::new(&config, initial_state(&config), Arc::new(DeadSender), rx);
        extension.start().unwrap();

        // Let the heartbeat give up while the watcher is still alive.
        tokio::time::sleep(Duration::from_millis(200)).await;

        // The first wait joins the finished heartbeat and is dropped while
        // still waiting on the watcher task.
        tokio::select! {
            biased;
            _ = extension.wait() => panic!("watcher task should still be pending"),
            _ = std::future::ready(()) => {}
        }
        drop(tx);

        let result = extension.wait().await;
        assert!(matches!(result, Err(Error::FailureCeiling { failures: 3 })));
    }

    #[tokio::test]
    async fn test_launch_rejects_zero_interval() {
        let mut config = config();
        config.heartbeat.interval_ms = 0;
        let (_tx, rx) = log_channel();

        assert!(matches!(Extension::launch(&config, rx), Err(Error::Config(_))));
    }
}
