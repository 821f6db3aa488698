//! Cancellation signal shared by the background tasks

use tokio::sync::watch;

/// Fires the shutdown signal
#[derive(Debug)]
pub struct ShutdownTrigger(watch::Sender<bool>);

/// Observes the shutdown signal; clone one per task
#[derive(Debug, Clone)]
pub struct ShutdownListener(watch::Receiver<bool>);

pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownListener) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger(tx), ShutdownListener(rx))
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }

    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener(self.0.subscribe())
    }
}

impl ShutdownListener {
    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolve once shutdown is triggered or the trigger is dropped
    pub async fn wait(&mut self) {
        let _ = self.0.wait_for(|stop| *stop).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_wakes_listener() {
        let (trigger, mut listener) = shutdown_channel();
        assert!(!listener.is_triggered());

        let waiter = tokio::spawn(async move {
            listener.wait().await;
        });
        trigger.trigger();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_late_listener_sees_trigger() {
        let (trigger, _listener) = shutdown_channel();
        trigger.trigger();

        let mut late = trigger.listener();
        assert!(late.is_triggered());
        late.wait().await;
    }

    #[tokio::test]
    async fn test_dropped_trigger_releases_wait() {
        let (trigger, mut listener) = shutdown_channel();
        drop(trigger);
        listener.wait().await;
    }
}
