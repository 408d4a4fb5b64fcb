//! Keepalive watchdog
//!
//! Tracks the time since the last heartbeat from the remote side. The watchdog
//! is unarmed until the first heartbeat; from then on it expires once
//! `timeout` passes without another one.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Heartbeat-driven liveness watchdog
#[derive(Debug)]
pub struct KeepaliveWatchdog {
    timeout: Duration,
    last_heartbeat: Mutex<Option<Instant>>,
    armed: Notify,
}

impl KeepaliveWatchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_heartbeat: Mutex::new(None),
            armed: Notify::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Record a heartbeat, arming the watchdog on first use
    pub fn heartbeat(&self) {
        let first = self.last_heartbeat.lock().replace(Instant::now()).is_none();
        if first {
            self.armed.notify_one();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.last_heartbeat.lock().is_some()
    }

    /// Milliseconds since the last heartbeat, `None` while unarmed
    pub fn time_since_heartbeat(&self) -> Option<u64> {
        self.last_heartbeat
            .lock()
            .map(|last| last.elapsed().as_millis() as u64)
    }

    pub fn is_expired(&self) -> bool {
        self.last_heartbeat
            .lock()
            .is_some_and(|last| last.elapsed() >= self.timeout)
    }

    /// Wait until the watchdog expires
    ///
    /// Never resolves while unarmed.
    pub async fn expired(&self) {
        loop {
            let last = *self.last_heartbeat.lock();
            match last {
                None => self.armed.notified().await,
                Some(last) => {
                    let deadline = last + self.timeout;
                    if Instant::now() >= deadline {
                        return;
                    }
                    tokio::time::sleep_until(deadline).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unarmed_watchdog() {
        let watchdog = KeepaliveWatchdog::new(Duration::from_millis(100));
        assert!(!watchdog.is_armed());
        assert!(!watchdog.is_expired());
        assert_eq!(watchdog.time_since_heartbeat(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expires_after_silence() {
        let watchdog = KeepaliveWatchdog::new(Duration::from_millis(100));
        watchdog.heartbeat();
        assert!(watchdog.time_since_heartbeat().unwrap() <= 10);

        tokio::time::sleep(Duration::from_millis(60)).await;
        watchdog.heartbeat();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!watchdog.is_expired());

        let start = Instant::now();
        watchdog.expired().await;
        assert!(start.elapsed() >= Duration::from_millis(40));
        assert!(watchdog.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_arms_on_first_heartbeat() {
        let watchdog = std::sync::Arc::new(KeepaliveWatchdog::new(Duration::from_millis(50)));
        let w = watchdog.clone();
        let waiter = tokio::spawn(async move { w.expired().await });

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!waiter.is_finished());

        watchdog.heartbeat();
        tokio::time::timeout(Duration::from_millis(200), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
