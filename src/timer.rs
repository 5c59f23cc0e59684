//! Interval Timer Module
//!
//! Drives automatic wallpaper changes every N minutes while enabled.
//!
//! ## Timer Behavior
//! - Fires once per interval, measured from when it was enabled or last fired
//! - Re-checks the enabled flag and interval every minute, so changes apply
//!   without restarting the daemon
//! - Ticks go through a single-slot channel: if the previous change is still
//!   running, the new tick is dropped instead of queued

use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// How often a waiting timer re-reads its settings.
const POLL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct IntervalTimer {
    enabled: Arc<AtomicBool>,
    interval: Arc<RwLock<Duration>>,
    next_run: Arc<RwLock<Option<DateTime<Local>>>>,
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl IntervalTimer {
    pub fn new(enabled: bool, interval: Duration) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(enabled)),
            interval: Arc::new(RwLock::new(interval)),
            next_run: Arc::new(RwLock::new(None)),
            handle: std::sync::Mutex::new(None),
        }
    }

    /// Starts the background task. A message arrives on the receiver each time the timer fires.
    pub fn start(&self) -> tokio::sync::mpsc::Receiver<()> {
        let (tx, rx) = tokio::sync::mpsc::channel(1);

        let enabled = self.enabled.clone();
        let interval = self.interval.clone();
        let next_run = self.next_run.clone();

        let handle = tokio::spawn(async move {
            loop {
                if !enabled.load(Ordering::SeqCst) {
                    *next_run.write().await = None;
                    tokio::time::sleep(POLL_INTERVAL).await;
                    continue;
                }

                let period = *interval.read().await;
                let deadline = Instant::now() + period;
                *next_run.write().await = Some(next_run_at(Local::now(), period));

                let mut rescheduled = false;
                while Instant::now() < deadline {
                    let slice = deadline.saturating_duration_since(Instant::now()).min(POLL_INTERVAL);
                    tokio::time::sleep(slice).await;
                    if !enabled.load(Ordering::SeqCst) || *interval.read().await != period {
                        rescheduled = true;
                        break;
                    }
                }
                if rescheduled {
                    continue;
                }

                match tx.try_send(()) {
                    Ok(()) => debug!("Timer fired"),
                    Err(TrySendError::Full(())) => debug!("Previous change still pending, tick dropped"),
                    Err(TrySendError::Closed(())) => break,
                }
            }
        });

        if let Ok(mut guard) = self.handle.lock() {
            *guard = Some(handle);
        }

        rx
    }

    /// Stops the background task.
    pub fn stop(&self) {
        if let Ok(mut guard) = self.handle.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub async fn set_interval(&self, interval: Duration) {
        *self.interval.write().await = interval;
    }

    pub async fn next_run(&self) -> Option<DateTime<Local>> {
        *self.next_run.read().await
    }

    /// Next run formatted for display, empty while disabled.
    pub async fn next_run_string(&self) -> String {
        if !self.is_enabled() {
            return String::new();
        }

        match self.next_run().await {
            Some(dt) => dt.format("%a %b %d %H:%M").to_string(),
            None => "Scheduled".to_string(),
        }
    }
}

impl Drop for IntervalTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn next_run_at(now: DateTime<Local>, period: Duration) -> DateTime<Local> {
    now + chrono::Duration::from_std(period).unwrap_or_else(|_| chrono::Duration::zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_run_adds_interval() {
        let now = Local::now();
        let next = next_run_at(now, Duration::from_secs(240 * 60));
        assert_eq!(next.signed_duration_since(now).num_minutes(), 240);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enabled_timer_fires_after_interval() {
        let timer = IntervalTimer::new(true, Duration::from_secs(120));
        let mut rx = timer.start();

        let early = tokio::time::timeout(Duration::from_secs(110), rx.recv()).await;
        assert!(early.is_err());

        let tick = tokio::time::timeout(Duration::from_secs(20), rx.recv()).await;
        assert_eq!(tick.unwrap(), Some(()));
        assert!(timer.next_run().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_timer_stays_quiet() {
        let timer = IntervalTimer::new(false, Duration::from_secs(60));
        let mut rx = timer.start();

        let tick = tokio::time::timeout(Duration::from_secs(3600), rx.recv()).await;
        assert!(tick.is_err());
        assert_eq!(timer.next_run_string().await, "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconsumed_ticks_do_not_queue() {
        let timer = IntervalTimer::new(true, Duration::from_secs(60));
        let mut rx = timer.start();

        tokio::time::sleep(Duration::from_secs(60 * 5 + 30)).await;

        assert_eq!(rx.recv().await, Some(()));
        assert!(rx.try_recv().is_err());
    }
}
