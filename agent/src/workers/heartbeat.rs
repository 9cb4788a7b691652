//! Background heartbeat for in-flight jobs

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::jobs::JobStore;
use crate::errors::AgentError;

/// Destination for heartbeat writes.
///
/// A trait seam so the monitor can be exercised without a database.
#[async_trait]
pub trait HeartbeatSink: Send + Sync {
    async fn beat(&self, job_id: Uuid) -> Result<(), AgentError>;
}

#[async_trait]
impl HeartbeatSink for JobStore {
    async fn beat(&self, job_id: Uuid) -> Result<(), AgentError> {
        self.heartbeat(job_id).await
    }
}

/// Supervised liveness task for one job execution.
///
/// Each interval tick writes a heartbeat through the sink; transient
/// failures are logged, never escalated. After `stop()` returns, no
/// further beat is sent.
pub struct HeartbeatMonitor {
    stop_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
    join_timeout: Duration,
}

impl HeartbeatMonitor {
    /// Spawn the heartbeat task for `job_id`.
    pub fn start(sink: Arc<dyn HeartbeatSink>, job_id: Uuid, interval: Duration) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick of a tokio interval fires immediately;
            // consume it so beats start one interval in.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            debug!("Heartbeat for job {} stopping", job_id);
                            return;
                        }
                    }
                    _ = ticker.tick() => {
                        match sink.beat(job_id).await {
                            Ok(_) => debug!("Heartbeat sent for job {}", job_id),
                            Err(e) => warn!("Heartbeat for job {} failed: {}", job_id, e),
                        }
                    }
                }
            }
        });

        Self {
            stop_tx,
            handle: Some(handle),
            join_timeout: Duration::from_secs(5),
        }
    }

    /// Signal the task and wait (bounded) for it to settle. Safe to call
    /// repeatedly or on a monitor whose task already finished.
    ///
    /// A task that overruns the bound is aborted: a beat stuck in the
    /// sink must not land after the job's terminal status write.
    pub async fn stop(&mut self) {
        let _ = self.stop_tx.send(true);

        if let Some(handle) = self.handle.take() {
            let abort = handle.abort_handle();
            if tokio::time::timeout(self.join_timeout, handle).await.is_err() {
                warn!("Heartbeat task did not settle within {:?}, aborting", self.join_timeout);
                abort.abort();
            }
        }
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        beats: AtomicUsize,
    }

    #[async_trait]
    impl HeartbeatSink for CountingSink {
        async fn beat(&self, _job_id: Uuid) -> Result<(), AgentError> {
            self.beats.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl HeartbeatSink for FailingSink {
        async fn beat(&self, _job_id: Uuid) -> Result<(), AgentError> {
            Err(AgentError::ClaimError("store unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_beats_until_stopped() {
        let sink = Arc::new(CountingSink { beats: AtomicUsize::new(0) });
        let mut monitor = HeartbeatMonitor::start(
            sink.clone(),
            Uuid::new_v4(),
            Duration::from_millis(10),
        );

        tokio::time::sleep(Duration::from_millis(55)).await;
        monitor.stop().await;

        let at_stop = sink.beats.load(Ordering::SeqCst);
        assert!(at_stop >= 2, "expected at least 2 beats, got {}", at_stop);

        // No further beats after stop() returns.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.beats.load(Ordering::SeqCst), at_stop);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let sink = Arc::new(CountingSink { beats: AtomicUsize::new(0) });
        let mut monitor =
            HeartbeatMonitor::start(sink, Uuid::new_v4(), Duration::from_millis(10));

        monitor.stop().await;
        monitor.stop().await;
    }

    struct SlowSink {
        landed: AtomicUsize,
    }

    #[async_trait]
    impl HeartbeatSink for SlowSink {
        async fn beat(&self, _job_id: Uuid) -> Result<(), AgentError> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            self.landed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_stuck_beat_never_lands_after_stop() {
        let sink = Arc::new(SlowSink { landed: AtomicUsize::new(0) });
        let mut monitor = HeartbeatMonitor::start(
            sink.clone(),
            Uuid::new_v4(),
            Duration::from_millis(10),
        );
        monitor.join_timeout = Duration::from_millis(100);

        // Let a beat get stuck inside the sink, then stop at the bound.
        tokio::time::sleep(Duration::from_millis(30)).await;
        monitor.stop().await;

        let at_stop = sink.landed.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(
            sink.landed.load(Ordering::SeqCst),
            at_stop,
            "a heartbeat write landed after stop() returned"
        );
    }

    #[tokio::test]
    async fn test_sink_failures_do_not_kill_the_task() {
        let mut monitor = HeartbeatMonitor::start(
            Arc::new(FailingSink),
            Uuid::new_v4(),
            Duration::from_millis(10),
        );

        tokio::time::sleep(Duration::from_millis(40)).await;
        // Still stoppable: the task survived the failed writes.
        monitor.stop().await;
    }
}
