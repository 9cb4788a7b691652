//! Heartbeat monitor unit tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use drydock::errors::AgentError;
use drydock::workers::heartbeat::{HeartbeatMonitor, HeartbeatSink};

struct RecordingSink {
    beats: AtomicUsize,
    last_job: std::sync::Mutex<Option<Uuid>>,
}

impl RecordingSink {
    fn new() -> Self {
        Self {
            beats: AtomicUsize::new(0),
            last_job: std::sync::Mutex::new(None),
        }
    }
}

#[async_trait]
impl HeartbeatSink for RecordingSink {
    async fn beat(&self, job_id: Uuid) -> Result<(), AgentError> {
        self.beats.fetch_add(1, Ordering::SeqCst);
        *self.last_job.lock().unwrap() = Some(job_id);
        Ok(())
    }
}

#[tokio::test]
async fn test_monitor_beats_for_the_claimed_job() {
    let sink = Arc::new(RecordingSink::new());
    let job_id = Uuid::new_v4();

    let mut monitor = HeartbeatMonitor::start(sink.clone(), job_id, Duration::from_millis(10));
    tokio::time::sleep(Duration::from_millis(50)).await;
    monitor.stop().await;

    assert!(sink.beats.load(Ordering::SeqCst) >= 2);
    assert_eq!(*sink.last_job.lock().unwrap(), Some(job_id));
}

#[tokio::test]
async fn test_monitor_stops_cleanly_before_first_beat() {
    let sink = Arc::new(RecordingSink::new());

    // Stopped well inside the first interval; no beat should have fired.
    let mut monitor =
        HeartbeatMonitor::start(sink.clone(), Uuid::new_v4(), Duration::from_secs(60));
    monitor.stop().await;

    assert_eq!(sink.beats.load(Ordering::SeqCst), 0);
}
