//! Progress tracker for real-time job status streaming.
//!
//! Holds the latest snapshot per job and fans updates out over tokio
//! broadcast channels: one per job plus a global one. Publishing never fails;
//! a publish with nobody listening is simply cached.

use crate::application::constants::{DEFAULT_ESTIMATE_HORIZON_MS, PROGRESS_CHANNEL_CAPACITY};
use crate::domain::{JobId, ProgressSnapshot};
use crate::port::TimeProvider;
use futures::Stream;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Caches snapshots and broadcasts them to subscribers.
pub struct ProgressTracker {
    snapshots: Mutex<HashMap<JobId, ProgressSnapshot>>,
    channels: Mutex<HashMap<JobId, broadcast::Sender<ProgressSnapshot>>>,
    global: broadcast::Sender<ProgressSnapshot>,
    capacity: usize,
    time_provider: Arc<dyn TimeProvider>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl ProgressTracker {
    pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
        Self::with_capacity(time_provider, PROGRESS_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(time_provider: Arc<dyn TimeProvider>, capacity: usize) -> Self {
        let (global, _) = broadcast::channel(capacity);
        Self {
            snapshots: Mutex::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
            global,
            capacity,
            time_provider,
        }
    }

    /// Replace the cached snapshot and notify subscribers.
    ///
    /// A terminal snapshot is final: a later non-terminal one for the same job
    /// is dropped.
    pub fn publish(&self, snapshot: ProgressSnapshot) {
        {
            let mut snapshots = lock(&self.snapshots);
            if let Some(current) = snapshots.get(&snapshot.job_id) {
                if current.status.is_terminal() && !snapshot.status.is_terminal() {
                    debug!(
                        job_id = %snapshot.job_id,
                        current = %current.status,
                        dropped = %snapshot.status,
                        "Ignoring snapshot after terminal state"
                    );
                    return;
                }
            }
            snapshots.insert(snapshot.job_id.clone(), snapshot.clone());
        }

        {
            let mut channels = lock(&self.channels);
            let prune = match channels.get(&snapshot.job_id) {
                // Err means no receivers are left
                Some(sender) => sender.send(snapshot.clone()).is_err(),
                None => false,
            };
            if prune {
                channels.remove(&snapshot.job_id);
            }
        }

        // No active global receivers is fine
        let _ = self.global.send(snapshot);
    }

    /// Latest snapshot of a job, if one was published.
    pub fn read(&self, job_id: &str) -> Option<ProgressSnapshot> {
        lock(&self.snapshots).get(job_id).cloned()
    }

    /// Receive future snapshots of one job.
    pub fn subscribe(&self, job_id: &str) -> ProgressSubscription {
        let mut channels = lock(&self.channels);
        let sender = channels
            .entry(job_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        ProgressSubscription::new(sender.subscribe())
    }

    /// Receive future snapshots of every job.
    pub fn subscribe_all(&self) -> ProgressSubscription {
        ProgressSubscription::new(self.global.subscribe())
    }

    /// Drop the cached snapshot and end all subscriptions of a job.
    pub fn clear(&self, job_id: &str) {
        lock(&self.snapshots).remove(job_id);
        lock(&self.channels).remove(job_id);
    }

    pub fn clear_all(&self) {
        lock(&self.snapshots).clear();
        lock(&self.channels).clear();
    }

    /// Number of jobs with a live per-job channel.
    pub fn channel_count(&self) -> usize {
        lock(&self.channels).len()
    }

    /// Estimated completion time in epoch ms.
    ///
    /// Extrapolates the average time per completed chapter over the chapters
    /// left. With nothing completed yet the default horizon is used.
    pub fn estimate_completion(&self, completed: u32, total: u32, start_time: i64) -> i64 {
        let now = self.time_provider.now_millis();
        if completed == 0 {
            return now + DEFAULT_ESTIMATE_HORIZON_MS;
        }
        let elapsed = (now - start_time).max(0);
        let remaining = total.saturating_sub(completed) as i64;
        now + (elapsed / completed as i64) * remaining
    }
}

/// Live feed of snapshots. Ends on `close()` or when the job is cleared.
pub struct ProgressSubscription {
    rx: broadcast::Receiver<ProgressSnapshot>,
    closed: bool,
}

impl ProgressSubscription {
    fn new(rx: broadcast::Receiver<ProgressSnapshot>) -> Self {
        Self { rx, closed: false }
    }

    /// Next snapshot, or `None` once the subscription has ended.
    ///
    /// A slow subscriber that falls behind skips the missed snapshots; each
    /// one supersedes the previous anyway.
    pub async fn recv(&mut self) -> Option<ProgressSnapshot> {
        loop {
            if self.closed {
                return None;
            }
            match self.rx.recv().await {
                Ok(snapshot) => return Some(snapshot),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Progress subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.closed = true;
                }
            }
        }
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn into_stream(self) -> impl Stream<Item = ProgressSnapshot> + Send {
        futures::stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|snapshot| (snapshot, sub))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobStatus;
    use crate::port::time_provider::ManualTimeProvider;
    use futures::StreamExt;

    fn snapshot(job_id: &str, status: JobStatus, progress: u8) -> ProgressSnapshot {
        ProgressSnapshot {
            job_id: job_id.to_string(),
            status,
            progress,
            stage: "test".to_string(),
            chapters_completed: 0,
            chapters_total: 5,
            chapters_failed: 0,
            estimated_completion: None,
            updated_at: 0,
        }
    }

    fn tracker() -> ProgressTracker {
        ProgressTracker::new(Arc::new(ManualTimeProvider::new(10_000)))
    }

    #[tokio::test]
    async fn test_publish_replaces_snapshot() {
        let tracker = tracker();
        assert!(tracker.read("a").is_none());
        tracker.publish(snapshot("a", JobStatus::Generating, 20));
        tracker.publish(snapshot("a", JobStatus::Generating, 40));
        assert_eq!(tracker.read("a").unwrap().progress, 40);
    }

    #[tokio::test]
    async fn test_subscribers_receive_independently() {
        let tracker = tracker();
        let mut first = tracker.subscribe("a");
        let mut second = tracker.subscribe("a");
        let mut other = tracker.subscribe("b");

        tracker.publish(snapshot("a", JobStatus::Generating, 20));

        assert_eq!(first.recv().await.unwrap().progress, 20);
        assert_eq!(second.recv().await.unwrap().progress, 20);
        tracker.publish(snapshot("b", JobStatus::Generating, 60));
        assert_eq!(other.recv().await.unwrap().job_id, "b");
    }

    #[tokio::test]
    async fn test_subscription_sees_only_future_snapshots() {
        let tracker = tracker();
        tracker.publish(snapshot("a", JobStatus::Generating, 20));
        let mut sub = tracker.subscribe("a");
        tracker.publish(snapshot("a", JobStatus::Generating, 40));
        assert_eq!(sub.recv().await.unwrap().progress, 40);
    }

    #[tokio::test]
    async fn test_close_ends_delivery() {
        let tracker = tracker();
        let mut sub = tracker.subscribe("a");
        sub.close();
        tracker.publish(snapshot("a", JobStatus::Generating, 20));
        assert!(sub.is_closed());
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_clear_ends_subscriptions() {
        let tracker = tracker();
        tracker.publish(snapshot("a", JobStatus::Generating, 20));
        let mut sub = tracker.subscribe("a");
        tracker.clear("a");
        assert!(tracker.read("a").is_none());
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_channels_pruned_without_receivers() {
        let tracker = tracker();
        let sub = tracker.subscribe("a");
        assert_eq!(tracker.channel_count(), 1);
        drop(sub);
        tracker.publish(snapshot("a", JobStatus::Generating, 20));
        assert_eq!(tracker.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_terminal_snapshot_is_final() {
        let tracker = tracker();
        tracker.publish(snapshot("a", JobStatus::Cancelled, 20));
        tracker.publish(snapshot("a", JobStatus::Generating, 40));
        let current = tracker.read("a").unwrap();
        assert_eq!(current.status, JobStatus::Cancelled);
        assert_eq!(current.progress, 20);
    }

    #[tokio::test]
    async fn test_global_subscription_as_stream() {
        let tracker = tracker();
        let stream = tracker.subscribe_all().into_stream();
        tracker.publish(snapshot("a", JobStatus::Generating, 20));
        tracker.publish(snapshot("b", JobStatus::Completed, 100));
        let received: Vec<ProgressSnapshot> = stream.take(2).collect().await;
        assert_eq!(received[0].job_id, "a");
        assert_eq!(received[1].job_id, "b");
    }

    #[test]
    fn test_estimate_completion() {
        let clock = Arc::new(ManualTimeProvider::new(10_000));
        let tracker = ProgressTracker::new(clock.clone());

        assert_eq!(
            tracker.estimate_completion(0, 5, 0),
            10_000 + DEFAULT_ESTIMATE_HORIZON_MS
        );
        // 2 chapters in 10s -> 5s each, 3 left
        assert_eq!(tracker.estimate_completion(2, 5, 0), 10_000 + 15_000);
        assert_eq!(tracker.estimate_completion(5, 5, 0), 10_000);
    }
}
