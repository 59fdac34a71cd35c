//! Per-job broadcast hub and subscriber stream assembly.
//!
//! Publishers never block on slow subscribers: events fan out through a
//! bounded `tokio::sync::broadcast` channel per job, and a subscriber that
//! lags simply misses intermediate events. The subscriber stream enforces
//! the wire guarantees itself: a synthetic progress snapshot first,
//! non-decreasing progress values, heartbeats on idle, and termination
//! right after the first terminal event.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures::Stream;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::kernel::jobs::events::JobEvent;
use crate::kernel::jobs::job::Job;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Clone, Default)]
pub struct StreamHub {
    channels: Arc<RwLock<HashMap<Uuid, broadcast::Sender<JobEvent>>>>,
}

impl StreamHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an event to the job's channel. A job nobody listens to is
    /// not an error; the event is simply dropped.
    pub fn publish(&self, job_id: Uuid, event: JobEvent) {
        let sender = {
            let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
            channels.get(&job_id).cloned()
        };
        if let Some(sender) = sender {
            let _ = sender.send(event);
        }
    }

    pub fn subscribe(&self, job_id: Uuid) -> broadcast::Receiver<JobEvent> {
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(job_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Live subscriber count for the job.
    pub fn subscribers(&self, job_id: Uuid) -> usize {
        let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
        channels
            .get(&job_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Drop channels with no remaining subscribers.
    pub fn cleanup(&self) -> usize {
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        let before = channels.len();
        channels.retain(|_, sender| sender.receiver_count() > 0);
        let removed = before - channels.len();
        if removed > 0 {
            debug!(removed, "cleaned up idle stream channels");
        }
        removed
    }
}

/// Assemble the event stream one subscriber sees.
///
/// Starts with a synthetic progress snapshot so a late subscriber learns
/// the current state immediately. If the job already settled, the terminal
/// event follows and the stream ends. Otherwise live events are relayed
/// with progress filtered to non-decreasing values, a heartbeat fills any
/// `heartbeat_interval` without traffic, and the stream ends after the
/// first terminal event.
pub fn subscriber_stream(
    mut rx: broadcast::Receiver<JobEvent>,
    snapshot: Job,
    heartbeat_interval: Duration,
) -> impl Stream<Item = JobEvent> {
    async_stream::stream! {
        let mut last_progress = snapshot.progress_pct;
        yield JobEvent::progress(&snapshot, None);

        if let Some(terminal) = JobEvent::terminal_for(&snapshot) {
            yield terminal;
            return;
        }

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Ok(event) => {
                        if let Some(value) = event.progress_value() {
                            if value < last_progress {
                                continue;
                            }
                            last_progress = value;
                        }
                        let terminal = event.is_terminal();
                        yield event;
                        if terminal {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        debug!(missed, "stream subscriber lagged, skipping ahead");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                },
                _ = tokio::time::sleep(heartbeat_interval) => {
                    yield JobEvent::heartbeat();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::jobs::job::{GenerationResult, JobRequest, JobStatus};
    use futures::StreamExt;

    fn job() -> Job {
        Job::new(
            JobRequest::builder()
                .project_id(Uuid::new_v4())
                .title("t")
                .build(),
        )
    }

    fn long_heartbeat() -> Duration {
        Duration::from_secs(60)
    }

    #[tokio::test]
    async fn subscriber_gets_snapshot_first() {
        let hub = StreamHub::new();
        let job = job();
        let rx = hub.subscribe(job.id);
        let mut stream = Box::pin(subscriber_stream(rx, job.clone(), long_heartbeat()));

        hub.publish(job.id, JobEvent::preview(job.id, "partial"));
        let first = stream.next().await.unwrap();
        assert_eq!(first.name(), "progress");
        let second = stream.next().await.unwrap();
        assert_eq!(second.name(), "preview");
    }

    #[tokio::test]
    async fn stream_ends_after_terminal_event() {
        let hub = StreamHub::new();
        let job = job();
        let rx = hub.subscribe(job.id);
        let mut stream = Box::pin(subscriber_stream(rx, job.clone(), long_heartbeat()));

        let result = GenerationResult {
            content: "done".to_string(),
            token_count: 1,
            word_count: 1,
            generation_time_ms: 5,
        };
        hub.publish(job.id, JobEvent::completed(job.id, result));

        assert_eq!(stream.next().await.unwrap().name(), "progress");
        assert_eq!(stream.next().await.unwrap().name(), "completed");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn terminal_published_before_snapshot_read_is_not_lost() {
        let hub = StreamHub::new();
        let mut snapshot = job();
        snapshot.status = JobStatus::Streaming;
        snapshot.progress_pct = 50;

        // Subscribe first, the way the SSE route does; the terminal lands
        // before the stream is assembled around the now-stale snapshot.
        let rx = hub.subscribe(snapshot.id);
        let result = GenerationResult {
            content: "done".to_string(),
            token_count: 1,
            word_count: 1,
            generation_time_ms: 5,
        };
        hub.publish(snapshot.id, JobEvent::completed(snapshot.id, result));

        let mut stream = Box::pin(subscriber_stream(rx, snapshot, long_heartbeat()));
        assert_eq!(stream.next().await.unwrap().name(), "progress");
        assert_eq!(stream.next().await.unwrap().name(), "completed");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn regressing_progress_is_filtered() {
        let hub = StreamHub::new();
        let mut snapshot = job();
        snapshot.status = JobStatus::Streaming;
        snapshot.progress_pct = 50;

        let rx = hub.subscribe(snapshot.id);
        let mut stream = Box::pin(subscriber_stream(rx, snapshot.clone(), long_heartbeat()));

        let mut stale = snapshot.clone();
        stale.progress_pct = 25;
        hub.publish(snapshot.id, JobEvent::progress(&stale, None));
        let mut fresh = snapshot.clone();
        fresh.progress_pct = 75;
        hub.publish(snapshot.id, JobEvent::progress(&fresh, None));

        assert_eq!(stream.next().await.unwrap().progress_value(), Some(50));
        // The 25 regression is dropped; 75 comes through
        assert_eq!(stream.next().await.unwrap().progress_value(), Some(75));
    }

    #[tokio::test]
    async fn settled_job_replays_snapshot_and_terminal() {
        let hub = StreamHub::new();
        let mut snapshot = job();
        snapshot.status = JobStatus::Canceled;
        snapshot.progress_pct = 30;

        let rx = hub.subscribe(snapshot.id);
        let mut stream = Box::pin(subscriber_stream(rx, snapshot, long_heartbeat()));

        assert_eq!(stream.next().await.unwrap().progress_value(), Some(30));
        let terminal = stream.next().await.unwrap();
        assert_eq!(terminal.name(), "failed");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_fires_on_idle() {
        let hub = StreamHub::new();
        let job = job();
        let rx = hub.subscribe(job.id);
        let mut stream = Box::pin(subscriber_stream(rx, job.clone(), Duration::from_secs(15)));

        assert_eq!(stream.next().await.unwrap().name(), "progress");
        let next = stream.next().await.unwrap();
        assert_eq!(next.name(), "heartbeat");
    }

    #[test]
    fn cleanup_drops_idle_channels() {
        let hub = StreamHub::new();
        let id = Uuid::new_v4();
        let rx = hub.subscribe(id);
        assert_eq!(hub.subscribers(id), 1);
        assert_eq!(hub.cleanup(), 0);

        drop(rx);
        assert_eq!(hub.cleanup(), 1);
        assert_eq!(hub.subscribers(id), 0);
    }
}
