//! Process-local counters exposed at `/metrics`.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::kernel::jobs::job::JobStatus;

#[derive(Default)]
pub struct Metrics {
    jobs_submitted: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_canceled: AtomicU64,
    provider_retries: AtomicU64,
    stream_subscribers: AtomicU64,
    rate_limited: AtomicU64,
    idempotent_replays: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_submitted(&self) {
        self.jobs_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_settled(&self, status: JobStatus) {
        let counter = match status {
            JobStatus::Completed => &self.jobs_completed,
            JobStatus::Failed => &self.jobs_failed,
            JobStatus::Canceled => &self.jobs_canceled,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn provider_retry(&self) {
        self.provider_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn subscriber_connected(&self) {
        self.stream_subscribers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn subscriber_disconnected(&self) {
        // Saturating: a disconnect without a matching connect stays at zero
        let _ = self
            .stream_subscribers
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    pub fn rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn idempotent_replay(&self) {
        self.idempotent_replays.fetch_add(1, Ordering::Relaxed);
    }

    /// Plain-text exposition, one `name value` line per counter.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, value) in [
            ("jobs_submitted_total", &self.jobs_submitted),
            ("jobs_completed_total", &self.jobs_completed),
            ("jobs_failed_total", &self.jobs_failed),
            ("jobs_canceled_total", &self.jobs_canceled),
            ("provider_retries_total", &self.provider_retries),
            ("stream_subscribers", &self.stream_subscribers),
            ("rate_limited_total", &self.rate_limited),
            ("idempotent_replays_total", &self.idempotent_replays),
        ] {
            out.push_str(name);
            out.push(' ');
            out.push_str(&value.load(Ordering::Relaxed).to_string());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_reflects_counters() {
        let metrics = Metrics::new();
        metrics.job_submitted();
        metrics.job_settled(JobStatus::Completed);
        metrics.subscriber_connected();
        metrics.subscriber_disconnected();
        metrics.subscriber_disconnected();

        let text = metrics.render();
        assert!(text.contains("jobs_submitted_total 1"));
        assert!(text.contains("jobs_completed_total 1"));
        // No underflow past zero
        assert!(text.contains("stream_subscribers 0"));
    }

    #[test]
    fn queued_and_streaming_do_not_settle() {
        let metrics = Metrics::new();
        metrics.job_settled(JobStatus::Queued);
        metrics.job_settled(JobStatus::Streaming);
        assert!(metrics.render().contains("jobs_completed_total 0"));
    }
}
