//! SSE streaming endpoint.
//!
//! GET /api/jobs/:id/stream
//!
//! Replays a progress snapshot on connect, relays live events, and closes
//! after the terminal event. Heartbeats are explicit `heartbeat` events
//! from the subscriber stream, not SSE comment keep-alives, so clients can
//! rely on one wire contract.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use futures::{Stream, StreamExt};
use tracing::info;
use uuid::Uuid;

use crate::common::error::ApiError;
use crate::kernel::deps::ServerDeps;
use crate::kernel::jobs::events::JobEvent;
use crate::kernel::jobs::job::JobStatus;
use crate::kernel::jobs::manager::DisconnectPolicy;
use crate::kernel::stream_hub::subscriber_stream;

pub async fn stream_job(
    State(deps): State<ServerDeps>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    // 404 before a channel is allocated for the id
    deps.store.get(id)?;
    let rx = deps.hub.subscribe(id);
    // Snapshot read after subscribing: an event published in between is
    // either reflected in the snapshot or buffered in rx, never lost.
    let snapshot = deps.store.get(id)?;
    deps.metrics.subscriber_connected();

    let guard = SubscriberGuard {
        deps: deps.clone(),
        job_id: id,
    };
    let heartbeat = deps.config.heartbeat_interval;
    let events = subscriber_stream(rx, snapshot, heartbeat).map(move |event| {
        let _held = &guard;
        Ok::<_, Infallible>(to_sse_event(&event))
    });

    Ok(Sse::new(events))
}

fn to_sse_event(event: &JobEvent) -> Event {
    let base = Event::default().event(event.name());
    match base.json_data(event) {
        Ok(sse) => sse,
        // Serialization of our own event types cannot realistically fail;
        // degrade to an empty payload rather than dropping the connection
        Err(_) => Event::default().event(event.name()).data("{}"),
    }
}

/// Tracks one subscriber for metrics and the disconnect policy.
///
/// Dropped when the SSE connection ends. Under `CancelQueued`, losing the
/// last subscriber cancels the job only if it is still QUEUED; anything
/// already streaming runs to completion.
struct SubscriberGuard {
    deps: ServerDeps,
    job_id: Uuid,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.deps.metrics.subscriber_disconnected();
        if self.deps.manager.config().disconnect_policy != DisconnectPolicy::CancelQueued {
            return;
        }

        let deps = self.deps.clone();
        let job_id = self.job_id;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                // Let the broadcast receiver finish dropping before counting
                tokio::time::sleep(Duration::from_millis(50)).await;
                if deps.hub.subscribers(job_id) > 0 {
                    return;
                }
                if let Ok(job) = deps.store.get(job_id) {
                    if job.status == JobStatus::Queued {
                        info!(%job_id, "last subscriber left a queued job, canceling");
                        deps.manager.cancel(job_id);
                    }
                }
            });
        }
    }
}
