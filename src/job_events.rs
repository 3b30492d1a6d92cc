//! Job progress relay
//!
//! Each stream owns a fresh middleware connection subscribed to the job
//! collection. A background task forwards the events of one job until the
//! job reaches a terminal state or the consumer goes away; either way the
//! subscription is dropped and the connection closed. Events that arrive
//! while the current state is being read are replayed after it.

use futures::Stream;
use serde::Serialize;
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::middleware::MiddlewareClient;
use crate::snapshot_service::{Conn, Job, JobState, SnapshotService, JOBS_COLLECTION};

/// Events buffered between the relay task and a slow consumer
const RELAY_BUFFER: usize = 16;

/// One job update as delivered to the consumer
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JobEvent {
    pub id: i64,
    pub state: JobState,
    pub progress: Option<Value>,
    pub error: Option<Value>,
}

impl JobEvent {
    /// The snapshot sent first; an unknown job reads as UNKNOWN
    fn initial(job_id: i64, job: Option<&Job>) -> JobEvent {
        match job {
            Some(job) => JobEvent {
                id: job_id,
                state: job.state.clone(),
                progress: job.progress.clone(),
                error: job.error.clone(),
            },
            None => JobEvent {
                id: job_id,
                state: JobState::Unknown,
                progress: None,
                error: None,
            },
        }
    }

    /// A change event of the job collection concerning `job_id`, if this frame is one
    pub fn from_frame(frame: &Value, job_id: i64) -> Option<JobEvent> {
        if frame.get("collection").and_then(Value::as_str) != Some(JOBS_COLLECTION) {
            return None;
        }
        let fields = frame.get("fields")?;
        if fields.get("id").and_then(Value::as_i64) != Some(job_id) {
            return None;
        }

        let job = Job::from_fields(fields, job_id);
        Some(JobEvent {
            id: job.id,
            state: job.state,
            progress: job.progress,
            error: job.error,
        })
    }
}

/// Stream of [`JobEvent`]s for one job; dropping it ends the relay
pub struct JobEventStream {
    job_id: i64,
    rx: mpsc::Receiver<JobEvent>,
}

impl JobEventStream {
    /// Connect, subscribe and read the current job state
    ///
    /// Setup failures are returned here; once the stream exists, a lost
    /// connection simply ends it.
    pub async fn open(service: &SnapshotService, job_id: i64) -> Result<JobEventStream> {
        let mut client = service.connect().await?;
        let subscription_id = Uuid::new_v4().to_string();

        if let Err(e) = client.subscribe(JOBS_COLLECTION, &subscription_id).await {
            client.close().await;
            return Err(e);
        }

        let current = match service.get_job(job_id, Conn::Borrowed(&mut client)).await {
            Ok(job) => job,
            Err(e) => {
                finish(&mut client, &subscription_id).await;
                return Err(e);
            }
        };

        let initial = JobEvent::initial(job_id, current.as_ref());
        let (tx, rx) = mpsc::channel(RELAY_BUFFER);
        info!(job_id, subscription_id = %subscription_id, "job event stream opened");
        tokio::spawn(relay(client, subscription_id, job_id, initial, tx));

        Ok(JobEventStream { job_id, rx })
    }

    pub fn job_id(&self) -> i64 {
        self.job_id
    }
}

impl Stream for JobEventStream {
    type Item = JobEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<JobEvent>> {
        self.rx.poll_recv(cx)
    }
}

async fn relay(
    mut client: MiddlewareClient,
    subscription_id: String,
    job_id: i64,
    initial: JobEvent,
    tx: mpsc::Sender<JobEvent>,
) {
    let already_done = initial.state.is_terminal();
    if tx.send(initial).await.is_err() || already_done {
        finish(&mut client, &subscription_id).await;
        return;
    }

    loop {
        let frame = tokio::select! {
            _ = tx.closed() => {
                debug!(job_id, "job event consumer went away");
                break;
            }
            frame = client.receive_event() => frame,
        };

        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!(job_id, "job event stream lost its connection: {}", e);
                break;
            }
        };

        let Some(event) = JobEvent::from_frame(&frame, job_id) else {
            continue;
        };

        let terminal = event.state.is_terminal();
        if tx.send(event).await.is_err() || terminal {
            break;
        }
    }

    finish(&mut client, &subscription_id).await;
}

async fn finish(client: &mut MiddlewareClient, subscription_id: &str) {
    if let Err(e) = client.unsubscribe(subscription_id).await {
        debug!(subscription_id, "unsubscribe failed: {}", e);
    }
    client.close().await;
    info!(subscription_id, "job event stream closed");
}
