//! Run orchestration.
//!
//! The coordinator validates the job, resets the staging store, spawns one
//! task per worker and merges their create features into the output as they
//! arrive. Once every spawned worker has reported `End` it runs the grouping
//! pass over the staging store and appends the merged modify features.
//!
//! Any fatal worker error aborts the remaining workers and ends the run.

use std::sync::Arc;

use conflate_store::StoreProvider;
use serde::Serialize;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Job;
use crate::error::{ConflateError, ConflateResult};
use crate::grouping::GroupingPass;
use crate::message::{Assignment, WorkerId, WorkerMessage, WorkerSummary};
use crate::sink::{FeatureWriter, RejectWriter};
use crate::worker::Worker;

/// Messages buffered per worker before senders wait on the coordinator.
const CHANNEL_DEPTH_PER_WORKER: usize = 64;

/// Counters for a finished run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub workers: usize,
    pub lines: u64,
    pub created: u64,
    pub staged: u64,
    pub dropped: u64,
    pub rejected: u64,
    /// Modify features emitted by the grouping pass.
    pub modified: u64,
}

impl RunSummary {
    fn absorb(&mut self, worker: &WorkerSummary) {
        self.lines += worker.assigned;
        self.created += worker.created;
        self.staged += worker.staged;
        self.dropped += worker.dropped;
        self.rejected += worker.rejected;
    }
}

/// Tracks which spawned workers have signalled ready and ended.
///
/// Completion depends only on `End` from every spawned worker, so an early
/// `End` from one worker cannot release the barrier while another has not
/// started yet.
#[derive(Debug)]
pub struct CompletionBarrier {
    ready: Vec<bool>,
    ended: Vec<bool>,
    active: usize,
}

impl CompletionBarrier {
    pub fn new(workers: usize) -> Self {
        Self {
            ready: vec![false; workers],
            ended: vec![false; workers],
            active: workers,
        }
    }

    pub fn ready(&mut self, worker_id: WorkerId) -> ConflateResult<()> {
        let slot = self
            .ready
            .get_mut(worker_id)
            .ok_or_else(|| ConflateError::Transport(format!("ready from unknown worker {worker_id}")))?;
        *slot = true;
        Ok(())
    }

    pub fn end(&mut self, worker_id: WorkerId) -> ConflateResult<()> {
        let slot = self
            .ended
            .get_mut(worker_id)
            .ok_or_else(|| ConflateError::Transport(format!("end from unknown worker {worker_id}")))?;
        if *slot {
            return Err(ConflateError::Transport(format!("worker {worker_id} ended twice")));
        }
        *slot = true;
        self.active -= 1;
        Ok(())
    }

    pub fn ready_count(&self) -> usize {
        self.ready.iter().filter(|r| **r).count()
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn is_complete(&self) -> bool {
        self.active == 0
    }
}

enum Failure {
    Worker { worker_id: WorkerId, error: String },
    Coordinator(ConflateError),
}

impl From<ConflateError> for Failure {
    fn from(e: ConflateError) -> Self {
        Self::Coordinator(e)
    }
}

type WorkerHandle = JoinHandle<ConflateResult<WorkerSummary>>;

pub struct Coordinator {
    job: Job,
    stores: Arc<dyn StoreProvider>,
}

impl Coordinator {
    pub fn new(job: Job, stores: Arc<dyn StoreProvider>) -> Self {
        Self { job, stores }
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Execute the run, writing features to `output` and rejected input
    /// lines to `errors` when given.
    pub async fn run<W>(
        &self,
        output: W,
        errors: Option<&mut (dyn AsyncWrite + Unpin + Send)>,
    ) -> ConflateResult<RunSummary>
    where
        W: AsyncWrite + Unpin,
    {
        self.job.validate()?;
        let workers = self.job.workers;

        let staging = self.stores.staging()?;
        staging.reset().await?;
        info!(workers, input = %self.job.input.display(), "starting conflation run");

        let (tx, mut rx) = mpsc::channel(workers.saturating_mul(CHANNEL_DEPTH_PER_WORKER));
        let mut handles: Vec<WorkerHandle> = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let worker = match self.build_worker(worker_id, tx.clone()) {
                Ok(worker) => worker,
                Err(e) => {
                    handles.iter().for_each(|h| h.abort());
                    return Err(e);
                }
            };
            handles.push(tokio::spawn(worker.run()));
        }
        drop(tx);

        let mut output = FeatureWriter::new(output);
        let mut rejects = errors.map(RejectWriter::new);
        let mut summary = RunSummary {
            workers,
            ..Default::default()
        };

        if let Err(failure) = collect(&mut rx, &mut output, rejects.as_mut(), &mut summary).await {
            let error = shut_down(handles, failure).await;
            // Creates already accepted stay in the output; the run error wins over flush errors.
            if let Err(e) = output.finish().await {
                warn!(error = %e, "could not flush output after failure");
            }
            if let Some(rejects) = rejects {
                if let Err(e) = rejects.finish().await {
                    warn!(error = %e, "could not flush rejected lines after failure");
                }
            }
            return Err(error);
        }

        for (worker_id, handle) in handles.into_iter().enumerate() {
            handle
                .await
                .map_err(|e| ConflateError::Transport(format!("worker {worker_id} died: {e}")))??;
        }
        info!(
            created = summary.created,
            staged = summary.staged,
            "all workers finished, starting grouping pass"
        );

        summary.modified = GroupingPass::new(staging, self.job.settings.page_size)
            .run(&mut output)
            .await?;
        output.finish().await?;
        if let Some(rejects) = rejects {
            rejects.finish().await?;
        }

        info!(
            lines = summary.lines,
            created = summary.created,
            modified = summary.modified,
            dropped = summary.dropped,
            rejected = summary.rejected,
            "conflation run complete"
        );
        Ok(summary)
    }

    fn build_worker(&self, worker_id: WorkerId, events: mpsc::Sender<WorkerMessage>) -> ConflateResult<Worker> {
        let assignment = Assignment {
            worker_id,
            total_workers: self.job.workers,
            context: self.job.context.clone(),
            mapping: self.job.mapping.clone(),
            tokens: self.job.tokens.clone(),
            input_path: self.job.input.clone(),
        };
        Worker::new(
            assignment,
            self.stores.persistent()?,
            self.stores.staging()?,
            &self.job.settings,
            events,
        )
    }
}

async fn collect<W, E>(
    rx: &mut mpsc::Receiver<WorkerMessage>,
    output: &mut FeatureWriter<W>,
    mut rejects: Option<&mut RejectWriter<E>>,
    summary: &mut RunSummary,
) -> Result<(), Failure>
where
    W: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    let mut barrier = CompletionBarrier::new(summary.workers);
    while !barrier.is_complete() {
        let message = rx.recv().await.ok_or_else(|| {
            ConflateError::Transport(format!(
                "worker channel closed with {} worker(s) still running",
                barrier.active()
            ))
        })?;
        match message {
            WorkerMessage::Ready { worker_id } => {
                barrier.ready(worker_id)?;
                debug!(worker_id, ready = barrier.ready_count(), "worker ready");
            }
            WorkerMessage::Feature { feature, .. } => output.write(&feature).await?,
            WorkerMessage::Rejected {
                ordinal, reason, line, ..
            } => {
                if let Some(rejects) = rejects.as_mut() {
                    rejects.write(ordinal, &reason, &line).await?;
                }
            }
            WorkerMessage::End {
                worker_id,
                summary: counts,
            } => {
                barrier.end(worker_id)?;
                summary.absorb(&counts);
                info!(worker_id, remaining = barrier.active(), "worker finished");
            }
            WorkerMessage::Fatal { worker_id, error } => {
                return Err(Failure::Worker { worker_id, error });
            }
        }
    }
    Ok(())
}

/// Abort every worker still running and resolve the error to report.
async fn shut_down(handles: Vec<WorkerHandle>, failure: Failure) -> ConflateError {
    let failed = match &failure {
        Failure::Worker { worker_id, .. } => Some(*worker_id),
        Failure::Coordinator(_) => None,
    };
    for (worker_id, handle) in handles.iter().enumerate() {
        if Some(worker_id) != failed {
            handle.abort();
        }
    }

    match failure {
        Failure::Coordinator(e) => {
            error!(error = %e, "aborting run");
            e
        }
        Failure::Worker { worker_id, error } => {
            error!(worker_id, error = %error, "worker failed, aborting run");
            match handles.into_iter().nth(worker_id) {
                Some(handle) => match handle.await {
                    Ok(Err(e)) => e,
                    _ => ConflateError::Transport(format!("worker {worker_id} failed: {error}")),
                },
                None => ConflateError::Transport(format!("unknown worker {worker_id} failed: {error}")),
            }
        }
    }
}
