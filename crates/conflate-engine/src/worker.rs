//! A single worker: reads the whole input, keeps its own partition and
//! decides every record in it.

use std::sync::Arc;

use conflate_store::{PersistentStore, StagingStore};
use conflate_tokenize::Tokenizer;
use conflate_types::OutputFeature;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::EngineSettings;
use crate::decision::{Decision, Matcher};
use crate::error::{ConflateError, ConflateResult, RecordError};
use crate::input;
use crate::mapping::{self, Mapper};
use crate::message::{Assignment, WorkerId, WorkerMessage, WorkerSummary};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Outcome {
    Blank,
    Created,
    Staged,
    Dropped,
    Rejected,
}

impl WorkerSummary {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Blank => {}
            Outcome::Created => self.created += 1,
            Outcome::Staged => self.staged += 1,
            Outcome::Dropped => self.dropped += 1,
            Outcome::Rejected => self.rejected += 1,
        }
    }
}

struct Shared {
    assignment: Assignment,
    mapper: Option<Arc<dyn Mapper>>,
    matcher: Matcher,
    persistent: Arc<dyn PersistentStore>,
    staging: Arc<dyn StagingStore>,
    prefilter_degrees: f64,
    events: mpsc::Sender<WorkerMessage>,
}

impl Shared {
    fn worker_id(&self) -> WorkerId {
        self.assignment.worker_id
    }

    async fn send(&self, message: WorkerMessage) -> ConflateResult<()> {
        self.events
            .send(message)
            .await
            .map_err(|_| ConflateError::Transport("coordinator channel closed".into()))
    }

    async fn process_line(&self, ordinal: u64, raw: Vec<u8>) -> ConflateResult<Outcome> {
        let text = match String::from_utf8(raw) {
            Ok(text) => text,
            Err(e) => {
                let lossy = String::from_utf8_lossy(e.as_bytes()).into_owned();
                return self.reject(ordinal, RecordError::Encoding(e.to_string()), lossy).await;
            }
        };
        let Some(line) = input::clean_line(&text) else {
            return Ok(Outcome::Blank);
        };

        let record = match input::parse_record(line, self.mapper.as_deref(), &self.assignment.context) {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(worker_id = self.worker_id(), ordinal, "record not actionable");
                return Ok(Outcome::Dropped);
            }
            Err(e) => return self.reject(ordinal, e, line.to_string()).await,
        };

        let candidates = self
            .persistent
            .candidates(&record.properties.number, record.geometry, self.prefilter_degrees)
            .await?;

        match self.matcher.decide(record, &candidates) {
            Decision::Create(record) => {
                self.send(WorkerMessage::Feature {
                    worker_id: self.worker_id(),
                    feature: OutputFeature::create(record),
                })
                .await?;
                Ok(Outcome::Created)
            }
            Decision::Modify(row) => {
                self.staging.insert(&row).await?;
                debug!(worker_id = self.worker_id(), ordinal, target_id = row.target_id, "staged modification");
                Ok(Outcome::Staged)
            }
            Decision::Drop => Ok(Outcome::Dropped),
        }
    }

    async fn reject(&self, ordinal: u64, error: RecordError, line: String) -> ConflateResult<Outcome> {
        warn!(worker_id = self.worker_id(), ordinal, error = %error, "skipping input line");
        self.send(WorkerMessage::Rejected {
            worker_id: self.worker_id(),
            ordinal,
            reason: error.to_string(),
            line,
        })
        .await?;
        Ok(Outcome::Rejected)
    }
}

pub struct Worker {
    shared: Arc<Shared>,
    batch_size: usize,
    max_in_flight: usize,
}

impl Worker {
    /// Build a worker from its assignment and its own store allocations.
    pub fn new(
        assignment: Assignment,
        persistent: Arc<dyn PersistentStore>,
        staging: Arc<dyn StagingStore>,
        settings: &EngineSettings,
        events: mpsc::Sender<WorkerMessage>,
    ) -> ConflateResult<Self> {
        if assignment.total_workers == 0 || assignment.worker_id >= assignment.total_workers {
            return Err(ConflateError::Config(format!(
                "worker {} outside pool of {}",
                assignment.worker_id, assignment.total_workers
            )));
        }
        let mapper = match &assignment.mapping {
            Some(name) => Some(
                mapping::lookup(name)
                    .ok_or_else(|| ConflateError::Config(format!("unknown mapping function: {name}")))?,
            ),
            None => None,
        };
        let matcher = Matcher::new(Tokenizer::new(assignment.tokens.clone()));

        Ok(Self {
            shared: Arc::new(Shared {
                assignment,
                mapper,
                matcher,
                persistent,
                staging,
                prefilter_degrees: settings.prefilter_degrees,
                events,
            }),
            batch_size: settings.batch_size,
            max_in_flight: settings.max_in_flight,
        })
    }

    /// Process the partition, then report `End`. Any error is reported as
    /// `Fatal` before it is returned.
    pub async fn run(self) -> ConflateResult<WorkerSummary> {
        let worker_id = self.shared.worker_id();
        match self.run_partition().await {
            Ok(summary) => {
                self.shared.send(WorkerMessage::End { worker_id, summary }).await?;
                info!(
                    worker_id,
                    assigned = summary.assigned,
                    created = summary.created,
                    staged = summary.staged,
                    "worker done"
                );
                Ok(summary)
            }
            Err(e) => {
                let _ = self
                    .shared
                    .send(WorkerMessage::Fatal {
                        worker_id,
                        error: e.to_string(),
                    })
                    .await;
                Err(e)
            }
        }
    }

    async fn run_partition(&self) -> ConflateResult<WorkerSummary> {
        let shared = &self.shared;
        shared.send(WorkerMessage::Ready { worker_id: shared.worker_id() }).await?;

        let file = File::open(&shared.assignment.input_path).await?;
        let mut lines = BufReader::new(file).split(b'\n');
        let mut ordinal: u64 = 0;
        let mut summary = WorkerSummary::default();
        let mut exhausted = false;

        while !exhausted {
            let mut batch = Vec::with_capacity(self.batch_size);
            while batch.len() < self.batch_size {
                let Some(mut raw) = lines.next_segment().await? else {
                    exhausted = true;
                    break;
                };
                let current = ordinal;
                ordinal += 1;
                if !shared.assignment.owns(current) {
                    continue;
                }
                if raw.last() == Some(&b'\r') {
                    raw.pop();
                }
                batch.push((current, raw));
            }
            summary.assigned += batch.len() as u64;
            self.process_batch(batch, &mut summary).await?;
        }
        Ok(summary)
    }

    /// Run one batch with at most `max_in_flight` records in progress and
    /// wait for all of them before the next batch is read.
    async fn process_batch(&self, batch: Vec<(u64, Vec<u8>)>, summary: &mut WorkerSummary) -> ConflateResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks = JoinSet::new();
        for (ordinal, raw) in batch {
            let shared = self.shared.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| ConflateError::Transport("batch semaphore closed".into()))?;
                shared.process_line(ordinal, raw).await
            });
        }

        // Returning early drops the set, which aborts the remaining tasks.
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.map_err(|e| ConflateError::Transport(format!("record task failed: {e}")))??;
            summary.record(outcome);
        }
        Ok(())
    }
}
