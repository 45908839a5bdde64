//! Coordinator/worker protocol.
//!
//! The coordinator hands each worker one [`Assignment`]; workers answer on a
//! shared channel with [`WorkerMessage`]s. Messages are serde-tagged so the
//! same protocol can cross a process boundary unchanged.

use std::path::PathBuf;

use conflate_tokenize::TokenTable;
use conflate_types::{Context, OutputFeature};
use serde::{Deserialize, Serialize};

pub type WorkerId = usize;

/// Everything a worker needs to process its share of the input.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Assignment {
    pub worker_id: WorkerId,
    pub total_workers: usize,
    pub context: Context,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenTable>,
    pub input_path: PathBuf,
}

impl Assignment {
    /// Whether the line at `ordinal` belongs to this worker's partition.
    pub fn owns(&self, ordinal: u64) -> bool {
        ordinal % self.total_workers as u64 == self.worker_id as u64
    }
}

/// Per-worker counters reported with [`WorkerMessage::End`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSummary {
    /// Lines in this worker's partition, blank lines included.
    pub assigned: u64,
    pub created: u64,
    pub staged: u64,
    pub dropped: u64,
    pub rejected: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerMessage {
    Ready {
        worker_id: WorkerId,
    },
    /// A finished create feature.
    Feature {
        worker_id: WorkerId,
        feature: OutputFeature,
    },
    /// An input line that failed parsing, validation or mapping.
    Rejected {
        worker_id: WorkerId,
        ordinal: u64,
        reason: String,
        line: String,
    },
    End {
        worker_id: WorkerId,
        summary: WorkerSummary,
    },
    Fatal {
        worker_id: WorkerId,
        error: String,
    },
}

impl WorkerMessage {
    pub fn worker_id(&self) -> WorkerId {
        match self {
            Self::Ready { worker_id }
            | Self::Feature { worker_id, .. }
            | Self::Rejected { worker_id, .. }
            | Self::End { worker_id, .. }
            | Self::Fatal { worker_id, .. } => *worker_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assignment(worker_id: usize, total: usize) -> Assignment {
        Assignment {
            worker_id,
            total_workers: total,
            context: Context::default(),
            mapping: None,
            tokens: None,
            input_path: PathBuf::from("in.geojson"),
        }
    }

    #[test]
    fn partitions_are_disjoint_and_complete() {
        let workers: Vec<Assignment> = (0..3).map(|id| assignment(id, 3)).collect();
        for ordinal in 0..30u64 {
            let owners = workers.iter().filter(|a| a.owns(ordinal)).count();
            assert_eq!(owners, 1, "line {ordinal}");
        }
        assert!(workers[1].owns(4));
        assert!(!workers[0].owns(4));
    }

    #[test]
    fn ready_and_end_wire_shape() {
        let ready = serde_json::to_value(WorkerMessage::Ready { worker_id: 2 }).unwrap();
        assert_eq!(ready, json!({"type": "ready", "worker_id": 2}));

        let end = serde_json::to_value(WorkerMessage::End {
            worker_id: 1,
            summary: WorkerSummary::default(),
        })
        .unwrap();
        assert_eq!(end["type"], "end");
        assert_eq!(end["worker_id"], 1);
    }

    #[test]
    fn fatal_roundtrips() {
        let msg = WorkerMessage::Fatal {
            worker_id: 3,
            error: "store error: pool closed".into(),
        };
        let text = serde_json::to_string(&msg).unwrap();
        let back: WorkerMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(back.worker_id(), 3);
        assert!(matches!(back, WorkerMessage::Fatal { error, .. } if error.contains("pool closed")));
    }

    #[test]
    fn assignment_omits_absent_options() {
        let v = serde_json::to_value(assignment(0, 1)).unwrap();
        assert!(v.get("mapping").is_none());
        assert!(v.get("tokens").is_none());
        assert_eq!(v["total_workers"], 1);
    }
}
