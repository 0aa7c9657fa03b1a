//! Checkpointing for the Pregel runtime
//!
//! A checkpoint captures everything needed to continue a run at a superstep
//! boundary: the workflow state, per-vertex states, undelivered messages and
//! retry counters. Interrupted runs are persisted the same way, tagged with
//! [`INTERRUPTED_AT`] metadata naming the vertex the run paused before.
//!
//! # Usage
//!
//! ```ignore
//! let checkpointer = create_checkpointer::<RunState>(
//!     CheckpointerConfig::File { path: "./checkpoints".into(), compression: true },
//!     "run-42",
//! );
//!
//! if let Some(checkpoint) = checkpointer.latest().await? {
//!     println!("paused at superstep {}", checkpoint.superstep);
//! }
//! ```

mod file;

pub use file::FileCheckpointer;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use super::error::PregelError;
use super::message::WorkflowMessage;
use super::state::WorkflowState;
use super::vertex::{VertexId, VertexState};

/// Metadata key naming the vertex a run is paused before
pub const INTERRUPTED_AT: &str = "interrupted_at";

/// Workflow snapshot at a superstep boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint<S>
where
    S: WorkflowState,
{
    pub workflow_id: String,

    /// Superstep to run next when resuming
    pub superstep: usize,

    pub state: S,

    pub vertex_states: HashMap<VertexId, VertexState>,

    /// Messages waiting to be delivered in `superstep`
    pub pending_messages: HashMap<VertexId, Vec<WorkflowMessage>>,

    #[serde(default)]
    pub retry_counts: HashMap<VertexId, usize>,

    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl<S> Checkpoint<S>
where
    S: WorkflowState,
{
    pub fn new(
        workflow_id: impl Into<String>,
        superstep: usize,
        state: S,
        vertex_states: HashMap<VertexId, VertexState>,
        pending_messages: HashMap<VertexId, Vec<WorkflowMessage>>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            superstep,
            state,
            vertex_states,
            pending_messages,
            retry_counts: HashMap::new(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_retry_counts(mut self, retry_counts: HashMap<VertexId, usize>) -> Self {
        self.retry_counts = retry_counts;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Vertex this checkpoint is paused before, if it was taken at an interrupt
    pub fn interrupted_at(&self) -> Option<VertexId> {
        self.metadata.get(INTERRUPTED_AT).map(|v| VertexId::new(v.as_str()))
    }

    pub fn pending_message_count(&self) -> usize {
        self.pending_messages.values().map(|v| v.len()).sum()
    }
}

/// Durable storage for checkpoints of one workflow.
#[async_trait]
pub trait Checkpointer<S>: Send + Sync
where
    S: WorkflowState + Send + Sync,
{
    /// Save a checkpoint, replacing any checkpoint at the same superstep.
    async fn save(&self, checkpoint: &Checkpoint<S>) -> Result<(), PregelError>;

    async fn load(&self, superstep: usize) -> Result<Option<Checkpoint<S>>, PregelError>;

    /// Checkpoint with the highest superstep, if any
    async fn latest(&self) -> Result<Option<Checkpoint<S>>, PregelError>;

    /// Superstep numbers with a checkpoint, ascending
    async fn list(&self) -> Result<Vec<usize>, PregelError>;

    async fn delete(&self, superstep: usize) -> Result<(), PregelError>;

    /// Keep only the `keep` most recent checkpoints. Returns how many were removed.
    async fn prune(&self, keep: usize) -> Result<usize, PregelError> {
        let checkpoints = self.list().await?;
        let to_delete = checkpoints.len().saturating_sub(keep);

        for superstep in checkpoints.iter().take(to_delete) {
            self.delete(*superstep).await?;
        }

        Ok(to_delete)
    }

    async fn clear(&self) -> Result<(), PregelError> {
        for superstep in self.list().await? {
            self.delete(superstep).await?;
        }
        Ok(())
    }
}

/// Backend selection for [`create_checkpointer`].
#[derive(Debug, Clone, Default)]
pub enum CheckpointerConfig {
    /// Process-local, lost on exit
    #[default]
    Memory,

    /// One JSON file per checkpoint under `path/<workflow_id>/`
    File {
        path: PathBuf,
        /// Compress with zstd
        compression: bool,
    },
}

/// In-memory checkpointer.
#[derive(Debug, Default)]
pub struct MemoryCheckpointer<S>
where
    S: WorkflowState,
{
    checkpoints: tokio::sync::RwLock<HashMap<usize, Checkpoint<S>>>,
}

impl<S> MemoryCheckpointer<S>
where
    S: WorkflowState,
{
    pub fn new() -> Self {
        Self {
            checkpoints: tokio::sync::RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<S> Checkpointer<S> for MemoryCheckpointer<S>
where
    S: WorkflowState + Clone + Send + Sync,
{
    async fn save(&self, checkpoint: &Checkpoint<S>) -> Result<(), PregelError> {
        let mut checkpoints = self.checkpoints.write().await;
        checkpoints.insert(checkpoint.superstep, checkpoint.clone());
        Ok(())
    }

    async fn load(&self, superstep: usize) -> Result<Option<Checkpoint<S>>, PregelError> {
        let checkpoints = self.checkpoints.read().await;
        Ok(checkpoints.get(&superstep).cloned())
    }

    async fn latest(&self) -> Result<Option<Checkpoint<S>>, PregelError> {
        let checkpoints = self.checkpoints.read().await;
        Ok(checkpoints
            .keys()
            .max()
            .and_then(|superstep| checkpoints.get(superstep).cloned()))
    }

    async fn list(&self) -> Result<Vec<usize>, PregelError> {
        let checkpoints = self.checkpoints.read().await;
        let mut supersteps: Vec<usize> = checkpoints.keys().copied().collect();
        supersteps.sort_unstable();
        Ok(supersteps)
    }

    async fn delete(&self, superstep: usize) -> Result<(), PregelError> {
        self.checkpoints.write().await.remove(&superstep);
        Ok(())
    }
}

/// Build the checkpointer described by `config` for `workflow_id`.
pub fn create_checkpointer<S>(
    config: CheckpointerConfig,
    workflow_id: impl Into<String>,
) -> Box<dyn Checkpointer<S>>
where
    S: WorkflowState + Clone + Send + Sync + Serialize + for<'de> Deserialize<'de> + 'static,
{
    let workflow_id: String = workflow_id.into();

    match config {
        CheckpointerConfig::Memory => Box::new(MemoryCheckpointer::<S>::new()),
        CheckpointerConfig::File { path, compression } => {
            Box::new(FileCheckpointer::new(path, workflow_id, compression))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pregel::state::UnitState;

    fn checkpoint_at(superstep: usize) -> Checkpoint<UnitState> {
        Checkpoint::new("wf", superstep, UnitState, HashMap::new(), HashMap::new())
    }

    #[test]
    fn test_checkpoint_creation() {
        let mut pending = HashMap::new();
        pending.insert(
            VertexId::new("review_personas"),
            vec![WorkflowMessage::Activate, WorkflowMessage::Activate],
        );
        let checkpoint = Checkpoint::new("wf", 5, UnitState, HashMap::new(), pending);

        assert_eq!(checkpoint.workflow_id, "wf");
        assert_eq!(checkpoint.superstep, 5);
        assert_eq!(checkpoint.pending_message_count(), 2);
        assert!(checkpoint.interrupted_at().is_none());
    }

    #[test]
    fn test_interrupted_at_metadata() {
        let checkpoint = checkpoint_at(3).with_metadata(INTERRUPTED_AT, "review_requirements");
        assert_eq!(
            checkpoint.interrupted_at(),
            Some(VertexId::new("review_requirements"))
        );
    }

    #[test]
    fn test_checkpoint_serialization_keeps_retry_counts() {
        let mut retries = HashMap::new();
        retries.insert(VertexId::new("a"), 2);
        let checkpoint = checkpoint_at(1).with_retry_counts(retries);

        let json = serde_json::to_string(&checkpoint).unwrap();
        let back: Checkpoint<UnitState> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.retry_counts.get(&VertexId::new("a")), Some(&2));
    }

    #[tokio::test]
    async fn test_memory_checkpointer_latest_and_list() {
        let checkpointer = MemoryCheckpointer::new();
        for superstep in [4, 1, 9] {
            checkpointer.save(&checkpoint_at(superstep)).await.unwrap();
        }

        assert_eq!(checkpointer.list().await.unwrap(), vec![1, 4, 9]);
        assert_eq!(checkpointer.latest().await.unwrap().unwrap().superstep, 9);
        assert!(checkpointer.load(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_checkpointer_prune_and_clear() {
        let checkpointer = MemoryCheckpointer::new();
        for superstep in 1..=5 {
            checkpointer.save(&checkpoint_at(superstep)).await.unwrap();
        }

        assert_eq!(checkpointer.prune(2).await.unwrap(), 3);
        assert_eq!(checkpointer.list().await.unwrap(), vec![4, 5]);

        checkpointer.clear().await.unwrap();
        assert!(checkpointer.latest().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_memory_checkpointer() {
        let checkpointer = create_checkpointer::<UnitState>(CheckpointerConfig::Memory, "wf");
        checkpointer.save(&checkpoint_at(2)).await.unwrap();
        assert_eq!(checkpointer.list().await.unwrap(), vec![2]);
    }
}
