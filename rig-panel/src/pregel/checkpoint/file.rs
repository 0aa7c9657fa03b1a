//! File-based checkpointer
//!
//! ```text
//! checkpoints/
//! └── {workflow_id}/
//!     ├── checkpoint_00001.json[.zst]
//!     └── checkpoint_00004.json[.zst]
//! ```
//!
//! Writes go to a temporary file that is renamed into place, so a crash
//! never leaves a half-written checkpoint behind.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{Checkpoint, Checkpointer};
use crate::pregel::error::PregelError;
use crate::pregel::state::WorkflowState;

const FILE_PREFIX: &str = "checkpoint_";

/// Stores each checkpoint as a JSON document, optionally zstd-compressed.
#[derive(Debug)]
pub struct FileCheckpointer {
    workflow_path: PathBuf,
    compression: bool,
}

fn storage_error(action: &'static str) -> impl Fn(std::io::Error) -> PregelError {
    move |e| PregelError::checkpoint_error(format!("Failed to {}: {}", action, e))
}

impl FileCheckpointer {
    /// Checkpoints for `workflow_id` live in `base_path/workflow_id/`.
    pub fn new(base_path: impl Into<PathBuf>, workflow_id: impl AsRef<str>, compression: bool) -> Self {
        Self {
            workflow_path: base_path.into().join(workflow_id.as_ref()),
            compression,
        }
    }

    pub fn workflow_path(&self) -> &Path {
        &self.workflow_path
    }

    fn checkpoint_path(&self, superstep: usize) -> PathBuf {
        let extension = if self.compression { "json.zst" } else { "json" };
        self.workflow_path
            .join(format!("{}{:05}.{}", FILE_PREFIX, superstep, extension))
    }

    fn temp_path(&self, superstep: usize) -> PathBuf {
        self.workflow_path
            .join(format!("{}{:05}.tmp", FILE_PREFIX, superstep))
    }

    fn encode(&self, json: Vec<u8>) -> Result<Vec<u8>, PregelError> {
        if !self.compression {
            return Ok(json);
        }
        let mut encoder = zstd::stream::Encoder::new(Vec::new(), 3).map_err(storage_error("start compression"))?;
        encoder.write_all(&json).map_err(storage_error("compress checkpoint"))?;
        encoder.finish().map_err(storage_error("finish compression"))
    }

    fn decode(&self, data: Vec<u8>) -> Result<Vec<u8>, PregelError> {
        if !self.compression {
            return Ok(data);
        }
        zstd::stream::decode_all(data.as_slice()).map_err(storage_error("decompress checkpoint"))
    }

    /// Superstep encoded in a checkpoint file name. Temp files are skipped.
    fn parse_superstep(path: &Path) -> Option<usize> {
        let filename = path.file_name()?.to_str()?;
        let rest = filename.strip_prefix(FILE_PREFIX)?;
        let (number, extension) = rest.split_once('.')?;
        if extension == "tmp" {
            return None;
        }
        number.parse().ok()
    }

    async fn list_supersteps(&self) -> Result<Vec<usize>, PregelError> {
        if !fs::try_exists(&self.workflow_path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut entries = fs::read_dir(&self.workflow_path)
            .await
            .map_err(storage_error("read checkpoint directory"))?;

        let mut supersteps = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(storage_error("read directory entry"))?
        {
            if let Some(superstep) = Self::parse_superstep(&entry.path()) {
                supersteps.push(superstep);
            }
        }

        supersteps.sort_unstable();
        Ok(supersteps)
    }
}

#[async_trait]
impl<S> Checkpointer<S> for FileCheckpointer
where
    S: WorkflowState + Clone + Send + Sync + Serialize + for<'de> Deserialize<'de>,
{
    async fn save(&self, checkpoint: &Checkpoint<S>) -> Result<(), PregelError> {
        fs::create_dir_all(&self.workflow_path)
            .await
            .map_err(storage_error("create checkpoint directory"))?;

        let json = serde_json::to_vec_pretty(checkpoint)
            .map_err(|e| PregelError::checkpoint_error(format!("Serialization failed: {}", e)))?;
        let data = self.encode(json)?;

        let temp_path = self.temp_path(checkpoint.superstep);
        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(storage_error("create temp file"))?;
        file.write_all(&data).await.map_err(storage_error("write checkpoint"))?;
        file.sync_all().await.map_err(storage_error("sync checkpoint"))?;

        fs::rename(&temp_path, self.checkpoint_path(checkpoint.superstep))
            .await
            .map_err(storage_error("move checkpoint into place"))?;

        tracing::debug!(
            workflow_id = %checkpoint.workflow_id,
            superstep = checkpoint.superstep,
            compressed = self.compression,
            "Checkpoint written"
        );
        Ok(())
    }

    async fn load(&self, superstep: usize) -> Result<Option<Checkpoint<S>>, PregelError> {
        let path = self.checkpoint_path(superstep);
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_error("read checkpoint")(e)),
        };

        let json = self.decode(data)?;
        let checkpoint = serde_json::from_slice(&json)
            .map_err(|e| PregelError::checkpoint_error(format!("Deserialization failed: {}", e)))?;
        Ok(Some(checkpoint))
    }

    async fn latest(&self) -> Result<Option<Checkpoint<S>>, PregelError> {
        match self.list_supersteps().await?.last() {
            Some(&superstep) => self.load(superstep).await,
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<usize>, PregelError> {
        self.list_supersteps().await
    }

    async fn delete(&self, superstep: usize) -> Result<(), PregelError> {
        match fs::remove_file(self.checkpoint_path(superstep)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error("delete checkpoint")(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pregel::checkpoint::INTERRUPTED_AT;
    use crate::pregel::message::WorkflowMessage;
    use crate::pregel::state::UnitState;
    use crate::pregel::vertex::{VertexId, VertexState};
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn checkpoint_at(superstep: usize) -> Checkpoint<UnitState> {
        Checkpoint::new("wf", superstep, UnitState, HashMap::new(), HashMap::new())
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let checkpointer = FileCheckpointer::new(dir.path(), "wf", false);

        let mut pending = HashMap::new();
        pending.insert(VertexId::new("review_requirements"), vec![WorkflowMessage::Activate]);
        let checkpoint = Checkpoint::new("wf", 2, UnitState, HashMap::new(), pending)
            .with_metadata(INTERRUPTED_AT, "review_requirements");

        checkpointer.save(&checkpoint).await.unwrap();
        let loaded: Checkpoint<UnitState> = checkpointer.load(2).await.unwrap().unwrap();

        assert_eq!(loaded.superstep, 2);
        assert_eq!(loaded.pending_message_count(), 1);
        assert_eq!(
            loaded.interrupted_at(),
            Some(VertexId::new("review_requirements"))
        );
        assert!(dir.path().join("wf/checkpoint_00002.json").exists());
    }

    #[tokio::test]
    async fn test_compressed_checkpoint() {
        let dir = tempdir().unwrap();
        let checkpointer = FileCheckpointer::new(dir.path(), "zipped", true);

        let mut vertex_states = HashMap::new();
        vertex_states.insert(VertexId::new("a"), VertexState::Active);
        vertex_states.insert(VertexId::new("b"), VertexState::Halted);
        let checkpoint = Checkpoint::new("zipped", 10, UnitState, vertex_states, HashMap::new());

        checkpointer.save(&checkpoint).await.unwrap();
        assert!(dir.path().join("zipped/checkpoint_00010.json.zst").exists());

        let loaded: Checkpoint<UnitState> = checkpointer.load(10).await.unwrap().unwrap();
        assert_eq!(loaded.vertex_states.len(), 2);
    }

    #[tokio::test]
    async fn test_load_missing_returns_none() {
        let dir = tempdir().unwrap();
        let checkpointer = FileCheckpointer::new(dir.path(), "wf", false);

        let loaded: Option<Checkpoint<UnitState>> = checkpointer.load(999).await.unwrap();
        assert!(loaded.is_none());
        let latest: Option<Checkpoint<UnitState>> = checkpointer.latest().await.unwrap();
        assert!(latest.is_none());
    }

    #[tokio::test]
    async fn test_list_latest_delete() {
        let dir = tempdir().unwrap();
        let checkpointer = FileCheckpointer::new(dir.path(), "wf", false);

        for superstep in [5, 1, 10] {
            checkpointer.save(&checkpoint_at(superstep)).await.unwrap();
        }

        let list = <FileCheckpointer as Checkpointer<UnitState>>::list(&checkpointer)
            .await
            .unwrap();
        assert_eq!(list, vec![1, 5, 10]);

        let latest: Checkpoint<UnitState> = checkpointer.latest().await.unwrap().unwrap();
        assert_eq!(latest.superstep, 10);

        <FileCheckpointer as Checkpointer<UnitState>>::delete(&checkpointer, 10)
            .await
            .unwrap();
        let latest: Checkpoint<UnitState> = checkpointer.latest().await.unwrap().unwrap();
        assert_eq!(latest.superstep, 5);

        // deleting twice is fine
        <FileCheckpointer as Checkpointer<UnitState>>::delete(&checkpointer, 10)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_prune_keeps_most_recent() {
        let dir = tempdir().unwrap();
        let checkpointer = FileCheckpointer::new(dir.path(), "wf", true);

        for superstep in 1..=4 {
            checkpointer.save(&checkpoint_at(superstep)).await.unwrap();
        }

        let removed = <FileCheckpointer as Checkpointer<UnitState>>::prune(&checkpointer, 1)
            .await
            .unwrap();
        assert_eq!(removed, 3);
        let list = <FileCheckpointer as Checkpointer<UnitState>>::list(&checkpointer)
            .await
            .unwrap();
        assert_eq!(list, vec![4]);
    }

    #[test]
    fn test_parse_superstep() {
        assert_eq!(
            FileCheckpointer::parse_superstep(Path::new("checkpoint_00042.json")),
            Some(42)
        );
        assert_eq!(
            FileCheckpointer::parse_superstep(Path::new("checkpoint_00007.json.zst")),
            Some(7)
        );
        assert_eq!(FileCheckpointer::parse_superstep(Path::new("checkpoint_00007.tmp")), None);
        assert_eq!(FileCheckpointer::parse_superstep(Path::new("notes.txt")), None);
    }
}
