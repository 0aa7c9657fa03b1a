//! Pregel-style execution engine
//!
//! Workflows are graphs of [`Vertex`] implementations that run in
//! synchronized supersteps over a shared [`WorkflowState`].
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//! │ Deliver  │ → │ Compute  │ → │ Collect  │ → │  Route   │
//! └──────────┘   └──────────┘   └──────────┘   └──────────┘
//! ```

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod message;
pub mod runtime;
pub mod state;
pub mod vertex;

pub use checkpoint::{
    create_checkpointer, Checkpoint, Checkpointer, CheckpointerConfig, FileCheckpointer,
    MemoryCheckpointer, INTERRUPTED_AT,
};
pub use config::{PregelConfig, RetryPolicy};
pub use error::PregelError;
pub use message::{VertexMessage, WorkflowMessage};
pub use runtime::{CheckpointingRuntime, PregelRuntime, SnapshotSender, WorkflowResult};
pub use state::{UnitState, UnitUpdate, WorkflowState};
pub use vertex::{BoxedVertex, ComputeContext, ComputeResult, StateUpdate, Vertex, VertexId, VertexState};
