//! CompiledWorkflow: turns a validated graph into a runnable PregelRuntime
//!
//! # Example
//!
//! ```ignore
//! let graph = WorkflowGraph::<RunState>::new()
//!     .name("report")
//!     .node(Arc::new(RequirementsVertex::new(llm.clone())))
//!     .entry(PROCESS_REQUIREMENTS)
//!     .build()?;
//!
//! let mut workflow = CompiledWorkflow::compile_with_checkpointer(
//!     graph, config, checkpointer, "run-42",
//! );
//! let result = workflow.run(initial_state).await?;
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::pregel::{
    Checkpoint, Checkpointer, CheckpointingRuntime, PregelConfig, PregelError, PregelRuntime,
    SnapshotSender, WorkflowMessage, WorkflowResult, WorkflowState,
};
use crate::workflow::graph::{BuiltWorkflowGraph, END};

/// Plain or checkpointing runtime
enum RuntimeKind<S>
where
    S: WorkflowState + Serialize + for<'de> Deserialize<'de>,
{
    Plain(PregelRuntime<S, WorkflowMessage>),
    Checkpointing(CheckpointingRuntime<S>),
}

/// A compiled workflow ready for execution
pub struct CompiledWorkflow<S>
where
    S: WorkflowState + Serialize + for<'de> Deserialize<'de>,
{
    runtime: RuntimeKind<S>,
    name: String,
}

impl<S> CompiledWorkflow<S>
where
    S: WorkflowState + Serialize + for<'de> Deserialize<'de>,
{
    /// Compile without persistence. Interrupts still pause the run, but it
    /// cannot be resumed.
    pub fn compile(graph: BuiltWorkflowGraph<S>, config: PregelConfig) -> Self {
        let name = graph.name.clone();
        Self {
            runtime: RuntimeKind::Plain(Self::build_runtime(graph, config)),
            name,
        }
    }

    /// Compile with a checkpointer so the run can pause and resume.
    pub fn compile_with_checkpointer(
        graph: BuiltWorkflowGraph<S>,
        config: PregelConfig,
        checkpointer: Arc<dyn Checkpointer<S>>,
        workflow_id: impl Into<String>,
    ) -> Self {
        let name = graph.name.clone();
        let runtime = Self::build_runtime(graph, config).with_workflow_id(workflow_id);
        Self {
            runtime: RuntimeKind::Checkpointing(CheckpointingRuntime::new(runtime, checkpointer)),
            name,
        }
    }

    fn build_runtime(graph: BuiltWorkflowGraph<S>, config: PregelConfig) -> PregelRuntime<S, WorkflowMessage> {
        let mut runtime = PregelRuntime::with_config(config);

        for vertex in graph.nodes.into_values() {
            runtime.add_vertex(vertex);
        }

        for (from, targets) in graph.edges {
            for to in targets {
                if to.as_str() != END {
                    runtime.add_edge(from.clone(), to);
                }
            }
        }

        for vertex in graph.interrupts {
            runtime.interrupt_before(vertex);
        }

        runtime.set_entry(graph.entry_point);
        runtime
    }

    pub async fn run(&mut self, initial_state: S) -> Result<WorkflowResult<S>, PregelError> {
        match &mut self.runtime {
            RuntimeKind::Plain(runtime) => runtime.run(initial_state).await,
            RuntimeKind::Checkpointing(runtime) => runtime.run(initial_state).await,
        }
    }

    /// Continue from the latest checkpoint with `apply` run on its state first.
    pub async fn resume_with<F>(&mut self, apply: F) -> Result<WorkflowResult<S>, PregelError>
    where
        F: FnOnce(S) -> S,
    {
        match &mut self.runtime {
            RuntimeKind::Plain(_) => Err(PregelError::config_error(format!(
                "workflow '{}' was compiled without a checkpointer and cannot resume",
                self.name
            ))),
            RuntimeKind::Checkpointing(runtime) => runtime.resume_with(apply).await,
        }
    }

    pub async fn latest_checkpoint(&self) -> Result<Option<Checkpoint<S>>, PregelError> {
        match &self.runtime {
            RuntimeKind::Plain(_) => Ok(None),
            RuntimeKind::Checkpointing(runtime) => runtime.latest_checkpoint().await,
        }
    }

    pub fn has_checkpointer(&self) -> bool {
        matches!(self.runtime, RuntimeKind::Checkpointing(_))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn workflow_id(&self) -> &str {
        match &self.runtime {
            RuntimeKind::Plain(runtime) => runtime.workflow_id(),
            RuntimeKind::Checkpointing(runtime) => runtime.workflow_id(),
        }
    }

    /// Stream a state snapshot after every superstep.
    pub fn set_snapshot_sender(&mut self, sender: SnapshotSender<S>) {
        match &mut self.runtime {
            RuntimeKind::Plain(runtime) => {
                runtime.set_snapshot_sender(sender);
            }
            RuntimeKind::Checkpointing(runtime) => {
                runtime.inner_mut().set_snapshot_sender(sender);
            }
        }
    }
}
