//! Workflow graph construction on top of the Pregel runtime
//!
//! ```ignore
//! let graph = WorkflowGraph::<MyState>::new()
//!     .name("pipeline")
//!     .node(Arc::new(Planner::new(llm.clone())))
//!     .node(Arc::new(Reviewer::new()))
//!     .entry("planner")
//!     .edge("planner", "reviewer")
//!     .branches("reviewer", &["planner", "writer"])
//!     .interrupt_before("reviewer")
//!     .build()?;
//! ```

pub mod compiled;
pub mod graph;

pub use compiled::CompiledWorkflow;
pub use graph::{BuiltWorkflowGraph, WorkflowBuildError, WorkflowGraph, END};
