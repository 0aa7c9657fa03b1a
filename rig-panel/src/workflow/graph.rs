//! WorkflowGraph builder DSL.
//!
//! Nodes are vertex implementations keyed by their own id. Static edges drive
//! activation; branch targets are declared so the builder
//! can validate them, but the vertex itself decides at runtime which branch
//! to wake.

use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;

use thiserror::Error;

use crate::pregel::{BoxedVertex, VertexId, WorkflowMessage, WorkflowState};

/// Sentinel target for terminal edges.
pub const END: &str = "END";

/// Errors that can occur while building a workflow graph.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowBuildError {
    #[error("workflow entry point not set")]
    NoEntryPoint,
    #[error("unknown node id: {0}")]
    UnknownNode(String),
}

/// Builder for constructing workflow graphs with fluent API.
pub struct WorkflowGraph<S: WorkflowState> {
    name: String,
    nodes: HashMap<VertexId, BoxedVertex<S, WorkflowMessage>>,
    edges: Vec<(VertexId, VertexId)>,
    branches: Vec<(VertexId, VertexId)>,
    interrupts: HashSet<VertexId>,
    entry_point: Option<VertexId>,
    _state: PhantomData<S>,
}

impl<S: WorkflowState> Default for WorkflowGraph<S> {
    fn default() -> Self {
        Self {
            name: String::new(),
            nodes: HashMap::new(),
            edges: Vec::new(),
            branches: Vec::new(),
            interrupts: HashSet::new(),
            entry_point: None,
            _state: PhantomData,
        }
    }
}

impl<S: WorkflowState> WorkflowGraph<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add a node; it is keyed by `vertex.id()`.
    pub fn node(mut self, vertex: BoxedVertex<S, WorkflowMessage>) -> Self {
        self.nodes.insert(vertex.id().clone(), vertex);
        self
    }

    pub fn entry(mut self, id: impl Into<VertexId>) -> Self {
        self.entry_point = Some(id.into());
        self
    }

    /// Add a static edge. `to` may be [`END`].
    pub fn edge(mut self, from: impl Into<VertexId>, to: impl Into<VertexId>) -> Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    /// Declare the nodes `from` may route to at runtime.
    pub fn branches(mut self, from: impl Into<VertexId>, targets: &[&str]) -> Self {
        let from = from.into();
        for target in targets {
            self.branches.push((from.clone(), VertexId::new(*target)));
        }
        self
    }

    /// Pause the run before `id` computes.
    pub fn interrupt_before(mut self, id: impl Into<VertexId>) -> Self {
        self.interrupts.insert(id.into());
        self
    }

    fn check_known(&self, id: &VertexId) -> Result<(), WorkflowBuildError> {
        if id.as_str() == END || self.nodes.contains_key(id) {
            Ok(())
        } else {
            Err(WorkflowBuildError::UnknownNode(id.to_string()))
        }
    }

    /// Validate and build the workflow graph.
    pub fn build(self) -> Result<BuiltWorkflowGraph<S>, WorkflowBuildError> {
        let entry_point = self.entry_point.clone().ok_or(WorkflowBuildError::NoEntryPoint)?;
        if !self.nodes.contains_key(&entry_point) {
            return Err(WorkflowBuildError::UnknownNode(entry_point.to_string()));
        }

        for (from, to) in self.edges.iter().chain(&self.branches) {
            if !self.nodes.contains_key(from) {
                return Err(WorkflowBuildError::UnknownNode(from.to_string()));
            }
            self.check_known(to)?;
        }
        for id in &self.interrupts {
            if !self.nodes.contains_key(id) {
                return Err(WorkflowBuildError::UnknownNode(id.to_string()));
            }
        }

        let mut edges: HashMap<VertexId, Vec<VertexId>> = HashMap::new();
        for (from, to) in self.edges {
            edges.entry(from).or_default().push(to);
        }

        Ok(BuiltWorkflowGraph {
            nodes: self.nodes,
            edges,
            interrupts: self.interrupts,
            entry_point,
            name: self.name,
        })
    }
}

/// Validated workflow graph.
pub struct BuiltWorkflowGraph<S: WorkflowState> {
    pub nodes: HashMap<VertexId, BoxedVertex<S, WorkflowMessage>>,
    pub edges: HashMap<VertexId, Vec<VertexId>>,
    pub interrupts: HashSet<VertexId>,
    pub entry_point: VertexId,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pregel::{ComputeContext, ComputeResult, PregelError, UnitState, UnitUpdate, Vertex};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Noop(VertexId);

    #[async_trait]
    impl Vertex<UnitState, WorkflowMessage> for Noop {
        fn id(&self) -> &VertexId {
            &self.0
        }

        async fn compute(
            &self,
            _ctx: &mut ComputeContext<'_, UnitState, WorkflowMessage>,
        ) -> Result<ComputeResult<UnitUpdate>, PregelError> {
            Ok(ComputeResult::halt(UnitUpdate))
        }
    }

    fn noop(id: &str) -> BoxedVertex<UnitState, WorkflowMessage> {
        Arc::new(Noop(VertexId::new(id)))
    }

    #[test]
    fn test_workflow_builder_basic() {
        let workflow = WorkflowGraph::<UnitState>::new()
            .name("basic")
            .node(noop("start"))
            .node(noop("next"))
            .entry("start")
            .edge("start", "next")
            .edge("next", END)
            .build()
            .unwrap();

        assert_eq!(workflow.name, "basic");
        assert_eq!(workflow.entry_point, VertexId::new("start"));
        assert_eq!(
            workflow.edges.get(&VertexId::new("start")),
            Some(&vec![VertexId::new("next")])
        );
    }

    #[test]
    fn test_workflow_builder_missing_entry() {
        let result = WorkflowGraph::<UnitState>::new().node(noop("start")).build();
        assert_eq!(result.err(), Some(WorkflowBuildError::NoEntryPoint));
    }

    #[test]
    fn test_workflow_builder_invalid_edge() {
        let result = WorkflowGraph::<UnitState>::new()
            .node(noop("start"))
            .entry("start")
            .edge("start", "missing")
            .build();

        assert_eq!(
            result.err(),
            Some(WorkflowBuildError::UnknownNode("missing".to_string()))
        );
    }

    #[test]
    fn test_branches_are_validated_but_not_wired() {
        let workflow = WorkflowGraph::<UnitState>::new()
            .node(noop("review"))
            .node(noop("a"))
            .node(noop("b"))
            .entry("review")
            .branches("review", &["a", "b"])
            .interrupt_before("review")
            .build()
            .unwrap();

        assert!(workflow.edges.is_empty());
        assert!(workflow.interrupts.contains(&VertexId::new("review")));

        let bad = WorkflowGraph::<UnitState>::new()
            .node(noop("review"))
            .entry("review")
            .branches("review", &["nowhere"])
            .build();
        assert_eq!(bad.err(), Some(WorkflowBuildError::UnknownNode("nowhere".into())));
    }

    #[test]
    fn test_unknown_interrupt_rejected() {
        let result = WorkflowGraph::<UnitState>::new()
            .node(noop("start"))
            .entry("start")
            .interrupt_before("ghost")
            .build();
        assert_eq!(result.err(), Some(WorkflowBuildError::UnknownNode("ghost".into())));
    }
}
