//! Vertex (node) abstractions for the Pregel runtime
//!
//! A vertex is one named step of a workflow graph. Vertices read the shared
//! workflow state, exchange messages, and execute in synchronized supersteps.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::error::PregelError;
use super::message::VertexMessage;
use super::state::WorkflowState;

/// Unique identifier for a vertex in the workflow graph
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VertexId(pub String);

impl VertexId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VertexId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for VertexId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&VertexId> for VertexId {
    fn from(id: &VertexId) -> Self {
        id.clone()
    }
}

impl std::fmt::Display for VertexId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Vertex execution state ("vote to halt")
///
/// - `Active`: computes in the next superstep
/// - `Halted`: sleeps until a message arrives
/// - `Completed`: finished, never reactivates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VertexState {
    #[default]
    Active,
    Halted,
    Completed,
}

impl VertexState {
    pub fn is_active(&self) -> bool {
        matches!(self, VertexState::Active)
    }

    pub fn is_halted(&self) -> bool {
        matches!(self, VertexState::Halted)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, VertexState::Completed)
    }
}

/// State delta produced by a vertex computation.
///
/// Deltas from all vertices of a superstep are merged and applied together
/// once the superstep finishes.
pub trait StateUpdate: Clone + Send + Sync + 'static {
    /// The no-op update
    fn empty() -> Self;

    fn is_empty(&self) -> bool;
}

/// Per-computation context handed to a vertex.
///
/// Holds the inbox for this superstep, a read-only view of the workflow
/// state, and an outbox whose contents are delivered next superstep.
pub struct ComputeContext<'a, S, M: VertexMessage> {
    /// Messages delivered to this vertex for the current superstep
    pub messages: &'a [M],
    /// Current superstep number (0-indexed)
    pub superstep: usize,
    /// Workflow state as of the start of the superstep
    pub state: &'a S,
    outbox: HashMap<VertexId, Vec<M>>,
    vertex_id: VertexId,
}

impl<'a, S, M: VertexMessage> ComputeContext<'a, S, M> {
    pub fn new(vertex_id: VertexId, messages: &'a [M], superstep: usize, state: &'a S) -> Self {
        Self {
            messages,
            superstep,
            state,
            outbox: HashMap::new(),
            vertex_id,
        }
    }

    pub fn id(&self) -> &VertexId {
        &self.vertex_id
    }

    /// Queue a message for `target`, delivered at the start of the next superstep.
    pub fn send_message(&mut self, target: impl Into<VertexId>, message: M) {
        self.outbox.entry(target.into()).or_default().push(message);
    }

    /// Wake `target` next superstep without a payload.
    pub fn activate(&mut self, target: impl Into<VertexId>) {
        self.send_message(target, M::activation_message());
    }

    pub fn has_messages(&self) -> bool {
        !self.messages.is_empty()
    }

    /// Consume the context and return the outbox
    pub fn into_outbox(self) -> HashMap<VertexId, Vec<M>> {
        self.outbox
    }
}

/// The core vertex trait.
///
/// Active vertices have `compute` called once per superstep. The returned
/// [`ComputeResult`] carries the state delta and the vertex's next state.
///
/// ```ignore
/// struct Forward { id: VertexId }
///
/// #[async_trait]
/// impl Vertex<MyState, WorkflowMessage> for Forward {
///     fn id(&self) -> &VertexId {
///         &self.id
///     }
///
///     async fn compute(
///         &self,
///         ctx: &mut ComputeContext<'_, MyState, WorkflowMessage>,
///     ) -> Result<ComputeResult<MyUpdate>, PregelError> {
///         ctx.activate("next");
///         Ok(ComputeResult::halt(MyUpdate::empty()))
///     }
/// }
/// ```
#[async_trait]
pub trait Vertex<S, M>: Send + Sync
where
    S: WorkflowState,
    M: VertexMessage,
{
    fn id(&self) -> &VertexId;

    async fn compute(
        &self,
        ctx: &mut ComputeContext<'_, S, M>,
    ) -> Result<ComputeResult<S::Update>, PregelError>;

    /// State to adopt when messages arrive while halted. Defaults to `Active`.
    fn on_reactivation(&self, _messages: &[M]) -> VertexState {
        VertexState::Active
    }
}

/// Result of a vertex computation
#[derive(Debug, Clone)]
pub struct ComputeResult<U: StateUpdate> {
    pub update: U,
    pub state: VertexState,
}

impl<U: StateUpdate> ComputeResult<U> {
    /// Stay active for the next superstep
    pub fn active(update: U) -> Self {
        Self {
            update,
            state: VertexState::Active,
        }
    }

    /// Vote to halt, which also activates edge targets
    pub fn halt(update: U) -> Self {
        Self {
            update,
            state: VertexState::Halted,
        }
    }

    /// Finish for good
    pub fn complete(update: U) -> Self {
        Self {
            update,
            state: VertexState::Completed,
        }
    }
}

/// Boxed vertex for dynamic dispatch
pub type BoxedVertex<S, M> = Arc<dyn Vertex<S, M>>;
