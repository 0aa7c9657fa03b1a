//! Pregel Runtime - execution engine for workflow graphs
//!
//! The runtime executes workflows through synchronized supersteps.
//! Each superstep follows the sequence: Deliver → Compute → Collect → Route.
//!
//! Vertices listed as pause-before interrupts stop the run *before* the
//! superstep in which they would compute. The caller gets the current state
//! back and continues later through [`CheckpointingRuntime::resume_with`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::timeout;

use super::checkpoint::{Checkpoint, Checkpointer, INTERRUPTED_AT};
use super::config::PregelConfig;
use super::error::PregelError;
use super::message::{VertexMessage, WorkflowMessage};
use super::state::WorkflowState;
use super::vertex::{BoxedVertex, ComputeContext, ComputeResult, VertexId, VertexState};

/// Sender half for per-superstep state snapshots
pub type SnapshotSender<S> = mpsc::UnboundedSender<(usize, S)>;

/// Result of a workflow execution
#[derive(Debug, Clone)]
pub struct WorkflowResult<S: WorkflowState> {
    pub state: S,
    /// Supersteps executed so far, including those before a resume
    pub supersteps: usize,
    /// True when the run reached a terminal state or went quiet
    pub completed: bool,
    /// Set when the run paused before this vertex
    pub interrupted: Option<VertexId>,
    pub vertex_states: HashMap<VertexId, VertexState>,
}

/// Outcome of a single vertex computation inside a superstep
type VertexOutcome<U, M> = (
    VertexId,
    Result<ComputeResult<U>, PregelError>,
    HashMap<VertexId, Vec<M>>,
);

/// Pregel Runtime for executing workflow graphs
pub struct PregelRuntime<S, M>
where
    S: WorkflowState,
    M: VertexMessage,
{
    config: PregelConfig,
    vertices: HashMap<VertexId, BoxedVertex<S, M>>,
    vertex_states: HashMap<VertexId, VertexState>,
    /// Messages delivered at the start of the next superstep
    message_queues: HashMap<VertexId, Vec<M>>,
    /// Static edges, followed when their source halts
    edges: HashMap<VertexId, Vec<VertexId>>,
    retry_counts: HashMap<VertexId, usize>,
    entry_vertex: Option<VertexId>,
    workflow_id: String,
    interrupt_before: HashSet<VertexId>,
    /// Interrupts waived for the next superstep only
    released: HashSet<VertexId>,
    snapshots: Option<SnapshotSender<S>>,
}

impl<S, M> PregelRuntime<S, M>
where
    S: WorkflowState,
    M: VertexMessage,
{
    pub fn new() -> Self {
        Self::with_config(PregelConfig::default())
    }

    pub fn with_config(config: PregelConfig) -> Self {
        Self {
            config,
            vertices: HashMap::new(),
            vertex_states: HashMap::new(),
            message_queues: HashMap::new(),
            edges: HashMap::new(),
            retry_counts: HashMap::new(),
            entry_vertex: None,
            workflow_id: uuid::Uuid::new_v4().to_string(),
            interrupt_before: HashSet::new(),
            released: HashSet::new(),
            snapshots: None,
        }
    }

    /// Set the workflow ID used to key checkpoints
    pub fn with_workflow_id(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = workflow_id.into();
        self
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn add_vertex(&mut self, vertex: BoxedVertex<S, M>) -> &mut Self {
        let id = vertex.id().clone();
        // only the entry vertex starts active
        self.vertex_states.insert(id.clone(), VertexState::Halted);
        self.message_queues.insert(id.clone(), Vec::new());
        self.vertices.insert(id, vertex);
        self
    }

    pub fn add_edge(&mut self, from: impl Into<VertexId>, to: impl Into<VertexId>) -> &mut Self {
        self.edges.entry(from.into()).or_default().push(to.into());
        self
    }

    /// Set the entry vertex, the only one active in the first superstep.
    pub fn set_entry(&mut self, entry: impl Into<VertexId>) -> &mut Self {
        let entry_id = entry.into();
        for state in self.vertex_states.values_mut() {
            *state = VertexState::Halted;
        }
        if let Some(state) = self.vertex_states.get_mut(&entry_id) {
            *state = VertexState::Active;
        }
        self.entry_vertex = Some(entry_id);
        self
    }

    /// Pause the run before `vertex` computes.
    pub fn interrupt_before(&mut self, vertex: impl Into<VertexId>) -> &mut Self {
        self.interrupt_before.insert(vertex.into());
        self
    }

    /// Let `vertex` run once even though it is an interrupt point.
    pub fn release(&mut self, vertex: impl Into<VertexId>) -> &mut Self {
        self.released.insert(vertex.into());
        self
    }

    /// Stream `(superstep, state)` after every executed superstep.
    pub fn set_snapshot_sender(&mut self, sender: SnapshotSender<S>) -> &mut Self {
        self.snapshots = Some(sender);
        self
    }

    pub fn config(&self) -> &PregelConfig {
        &self.config
    }

    pub fn vertex_states(&self) -> &HashMap<VertexId, VertexState> {
        &self.vertex_states
    }

    /// Run the workflow until it completes, pauses, or fails.
    ///
    /// The whole run is bounded by `workflow_timeout`.
    pub async fn run(&mut self, initial_state: S) -> Result<WorkflowResult<S>, PregelError> {
        let workflow_timeout = self.config.workflow_timeout;
        match timeout(workflow_timeout, self.run_inner(initial_state)).await {
            Ok(result) => result,
            Err(_) => Err(PregelError::WorkflowTimeout(workflow_timeout)),
        }
    }

    async fn run_inner(&mut self, initial_state: S) -> Result<WorkflowResult<S>, PregelError> {
        let mut state = initial_state;
        let mut superstep = 0;

        loop {
            if superstep >= self.config.max_supersteps {
                return Err(PregelError::MaxSuperstepsExceeded(superstep));
            }

            if self.should_terminate(&state) {
                return Ok(self.finished(state, superstep));
            }

            if let Some(vertex) = self.pending_interrupt() {
                tracing::info!(workflow_id = %self.workflow_id, %vertex, superstep, "Paused before vertex");
                return Ok(self.paused(state, superstep, vertex));
            }

            let updates = self.execute_superstep(superstep, &state).await?;
            state = state.apply_updates(updates);
            superstep += 1;
            self.publish_snapshot(superstep, &state);
        }
    }

    pub(crate) fn finished(&self, state: S, supersteps: usize) -> WorkflowResult<S> {
        WorkflowResult {
            state,
            supersteps,
            completed: true,
            interrupted: None,
            vertex_states: self.vertex_states.clone(),
        }
    }

    pub(crate) fn paused(&self, state: S, supersteps: usize, vertex: VertexId) -> WorkflowResult<S> {
        WorkflowResult {
            state,
            supersteps,
            completed: false,
            interrupted: Some(vertex),
            vertex_states: self.vertex_states.clone(),
        }
    }

    pub(crate) fn publish_snapshot(&mut self, superstep: usize, state: &S) {
        if let Some(sender) = &self.snapshots {
            if sender.send((superstep, state.clone())).is_err() {
                // receiver dropped
                self.snapshots = None;
            }
        }
    }

    /// Terminal state, or nothing active and nothing in flight
    pub(crate) fn should_terminate(&self, state: &S) -> bool {
        if state.is_terminal() {
            return true;
        }

        let all_inactive = self.vertex_states.values().all(|s| !s.is_active());
        let no_pending_messages = self.message_queues.values().all(|q| q.is_empty());

        all_inactive && no_pending_messages
    }

    /// Whether `vertex` would compute if the next superstep started now
    fn would_compute(&self, vertex: &VertexId) -> bool {
        match self.vertex_states.get(vertex) {
            Some(VertexState::Active) => true,
            Some(VertexState::Halted) => self
                .message_queues
                .get(vertex)
                .is_some_and(|queue| !queue.is_empty()),
            _ => false,
        }
    }

    /// First (by id) unreleased interrupt vertex that is about to compute
    pub(crate) fn pending_interrupt(&self) -> Option<VertexId> {
        self.interrupt_before
            .iter()
            .filter(|id| !self.released.contains(*id) && self.would_compute(id))
            .min()
            .cloned()
    }

    pub(crate) async fn execute_superstep(
        &mut self,
        superstep: usize,
        state: &S,
    ) -> Result<Vec<S::Update>, PregelError> {
        let inboxes = self.deliver_messages();

        for (vertex_id, messages) in &inboxes {
            if messages.is_empty() {
                continue;
            }
            if let (Some(vertex_state), Some(vertex)) =
                (self.vertex_states.get_mut(vertex_id), self.vertices.get(vertex_id))
            {
                if vertex_state.is_halted() {
                    *vertex_state = vertex.on_reactivation(messages);
                }
            }
        }

        let (updates, outboxes, newly_halted) = self.compute_vertices(superstep, state, &inboxes).await?;

        self.route_messages(outboxes);
        self.route_edge_messages(&newly_halted);
        self.released.clear();

        Ok(updates)
    }

    fn deliver_messages(&mut self) -> HashMap<VertexId, Vec<M>> {
        self.message_queues
            .iter_mut()
            .map(|(vertex_id, queue)| (vertex_id.clone(), std::mem::take(queue)))
            .collect()
    }

    /// Compute all active vertices in parallel.
    ///
    /// Returns the updates, each vertex's outbox, and the vertices that halted.
    #[allow(clippy::type_complexity)]
    async fn compute_vertices(
        &mut self,
        superstep: usize,
        state: &S,
        inboxes: &HashMap<VertexId, Vec<M>>,
    ) -> Result<(Vec<S::Update>, Vec<HashMap<VertexId, Vec<M>>>, Vec<VertexId>), PregelError> {
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism));
        let vertex_timeout = self.config.vertex_timeout;

        let mut active_vertices: Vec<VertexId> = self
            .vertex_states
            .iter()
            .filter(|(_, s)| s.is_active())
            .map(|(id, _)| id.clone())
            .collect();
        active_vertices.sort();

        let mut handles = Vec::with_capacity(active_vertices.len());
        for vertex_id in active_vertices {
            let Some(vertex) = self.vertices.get(&vertex_id).map(Arc::clone) else {
                continue;
            };
            let messages = inboxes.get(&vertex_id).cloned().unwrap_or_default();
            let state = state.clone();
            let semaphore = Arc::clone(&semaphore);

            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        let err = PregelError::vertex_error(vertex_id.clone(), "scheduler closed");
                        return (vertex_id, Err(err), HashMap::new());
                    }
                };

                let mut ctx = ComputeContext::new(vertex_id.clone(), &messages, superstep, &state);
                let result = match timeout(vertex_timeout, vertex.compute(&mut ctx)).await {
                    Ok(result) => result,
                    Err(_) => Err(PregelError::VertexTimeout(vertex_id.clone())),
                };
                let outcome: VertexOutcome<S::Update, M> = (vertex_id, result, ctx.into_outbox());
                outcome
            }));
        }

        let mut updates = Vec::new();
        let mut outboxes = Vec::new();
        let mut new_vertex_states = HashMap::new();
        let mut newly_halted = Vec::new();

        for handle in handles {
            let (vid, result, outbox) = handle.await.map_err(|e| {
                PregelError::vertex_error_with_source(
                    "unknown",
                    "task join error",
                    std::io::Error::other(e.to_string()),
                )
            })?;

            match result {
                Ok(compute_result) => {
                    self.retry_counts.remove(&vid);
                    updates.push(compute_result.update);
                    if compute_result.state.is_halted() {
                        newly_halted.push(vid.clone());
                    }
                    new_vertex_states.insert(vid, compute_result.state);
                    outboxes.push(outbox);
                }
                Err(e) if e.is_recoverable() => {
                    let retry_count = self.retry_counts.entry(vid.clone()).or_insert(0);

                    if self.config.retry_policy.should_retry(*retry_count) {
                        let delay = self.config.retry_policy.delay_for_attempt(*retry_count);
                        *retry_count += 1;
                        tracing::warn!(vertex = %vid, attempt = *retry_count, error = %e, "Retrying vertex");
                        tokio::time::sleep(delay).await;

                        // the failed attempt consumed its inbox; hand it back
                        if let Some(messages) = inboxes.get(&vid) {
                            self.message_queues
                                .entry(vid.clone())
                                .or_default()
                                .extend(messages.iter().cloned());
                        }
                        new_vertex_states.insert(vid, VertexState::Active);
                    } else if *retry_count > 0 {
                        return Err(PregelError::MaxRetriesExceeded {
                            vertex_id: vid,
                            attempts: *retry_count + 1,
                            last: Box::new(e),
                        });
                    } else {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        self.vertex_states.extend(new_vertex_states);

        Ok((updates, outboxes, newly_halted))
    }

    fn route_messages(&mut self, outboxes: Vec<HashMap<VertexId, Vec<M>>>) {
        for outbox in outboxes {
            for (target, messages) in outbox {
                match self.message_queues.get_mut(&target) {
                    Some(queue) => queue.extend(messages),
                    None => tracing::warn!(%target, "Dropping messages for unknown vertex"),
                }
            }
        }
    }

    /// A halting vertex activates its static edge targets
    fn route_edge_messages(&mut self, newly_halted: &[VertexId]) {
        for source_id in newly_halted {
            let Some(targets) = self.edges.get(source_id) else {
                continue;
            };
            for target_id in targets {
                if let Some(queue) = self.message_queues.get_mut(target_id) {
                    queue.push(M::activation_message());
                }
            }
        }
    }
}

impl<S, M> Default for PregelRuntime<S, M>
where
    S: WorkflowState,
    M: VertexMessage,
{
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Checkpointing Support (WorkflowMessage-specialized)
// =============================================================================

/// Runtime that persists checkpoints and can continue from them.
///
/// Specialized for `WorkflowMessage` because checkpoints store pending
/// messages in serialized form.
pub struct CheckpointingRuntime<S>
where
    S: WorkflowState + serde::Serialize + for<'de> serde::Deserialize<'de>,
{
    pub runtime: PregelRuntime<S, WorkflowMessage>,
    checkpointer: Arc<dyn Checkpointer<S>>,
}

impl<S> CheckpointingRuntime<S>
where
    S: WorkflowState + serde::Serialize + for<'de> serde::Deserialize<'de>,
{
    pub fn new(
        runtime: PregelRuntime<S, WorkflowMessage>,
        checkpointer: Arc<dyn Checkpointer<S>>,
    ) -> Self {
        Self {
            runtime,
            checkpointer,
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.runtime.workflow_id
    }

    /// Run from superstep 0, saving checkpoints at the configured interval,
    /// at every interrupt, and on completion.
    pub async fn run(&mut self, initial_state: S) -> Result<WorkflowResult<S>, PregelError> {
        self.run_from_superstep(initial_state, 0).await
    }

    async fn run_from_superstep(
        &mut self,
        initial_state: S,
        start_superstep: usize,
    ) -> Result<WorkflowResult<S>, PregelError> {
        let workflow_timeout = self.runtime.config.workflow_timeout;

        match timeout(workflow_timeout, self.run_inner_from(initial_state, start_superstep)).await {
            Ok(result) => result,
            Err(_) => Err(PregelError::WorkflowTimeout(workflow_timeout)),
        }
    }

    async fn run_inner_from(
        &mut self,
        initial_state: S,
        start_superstep: usize,
    ) -> Result<WorkflowResult<S>, PregelError> {
        let mut state = initial_state;
        let mut superstep = start_superstep;

        loop {
            if superstep >= self.runtime.config.max_supersteps {
                return Err(PregelError::MaxSuperstepsExceeded(superstep));
            }

            if self.runtime.should_terminate(&state) {
                self.save_checkpoint(self.create_checkpoint(superstep, &state)).await?;
                return Ok(self.runtime.finished(state, superstep));
            }

            if let Some(vertex) = self.runtime.pending_interrupt() {
                let checkpoint = self
                    .create_checkpoint(superstep, &state)
                    .with_metadata(INTERRUPTED_AT, vertex.as_str());
                self.save_checkpoint(checkpoint).await?;
                tracing::info!(
                    workflow_id = %self.runtime.workflow_id,
                    %vertex,
                    superstep,
                    "Paused before vertex"
                );
                return Ok(self.runtime.paused(state, superstep, vertex));
            }

            let updates = self.runtime.execute_superstep(superstep, &state).await?;
            state = state.apply_updates(updates);
            superstep += 1;
            self.runtime.publish_snapshot(superstep, &state);

            if self.runtime.config.should_checkpoint(superstep) {
                self.save_checkpoint(self.create_checkpoint(superstep, &state)).await?;
            }
        }
    }

    /// Continue from the latest checkpoint after applying `apply` to its state.
    ///
    /// If the checkpoint was taken at an interrupt, that vertex is released
    /// for one superstep so the run moves past it.
    pub async fn resume_with<F>(&mut self, apply: F) -> Result<WorkflowResult<S>, PregelError>
    where
        F: FnOnce(S) -> S,
    {
        let checkpoint = self
            .checkpointer
            .latest()
            .await?
            .ok_or_else(|| PregelError::NothingToResume(self.runtime.workflow_id.clone()))?;
        self.run_from_checkpoint(checkpoint, apply).await
    }

    /// Continue from a specific checkpoint.
    pub async fn run_from_checkpoint<F>(
        &mut self,
        checkpoint: Checkpoint<S>,
        apply: F,
    ) -> Result<WorkflowResult<S>, PregelError>
    where
        F: FnOnce(S) -> S,
    {
        self.restore_from_checkpoint(&checkpoint)?;
        if let Some(vertex) = checkpoint.interrupted_at() {
            self.runtime.release(vertex);
        }
        let state = apply(checkpoint.state);
        self.run_from_superstep(state, checkpoint.superstep).await
    }

    /// Latest saved checkpoint without restoring it
    pub async fn latest_checkpoint(&self) -> Result<Option<Checkpoint<S>>, PregelError> {
        self.checkpointer.latest().await
    }

    /// Restore vertex states, message queues and retry counts.
    ///
    /// Fails when the checkpoint belongs to another workflow or names
    /// vertices this runtime does not have.
    fn restore_from_checkpoint(&mut self, checkpoint: &Checkpoint<S>) -> Result<(), PregelError> {
        if checkpoint.workflow_id != self.runtime.workflow_id {
            return Err(PregelError::checkpoint_mismatch(
                &self.runtime.workflow_id,
                &checkpoint.workflow_id,
            ));
        }

        let unknown: Vec<_> = checkpoint
            .vertex_states
            .keys()
            .filter(|vid| !self.runtime.vertices.contains_key(*vid))
            .collect();
        if !unknown.is_empty() {
            return Err(PregelError::checkpoint_error(format!(
                "Checkpoint contains vertices not present in current runtime: {:?}",
                unknown
            )));
        }

        let missing: Vec<_> = self
            .runtime
            .vertices
            .keys()
            .filter(|vid| !checkpoint.vertex_states.contains_key(*vid))
            .collect();
        if !missing.is_empty() {
            tracing::warn!(
                missing_vertices = ?missing,
                "Runtime contains vertices not present in checkpoint - they keep their default state"
            );
        }

        self.runtime.vertex_states.extend(
            checkpoint
                .vertex_states
                .iter()
                .map(|(vid, state)| (vid.clone(), *state)),
        );

        for (vid, queue) in &mut self.runtime.message_queues {
            *queue = checkpoint.pending_messages.get(vid).cloned().unwrap_or_default();
        }

        self.runtime.retry_counts = checkpoint.retry_counts.clone();
        self.runtime.released.clear();

        tracing::info!(
            workflow_id = %checkpoint.workflow_id,
            superstep = checkpoint.superstep,
            "Restored from checkpoint"
        );

        Ok(())
    }

    fn create_checkpoint(&self, superstep: usize, state: &S) -> Checkpoint<S> {
        Checkpoint::new(
            &self.runtime.workflow_id,
            superstep,
            state.clone(),
            self.runtime.vertex_states.clone(),
            self.runtime.message_queues.clone(),
        )
        .with_retry_counts(self.runtime.retry_counts.clone())
    }

    async fn save_checkpoint(&self, checkpoint: Checkpoint<S>) -> Result<(), PregelError> {
        self.checkpointer.save(&checkpoint).await?;
        tracing::info!(
            workflow_id = %self.runtime.workflow_id,
            superstep = checkpoint.superstep,
            "Checkpoint saved"
        );
        Ok(())
    }

    pub fn checkpointer(&self) -> &Arc<dyn Checkpointer<S>> {
        &self.checkpointer
    }

    pub fn inner(&self) -> &PregelRuntime<S, WorkflowMessage> {
        &self.runtime
    }

    pub fn inner_mut(&mut self) -> &mut PregelRuntime<S, WorkflowMessage> {
        &mut self.runtime
    }
}
