//! Workflow state abstraction for the Pregel runtime
//!
//! The runtime collects one update per computing vertex, merges them, and
//! applies the merged update once per superstep.

use super::vertex::StateUpdate;

/// Shared state threaded through a workflow.
///
/// ```ignore
/// impl WorkflowState for Tally {
///     type Update = TallyUpdate;
///
///     fn apply_update(&self, update: TallyUpdate) -> Self {
///         let mut next = self.clone();
///         next.items.extend(update.items);
///         next
///     }
///
///     fn merge_updates(updates: Vec<TallyUpdate>) -> TallyUpdate {
///         TallyUpdate { items: updates.into_iter().flat_map(|u| u.items).collect() }
///     }
/// }
/// ```
pub trait WorkflowState: Clone + Send + Sync + 'static {
    type Update: StateUpdate;

    /// Produce the next state. Must not depend on anything but `self` and `update`.
    fn apply_update(&self, update: Self::Update) -> Self;

    /// Merge the updates of one superstep. Must be order-independent.
    fn merge_updates(updates: Vec<Self::Update>) -> Self::Update;

    /// When true the run stops regardless of vertex states.
    fn is_terminal(&self) -> bool {
        false
    }

    fn apply_updates(&self, updates: Vec<Self::Update>) -> Self {
        if updates.is_empty() {
            return self.clone();
        }
        self.apply_update(Self::merge_updates(updates))
    }
}

/// Stateless workflows communicate through messages only.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct UnitState;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct UnitUpdate;

impl StateUpdate for UnitUpdate {
    fn empty() -> Self {
        UnitUpdate
    }

    fn is_empty(&self) -> bool {
        true
    }
}

impl WorkflowState for UnitState {
    type Update = UnitUpdate;

    fn apply_update(&self, _update: Self::Update) -> Self {
        UnitState
    }

    fn merge_updates(_updates: Vec<Self::Update>) -> Self::Update {
        UnitUpdate
    }
}
