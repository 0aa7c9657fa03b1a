//! Report run configuration
//!
//! Interview limits, evidence fan-in and runtime bounds for one report run.
//!
//! ```ignore
//! use rig_panel::ReportConfig;
//!
//! let config = ReportConfig::new()
//!     .with_max_turns(3)
//!     .with_interview_concurrency(4);
//!
//! let pregel = config.pregel_config();
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::pregel::{PregelConfig, RetryPolicy};

/// Supersteps one interview turn takes: ask, search, answer
const SUPERSTEPS_PER_TURN: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Expert answers per interview before it is saved
    pub max_turns: usize,

    /// Web documents fetched per lookup
    pub web_results: usize,

    /// Encyclopedia documents fetched per lookup
    pub encyclopedia_results: usize,

    /// Cap on interviews running at the same time; `None` runs every
    /// interview of the panel at once
    #[serde(default)]
    pub interview_concurrency: Option<usize>,

    #[serde(with = "humantime_serde")]
    pub vertex_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub workflow_timeout: Duration,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_turns: 2,
            web_results: 3,
            encyclopedia_results: 2,
            interview_concurrency: None,
            vertex_timeout: Duration::from_secs(600),
            workflow_timeout: Duration::from_secs(3600),
        }
    }
}

impl ReportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_turns(mut self, turns: usize) -> Self {
        self.max_turns = turns.max(1);
        self
    }

    pub fn with_web_results(mut self, count: usize) -> Self {
        self.web_results = count;
        self
    }

    pub fn with_encyclopedia_results(mut self, count: usize) -> Self {
        self.encyclopedia_results = count;
        self
    }

    pub fn with_interview_concurrency(mut self, concurrency: usize) -> Self {
        self.interview_concurrency = Some(concurrency.max(1));
        self
    }

    /// Bound on a single node, which for `conduct_interviews` covers every interview.
    pub fn with_vertex_timeout(mut self, timeout: Duration) -> Self {
        self.vertex_timeout = timeout;
        self
    }

    pub fn with_workflow_timeout(mut self, timeout: Duration) -> Self {
        self.workflow_timeout = timeout;
        self
    }

    /// Executor settings for the top-level report graph.
    ///
    /// Checkpoints after every superstep so a crash loses at most one step.
    pub fn pregel_config(&self) -> PregelConfig {
        PregelConfig::default()
            .with_max_supersteps(200)
            .with_checkpoint_interval(1)
            .with_vertex_timeout(self.vertex_timeout)
            .with_workflow_timeout(self.workflow_timeout)
            .with_retry_policy(RetryPolicy::no_retry())
    }

    /// Executor settings for one interview sub-workflow.
    pub fn interview_pregel_config(&self, max_turns: usize) -> PregelConfig {
        PregelConfig::default()
            .with_max_supersteps(max_turns * SUPERSTEPS_PER_TURN + 10)
            .with_checkpoint_interval(0)
            .with_vertex_timeout(self.vertex_timeout)
            .with_workflow_timeout(self.vertex_timeout)
            .with_retry_policy(RetryPolicy::no_retry())
    }
}
