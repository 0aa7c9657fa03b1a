//! Bridges to Rig's provider ecosystem

pub mod rig_agent_adapter;

pub use rig_agent_adapter::RigCompletionService;
