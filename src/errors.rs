//! Typed error hierarchy for the questforge orchestrator.
//!
//! Only failures with defined recovery or surfacing semantics get a variant
//! here; everything else propagates as `anyhow::Error`. The escape hatch is
//! deliberately NOT an error - it is a [`crate::phases::PhaseOutcome`]
//! variant the orchestrator branches on.

use thiserror::Error;

/// Errors from the orchestration core.
#[derive(Debug, Error)]
pub enum QuestError {
    /// Spiritmender budget exhausted for a scope; the quest has been marked
    /// blocked and needs a human to resume it.
    #[error("Quest blocked: max spiritmender attempts ({attempts}) reached for scope {scope}")]
    SpiritmenderExhausted { scope: String, attempts: u32 },

    /// A tracked task disappeared between eligibility check and reload.
    /// Agents must never delete tracked tasks.
    #[error("Task {task_id} missing after quest reload")]
    TaskVanished { task_id: String },

    #[error("Quest not found: {folder}")]
    QuestNotFound { folder: String },

    #[error("Agent {agent} returned a malformed report: {message}")]
    MalformedReport { agent: String, message: String },

    #[error("Failed to spawn agent process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
