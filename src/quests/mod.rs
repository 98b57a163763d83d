//! Quest persistence and query.
//!
//! [`QuestManager`] is the single accessor the orchestration core goes
//! through for quest state. The discipline it enforces is structural:
//! callers hold a quest *folder key*, not a quest, and fetch the latest
//! persisted copy via [`QuestManager::latest`] after every suspension point
//! (agent spawn, gate run, operator prompt), so no stale in-memory copy can
//! be acted on.

pub mod manager;

use anyhow::Result;

use crate::model::{PhaseType, Quest, ReconciliationPlan, Task};

pub use manager::FileQuestManager;

/// Result of a quest freshness check.
#[derive(Debug, Clone)]
pub struct Freshness {
    pub is_stale: bool,
    pub reason: Option<String>,
}

impl Freshness {
    pub fn fresh() -> Self {
        Self {
            is_stale: false,
            reason: None,
        }
    }

    pub fn stale(reason: impl Into<String>) -> Self {
        Self {
            is_stale: true,
            reason: Some(reason.into()),
        }
    }
}

/// Persistence and query contract for quests.
pub trait QuestManager: Send + Sync {
    /// Fetch the latest persisted copy of a quest. Always call this after
    /// crossing a suspension boundary; never cache the result across one.
    fn latest(&self, folder: &str) -> Result<Quest>;

    fn save_quest(&self, quest: &Quest) -> Result<()>;

    fn is_quest_complete(&self, quest: &Quest) -> bool;

    /// The next actionable phase, or `None` when all phases are resolved.
    fn current_phase(&self, quest: &Quest) -> Option<PhaseType>;

    /// Append tasks to the quest (deduplicated by id) and return the full
    /// task list after the append.
    fn add_tasks(&self, folder: &str, tasks: Vec<Task>) -> Result<Vec<Task>>;

    /// Apply a planner reconciliation plan to the persisted quest.
    fn apply_reconciliation(&self, folder: &str, plan: &ReconciliationPlan) -> Result<()>;

    /// Sequence number for the next agent report in this quest.
    fn next_report_number(&self, folder: &str) -> Result<u32>;

    /// Files changed in the project since the quest's baseline.
    fn changed_files(&self, folder: &str) -> Result<Vec<String>>;

    /// Whether the quest's planning is stale relative to the codebase.
    fn validate_freshness(&self, quest: &Quest) -> Freshness;

    fn abandon_quest(&self, folder: &str, reason: &str) -> Result<()>;

    /// Move a finished quest from active to completed storage.
    fn complete_quest(&self, folder: &str) -> Result<()>;

    fn generate_retrospective(&self, folder: &str) -> Result<String>;

    fn save_retrospective(&self, folder: &str, doc: &str) -> Result<()>;
}
