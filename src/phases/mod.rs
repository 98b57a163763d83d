//! Phase execution.
//!
//! Each quest phase has a runner implementing [`PhaseRunner`]. Runners with
//! ordinary spawn-once semantics take the shared [`run_default`] path; the
//! implementation and review runners override [`PhaseRunner::run`] because
//! they interleave agent spawns with ward validation.
//!
//! A run either completes the phase or surfaces the agent's escape hatch as
//! [`PhaseOutcome::Escaped`] - an ordinary value the orchestrator turns into
//! a re-planning pass, not an error.

pub mod discovery;
pub mod implementation;
pub mod review;
pub mod testing;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use crate::agents::AgentSpawner;
use crate::model::{
    AgentKind, AgentReport, EscapePayload, ExecutionLogEntry, PhaseStatus, PhaseType, Quest,
    SpawnContext,
};
use crate::quests::QuestManager;

pub use discovery::DiscoveryRunner;
pub use implementation::ImplementationRunner;
pub use review::ReviewRunner;
pub use testing::TestingRunner;

/// How a phase run ended.
#[derive(Debug)]
pub enum PhaseOutcome {
    Completed,
    /// The agent declined to continue and asked for re-planning.
    Escaped(EscapePayload),
}

#[async_trait]
pub trait PhaseRunner: Send + Sync {
    fn agent_kind(&self) -> AgentKind;

    fn phase_type(&self) -> PhaseType;

    /// Whether this phase should run for the quest in its current state.
    /// A `false` here makes the orchestrator skip the phase.
    fn can_run(&self, manager: &dyn QuestManager, quest: &Quest) -> Result<bool> {
        let _ = manager;
        // An in-progress phase was interrupted mid-run; re-enter it
        Ok(matches!(
            quest.phase(self.phase_type()).status,
            PhaseStatus::Pending | PhaseStatus::InProgress
        ))
    }

    /// Role-specific context merged into the agent's spawn context.
    fn additional_context(&self, quest: &Quest) -> Result<serde_json::Value> {
        let _ = quest;
        Ok(serde_json::json!({}))
    }

    /// Fold the agent's report into the quest. Called with a freshly
    /// reloaded quest; mutations are persisted by the caller.
    /// `report_file` is the archived report filename, for provenance stamps.
    fn process_report(
        &self,
        manager: &dyn QuestManager,
        quest: &mut Quest,
        report: &AgentReport,
        report_file: &str,
    ) -> Result<()> {
        let _ = (manager, quest, report, report_file);
        Ok(())
    }

    async fn run(
        &self,
        manager: &dyn QuestManager,
        folder: &str,
        spawner: &dyn AgentSpawner,
    ) -> Result<PhaseOutcome> {
        run_default(self, manager, folder, spawner).await
    }
}

/// Shared spawn-once phase run.
///
/// Marks the phase in progress, spawns the phase agent, then reloads the
/// quest before folding the report in - the agent process may have edited
/// the quest file while it ran. An escape resets the phase to pending so a
/// later pass can re-enter it after re-planning.
pub async fn run_default<R>(
    runner: &R,
    manager: &dyn QuestManager,
    folder: &str,
    spawner: &dyn AgentSpawner,
) -> Result<PhaseOutcome>
where
    R: PhaseRunner + ?Sized,
{
    let phase = runner.phase_type();
    let mut quest = manager.latest(folder)?;
    info!(phase = %phase, quest = %quest.title, "entering phase");

    let state = quest.phase_mut(phase);
    state.status = PhaseStatus::InProgress;
    state.started_at = Some(Utc::now());
    manager.save_quest(&quest)?;

    let report_number = manager.next_report_number(folder)?;
    let ctx = SpawnContext {
        quest_folder: folder.to_string(),
        report_number,
        working_directory: std::env::current_dir()?,
        additional_context: runner.additional_context(&quest)?,
    };
    let report = spawner.spawn_and_wait(runner.agent_kind(), ctx).await?;

    if let Some(escape) = report.escape.clone() {
        let mut quest = manager.latest(folder)?;
        let state = quest.phase_mut(phase);
        state.status = PhaseStatus::Pending;
        state.started_at = None;
        manager.save_quest(&quest)?;
        return Ok(PhaseOutcome::Escaped(escape));
    }

    // Reload before mutating: the agent owns the quest file while it runs
    let report_file = runner.agent_kind().report_filename(report_number);
    let mut quest = manager.latest(folder)?;
    runner.process_report(manager, &mut quest, &report, &report_file)?;

    let state = quest.phase_mut(phase);
    state.status = PhaseStatus::Complete;
    state.completed_at = Some(Utc::now());
    state.report = Some(report_file.clone());
    quest.execution_log.push(ExecutionLogEntry {
        report: report_file,
        task_id: report.task_id.clone(),
        timestamp: Utc::now(),
        agent: runner.agent_kind().to_string(),
    });
    manager.save_quest(&quest)?;
    info!(phase = %phase, "phase complete");
    Ok(PhaseOutcome::Completed)
}
