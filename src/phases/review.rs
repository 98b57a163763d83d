//! Review phase: one reviewer agent pass over the quest's full change set.
//!
//! Review only runs when the project actually changed since the quest's
//! baseline. The reviewer's own ward assessment is advisory; when it claims
//! a failure, the gate is re-run here and a confirmed failure enters the
//! recovery loop under the global scope.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::agents::AgentSpawner;
use crate::model::{
    AgentKind, ExecutionLogEntry, PhaseStatus, PhaseType, Quest, ReviewOutput, SpawnContext,
};
use crate::phases::{PhaseOutcome, PhaseRunner};
use crate::quests::QuestManager;
use crate::ward::WardValidator;

pub struct ReviewRunner {
    ward: Arc<WardValidator>,
}

impl ReviewRunner {
    pub fn new(ward: Arc<WardValidator>) -> Self {
        Self { ward }
    }
}

#[async_trait]
impl PhaseRunner for ReviewRunner {
    fn agent_kind(&self) -> AgentKind {
        AgentKind::Reviewer
    }

    fn phase_type(&self) -> PhaseType {
        PhaseType::Review
    }

    /// Nothing changed since the baseline means nothing to review.
    fn can_run(&self, manager: &dyn QuestManager, quest: &Quest) -> Result<bool> {
        if !matches!(
            quest.phase(PhaseType::Review).status,
            PhaseStatus::Pending | PhaseStatus::InProgress
        ) {
            return Ok(false);
        }
        Ok(!manager.changed_files(&quest.folder)?.is_empty())
    }

    async fn run(
        &self,
        manager: &dyn QuestManager,
        folder: &str,
        spawner: &dyn AgentSpawner,
    ) -> Result<PhaseOutcome> {
        let mut quest = manager.latest(folder)?;
        info!(quest = %quest.title, "entering review phase");
        let state = quest.phase_mut(PhaseType::Review);
        state.status = PhaseStatus::InProgress;
        state.started_at = Some(Utc::now());
        manager.save_quest(&quest)?;

        let changed = manager.changed_files(folder)?;
        let report_number = manager.next_report_number(folder)?;
        let ctx = SpawnContext {
            quest_folder: folder.to_string(),
            report_number,
            working_directory: std::env::current_dir()?,
            additional_context: serde_json::json!({
                "quest_title": quest.title,
                "changed_files": changed,
            }),
        };
        let report = spawner.spawn_and_wait(AgentKind::Reviewer, ctx).await?;

        if let Some(escape) = report.escape.clone() {
            let mut quest = manager.latest(folder)?;
            let state = quest.phase_mut(PhaseType::Review);
            state.status = PhaseStatus::Pending;
            state.started_at = None;
            manager.save_quest(&quest)?;
            return Ok(PhaseOutcome::Escaped(escape));
        }

        let output: ReviewOutput =
            serde_json::from_value(report.report.clone()).unwrap_or_default();
        if output.ward_validation_passed == Some(false) {
            warn!("reviewer reported a ward failure, re-running the gate");
            let check = self.ward.validate().await?;
            if !check.success {
                self.ward
                    .handle_failure(
                        folder,
                        check.errors.as_deref().unwrap_or_default(),
                        spawner,
                        manager,
                        None,
                    )
                    .await?;
            }
        }

        let report_file = AgentKind::Reviewer.report_filename(report_number);
        let mut quest = manager.latest(folder)?;
        let state = quest.phase_mut(PhaseType::Review);
        state.status = PhaseStatus::Complete;
        state.completed_at = Some(Utc::now());
        state.report = Some(report_file.clone());
        quest.execution_log.push(ExecutionLogEntry {
            report: report_file,
            task_id: None,
            timestamp: Utc::now(),
            agent: AgentKind::Reviewer.to_string(),
        });
        manager.save_quest(&quest)?;
        info!("review phase complete");
        Ok(PhaseOutcome::Completed)
    }
}
