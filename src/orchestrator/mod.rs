//! The quest main loop.
//!
//! [`QuestOrchestrator::run_quest`] drives a quest to completion: fetch the
//! latest persisted quest, finish if everything is resolved, otherwise run
//! or skip the current phase, and fold agent escapes into a re-planning
//! pass. Every iteration starts from a fresh [`QuestManager::latest`] call;
//! the loop never trusts a quest value across an agent spawn.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::agents::AgentSpawner;
use crate::model::{
    AgentKind, EscapePayload, PhaseStatus, PhaseType, QuestStatus, RefinementRequest,
};
use crate::phases::{
    DiscoveryRunner, ImplementationRunner, PhaseOutcome, PhaseRunner, ReviewRunner,
    TestingRunner,
};
use crate::quests::QuestManager;
use crate::ward::WardValidator;

/// Operator prompts the orchestrator needs mid-run.
pub trait UserInput: Send + Sync {
    fn confirm(&self, prompt: &str) -> Result<bool>;
}

pub struct QuestOrchestrator {
    manager: Arc<dyn QuestManager>,
    spawner: Arc<dyn AgentSpawner>,
    input: Arc<dyn UserInput>,
    runners: Vec<Box<dyn PhaseRunner>>,
}

impl QuestOrchestrator {
    pub fn new(
        manager: Arc<dyn QuestManager>,
        spawner: Arc<dyn AgentSpawner>,
        input: Arc<dyn UserInput>,
        ward: Arc<WardValidator>,
    ) -> Self {
        let runners: Vec<Box<dyn PhaseRunner>> = vec![
            Box::new(DiscoveryRunner),
            Box::new(ImplementationRunner::new(ward.clone())),
            Box::new(TestingRunner),
            Box::new(ReviewRunner::new(ward)),
        ];
        Self::with_runners(manager, spawner, input, runners)
    }

    pub fn with_runners(
        manager: Arc<dyn QuestManager>,
        spawner: Arc<dyn AgentSpawner>,
        input: Arc<dyn UserInput>,
        runners: Vec<Box<dyn PhaseRunner>>,
    ) -> Self {
        Self {
            manager,
            spawner,
            input,
            runners,
        }
    }

    fn runner_for(&self, phase: PhaseType) -> Option<&dyn PhaseRunner> {
        self.runners
            .iter()
            .find(|r| r.phase_type() == phase)
            .map(|r| r.as_ref())
    }

    /// Drive one quest until it is complete, blocked, or abandoned by the
    /// operator.
    pub async fn run_quest(&self, folder: &str) -> Result<()> {
        let quest = self.manager.latest(folder)?;

        if matches!(
            quest.status,
            QuestStatus::Complete | QuestStatus::Abandoned
        ) {
            warn!(folder = %folder, "quest is already finished");
            return Ok(());
        }

        // Freshness comes first: a stale blocked quest declined here stays
        // blocked, nothing is persisted
        let freshness = self.manager.validate_freshness(&quest);
        if freshness.is_stale {
            let proceed = self.input.confirm(&format!(
                "{}. Continue with the existing plan?",
                freshness.reason.as_deref().unwrap_or("Quest may be stale")
            ))?;
            if !proceed {
                info!(folder = %folder, "operator declined to continue a stale quest");
                return Ok(());
            }
        }

        if quest.status == QuestStatus::Blocked {
            let resume = self.input.confirm(&format!(
                "Quest '{}' is blocked. Resume anyway?",
                quest.title
            ))?;
            if !resume {
                return Ok(());
            }
            let mut quest = self.manager.latest(folder)?;
            quest.status = QuestStatus::InProgress;
            self.manager.save_quest(&quest)?;
        }

        loop {
            let quest = self.manager.latest(folder)?;

            if self.manager.is_quest_complete(&quest) {
                let retro = self.manager.generate_retrospective(folder)?;
                self.manager.save_retrospective(folder, &retro)?;
                self.manager.complete_quest(folder)?;
                info!(quest = %quest.title, "quest complete");
                return Ok(());
            }

            let Some(phase) = self.manager.current_phase(&quest) else {
                warn!(
                    folder = %folder,
                    "no runnable phase but unresolved tasks remain"
                );
                return Ok(());
            };
            let Some(runner) = self.runner_for(phase) else {
                anyhow::bail!("No runner registered for phase {}", phase);
            };

            if runner.can_run(self.manager.as_ref(), &quest)? {
                match runner
                    .run(self.manager.as_ref(), folder, self.spawner.as_ref())
                    .await?
                {
                    PhaseOutcome::Completed => {}
                    PhaseOutcome::Escaped(payload) => {
                        self.request_refinement(folder, runner.agent_kind(), payload)?;
                    }
                }
            } else {
                info!(phase = %phase, "skipping phase");
                let mut quest = self.manager.latest(folder)?;
                quest.phase_mut(phase).status = PhaseStatus::Skipped;
                self.manager.save_quest(&quest)?;
            }
        }
    }

    /// Rewind the quest to discovery in response to an escape hatch.
    ///
    /// The escape is recorded as a refinement request and discovery is reset
    /// to pending with `needs_refinement` set, so the next loop iteration
    /// re-plans before anything else runs.
    fn request_refinement(
        &self,
        folder: &str,
        from_agent: AgentKind,
        payload: EscapePayload,
    ) -> Result<()> {
        info!(
            agent = %from_agent,
            reason = ?payload.reason,
            "agent requested refinement, rewinding to discovery"
        );
        let mut quest = self.manager.latest(folder)?;
        quest.refinement_requests.push(RefinementRequest {
            from_agent: from_agent.to_string(),
            timestamp: Utc::now(),
            finding: payload.analysis,
            suggestion: payload.recommendation,
            report_number: self.manager.next_report_number(folder)?,
        });
        quest.phase_mut(PhaseType::Discovery).status = PhaseStatus::Pending;
        quest.needs_refinement = true;
        self.manager.save_quest(&quest)
    }
}
