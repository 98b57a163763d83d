//! Discovery phase: the planner agent turns a request into tasks.
//!
//! Discovery runs in one of three modes, picked from quest state:
//! creation (no tasks yet), validation (tasks exist, re-entering after a
//! rewind), or refinement (an escape hatch fired and the planner must
//! reconcile its plan with what the escaping agent found).

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::model::{
    ActionStatus, AgentKind, AgentReport, ObservableAction, PhaseStatus, PhaseType,
    PlanningOutput, Quest,
};
use crate::phases::PhaseRunner;
use crate::quests::QuestManager;

pub struct DiscoveryRunner;

impl DiscoveryRunner {
    fn tasks_summary(quest: &Quest) -> serde_json::Value {
        serde_json::json!(quest
            .tasks
            .iter()
            .map(|t| {
                serde_json::json!({
                    "id": t.id,
                    "name": t.name,
                    "type": t.task_type,
                    "status": t.status,
                    "dependencies": t.dependencies,
                })
            })
            .collect::<Vec<_>>())
    }
}

#[async_trait]
impl PhaseRunner for DiscoveryRunner {
    fn agent_kind(&self) -> AgentKind {
        AgentKind::Planner
    }

    fn phase_type(&self) -> PhaseType {
        PhaseType::Discovery
    }

    /// Discovery also runs when a refinement is pending, whatever the
    /// recorded phase status says.
    fn can_run(&self, _manager: &dyn QuestManager, quest: &Quest) -> Result<bool> {
        Ok(quest.needs_refinement
            || matches!(
                quest.phase(PhaseType::Discovery).status,
                PhaseStatus::Pending | PhaseStatus::InProgress
            ))
    }

    fn additional_context(&self, quest: &Quest) -> Result<serde_json::Value> {
        if quest.needs_refinement {
            let latest = quest
                .refinement_requests
                .last()
                .context("Quest needs refinement but has no refinement requests")?;
            let previous: Vec<_> = quest
                .refinement_requests
                .iter()
                .rev()
                .skip(1)
                .map(|r| {
                    serde_json::json!({
                        "from_agent": r.from_agent,
                        "finding": r.finding,
                        "suggestion": r.suggestion,
                    })
                })
                .collect();
            return Ok(serde_json::json!({
                "mode": "refinement",
                "user_request": quest.user_request,
                "refinement": {
                    "from_agent": latest.from_agent,
                    "finding": latest.finding,
                    "suggestion": latest.suggestion,
                },
                "previous_refinements": previous,
                "existing_tasks": Self::tasks_summary(quest),
            }));
        }

        if !quest.tasks.is_empty() {
            return Ok(serde_json::json!({
                "mode": "validation",
                "user_request": quest.user_request,
                "existing_tasks": Self::tasks_summary(quest),
            }));
        }

        Ok(serde_json::json!({
            "mode": "creation",
            "user_request": quest.user_request,
        }))
    }

    fn process_report(
        &self,
        manager: &dyn QuestManager,
        quest: &mut Quest,
        report: &AgentReport,
        _report_file: &str,
    ) -> Result<()> {
        let output: PlanningOutput = serde_json::from_value(report.report.clone())
            .context("Planner report payload did not parse as planning output")?;

        if let Some(plan) = &output.reconciliation_plan {
            manager.apply_reconciliation(&quest.folder, plan)?;
            *quest = manager.latest(&quest.folder)?;
        } else if let Some(tasks) = output.tasks {
            quest.tasks = manager.add_tasks(&quest.folder, tasks)?;
        }

        if quest.observable_actions.is_empty() {
            if let Some(seeds) = output.observable_actions {
                quest.observable_actions = seeds
                    .into_iter()
                    .map(|seed| ObservableAction {
                        id: seed.id,
                        description: seed.description,
                        success_criteria: seed.success_criteria,
                        status: ActionStatus::Pending,
                    })
                    .collect();
            }
        }

        quest.needs_refinement = false;
        quest.sync_observable_actions();
        Ok(())
    }
}
