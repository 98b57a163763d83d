//! Testing phase: one tester agent pass over the implemented work.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use crate::model::{
    AgentKind, AgentReport, PhaseStatus, PhaseType, Quest, TaskStatus, TaskType, TestingOutput,
};
use crate::phases::PhaseRunner;
use crate::quests::QuestManager;

pub struct TestingRunner;

#[async_trait]
impl PhaseRunner for TestingRunner {
    fn agent_kind(&self) -> AgentKind {
        AgentKind::Tester
    }

    fn phase_type(&self) -> PhaseType {
        PhaseType::Testing
    }

    fn can_run(&self, _manager: &dyn QuestManager, quest: &Quest) -> Result<bool> {
        Ok(matches!(
            quest.phase(PhaseType::Testing).status,
            PhaseStatus::Pending | PhaseStatus::InProgress
        ) && !quest.pending_tasks(TaskType::Testing).is_empty())
    }

    fn additional_context(&self, quest: &Quest) -> Result<serde_json::Value> {
        Ok(serde_json::json!({
            "quest_title": quest.title,
            "testing_tasks": quest
                .pending_tasks(TaskType::Testing)
                .iter()
                .map(|t| serde_json::json!({
                    "id": t.id,
                    "name": t.name,
                    "description": t.description,
                }))
                .collect::<Vec<_>>(),
        }))
    }

    fn process_report(
        &self,
        _manager: &dyn QuestManager,
        quest: &mut Quest,
        report: &AgentReport,
        report_file: &str,
    ) -> Result<()> {
        // Payload is informational; task resolution is driven by status
        let _output: TestingOutput =
            serde_json::from_value(report.report.clone()).unwrap_or_default();

        for task in &mut quest.tasks {
            if task.task_type == TaskType::Testing && task.status == TaskStatus::Pending {
                task.status = TaskStatus::Complete;
                task.completed_by = Some(report_file.to_string());
                task.completed_at = Some(Utc::now());
            }
        }
        quest.sync_observable_actions();
        Ok(())
    }
}
