//! Implementation phase: one implementer agent per pending task, each
//! followed by a ward validation gate.
//!
//! This runner overrides the shared run path because its unit of work is
//! the task, not the phase: the quest is reloaded before and after every
//! spawn, and a failed gate goes straight into the spiritmender recovery
//! loop scoped to the failing task before the next task starts.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use crate::agents::AgentSpawner;
use crate::errors::QuestError;
use crate::model::{
    AgentKind, ExecutionLogEntry, PhaseStatus, PhaseType, Quest, SpawnContext, TaskStatus,
    TaskType,
};
use crate::phases::{PhaseOutcome, PhaseRunner};
use crate::quests::QuestManager;
use crate::ward::WardValidator;

pub struct ImplementationRunner {
    ward: Arc<WardValidator>,
}

impl ImplementationRunner {
    pub fn new(ward: Arc<WardValidator>) -> Self {
        Self { ward }
    }
}

#[async_trait]
impl PhaseRunner for ImplementationRunner {
    fn agent_kind(&self) -> AgentKind {
        AgentKind::Implementer
    }

    fn phase_type(&self) -> PhaseType {
        PhaseType::Implementation
    }

    fn can_run(&self, _manager: &dyn QuestManager, quest: &Quest) -> Result<bool> {
        Ok(matches!(
            quest.phase(PhaseType::Implementation).status,
            PhaseStatus::Pending | PhaseStatus::InProgress
        ) && !quest.pending_tasks(TaskType::Implementation).is_empty())
    }

    async fn run(
        &self,
        manager: &dyn QuestManager,
        folder: &str,
        spawner: &dyn AgentSpawner,
    ) -> Result<PhaseOutcome> {
        let mut quest = manager.latest(folder)?;
        let pending: Vec<String> = quest
            .pending_tasks(TaskType::Implementation)
            .iter()
            .map(|t| t.id.clone())
            .collect();
        if pending.is_empty() {
            let state = quest.phase_mut(PhaseType::Implementation);
            state.status = PhaseStatus::Complete;
            state.completed_at = Some(Utc::now());
            manager.save_quest(&quest)?;
            return Ok(PhaseOutcome::Completed);
        }

        info!(tasks = pending.len(), "entering implementation phase");
        let state = quest.phase_mut(PhaseType::Implementation);
        state.status = PhaseStatus::InProgress;
        state.started_at = Some(Utc::now());
        manager.save_quest(&quest)?;

        for task_id in pending {
            // Earlier iterations (or the agents they spawned) may have
            // changed the plan under us; a resolved task is skipped, but a
            // deleted one breaks the never-delete contract
            let quest = manager.latest(folder)?;
            let Some(task) = quest.task(&task_id) else {
                return Err(QuestError::TaskVanished {
                    task_id: task_id.clone(),
                }
                .into());
            };
            if task.status != TaskStatus::Pending {
                continue;
            }

            let report_number = manager.next_report_number(folder)?;
            let ctx = SpawnContext {
                quest_folder: folder.to_string(),
                report_number,
                working_directory: std::env::current_dir()?,
                additional_context: serde_json::json!({
                    "quest_title": quest.title,
                    "task": task,
                }),
            };
            info!(task = %task_id, "spawning implementer");
            let report = spawner.spawn_and_wait(AgentKind::Implementer, ctx).await?;

            if let Some(escape) = report.escape.clone() {
                let mut quest = manager.latest(folder)?;
                let state = quest.phase_mut(PhaseType::Implementation);
                state.status = PhaseStatus::Pending;
                state.started_at = None;
                manager.save_quest(&quest)?;
                return Ok(PhaseOutcome::Escaped(escape));
            }

            let report_file = AgentKind::Implementer.report_filename(report_number);
            let mut quest = manager.latest(folder)?;
            let Some(task) = quest.task_mut(&task_id) else {
                return Err(QuestError::TaskVanished {
                    task_id: task_id.clone(),
                }
                .into());
            };
            task.status = TaskStatus::Complete;
            task.completed_by = Some(report_file.clone());
            task.completed_at = Some(Utc::now());
            quest.execution_log.push(ExecutionLogEntry {
                report: report_file,
                task_id: Some(task_id.clone()),
                timestamp: Utc::now(),
                agent: AgentKind::Implementer.to_string(),
            });
            quest.sync_observable_actions();
            manager.save_quest(&quest)?;
            info!(task = %task_id, progress = %quest.task_progress(), "task complete");

            let check = self.ward.validate().await?;
            if !check.success {
                self.ward
                    .handle_failure(
                        folder,
                        check.errors.as_deref().unwrap_or_default(),
                        spawner,
                        manager,
                        Some(&task_id),
                    )
                    .await?;
            }
        }

        let mut quest = manager.latest(folder)?;
        let state = quest.phase_mut(PhaseType::Implementation);
        state.status = PhaseStatus::Complete;
        state.completed_at = Some(Utc::now());
        manager.save_quest(&quest)?;
        info!("implementation phase complete");
        Ok(PhaseOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EscapePayload, EscapeReason, QuestStatus, Task};
    use crate::test_support::{
        complete_report, MemoryQuestManager, ScriptedGate, ScriptedSpawner,
    };
    use crate::ward::{WardLog, WardValidationResult};
    use tempfile::tempdir;

    fn task(id: &str, task_type: TaskType) -> Task {
        Task {
            id: id.to_string(),
            name: id.to_string(),
            task_type,
            description: String::new(),
            dependencies: vec![],
            files_to_create: vec![],
            files_to_edit: vec![],
            implements_actions: vec![],
            status: TaskStatus::Pending,
            completed_by: None,
            completed_at: None,
        }
    }

    fn runner_with_gate(
        dir: &tempfile::TempDir,
        gate_results: Vec<WardValidationResult>,
    ) -> ImplementationRunner {
        let active = dir.path().join("active");
        std::fs::create_dir_all(active.join("001-q")).unwrap();
        ImplementationRunner::new(Arc::new(WardValidator::with_gate(
            Box::new(ScriptedGate::new(gate_results)),
            WardLog::new(active),
            dir.path().to_path_buf(),
        )))
    }

    fn setup(tasks: Vec<Task>) -> MemoryQuestManager {
        let manager = MemoryQuestManager::default();
        let mut quest = Quest::new("q", "001-q", "Quest", None);
        quest.tasks = tasks;
        manager.insert(quest);
        manager
    }

    #[tokio::test]
    async fn test_runs_each_pending_task_and_stamps_provenance() {
        let dir = tempdir().unwrap();
        let runner = runner_with_gate(&dir, vec![]);
        let manager = setup(vec![
            task("t1", TaskType::Implementation),
            task("t2", TaskType::Implementation),
            task("write-tests", TaskType::Testing),
        ]);
        let spawner = ScriptedSpawner::default();

        let outcome = runner.run(&manager, "001-q", &spawner).await.unwrap();
        assert!(matches!(outcome, PhaseOutcome::Completed));

        let quest = manager.latest("001-q").unwrap();
        assert_eq!(
            quest.phase(PhaseType::Implementation).status,
            PhaseStatus::Complete
        );
        assert_eq!(quest.task("t1").unwrap().status, TaskStatus::Complete);
        assert_eq!(
            quest.task("t1").unwrap().completed_by.as_deref(),
            Some("001-implementer-report.json")
        );
        assert_eq!(
            quest.task("t2").unwrap().completed_by.as_deref(),
            Some("002-implementer-report.json")
        );
        // Testing tasks are not this phase's business
        assert_eq!(
            quest.task("write-tests").unwrap().status,
            TaskStatus::Pending
        );
        assert_eq!(spawner.call_count(), 2);
        assert_eq!(quest.execution_log.len(), 2);
    }

    #[tokio::test]
    async fn test_gate_failure_enters_recovery_scoped_to_the_task() {
        let dir = tempdir().unwrap();
        // t1's gate fails, revalidation after the fixer passes, t2's passes
        let runner = runner_with_gate(
            &dir,
            vec![
                WardValidationResult::fail("error in t1 work"),
                WardValidationResult::pass(),
                WardValidationResult::pass(),
            ],
        );
        let manager = setup(vec![
            task("t1", TaskType::Implementation),
            task("t2", TaskType::Implementation),
        ]);
        let spawner = ScriptedSpawner::default();

        runner.run(&manager, "001-q", &spawner).await.unwrap();

        let quest = manager.latest("001-q").unwrap();
        assert_eq!(quest.spiritmender_attempts.get("t1"), Some(&1));
        assert!(quest.spiritmender_attempts.get("t2").is_none());

        let calls = spawner.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].0, AgentKind::Implementer);
        assert_eq!(calls[1].0, AgentKind::Spiritmender);
        assert_eq!(calls[2].0, AgentKind::Implementer);
    }

    #[tokio::test]
    async fn test_exhausted_recovery_aborts_remaining_tasks() {
        let dir = tempdir().unwrap();
        let runner = runner_with_gate(
            &dir,
            vec![
                WardValidationResult::fail("broken"),
                WardValidationResult::fail("still broken"),
                WardValidationResult::fail("still broken"),
                WardValidationResult::fail("still broken"),
            ],
        );
        let manager = setup(vec![
            task("t1", TaskType::Implementation),
            task("t2", TaskType::Implementation),
        ]);
        let spawner = ScriptedSpawner::default();

        let err = runner.run(&manager, "001-q", &spawner).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<QuestError>().unwrap(),
            QuestError::SpiritmenderExhausted { .. }
        ));

        let quest = manager.latest("001-q").unwrap();
        assert_eq!(quest.status, QuestStatus::Blocked);
        assert_eq!(quest.task("t2").unwrap().status, TaskStatus::Pending);
    }

    /// Spawner double whose agent deletes a tracked task mid-flight.
    struct TaskSnatcher {
        manager: Arc<MemoryQuestManager>,
        victim: String,
        calls: std::sync::Mutex<usize>,
    }

    impl TaskSnatcher {
        fn new(manager: Arc<MemoryQuestManager>, victim: &str) -> Self {
            Self {
                manager,
                victim: victim.to_string(),
                calls: std::sync::Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl crate::agents::AgentSpawner for TaskSnatcher {
        async fn spawn_and_wait(
            &self,
            agent: AgentKind,
            ctx: crate::model::SpawnContext,
        ) -> anyhow::Result<crate::model::AgentReport> {
            *self.calls.lock().unwrap() += 1;
            let mut quest = self.manager.latest(&ctx.quest_folder)?;
            quest.tasks.retain(|t| t.id != self.victim);
            self.manager.save_quest(&quest)?;
            Ok(complete_report(agent, serde_json::json!({})))
        }
    }

    #[tokio::test]
    async fn test_task_deleted_during_its_own_spawn_fails_loudly() {
        let dir = tempdir().unwrap();
        let runner = runner_with_gate(&dir, vec![]);
        let manager = Arc::new(MemoryQuestManager::default());
        let mut quest = Quest::new("q", "001-q", "Quest", None);
        quest.tasks = vec![task("t1", TaskType::Implementation)];
        manager.insert(quest);
        let spawner = TaskSnatcher::new(manager.clone(), "t1");

        let err = runner
            .run(manager.as_ref(), "001-q", &spawner)
            .await
            .unwrap_err();
        match err.downcast_ref::<QuestError>().unwrap() {
            QuestError::TaskVanished { task_id } => assert_eq!(task_id, "t1"),
            other => panic!("expected TaskVanished, got {other}"),
        }
        assert_eq!(*spawner.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_later_task_deleted_by_earlier_agent_fails_loudly() {
        let dir = tempdir().unwrap();
        let runner = runner_with_gate(&dir, vec![]);
        let manager = Arc::new(MemoryQuestManager::default());
        let mut quest = Quest::new("q", "001-q", "Quest", None);
        quest.tasks = vec![
            task("t1", TaskType::Implementation),
            task("t2", TaskType::Implementation),
        ];
        manager.insert(quest);
        // t1's agent deletes t2, so t2's loop-top reload misses it
        let spawner = TaskSnatcher::new(manager.clone(), "t2");

        let err = runner
            .run(manager.as_ref(), "001-q", &spawner)
            .await
            .unwrap_err();
        match err.downcast_ref::<QuestError>().unwrap() {
            QuestError::TaskVanished { task_id } => assert_eq!(task_id, "t2"),
            other => panic!("expected TaskVanished, got {other}"),
        }
        assert_eq!(*spawner.calls.lock().unwrap(), 1);
        // t1 itself still completed before the violation surfaced
        let quest = manager.latest("001-q").unwrap();
        assert_eq!(quest.task("t1").unwrap().status, TaskStatus::Complete);
    }

    #[tokio::test]
    async fn test_escape_resets_phase_and_leaves_task_pending() {
        let dir = tempdir().unwrap();
        let runner = runner_with_gate(&dir, vec![]);
        let manager = setup(vec![task("t1", TaskType::Implementation)]);

        let mut report = complete_report(AgentKind::Implementer, serde_json::json!({}));
        report.escape = Some(EscapePayload {
            reason: EscapeReason::UnexpectedDependencies,
            analysis: "needs a schema migration first".into(),
            recommendation: "add a migration task".into(),
            partial_work: Some("migration sketch in notes".into()),
        });
        let spawner = ScriptedSpawner::new(vec![report]);

        let outcome = runner.run(&manager, "001-q", &spawner).await.unwrap();
        assert!(matches!(outcome, PhaseOutcome::Escaped(_)));

        let quest = manager.latest("001-q").unwrap();
        assert_eq!(
            quest.phase(PhaseType::Implementation).status,
            PhaseStatus::Pending
        );
        assert_eq!(quest.task("t1").unwrap().status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_no_pending_tasks_completes_phase_without_spawning() {
        let dir = tempdir().unwrap();
        let runner = runner_with_gate(&dir, vec![]);
        let mut done = task("t1", TaskType::Implementation);
        done.status = TaskStatus::Complete;
        let manager = setup(vec![done]);
        let spawner = ScriptedSpawner::default();

        let quest = manager.latest("001-q").unwrap();
        assert!(!runner.can_run(&manager, &quest).unwrap());

        runner.run(&manager, "001-q", &spawner).await.unwrap();
        assert_eq!(spawner.call_count(), 0);
        assert_eq!(
            manager
                .latest("001-q")
                .unwrap()
                .phase(PhaseType::Implementation)
                .status,
            PhaseStatus::Complete
        );
    }

    #[tokio::test]
    async fn test_completed_tasks_demonstrate_observable_actions() {
        let dir = tempdir().unwrap();
        let runner = runner_with_gate(&dir, vec![]);
        let mut t1 = task("t1", TaskType::Implementation);
        t1.implements_actions = vec!["a1".into()];
        let manager = MemoryQuestManager::default();
        let mut quest = Quest::new("q", "001-q", "Quest", None);
        quest.tasks = vec![t1];
        quest.observable_actions.push(crate::model::ObservableAction {
            id: "a1".into(),
            description: "feature works".into(),
            success_criteria: String::new(),
            status: crate::model::ActionStatus::Pending,
        });
        manager.insert(quest);

        runner
            .run(&manager, "001-q", &ScriptedSpawner::default())
            .await
            .unwrap();

        let quest = manager.latest("001-q").unwrap();
        assert_eq!(
            quest.observable_actions[0].status,
            crate::model::ActionStatus::Demonstrated
        );
    }
}
