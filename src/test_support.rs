//! In-memory doubles shared by unit tests across modules.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::agents::AgentSpawner;
use crate::errors::QuestError;
use crate::model::quest::{self, PhaseType, Quest};
use crate::model::{
    AgentKind, AgentReport, ReconciliationPlan, ReportStatus, SpawnContext, Task, TaskStatus,
};
use crate::orchestrator::UserInput;
use crate::quests::{Freshness, QuestManager};
use crate::ward::{WardGate, WardValidationResult};

/// Quest manager over a plain map. Report numbers come from a counter so
/// completion stamps stay distinct without any report files on disk.
#[derive(Default)]
pub struct MemoryQuestManager {
    quests: Mutex<HashMap<String, Quest>>,
    report_counter: AtomicU32,
    pub changed: Mutex<Vec<String>>,
    pub stale_reason: Mutex<Option<String>>,
    pub completed: Mutex<Vec<String>>,
    pub abandoned: Mutex<Vec<(String, String)>>,
    pub retros: Mutex<Vec<(String, String)>>,
}

impl MemoryQuestManager {
    pub fn insert(&self, quest: Quest) {
        self.quests
            .lock()
            .unwrap()
            .insert(quest.folder.clone(), quest);
    }

    pub fn set_changed_files(&self, files: Vec<String>) {
        *self.changed.lock().unwrap() = files;
    }

    pub fn set_stale(&self, reason: &str) {
        *self.stale_reason.lock().unwrap() = Some(reason.to_string());
    }
}

impl QuestManager for MemoryQuestManager {
    fn latest(&self, folder: &str) -> Result<Quest> {
        self.quests
            .lock()
            .unwrap()
            .get(folder)
            .cloned()
            .ok_or_else(|| {
                QuestError::QuestNotFound {
                    folder: folder.to_string(),
                }
                .into()
            })
    }

    fn save_quest(&self, quest: &Quest) -> Result<()> {
        self.insert(quest.clone());
        Ok(())
    }

    fn is_quest_complete(&self, quest: &Quest) -> bool {
        quest::is_quest_complete(quest)
    }

    fn current_phase(&self, quest: &Quest) -> Option<PhaseType> {
        quest::current_phase(quest)
    }

    fn add_tasks(&self, folder: &str, tasks: Vec<Task>) -> Result<Vec<Task>> {
        let mut quest = self.latest(folder)?;
        for task in tasks {
            if quest.task(&task.id).is_none() {
                quest.tasks.push(task);
            }
        }
        self.save_quest(&quest)?;
        Ok(quest.tasks)
    }

    fn apply_reconciliation(&self, folder: &str, plan: &ReconciliationPlan) -> Result<()> {
        let mut quest = self.latest(folder)?;
        for task in &plan.new_tasks {
            if quest.task(&task.id).is_none() {
                quest.tasks.push(task.clone());
            }
        }
        for update in &plan.task_updates {
            if let Some(task) = quest.task_mut(&update.task_id) {
                task.dependencies = update.new_dependencies.clone();
            }
        }
        for obsolete in &plan.obsolete_tasks {
            if let Some(task) = quest.task_mut(&obsolete.task_id) {
                if task.status == TaskStatus::Pending {
                    task.status = TaskStatus::Skipped;
                }
            }
        }
        quest.sync_observable_actions();
        self.save_quest(&quest)
    }

    fn next_report_number(&self, _folder: &str) -> Result<u32> {
        Ok(self.report_counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn changed_files(&self, _folder: &str) -> Result<Vec<String>> {
        Ok(self.changed.lock().unwrap().clone())
    }

    fn validate_freshness(&self, _quest: &Quest) -> Freshness {
        match self.stale_reason.lock().unwrap().clone() {
            Some(reason) => Freshness::stale(reason),
            None => Freshness::fresh(),
        }
    }

    fn abandon_quest(&self, folder: &str, reason: &str) -> Result<()> {
        let mut quest = self.latest(folder)?;
        quest.status = crate::model::QuestStatus::Abandoned;
        quest.abandon_reason = Some(reason.to_string());
        self.save_quest(&quest)?;
        self.abandoned
            .lock()
            .unwrap()
            .push((folder.to_string(), reason.to_string()));
        Ok(())
    }

    fn complete_quest(&self, folder: &str) -> Result<()> {
        self.completed.lock().unwrap().push(folder.to_string());
        Ok(())
    }

    fn generate_retrospective(&self, folder: &str) -> Result<String> {
        let quest = self.latest(folder)?;
        Ok(format!("# Retrospective: {}\n", quest.title))
    }

    fn save_retrospective(&self, folder: &str, doc: &str) -> Result<()> {
        self.retros
            .lock()
            .unwrap()
            .push((folder.to_string(), doc.to_string()));
        Ok(())
    }
}

/// Spawner that replays a queue of canned reports and records every call.
#[derive(Default)]
pub struct ScriptedSpawner {
    queue: Mutex<VecDeque<AgentReport>>,
    calls: Mutex<Vec<(AgentKind, SpawnContext)>>,
}

impl ScriptedSpawner {
    pub fn new(reports: Vec<AgentReport>) -> Self {
        Self {
            queue: Mutex::new(reports.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A queue of n plain complete spiritmender reports.
    pub fn spiritmender_reports(n: usize) -> Self {
        Self::new(
            (0..n)
                .map(|_| complete_report(AgentKind::Spiritmender, serde_json::json!({})))
                .collect(),
        )
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<(AgentKind, SpawnContext)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentSpawner for ScriptedSpawner {
    async fn spawn_and_wait(&self, agent: AgentKind, ctx: SpawnContext) -> Result<AgentReport> {
        self.calls.lock().unwrap().push((agent, ctx));
        let scripted = self.queue.lock().unwrap().pop_front();
        // Running off the end of the script yields a bare complete report
        Ok(scripted.unwrap_or_else(|| complete_report(agent, serde_json::json!({}))))
    }
}

pub fn complete_report(agent: AgentKind, payload: serde_json::Value) -> AgentReport {
    AgentReport {
        agent,
        status: ReportStatus::Complete,
        report: payload,
        task_id: None,
        escape: None,
    }
}

/// Gate that replays a queue of results; an exhausted queue passes.
#[derive(Default)]
pub struct ScriptedGate {
    results: Mutex<VecDeque<WardValidationResult>>,
}

impl ScriptedGate {
    pub fn new(results: Vec<WardValidationResult>) -> Self {
        Self {
            results: Mutex::new(results.into()),
        }
    }
}

#[async_trait]
impl WardGate for ScriptedGate {
    async fn check(&self) -> Result<WardValidationResult> {
        Ok(self
            .results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(WardValidationResult::pass))
    }
}

/// Operator prompt double; an exhausted script answers "y".
#[derive(Default)]
pub struct ScriptedInput {
    answers: Mutex<VecDeque<String>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedInput {
    pub fn new(answers: Vec<&str>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().map(String::from).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

impl UserInput for ScriptedInput {
    fn confirm(&self, prompt: &str) -> Result<bool> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let answer = self
            .answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "y".to_string());
        Ok(matches!(answer.as_str(), "y" | "yes"))
    }
}
