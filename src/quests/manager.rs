//! File-backed quest persistence.
//!
//! Quests live as pretty-printed JSON under the quest root:
//!
//! ```text
//! .questforge/
//!   active/001-add-auth/quest.json      (plus NNN-<agent>-report.json files)
//!   completed/...
//!   abandoned/...
//!   retros/001-add-auth-retrospective.md
//! ```
//!
//! Report numbering counts the report files already written into the quest
//! folder, so it survives process restarts without a separate counter.

use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;

use crate::errors::QuestError;
use crate::model::quest::{self, PhaseType, Quest, TaskStatus};
use crate::model::{ReconciliationPlan, Task};
use crate::quests::{Freshness, QuestManager};
use crate::tracker::GitTracker;

const QUEST_FILE: &str = "quest.json";

pub struct FileQuestManager {
    root: PathBuf,
    max_quest_age_days: i64,
    tracker: Option<Mutex<GitTracker>>,
}

impl FileQuestManager {
    pub fn new(root: PathBuf, max_quest_age_days: i64) -> Self {
        Self {
            root,
            max_quest_age_days,
            tracker: None,
        }
    }

    /// Attach a git tracker for changed-file queries and quest baselines.
    pub fn with_tracker(mut self, tracker: GitTracker) -> Self {
        self.tracker = Some(Mutex::new(tracker));
        self
    }

    pub fn active_dir(&self) -> PathBuf {
        self.root.join("active")
    }

    pub fn quest_dir(&self, folder: &str) -> PathBuf {
        self.active_dir().join(folder)
    }

    fn quest_file(&self, folder: &str) -> PathBuf {
        self.quest_dir(folder).join(QUEST_FILE)
    }

    /// Create a new quest folder and persist the initial quest document.
    pub fn create_quest(&self, title: &str, user_request: &str) -> Result<Quest> {
        let id = slugify(title);
        let number = self.count_quests()? + 1;
        let folder = format!("{:03}-{}", number, id);

        let mut quest = Quest::new(&id, &folder, title, Some(user_request.to_string()));
        quest.baseline_sha = self
            .tracker
            .as_ref()
            .and_then(|t| t.lock().unwrap().head_sha());

        fs::create_dir_all(self.quest_dir(&folder))
            .with_context(|| format!("Failed to create quest folder: {}", folder))?;
        self.save_quest(&quest)?;
        debug!(folder = %folder, "created quest");
        Ok(quest)
    }

    /// All quests currently in active storage, oldest folder first.
    pub fn list_active(&self) -> Result<Vec<Quest>> {
        let active = self.active_dir();
        if !active.exists() {
            return Ok(Vec::new());
        }
        let mut folders: Vec<String> = fs::read_dir(&active)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        folders.sort();

        let mut quests = Vec::new();
        for folder in folders {
            if self.quest_file(&folder).exists() {
                quests.push(self.latest(&folder)?);
            }
        }
        Ok(quests)
    }

    fn count_quests(&self) -> Result<u32> {
        let mut count = 0;
        for sub in ["active", "completed", "abandoned"] {
            let dir = self.root.join(sub);
            if dir.exists() {
                count += fs::read_dir(&dir)?
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().is_dir())
                    .count() as u32;
            }
        }
        Ok(count)
    }

    fn move_quest(&self, folder: &str, destination: &str) -> Result<()> {
        let from = self.quest_dir(folder);
        let to_dir = self.root.join(destination);
        fs::create_dir_all(&to_dir)?;
        fs::rename(&from, to_dir.join(folder))
            .with_context(|| format!("Failed to move quest {} to {}", folder, destination))?;
        Ok(())
    }
}

impl QuestManager for FileQuestManager {
    fn latest(&self, folder: &str) -> Result<Quest> {
        let path = self.quest_file(folder);
        if !path.exists() {
            return Err(QuestError::QuestNotFound {
                folder: folder.to_string(),
            }
            .into());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read quest file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse quest file: {}", path.display()))
    }

    fn save_quest(&self, quest: &Quest) -> Result<()> {
        let mut copy = quest.clone();
        copy.updated_at = Some(Utc::now());
        let path = self.quest_file(&quest.folder);
        let content =
            serde_json::to_string_pretty(&copy).context("Failed to serialize quest to JSON")?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write quest file: {}", path.display()))?;
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
        // Obsolete tasks are marked skipped, never deleted
        for obsolete in &plan.obsolete_tasks {
            if let Some(task) = quest.task_mut(&obsolete.task_id) {
                if task.status == TaskStatus::Pending {
                    task.status = TaskStatus::Skipped;
                }
            }
        }

        quest.sync_observable_actions();
        self.save_quest(&quest)?;
        debug!(folder = %folder, mode = ?plan.mode, "applied reconciliation plan");
        Ok(())
    }

    fn next_report_number(&self, folder: &str) -> Result<u32> {
        let dir = self.quest_dir(folder);
        if !dir.exists() {
            return Ok(1);
        }
        let count = fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_string_lossy()
                    .ends_with("-report.json")
            })
            .count() as u32;
        Ok(count + 1)
    }

    fn changed_files(&self, folder: &str) -> Result<Vec<String>> {
        let quest = self.latest(folder)?;
        match (&self.tracker, &quest.baseline_sha) {
            (Some(tracker), Some(sha)) => tracker.lock().unwrap().changed_files_since(sha),
            _ => Ok(Vec::new()),
        }
    }

    fn validate_freshness(&self, quest: &Quest) -> Freshness {
        let age = Utc::now() - quest.created_at;
        if age.num_days() >= self.max_quest_age_days {
            Freshness::stale(format!(
                "Quest planning is {} days old (limit: {})",
                age.num_days(),
                self.max_quest_age_days
            ))
        } else {
            Freshness::fresh()
        }
    }

    fn abandon_quest(&self, folder: &str, reason: &str) -> Result<()> {
        let mut quest = self.latest(folder)?;
        quest.status = crate::model::QuestStatus::Abandoned;
        quest.abandon_reason = Some(reason.to_string());
        self.save_quest(&quest)?;
        self.move_quest(folder, "abandoned")
    }

    fn complete_quest(&self, folder: &str) -> Result<()> {
        let mut quest = self.latest(folder)?;
        quest.status = crate::model::QuestStatus::Complete;
        quest.completed_at = Some(Utc::now());
        self.save_quest(&quest)?;
        self.move_quest(folder, "completed")
    }

    fn generate_retrospective(&self, folder: &str) -> Result<String> {
        let quest = self.latest(folder)?;
        let mut doc = String::new();
        doc.push_str(&format!("# Retrospective: {}\n\n", quest.title));
        doc.push_str(&format!("- Folder: {}\n", quest.folder));
        doc.push_str(&format!("- Created: {}\n", quest.created_at.to_rfc3339()));
        doc.push_str(&format!("- Tasks: {}\n", quest.task_progress()));
        if let Some(request) = &quest.user_request {
            doc.push_str(&format!("\n## Original request\n\n{}\n", request));
        }

        if !quest.observable_actions.is_empty() {
            doc.push_str("\n## Observable actions\n\n");
            for action in &quest.observable_actions {
                doc.push_str(&format!(
                    "- [{}] {}\n",
                    match action.status {
                        crate::model::ActionStatus::Demonstrated => "x",
                        crate::model::ActionStatus::Pending => " ",
                    },
                    action.description
                ));
            }
        }

        if !quest.refinement_requests.is_empty() {
            doc.push_str("\n## Refinement requests\n\n");
            for request in &quest.refinement_requests {
                doc.push_str(&format!(
                    "- {} ({}): {}\n",
                    request.from_agent,
                    request.timestamp.to_rfc3339(),
                    request.finding
                ));
            }
        }

        if !quest.spiritmender_attempts.is_empty() {
            doc.push_str("\n## Spiritmender attempts\n\n");
            for (scope, attempts) in &quest.spiritmender_attempts {
                doc.push_str(&format!("- {}: {} attempt(s)\n", scope, attempts));
            }
        }

        Ok(doc)
    }

    fn save_retrospective(&self, folder: &str, doc: &str) -> Result<()> {
        let retros = self.root.join("retros");
        fs::create_dir_all(&retros).context("Failed to create retros directory")?;
        let path = retros.join(format!("{}-retrospective.md", folder));
        fs::write(&path, doc)
            .with_context(|| format!("Failed to write retrospective: {}", path.display()))?;
        Ok(())
    }
}

fn slugify(title: &str) -> String {
    let mut slug = String::new();
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if (c.is_whitespace() || c == '-' || c == '_') && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}
