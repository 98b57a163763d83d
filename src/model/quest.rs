//! Quest data model for the questforge orchestrator.
//!
//! A quest is the top-level unit of work: an ordered set of phases, a task
//! list discovered during planning, and the bookkeeping that lets the
//! orchestrator resume, rewind, and recover. Quests are persisted as JSON by
//! the quest manager after every state transition; everything here derives
//! serde so the on-disk document is just this struct.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Scope key used for phase-wide (non task-scoped) spiritmender tracking.
pub const GLOBAL_SCOPE: &str = "global";

/// Overall quest status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    InProgress,
    Blocked,
    Complete,
    Abandoned,
}

/// Status of a single phase.
///
/// A phase only moves forward (pending → in_progress → complete), except
/// discovery, which an escape hatch may reset to pending together with
/// `needs_refinement`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    InProgress,
    Complete,
    Skipped,
}

/// Status of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Complete,
    Skipped,
}

/// The four quest phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseType {
    Discovery,
    Implementation,
    Testing,
    Review,
}

impl PhaseType {
    /// Phase execution order.
    pub const ORDER: [PhaseType; 4] = [
        PhaseType::Discovery,
        PhaseType::Implementation,
        PhaseType::Testing,
        PhaseType::Review,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseType::Discovery => "discovery",
            PhaseType::Implementation => "implementation",
            PhaseType::Testing => "testing",
            PhaseType::Review => "review",
        }
    }
}

impl std::fmt::Display for PhaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-phase state recorded on the quest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseState {
    pub status: PhaseStatus,
    /// Report filename that completed this phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Default for PhaseState {
    fn default() -> Self {
        Self {
            status: PhaseStatus::Pending,
            report: None,
            started_at: None,
            completed_at: None,
        }
    }
}

/// The fixed map of quest phases.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseMap {
    pub discovery: PhaseState,
    pub implementation: PhaseState,
    pub testing: PhaseState,
    pub review: PhaseState,
}

impl PhaseMap {
    pub fn get(&self, phase: PhaseType) -> &PhaseState {
        match phase {
            PhaseType::Discovery => &self.discovery,
            PhaseType::Implementation => &self.implementation,
            PhaseType::Testing => &self.testing,
            PhaseType::Review => &self.review,
        }
    }

    pub fn get_mut(&mut self, phase: PhaseType) -> &mut PhaseState {
        match phase {
            PhaseType::Discovery => &mut self.discovery,
            PhaseType::Implementation => &mut self.implementation,
            PhaseType::Testing => &mut self.testing,
            PhaseType::Review => &mut self.review,
        }
    }
}

/// Kind of work a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Implementation,
    Testing,
}

/// One discrete unit of work, created by the discovery phase.
///
/// Tasks are never deleted - only marked complete or skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub files_to_create: Vec<String>,
    #[serde(default)]
    pub files_to_edit: Vec<String>,
    /// Observable action ids this task contributes to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub implements_actions: Vec<String>,
    #[serde(default)]
    pub status: TaskStatus,
    /// Report filename that completed this task (provenance)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn is_resolved(&self) -> bool {
        matches!(self.status, TaskStatus::Complete | TaskStatus::Skipped)
    }
}

/// Status of an observable action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    #[default]
    Pending,
    Demonstrated,
}

/// A demonstrable acceptance criterion linked to implementation tasks.
///
/// Flips to `demonstrated` only when every task listing it in
/// `implements_actions` is complete or skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservableAction {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub success_criteria: String,
    #[serde(default)]
    pub status: ActionStatus,
}

/// Audit record appended when an agent fires its escape hatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementRequest {
    /// Agent role that requested refinement
    pub from_agent: String,
    pub timestamp: DateTime<Utc>,
    /// The agent's analysis of what it found
    pub finding: String,
    /// The agent's recommendation
    pub suggestion: String,
    /// Report sequence number at the time of the request
    pub report_number: u32,
}

/// One entry in the quest's execution history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub report: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub agent: String,
}

/// The top-level unit of orchestrated work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quest {
    /// Slugified title, unique per quest
    pub id: String,
    /// Storage folder key (e.g. "001-add-authentication")
    pub folder: String,
    pub title: String,
    pub status: QuestStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Original user request the quest was created from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_request: Option<String>,
    /// Git HEAD at quest creation, for changed-file tracking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_sha: Option<String>,
    pub phases: PhaseMap,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub observable_actions: Vec<ObservableAction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refinement_requests: Vec<RefinementRequest>,
    /// Set together with resetting discovery to pending; cleared when
    /// discovery re-processes
    #[serde(default)]
    pub needs_refinement: bool,
    /// Spiritmender attempt count per scope (task id or "global")
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub spiritmender_attempts: BTreeMap<String, u32>,
    /// Error text recorded per scope across spiritmender attempts
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub spiritmender_errors: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub execution_log: Vec<ExecutionLogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abandon_reason: Option<String>,
}

impl Quest {
    pub fn new(
        id: impl Into<String>,
        folder: impl Into<String>,
        title: impl Into<String>,
        user_request: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            folder: folder.into(),
            title: title.into(),
            status: QuestStatus::InProgress,
            created_at: Utc::now(),
            updated_at: Some(Utc::now()),
            completed_at: None,
            user_request,
            baseline_sha: None,
            phases: PhaseMap::default(),
            tasks: Vec::new(),
            observable_actions: Vec::new(),
            refinement_requests: Vec::new(),
            needs_refinement: false,
            spiritmender_attempts: BTreeMap::new(),
            spiritmender_errors: BTreeMap::new(),
            execution_log: Vec::new(),
            abandon_reason: None,
        }
    }

    pub fn phase(&self, phase: PhaseType) -> &PhaseState {
        self.phases.get(phase)
    }

    pub fn phase_mut(&mut self, phase: PhaseType) -> &mut PhaseState {
        self.phases.get_mut(phase)
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn task_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == task_id)
    }

    /// Tasks of the given type that are still pending.
    pub fn pending_tasks(&self, task_type: TaskType) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| t.task_type == task_type && t.status == TaskStatus::Pending)
            .collect()
    }

    /// Recompute observable action statuses from the current task list.
    ///
    /// An action is demonstrated iff every task that lists it in
    /// `implements_actions` is complete or skipped. Actions no task
    /// references stay pending.
    pub fn sync_observable_actions(&mut self) {
        for action in &mut self.observable_actions {
            let implementing: Vec<&Task> = self
                .tasks
                .iter()
                .filter(|t| t.implements_actions.iter().any(|a| a == &action.id))
                .collect();

            if !implementing.is_empty() && implementing.iter().all(|t| t.is_resolved()) {
                action.status = ActionStatus::Demonstrated;
            }
        }
    }

    /// Task progress as "completed/total".
    pub fn task_progress(&self) -> String {
        let completed = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Complete)
            .count();
        format!("{}/{}", completed, self.tasks.len())
    }
}

/// The next actionable phase, or `None` when every phase is resolved.
///
/// First in-progress phase wins (a run was interrupted mid-phase), then the
/// first pending one in execution order.
pub fn current_phase(quest: &Quest) -> Option<PhaseType> {
    for phase in PhaseType::ORDER {
        if quest.phase(phase).status == PhaseStatus::InProgress {
            return Some(phase);
        }
    }
    for phase in PhaseType::ORDER {
        if quest.phase(phase).status == PhaseStatus::Pending {
            return Some(phase);
        }
    }
    None
}

/// A quest is complete when every phase and every task is resolved.
pub fn is_quest_complete(quest: &Quest) -> bool {
    let phases_done = PhaseType::ORDER.iter().all(|p| {
        matches!(
            quest.phase(*p).status,
            PhaseStatus::Complete | PhaseStatus::Skipped
        )
    });
    phases_done && quest.tasks.iter().all(Task::is_resolved)
}
