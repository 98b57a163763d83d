//! Structured contract exchanged with external agents.
//!
//! Every agent invocation resolves with an [`AgentReport`]: the agent role,
//! a completion status, a role-specific JSON payload, and an optional escape
//! payload. The escape payload is an interrupt signal independent of the
//! status - its presence means the agent is asking for the quest to be
//! re-planned rather than continued.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::model::quest::Task;

/// Agent roles the orchestrator can spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Plans the quest: produces tasks and observable actions
    Planner,
    /// Implements one task at a time
    Implementer,
    /// Fills test gaps for implemented work
    Tester,
    /// Reviews the full change set
    Reviewer,
    /// Remediates ward validation failures
    Spiritmender,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Planner => "planner",
            AgentKind::Implementer => "implementer",
            AgentKind::Tester => "tester",
            AgentKind::Reviewer => "reviewer",
            AgentKind::Spiritmender => "spiritmender",
        }
    }

    /// Report filename for this agent at the given sequence number,
    /// e.g. "042-implementer-report.json".
    pub fn report_filename(&self, report_number: u32) -> String {
        format!("{:03}-{}-report.json", report_number, self.as_str())
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Agent-declared completion status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Complete,
    Blocked,
    Error,
}

/// Why an agent fired its escape hatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscapeReason {
    TaskTooComplex,
    ContextExhaustion,
    UnexpectedDependencies,
    IntegrationConflict,
    RepeatedFailures,
}

/// Escape hatch payload: an agent-initiated request to re-plan the quest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscapePayload {
    pub reason: EscapeReason,
    pub analysis: String,
    pub recommendation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_work: Option<String>,
}

/// The structured report returned by an agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReport {
    pub agent: AgentKind,
    pub status: ReportStatus,
    /// Role-specific payload; runners deserialize the slice they understand
    #[serde(default)]
    pub report: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Present iff the agent requests re-planning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escape: Option<EscapePayload>,
}

/// Context handed to a spawned agent process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnContext {
    pub quest_folder: String,
    pub report_number: u32,
    pub working_directory: PathBuf,
    #[serde(default)]
    pub additional_context: serde_json::Value,
}

/// Reconciliation modes the planner can request for an existing task list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconcileMode {
    Extend,
    Continue,
    Replan,
}

/// Dependency update for a tracked task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub task_id: String,
    pub new_dependencies: Vec<String>,
}

/// Task the planner declares obsolete (marked skipped, never deleted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObsoleteTask {
    pub task_id: String,
    pub reason: String,
}

/// Planner's plan for updating an existing task list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationPlan {
    pub mode: ReconcileMode,
    #[serde(default)]
    pub new_tasks: Vec<Task>,
    #[serde(default)]
    pub task_updates: Vec<TaskUpdate>,
    #[serde(default)]
    pub obsolete_tasks: Vec<ObsoleteTask>,
}

/// Seed for an observable action as emitted by the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSeed {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub success_criteria: String,
}

/// The slice of a planner report the discovery runner consumes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanningOutput {
    #[serde(default)]
    pub tasks: Option<Vec<Task>>,
    #[serde(default)]
    pub observable_actions: Option<Vec<ActionSeed>>,
    #[serde(default)]
    pub reconciliation_plan: Option<ReconciliationPlan>,
}

/// The slice of a reviewer report the review runner consumes.
///
/// Extends the base report shape with the reviewer's own ward assessment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewOutput {
    #[serde(default)]
    pub ward_validation_passed: Option<bool>,
    #[serde(default)]
    pub integration_issues_found: Option<bool>,
    #[serde(default)]
    pub files_reviewed: Vec<String>,
}

/// The slice of a tester report the testing runner consumes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestingOutput {
    #[serde(default)]
    pub tests_created: Vec<String>,
}
