//! Ward validation: the project-wide correctness gate and its recovery loop.
//!
//! [`WardValidator::validate`] runs the gate command; a clean exit is the
//! sole success signal. [`WardValidator::handle_failure`] is the system's
//! only retry policy: a bounded loop that spawns the spiritmender agent
//! against the failing gate with an escalating strategy hint, at most
//! [`MAX_SPIRITMENDER_ATTEMPTS`] times per scope (a task id, or `"global"`
//! for phase-wide failures). Exhausting the budget blocks the quest and
//! surfaces a typed error that unwinds to the top level - a blocked quest
//! needs a human.

pub mod log;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{error, info};

use crate::agents::AgentSpawner;
use crate::config::Config;
use crate::errors::QuestError;
use crate::model::{AgentKind, SpawnContext, GLOBAL_SCOPE};
use crate::quests::QuestManager;

pub use log::WardLog;

pub const MAX_SPIRITMENDER_ATTEMPTS: u32 = 3;

/// Outcome of one gate run.
#[derive(Debug, Clone)]
pub struct WardValidationResult {
    pub success: bool,
    pub errors: Option<String>,
}

impl WardValidationResult {
    pub fn pass() -> Self {
        Self {
            success: true,
            errors: None,
        }
    }

    pub fn fail(errors: impl Into<String>) -> Self {
        Self {
            success: false,
            errors: Some(errors.into()),
        }
    }
}

/// The validation gate itself, injectable so the retry loop is testable
/// without a real subprocess.
#[async_trait]
pub trait WardGate: Send + Sync {
    async fn check(&self) -> Result<WardValidationResult>;
}

/// Gate backed by the project's configured ward command.
pub struct CommandGate {
    command: String,
    working_dir: PathBuf,
}

impl CommandGate {
    pub fn new(command: String, working_dir: PathBuf) -> Self {
        Self {
            command,
            working_dir,
        }
    }
}

#[async_trait]
impl WardGate for CommandGate {
    async fn check(&self) -> Result<WardValidationResult> {
        let mut parts = self.command.split_whitespace();
        let Some(program) = parts.next() else {
            anyhow::bail!("Ward command is empty");
        };

        let output = Command::new(program)
            .args(parts)
            .current_dir(&self.working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to run ward command: {}", self.command))?;

        if output.status.success() {
            Ok(WardValidationResult::pass())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let errors = if stderr.trim().is_empty() {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            Ok(WardValidationResult::fail(errors))
        }
    }
}

pub struct WardValidator {
    gate: Box<dyn WardGate>,
    log: WardLog,
    working_dir: PathBuf,
}

impl WardValidator {
    pub fn from_config(config: &Config) -> Self {
        Self {
            gate: Box::new(CommandGate::new(
                config.ward_cmd.clone(),
                config.project_dir.clone(),
            )),
            log: WardLog::new(config.quest_root.join("active")),
            working_dir: config.project_dir.clone(),
        }
    }

    pub fn with_gate(gate: Box<dyn WardGate>, log: WardLog, working_dir: PathBuf) -> Self {
        Self {
            gate,
            log,
            working_dir,
        }
    }

    /// Run the validation gate once.
    pub async fn validate(&self) -> Result<WardValidationResult> {
        info!("running ward validation");
        let result = self.gate.check().await?;
        if !result.success {
            error!(
                "ward failed: {}",
                result.errors.as_deref().unwrap_or("(no error output)")
            );
        }
        Ok(result)
    }

    /// Bounded recovery loop for a failed validation, keyed by scope.
    ///
    /// Each iteration re-resolves the persisted attempt count, so budgets
    /// survive process restarts and two failing tasks each get their own
    /// three attempts while global (review-phase) failures track separately.
    pub async fn handle_failure(
        &self,
        folder: &str,
        errors: &str,
        spawner: &dyn AgentSpawner,
        manager: &dyn QuestManager,
        task_scope: Option<&str>,
    ) -> Result<()> {
        let scope = task_scope.unwrap_or(GLOBAL_SCOPE);
        error!(scope = %scope, "ward validation failed");

        let mut errors = errors.to_string();
        for _ in 0..MAX_SPIRITMENDER_ATTEMPTS {
            let quest = manager.latest(folder)?;
            let current = quest
                .spiritmender_attempts
                .get(scope)
                .copied()
                .unwrap_or(0);
            if current >= MAX_SPIRITMENDER_ATTEMPTS {
                return self.block_quest(folder, scope, manager);
            }

            let attempt = current + 1;
            self.log.append(folder, scope, attempt, &errors)?;

            let previous_errors = quest
                .spiritmender_errors
                .get(scope)
                .cloned()
                .unwrap_or_default();

            info!(
                scope = %scope,
                "spawning spiritmender (attempt {}/{})",
                attempt,
                MAX_SPIRITMENDER_ATTEMPTS
            );
            let ctx = SpawnContext {
                quest_folder: folder.to_string(),
                report_number: manager.next_report_number(folder)?,
                working_directory: self.working_dir.clone(),
                additional_context: serde_json::json!({
                    "errors": errors,
                    "attempt_number": attempt,
                    "previous_errors": previous_errors,
                    "attempt_strategy": attempt_strategy(attempt),
                    "task_scope": scope,
                }),
            };
            spawner.spawn_and_wait(AgentKind::Spiritmender, ctx).await?;

            // Reload before recording: the agent may have mutated the quest
            let mut quest = manager.latest(folder)?;
            quest.spiritmender_attempts.insert(scope.to_string(), attempt);
            quest
                .spiritmender_errors
                .entry(scope.to_string())
                .or_default()
                .push(errors.clone());
            manager.save_quest(&quest)?;

            let check = self.validate().await?;
            if check.success {
                self.log.clear_scope(folder, scope)?;
                info!(scope = %scope, "ward validation passed after attempt {}", attempt);
                return Ok(());
            }

            error!(
                scope = %scope,
                "spiritmender attempt {} could not fix all errors",
                attempt
            );
            if attempt >= MAX_SPIRITMENDER_ATTEMPTS {
                return self.block_quest(folder, scope, manager);
            }
            errors = check.errors.unwrap_or_default();
        }

        // Only reachable when the scope entered with attempts already spent
        self.block_quest(folder, scope, manager)
    }

    fn block_quest(&self, folder: &str, scope: &str, manager: &dyn QuestManager) -> Result<()> {
        error!(
            scope = %scope,
            "maximum spiritmender attempts ({}) reached",
            MAX_SPIRITMENDER_ATTEMPTS
        );
        let mut quest = manager.latest(folder)?;
        quest.status = crate::model::QuestStatus::Blocked;
        manager.save_quest(&quest)?;
        Err(QuestError::SpiritmenderExhausted {
            scope: scope.to_string(),
            attempts: MAX_SPIRITMENDER_ATTEMPTS,
        }
        .into())
    }

    pub fn error_log(&self) -> &WardLog {
        &self.log
    }
}

/// Remediation strategy hint, escalating purely by attempt number.
pub fn attempt_strategy(attempt: u32) -> &'static str {
    match attempt {
        1 => "basic_fixes: focus on imports, syntax errors, and obvious type issues",
        2 => "deeper_analysis: analyze logic errors, test expectations, and component interactions",
        _ => "last_resort: reconsider the implementation approach and question assumptions",
    }
}
