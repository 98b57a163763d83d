//! Subprocess-backed agent spawner.
//!
//! Spawns the configured agent command with the role as an argument, feeds
//! the JSON spawn context on stdin, and reads the agent's structured report
//! from stdout. Agents may chat freely on stdout; the report is the last
//! line that parses as a report object. The parsed report is archived into
//! the quest folder as `NNN-<agent>-report.json`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::agents::AgentSpawner;
use crate::config::Config;
use crate::errors::QuestError;
use crate::model::{AgentKind, AgentReport, SpawnContext};

pub struct ProcessSpawner {
    agent_cmd: String,
    agent_args: Vec<String>,
    working_dir: PathBuf,
    /// Directory holding active quest folders, for report archival
    active_dir: PathBuf,
}

impl ProcessSpawner {
    pub fn new(config: &Config) -> Self {
        Self {
            agent_cmd: config.agent_cmd.clone(),
            agent_args: config.agent_args.clone(),
            working_dir: config.project_dir.clone(),
            active_dir: config.quest_root.join("active"),
        }
    }

    fn archive_report(&self, ctx: &SpawnContext, agent: AgentKind, report: &AgentReport) {
        let dir = self.active_dir.join(&ctx.quest_folder);
        let path = dir.join(agent.report_filename(ctx.report_number));
        match serde_json::to_string_pretty(report) {
            Ok(content) => {
                if let Err(e) = std::fs::write(&path, content) {
                    warn!(path = %path.display(), "failed to archive agent report: {}", e);
                }
            }
            Err(e) => warn!("failed to serialize agent report for archival: {}", e),
        }
    }
}

#[async_trait]
impl AgentSpawner for ProcessSpawner {
    async fn spawn_and_wait(&self, agent: AgentKind, ctx: SpawnContext) -> Result<AgentReport> {
        let context_json =
            serde_json::to_string_pretty(&ctx).context("Failed to serialize spawn context")?;

        info!(agent = %agent, quest = %ctx.quest_folder, "spawning agent");
        let start = Instant::now();

        let mut cmd = Command::new(&self.agent_cmd);
        for arg in &self.agent_args {
            cmd.arg(arg);
        }
        cmd.arg("--agent").arg(agent.as_str());

        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .current_dir(&self.working_dir)
            .spawn()
            .map_err(QuestError::SpawnFailed)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(context_json.as_bytes())
                .await
                .context("Failed to write spawn context to agent stdin")?;
            stdin.shutdown().await.context("Failed to close agent stdin")?;
        }

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for agent process")?;

        let duration = start.elapsed();
        let exit_code = output.status.code().unwrap_or(-1);
        debug!(
            agent = %agent,
            exit_code,
            secs = duration.as_secs_f64(),
            "agent finished"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "Agent {} exited with code {}: {}",
                agent,
                exit_code,
                stderr.trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let report = parse_report(agent, &stdout)?;
        self.archive_report(&ctx, agent, &report);
        Ok(report)
    }
}

/// Extract the structured report from agent stdout.
///
/// The report is the last stdout line that parses as an [`AgentReport`];
/// everything before it is free-form agent chatter. A whole-output parse is
/// tried first for agents that emit a single pretty-printed object.
pub fn parse_report(agent: AgentKind, stdout: &str) -> Result<AgentReport> {
    if let Ok(report) = serde_json::from_str::<AgentReport>(stdout.trim()) {
        return Ok(report);
    }

    for line in stdout.lines().rev() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Ok(report) = serde_json::from_str::<AgentReport>(line) {
            return Ok(report);
        }
    }

    Err(QuestError::MalformedReport {
        agent: agent.to_string(),
        message: "no report object found in agent output".to_string(),
    }
    .into())
}
