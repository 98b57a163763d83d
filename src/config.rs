//! Runtime configuration for questforge.
//!
//! Settings come from `questforge.toml` at the project root, layered under
//! environment overrides and CLI flags. The file is optional - every field
//! has a default, so a bare project still runs.
//!
//! # Configuration File Format
//!
//! ```toml
//! [commands]
//! agent = "claude"
//! agent_args = ["--print"]
//! ward = "npm run ward:all"
//!
//! [quests]
//! dir = ".questforge"
//! max_quest_age_days = 7
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "questforge.toml";
const DEFAULT_QUEST_DIR: &str = ".questforge";
const DEFAULT_MAX_QUEST_AGE_DAYS: i64 = 7;

/// On-disk `questforge.toml` shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestforgeToml {
    #[serde(default)]
    pub commands: CommandsSection,
    #[serde(default)]
    pub quests: QuestsSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsSection {
    /// Agent command to spawn (receives the spawn context on stdin)
    #[serde(default = "default_agent_cmd")]
    pub agent: String,
    #[serde(default)]
    pub agent_args: Vec<String>,
    /// Ward validation gate; exit code is the sole success signal
    #[serde(default = "default_ward_cmd")]
    pub ward: String,
}

impl Default for CommandsSection {
    fn default() -> Self {
        Self {
            agent: default_agent_cmd(),
            agent_args: Vec::new(),
            ward: default_ward_cmd(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestsSection {
    #[serde(default = "default_quest_dir")]
    pub dir: String,
    /// Quests with planning older than this are flagged stale
    #[serde(default = "default_max_quest_age_days")]
    pub max_quest_age_days: i64,
}

impl Default for QuestsSection {
    fn default() -> Self {
        Self {
            dir: default_quest_dir(),
            max_quest_age_days: default_max_quest_age_days(),
        }
    }
}

fn default_agent_cmd() -> String {
    "claude".to_string()
}

fn default_ward_cmd() -> String {
    "cargo check".to_string()
}

fn default_quest_dir() -> String {
    DEFAULT_QUEST_DIR.to_string()
}

fn default_max_quest_age_days() -> i64 {
    DEFAULT_MAX_QUEST_AGE_DAYS
}

impl QuestforgeToml {
    /// Load `questforge.toml` from the project root, or defaults if absent.
    pub fn load_or_default(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

/// Resolved runtime configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    /// Quest storage root (active/, completed/, abandoned/, retros/)
    pub quest_root: PathBuf,
    pub agent_cmd: String,
    pub agent_args: Vec<String>,
    pub ward_cmd: String,
    pub max_quest_age_days: i64,
    pub verbose: bool,
}

impl Config {
    pub fn load(project_dir: PathBuf, verbose: bool) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let file = QuestforgeToml::load_or_default(&project_dir)?;

        let agent_cmd =
            std::env::var("QUESTFORGE_AGENT_CMD").unwrap_or_else(|_| file.commands.agent.clone());
        let ward_cmd =
            std::env::var("QUESTFORGE_WARD_CMD").unwrap_or_else(|_| file.commands.ward.clone());

        Ok(Self {
            quest_root: project_dir.join(&file.quests.dir),
            project_dir,
            agent_cmd,
            agent_args: file.commands.agent_args,
            ward_cmd,
            max_quest_age_days: file.quests.max_quest_age_days,
            verbose,
        })
    }
}
