//! CLI command implementations.
//!
//! | Function      | Command handled                        |
//! |---------------|----------------------------------------|
//! | `cmd_init`    | `init` - write a default questforge.toml |
//! | `cmd_new`     | `new` - create a quest                 |
//! | `cmd_run`     | `run` - drive a quest to completion    |
//! | `cmd_list`    | `list` - show active quests            |
//! | `cmd_abandon` | `abandon` - retire a quest             |

use anyhow::{Context, Result};
use console::style;
use std::sync::Arc;

use questforge::agents::ProcessSpawner;
use questforge::config::{Config, CONFIG_FILE};
use questforge::model::QuestStatus;
use questforge::orchestrator::{QuestOrchestrator, UserInput};
use questforge::quests::{FileQuestManager, QuestManager};
use questforge::tracker::GitTracker;
use questforge::ward::WardValidator;

/// Operator prompts over the terminal.
pub struct TerminalInput;

impl UserInput for TerminalInput {
    fn confirm(&self, prompt: &str) -> Result<bool> {
        dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .context("Failed to read confirmation")
    }
}

fn build_manager(config: &Config) -> FileQuestManager {
    let manager = FileQuestManager::new(config.quest_root.clone(), config.max_quest_age_days);
    // Outside a git repository the review phase has nothing to diff against
    match GitTracker::new(&config.project_dir) {
        Ok(tracker) => manager.with_tracker(tracker),
        Err(_) => manager,
    }
}

pub fn cmd_init(config: &Config) -> Result<()> {
    let path = config.project_dir.join(CONFIG_FILE);
    if path.exists() {
        println!("{} already exists", CONFIG_FILE);
        return Ok(());
    }
    let default = questforge::config::QuestforgeToml::default();
    let content = toml::to_string_pretty(&default).context("Failed to serialize default config")?;
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("{} {}", style("Created").green().bold(), CONFIG_FILE);
    Ok(())
}

pub fn cmd_new(config: &Config, title: &str, description: &str) -> Result<()> {
    let manager = build_manager(config);
    let quest = manager.create_quest(title, description)?;
    println!(
        "{} quest {} ({})",
        style("Created").green().bold(),
        style(&quest.title).bold(),
        quest.folder
    );
    println!("Run it with: questforge run {}", quest.folder);
    Ok(())
}

pub async fn cmd_run(config: &Config, folder: Option<String>) -> Result<()> {
    let manager = build_manager(config);

    let folder = match folder {
        Some(folder) => folder,
        None => {
            // Default to the oldest quest still in flight
            let active = manager.list_active()?;
            let Some(quest) = active
                .iter()
                .find(|q| matches!(q.status, QuestStatus::InProgress | QuestStatus::Blocked))
            else {
                println!("No active quests. Create one with: questforge new <title>");
                return Ok(());
            };
            quest.folder.clone()
        }
    };

    let ward = Arc::new(WardValidator::from_config(config));
    let orchestrator = QuestOrchestrator::new(
        Arc::new(manager),
        Arc::new(ProcessSpawner::new(config)),
        Arc::new(TerminalInput),
        ward,
    );
    orchestrator.run_quest(&folder).await
}

pub fn cmd_list(config: &Config) -> Result<()> {
    let manager = build_manager(config);
    let quests = manager.list_active()?;
    if quests.is_empty() {
        println!("No active quests.");
        return Ok(());
    }

    println!("{}", style("Active quests").bold().cyan());
    for quest in quests {
        let status = match quest.status {
            QuestStatus::InProgress => style("in progress").green(),
            QuestStatus::Blocked => style("blocked").red(),
            QuestStatus::Complete => style("complete").dim(),
            QuestStatus::Abandoned => style("abandoned").dim(),
        };
        let phase = manager
            .current_phase(&quest)
            .map(|p| p.to_string())
            .unwrap_or_else(|| "done".to_string());
        println!(
            "  {}  {} [{}] phase: {} tasks: {}",
            style(&quest.folder).bold(),
            quest.title,
            status,
            phase,
            quest.task_progress()
        );
    }
    Ok(())
}

pub fn cmd_abandon(config: &Config, folder: &str, reason: &str, force: bool) -> Result<()> {
    let manager = build_manager(config);
    let quest = manager.latest(folder)?;

    if !force {
        let confirmed = TerminalInput.confirm(&format!(
            "Abandon quest '{}' ({})?",
            quest.title, quest.folder
        ))?;
        if !confirmed {
            return Ok(());
        }
    }

    manager.abandon_quest(folder, reason)?;
    println!(
        "{} quest {}",
        style("Abandoned").yellow().bold(),
        quest.folder
    );
    Ok(())
}
