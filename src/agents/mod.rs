//! Agent process lifecycle.
//!
//! The orchestration core only ever sees [`AgentSpawner::spawn_and_wait`]:
//! hand a role and a context to an external autonomous agent, suspend until
//! it finishes, get back its structured report. How the agent binary is
//! located and driven lives in [`spawner::ProcessSpawner`].

pub mod spawner;

use anyhow::Result;
use async_trait::async_trait;

use crate::model::{AgentKind, AgentReport, SpawnContext};

pub use spawner::ProcessSpawner;

/// Starts an external agent process and resolves with its report.
///
/// Contract: when `spawn_and_wait` returns, all file writes the agent made
/// are durable - the process has exited, so subsequent gate runs observe
/// its edits.
#[async_trait]
pub trait AgentSpawner: Send + Sync {
    async fn spawn_and_wait(&self, agent: AgentKind, ctx: SpawnContext) -> Result<AgentReport>;
}
