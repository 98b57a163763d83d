pub mod agents;
pub mod config;
pub mod errors;
pub mod model;
pub mod orchestrator;
pub mod phases;
pub mod quests;
pub mod tracker;
pub mod ward;

#[cfg(test)]
pub(crate) mod test_support;
