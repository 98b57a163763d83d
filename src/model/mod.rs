pub mod quest;
pub mod report;

pub use quest::{
    ActionStatus, ExecutionLogEntry, ObservableAction, PhaseMap, PhaseState, PhaseStatus,
    PhaseType, Quest, QuestStatus, RefinementRequest, Task, TaskStatus, TaskType, GLOBAL_SCOPE,
};
pub use report::{
    ActionSeed, AgentKind, AgentReport, EscapePayload, EscapeReason, ObsoleteTask, PlanningOutput,
    ReconcileMode, ReconciliationPlan, ReportStatus, ReviewOutput, SpawnContext, TaskUpdate,
    TestingOutput,
};
