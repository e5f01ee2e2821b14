pub mod config;
pub mod error;
pub mod memory;
pub mod plan;
pub mod scenario;
pub mod validator;

pub use config::{
    PlannerConfig, PlannerConfigBuilder, ScenarioPredictionConfig, ToolHealthConfig,
    ToolRetryConfig, ValidatorConfig, ValidatorMode,
};
pub use error::{PlannerError, PlannerResult};
pub use memory::{
    ActiveContextData, AgentTag, DecisionEntryData, EntryPayload, ErrorEntryData,
    ExecutionEntryData, ExecutionMetadata, FileCreationData, MemoryEntry, ProgressSummaryData,
    SuccessPatternData, TaskCompletionProof, TaskContext, TaskContextId, TaskOutcome,
    ValidationEntryData,
};
pub use plan::{Plan, PlanId, PlanMetadata, PlanValidatorRecord};
pub use scenario::{
    ExpectedOutcome, ImpactVector, LatencyRangeMs, ResultType, ScenarioKind,
    ScenarioPredictionEntry, ToolScenario,
};
pub use validator::{
    GoalReachedReason, TaskType, ValidatorState, ValidatorTrigger, ValidatorVerdict,
};

/// Correlation id used for tracing spans across a single `execute_task` call
/// (platform logging/tracing convention).
pub type CorrelationId = uuid::Uuid;
