use crate::plan::PlanId;
use crate::scenario::ScenarioKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Unique id for a rich-memory task context (spec.md 3.1 Task Context).
pub type TaskContextId = Uuid;

/// Which side of the conversation produced a memory entry.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentTag {
    Main,
    Validator,
}

/// Structured-metadata sidecar for a successful execution (spec.md 3.1).
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ExecutionMetadata {
    pub file_created: Option<String>,
    pub content_length: Option<usize>,
    pub results_count: Option<usize>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ExecutionEntryData {
    pub plan_id: PlanId,
    pub thought: String,
    pub step: String,
    pub tool: Option<String>,
    pub inputs: Value,
    pub observation: String,
    pub success: bool,
    pub execution_time_ms: u64,
    pub score_at_dispatch: Option<f64>,
    pub realized_scenario: Option<ScenarioKind>,
    pub metadata: Option<ExecutionMetadata>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ValidationEntryData {
    pub confidence: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DecisionEntryData {
    pub decision: String,
    pub rationale: String,
    pub alternatives: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ErrorEntryData {
    pub message: String,
    pub detail: String,
    pub tools: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SuccessPatternData {
    pub description: String,
    pub tools: Vec<String>,
    pub execution_time_ms: u64,
    pub tool_data: Option<Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ActiveContextData {
    pub summary: String,
}

/// Final task disposition, derived from recent-entry majority when no
/// validator goal state was reached (spec.md 4.5 step 4).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Success,
    Failure,
    Partial,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProgressSummaryData {
    pub outcome: TaskOutcome,
    pub summary: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FileCreationData {
    pub filename: String,
    pub content_length: usize,
}

/// Per-entry-type payload (spec.md 4.1 "Entry types").
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EntryPayload {
    Execution(ExecutionEntryData),
    Validation(ValidationEntryData),
    Decision(DecisionEntryData),
    Error(ErrorEntryData),
    SuccessPattern(SuccessPatternData),
    ActiveContext(ActiveContextData),
    ProgressSummary(ProgressSummaryData),
    FileCreation(FileCreationData),
}

impl EntryPayload {
    pub fn type_name(&self) -> &'static str {
        match self {
            EntryPayload::Execution(_) => "execution",
            EntryPayload::Validation(_) => "validation",
            EntryPayload::Decision(_) => "decision",
            EntryPayload::Error(_) => "error",
            EntryPayload::SuccessPattern(_) => "success_pattern",
            EntryPayload::ActiveContext(_) => "active_context",
            EntryPayload::ProgressSummary(_) => "progress_summary",
            EntryPayload::FileCreation(_) => "file_creation",
        }
    }
}

/// One append-only observation in the rich memory's execution stream
/// (spec.md 4.1).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MemoryEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub agent: AgentTag,
    pub iteration: u32,
    pub confidence: f64,
    pub tags: Vec<String>,
    pub task_context_id: TaskContextId,
    pub payload: EntryPayload,
}

/// Per-task scope holding validation counters and start time (spec.md 3.1).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TaskContext {
    pub id: TaskContextId,
    pub task_hash: u64,
    pub task: String,
    pub validation_count: u32,
    pub confidence_history: Vec<f64>,
    pub start_time: DateTime<Utc>,
    pub final_outcome: Option<TaskOutcome>,
}

impl TaskContext {
    pub fn new(task: impl Into<String>, now: DateTime<Utc>) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let task = task.into();
        let mut hasher = DefaultHasher::new();
        task.hash(&mut hasher);
        let task_hash = hasher.finish();

        TaskContext {
            id: Uuid::new_v4(),
            task_hash,
            task,
            validation_count: 0,
            confidence_history: Vec::new(),
            start_time: now,
            final_outcome: None,
        }
    }
}

/// Aggregated evidence of task completion (spec.md 4.1
/// `get_task_completion_proof`).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct TaskCompletionProof {
    pub has_implementation: bool,
    pub has_synthesis: bool,
    pub has_file_creation: bool,
    pub synthesis_entries: Vec<Uuid>,
    pub file_creation_entries: Vec<Uuid>,
}
