use thiserror::Error;

/// Planner-wide error type (spec.md 7 Error Handling Design).
///
/// Per spec.md 7's propagation policy, no variant here is meant to escape
/// `execute_task` during an iteration step — failures of these kinds are
/// instead folded into error/execution memory entries. `PlannerError` is
/// reserved for the genuine infrastructure failures the spec calls out
/// ("LLM unreachable on the very first call") and for configuration load
/// failures before a search even starts.
#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("llm client error: {0}")]
    Llm(String),

    #[error("tool registry error: {0}")]
    ToolRegistry(String),

    #[error("validator agent error: {0}")]
    Validator(String),

    #[error("task context not found: {0}")]
    UnknownTaskContext(uuid::Uuid),

    #[error("other planner error: {0}")]
    Other(String),
}

pub type PlannerResult<T> = Result<T, PlannerError>;
