pub mod error;
pub mod memory;
pub mod plan;
pub mod resilience;
pub mod scenario;
pub mod search;
pub mod traits;
pub mod validator;

pub use error::{PlannerError, PlannerResult};
pub use memory::RichMemory;
pub use resilience::{compute_backoff_ms, CircuitBreakingToolRegistry, RetryingToolRegistry};
pub use scenario::ScenarioPredictor;
pub use search::{new_session_id, SearchEngine, SearchState, ValidationCriteria};
pub use traits::{ChatMessage, ChatRole, ExecutionRecord, LlmClient, ToolDescriptor, ToolExecutionResult, ToolRegistry, ValidatorAgent};
