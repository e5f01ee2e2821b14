use async_trait::async_trait;
use serde_json::{Map, Value};
use shared_types::ValidatorVerdict;
use std::collections::BTreeMap;

/// A registered tool's static description (spec.md 6.1).
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub schema: Value,
}

/// The outcome of one tool invocation (spec.md 6.1).
#[derive(Debug, Clone)]
pub struct ToolExecutionResult {
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub metadata: BTreeMap<String, Value>,
}

/// Tool-execution transport, consumed by the search engine (spec.md 6.1).
/// Treated as an external collaborator: the core never assumes a call
/// succeeds.
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    async fn list_tools(&self) -> Vec<ToolDescriptor>;

    async fn execute(&self, name: &str, params: &Map<String, Value>) -> ToolExecutionResult;
}

/// One chat-style message for an LLM invocation (spec.md 6.2).
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Text-in/text-out oracle, consumed for all five prompt templates
/// (spec.md 6.2): plan proposal, plan scoring, validation, final answer,
/// inline explanation.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn invoke(&self, messages: &[ChatMessage]) -> Result<String, String>;
}

/// One execution record as handed to the validator agent (spec.md 6.3).
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub step: String,
    pub tool: Option<String>,
    pub observation: String,
    pub success: bool,
}

/// The external validator agent, returning a [`ValidatorVerdict`]
/// (spec.md 6.3). The core never parses `rationale` itself.
#[async_trait]
pub trait ValidatorAgent: Send + Sync {
    async fn validate(&self, task: &str, history: &[ExecutionRecord]) -> Result<ValidatorVerdict, String>;
}
