use async_trait::async_trait;
use chrono::Utc;
use planner_core::{ChatMessage, ExecutionRecord, LlmClient, SearchEngine, ToolDescriptor, ToolExecutionResult, ToolRegistry, ValidatorAgent};
use serde_json::{Map, Value};
use shared_types::{PlannerConfig, ValidatorVerdict};
use std::sync::atomic::{AtomicU32, Ordering};

/// Returns a canned proposal for generation prompts and a canned score line
/// for scoring prompts, distinguishing by the system prompt's wording.
struct ScriptedLlm {
    proposal: String,
    score: String,
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn invoke(&self, messages: &[ChatMessage]) -> Result<String, String> {
        let system = &messages[0].content;
        if system.to_lowercase().contains("propose") {
            Ok(self.proposal.clone())
        } else {
            Ok(self.score.clone())
        }
    }
}

/// A tool registry with exactly one `write_file` tool that always succeeds,
/// echoing its `content` input back as the observation.
struct WriteFileTools;

#[async_trait]
impl ToolRegistry for WriteFileTools {
    async fn list_tools(&self) -> Vec<ToolDescriptor> {
        vec![ToolDescriptor {
            name: "write_file".to_string(),
            description: "writes a file".to_string(),
            schema: Value::Null,
        }]
    }

    async fn execute(&self, name: &str, params: &Map<String, Value>) -> ToolExecutionResult {
        assert_eq!(name, "write_file");
        let content = params.get("content").and_then(|v| v.as_str()).unwrap_or("").to_string();
        ToolExecutionResult {
            success: true,
            result: Some(Value::String(content)),
            error: None,
            metadata: Default::default(),
        }
    }
}

struct AcceptOnFirstCall {
    calls: AtomicU32,
}

#[async_trait]
impl ValidatorAgent for AcceptOnFirstCall {
    async fn validate(&self, _task: &str, _history: &[ExecutionRecord]) -> Result<ValidatorVerdict, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ValidatorVerdict {
            completed: true,
            confidence: 0.85,
            issues: vec![],
            suggested_next_actions: vec![],
            evidence_needed: vec![],
            rationale: "looks complete".to_string(),
            timestamp: Utc::now(),
            iteration: 1,
        })
    }
}

/// Scenario 1 (spec-seed "Arithmetic"): a simple-question task where the
/// first execution writes the answer and the validator accepts immediately.
#[tokio::test]
async fn arithmetic_task_completes_in_one_or_two_steps() {
    let llm = ScriptedLlm {
        proposal: "PROPOSAL:\nACTION: write the arithmetic answer\nTOOL: write_file\n\
                   INPUTS: {\"filename\": \"answer.md\", \"content\": \"The answer to 2+2 is 4\"}\n\
                   REASONING: compute and record the answer\nSCENARIOS: success\n"
            .to_string(),
        score: "0.9".to_string(),
    };
    let mut engine = SearchEngine::new(
        llm,
        WriteFileTools,
        AcceptOnFirstCall { calls: AtomicU32::new(0) },
        PlannerConfig::default(),
    );

    let answer = engine.execute_task("what is 2+2?", "session-arith").await;

    assert!(answer.contains('4'), "final answer should surface the computed value: {answer}");
    let state = engine.get_state();
    assert!(state.iteration <= 2, "expected 1-2 iterations, got {}", state.iteration);
}

/// Always returns the same `suggested_next_actions`, never completes, and
/// tracks how many times it was called (spec-seed "Repeated validator loop
/// escape").
struct RepeatingFeedbackValidator {
    calls: AtomicU32,
}

#[async_trait]
impl ValidatorAgent for RepeatingFeedbackValidator {
    async fn validate(&self, _task: &str, _history: &[ExecutionRecord]) -> Result<ValidatorVerdict, String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ValidatorVerdict {
            completed: false,
            confidence: 0.3,
            issues: vec!["server still uses systemctl".to_string()],
            suggested_next_actions: vec!["use a user-level server".to_string()],
            evidence_needed: vec![],
            rationale: "not done yet".to_string(),
            timestamp: Utc::now(),
            iteration: n,
        })
    }
}

/// Scenario 2 (spec-seed "Repeated validator loop escape"): the validator
/// never accepts, but the same hint repeats and a file was created, so the
/// deadlock-escape rule should force completion well before `maxIterations`.
#[tokio::test]
async fn repeated_identical_feedback_forces_completion_before_budget_exhausted() {
    let llm = ScriptedLlm {
        proposal: "PROPOSAL:\nACTION: deploy the webapp\nTOOL: write_file\n\
                   INPUTS: {\"filename\": \"site/index.html\", \"content\": \"hello\"}\n\
                   REASONING: stand up the site\nSCENARIOS: success\n"
            .to_string(),
        score: "0.8".to_string(),
    };
    let mut engine = SearchEngine::new(
        llm,
        WriteFileTools,
        RepeatingFeedbackValidator { calls: AtomicU32::new(0) },
        PlannerConfig {
            max_iterations: 40,
            ..PlannerConfig::default()
        },
    );

    let answer = engine
        .execute_task("develop a webapp on remote server amazon linux", "session-loop")
        .await;

    let state = engine.get_state();
    assert!(
        state.iteration < 40,
        "expected the deadlock-escape rule to force completion before the iteration budget, got {}",
        state.iteration
    );
    assert!(answer.contains("site/index.html") || answer.to_lowercase().contains("hello"));
}
