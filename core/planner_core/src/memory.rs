use chrono::Utc;
use shared_types::{
    ActiveContextData, AgentTag, DecisionEntryData, EntryPayload, ErrorEntryData,
    ExecutionEntryData, FileCreationData, MemoryEntry, ProgressSummaryData, SuccessPatternData,
    TaskCompletionProof, TaskContext, TaskContextId, TaskOutcome, ValidationEntryData,
};
use std::sync::Mutex;
use uuid::Uuid;

/// Filenames whose write is treated as a "synthesis" signal (spec.md 9 open
/// question: the source's two helper substring lists differ; this takes
/// their union, as the spec directs, rather than picking one arbitrarily).
const SYNTHESIS_FILENAME_SUBSTRINGS: &[&str] = &[
    "recommendations",
    "final-answer",
    "summary",
    "solution",
    "comprehensive",
    "synthesize",
];

/// Append-only, in-process task memory (spec.md 4.1 Rich Memory).
///
/// Grounded on the teacher's `platform::audit::AuditLogger`: a single vector
/// behind a mutex, appended to and linearly scanned, never mutated in place
/// (spec.md 9, "Append-only log").
pub struct RichMemory {
    entries: Mutex<Vec<MemoryEntry>>,
    context: Mutex<Option<TaskContext>>,
}

impl Default for RichMemory {
    fn default() -> Self {
        RichMemory {
            entries: Mutex::new(Vec::new()),
            context: Mutex::new(None),
        }
    }
}

impl RichMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new task context, replacing any previous one.
    pub fn start_task_context(&self, task: impl Into<String>) -> TaskContext {
        let ctx = TaskContext::new(task, Utc::now());
        *self.context.lock().unwrap() = Some(ctx.clone());
        ctx
    }

    pub fn current_task_context_id(&self) -> Option<TaskContextId> {
        self.context.lock().unwrap().as_ref().map(|c| c.id)
    }

    /// Appends an entry; never overwrites.
    pub fn add_entry(
        &self,
        agent: AgentTag,
        iteration: u32,
        confidence: f64,
        tags: Vec<String>,
        payload: EntryPayload,
    ) -> MemoryEntry {
        let task_context_id = self
            .current_task_context_id()
            .expect("add_entry called before start_task_context");
        let entry = MemoryEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            agent,
            iteration,
            confidence,
            tags,
            task_context_id,
            payload,
        };
        self.entries.lock().unwrap().push(entry.clone());
        entry
    }

    /// Returns entries in insertion order, optionally restricted by entry
    /// type name, the current task context, and a keyword filter, capped to
    /// `max_results` (spec.md 4.1 `query`).
    pub fn query(
        &self,
        types: Option<&[&str]>,
        max_results: usize,
        current_task_only: bool,
        keyword_filter: Option<&str>,
    ) -> Vec<MemoryEntry> {
        let current_id = self.current_task_context_id();
        let entries = self.entries.lock().unwrap();
        entries
            .iter()
            .filter(|e| {
                if current_task_only && Some(e.task_context_id) != current_id {
                    return false;
                }
                if let Some(types) = types {
                    if !types.contains(&e.payload.type_name()) {
                        return false;
                    }
                }
                if let Some(kw) = keyword_filter {
                    let hay = entry_text(e);
                    if !hay.to_lowercase().contains(&kw.to_lowercase()) {
                        return false;
                    }
                }
                true
            })
            .take(max_results)
            .cloned()
            .collect()
    }

    /// Appends confidence to the current task's history; increments
    /// validation count.
    pub fn record_validation(&self, confidence: f64, iteration: u32) {
        {
            let mut guard = self.context.lock().unwrap();
            if let Some(ctx) = guard.as_mut() {
                ctx.validation_count += 1;
                ctx.confidence_history.push(confidence);
            }
        }
        self.add_entry(
            AgentTag::Validator,
            iteration,
            confidence,
            vec!["validation".into()],
            EntryPayload::Validation(ValidationEntryData { confidence }),
        );
    }

    pub fn log_execution(
        &self,
        iteration: u32,
        confidence: f64,
        mut data: ExecutionEntryData,
    ) -> MemoryEntry {
        redact_secrets(&mut data.inputs);
        self.add_entry(
            AgentTag::Main,
            iteration,
            confidence,
            vec!["execution".into()],
            EntryPayload::Execution(data),
        )
    }

    pub fn log_error(
        &self,
        message: impl Into<String>,
        detail: impl Into<String>,
        iteration: u32,
        tools: Vec<String>,
    ) -> MemoryEntry {
        self.add_entry(
            AgentTag::Main,
            iteration,
            0.0,
            vec!["error".into()],
            EntryPayload::Error(ErrorEntryData {
                message: message.into(),
                detail: detail.into(),
                tools,
            }),
        )
    }

    pub fn log_success_pattern(
        &self,
        description: impl Into<String>,
        tools: Vec<String>,
        confidence: f64,
        iteration: u32,
        execution_time_ms: u64,
        tool_data: Option<serde_json::Value>,
    ) -> MemoryEntry {
        self.add_entry(
            AgentTag::Main,
            iteration,
            confidence,
            vec!["success_pattern".into()],
            EntryPayload::SuccessPattern(SuccessPatternData {
                description: description.into(),
                tools,
                execution_time_ms,
                tool_data,
            }),
        )
    }

    pub fn log_decision(
        &self,
        decision: impl Into<String>,
        rationale: impl Into<String>,
        iteration: u32,
        confidence: f64,
        alternatives: Vec<String>,
    ) -> MemoryEntry {
        self.add_entry(
            AgentTag::Main,
            iteration,
            confidence,
            vec!["decision".into()],
            EntryPayload::Decision(DecisionEntryData {
                decision: decision.into(),
                rationale: rationale.into(),
                alternatives,
            }),
        )
    }

    pub fn update_active_context(
        &self,
        summary: impl Into<String>,
        iteration: u32,
        confidence: f64,
    ) -> MemoryEntry {
        self.add_entry(
            AgentTag::Main,
            iteration,
            confidence,
            vec!["active_context".into()],
            EntryPayload::ActiveContext(ActiveContextData {
                summary: summary.into(),
            }),
        )
    }

    /// Sealed write of an already-constructed entry payload (spec.md 4.1
    /// `update_memory_bank`); used by the search engine for file-creation
    /// evidence.
    pub fn update_memory_bank(
        &self,
        iteration: u32,
        confidence: f64,
        payload: EntryPayload,
    ) -> MemoryEntry {
        self.add_entry(AgentTag::Main, iteration, confidence, Vec::new(), payload)
    }

    pub fn log_file_creation(
        &self,
        filename: impl Into<String>,
        content_length: usize,
        iteration: u32,
    ) -> MemoryEntry {
        self.add_entry(
            AgentTag::Main,
            iteration,
            1.0,
            vec!["file_creation".into()],
            EntryPayload::FileCreation(FileCreationData {
                filename: filename.into(),
                content_length,
            }),
        )
    }

    /// Aggregates file-creation/synthesis evidence for the current task
    /// (spec.md 4.1 `get_task_completion_proof`).
    pub fn get_task_completion_proof(&self) -> TaskCompletionProof {
        let current_id = self.current_task_context_id();
        let entries = self.entries.lock().unwrap();

        let mut proof = TaskCompletionProof::default();
        for e in entries.iter() {
            if Some(e.task_context_id) != current_id {
                continue;
            }
            if let EntryPayload::Execution(data) = &e.payload {
                if !data.success {
                    continue;
                }
                if let Some(metadata) = &data.metadata {
                    if let Some(filename) = &metadata.file_created {
                        proof.has_file_creation = true;
                        proof.file_creation_entries.push(e.id);
                        let lower = filename.to_lowercase();
                        if SYNTHESIS_FILENAME_SUBSTRINGS
                            .iter()
                            .any(|s| lower.contains(s))
                        {
                            proof.has_synthesis = true;
                            proof.synthesis_entries.push(e.id);
                        }
                    }
                }
            }
        }
        proof.has_implementation = proof.has_file_creation && proof.has_synthesis;
        proof
    }

    /// Compact text digest of recent relevant entries for prompting
    /// (spec.md 4.1 `get_bfs_context`). The caller is responsible for
    /// truncating to its own character budget.
    pub fn get_bfs_context(&self, _task: &str, iteration: u32) -> String {
        let recent = self.query(
            Some(&["execution", "validation", "decision", "error"]),
            20,
            true,
            None,
        );
        let mut out = String::new();
        for entry in recent {
            out.push_str(&format!(
                "[iter {} | {}] {}\n",
                entry.iteration,
                entry.payload.type_name(),
                entry_text(&entry)
            ));
        }
        if out.is_empty() {
            out.push_str(&format!("(no prior entries before iteration {})", iteration));
        }
        out
    }

    /// Seals the current task context and appends a final summary entry.
    pub fn complete_task(&self, outcome: TaskOutcome, summary: impl Into<String>, iteration: u32) {
        {
            let mut guard = self.context.lock().unwrap();
            if let Some(ctx) = guard.as_mut() {
                ctx.final_outcome = Some(outcome);
            }
        }
        self.add_entry(
            AgentTag::Main,
            iteration,
            1.0,
            vec!["progress_summary".into()],
            EntryPayload::ProgressSummary(ProgressSummaryData {
                outcome,
                summary: summary.into(),
            }),
        );
    }

    pub fn recent_success_rate(&self, last_n: usize) -> f64 {
        let execs: Vec<bool> = self
            .query(Some(&["execution"]), usize::MAX, true, None)
            .into_iter()
            .filter_map(|e| match e.payload {
                EntryPayload::Execution(d) => Some(d.success),
                _ => None,
            })
            .collect();
        if execs.is_empty() {
            return 0.0;
        }
        let tail: Vec<bool> = execs
            .iter()
            .rev()
            .take(last_n)
            .copied()
            .collect();
        tail.iter().filter(|s| **s).count() as f64 / tail.len() as f64
    }
}

/// Recursively redacts `api_key`/`token`/`authorization`/`secret` fields from
/// a tool-input JSON value before it is stored or rendered into a digest,
/// ported from the teacher's `memory_service::redact_secrets`.
fn redact_secrets(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for key in ["api_key", "token", "authorization", "secret"] {
                if let Some(v) = map.get_mut(key) {
                    *v = serde_json::Value::String("[REDACTED]".to_string());
                }
            }
            for v in map.values_mut() {
                redact_secrets(v);
            }
        }
        serde_json::Value::Array(arr) => {
            for v in arr {
                redact_secrets(v);
            }
        }
        _ => {}
    }
}

fn entry_text(entry: &MemoryEntry) -> String {
    match &entry.payload {
        EntryPayload::Execution(d) => format!("{} -> {}", d.step, d.observation),
        EntryPayload::Validation(d) => format!("validation confidence={:.2}", d.confidence),
        EntryPayload::Decision(d) => format!("{}: {}", d.decision, d.rationale),
        EntryPayload::Error(d) => format!("{}: {}", d.message, d.detail),
        EntryPayload::SuccessPattern(d) => d.description.clone(),
        EntryPayload::ActiveContext(d) => d.summary.clone(),
        EntryPayload::ProgressSummary(d) => d.summary.clone(),
        EntryPayload::FileCreation(d) => format!("created {}", d.filename),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::ExecutionMetadata;

    fn exec_entry(success: bool, filename: Option<&str>) -> ExecutionEntryData {
        ExecutionEntryData {
            plan_id: Uuid::new_v4(),
            thought: "thinking".into(),
            step: "write file".into(),
            tool: Some("write_file".into()),
            inputs: serde_json::json!({}),
            observation: "ok".into(),
            success,
            execution_time_ms: 10,
            score_at_dispatch: Some(0.5),
            realized_scenario: None,
            metadata: filename.map(|f| ExecutionMetadata {
                file_created: Some(f.to_string()),
                content_length: Some(100),
                results_count: None,
            }),
        }
    }

    #[test]
    fn query_restricted_to_current_task_is_isolated() {
        let mem = RichMemory::new();
        mem.start_task_context("task one");
        mem.log_execution(0, 0.9, exec_entry(true, None));
        mem.start_task_context("task two");
        mem.log_execution(0, 0.9, exec_entry(true, None));

        let results = mem.query(Some(&["execution"]), 100, true, None);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn completion_proof_requires_both_file_and_synthesis_name() {
        let mem = RichMemory::new();
        mem.start_task_context("write a report");
        mem.log_execution(0, 0.9, exec_entry(true, Some("notes.txt")));
        let proof = mem.get_task_completion_proof();
        assert!(proof.has_file_creation);
        assert!(!proof.has_synthesis);
        assert!(!proof.has_implementation);

        mem.log_execution(1, 0.9, exec_entry(true, Some("final-answer.md")));
        let proof = mem.get_task_completion_proof();
        assert!(proof.has_synthesis);
        assert!(proof.has_implementation);
    }

    #[test]
    fn log_execution_redacts_secret_fields_in_inputs() {
        let mem = RichMemory::new();
        mem.start_task_context("call an api");
        let mut data = exec_entry(true, None);
        data.inputs = serde_json::json!({
            "url": "https://example.com",
            "api_key": "sk-super-secret",
            "headers": { "authorization": "Bearer xyz" }
        });
        mem.log_execution(0, 0.9, data);

        let results = mem.query(Some(&["execution"]), 10, true, None);
        let EntryPayload::Execution(stored) = &results[0].payload else {
            panic!("expected an execution entry");
        };
        assert_eq!(stored.inputs["api_key"], "[REDACTED]");
        assert_eq!(stored.inputs["headers"]["authorization"], "[REDACTED]");
        assert_eq!(stored.inputs["url"], "https://example.com");
    }

    #[test]
    fn empty_query_is_not_an_error() {
        let mem = RichMemory::new();
        mem.start_task_context("nothing happened yet");
        let results = mem.query(Some(&["execution"]), 10, true, None);
        assert!(results.is_empty());
    }
}
