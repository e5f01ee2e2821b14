use crate::memory::RichMemory;
use crate::plan::{
    apply_score_adjustments, fallback_gather_info_plan, generate_plans, parse_scores,
    FailureAwareness, ScoringContext,
};
use crate::scenario::ScenarioPredictor;
use crate::traits::{LlmClient, ToolRegistry};
use crate::validator;
use shared_types::{
    EntryPayload, ExecutionEntryData, ExecutionMetadata, Plan, PlannerConfig, TaskOutcome,
    ValidatorState, ValidatorVerdict,
};
use tracing::info;
use uuid::Uuid;

/// Read-only snapshot of the search engine's current task state
/// (spec.md 6.4 `get_state`).
#[derive(Debug, Clone)]
pub struct SearchState {
    pub task: String,
    pub session_id: String,
    pub iteration: u32,
    pub frontier_size: usize,
    pub frontier_scores: Vec<f64>,
}

/// The five-component planner facade (spec.md 6.4 Planner API).
///
/// Owns its own configuration, memory, scenario cache, and validator state;
/// cross-task sharing is out of scope (spec.md 9, "Global mutable state:
/// avoid it").
pub struct SearchEngine<L, T, V> {
    llm: L,
    tools: T,
    validator_agent: V,
    config: PlannerConfig,
    memory: RichMemory,
    scenario_predictor: ScenarioPredictor,
    validator_state: ValidatorState,
    frontier: Vec<Plan>,
    task: String,
    session_id: String,
    iteration: u32,
    last_validation_at: Option<std::time::Instant>,
}

/// Validation-action trigger criteria (spec.md 4.5.1).
pub struct ValidationCriteria {
    pub min_progress: f64,
    pub min_confidence: f64,
    pub level_threshold: u32,
}

impl Default for ValidationCriteria {
    fn default() -> Self {
        ValidationCriteria {
            min_progress: 0.5,
            min_confidence: 0.7,
            level_threshold: 3,
        }
    }
}

impl<L, T, V> SearchEngine<L, T, V>
where
    L: LlmClient,
    T: ToolRegistry,
    V: crate::traits::ValidatorAgent,
{
    pub fn new(llm: L, tools: T, validator_agent: V, config: PlannerConfig) -> Self {
        SearchEngine {
            llm,
            tools,
            validator_agent,
            config,
            memory: RichMemory::new(),
            scenario_predictor: ScenarioPredictor::new(shared_types::ScenarioPredictionConfig::default()),
            validator_state: ValidatorState::default(),
            frontier: Vec::new(),
            task: String::new(),
            session_id: String::new(),
            iteration: 0,
            last_validation_at: None,
        }
    }

    pub fn get_state(&self) -> SearchState {
        SearchState {
            task: self.task.clone(),
            session_id: self.session_id.clone(),
            iteration: self.iteration,
            frontier_size: self.frontier.len(),
            frontier_scores: self.frontier.iter().map(|p| p.score).collect(),
        }
    }

    pub fn get_scenario_cache(&self) -> Vec<(String, Vec<shared_types::ToolScenario>, f64)> {
        self.scenario_predictor.cache_snapshot()
    }

    /// Runs the full per-task loop to completion or budget exhaustion and
    /// returns the rendered final answer (spec.md 6.4 `execute_task`).
    pub async fn execute_task(&mut self, task: &str, session_id: &str) -> String {
        let correlation_id = uuid::Uuid::new_v4();
        let span = platform::correlation_span(correlation_id, "execute_task");
        let _enter = span.enter();
        platform::record_counter("planner_tasks_started_total", 1);

        self.initialize(task, session_id);
        self.bootstrap().await;

        for iteration in 1..=self.config.max_iterations {
            self.iteration = iteration;
            self.validator_state.tick_cooldown();

            if self.frontier.is_empty() {
                break;
            }

            let Some(mut plan) = self.pop_best() else {
                break;
            };

            self.memory.log_decision(
                plan.action.clone(),
                plan.reasoning.clone(),
                iteration,
                plan.score,
                Vec::new(),
            );

            let outcome = self.dispatch(&mut plan).await;

            if let Some(DispatchOutcome::Complete(answer)) = outcome {
                return answer;
            }

            let goal = validator::check_goal_state(
                &self.validator_agent,
                &self.memory,
                &mut self.validator_state,
                &self.task,
                &self.task,
                iteration,
                self.config.validator.min_confidence,
            )
            .await;

            if goal.reached {
                info!(reason = ?goal.reason, "goal state reached");
                return self.render_final_answer(TaskOutcome::Success);
            }

            platform::record_counter("planner_iterations_total", 1);
            if let Some(top) = self.frontier.first() {
                platform::record_histogram("planner_frontier_top_score", top.score);
            }

            self.expand_frontier(iteration).await;
        }

        self.render_final_answer(self.derive_outcome())
    }

    fn initialize(&mut self, task: &str, session_id: &str) {
        self.task = task.to_string();
        self.session_id = session_id.to_string();
        self.iteration = 0;
        self.frontier.clear();
        self.validator_state = ValidatorState::default();
        self.memory.start_task_context(task.to_string());
        self.memory
            .update_active_context(format!("starting task: {task}"), 0, 1.0);
    }

    async fn bootstrap(&mut self) {
        let digest = self.memory.get_bfs_context(&self.task, 0);
        let digest: String = digest.chars().take(5000).collect();

        let tools = self.tools.list_tools().await;
        let mut plans = generate_plans(
            &self.llm,
            &self.task,
            &tools,
            0,
            self.config.beam_width,
            &digest,
        )
        .await;

        if plans.is_empty() {
            plans.push(fallback_gather_info_plan(0));
        }

        self.score_and_merge(plans).await;
    }

    async fn expand_frontier(&mut self, iteration: u32) {
        let digest = self.memory.get_bfs_context(&self.task, iteration);
        let digest: String = digest.chars().take(5000).collect();
        let tools = self.tools.list_tools().await;
        let mut plans = generate_plans(
            &self.llm,
            &self.task,
            &tools,
            iteration,
            self.config.beam_width,
            &digest,
        )
        .await;

        if plans.is_empty() {
            plans.push(fallback_gather_info_plan(iteration));
        }

        self.score_and_merge(plans).await;
    }

    /// Applies failure-awareness, scores via the LLM (falling back to the
    /// 0.6/0.2 heuristic), applies score adjustments, merges into the
    /// frontier, then re-establishes the beam invariant (spec.md 4.5
    /// bootstrap/iterate steps, spec.md 8 "Beam invariant").
    async fn score_and_merge(&mut self, mut plans: Vec<Plan>) {
        let known_failures: Vec<String> = self
            .memory
            .query(Some(&["error"]), 50, true, None)
            .into_iter()
            .filter_map(|e| match e.payload {
                EntryPayload::Error(d) => d.tools.first().cloned(),
                _ => None,
            })
            .collect();
        let failure_awareness = FailureAwareness {
            known_failure_patterns: &known_failures,
        };

        let numbered: Vec<String> = plans
            .iter()
            .enumerate()
            .map(|(i, p)| format!("{}. {} (tool={:?})", i + 1, p.action, p.tool))
            .collect();
        let recent: Vec<String> = self
            .memory
            .query(Some(&["execution"]), 5, true, None)
            .into_iter()
            .filter_map(|e| match e.payload {
                EntryPayload::Execution(d) => Some(d.step),
                _ => None,
            })
            .collect();

        let scoring_prompt = crate::traits::ChatMessage::user(format!(
            "Task: {}\nRecent actions: {}\nScore each plan in [0,1], one score per line:\n{}",
            self.task,
            recent.join(", "),
            numbered.join("\n")
        ));
        let scores = match self
            .llm
            .invoke(&[
                crate::traits::ChatMessage::system(
                    "You score candidate plans for usefulness. Reply with one float per line.",
                ),
                scoring_prompt,
            ])
            .await
        {
            Ok(text) => parse_scores(&text, &plans),
            Err(_) => parse_scores("", &plans),
        };

        let progress = self.current_progress();
        let confidence = self.current_confidence();
        let has_write_file = self.memory.get_task_completion_proof().has_file_creation;

        for (plan, score) in plans.iter_mut().zip(scores) {
            plan.score = score;
            failure_awareness.adapt(plan);

            let ctx = ScoringContext {
                hints: &self.validator_state.hints,
                outstanding_issues: self
                    .validator_state
                    .last_verdict
                    .as_ref()
                    .map(|v| v.issues.as_slice())
                    .unwrap_or(&[]),
                repeated_feedback: self.validator_state.last_n_verdicts_repeat(3),
                overall_progress: progress,
                overall_confidence: confidence,
                has_successful_write_file: has_write_file,
                config: &self.config.validator,
            };
            apply_score_adjustments(plan, &ctx);
        }

        self.frontier.append(&mut plans);
        self.truncate_frontier();
    }

    fn truncate_frontier(&mut self) {
        self.frontier
            .sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        self.frontier.truncate(self.config.beam_width);
    }

    fn pop_best(&mut self) -> Option<Plan> {
        if self.frontier.is_empty() {
            return None;
        }
        Some(self.frontier.remove(0))
    }

    async fn dispatch(&mut self, plan: &mut Plan) -> Option<DispatchOutcome> {
        plan.metadata.executed = true;
        plan.metadata.execution_attempts += 1;
        let start = std::time::Instant::now();

        if plan.tool.as_deref() == Some("validate") {
            let verdict = self.run_validation_action(plan).await;
            let elapsed = start.elapsed().as_millis() as u64;
            self.record_execution(
                plan,
                true,
                format!("{verdict:?}"),
                elapsed,
                None,
                shared_types::ScenarioKind::Success,
            );
            if let Some(v) = verdict {
                if v.completed && v.confidence >= self.config.validator.min_confidence {
                    return Some(DispatchOutcome::Complete(
                        self.render_final_answer(TaskOutcome::Success),
                    ));
                }
            }
            return None;
        }

        let Some(tool_name) = plan.tool.clone() else {
            self.memory.log_error(
                "no-op plan",
                "plan carried no tool",
                self.iteration,
                Vec::new(),
            );
            return None;
        };

        let requested_kinds: Vec<shared_types::ScenarioKind> =
            plan.predicted_scenarios.iter().map(|s| s.kind).collect();
        let requested_kinds = if requested_kinds.is_empty() {
            None
        } else {
            Some(requested_kinds.as_slice())
        };
        self.scenario_predictor
            .predict(&tool_name, &plan.inputs, requested_kinds);

        let result = self.tools.execute(&tool_name, &plan.inputs).await;
        let elapsed = start.elapsed().as_millis() as u64;
        let observation = result
            .result
            .as_ref()
            .map(|v| v.to_string())
            .or_else(|| result.error.clone())
            .unwrap_or_default();

        let realized = ScenarioPredictor::classify(result.success, &observation, &plan.predicted_scenarios);
        if self.config.scenario_prediction.learn_from_outcomes {
            self.scenario_predictor.learn(&tool_name, &plan.inputs, realized);
        }

        let mut file_created = None;
        if result.success && tool_name == "write_file" {
            if let Some(serde_json::Value::String(filename)) = plan.inputs.get("filename") {
                file_created = Some(filename.clone());
                self.memory
                    .log_file_creation(filename.clone(), observation.len(), self.iteration);
            }
        }

        self.record_execution(plan, result.success, observation.clone(), elapsed, file_created, realized);

        if !result.success {
            self.memory.log_error(
                result.error.clone().unwrap_or_else(|| "tool execution failed".to_string()),
                observation,
                self.iteration,
                vec![tool_name],
            );
        }

        None
    }

    fn record_execution(
        &self,
        plan: &Plan,
        success: bool,
        observation: String,
        execution_time_ms: u64,
        file_created: Option<String>,
        realized_scenario: shared_types::ScenarioKind,
    ) {
        let metadata = file_created.map(|f| ExecutionMetadata {
            content_length: Some(observation.len()),
            file_created: Some(f),
            results_count: None,
        });
        self.memory.log_execution(
            self.iteration,
            plan.score,
            ExecutionEntryData {
                plan_id: plan.id,
                thought: plan.reasoning.clone(),
                step: plan.action.clone(),
                tool: plan.tool.clone(),
                inputs: serde_json::Value::Object(plan.inputs.clone()),
                observation,
                success,
                execution_time_ms,
                score_at_dispatch: Some(plan.score),
                realized_scenario: Some(realized_scenario),
                metadata,
            },
        );
    }

    /// Evaluates the Validation Action trigger and, if triggered, invokes
    /// the validator directly (spec.md 4.5.1).
    async fn run_validation_action(&mut self, plan: &Plan) -> Option<ValidatorVerdict> {
        let criteria = ValidationCriteria::default();
        let trigger = plan
            .inputs
            .get("trigger")
            .and_then(|v| v.as_str())
            .and_then(shared_types::ValidatorTrigger::parse)
            .unwrap_or(shared_types::ValidatorTrigger::Manual);

        let progress = self.current_progress();
        let confidence = self.current_confidence();

        let fires = match trigger {
            shared_types::ValidatorTrigger::Progress => progress >= criteria.min_progress,
            shared_types::ValidatorTrigger::Confidence => confidence <= criteria.min_confidence,
            shared_types::ValidatorTrigger::Level => self.iteration >= criteria.level_threshold,
            shared_types::ValidatorTrigger::Manual => true,
            shared_types::ValidatorTrigger::Adaptive => {
                let mut met = 0;
                if progress >= 0.3 {
                    met += 1;
                }
                if confidence <= 0.8 {
                    met += 1;
                }
                if self.iteration >= 2 {
                    met += 1;
                }
                if self.validator_state.history.len() < 5 {
                    met += 1;
                }
                let stale = self
                    .last_validation_at
                    .map(|t| t.elapsed().as_secs() > 10)
                    .unwrap_or(true);
                if stale {
                    met += 1;
                }
                met >= 3
            }
        };

        if !fires {
            return None;
        }

        if validator::cooldown_blocks(&self.validator_state) {
            return None;
        }

        self.last_validation_at = Some(std::time::Instant::now());
        let records = self
            .memory
            .query(Some(&["execution", "error"]), 20, true, None)
            .into_iter()
            .filter_map(|e| match e.payload {
                EntryPayload::Execution(d) => Some(crate::traits::ExecutionRecord {
                    step: d.step,
                    tool: d.tool,
                    observation: d.observation,
                    success: d.success,
                }),
                EntryPayload::Error(d) => Some(crate::traits::ExecutionRecord {
                    step: d.message,
                    tool: None,
                    observation: d.detail,
                    success: false,
                }),
                _ => None,
            })
            .collect::<Vec<_>>();

        let verdict = self.validator_agent.validate(&self.task, &records).await.ok()?;
        self.memory.record_validation(verdict.confidence, self.iteration);
        self.validator_state.record(verdict.clone());
        self.validator_state.reset_cooldown(self.config.validator.cooldown);
        Some(verdict)
    }

    /// Progress: base success-rate x 0.2 plus signal bonuses (spec.md 4.5.1
    /// "Progress").
    fn current_progress(&self) -> f64 {
        let execs = self.memory.query(Some(&["execution"]), usize::MAX, true, None);
        let total = execs.len().max(1);
        let successes = execs.iter().filter(|e| matches!(&e.payload, EntryPayload::Execution(d) if d.success)).count();
        let success_rate = successes as f64 / total as f64;

        let mut score = success_rate * 0.2;
        let has_research = execs.iter().any(|e| matches!(&e.payload, EntryPayload::Execution(d) if d.success && d.tool.as_deref() == Some("search_web")));
        let has_command = execs.iter().any(|e| matches!(&e.payload, EntryPayload::Execution(d) if d.success && d.tool.as_deref() == Some("execute_command")));
        let proof = self.memory.get_task_completion_proof();
        let has_validation = !self.memory.query(Some(&["validation"]), 1, true, None).is_empty();

        if has_research {
            score += 0.1;
        }
        if has_command {
            score += 0.2;
        }
        if proof.has_file_creation {
            score += 0.2;
        }
        if proof.has_synthesis {
            score += 0.2;
        }
        if has_validation {
            score += 0.1;
        }
        score.clamp(0.0, 1.0)
    }

    /// Confidence: last-5 success-rate x 0.4 + overall success-rate x 0.3 +
    /// mean validator confidence x 0.3 (spec.md 4.5.1 "Confidence").
    fn current_confidence(&self) -> f64 {
        let last5 = self.memory.recent_success_rate(5);
        let overall = self.memory.recent_success_rate(usize::MAX);
        let mean_validator_confidence = if self.validator_state.confidence_trend.is_empty() {
            0.0
        } else {
            self.validator_state.confidence_trend.iter().sum::<f64>()
                / self.validator_state.confidence_trend.len() as f64
        };
        (last5 * 0.4 + overall * 0.3 + mean_validator_confidence * 0.3).clamp(0.0, 1.0)
    }

    /// Derives the final outcome from recent-entry majority when no
    /// validator goal state was reached (spec.md 4.5 step 4).
    fn derive_outcome(&self) -> TaskOutcome {
        let execs = self.memory.query(Some(&["execution"]), 10, true, None);
        if execs.is_empty() {
            return TaskOutcome::Failure;
        }
        let successes = execs
            .iter()
            .filter(|e| matches!(&e.payload, EntryPayload::Execution(d) if d.success))
            .count();
        let ratio = successes as f64 / execs.len() as f64;
        if ratio >= 0.7 {
            TaskOutcome::Success
        } else if ratio >= 0.3 {
            TaskOutcome::Partial
        } else {
            TaskOutcome::Failure
        }
    }

    fn render_final_answer(&mut self, outcome: TaskOutcome) -> String {
        let steps: Vec<String> = self
            .memory
            .query(Some(&["execution"]), usize::MAX, true, None)
            .into_iter()
            .filter_map(|e| match e.payload {
                EntryPayload::Execution(d) => Some(format!(
                    "- {} ({}): {}",
                    d.step,
                    if d.success { "ok" } else { "failed" },
                    d.observation
                )),
                _ => None,
            })
            .collect();

        let summary = format!(
            "Task: {}\nOutcome: {:?}\nSteps:\n{}",
            self.task,
            outcome,
            if steps.is_empty() {
                "(no steps executed)".to_string()
            } else {
                steps.join("\n")
            }
        );
        self.memory.complete_task(outcome, summary.clone(), self.iteration);
        summary
    }
}

enum DispatchOutcome {
    Complete(String),
}

/// Generates a fresh session id the way the search engine assigns one when
/// the caller doesn't supply one of its own.
pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}
