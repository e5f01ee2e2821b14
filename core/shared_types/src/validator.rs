use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Returned by the external validator agent (spec.md 3.1 Validator Verdict).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ValidatorVerdict {
    pub completed: bool,
    pub confidence: f64,
    pub issues: Vec<String>,
    pub suggested_next_actions: Vec<String>,
    pub evidence_needed: Vec<String>,
    pub rationale: String,
    pub timestamp: DateTime<Utc>,
    pub iteration: u32,
}

/// Ring-buffered confidence trend, capped to a fixed length (spec.md 4.3
/// "Validator state transitions": "push confidence onto trend (ring-buffered
/// to length 10)").
const CONFIDENCE_TREND_LEN: usize = 10;

/// Aggregated, per-task validator state (spec.md 3.1 Validator State).
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ValidatorState {
    pub history: Vec<ValidatorVerdict>,
    pub hints: Vec<String>,
    pub confidence_trend: VecDeque<f64>,
    /// `None` represents "-infinity": no validation has happened yet, so the
    /// cooldown never blocks the first call.
    pub last_validation_iteration: Option<u32>,
    pub cooldown_remaining: u32,
    pub last_verdict: Option<ValidatorVerdict>,
}

impl ValidatorState {
    /// Records one validator call: appends history, pushes the confidence
    /// trend (dropping the oldest entry past the cap), records the hints,
    /// and sets the last-validation iteration.
    pub fn record(&mut self, verdict: ValidatorVerdict) {
        self.hints = verdict.suggested_next_actions.clone();
        self.last_validation_iteration = Some(verdict.iteration);

        self.confidence_trend.push_back(verdict.confidence);
        while self.confidence_trend.len() > CONFIDENCE_TREND_LEN {
            self.confidence_trend.pop_front();
        }

        self.last_verdict = Some(verdict.clone());
        self.history.push(verdict);
    }

    /// Decrements the cooldown counter by one iteration, never below zero
    /// (spec.md 3.2 invariant 4).
    pub fn tick_cooldown(&mut self) {
        self.cooldown_remaining = self.cooldown_remaining.saturating_sub(1);
    }

    pub fn reset_cooldown(&mut self, cooldown: u32) {
        self.cooldown_remaining = cooldown;
    }

    /// True if the last `n` verdicts all carried the identical
    /// `suggested_next_actions` list (the "loop" signature used by deadlock
    /// escape, spec.md 4.4).
    pub fn last_n_verdicts_repeat(&self, n: usize) -> bool {
        if self.history.len() < n || n == 0 {
            return false;
        }
        let tail = &self.history[self.history.len() - n..];
        let first = &tail[0].suggested_next_actions;
        tail.iter().all(|v| &v.suggested_next_actions == first)
    }
}

/// A validator-escalation trigger condition for the validation action
/// (spec.md 4.5.1).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorTrigger {
    Progress,
    Confidence,
    Level,
    Manual,
    Adaptive,
}

impl ValidatorTrigger {
    pub fn parse(raw: &str) -> Option<ValidatorTrigger> {
        match raw.trim().to_lowercase().as_str() {
            "progress" => Some(ValidatorTrigger::Progress),
            "confidence" => Some(ValidatorTrigger::Confidence),
            "level" => Some(ValidatorTrigger::Level),
            "manual" => Some(ValidatorTrigger::Manual),
            "adaptive" => Some(ValidatorTrigger::Adaptive),
            _ => None,
        }
    }
}

/// Task-type inference used for informational acceptance criteria
/// (spec.md 4.4).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    CodingProblem,
    WebDevelopment,
    ResearchAnalysis,
    SystemSetup,
    Documentation,
    General,
}

impl TaskType {
    /// Keyword-based task-type inference (spec.md 4.4).
    pub fn infer(task: &str) -> TaskType {
        let lower = task.to_lowercase();
        if lower.contains("leetcode") || lower.contains("algorithm") || lower.contains("coding") {
            TaskType::CodingProblem
        } else if lower.contains("webapp") || lower.contains("website") {
            TaskType::WebDevelopment
        } else if lower.contains("research") || lower.contains("analyze") {
            TaskType::ResearchAnalysis
        } else if lower.contains("install") || lower.contains("setup") || lower.contains("configure")
        {
            TaskType::SystemSetup
        } else if lower.contains("create")
            && (lower.contains("file") || lower.contains("document"))
        {
            TaskType::Documentation
        } else {
            TaskType::General
        }
    }
}

/// Which force-completion rule fired, for diagnostics (spec.md 9, open
/// question: "implementations should apply whichever triggers first and
/// record which rule fired").
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GoalReachedReason {
    ValidatorAccepted,
    DeadlockEscapeWithEvidence,
    IterationBudgetWithRepeatedFeedback,
}
