use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One predicted (or realized) outcome kind for a tool invocation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    Success,
    PartialSuccess,
    ValidationError,
    SecurityError,
    ConnectionError,
    Timeout,
    ToolNotFound,
    UnknownError,
    RateLimited,
    InsufficientData,
    Cancelled,
}

impl ScenarioKind {
    /// All kinds the predictor knows about, in the fixed base-probability order
    /// from spec.md 4.2 step 3.
    pub const ALL: [ScenarioKind; 11] = [
        ScenarioKind::Success,
        ScenarioKind::PartialSuccess,
        ScenarioKind::ConnectionError,
        ScenarioKind::ValidationError,
        ScenarioKind::SecurityError,
        ScenarioKind::Timeout,
        ScenarioKind::InsufficientData,
        ScenarioKind::ToolNotFound,
        ScenarioKind::UnknownError,
        ScenarioKind::RateLimited,
        ScenarioKind::Cancelled,
    ];

    /// Fixed base probability table (spec.md 4.2 step 3).
    pub fn base_probability(self) -> f64 {
        match self {
            ScenarioKind::Success => 0.70,
            ScenarioKind::PartialSuccess => 0.15,
            ScenarioKind::ConnectionError => 0.03,
            ScenarioKind::ValidationError => 0.05,
            ScenarioKind::SecurityError => 0.02,
            ScenarioKind::Timeout => 0.02,
            ScenarioKind::InsufficientData => 0.02,
            ScenarioKind::ToolNotFound => 0.01,
            ScenarioKind::UnknownError => 0.01,
            ScenarioKind::RateLimited => 0.01,
            ScenarioKind::Cancelled => 0.01,
        }
    }

    /// Parse a free-text scenario kind name as supplied by the plan generator's
    /// `SCENARIOS:` proposal field (comma-separated in the raw text).
    pub fn parse(raw: &str) -> Option<ScenarioKind> {
        let normalized = raw.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "success" => Some(ScenarioKind::Success),
            "partial_success" => Some(ScenarioKind::PartialSuccess),
            "validation_error" => Some(ScenarioKind::ValidationError),
            "security_error" => Some(ScenarioKind::SecurityError),
            "connection_error" => Some(ScenarioKind::ConnectionError),
            "timeout" => Some(ScenarioKind::Timeout),
            "tool_not_found" => Some(ScenarioKind::ToolNotFound),
            "unknown_error" => Some(ScenarioKind::UnknownError),
            "rate_limited" => Some(ScenarioKind::RateLimited),
            "insufficient_data" => Some(ScenarioKind::InsufficientData),
            "cancelled" | "canceled" => Some(ScenarioKind::Cancelled),
            _ => None,
        }
    }
}

/// Coarse classification of what a scenario's realization looks like.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResultType {
    Success,
    Partial,
    Error,
}

/// A latency range in milliseconds, inclusive on both ends.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct LatencyRangeMs {
    pub min: u64,
    pub max: u64,
}

/// Sketch of what a scenario's outcome is expected to look like, used to
/// prime prompting and downstream classification.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ExpectedOutcome {
    pub result_type: ResultType,
    pub expected_data_sketch: String,
    pub expected_error_kind: Option<String>,
    pub expected_latency_ms: LatencyRangeMs,
    pub expected_metadata: Value,
}

/// How a realized scenario should move the search: progress/confidence
/// deltas and whether it ought to trigger validation or a re-score.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ImpactVector {
    pub progress_delta: f64,
    pub confidence_delta: f64,
    pub time_delta_ms: i64,
    pub trigger_validation: bool,
    pub rescore_frontier: bool,
}

impl Default for ImpactVector {
    fn default() -> Self {
        ImpactVector {
            progress_delta: 0.0,
            confidence_delta: 0.0,
            time_delta_ms: 0,
            trigger_validation: false,
            rescore_frontier: false,
        }
    }
}

/// One predicted outcome for a (tool, inputs) shape, with its probability.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ToolScenario {
    pub kind: ScenarioKind,
    pub probability: f64,
    pub expected_outcome: ExpectedOutcome,
    pub follow_up_hints: Vec<String>,
    pub impact: ImpactVector,
}

/// A cached set of predictions for one (tool, inputs) fingerprint.
#[derive(Debug, Clone)]
pub struct ScenarioPredictionEntry {
    pub predictions: Vec<ToolScenario>,
    pub aggregate_confidence: f64,
    pub created_at: std::time::Instant,
}
