use dashmap::DashMap;
use serde_json::{Map, Value};
use shared_types::{
    ExpectedOutcome, ImpactVector, LatencyRangeMs, ResultType, ScenarioKind,
    ScenarioPredictionConfig, ScenarioPredictionEntry, ToolScenario,
};
use std::time::{Duration, Instant};

/// Per-tool outcome distribution predictor and outcome learner
/// (spec.md 4.2 Scenario Predictor / Learner).
pub struct ScenarioPredictor {
    cache: DashMap<String, ScenarioPredictionEntry>,
    config: ScenarioPredictionConfig,
}

impl ScenarioPredictor {
    pub fn new(config: ScenarioPredictionConfig) -> Self {
        ScenarioPredictor {
            cache: DashMap::new(),
            config,
        }
    }

    /// Builds a stable fingerprint from tool name and input structure
    /// (spec.md 4.2 step 1): the tool name plus the sorted set of input keys,
    /// which is stable across calls with the same shape but different
    /// literal values.
    pub fn fingerprint(tool: &str, inputs: &Map<String, Value>) -> String {
        let mut keys: Vec<&str> = inputs.keys().map(|k| k.as_str()).collect();
        keys.sort_unstable();
        format!("{tool}::{}", keys.join(","))
    }

    /// Read-only snapshot of the prediction cache (spec.md 6.4
    /// `get_scenario_cache`).
    pub fn cache_snapshot(&self) -> Vec<(String, Vec<ToolScenario>, f64)> {
        self.cache
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.value().predictions.clone(),
                    entry.value().aggregate_confidence,
                )
            })
            .collect()
    }

    /// Returns cached or freshly computed predictions for `tool`/`inputs`
    /// (spec.md 4.2 steps 1-6). `requested_kinds`, if given, limits
    /// candidates to that set; otherwise every known kind is a candidate.
    pub fn predict(
        &self,
        tool: &str,
        inputs: &Map<String, Value>,
        requested_kinds: Option<&[ScenarioKind]>,
    ) -> Vec<ToolScenario> {
        if tool.is_empty() || !self.config.enabled {
            return Vec::new();
        }

        let key = Self::fingerprint(tool, inputs);
        let ttl = Duration::from_millis(self.config.cache_duration_ms);
        if let Some(entry) = self.cache.get(&key) {
            if entry.created_at.elapsed() < ttl {
                return entry.predictions.clone();
            }
        }

        let candidates: Vec<ScenarioKind> = requested_kinds
            .map(|k| k.to_vec())
            .unwrap_or_else(|| ScenarioKind::ALL.to_vec());

        let mut scored: Vec<(ScenarioKind, f64)> = candidates
            .into_iter()
            .map(|kind| (kind, kind.base_probability()))
            .filter(|(_, p)| *p >= self.config.min_probability_threshold)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        scored.truncate(self.config.max_scenarios_per_tool);

        let predictions: Vec<ToolScenario> = scored
            .into_iter()
            .map(|(kind, probability)| ToolScenario {
                kind,
                probability,
                expected_outcome: expected_outcome_for(tool, kind),
                follow_up_hints: follow_up_hints_for(kind),
                impact: impact_for(kind),
            })
            .collect();

        let aggregate_confidence = aggregate_confidence(&predictions);

        self.cache.insert(
            key,
            ScenarioPredictionEntry {
                predictions: predictions.clone(),
                aggregate_confidence,
                created_at: Instant::now(),
            },
        );

        predictions
    }

    /// Classifies a realized observation against the predicted scenarios
    /// (spec.md 4.2 "Outcome classification").
    pub fn classify(success: bool, observation: &str, predicted: &[ToolScenario]) -> ScenarioKind {
        if success {
            if predicted.iter().any(|s| s.kind == ScenarioKind::Success) {
                return ScenarioKind::Success;
            }
            return ScenarioKind::PartialSuccess;
        }

        let lower = observation.to_lowercase();
        if lower.contains("validation") {
            return ScenarioKind::ValidationError;
        }
        if lower.contains("connection") || lower.contains("network") {
            return ScenarioKind::ConnectionError;
        }
        if lower.contains("timeout") {
            return ScenarioKind::Timeout;
        }
        if lower.contains("not found") {
            return ScenarioKind::ToolNotFound;
        }
        if lower.contains("rate limit") {
            return ScenarioKind::RateLimited;
        }
        ScenarioKind::UnknownError
    }

    /// Applies the learning update for a realized scenario and recomputes
    /// aggregate confidence (spec.md 4.2 "Learning update"). No-op if
    /// `learnFromOutcomes` is disabled or the fingerprint isn't cached.
    pub fn learn(&self, tool: &str, inputs: &Map<String, Value>, realized: ScenarioKind) {
        if !self.config.learn_from_outcomes {
            return;
        }
        let key = Self::fingerprint(tool, inputs);
        if let Some(mut entry) = self.cache.get_mut(&key) {
            for scenario in entry.predictions.iter_mut() {
                if scenario.kind == realized {
                    scenario.probability = (scenario.probability + 0.10).min(1.0);
                } else {
                    scenario.probability = (scenario.probability - 0.05).max(0.0);
                }
            }
            entry.aggregate_confidence = aggregate_confidence(&entry.predictions);
        }
    }
}

/// Aggregate confidence = (kind-diversity + mean probability) / 2
/// (spec.md 4.2 step 6). Kind-diversity is the fraction of all known kinds
/// represented among the predictions.
fn aggregate_confidence(predictions: &[ToolScenario]) -> f64 {
    if predictions.is_empty() {
        return 0.0;
    }
    let diversity = predictions.len() as f64 / ScenarioKind::ALL.len() as f64;
    let mean_probability =
        predictions.iter().map(|s| s.probability).sum::<f64>() / predictions.len() as f64;
    (diversity + mean_probability) / 2.0
}

fn tool_family(tool: &str) -> &'static str {
    let lower = tool.to_lowercase();
    if lower.contains("search") || lower.contains("research") || lower.contains("lookup") {
        "search"
    } else if lower.contains("calc") || lower.contains("math") || lower.contains("compute") {
        "calculation"
    } else if lower.contains("extract") || lower.contains("parse") || lower.contains("read") {
        "extraction"
    } else {
        "other"
    }
}

fn expected_outcome_for(tool: &str, kind: ScenarioKind) -> ExpectedOutcome {
    let (result_type, sketch, latency) = match (tool_family(tool), kind) {
        ("search", ScenarioKind::Success) => (
            ResultType::Success,
            "list of search results".to_string(),
            LatencyRangeMs { min: 1_000, max: 5_000 },
        ),
        ("calculation", ScenarioKind::Success) => (
            ResultType::Success,
            "numeric result".to_string(),
            LatencyRangeMs { min: 100, max: 1_000 },
        ),
        ("extraction", ScenarioKind::Success) => (
            ResultType::Success,
            "extracted content string".to_string(),
            LatencyRangeMs { min: 2_000, max: 10_000 },
        ),
        (_, ScenarioKind::Success) => (
            ResultType::Success,
            "tool-specific result".to_string(),
            LatencyRangeMs { min: 500, max: 3_000 },
        ),
        (_, ScenarioKind::PartialSuccess) => (
            ResultType::Partial,
            "partial or incomplete result".to_string(),
            LatencyRangeMs { min: 500, max: 3_000 },
        ),
        (_, other) => (
            ResultType::Error,
            format!("error of kind {other:?}"),
            LatencyRangeMs { min: 500, max: 3_000 },
        ),
    };

    ExpectedOutcome {
        result_type,
        expected_data_sketch: sketch,
        expected_error_kind: match result_type {
            ResultType::Error => Some(format!("{kind:?}")),
            _ => None,
        },
        expected_latency_ms: latency,
        expected_metadata: Value::Null,
    }
}

fn follow_up_hints_for(kind: ScenarioKind) -> Vec<String> {
    match kind {
        ScenarioKind::ValidationError => vec!["check input schema".to_string()],
        ScenarioKind::ConnectionError => vec!["retry with backoff".to_string()],
        ScenarioKind::Timeout => vec!["reduce scope or retry".to_string()],
        ScenarioKind::ToolNotFound => vec!["re-check tool registry".to_string()],
        ScenarioKind::RateLimited => vec!["wait before retrying".to_string()],
        _ => Vec::new(),
    }
}

fn impact_for(kind: ScenarioKind) -> ImpactVector {
    match kind {
        ScenarioKind::Success => ImpactVector {
            progress_delta: 0.2,
            confidence_delta: 0.1,
            time_delta_ms: 0,
            trigger_validation: false,
            rescore_frontier: false,
        },
        ScenarioKind::PartialSuccess => ImpactVector {
            progress_delta: 0.1,
            confidence_delta: 0.0,
            time_delta_ms: 0,
            trigger_validation: true,
            rescore_frontier: false,
        },
        _ => ImpactVector {
            progress_delta: -0.05,
            confidence_delta: -0.1,
            time_delta_ms: 0,
            trigger_validation: true,
            rescore_frontier: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("query".to_string(), Value::String("rust async".to_string()));
        m
    }

    #[test]
    fn predict_respects_threshold_and_top_k() {
        let cfg = ScenarioPredictionConfig {
            max_scenarios_per_tool: 3,
            min_probability_threshold: 0.02,
            ..ScenarioPredictionConfig::default()
        };
        let predictor = ScenarioPredictor::new(cfg);
        let predictions = predictor.predict("web_search", &inputs(), None);
        assert!(predictions.len() <= 3);
        assert!(predictions.iter().all(|s| s.probability >= 0.02));
        assert!(predictions.windows(2).all(|w| w[0].probability >= w[1].probability));
    }

    #[test]
    fn unknown_tool_returns_empty_without_panicking() {
        let predictor = ScenarioPredictor::new(ScenarioPredictionConfig::default());
        let predictions = predictor.predict("", &inputs(), None);
        assert!(predictions.is_empty());
    }

    #[test]
    fn learning_update_boosts_realized_kind_and_decays_others() {
        let predictor = ScenarioPredictor::new(ScenarioPredictionConfig::default());
        let before = predictor.predict("calc_tool", &inputs(), None);
        let before_success = before
            .iter()
            .find(|s| s.kind == ScenarioKind::Success)
            .unwrap()
            .probability;

        predictor.learn("calc_tool", &inputs(), ScenarioKind::Success);

        let after = predictor.predict("calc_tool", &inputs(), None);
        let after_success = after
            .iter()
            .find(|s| s.kind == ScenarioKind::Success)
            .unwrap()
            .probability;
        assert!(after_success > before_success);

        let after_partial = after
            .iter()
            .find(|s| s.kind == ScenarioKind::PartialSuccess)
            .map(|s| s.probability)
            .unwrap_or(0.0);
        let before_partial = before
            .iter()
            .find(|s| s.kind == ScenarioKind::PartialSuccess)
            .map(|s| s.probability)
            .unwrap_or(0.0);
        assert!(after_partial <= before_partial);
    }

    #[test]
    fn classify_success_prefers_success_over_partial() {
        let predicted = vec![ToolScenario {
            kind: ScenarioKind::Success,
            probability: 0.7,
            expected_outcome: expected_outcome_for("tool", ScenarioKind::Success),
            follow_up_hints: Vec::new(),
            impact: impact_for(ScenarioKind::Success),
        }];
        let kind = ScenarioPredictor::classify(true, "done", &predicted);
        assert_eq!(kind, ScenarioKind::Success);
    }

    #[test]
    fn classify_failure_falls_back_to_unknown() {
        let kind = ScenarioPredictor::classify(false, "something weird happened", &[]);
        assert_eq!(kind, ScenarioKind::UnknownError);
    }
}
