use crate::scenario::ToolScenario;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use uuid::Uuid;

/// Opaque, unique-per-task identity for a candidate plan.
pub type PlanId = Uuid;

/// Per-plan bookkeeping the validator integration subsystem attaches during
/// scoring (spec.md 4.3, score adjustment 6).
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct PlanValidatorRecord {
    /// Recorded when repeated validator feedback does not align with this
    /// plan; affects downstream validator state but never the score directly.
    pub confidence_impact: Option<f64>,
    /// True once a hint-alignment boost has been applied, so re-scoring does
    /// not double-apply it.
    pub hint_aligned: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PlanMetadata {
    pub created_at: DateTime<Utc>,
    pub execution_attempts: u32,
    pub executed: bool,
    pub priority_tag: Option<String>,
    pub tags: HashSet<String>,
}

impl PlanMetadata {
    pub fn new(created_at: DateTime<Utc>) -> Self {
        PlanMetadata {
            created_at,
            execution_attempts: 0,
            executed: false,
            priority_tag: None,
            tags: HashSet::new(),
        }
    }
}

/// A candidate next step produced by the Plan Generator.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Plan {
    pub id: PlanId,
    pub action: String,
    /// Registered tool name, or `None` meaning "no-op".
    pub tool: Option<String>,
    pub inputs: Map<String, Value>,
    pub reasoning: String,
    pub depth: u32,
    pub score: f64,
    pub predicted_scenarios: Vec<ToolScenario>,
    pub validator: PlanValidatorRecord,
    pub metadata: PlanMetadata,
}

impl Plan {
    pub fn new(
        action: impl Into<String>,
        tool: Option<String>,
        inputs: Map<String, Value>,
        reasoning: impl Into<String>,
        depth: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Plan {
            id: Uuid::new_v4(),
            action: action.into(),
            tool,
            inputs,
            reasoning: reasoning.into(),
            depth,
            score: 0.0,
            predicted_scenarios: Vec::new(),
            validator: PlanValidatorRecord::default(),
            metadata: PlanMetadata::new(now),
        }
    }

    /// Clamp score into [0, 1], the invariant every scorer/adjustment must
    /// preserve (spec.md 8, "Score bounds").
    pub fn clamp_score(&mut self) {
        self.score = self.score.clamp(0.0, 1.0);
    }
}
