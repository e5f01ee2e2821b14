use serde::{Deserialize, Serialize};

/// `validator.mode` (spec.md 6.5): how the search engine schedules validator
/// calls.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorMode {
    #[default]
    Action,
    Periodic,
    Both,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ValidatorConfig {
    pub every: u32,
    pub min_confidence: f64,
    pub mode: ValidatorMode,
    pub value_trigger: f64,
    pub cooldown: u32,
    pub hint_boost: f64,
    pub special_hint_boost: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        ValidatorConfig {
            every: 1,
            min_confidence: 0.7,
            mode: ValidatorMode::Action,
            value_trigger: 0.8,
            cooldown: 1,
            hint_boost: 0.35,
            special_hint_boost: 0.1,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ScenarioPredictionConfig {
    pub enabled: bool,
    pub max_scenarios_per_tool: usize,
    pub min_probability_threshold: f64,
    pub confidence_threshold: f64,
    pub learn_from_outcomes: bool,
    pub cache_duration_ms: u64,
}

impl Default for ScenarioPredictionConfig {
    fn default() -> Self {
        ScenarioPredictionConfig {
            enabled: true,
            max_scenarios_per_tool: 5,
            min_probability_threshold: 0.1,
            confidence_threshold: 0.6,
            learn_from_outcomes: true,
            cache_duration_ms: 300_000,
        }
    }
}

/// Per-tool health tracking and circuit-breaking, generalized from the
/// teacher's per-agent circuit breaker. Disabled by default, so it never
/// changes default dispatch behavior.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ToolHealthConfig {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub cooldown_ms: u64,
}

impl Default for ToolHealthConfig {
    fn default() -> Self {
        ToolHealthConfig {
            enabled: false,
            failure_threshold: 3,
            cooldown_ms: 60_000,
        }
    }
}

/// Capped exponential-backoff retry policy for tool execution, mirroring the
/// teacher's `AgentRetryConfig`. A single attempt (no retry) by default.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ToolRetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ToolRetryConfig {
    fn default() -> Self {
        ToolRetryConfig {
            max_attempts: 1,
            initial_backoff_ms: 100,
            max_backoff_ms: 2_000,
        }
    }
}

/// Full planner configuration (spec.md 6.5), assembled via [`PlannerConfigBuilder`].
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PlannerConfig {
    pub max_iterations: u32,
    pub beam_width: usize,
    pub min_score: f64,
    pub debug: bool,
    pub validator: ValidatorConfig,
    pub scenario_prediction: ScenarioPredictionConfig,
    pub tool_health: ToolHealthConfig,
    pub tool_retry: ToolRetryConfig,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            max_iterations: 40,
            beam_width: 4,
            min_score: 0.4,
            debug: false,
            validator: ValidatorConfig::default(),
            scenario_prediction: ScenarioPredictionConfig::default(),
            tool_health: ToolHealthConfig::default(),
            tool_retry: ToolRetryConfig::default(),
        }
    }
}

impl PlannerConfig {
    pub fn builder() -> PlannerConfigBuilder {
        PlannerConfigBuilder::default()
    }

    /// Load a config from a TOML document, applying `{{VAR}}`/`${VAR}`
    /// environment interpolation the same way the teacher's
    /// `config_service::load_single_config` does, then merging field-wise
    /// over the documented defaults.
    pub fn from_toml_str(raw: &str) -> Result<PlannerConfig, crate::error::PlannerError> {
        let interpolated = interpolate_env(raw);
        let parsed: TomlPlannerConfig = toml::from_str(&interpolated)
            .map_err(|e| crate::error::PlannerError::Config(e.to_string()))?;
        Ok(parsed.into_config())
    }
}

/// Mirrors `PlannerConfig` but with every field optional, so a partial TOML
/// document only overrides what it names (teacher's `merge_app_config`
/// pattern).
#[derive(Deserialize, Default)]
struct TomlPlannerConfig {
    max_iterations: Option<u32>,
    beam_width: Option<usize>,
    min_score: Option<f64>,
    debug: Option<bool>,
    validator: Option<TomlValidatorConfig>,
    scenario_prediction: Option<TomlScenarioConfig>,
    tool_health: Option<TomlToolHealthConfig>,
    tool_retry: Option<TomlToolRetryConfig>,
}

#[derive(Deserialize, Default)]
struct TomlToolHealthConfig {
    enabled: Option<bool>,
    failure_threshold: Option<u32>,
    cooldown_ms: Option<u64>,
}

#[derive(Deserialize, Default)]
struct TomlToolRetryConfig {
    max_attempts: Option<u32>,
    initial_backoff_ms: Option<u64>,
    max_backoff_ms: Option<u64>,
}

#[derive(Deserialize, Default)]
struct TomlValidatorConfig {
    every: Option<u32>,
    min_confidence: Option<f64>,
    mode: Option<ValidatorMode>,
    value_trigger: Option<f64>,
    cooldown: Option<u32>,
    hint_boost: Option<f64>,
    special_hint_boost: Option<f64>,
}

#[derive(Deserialize, Default)]
struct TomlScenarioConfig {
    enabled: Option<bool>,
    max_scenarios_per_tool: Option<usize>,
    min_probability_threshold: Option<f64>,
    confidence_threshold: Option<f64>,
    learn_from_outcomes: Option<bool>,
    cache_duration_ms: Option<u64>,
}

impl TomlPlannerConfig {
    fn into_config(self) -> PlannerConfig {
        let mut cfg = PlannerConfig::default();
        if let Some(v) = self.max_iterations {
            cfg.max_iterations = v;
        }
        if let Some(v) = self.beam_width {
            cfg.beam_width = v;
        }
        if let Some(v) = self.min_score {
            cfg.min_score = v;
        }
        if let Some(v) = self.debug {
            cfg.debug = v;
        }
        if let Some(v) = self.validator {
            if let Some(x) = v.every {
                cfg.validator.every = x;
            }
            if let Some(x) = v.min_confidence {
                cfg.validator.min_confidence = x;
            }
            if let Some(x) = v.mode {
                cfg.validator.mode = x;
            }
            if let Some(x) = v.value_trigger {
                cfg.validator.value_trigger = x;
            }
            if let Some(x) = v.cooldown {
                cfg.validator.cooldown = x;
            }
            if let Some(x) = v.hint_boost {
                cfg.validator.hint_boost = x;
            }
            if let Some(x) = v.special_hint_boost {
                cfg.validator.special_hint_boost = x;
            }
        }
        if let Some(v) = self.scenario_prediction {
            if let Some(x) = v.enabled {
                cfg.scenario_prediction.enabled = x;
            }
            if let Some(x) = v.max_scenarios_per_tool {
                cfg.scenario_prediction.max_scenarios_per_tool = x;
            }
            if let Some(x) = v.min_probability_threshold {
                cfg.scenario_prediction.min_probability_threshold = x;
            }
            if let Some(x) = v.confidence_threshold {
                cfg.scenario_prediction.confidence_threshold = x;
            }
            if let Some(x) = v.learn_from_outcomes {
                cfg.scenario_prediction.learn_from_outcomes = x;
            }
            if let Some(x) = v.cache_duration_ms {
                cfg.scenario_prediction.cache_duration_ms = x;
            }
        }
        if let Some(v) = self.tool_health {
            if let Some(x) = v.enabled {
                cfg.tool_health.enabled = x;
            }
            if let Some(x) = v.failure_threshold {
                cfg.tool_health.failure_threshold = x;
            }
            if let Some(x) = v.cooldown_ms {
                cfg.tool_health.cooldown_ms = x;
            }
        }
        if let Some(v) = self.tool_retry {
            if let Some(x) = v.max_attempts {
                cfg.tool_retry.max_attempts = x;
            }
            if let Some(x) = v.initial_backoff_ms {
                cfg.tool_retry.initial_backoff_ms = x;
            }
            if let Some(x) = v.max_backoff_ms {
                cfg.tool_retry.max_backoff_ms = x;
            }
        }
        cfg
    }
}

/// Replaces `{{VAR}}` and `${VAR}` with the matching environment variable,
/// leaving the placeholder untouched if the variable is unset (teacher's
/// `config_service::load_single_config`).
fn interpolate_env(raw: &str) -> String {
    let re = regex::Regex::new(r"\{\{(\w+)\}\}|\$\{(\w+)\}").unwrap();
    re.replace_all(raw, |caps: &regex::Captures| {
        let name = caps.get(1).or_else(|| caps.get(2)).unwrap().as_str();
        std::env::var(name).unwrap_or_else(|_| caps.get(0).unwrap().as_str().to_string())
    })
    .into_owned()
}

/// Fluent builder, one method per recognized knob (spec.md 9 Design Note).
#[derive(Default)]
pub struct PlannerConfigBuilder {
    inner: PlannerConfig,
}

impl PlannerConfigBuilder {
    pub fn max_iterations(mut self, v: u32) -> Self {
        self.inner.max_iterations = v;
        self
    }

    pub fn beam_width(mut self, v: usize) -> Self {
        self.inner.beam_width = v;
        self
    }

    pub fn min_score(mut self, v: f64) -> Self {
        self.inner.min_score = v;
        self
    }

    pub fn debug(mut self, v: bool) -> Self {
        self.inner.debug = v;
        self
    }

    pub fn validator_every(mut self, v: u32) -> Self {
        self.inner.validator.every = v;
        self
    }

    pub fn validator_min_confidence(mut self, v: f64) -> Self {
        self.inner.validator.min_confidence = v;
        self
    }

    pub fn validator_mode(mut self, v: ValidatorMode) -> Self {
        self.inner.validator.mode = v;
        self
    }

    pub fn validator_value_trigger(mut self, v: f64) -> Self {
        self.inner.validator.value_trigger = v;
        self
    }

    pub fn validator_cooldown(mut self, v: u32) -> Self {
        self.inner.validator.cooldown = v;
        self
    }

    pub fn validator_hint_boost(mut self, v: f64) -> Self {
        self.inner.validator.hint_boost = v;
        self
    }

    pub fn validator_special_hint_boost(mut self, v: f64) -> Self {
        self.inner.validator.special_hint_boost = v;
        self
    }

    pub fn scenario_prediction_enabled(mut self, v: bool) -> Self {
        self.inner.scenario_prediction.enabled = v;
        self
    }

    pub fn scenario_max_scenarios_per_tool(mut self, v: usize) -> Self {
        self.inner.scenario_prediction.max_scenarios_per_tool = v;
        self
    }

    pub fn scenario_min_probability_threshold(mut self, v: f64) -> Self {
        self.inner.scenario_prediction.min_probability_threshold = v;
        self
    }

    pub fn scenario_confidence_threshold(mut self, v: f64) -> Self {
        self.inner.scenario_prediction.confidence_threshold = v;
        self
    }

    pub fn scenario_learn_from_outcomes(mut self, v: bool) -> Self {
        self.inner.scenario_prediction.learn_from_outcomes = v;
        self
    }

    pub fn scenario_cache_duration_ms(mut self, v: u64) -> Self {
        self.inner.scenario_prediction.cache_duration_ms = v;
        self
    }

    pub fn tool_health_enabled(mut self, v: bool) -> Self {
        self.inner.tool_health.enabled = v;
        self
    }

    pub fn tool_health_failure_threshold(mut self, v: u32) -> Self {
        self.inner.tool_health.failure_threshold = v;
        self
    }

    pub fn tool_health_cooldown_ms(mut self, v: u64) -> Self {
        self.inner.tool_health.cooldown_ms = v;
        self
    }

    pub fn tool_retry_max_attempts(mut self, v: u32) -> Self {
        self.inner.tool_retry.max_attempts = v;
        self
    }

    pub fn tool_retry_initial_backoff_ms(mut self, v: u64) -> Self {
        self.inner.tool_retry.initial_backoff_ms = v;
        self
    }

    pub fn tool_retry_max_backoff_ms(mut self, v: u64) -> Self {
        self.inner.tool_retry.max_backoff_ms = v;
        self
    }

    pub fn build(self) -> PlannerConfig {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn from_toml_str_substitutes_env_vars_brace_syntax() {
        env::set_var("PLANNER_TEST_BEAM", "7");
        let cfg = PlannerConfig::from_toml_str(
            r#"
beam_width = {{PLANNER_TEST_BEAM}}
"#,
        )
        .expect("config should load");

        assert_eq!(cfg.beam_width, 7);
        assert_eq!(cfg.max_iterations, PlannerConfig::default().max_iterations);
    }

    #[test]
    fn from_toml_str_substitutes_env_vars_dollar_syntax() {
        env::set_var("PLANNER_TEST_MODE", "periodic");
        let cfg = PlannerConfig::from_toml_str(
            r#"
[validator]
mode = "${PLANNER_TEST_MODE}"
"#,
        )
        .expect("config should load");

        assert_eq!(cfg.validator.mode, ValidatorMode::Periodic);
    }

    #[test]
    fn from_toml_str_reads_from_a_real_file_and_only_overrides_named_fields() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            r#"
max_iterations = 12

[validator]
min_confidence = 0.55
"#
        )
        .expect("write config");

        let raw = std::fs::read_to_string(file.path()).expect("read temp file");
        let cfg = PlannerConfig::from_toml_str(&raw).expect("config should load");

        assert_eq!(cfg.max_iterations, 12);
        assert_eq!(cfg.validator.min_confidence, 0.55);
        // Untouched fields fall back to the documented defaults.
        assert_eq!(cfg.beam_width, PlannerConfig::default().beam_width);
        assert_eq!(cfg.validator.every, ValidatorConfig::default().every);
        assert_eq!(
            cfg.scenario_prediction.enabled,
            ScenarioPredictionConfig::default().enabled
        );
    }

    #[test]
    fn from_toml_str_leaves_unset_placeholder_untouched() {
        env::remove_var("PLANNER_TEST_UNSET_VAR");
        let err = PlannerConfig::from_toml_str(
            r#"
[validator]
mode = "${PLANNER_TEST_UNSET_VAR}"
"#,
        )
        .expect_err("an unresolved placeholder is not a valid ValidatorMode");
        assert!(matches!(err, crate::error::PlannerError::Config(_)));
    }

    #[test]
    fn builder_sets_every_recognized_knob() {
        let cfg = PlannerConfig::builder()
            .max_iterations(5)
            .beam_width(2)
            .min_score(0.9)
            .debug(true)
            .validator_every(3)
            .validator_min_confidence(0.4)
            .validator_mode(ValidatorMode::Both)
            .validator_value_trigger(0.6)
            .validator_cooldown(2)
            .validator_hint_boost(0.2)
            .validator_special_hint_boost(0.05)
            .scenario_prediction_enabled(false)
            .scenario_max_scenarios_per_tool(3)
            .scenario_min_probability_threshold(0.2)
            .scenario_confidence_threshold(0.5)
            .scenario_learn_from_outcomes(false)
            .scenario_cache_duration_ms(1_000)
            .build();

        assert_eq!(cfg.max_iterations, 5);
        assert_eq!(cfg.beam_width, 2);
        assert_eq!(cfg.validator.mode, ValidatorMode::Both);
        assert!(!cfg.scenario_prediction.enabled);
        assert_eq!(cfg.scenario_prediction.cache_duration_ms, 1_000);
    }
}
