use crate::traits::{ChatMessage, LlmClient, ToolDescriptor};
use chrono::Utc;
use regex::Regex;
use serde_json::{Map, Value};
use shared_types::{Plan, ScenarioKind};

/// Registered tools whose `INPUTS` require a specific parameter, plus the
/// alias map that normalizes equivalent spellings onto the canonical key
/// (spec.md 4.3, "per-tool alias map").
fn required_param(tool: &str) -> Option<&'static str> {
    match tool {
        "write_file" => Some("filename"),
        "search_web" => Some("query"),
        "execute_command" => Some("command"),
        _ => None,
    }
}

fn alias_map(tool: &str) -> &'static [&'static str] {
    match tool {
        "write_file" => &["filename", "file_path", "file_name"],
        _ => &[],
    }
}

/// Normalizes known aliases onto their canonical key in place (spec.md 4.3).
fn normalize_aliases(tool: &str, inputs: &mut Map<String, Value>) {
    let aliases = alias_map(tool);
    if aliases.is_empty() {
        return;
    }
    let canonical = aliases[0];
    if inputs.contains_key(canonical) {
        return;
    }
    for alias in &aliases[1..] {
        if let Some(v) = inputs.remove(*alias) {
            inputs.insert(canonical.to_string(), v);
            return;
        }
    }
}

/// Regex-detected "simple question" patterns that skip a memory digest
/// (spec.md 4.3 "Simple-question patterns").
fn is_simple_question(task: &str) -> bool {
    let lower = task.to_lowercase();
    let patterns = [
        r"^\s*what\s+is\s+-?\d+(\.\d+)?\s*(\+|-|\*|/|plus|minus|times|divided by)\s*-?\d+(\.\d+)?\s*\??\s*$",
        r"^\s*-?\d+(\.\d+)?\s*(\+|-|\*|/)\s*-?\d+(\.\d+)?\s*$",
    ];
    patterns
        .iter()
        .any(|p| Regex::new(p).unwrap().is_match(&lower))
}

/// Depth-0 actions that would answer prematurely (spec.md 4.3 "Depth-0 rule").
fn is_premature_answer(action: &str) -> bool {
    Regex::new(r"(?i)summarize|synthesize_answer|finalize|report")
        .unwrap()
        .is_match(action)
}

/// One parsed `PROPOSAL:` block before validation (spec.md 4.3).
struct RawProposal {
    action: String,
    tool: Option<String>,
    inputs_raw: String,
    reasoning: String,
    scenarios_raw: String,
}

/// Splits an LLM proposal response on `PROPOSAL:` and extracts sections by
/// case-insensitive key, terminating at the next `KEY:` or end of block
/// (spec.md 4.3 "The parser splits...").
fn parse_proposals(raw: &str) -> Vec<RawProposal> {
    let blocks: Vec<&str> = raw.split("PROPOSAL:").skip(1).collect();
    blocks
        .into_iter()
        .map(|block| RawProposal {
            action: extract_section(block, "ACTION").unwrap_or_default(),
            tool: extract_section(block, "TOOL").filter(|s| !s.is_empty()),
            inputs_raw: extract_section(block, "INPUTS").unwrap_or_default(),
            reasoning: extract_section(block, "REASONING").unwrap_or_default(),
            scenarios_raw: extract_section(block, "SCENARIOS").unwrap_or_default(),
        })
        .collect()
}

fn extract_section(block: &str, key: &str) -> Option<String> {
    let re = Regex::new(&format!(r"(?is){key}:\s*(.*?)(?:\n\s*[A-Z_]+:|\z)")).unwrap();
    re.captures(block)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Tolerant JSON parse: on failure, strips trailing commas and `//` line
/// comments and retries (spec.md 4.3 "tolerant re-parse").
fn parse_inputs_tolerant(raw: &str) -> Option<Map<String, Value>> {
    if raw.is_empty() {
        return Some(Map::new());
    }
    if let Ok(Value::Object(map)) = serde_json::from_str(raw) {
        return Some(map);
    }
    let stripped: String = raw
        .lines()
        .map(|line| match line.find("//") {
            Some(idx) => &line[..idx],
            None => line,
        })
        .collect::<Vec<_>>()
        .join("\n");
    let stripped = Regex::new(r",\s*([}\]])").unwrap().replace_all(&stripped, "$1");
    match serde_json::from_str(&stripped) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Generates up to `k` validated candidate plans (spec.md 4.3 "Generation
/// contract"). Invalid proposals are discarded; if none survive, returns an
/// empty vec and the caller falls back to a synthesized `gather_info` plan
/// (spec.md 7, "LLM parse failure").
pub async fn generate_plans(
    llm: &dyn LlmClient,
    task: &str,
    tools: &[ToolDescriptor],
    depth: u32,
    k: usize,
    memory_digest: &str,
) -> Vec<Plan> {
    let digest = if is_simple_question(task) { "" } else { memory_digest };
    let tool_names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();

    let system = ChatMessage::system(
        "You propose candidate next steps for a task. Respond with exactly the requested \
         number of PROPOSAL blocks, each containing ACTION, TOOL, INPUTS, REASONING, and \
         SCENARIOS sections.",
    );
    let user = ChatMessage::user(format!(
        "Task: {task}\nAvailable tools: {}\nDepth: {depth}\nProposals requested: {k}\n\
         Recent context:\n{digest}",
        tool_names.join(", ")
    ));

    let response = match llm.invoke(&[system, user]).await {
        Ok(r) => r,
        Err(_) => return Vec::new(),
    };

    let now = Utc::now();
    let mut plans = Vec::new();
    for raw in parse_proposals(&response) {
        if raw.action.is_empty() || raw.tool.as_deref().unwrap_or("").is_empty() {
            continue;
        }
        let tool = raw.tool.clone().unwrap();

        if depth == 0 && is_premature_answer(&raw.action) {
            continue;
        }

        let Some(mut inputs) = parse_inputs_tolerant(&raw.inputs_raw) else {
            continue;
        };
        normalize_aliases(&tool, &mut inputs);

        if let Some(required) = required_param(&tool) {
            if !inputs.contains_key(required) {
                continue;
            }
        }

        let mut plan = Plan::new(raw.action, Some(tool), inputs, raw.reasoning, depth, now);
        plan.predicted_scenarios = raw
            .scenarios_raw
            .split(',')
            .filter_map(ScenarioKind::parse)
            .map(scenario_placeholder)
            .collect();
        plans.push(plan);
    }
    plans
}

fn scenario_placeholder(kind: ScenarioKind) -> shared_types::ToolScenario {
    shared_types::ToolScenario {
        kind,
        probability: kind.base_probability(),
        expected_outcome: shared_types::ExpectedOutcome {
            result_type: shared_types::ResultType::Success,
            expected_data_sketch: String::new(),
            expected_error_kind: None,
            expected_latency_ms: shared_types::LatencyRangeMs { min: 0, max: 0 },
            expected_metadata: Value::Null,
        },
        follow_up_hints: Vec::new(),
        impact: shared_types::ImpactVector::default(),
    }
}

/// A builds-a-`write_file` plan fallback when zero proposals survive
/// validation (spec.md 7 "LLM parse failure").
pub fn fallback_gather_info_plan(depth: u32) -> Plan {
    let mut plan = Plan::new(
        "gather more information before proceeding",
        None,
        Map::new(),
        "no valid proposals survived parsing; falling back to information gathering",
        depth,
        Utc::now(),
    );
    plan.metadata.tags.insert("fallback".to_string());
    plan
}

/// Semantic action-family table used by the hint-alignment boost
/// (spec.md 4.3 score adjustment 1, 9 "closed in the source... keep the
/// table centralized").
fn action_family(tool: Option<&str>, action: &str) -> Option<&'static str> {
    let lower = action.to_lowercase();
    let families: &[(&[&str], &str, &str)] = &[
        (&["create", "write", "generate", "build"], "write_file", "write_file"),
        (&["search", "find", "lookup", "research"], "search_web", "search_web"),
        (&["execute", "run", "install", "command"], "execute_command", "execute_command"),
        (&["validate", "check", "verify", "test"], "validate", "validate"),
        (&["synthesize", "summarize", "recommend", "final"], "", "synthesis"),
    ];
    for (keywords, tool_match, family) in families {
        let tool_hits = !tool_match.is_empty() && tool == Some(*tool_match);
        let keyword_hits = keywords.iter().any(|k| lower.contains(k));
        if tool_hits || keyword_hits {
            return Some(family);
        }
    }
    None
}

fn hint_matches_family(hint: &str, family: &str) -> bool {
    let lower = hint.to_lowercase();
    match family {
        "write_file" => ["create", "write", "generate", "build"].iter().any(|k| lower.contains(k)),
        "search_web" => ["search", "find", "lookup", "research"].iter().any(|k| lower.contains(k)),
        "execute_command" => ["execute", "run", "install", "command"].iter().any(|k| lower.contains(k)),
        "validate" => ["validate", "check", "verify", "test"].iter().any(|k| lower.contains(k)),
        "synthesis" => ["synthesize", "summarize", "recommend", "final"].iter().any(|k| lower.contains(k)),
        _ => false,
    }
}

/// Mutable scoring context passed into [`apply_score_adjustments`]: the
/// slice of validator hints/issues and whatever progress/confidence/memory
/// facts the adjustments need (spec.md 4.3 score adjustments 1-8).
pub struct ScoringContext<'a> {
    pub hints: &'a [String],
    pub outstanding_issues: &'a [String],
    pub repeated_feedback: bool,
    pub overall_progress: f64,
    pub overall_confidence: f64,
    pub has_successful_write_file: bool,
    pub config: &'a shared_types::ValidatorConfig,
}

/// Applies spec.md 4.3's eight score adjustments in order, clamping to
/// [0,1] and re-applying the depth-0 filter as a final gate.
pub fn apply_score_adjustments(plan: &mut Plan, ctx: &ScoringContext) {
    let family = action_family(plan.tool.as_deref(), &plan.action);

    // 1. Hint alignment boost.
    if let Some(family) = family {
        if ctx.hints.iter().any(|h| hint_matches_family(h, family)) {
            plan.score += ctx.config.hint_boost;
            plan.validator.hint_aligned = true;
        }
    }

    // 2. Issue-addressing boost.
    let addresses_issue = ctx
        .outstanding_issues
        .iter()
        .any(|issue| plan.action.to_lowercase().contains(&issue.to_lowercase())
            || plan.reasoning.to_lowercase().contains(&issue.to_lowercase()));
    if addresses_issue {
        plan.score += 0.2;
    }

    // 3. Repeated-feedback escalation.
    if ctx.repeated_feedback && addresses_issue {
        plan.score += 0.4;
    } else if ctx.repeated_feedback && !plan.validator.hint_aligned {
        // 6. Confidence-impact penalty: repeated feedback not aligned with this plan.
        plan.validator.confidence_impact = Some(-0.1);
    }

    // 4. Validation-action gating.
    if plan.tool.as_deref() == Some("validate")
        && (ctx.overall_progress >= 0.5 || ctx.overall_confidence <= 0.6)
    {
        plan.score += 0.3;
    }

    // 5. Synthesis-after-implementation.
    if plan.tool.as_deref() == Some("write_file")
        && family == Some("synthesis")
        && ctx.has_successful_write_file
    {
        plan.score += 0.2;
    }

    // 7. Special-hint bonus.
    let test_hint = ctx.hints.iter().any(|h| h.to_lowercase().contains("test"));
    let code_hint = ctx.hints.iter().any(|h| h.to_lowercase().contains("code"));
    let action_lower = plan.action.to_lowercase();
    if test_hint && action_lower.contains("test") {
        plan.score += ctx.config.special_hint_boost;
    }
    if code_hint && (action_lower.contains("implement") || action_lower.contains("write")) {
        plan.score += ctx.config.special_hint_boost;
    }

    plan.clamp_score();

    // 8. Depth-0 filter re-applied after scoring.
    if plan.depth == 0 && is_premature_answer(&plan.action) {
        plan.score = 0.0;
    }
}

/// Parses the scorer's one-score-per-line response, falling back to the
/// 0.6/0.2 heuristic on malformed output (spec.md 4.3 "Scoring contract").
pub fn parse_scores(raw: &str, plans: &[Plan]) -> Vec<f64> {
    let lines: Vec<f64> = raw
        .lines()
        .filter_map(|l| l.trim().parse::<f64>().ok())
        .collect();
    if lines.len() == plans.len() {
        return lines;
    }
    plans
        .iter()
        .map(|p| if p.tool.is_some() { 0.6 } else { 0.2 })
        .collect()
}

/// Known-bad path/command signatures and their workspace-relative
/// adaptation (spec.md 4.3 "Failure-awareness pre-filter").
pub struct FailureAwareness<'a> {
    pub known_failure_patterns: &'a [String],
}

impl<'a> FailureAwareness<'a> {
    /// Rewrites high-risk plans and multiplies their score, mutating `plan`
    /// in place. Returns the multiplier applied, for diagnostics.
    pub fn adapt(&self, plan: &mut Plan) -> f64 {
        if plan.tool.as_deref() == Some("write_file") {
            if let Some(Value::String(path)) = plan.inputs.get("filename") {
                if path.starts_with("/var/www/html") {
                    let adapted = path.replacen("/var/www/html", "./workspace", 1);
                    plan.inputs.insert("filename".to_string(), Value::String(adapted));
                    plan.score *= 0.8;
                    return 0.8;
                }
            }
        }

        if plan.tool.as_deref() == Some("execute_command") {
            if let Some(Value::String(cmd)) = plan.inputs.get("command") {
                if cmd.contains("systemctl") {
                    let adapted = cmd.replace("systemctl", "true #");
                    plan.inputs.insert("command".to_string(), Value::String(adapted));
                    plan.score *= 0.7;
                    return 0.7;
                }
            }
        }

        let matches_known_failure = self.known_failure_patterns.iter().any(|pattern| {
            plan.action.to_lowercase().contains(&pattern.to_lowercase())
                || plan
                    .tool
                    .as_deref()
                    .map(|t| t.eq_ignore_ascii_case(pattern))
                    .unwrap_or(false)
        });
        if matches_known_failure {
            plan.reasoning = format!("[alternative approach] {}", plan.reasoning);
            plan.score *= 0.6;
            return 0.6;
        }

        1.0
    }

    /// Applies `adapt`, and when no adaptation was possible (multiplier
    /// stayed at 1.0 yet the plan is still flagged unsafe by the caller),
    /// applies the terminal 0.1 penalty.
    pub fn adapt_or_penalize(&self, plan: &mut Plan, unadaptable: bool) {
        let multiplier = self.adapt(plan);
        if unadaptable && multiplier == 1.0 {
            plan.score *= 0.1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{PlannerConfig};

    #[test]
    fn simple_question_patterns_detected() {
        assert!(is_simple_question("what is 2 + 2?"));
        assert!(is_simple_question("7 * 6"));
        assert!(!is_simple_question("build a web scraper for news sites"));
    }

    #[test]
    fn depth_zero_premature_answer_blocked() {
        assert!(is_premature_answer("Summarize the findings"));
        assert!(is_premature_answer("finalize the report"));
        assert!(!is_premature_answer("write the output file"));
    }

    #[test]
    fn proposal_parser_extracts_sections() {
        let raw = "PROPOSAL:\nACTION: write results\nTOOL: write_file\n\
                    INPUTS: {\"file_path\": \"out.txt\", \"content\": \"hi\"}\n\
                    REASONING: need a file\nSCENARIOS: success, validation_error\n";
        let proposals = parse_proposals(raw);
        assert_eq!(proposals.len(), 1);
        let p = &proposals[0];
        assert_eq!(p.action, "write results");
        assert_eq!(p.tool.as_deref(), Some("write_file"));
        assert!(p.inputs_raw.contains("out.txt"));
    }

    #[test]
    fn alias_normalization_maps_file_path_to_filename() {
        let mut inputs = Map::new();
        inputs.insert("file_path".to_string(), Value::String("a.txt".to_string()));
        normalize_aliases("write_file", &mut inputs);
        assert!(inputs.contains_key("filename"));
        assert!(!inputs.contains_key("file_path"));
    }

    #[test]
    fn tolerant_parse_strips_trailing_comma_and_comments() {
        let raw = "{\n  \"filename\": \"x.txt\", // comment\n  \"content\": \"y\",\n}";
        let parsed = parse_inputs_tolerant(raw).expect("should tolerate trailing comma/comment");
        assert_eq!(parsed.get("filename").unwrap(), "x.txt");
    }

    #[test]
    fn failure_awareness_adapts_var_www_html_path() {
        let mut plan = Plan::new(
            "write homepage",
            Some("write_file".to_string()),
            {
                let mut m = Map::new();
                m.insert("filename".to_string(), Value::String("/var/www/html/index.html".to_string()));
                m
            },
            "reasoning",
            1,
            Utc::now(),
        );
        plan.score = 1.0;
        let fa = FailureAwareness { known_failure_patterns: &[] };
        let multiplier = fa.adapt(&mut plan);
        assert_eq!(multiplier, 0.8);
        assert_eq!(plan.score, 0.8);
        assert_eq!(plan.inputs.get("filename").unwrap(), "./workspace/index.html");
    }

    #[test]
    fn score_adjustments_clamp_into_bounds() {
        let mut plan = Plan::new("implement tests", Some("execute_command".to_string()), Map::new(), "r", 1, Utc::now());
        plan.score = 0.9;
        let config = PlannerConfig::default();
        let ctx = ScoringContext {
            hints: &["please add more test coverage".to_string()],
            outstanding_issues: &[],
            repeated_feedback: false,
            overall_progress: 0.5,
            overall_confidence: 0.5,
            has_successful_write_file: false,
            config: &config.validator,
        };
        apply_score_adjustments(&mut plan, &ctx);
        assert!(plan.score <= 1.0);
    }
}
