//! Constraint generation cascade.
//!
//! Three tiers, tried in order:
//!
//! 1. knowledge base assembly: parameters extracted from the rule text are
//!    substituted into the matched pattern's template;
//! 2. remote generation through a [`CodeGenerator`];
//! 3. a minimal fallback keyed only on intents.
//!
//! [`Generator::generate`] always returns a program.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::capability::Capability;
use crate::error::GenerationError;
use crate::instructions::{ConstraintProgram, Instruction, ProgramOrigin};
use crate::model::{AgentTable, CustomerTable, DEFAULT_MAX_VISITS, Priority};
use crate::patterns::{Intent, Pattern};
use crate::traits::CodeGenerator;

/// Penalty used for priority disjunctions when the rule gives none.
pub const DEFAULT_PRIORITY_PENALTY: i64 = 1000;

pub const SYSTEM_INSTRUCTION: &str = "You are a precise optimization modeling assistant. \
Output only constraint instructions, one per line, no explanations. \
Allowed instructions: `visit_count_cap max=<n>`, `time_window priority=<A|B|C>`, \
`priority_disjunction priority=<A|B|C> penalty=<n>`. Lines starting with # are comments.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationTier {
    KnowledgeBase,
    Remote,
    Fallback,
}

impl fmt::Display for GenerationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GenerationTier::KnowledgeBase => "knowledge-base",
            GenerationTier::Remote => "remote",
            GenerationTier::Fallback => "fallback",
        };
        f.write_str(name)
    }
}

/// Parameters read from one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleParameters {
    /// Visit cap, only for visit-count patterns.
    pub max_count: Option<i64>,
    /// Hour range, `(start, end)`.
    pub hours: Option<(u32, u32)>,
    pub priority: Priority,
    pub penalty: Option<i64>,
}

impl RuleParameters {
    /// Placeholder values for template substitution.
    pub fn placeholders(&self) -> Vec<(&'static str, String)> {
        let mut values = vec![("priority", self.priority.to_string())];
        if let Some(max_count) = self.max_count {
            values.push(("max_count", max_count.to_string()));
        }
        if let Some((start, end)) = self.hours {
            values.push(("start", start.to_string()));
            values.push(("end", end.to_string()));
        }
        if let Some(penalty) = self.penalty {
            values.push(("penalty", penalty.to_string()));
        }
        values
    }
}

/// Regexes used to read parameters out of rule text.
struct ParameterExtractor {
    integer: Regex,
    hours: Regex,
    priority: Regex,
}

impl ParameterExtractor {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            integer: Regex::new(r"\d+")?,
            hours: Regex::new(r"(\d{1,2})\s*[-~～到至]\s*(\d{1,2})\s*点")?,
            priority: Regex::new(r"([ABCabc])类")?,
        })
    }

    fn extract(&self, rule: &str, pattern: &Pattern) -> RuleParameters {
        let max_count = (pattern.intent == Intent::LimitVisitCount).then(|| {
            self.integer
                .find(rule)
                .and_then(|literal| literal.as_str().parse().ok())
                .unwrap_or(i64::from(DEFAULT_MAX_VISITS))
        });

        let hours: Option<(u32, u32)> = self.hours.captures(rule).and_then(|captures| {
            let start = captures.get(1)?.as_str().parse().ok()?;
            let end = captures.get(2)?.as_str().parse().ok()?;
            Some((start, end))
        });

        let priority = self
            .priority
            .captures(rule)
            .and_then(|captures| captures.get(1))
            .and_then(|class| class.as_str().parse().ok())
            .unwrap_or(Priority::A);

        let penalty = rule.contains("优先").then_some(DEFAULT_PRIORITY_PENALTY);

        RuleParameters {
            max_count,
            hours,
            priority,
            penalty,
        }
    }
}

/// Extracts the parameters of `rule` for `pattern`.
pub fn extract_parameters(rule: &str, pattern: &Pattern) -> Result<RuleParameters, GenerationError> {
    Ok(ParameterExtractor::new()?.extract(rule, pattern))
}

/// Everything a tier may look at.
struct GenerationRequest<'a> {
    rules: &'a [String],
    matches: &'a [&'a Pattern],
    customers: &'a CustomerTable,
    agents: &'a AgentTable,
}

impl GenerationRequest<'_> {
    fn pairs(&self) -> impl Iterator<Item = (&str, &Pattern)> {
        self.rules
            .iter()
            .map(String::as_str)
            .zip(self.matches.iter().copied())
    }
}

enum TierOutcome {
    Produced(ConstraintProgram),
    /// The tier ran but had nothing to contribute.
    Declined,
    Unavailable(String),
    Failed(GenerationError),
}

trait GenerationStrategy {
    fn tier(&self) -> GenerationTier;

    fn attempt(&self, request: &GenerationRequest<'_>) -> TierOutcome;
}

struct KnowledgeBaseAssembly;

impl KnowledgeBaseAssembly {
    fn assemble(&self, request: &GenerationRequest<'_>) -> Result<ConstraintProgram, GenerationError> {
        let extractor = ParameterExtractor::new()?;
        let mut program = ConstraintProgram::new(ProgramOrigin::KnowledgeBase);
        program.comment("constraints assembled from the knowledge base");

        for (rule, pattern) in request.pairs() {
            let parameters = extractor.extract(rule, pattern);
            let placeholders = parameters.placeholders();
            let rendered =
                pattern.render_template(placeholders.iter().map(|(key, value)| (*key, value.as_str())));
            program.comment(format!("{} ({})", rule, pattern.id));

            match &pattern.intent {
                Intent::LimitVisitCount => program.extend_from_text(&rendered)?,
                Intent::ServiceTimeWindow => {
                    if let Some((start, end)) = parameters.hours {
                        program.comment(format!("window {}-{}h", start, end));
                    }
                    program.push(Instruction::PriorityTimeWindow {
                        priority: parameters.priority,
                    });
                }
                Intent::MaximizePriority => program.push(Instruction::PriorityDisjunction {
                    priority: parameters.priority,
                    penalty: parameters.penalty.unwrap_or(DEFAULT_PRIORITY_PENALTY),
                }),
                Intent::Other(tag) => {
                    if let Err(err) = program.extend_from_text(&rendered) {
                        debug!(intent = %tag, error = %err, "template not usable");
                        program.comment(format!("skipped: no instruction for intent `{}`", tag));
                    }
                }
            }
        }
        Ok(program)
    }
}

impl GenerationStrategy for KnowledgeBaseAssembly {
    fn tier(&self) -> GenerationTier {
        GenerationTier::KnowledgeBase
    }

    fn attempt(&self, request: &GenerationRequest<'_>) -> TierOutcome {
        match self.assemble(request) {
            Ok(program) if !program.is_empty() => TierOutcome::Produced(program),
            Ok(_) => TierOutcome::Declined,
            Err(err) => TierOutcome::Failed(err),
        }
    }
}

struct RemoteGeneration<'g> {
    remote: &'g Capability<Arc<dyn CodeGenerator>>,
}

impl RemoteGeneration<'_> {
    fn generate(
        &self,
        generator: &dyn CodeGenerator,
        request: &GenerationRequest<'_>,
    ) -> Result<ConstraintProgram, GenerationError> {
        let prompt = build_prompt(request.rules, request.matches, request.customers, request.agents)?;
        let reply = generator.complete(SYSTEM_INSTRUCTION, &prompt)?;
        let program = ConstraintProgram::parse(&reply, ProgramOrigin::Remote)?;
        if program.is_empty() {
            return Err(GenerationError::EmptyReply);
        }
        Ok(program)
    }
}

impl GenerationStrategy for RemoteGeneration<'_> {
    fn tier(&self) -> GenerationTier {
        GenerationTier::Remote
    }

    fn attempt(&self, request: &GenerationRequest<'_>) -> TierOutcome {
        let Some(generator) = self.remote.get() else {
            return TierOutcome::Unavailable(self.remote.reason().unwrap_or_default().to_string());
        };
        match self.generate(generator.as_ref(), request) {
            Ok(program) => TierOutcome::Produced(program),
            Err(err) => TierOutcome::Failed(err),
        }
    }
}

/// Builds the remote prompt: the rules as a JSON list and the matched
/// patterns as reference context.
pub fn build_prompt(
    rules: &[String],
    matches: &[&Pattern],
    customers: &CustomerTable,
    agents: &AgentTable,
) -> Result<String, GenerationError> {
    let rules_json = serde_json::to_string_pretty(rules)?;
    let context = matches
        .iter()
        .map(|pattern| format!("Pattern: {}\nTemplate: {}", pattern.description, pattern.template))
        .collect::<Vec<_>>()
        .join("\n");
    let classes = [Priority::A, Priority::B, Priority::C]
        .iter()
        .map(|class| format!("{}: {}", class, customers.with_priority(*class).count()))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!(
        "Translate the business rules into constraint instructions.\n\n\
         Business rules:\n{}\n\n\
         Reference knowledge:\n{}\n\n\
         Customers: {} ({})\nAgents: {}\n\n\
         Output only instruction lines.",
        rules_json,
        context,
        customers.len(),
        classes,
        agents.len()
    ))
}

/// Intent-only fallback, marked as degraded.
fn minimal_fallback(matches: &[&Pattern], origin: ProgramOrigin) -> ConstraintProgram {
    let mut program = ConstraintProgram::new(origin);
    match origin {
        ProgramOrigin::FallbackFailed => {
            program.comment("degraded: remote generation failed, minimal constraints")
        }
        _ => program.comment("degraded: remote generation unavailable, minimal constraints"),
    }

    let mut applied = false;
    for pattern in matches {
        match pattern.intent {
            Intent::LimitVisitCount => {
                program.comment(format!("at most {} visits per agent", DEFAULT_MAX_VISITS));
                program.push(Instruction::VisitCountCap {
                    max_visits: i64::from(DEFAULT_MAX_VISITS),
                });
                applied = true;
            }
            Intent::ServiceTimeWindow => {
                program.comment("time windows come from customer data");
                applied = true;
            }
            Intent::MaximizePriority => {
                program.comment("priority is expressed through drop penalties");
                applied = true;
            }
            Intent::Other(_) => {}
        }
    }
    if !applied {
        program.comment("no constraints");
    }
    program
}

/// Runs the generation cascade.
#[derive(Debug, Clone)]
pub struct Generator {
    remote: Capability<Arc<dyn CodeGenerator>>,
}

impl Generator {
    pub fn new(remote: Capability<Arc<dyn CodeGenerator>>) -> Self {
        Self { remote }
    }

    pub fn offline() -> Self {
        Self::new(Capability::unavailable("remote generation not configured"))
    }

    pub fn remote(&self) -> &Capability<Arc<dyn CodeGenerator>> {
        &self.remote
    }

    /// Generates the constraint program for `rules`, where `matches[i]` is
    /// the pattern retrieved for `rules[i]`.
    pub fn generate(
        &self,
        rules: &[String],
        matches: &[&Pattern],
        customers: &CustomerTable,
        agents: &AgentTable,
    ) -> ConstraintProgram {
        self.generate_with_tier(rules, matches, customers, agents).0
    }

    pub fn generate_with_tier(
        &self,
        rules: &[String],
        matches: &[&Pattern],
        customers: &CustomerTable,
        agents: &AgentTable,
    ) -> (ConstraintProgram, GenerationTier) {
        let request = GenerationRequest {
            rules,
            matches,
            customers,
            agents,
        };
        let remote = RemoteGeneration {
            remote: &self.remote,
        };
        let tiers: [&dyn GenerationStrategy; 2] = [&KnowledgeBaseAssembly, &remote];

        let mut remote_failed = false;
        for strategy in tiers {
            match strategy.attempt(&request) {
                TierOutcome::Produced(program) => {
                    info!(
                        tier = %strategy.tier(),
                        instructions = program.instructions().len(),
                        "constraint program generated"
                    );
                    return (program, strategy.tier());
                }
                TierOutcome::Declined => {
                    debug!(tier = %strategy.tier(), "generation tier produced no instructions");
                }
                TierOutcome::Unavailable(reason) => {
                    debug!(tier = %strategy.tier(), reason = %reason, "generation tier unavailable");
                }
                TierOutcome::Failed(err) => {
                    warn!(tier = %strategy.tier(), error = %err, "generation tier failed");
                    if strategy.tier() == GenerationTier::Remote {
                        remote_failed = true;
                    }
                }
            }
        }

        let origin = if remote_failed {
            ProgramOrigin::FallbackFailed
        } else {
            ProgramOrigin::FallbackUnavailable
        };
        let program = minimal_fallback(matches, origin);
        info!(origin = ?origin, "using minimal fallback constraints");
        (program, GenerationTier::Fallback)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::CapabilityError;
    use crate::model::Customer;
    use crate::patterns::PatternStore;

    struct ScriptedGenerator {
        reply: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing(reason: &str) -> Self {
            Self {
                reply: Err(reason.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    impl CodeGenerator for ScriptedGenerator {
        fn name(&self) -> &str {
            "scripted"
        }

        fn complete(&self, _system: &str, prompt: &str) -> Result<String, CapabilityError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone().map_err(CapabilityError::Protocol)
        }
    }

    fn tables() -> (CustomerTable, AgentTable) {
        let customers = CustomerTable::new(vec![Customer {
            id: "c1".to_string(),
            name: "Ruijin Hospital".to_string(),
            lat: 31.21,
            lon: 121.47,
            priority: Priority::A,
            time_window_start: 9,
            time_window_end: 12,
            service_time_minutes: 30,
        }])
        .unwrap();
        (customers, AgentTable::default())
    }

    fn unmatched_store() -> PatternStore {
        PatternStore::from_json(
            r#"{"semantic_patterns": [
                {"id": "balance", "patterns": ["均衡"], "intent": "balance_workload",
                 "description": "Balance workload across agents", "template": "balance agents"}
            ]}"#,
        )
        .unwrap()
    }

    fn rules(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|text| text.to_string()).collect()
    }

    #[test]
    fn max_count_is_first_integer_literal() {
        let store = PatternStore::builtin().unwrap();
        let pattern = store.get("daily_visit_limit").unwrap();
        assert_eq!(
            extract_parameters("每个销售每天最多拜访6个客户, 8点出发", pattern).unwrap().max_count,
            Some(6)
        );
        assert_eq!(
            extract_parameters("每天拜访不超过几个客户", pattern).unwrap().max_count,
            Some(4)
        );
    }

    #[test]
    fn max_count_only_for_visit_limits() {
        let store = PatternStore::builtin().unwrap();
        let pattern = store.get("priority_time_window").unwrap();
        let parameters = extract_parameters("B类客户必须在9~11点拜访", pattern).unwrap();
        assert_eq!(parameters.max_count, None);
        assert_eq!(parameters.hours, Some((9, 11)));
        assert_eq!(parameters.priority, Priority::B);
        assert_eq!(parameters.penalty, None);
    }

    #[test]
    fn knowledge_base_tier_builds_typed_program() {
        let store = PatternStore::builtin().unwrap();
        let matches = vec![
            store.get("daily_visit_limit").unwrap(),
            store.get("priority_time_window").unwrap(),
        ];
        let (customers, agents) = tables();
        let generator = Generator::offline();
        let rules = rules(&["每个销售每天最多拜访4个客户", "医院客户必须在9-12点拜访"]);

        let (program, tier) = generator.generate_with_tier(&rules, &matches, &customers, &agents);
        assert_eq!(tier, GenerationTier::KnowledgeBase);
        assert_eq!(program.origin(), ProgramOrigin::KnowledgeBase);
        assert_eq!(
            program.instructions(),
            &[
                Instruction::VisitCountCap { max_visits: 4 },
                Instruction::PriorityTimeWindow { priority: Priority::A },
            ]
        );
        assert!(program.listing().contains("# window 9-12h"));
    }

    #[test]
    fn knowledge_base_tier_is_deterministic() {
        let store = PatternStore::builtin().unwrap();
        let matches = vec![store.get("priority_first").unwrap()];
        let (customers, agents) = tables();
        let generator = Generator::offline();
        let rules = rules(&["A类客户优先安排"]);

        let first = generator.generate(&rules, &matches, &customers, &agents);
        let second = generator.generate(&rules, &matches, &customers, &agents);
        assert_eq!(first, second);
        assert_eq!(
            first.instructions(),
            &[Instruction::PriorityDisjunction {
                priority: Priority::A,
                penalty: 1000,
            }]
        );
    }

    #[test]
    fn remote_tier_runs_when_knowledge_base_declines() {
        let store = unmatched_store();
        let matches = vec![store.get("balance").unwrap()];
        let (customers, agents) = tables();
        let scripted = Arc::new(ScriptedGenerator::replying("```\nvisit_count_cap max=3\n```"));
        let generator = Generator::new(Capability::Available(scripted.clone()));
        let rules = rules(&["工作量要均衡"]);

        let (program, tier) = generator.generate_with_tier(&rules, &matches, &customers, &agents);
        assert_eq!(tier, GenerationTier::Remote);
        assert_eq!(program.instructions(), &[Instruction::VisitCountCap { max_visits: 3 }]);

        let prompts = scripted.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("\"工作量要均衡\""));
        assert!(prompts[0].contains("Balance workload across agents"));
    }

    #[test]
    fn remote_failure_is_hard_fallback() {
        let store = unmatched_store();
        let matches = vec![store.get("balance").unwrap()];
        let (customers, agents) = tables();
        let generator = Generator::new(Capability::Available(Arc::new(ScriptedGenerator::failing(
            "connection reset",
        ))));

        let (program, tier) =
            generator.generate_with_tier(&rules(&["工作量要均衡"]), &matches, &customers, &agents);
        assert_eq!(tier, GenerationTier::Fallback);
        assert!(program.is_hard_failure());
        assert!(program.listing().contains("degraded"));
    }

    #[test]
    fn unparsable_reply_is_hard_fallback() {
        let store = unmatched_store();
        let matches = vec![store.get("balance").unwrap()];
        let (customers, agents) = tables();
        let generator = Generator::new(Capability::Available(Arc::new(ScriptedGenerator::replying(
            "routing.AddDimension(cb, 0, 10, True, 'x')",
        ))));

        let program = generator.generate(&rules(&["工作量要均衡"]), &matches, &customers, &agents);
        assert_eq!(program.origin(), ProgramOrigin::FallbackFailed);
    }

    #[test]
    fn offline_fallback_without_known_intent_says_so() {
        let store = unmatched_store();
        let matches = vec![store.get("balance").unwrap()];
        let (customers, agents) = tables();

        let program =
            Generator::offline().generate(&rules(&["工作量要均衡"]), &matches, &customers, &agents);
        assert_eq!(program.origin(), ProgramOrigin::FallbackUnavailable);
        assert!(program.is_empty());
        assert!(program.listing().ends_with("# no constraints"));
    }

    #[test]
    fn fallback_caps_visits_for_visit_intent() {
        let store = PatternStore::builtin().unwrap();
        let pattern = store.get("daily_visit_limit").unwrap();
        let program = minimal_fallback(&[pattern], ProgramOrigin::FallbackUnavailable);
        assert_eq!(program.instructions(), &[Instruction::VisitCountCap { max_visits: 4 }]);
        assert!(!program.listing().is_empty());
    }
}
