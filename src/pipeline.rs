//! End-to-end planning: rules in, schedule out.

use std::sync::Arc;

use tracing::{debug, info, info_span};

use crate::assembler::{InjectionOutcome, assemble};
use crate::capability::Capability;
use crate::config::PlannerConfig;
use crate::embedding::HttpEmbedder;
use crate::error::{ConfigurationError, PlannerError};
use crate::generation::{GenerationTier, Generator};
use crate::instructions::ConstraintProgram;
use crate::llm::ChatCompletionClient;
use crate::model::{AgentTable, CustomerTable};
use crate::patterns::{Intent, Pattern, PatternStore};
use crate::retrieval::{RetrievalStage, Retriever, SemanticIndex};
use crate::routing::IndexManager;
use crate::schedule::Schedule;
use crate::solver::LocalSearchRouting;
use crate::traits::CodeGenerator;

/// The pattern chosen for one rule.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub rule: String,
    /// `None` only when the knowledge base is empty.
    pub pattern_id: Option<String>,
    pub intent: Option<Intent>,
    pub stage: Option<RetrievalStage>,
}

#[derive(Debug, Clone)]
pub struct PlanReport {
    pub matches: Vec<RuleMatch>,
    pub program: ConstraintProgram,
    pub tier: GenerationTier,
    pub injection: InjectionOutcome,
    pub default_visit_cap: bool,
    pub schedule: Schedule,
}

pub struct Planner {
    config: PlannerConfig,
    retriever: Retriever,
    generator: Generator,
}

impl Planner {
    /// Loads the knowledge base and initializes the optional capabilities.
    /// Only a broken knowledge base is fatal.
    pub fn new(config: PlannerConfig) -> Result<Self, ConfigurationError> {
        let store = match &config.knowledge_base {
            Some(path) => PatternStore::load(path)?,
            None => PatternStore::builtin()?,
        };

        let semantic = Capability::from_result(
            "semantic-index",
            HttpEmbedder::new(config.embedding.clone())
                .and_then(|embedder| SemanticIndex::build(Arc::new(embedder), &store)),
        );
        let remote = Capability::from_result(
            "remote-generation",
            ChatCompletionClient::connect(config.generation.clone())
                .map(|client| Arc::new(client) as Arc<dyn CodeGenerator>),
        );

        Ok(Self::with_capabilities(config, store, semantic, remote))
    }

    /// Planner that never touches the network.
    pub fn offline() -> Result<Self, ConfigurationError> {
        Self::new(PlannerConfig::offline())
    }

    pub fn with_capabilities(
        config: PlannerConfig,
        store: PatternStore,
        semantic: Capability<SemanticIndex>,
        remote: Capability<Arc<dyn CodeGenerator>>,
    ) -> Self {
        Self {
            retriever: Retriever::new(store, semantic, config.retrieval.clone()),
            generator: Generator::new(remote),
            config,
        }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Plans one request. Blank rules are ignored.
    pub fn plan(
        &self,
        rules: &[String],
        customers: &CustomerTable,
        agents: &AgentTable,
    ) -> Result<PlanReport, PlannerError> {
        let span = info_span!("plan", rules = rules.len(), customers = customers.len(), agents = agents.len());
        let _guard = span.enter();

        let mut matches = Vec::with_capacity(rules.len());
        let mut matched_rules = Vec::new();
        let mut patterns: Vec<&Pattern> = Vec::new();
        for rule in rules {
            if rule.trim().is_empty() {
                debug!("skipping blank rule");
                continue;
            }
            let found = self
                .retriever
                .retrieve_with_stage(rule, self.config.retrieval.top_k)
                .and_then(|(found, stage)| found.first().map(|pattern| (*pattern, stage)));
            match found {
                Some((pattern, stage)) => {
                    matches.push(RuleMatch {
                        rule: rule.clone(),
                        pattern_id: Some(pattern.id.clone()),
                        intent: Some(pattern.intent.clone()),
                        stage: Some(stage),
                    });
                    matched_rules.push(rule.clone());
                    patterns.push(pattern);
                }
                None => matches.push(RuleMatch {
                    rule: rule.clone(),
                    pattern_id: None,
                    intent: None,
                    stage: None,
                }),
            }
        }

        let (program, tier) = self
            .generator
            .generate_with_tier(&matched_rules, &patterns, customers, agents);

        let manager = IndexManager::new(customers.len(), agents.len());
        let assembled = assemble(
            LocalSearchRouting::new(&manager),
            customers,
            agents,
            Some(&program),
            &self.config.solve,
        )?;
        let injection = assembled.injection.clone();
        let default_visit_cap = assembled.default_visit_cap;
        let schedule = assembled.solve(customers, agents, &self.config.solve);

        info!(
            tier = %tier,
            applied = injection.is_applied(),
            solve_failed = schedule.is_solve_failed(),
            "plan finished"
        );
        Ok(PlanReport {
            matches,
            program,
            tier,
            injection,
            default_visit_cap,
            schedule,
        })
    }
}
