//! Rule → pattern retrieval.
//!
//! Stages run in order and the first one that matches wins:
//! exact regex probe, semantic nearest neighbours, keyword overlap, and
//! finally the first pattern of the store.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::capability::Capability;
use crate::config::RetrievalConfig;
use crate::error::CapabilityError;
use crate::patterns::{Pattern, PatternStore};
use crate::traits::{Embedder, VectorIndex};
use crate::vector_index::FlatL2Index;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalStage {
    Exact,
    Semantic,
    Keyword,
    Default,
}

impl fmt::Display for RetrievalStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RetrievalStage::Exact => "exact",
            RetrievalStage::Semantic => "semantic",
            RetrievalStage::Keyword => "keyword",
            RetrievalStage::Default => "default",
        };
        f.write_str(name)
    }
}

/// Result of one retrieval stage.
#[derive(Debug)]
enum StageOutcome {
    /// Pattern positions in the store, best first.
    Matched(Vec<usize>),
    NoMatch,
    Unavailable,
}

trait RetrievalStrategy {
    fn stage(&self) -> RetrievalStage;

    fn attempt(&self, store: &PatternStore, rule: &str, k: usize) -> StageOutcome;
}

/// Embeddings of every phrasing in the store, built once.
pub struct SemanticIndex {
    embedder: Arc<dyn Embedder>,
    index: FlatL2Index,
    /// Pattern position of each indexed phrasing.
    owners: Vec<usize>,
}

impl SemanticIndex {
    pub fn build(embedder: Arc<dyn Embedder>, store: &PatternStore) -> Result<Self, CapabilityError> {
        let mut texts = Vec::new();
        let mut owners = Vec::new();
        for (position, pattern) in store.all_patterns().iter().enumerate() {
            for phrasing in &pattern.phrasings {
                texts.push(phrasing.text().to_string());
                owners.push(position);
            }
        }
        if texts.is_empty() {
            return Err(CapabilityError::Unavailable(
                "knowledge base has no phrasings to index".to_string(),
            ));
        }

        let vectors = embedder.embed(&texts)?;
        if vectors.len() != texts.len() {
            return Err(CapabilityError::Protocol(format!(
                "embedded {} phrasings, got {} vectors",
                texts.len(),
                vectors.len()
            )));
        }
        let index = FlatL2Index::build(vectors)?;

        info!(
            embedder = embedder.name(),
            phrasings = index.len(),
            dimension = index.dimension(),
            "semantic index built"
        );
        Ok(Self {
            embedder,
            index,
            owners,
        })
    }

    /// `(pattern position, squared distance)` of the `k` nearest phrasings.
    pub fn search(&self, rule: &str, k: usize) -> Result<Vec<(usize, f32)>, CapabilityError> {
        let query = self
            .embedder
            .embed(&[rule.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| CapabilityError::Protocol("empty embedding reply".to_string()))?;

        Ok(self
            .index
            .nearest(&query, k)
            .into_iter()
            .filter_map(|(row, distance)| self.owners.get(row).map(|owner| (*owner, distance)))
            .collect())
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

impl fmt::Debug for SemanticIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SemanticIndex")
            .field("embedder", &self.embedder.name())
            .field("phrasings", &self.owners.len())
            .finish()
    }
}

struct ExactProbe;

impl RetrievalStrategy for ExactProbe {
    fn stage(&self) -> RetrievalStage {
        RetrievalStage::Exact
    }

    fn attempt(&self, store: &PatternStore, rule: &str, _k: usize) -> StageOutcome {
        store
            .all_patterns()
            .iter()
            .position(|pattern| pattern.phrasings.iter().any(|phrasing| phrasing.matches(rule)))
            .map_or(StageOutcome::NoMatch, |position| {
                StageOutcome::Matched(vec![position])
            })
    }
}

struct SemanticSearch<'r> {
    index: &'r Capability<SemanticIndex>,
    threshold: f32,
}

impl RetrievalStrategy for SemanticSearch<'_> {
    fn stage(&self) -> RetrievalStage {
        RetrievalStage::Semantic
    }

    fn attempt(&self, _store: &PatternStore, rule: &str, k: usize) -> StageOutcome {
        let Some(index) = self.index.get() else {
            return StageOutcome::Unavailable;
        };
        let neighbours = match index.search(rule, k) {
            Ok(neighbours) => neighbours,
            Err(err) => {
                warn!(error = %err, "semantic search failed");
                return StageOutcome::NoMatch;
            }
        };

        // Neighbours arrive nearest first, so the first hit per pattern is its best.
        let mut positions: Vec<usize> = Vec::new();
        for (position, distance) in neighbours {
            if distance < self.threshold && !positions.contains(&position) {
                positions.push(position);
            }
        }
        if positions.is_empty() {
            StageOutcome::NoMatch
        } else {
            StageOutcome::Matched(positions)
        }
    }
}

struct KeywordOverlap;

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Maximal runs of CJK ideographs in `text`.
fn cjk_tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !is_cjk(c)).filter(|token| !token.is_empty())
}

impl KeywordOverlap {
    /// Tokens of the best phrasing found verbatim in the rule.
    fn score(pattern: &Pattern, rule: &str) -> usize {
        pattern
            .phrasings
            .iter()
            .map(|phrasing| {
                cjk_tokens(phrasing.text())
                    .filter(|token| rule.contains(token))
                    .count()
            })
            .max()
            .unwrap_or(0)
    }
}

impl RetrievalStrategy for KeywordOverlap {
    fn stage(&self) -> RetrievalStage {
        RetrievalStage::Keyword
    }

    fn attempt(&self, store: &PatternStore, rule: &str, _k: usize) -> StageOutcome {
        let mut best: Option<(usize, usize)> = None;
        for (position, pattern) in store.all_patterns().iter().enumerate() {
            let score = Self::score(pattern, rule);
            if score > 0 && best.is_none_or(|(_, top)| score > top) {
                best = Some((position, score));
            }
        }
        match best {
            Some((position, score)) => {
                debug!(score, "keyword overlap");
                StageOutcome::Matched(vec![position])
            }
            None => StageOutcome::NoMatch,
        }
    }
}

struct FirstPattern;

impl RetrievalStrategy for FirstPattern {
    fn stage(&self) -> RetrievalStage {
        RetrievalStage::Default
    }

    fn attempt(&self, store: &PatternStore, _rule: &str, _k: usize) -> StageOutcome {
        if store.is_empty() {
            StageOutcome::NoMatch
        } else {
            StageOutcome::Matched(vec![0])
        }
    }
}

/// Maps free-text rules to knowledge base patterns.
#[derive(Debug)]
pub struct Retriever {
    store: PatternStore,
    semantic: Capability<SemanticIndex>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(store: PatternStore, semantic: Capability<SemanticIndex>, config: RetrievalConfig) -> Self {
        Self {
            store,
            semantic,
            config,
        }
    }

    /// Retriever without the semantic stage.
    pub fn offline(store: PatternStore) -> Self {
        Self::new(
            store,
            Capability::unavailable("semantic search not configured"),
            RetrievalConfig::default(),
        )
    }

    pub fn store(&self) -> &PatternStore {
        &self.store
    }

    pub fn semantic(&self) -> &Capability<SemanticIndex> {
        &self.semantic
    }

    /// Up to `k` patterns for `rule`. Empty only when the store is empty.
    pub fn retrieve(&self, rule: &str, k: usize) -> Vec<&Pattern> {
        self.retrieve_with_stage(rule, k)
            .map(|(patterns, _)| patterns)
            .unwrap_or_default()
    }

    /// Like [`Retriever::retrieve`], also reporting the stage that matched.
    pub fn retrieve_with_stage(&self, rule: &str, k: usize) -> Option<(Vec<&Pattern>, RetrievalStage)> {
        let semantic = SemanticSearch {
            index: &self.semantic,
            threshold: self.config.similarity_threshold,
        };
        let stages: [&dyn RetrievalStrategy; 4] = [&ExactProbe, &semantic, &KeywordOverlap, &FirstPattern];

        for strategy in stages {
            match strategy.attempt(&self.store, rule, k) {
                StageOutcome::Matched(positions) => {
                    let patterns: Vec<&Pattern> = positions
                        .into_iter()
                        .filter_map(|position| self.store.all_patterns().get(position))
                        .collect();
                    debug!(
                        stage = %strategy.stage(),
                        pattern = patterns.first().map(|p| p.id.as_str()).unwrap_or(""),
                        "rule matched"
                    );
                    return Some((patterns, strategy.stage()));
                }
                StageOutcome::NoMatch => continue,
                StageOutcome::Unavailable => {
                    debug!(stage = %strategy.stage(), "retrieval stage skipped");
                    continue;
                }
            }
        }
        None
    }

    /// Retrieval with the configured neighbour count.
    pub fn retrieve_default(&self, rule: &str) -> Vec<&Pattern> {
        self.retrieve(rule, self.config.top_k)
    }
}
