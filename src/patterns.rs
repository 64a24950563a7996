//! Pattern store: the knowledge base of known rule shapes.
//!
//! Each pattern carries example phrasings, an intent tag, a human readable
//! description and an instruction template with `{name}` placeholders.

use std::fmt;
use std::fs;
use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ConfigurationError;

const BUILTIN_KNOWLEDGE_BASE: &str = include_str!("../data/knowledge_base.json");

/// Constraint category a pattern implements. The set is open: unknown tags
/// are kept as [`Intent::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Intent {
    LimitVisitCount,
    ServiceTimeWindow,
    MaximizePriority,
    Other(String),
}

impl Intent {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "limit_visit_count" => Intent::LimitVisitCount,
            "service_time_window" => Intent::ServiceTimeWindow,
            "maximize_priority" => Intent::MaximizePriority,
            other => Intent::Other(other.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            Intent::LimitVisitCount => "limit_visit_count",
            Intent::ServiceTimeWindow => "service_time_window",
            Intent::MaximizePriority => "maximize_priority",
            Intent::Other(tag) => tag,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One example phrasing, compiled as a probe against incoming rules.
#[derive(Debug, Clone)]
pub struct Phrasing {
    text: String,
    probe: Option<Regex>,
}

impl Phrasing {
    fn compile(text: &str) -> Self {
        let probe = match Regex::new(text) {
            Ok(probe) => Some(probe),
            Err(err) => {
                debug!(phrasing = text, error = %err, "phrasing is not a regex, probing literally");
                None
            }
        };
        Self {
            text: text.to_string(),
            probe,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn matches(&self, rule: &str) -> bool {
        match &self.probe {
            Some(probe) => probe.is_match(rule),
            None => rule.contains(&self.text),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Pattern {
    pub id: String,
    pub phrasings: Vec<Phrasing>,
    pub intent: Intent,
    pub description: String,
    pub template: String,
}

impl Pattern {
    /// Replaces `{key}` placeholders with the given values.
    pub fn render_template<'a>(
        &self,
        parameters: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> String {
        let mut rendered = self.template.clone();
        for (key, value) in parameters {
            rendered = rendered.replace(&format!("{{{}}}", key), value);
        }
        rendered
    }
}

#[derive(Debug, Deserialize)]
struct KnowledgeBaseDocument {
    semantic_patterns: Vec<PatternEntry>,
}

#[derive(Debug, Deserialize)]
struct PatternEntry {
    #[serde(default)]
    id: Option<String>,
    patterns: Vec<String>,
    intent: String,
    description: String,
    template: String,
}

/// Immutable table of patterns, in knowledge base order.
#[derive(Debug, Clone, Default)]
pub struct PatternStore {
    patterns: Vec<Pattern>,
}

impl PatternStore {
    /// The knowledge base shipped with the crate.
    pub fn builtin() -> Result<Self, ConfigurationError> {
        Self::from_json(BUILTIN_KNOWLEDGE_BASE)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigurationError> {
        let document: KnowledgeBaseDocument =
            serde_json::from_str(raw).map_err(ConfigurationError::KnowledgeBaseFormat)?;
        if document.semantic_patterns.is_empty() {
            return Err(ConfigurationError::EmptyKnowledgeBase);
        }

        let mut patterns = Vec::with_capacity(document.semantic_patterns.len());
        for (position, entry) in document.semantic_patterns.into_iter().enumerate() {
            let id = entry
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| format!("pattern-{}", position));
            let invalid = |reason: &str| ConfigurationError::InvalidPattern {
                id: id.clone(),
                reason: reason.to_string(),
            };
            if entry.description.trim().is_empty() {
                return Err(invalid("empty description"));
            }
            if entry.intent.trim().is_empty() {
                return Err(invalid("empty intent"));
            }
            if entry.patterns.is_empty() {
                return Err(invalid("no example phrasings"));
            }
            if patterns.iter().any(|p: &Pattern| p.id == id) {
                warn!(pattern = %id, "duplicate pattern id in knowledge base");
            }

            patterns.push(Pattern {
                phrasings: entry.patterns.iter().map(|p| Phrasing::compile(p)).collect(),
                intent: Intent::from_tag(entry.intent.trim()),
                description: entry.description,
                template: entry.template,
                id,
            });
        }

        debug!(patterns = patterns.len(), "knowledge base loaded");
        Ok(Self { patterns })
    }

    /// A store with no patterns; retrieval over it returns nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn all_patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    /// One row per phrasing, in store order.
    pub fn patterns_with_phrasings(&self) -> impl Iterator<Item = (&Phrasing, &Pattern)> {
        self.patterns
            .iter()
            .flat_map(|pattern| pattern.phrasings.iter().map(move |phrasing| (phrasing, pattern)))
    }

    pub fn get(&self, id: &str) -> Option<&Pattern> {
        self.patterns.iter().find(|pattern| pattern.id == id)
    }

    pub fn first(&self) -> Option<&Pattern> {
        self.patterns.first()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_store_loads() {
        let store = PatternStore::builtin().unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(
            store.get("daily_visit_limit").map(|p| &p.intent),
            Some(&Intent::LimitVisitCount)
        );
        assert!(store.all_patterns().iter().all(|p| !p.description.is_empty()));
    }

    #[test]
    fn one_row_per_phrasing() {
        let store = PatternStore::builtin().unwrap();
        let rows = store.patterns_with_phrasings().count();
        let expected: usize = store.all_patterns().iter().map(|p| p.phrasings.len()).sum();
        assert_eq!(rows, expected);
    }

    #[test]
    fn rejects_empty_collection() {
        let err = PatternStore::from_json(r#"{"semantic_patterns": []}"#).unwrap_err();
        assert!(matches!(err, ConfigurationError::EmptyKnowledgeBase));
    }

    #[test]
    fn rejects_malformed_document() {
        let err = PatternStore::from_json(r#"{"patterns": 3}"#).unwrap_err();
        assert!(matches!(err, ConfigurationError::KnowledgeBaseFormat(_)));
    }

    #[test]
    fn rejects_missing_description() {
        let err = PatternStore::from_json(
            r#"{"semantic_patterns": [
                {"id": "x", "patterns": ["a"], "intent": "t", "description": " ", "template": ""}
            ]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidPattern { .. }));
    }

    #[test]
    fn invalid_regex_probes_literally() {
        let phrasing = Phrasing::compile("至少(两次");
        assert!(phrasing.matches("每月至少(两次回访"));
        assert!(!phrasing.matches("至少两次"));
    }

    #[test]
    fn unknown_intent_is_kept() {
        let store = PatternStore::from_json(
            r#"{"semantic_patterns": [
                {"patterns": ["均衡"], "intent": "balance_workload",
                 "description": "Balance", "template": ""}
            ]}"#,
        )
        .unwrap();
        let pattern = &store.all_patterns()[0];
        assert_eq!(pattern.id, "pattern-0");
        assert_eq!(pattern.intent, Intent::Other("balance_workload".to_string()));
    }

    #[test]
    fn renders_placeholders() {
        let store = PatternStore::builtin().unwrap();
        let pattern = store.get("daily_visit_limit").unwrap();
        assert_eq!(
            pattern.render_template([("max_count", "6")]),
            "visit_count_cap max=6"
        );
    }
}
