//! Error taxonomy for the planner.
//!
//! Only [`ConfigurationError`] is fatal to a request. The other kinds are
//! recovered inside the stage that raised them and only show up in logs and
//! in the [`crate::pipeline::PlanReport`].

use std::path::PathBuf;

use thiserror::Error;

/// Malformed or missing knowledge base, config file or input tables.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed knowledge base: {0}")]
    KnowledgeBaseFormat(#[source] serde_json::Error),

    #[error("knowledge base contains no patterns")]
    EmptyKnowledgeBase,

    #[error("pattern `{id}` is invalid: {reason}")]
    InvalidPattern { id: String, reason: String },

    #[error("customer `{name}` is invalid: {reason}")]
    InvalidCustomer { name: String, reason: String },

    #[error("agent `{name}` is invalid: {reason}")]
    InvalidAgent { name: String, reason: String },

    #[error("malformed config file: {0}")]
    ConfigFormat(#[source] serde_json::Error),
}

/// An external capability (embedding or remote generation) is missing or
/// misbehaving.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("capability unavailable: {0}")]
    Unavailable(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Vectors could not be indexed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("vector {row} has dimension {found}, expected {expected}")]
    DimensionMismatch {
        row: usize,
        found: usize,
        expected: usize,
    },
}

/// Instruction text could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstructionError {
    #[error("line {line}: malformed argument `{token}`")]
    Syntax { line: usize, token: String },

    #[error("line {line}: unknown instruction `{keyword}`")]
    UnknownInstruction { line: usize, keyword: String },

    #[error("line {line}: `{keyword}` requires `{parameter}`")]
    MissingParameter {
        line: usize,
        keyword: String,
        parameter: String,
    },

    #[error("line {line}: invalid value `{value}` for `{parameter}`")]
    InvalidValue {
        line: usize,
        parameter: String,
        value: String,
    },
}

/// The remote tier failed to produce a usable program.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error("unusable reply: {0}")]
    Unusable(#[from] InstructionError),

    #[error("reply contained no instructions")]
    EmptyReply,

    #[error("parameter extraction failed: {0}")]
    Extraction(#[from] regex::Error),

    #[error("failed to build prompt: {0}")]
    Prompt(#[from] serde_json::Error),
}

/// Rejected mutation of the routing model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("unknown dimension {0}")]
    UnknownDimension(usize),

    #[error("dimension `{0}` already exists")]
    DuplicateDimension(String),

    #[error("node {node} out of range (model has {node_count} nodes)")]
    NodeOutOfRange { node: usize, node_count: usize },

    #[error("empty range [{min}, {max}]")]
    EmptyRange { min: i64, max: i64 },

    #[error("invalid capacity: {0}")]
    InvalidCapacity(String),

    #[error("invalid penalty {0}")]
    InvalidPenalty(i64),

    #[error("the depot cannot be part of a disjunction")]
    DepotDisjunction,
}

/// Applying a constraint program to a live model failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InjectionError {
    #[error("invalid instruction `{instruction}`: {reason}")]
    InvalidInstruction { instruction: String, reason: String },

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Errors surfaced to the caller of [`crate::pipeline::Planner::plan`].
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("failed to build the base routing model: {0}")]
    Model(#[from] ModelError),
}
