//! rule-planner
//!
//! Turns natural-language business rules into routing constraints and solves
//! the resulting field-visit scheduling problem.
//!
//! A request flows through four stages: retrieval maps each rule to a known
//! constraint pattern, generation turns the matches into a
//! [`instructions::ConstraintProgram`], the assembler applies it to a routing
//! model, and the solver produces a [`schedule::Schedule`].

pub mod assembler;
pub mod capability;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod instructions;
pub mod llm;
pub mod model;
pub mod patterns;
pub mod pipeline;
pub mod retrieval;
pub mod routing;
pub mod schedule;
pub mod solver;
pub mod traits;
pub mod vector_index;

pub use config::PlannerConfig;
pub use error::{ConfigurationError, PlannerError};
pub use model::{Agent, AgentTable, Customer, CustomerTable, Priority};
pub use pipeline::{PlanReport, Planner};
pub use schedule::Schedule;
