//! Explicit handles for optional external capabilities.
//!
//! A capability is initialized once, when the planner is built. A failed
//! initialization is remembered as [`Capability::Unavailable`] and every later
//! request takes the fallback path without retrying.

use std::fmt;

use tracing::{info, warn};

#[derive(Clone)]
pub enum Capability<T> {
    Available(T),
    Unavailable { reason: String },
}

impl<T> Capability<T> {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Capability::Unavailable {
            reason: reason.into(),
        }
    }

    /// Wraps an initialization result, logging why it failed.
    pub fn from_result<E: fmt::Display>(name: &str, result: Result<T, E>) -> Self {
        match result {
            Ok(value) => {
                info!(capability = name, "capability available");
                Capability::Available(value)
            }
            Err(err) => {
                warn!(capability = name, error = %err, "capability unavailable, falling back");
                Capability::unavailable(err.to_string())
            }
        }
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Capability::Available(value) => Some(value),
            Capability::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Capability::Available(_))
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Capability::Available(_) => None,
            Capability::Unavailable { reason } => Some(reason),
        }
    }
}

impl<T> fmt::Debug for Capability<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Available(_) => f.write_str("Available"),
            Capability::Unavailable { reason } => {
                f.debug_struct("Unavailable").field("reason", reason).finish()
            }
        }
    }
}
