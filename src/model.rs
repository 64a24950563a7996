//! Input tables: customers to visit and the agents visiting them.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Visits per agent and day when the agent table does not say.
pub const DEFAULT_MAX_VISITS: u32 = 4;

/// Customer priority class. `A` ranks above `B`, which ranks above `C`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    A,
    B,
    C,
}

impl Priority {
    fn rank(self) -> u8 {
        match self {
            Priority::A => 3,
            Priority::B => 2,
            Priority::C => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::A => "A",
            Priority::B => "B",
            Priority::C => "C",
        }
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" | "a" => Ok(Priority::A),
            "B" | "b" => Ok(Priority::B),
            "C" | "c" => Ok(Priority::C),
            other => Err(format!("unknown priority class `{}`", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub priority: Priority,
    /// Window start, hour of day.
    pub time_window_start: u32,
    /// Window end, hour of day.
    pub time_window_end: u32,
    pub service_time_minutes: u32,
}

impl Customer {
    /// Window in minutes from midnight.
    pub fn window_minutes(&self) -> (i64, i64) {
        (
            i64::from(self.time_window_start) * 60,
            i64::from(self.time_window_end) * 60,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub max_visits_per_day: Option<u32>,
}

impl Agent {
    pub fn max_visits(&self) -> u32 {
        self.max_visits_per_day.unwrap_or(DEFAULT_MAX_VISITS)
    }
}

/// Validated customer table. Row `i` becomes routing node `i + 1`.
#[derive(Debug, Clone, Default)]
pub struct CustomerTable {
    rows: Vec<Customer>,
}

impl CustomerTable {
    pub fn new(rows: Vec<Customer>) -> Result<Self, ConfigurationError> {
        for customer in &rows {
            let invalid = |reason: String| ConfigurationError::InvalidCustomer {
                name: customer.name.clone(),
                reason,
            };
            if customer.name.trim().is_empty() {
                return Err(invalid("empty name".to_string()));
            }
            if customer.time_window_end > 24 {
                return Err(invalid(format!(
                    "window end {} is past midnight",
                    customer.time_window_end
                )));
            }
            if customer.time_window_start > customer.time_window_end {
                return Err(invalid(format!(
                    "window start {} is after end {}",
                    customer.time_window_start, customer.time_window_end
                )));
            }
        }
        Ok(Self { rows })
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        let rows: Vec<Customer> =
            serde_json::from_str(json).map_err(ConfigurationError::ConfigFormat)?;
        Self::new(rows)
    }

    pub fn rows(&self) -> &[Customer] {
        &self.rows
    }

    pub fn get(&self, index: usize) -> Option<&Customer> {
        self.rows.get(index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row indices of the customers in `priority`.
    pub fn with_priority(&self, priority: Priority) -> impl Iterator<Item = usize> + '_ {
        self.rows
            .iter()
            .enumerate()
            .filter(move |(_, customer)| customer.priority == priority)
            .map(|(index, _)| index)
    }
}

/// Validated agent table. Row `i` becomes vehicle `i`.
#[derive(Debug, Clone, Default)]
pub struct AgentTable {
    rows: Vec<Agent>,
}

impl AgentTable {
    pub fn new(rows: Vec<Agent>) -> Result<Self, ConfigurationError> {
        for agent in &rows {
            if agent.name.trim().is_empty() {
                return Err(ConfigurationError::InvalidAgent {
                    name: agent.name.clone(),
                    reason: "empty name".to_string(),
                });
            }
            if agent.max_visits_per_day == Some(0) {
                return Err(ConfigurationError::InvalidAgent {
                    name: agent.name.clone(),
                    reason: "max_visits_per_day must be positive".to_string(),
                });
            }
        }
        Ok(Self { rows })
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        let rows: Vec<Agent> =
            serde_json::from_str(json).map_err(ConfigurationError::ConfigFormat)?;
        Self::new(rows)
    }

    pub fn rows(&self) -> &[Agent] {
        &self.rows
    }

    pub fn get(&self, index: usize) -> Option<&Agent> {
        self.rows.get(index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Per-vehicle visit capacity, `default` for agents without a maximum.
    pub fn visit_capacities(&self, default: u32) -> Vec<i64> {
        self.rows
            .iter()
            .map(|agent| i64::from(agent.max_visits_per_day.unwrap_or(default)))
            .collect()
    }
}
