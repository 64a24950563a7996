//! Solved visit schedule, one row per agent.

use std::fmt;

use serde::Serialize;

/// Agent shown on the row of a failed solve.
pub const NO_AGENT: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledVisit {
    pub customer: String,
    /// Service start, minutes from midnight.
    pub start_minute: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "visits", rename_all = "snake_case")]
pub enum ScheduleEntry {
    Visits(Vec<ScheduledVisit>),
    NoVisits,
    SolveFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleRow {
    pub agent: String,
    pub entry: ScheduleEntry,
}

impl ScheduleRow {
    /// Customer names joined with ` → `, or a marker.
    pub fn display_text(&self) -> String {
        match &self.entry {
            ScheduleEntry::Visits(visits) => visits
                .iter()
                .map(|visit| visit.customer.as_str())
                .collect::<Vec<_>>()
                .join(" → "),
            ScheduleEntry::NoVisits => "(no visits)".to_string(),
            ScheduleEntry::SolveFailed => "(solve failed)".to_string(),
        }
    }

    pub fn visits(&self) -> &[ScheduledVisit] {
        match &self.entry {
            ScheduleEntry::Visits(visits) => visits,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Schedule {
    rows: Vec<ScheduleRow>,
}

impl Schedule {
    pub fn new(rows: Vec<ScheduleRow>) -> Self {
        Self { rows }
    }

    /// The single-row schedule reported when the solver finds nothing.
    pub fn solve_failed() -> Self {
        Self::new(vec![ScheduleRow {
            agent: NO_AGENT.to_string(),
            entry: ScheduleEntry::SolveFailed,
        }])
    }

    pub fn rows(&self) -> &[ScheduleRow] {
        &self.rows
    }

    pub fn is_solve_failed(&self) -> bool {
        self.rows
            .iter()
            .any(|row| row.entry == ScheduleEntry::SolveFailed)
    }

    pub fn row_for(&self, agent: &str) -> Option<&ScheduleRow> {
        self.rows.iter().find(|row| row.agent == agent)
    }

    pub fn visit_count(&self) -> usize {
        self.rows.iter().map(|row| row.visits().len()).sum()
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.rows {
            writeln!(f, "{}: {}", row.agent, row.display_text())?;
        }
        Ok(())
    }
}
