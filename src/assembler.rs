//! Builds the routing model for one request and turns its solution into a
//! [`Schedule`].
//!
//! Order matters: arc cost, the `Time` dimension, the constraint program
//! (staged, all or nothing), the default visit cap when the program was
//! missing, rejected or a hard failure, and finally the customer time windows, which always win.

use tracing::{debug, info, warn};

use crate::config::SolveConfig;
use crate::error::{InjectionError, ModelError};
use crate::instructions::{ConstraintProgram, Instruction};
use crate::model::{AgentTable, CustomerTable, Priority};
use crate::routing::{
    Capacity, DimensionId, DimensionSpec, FirstSolutionStrategy, IndexManager,
    LocalSearchMetaheuristic, NodeIndex, RoutingModel, SearchParameters, Transit,
};
use crate::schedule::{Schedule, ScheduleEntry, ScheduleRow, ScheduledVisit};

pub const TIME_DIMENSION: &str = "Time";
pub const VISIT_COUNT_DIMENSION: &str = "VisitCount";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoProgram,
    /// The program holds only comments.
    Empty,
    /// Remote generation failed; its fallback is never applied.
    HardFailure,
}

/// What happened to the constraint program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectionOutcome {
    Applied { instructions: usize },
    Skipped(SkipReason),
    Failed(InjectionError),
}

impl InjectionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, InjectionOutcome::Applied { .. })
    }

    /// Every outcome except an applied or comment-only program falls back to
    /// the default visit cap.
    pub fn needs_default_constraints(&self) -> bool {
        !matches!(
            self,
            InjectionOutcome::Applied { .. } | InjectionOutcome::Skipped(SkipReason::Empty)
        )
    }
}

/// The only handles instructions can reach.
pub struct InstructionContext<'a, M: RoutingModel> {
    model: &'a mut M,
    manager: &'a IndexManager,
    time_dimension: DimensionId,
    customers: &'a CustomerTable,
    agents: &'a AgentTable,
}

impl<'a, M: RoutingModel> InstructionContext<'a, M> {
    pub fn new(
        model: &'a mut M,
        manager: &'a IndexManager,
        time_dimension: DimensionId,
        customers: &'a CustomerTable,
        agents: &'a AgentTable,
    ) -> Self {
        Self {
            model,
            manager,
            time_dimension,
            customers,
            agents,
        }
    }

    /// Applies every instruction in order. Visit caps are merged into one
    /// dimension holding the tightest cap.
    pub fn apply(&mut self, program: &ConstraintProgram) -> Result<usize, InjectionError> {
        let mut visit_cap: Option<i64> = None;
        for instruction in program.instructions() {
            match instruction {
                Instruction::VisitCountCap { max_visits } => {
                    if *max_visits < 1 {
                        return Err(invalid(instruction, "visit cap must be at least 1"));
                    }
                    visit_cap = Some(visit_cap.map_or(*max_visits, |cap| cap.min(*max_visits)));
                }
                Instruction::PriorityTimeWindow { priority } => self.time_windows(*priority)?,
                Instruction::PriorityDisjunction { priority, penalty } => {
                    if *penalty < 0 {
                        return Err(invalid(instruction, "penalty must not be negative"));
                    }
                    if *penalty > self.max_penalty() {
                        return Err(invalid(instruction, "penalty too large for this model"));
                    }
                    self.disjunctions(*priority, *penalty)?;
                }
            }
        }

        if let Some(cap) = visit_cap {
            self.model.add_dimension(visit_count_spec(Capacity::Uniform(cap)))?;
        }
        Ok(program.instructions().len())
    }

    /// Largest penalty whose sum over every node still fits in an `i64`.
    fn max_penalty(&self) -> i64 {
        let nodes = i64::try_from(self.manager.node_count()).unwrap_or(i64::MAX);
        i64::MAX / nodes.max(1)
    }

    fn customer_nodes(&self, priority: Priority) -> Vec<(usize, NodeIndex)> {
        self.customers
            .with_priority(priority)
            .filter_map(|customer| {
                self.manager
                    .node_for_customer(customer)
                    .map(|node| (customer, node))
            })
            .collect()
    }

    fn time_windows(&mut self, priority: Priority) -> Result<(), InjectionError> {
        for (customer, node) in self.customer_nodes(priority) {
            if let Some(row) = self.customers.get(customer) {
                let (start, end) = row.window_minutes();
                self.model.set_cumul_range(self.time_dimension, node, start, end)?;
            }
        }
        Ok(())
    }

    fn disjunctions(&mut self, priority: Priority, penalty: i64) -> Result<(), InjectionError> {
        for (_, node) in self.customer_nodes(priority) {
            self.model.add_disjunction(&[node], penalty)?;
        }
        Ok(())
    }

    pub fn agents(&self) -> &AgentTable {
        self.agents
    }
}

fn invalid(instruction: &Instruction, reason: &str) -> InjectionError {
    InjectionError::InvalidInstruction {
        instruction: instruction.to_string(),
        reason: reason.to_string(),
    }
}

/// Counts visited customers; the depot contributes nothing.
fn visit_count_spec(capacity: Capacity) -> DimensionSpec {
    DimensionSpec {
        name: VISIT_COUNT_DIMENSION.to_string(),
        transit: Transit::unary(|node| if node == IndexManager::DEPOT { 0 } else { 1 }),
        slack_max: 0,
        capacity,
        fix_start_cumul_to_zero: true,
    }
}

/// A fully configured model, ready to solve.
#[derive(Debug)]
pub struct AssembledModel<M: RoutingModel> {
    pub model: M,
    pub manager: IndexManager,
    pub time_dimension: DimensionId,
    pub injection: InjectionOutcome,
    /// Whether the default per-agent visit cap was added.
    pub default_visit_cap: bool,
}

/// Builds the routing model. `model` must be sized for `customers` plus the
/// depot and one vehicle per agent.
pub fn assemble<M: RoutingModel>(
    mut model: M,
    customers: &CustomerTable,
    agents: &AgentTable,
    program: Option<&ConstraintProgram>,
    config: &SolveConfig,
) -> Result<AssembledModel<M>, ModelError> {
    let manager = IndexManager::new(customers.len(), agents.len());

    model.set_arc_cost(Transit::arc(|from, to| if from == to { 0 } else { 1 }));

    let mut service_minutes = vec![0];
    service_minutes.extend(
        customers
            .rows()
            .iter()
            .map(|customer| i64::from(customer.service_time_minutes)),
    );
    let time_dimension = model.add_dimension(DimensionSpec {
        name: TIME_DIMENSION.to_string(),
        transit: Transit::unary(move |node| service_minutes.get(node.0).copied().unwrap_or(0)),
        slack_max: config.horizon_minutes,
        capacity: Capacity::Uniform(config.horizon_minutes),
        fix_start_cumul_to_zero: false,
    })?;

    let injection = match program {
        None => InjectionOutcome::Skipped(SkipReason::NoProgram),
        Some(program) if program.is_hard_failure() => InjectionOutcome::Skipped(SkipReason::HardFailure),
        Some(program) if program.is_empty() => InjectionOutcome::Skipped(SkipReason::Empty),
        Some(program) => {
            let mut staged = model.clone();
            let result = InstructionContext::new(&mut staged, &manager, time_dimension, customers, agents)
                .apply(program);
            match result {
                Ok(instructions) => {
                    model = staged;
                    InjectionOutcome::Applied { instructions }
                }
                Err(err) => {
                    warn!(error = %err, "constraint program rejected, using default constraints");
                    InjectionOutcome::Failed(err)
                }
            }
        }
    };
    debug!(outcome = ?injection, "constraint injection finished");

    let default_visit_cap = injection.needs_default_constraints();
    if default_visit_cap {
        let capacities = agents.visit_capacities(config.default_max_visits);
        model.add_dimension(visit_count_spec(Capacity::PerVehicle(capacities)))?;
    }

    // Customer windows are applied last and replace whatever came before.
    for (customer, node) in customers.rows().iter().zip(manager.customer_nodes().map(|(_, node)| node)) {
        let (start, end) = customer.window_minutes();
        model.set_cumul_range(time_dimension, node, start, end)?;
    }

    Ok(AssembledModel {
        model,
        manager,
        time_dimension,
        injection,
        default_visit_cap,
    })
}

pub fn search_parameters(config: &SolveConfig) -> SearchParameters {
    SearchParameters {
        first_solution_strategy: FirstSolutionStrategy::PathCheapestArc,
        local_search_metaheuristic: LocalSearchMetaheuristic::GuidedLocalSearch,
        time_limit: config.time_limit(),
        stagnation_rounds: config.stagnation_rounds,
    }
}

impl<M: RoutingModel> AssembledModel<M> {
    /// Solves once and maps each vehicle route back to customer names.
    pub fn solve(self, customers: &CustomerTable, agents: &AgentTable, config: &SolveConfig) -> Schedule {
        let manager = self.manager;
        let time_dimension = self.time_dimension;
        let Some(solution) = self.model.solve(&search_parameters(config)) else {
            warn!("no feasible schedule");
            return Schedule::solve_failed();
        };

        let rows = agents
            .rows()
            .iter()
            .enumerate()
            .map(|(vehicle, agent)| {
                let starts = solution.cumuls(time_dimension, vehicle);
                let visits: Vec<ScheduledVisit> = solution
                    .route(vehicle)
                    .iter()
                    .enumerate()
                    .filter_map(|(position, node)| {
                        let customer = customers.get(manager.customer_for_node(*node)?)?;
                        Some(ScheduledVisit {
                            customer: customer.name.clone(),
                            start_minute: starts.get(position).copied().unwrap_or_default(),
                        })
                    })
                    .collect();
                let entry = if visits.is_empty() {
                    ScheduleEntry::NoVisits
                } else {
                    ScheduleEntry::Visits(visits)
                };
                ScheduleRow {
                    agent: agent.name.clone(),
                    entry,
                }
            })
            .collect();

        let schedule = Schedule::new(rows);
        info!(
            agents = agents.len(),
            visits = schedule.visit_count(),
            dropped = solution.dropped().len(),
            objective = solution.objective(),
            "schedule extracted"
        );
        schedule
    }
}
