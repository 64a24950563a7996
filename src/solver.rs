//! In-process routing engine (baseline implementation).
//!
//! Construction by cheapest arc or cheapest insertion, then local search with
//! relocate, 2-opt and optional insert/drop moves. Guided local search keeps
//! penalizing the arcs of each local optimum until the time limit or the
//! stagnation limit is reached.

use std::collections::HashMap;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::ModelError;
use crate::routing::{
    Capacity, DimensionId, DimensionSpec, FirstSolutionStrategy, IndexManager,
    LocalSearchMetaheuristic, NodeIndex, RoutingModel, SearchParameters, Solution, Transit,
};

const DEPOT: NodeIndex = IndexManager::DEPOT;

/// Scale of the guided local search penalty relative to the average arc cost.
const GLS_LAMBDA_COEFFICIENT: f64 = 0.1;

#[derive(Debug, Clone)]
struct Dimension {
    spec: DimensionSpec,
    ranges: Vec<Option<(i64, i64)>>,
}

#[derive(Debug, Clone)]
struct Disjunction {
    nodes: Vec<NodeIndex>,
    penalty: i64,
}

#[derive(Debug, Clone)]
pub struct LocalSearchRouting {
    node_count: usize,
    vehicle_count: usize,
    arc_cost: Transit,
    dimensions: Vec<Dimension>,
    disjunctions: Vec<Disjunction>,
    disjunction_of: Vec<Option<usize>>,
}

impl LocalSearchRouting {
    pub fn new(manager: &IndexManager) -> Self {
        Self::with_size(manager.node_count(), manager.vehicle_count())
    }

    /// `node_count` includes the depot at node 0.
    pub fn with_size(node_count: usize, vehicle_count: usize) -> Self {
        let node_count = node_count.max(1);
        Self {
            node_count,
            vehicle_count,
            arc_cost: Transit::Constant(0),
            dimensions: Vec::new(),
            disjunctions: Vec::new(),
            disjunction_of: vec![None; node_count],
        }
    }

    pub fn dimension_capacity(&self, dimension: DimensionId, vehicle: usize) -> Option<i64> {
        self.dimensions
            .get(dimension.0)
            .map(|dimension| dimension.spec.capacity.for_vehicle(vehicle))
    }

    pub fn disjunction_count(&self) -> usize {
        self.disjunctions
            .iter()
            .filter(|disjunction| !disjunction.nodes.is_empty())
            .count()
    }

    fn check_node(&self, node: NodeIndex) -> Result<(), ModelError> {
        if node.0 < self.node_count {
            Ok(())
        } else {
            Err(ModelError::NodeOutOfRange {
                node: node.0,
                node_count: self.node_count,
            })
        }
    }
}

impl RoutingModel for LocalSearchRouting {
    fn node_count(&self) -> usize {
        self.node_count
    }

    fn vehicle_count(&self) -> usize {
        self.vehicle_count
    }

    fn set_arc_cost(&mut self, cost: Transit) {
        self.arc_cost = cost;
    }

    fn add_dimension(&mut self, spec: DimensionSpec) -> Result<DimensionId, ModelError> {
        if self.dimension(&spec.name).is_some() {
            return Err(ModelError::DuplicateDimension(spec.name));
        }
        if spec.slack_max < 0 {
            return Err(ModelError::InvalidCapacity(format!(
                "negative slack {}",
                spec.slack_max
            )));
        }
        match &spec.capacity {
            Capacity::Uniform(value) if *value < 0 => {
                return Err(ModelError::InvalidCapacity(format!(
                    "negative capacity {}",
                    value
                )));
            }
            Capacity::PerVehicle(values) if values.len() != self.vehicle_count => {
                return Err(ModelError::InvalidCapacity(format!(
                    "{} capacities for {} vehicles",
                    values.len(),
                    self.vehicle_count
                )));
            }
            Capacity::PerVehicle(values) if values.iter().any(|value| *value < 0) => {
                return Err(ModelError::InvalidCapacity(
                    "negative vehicle capacity".to_string(),
                ));
            }
            _ => {}
        }

        let id = DimensionId(self.dimensions.len());
        debug!(dimension = %spec.name, capacity = ?spec.capacity, "dimension added");
        self.dimensions.push(Dimension {
            spec,
            ranges: vec![None; self.node_count],
        });
        Ok(id)
    }

    fn dimension(&self, name: &str) -> Option<DimensionId> {
        self.dimensions
            .iter()
            .position(|dimension| dimension.spec.name == name)
            .map(DimensionId)
    }

    fn set_cumul_range(
        &mut self,
        dimension: DimensionId,
        node: NodeIndex,
        min: i64,
        max: i64,
    ) -> Result<(), ModelError> {
        self.check_node(node)?;
        if min > max {
            return Err(ModelError::EmptyRange { min, max });
        }
        let target = self
            .dimensions
            .get_mut(dimension.0)
            .ok_or(ModelError::UnknownDimension(dimension.0))?;
        target.ranges[node.0] = Some((min, max));
        Ok(())
    }

    fn cumul_range(&self, dimension: DimensionId, node: NodeIndex) -> Option<(i64, i64)> {
        self.dimensions.get(dimension.0)?.ranges.get(node.0).copied().flatten()
    }

    fn add_disjunction(&mut self, nodes: &[NodeIndex], penalty: i64) -> Result<(), ModelError> {
        if penalty < 0 {
            return Err(ModelError::InvalidPenalty(penalty));
        }
        for &node in nodes {
            self.check_node(node)?;
            if node == DEPOT {
                return Err(ModelError::DepotDisjunction);
            }
        }
        if nodes.is_empty() {
            return Ok(());
        }

        // A node belongs to one disjunction; the latest one wins.
        let id = self.disjunctions.len();
        for &node in nodes {
            if let Some(previous) = self.disjunction_of[node.0] {
                self.disjunctions[previous].nodes.retain(|member| *member != node);
            }
            self.disjunction_of[node.0] = Some(id);
        }
        let mut members = nodes.to_vec();
        members.sort();
        members.dedup();
        self.disjunctions.push(Disjunction {
            nodes: members,
            penalty,
        });
        Ok(())
    }

    fn disjunction_penalty(&self, node: NodeIndex) -> Option<i64> {
        let id = (*self.disjunction_of.get(node.0)?)?;
        Some(self.disjunctions[id].penalty)
    }

    fn solve(self, parameters: &SearchParameters) -> Option<Solution> {
        let started = Instant::now();
        let search = Search {
            model: &self,
            parameters,
            deadline: started.checked_add(parameters.time_limit),
        };

        let plan = search.run();
        match &plan {
            Some(plan) => info!(
                objective = search.objective(plan),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "routing solve finished"
            ),
            None => info!("routing solve found no feasible assignment"),
        }
        plan.map(|plan| search.into_solution(plan))
    }
}

#[derive(Debug, Clone)]
struct Plan {
    routes: Vec<Vec<NodeIndex>>,
    performed: Vec<bool>,
}

impl Plan {
    fn empty(node_count: usize, vehicle_count: usize) -> Self {
        Self {
            routes: vec![Vec::new(); vehicle_count],
            performed: vec![false; node_count],
        }
    }

    fn insert(&mut self, insertion: Insertion, node: NodeIndex) {
        self.routes[insertion.vehicle].insert(insertion.position, node);
        self.performed[node.0] = true;
    }
}

#[derive(Debug, Clone, Copy)]
struct Insertion {
    vehicle: usize,
    position: usize,
    delta: i64,
}

/// Arc penalties of the guided local search and their weight.
#[derive(Debug, Default)]
struct Guide {
    penalties: HashMap<(NodeIndex, NodeIndex), i64>,
    lambda: i64,
}

impl Guide {
    fn arc_penalty(&self, from: NodeIndex, to: NodeIndex) -> i64 {
        if self.lambda == 0 {
            return 0;
        }
        self.penalties
            .get(&(from, to))
            .map_or(0, |penalty| penalty.saturating_mul(self.lambda))
    }
}

struct Search<'m> {
    model: &'m LocalSearchRouting,
    parameters: &'m SearchParameters,
    deadline: Option<Instant>,
}

fn route_path(nodes: &[NodeIndex]) -> Vec<NodeIndex> {
    let mut path = Vec::with_capacity(nodes.len() + 2);
    path.push(DEPOT);
    path.extend_from_slice(nodes);
    path.push(DEPOT);
    path
}

/// Forward interval propagation of one dimension along `[depot, nodes.., depot]`.
///
/// Returns the feasible cumul interval at every path position, `None` when
/// the route violates the dimension.
fn propagate(dimension: &Dimension, vehicle: usize, path: &[NodeIndex]) -> Option<Vec<(i64, i64)>> {
    let spec = &dimension.spec;
    let capacity = spec.capacity.for_vehicle(vehicle);
    let bound = |node: NodeIndex, lo: i64, hi: i64| -> Option<(i64, i64)> {
        let (min, max) = dimension.ranges[node.0].unwrap_or((0, capacity));
        let lo = lo.max(min).max(0);
        let hi = hi.min(max).min(capacity);
        (lo <= hi).then_some((lo, hi))
    };

    let start_hi = if spec.fix_start_cumul_to_zero { 0 } else { capacity };
    let mut current = bound(path[0], 0, start_hi)?;
    let mut intervals = Vec::with_capacity(path.len());
    intervals.push(current);
    for arc in path.windows(2) {
        let transit = spec.transit.evaluate(arc[0], arc[1]);
        let lo = current.0.saturating_add(transit);
        let hi = current.1.saturating_add(transit).saturating_add(spec.slack_max);
        current = bound(arc[1], lo, hi)?;
        intervals.push(current);
    }
    Some(intervals)
}

/// Earliest cumul values consistent with every arc of the path.
fn earliest_cumuls(dimension: &Dimension, vehicle: usize, path: &[NodeIndex]) -> Vec<i64> {
    let Some(intervals) = propagate(dimension, vehicle, path) else {
        return Vec::new();
    };
    let spec = &dimension.spec;
    let last = intervals.len() - 1;
    let mut values = vec![0; intervals.len()];
    values[last] = intervals[last].0;
    for position in (0..last).rev() {
        let transit = spec.transit.evaluate(path[position], path[position + 1]);
        let latest_needed = values[position + 1]
            .saturating_sub(transit)
            .saturating_sub(spec.slack_max);
        values[position] = intervals[position].0.max(latest_needed);
    }
    values
}

impl Search<'_> {
    fn expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    fn customer_nodes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        (1..self.model.node_count).map(NodeIndex)
    }

    fn is_optional(&self, node: NodeIndex) -> bool {
        self.model.disjunction_of[node.0].is_some()
    }

    fn drop_penalty(&self, node: NodeIndex) -> i64 {
        self.model.disjunction_penalty(node).unwrap_or(0)
    }

    /// At most one node of a disjunction is performed.
    fn can_perform(&self, plan: &Plan, node: NodeIndex) -> bool {
        match self.model.disjunction_of[node.0] {
            None => !plan.performed[node.0],
            Some(id) => self.model.disjunctions[id]
                .nodes
                .iter()
                .all(|member| !plan.performed[member.0]),
        }
    }

    fn feasible(&self, vehicle: usize, nodes: &[NodeIndex]) -> bool {
        let path = route_path(nodes);
        self.model
            .dimensions
            .iter()
            .all(|dimension| propagate(dimension, vehicle, &path).is_some())
    }

    /// Arc cost of a route plus guide penalties. Unused vehicles cost nothing.
    fn route_value(&self, nodes: &[NodeIndex], guide: &Guide) -> i64 {
        if nodes.is_empty() {
            return 0;
        }
        route_path(nodes)
            .windows(2)
            .map(|arc| {
                self.model
                    .arc_cost
                    .evaluate(arc[0], arc[1])
                    .saturating_add(guide.arc_penalty(arc[0], arc[1]))
            })
            .fold(0, i64::saturating_add)
    }

    /// True objective: arc costs plus penalties of unperformed disjunctions.
    fn objective(&self, plan: &Plan) -> i64 {
        let routes = self.route_cost(plan);
        let dropped = self
            .model
            .disjunctions
            .iter()
            .filter(|disjunction| {
                !disjunction.nodes.is_empty()
                    && disjunction.nodes.iter().all(|node| !plan.performed[node.0])
            })
            .map(|disjunction| disjunction.penalty)
            .fold(0, i64::saturating_add);
        routes.saturating_add(dropped)
    }

    /// Arc costs of every route, without guide penalties.
    fn route_cost(&self, plan: &Plan) -> i64 {
        let unguided = Guide::default();
        plan.routes
            .iter()
            .map(|route| self.route_value(route, &unguided))
            .fold(0, i64::saturating_add)
    }

    fn run(&self) -> Option<Plan> {
        let mut current = self.construct()?;
        let mut guide = Guide::default();
        self.descend(&mut current, &guide);

        let mut best = current.clone();
        let mut best_cost = self.objective(&best);
        if self.parameters.local_search_metaheuristic == LocalSearchMetaheuristic::GreedyDescent {
            return Some(best);
        }

        let arc_count: usize = best
            .routes
            .iter()
            .filter(|route| !route.is_empty())
            .map(|route| route.len() + 1)
            .sum();
        if arc_count == 0 {
            return Some(best);
        }
        // Lambda follows arc costs only; drop penalties stay out of it.
        let average_arc = self.route_cost(&best) as f64 / arc_count as f64;
        guide.lambda = ((GLS_LAMBDA_COEFFICIENT * average_arc).round() as i64).max(1);

        let mut stale = 0;
        let mut rounds = 0;
        while !self.expired() && stale < self.parameters.stagnation_rounds {
            if !self.penalize(&current, &mut guide) {
                break;
            }
            self.descend(&mut current, &guide);
            rounds += 1;

            let cost = self.objective(&current);
            if cost < best_cost {
                best = current.clone();
                best_cost = cost;
                stale = 0;
            } else {
                stale += 1;
            }
        }
        debug!(rounds, best_cost, lambda = guide.lambda, "guided local search finished");
        Some(best)
    }

    fn construct(&self) -> Option<Plan> {
        let mut plan = Plan::empty(self.model.node_count, self.model.vehicle_count);
        let unguided = Guide::default();

        let mandatory: Vec<NodeIndex> = self
            .customer_nodes()
            .filter(|node| !self.is_optional(*node))
            .collect();
        let mut optional: Vec<NodeIndex> = self
            .customer_nodes()
            .filter(|node| self.is_optional(*node))
            .collect();
        optional.sort_by_key(|node| (std::cmp::Reverse(self.drop_penalty(*node)), *node));

        if self.parameters.first_solution_strategy == FirstSolutionStrategy::PathCheapestArc {
            for vehicle in 0..self.model.vehicle_count {
                self.extend_path(&mut plan, vehicle, &mandatory);
            }
        }

        for &node in &mandatory {
            if plan.performed[node.0] {
                continue;
            }
            match self.best_insertion(&plan, node, &unguided) {
                Some(insertion) => plan.insert(insertion, node),
                None => {
                    debug!(node = node.0, "mandatory node has no feasible position");
                    return None;
                }
            }
        }

        for &node in &optional {
            if !self.can_perform(&plan, node) {
                continue;
            }
            if let Some(insertion) = self.best_insertion(&plan, node, &unguided) {
                if insertion.delta < self.drop_penalty(node) {
                    plan.insert(insertion, node);
                }
            }
        }

        Some(plan)
    }

    /// Grows one route from the depot by its cheapest feasible outgoing arc.
    fn extend_path(&self, plan: &mut Plan, vehicle: usize, candidates: &[NodeIndex]) {
        loop {
            let last = plan.routes[vehicle].last().copied().unwrap_or(DEPOT);
            let next = candidates
                .iter()
                .copied()
                .filter(|node| !plan.performed[node.0])
                .filter(|node| {
                    let mut extended = plan.routes[vehicle].clone();
                    extended.push(*node);
                    self.feasible(vehicle, &extended)
                })
                .min_by_key(|node| (self.model.arc_cost.evaluate(last, *node), *node));

            match next {
                Some(node) => {
                    plan.routes[vehicle].push(node);
                    plan.performed[node.0] = true;
                }
                None => break,
            }
        }
    }

    fn best_insertion(&self, plan: &Plan, node: NodeIndex, guide: &Guide) -> Option<Insertion> {
        (0..self.model.vehicle_count)
            .into_par_iter()
            .filter_map(|vehicle| {
                let route = &plan.routes[vehicle];
                let before = self.route_value(route, guide);
                (0..=route.len())
                    .filter_map(|position| {
                        let mut candidate = route.clone();
                        candidate.insert(position, node);
                        if !self.feasible(vehicle, &candidate) {
                            return None;
                        }
                        Some(Insertion {
                            vehicle,
                            position,
                            delta: self.route_value(&candidate, guide).saturating_sub(before),
                        })
                    })
                    .min_by_key(|insertion| (insertion.delta, insertion.position))
            })
            .min_by_key(|insertion| (insertion.delta, insertion.vehicle, insertion.position))
    }

    /// Applies improving moves until none is left or the deadline passes.
    fn descend(&self, plan: &mut Plan, guide: &Guide) {
        while !self.expired() {
            let improved = self.relocate(plan, guide)
                || self.two_opt(plan, guide)
                || self.insert_dropped(plan, guide)
                || self.drop_optional(plan, guide);
            if !improved {
                break;
            }
        }
    }

    /// Relocate: move one visit to another position, in its route or another.
    fn relocate(&self, plan: &mut Plan, guide: &Guide) -> bool {
        for from in 0..plan.routes.len() {
            let from_before = self.route_value(&plan.routes[from], guide);
            for index in 0..plan.routes[from].len() {
                let node = plan.routes[from][index];
                let mut shortened = plan.routes[from].clone();
                shortened.remove(index);
                let shortened_feasible = self.feasible(from, &shortened);
                let shortened_value = self.route_value(&shortened, guide);

                for to in 0..plan.routes.len() {
                    if to == from {
                        for position in 0..=shortened.len() {
                            if position == index {
                                continue;
                            }
                            let mut candidate = shortened.clone();
                            candidate.insert(position, node);
                            if !self.feasible(from, &candidate) {
                                continue;
                            }
                            if self.route_value(&candidate, guide) < from_before {
                                plan.routes[from] = candidate;
                                return true;
                            }
                        }
                        continue;
                    }

                    if !shortened_feasible {
                        continue;
                    }
                    let to_before = self.route_value(&plan.routes[to], guide);
                    for position in 0..=plan.routes[to].len() {
                        let mut candidate = plan.routes[to].clone();
                        candidate.insert(position, node);
                        if !self.feasible(to, &candidate) {
                            continue;
                        }
                        let delta = shortened_value
                            .saturating_sub(from_before)
                            .saturating_add(self.route_value(&candidate, guide).saturating_sub(to_before));
                        if delta < 0 {
                            plan.routes[from] = shortened;
                            plan.routes[to] = candidate;
                            return true;
                        }
                    }
                }
            }
        }
        false
    }

    /// 2-opt: reverse a segment within a route.
    fn two_opt(&self, plan: &mut Plan, guide: &Guide) -> bool {
        for vehicle in 0..plan.routes.len() {
            let route = &plan.routes[vehicle];
            if route.len() < 2 {
                continue;
            }
            let before = self.route_value(route, guide);
            for i in 0..route.len() - 1 {
                for j in i + 1..route.len() {
                    let mut candidate = route.clone();
                    candidate[i..=j].reverse();
                    if !self.feasible(vehicle, &candidate) {
                        continue;
                    }
                    if self.route_value(&candidate, guide) < before {
                        plan.routes[vehicle] = candidate;
                        return true;
                    }
                }
            }
        }
        false
    }

    fn insert_dropped(&self, plan: &mut Plan, guide: &Guide) -> bool {
        let dropped: Vec<NodeIndex> = self
            .customer_nodes()
            .filter(|node| self.is_optional(*node) && self.can_perform(plan, *node))
            .collect();
        for node in dropped {
            if let Some(insertion) = self.best_insertion(plan, node, guide) {
                if insertion.delta < self.drop_penalty(node) {
                    plan.insert(insertion, node);
                    return true;
                }
            }
        }
        false
    }

    fn drop_optional(&self, plan: &mut Plan, guide: &Guide) -> bool {
        for vehicle in 0..plan.routes.len() {
            let before = self.route_value(&plan.routes[vehicle], guide);
            for index in 0..plan.routes[vehicle].len() {
                let node = plan.routes[vehicle][index];
                if !self.is_optional(node) {
                    continue;
                }
                let mut candidate = plan.routes[vehicle].clone();
                candidate.remove(index);
                if !self.feasible(vehicle, &candidate) {
                    continue;
                }
                let delta = self
                    .route_value(&candidate, guide)
                    .saturating_sub(before)
                    .saturating_add(self.drop_penalty(node));
                if delta < 0 {
                    plan.routes[vehicle] = candidate;
                    plan.performed[node.0] = false;
                    return true;
                }
            }
        }
        false
    }

    /// Penalizes the arcs of maximum utility `cost / (1 + penalty)` in the
    /// current local optimum. Returns false when there is nothing to penalize.
    fn penalize(&self, plan: &Plan, guide: &mut Guide) -> bool {
        let arcs: Vec<(NodeIndex, NodeIndex)> = plan
            .routes
            .iter()
            .filter(|route| !route.is_empty())
            .flat_map(|route| {
                route_path(route)
                    .windows(2)
                    .map(|arc| (arc[0], arc[1]))
                    .collect::<Vec<_>>()
            })
            .collect();
        if arcs.is_empty() {
            return false;
        }

        let utility = |arc: &(NodeIndex, NodeIndex)| {
            let cost = self.model.arc_cost.evaluate(arc.0, arc.1) as f64;
            let penalty = guide.penalties.get(arc).copied().unwrap_or(0) as f64;
            cost / (1.0 + penalty)
        };
        let max_utility = arcs.iter().map(&utility).fold(f64::MIN, f64::max);
        let selected: Vec<(NodeIndex, NodeIndex)> = arcs
            .iter()
            .filter(|arc| (utility(*arc) - max_utility).abs() < 1e-9)
            .copied()
            .collect();
        for arc in selected {
            *guide.penalties.entry(arc).or_insert(0) += 1;
        }
        true
    }

    fn into_solution(&self, plan: Plan) -> Solution {
        let cumuls = self
            .model
            .dimensions
            .iter()
            .map(|dimension| {
                plan.routes
                    .iter()
                    .enumerate()
                    .map(|(vehicle, route)| {
                        let path = route_path(route);
                        let values = earliest_cumuls(dimension, vehicle, &path);
                        if values.len() < 2 {
                            return Vec::new();
                        }
                        values[1..values.len() - 1].to_vec()
                    })
                    .collect()
            })
            .collect();
        let dropped = self
            .customer_nodes()
            .filter(|node| !plan.performed[node.0])
            .collect();
        let objective = self.objective(&plan);
        Solution::new(plan.routes, cumuls, dropped, objective)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dimension(transit: Transit, slack_max: i64, capacity: i64, fix_start: bool) -> Dimension {
        Dimension {
            spec: DimensionSpec {
                name: "d".to_string(),
                transit,
                slack_max,
                capacity: Capacity::Uniform(capacity),
                fix_start_cumul_to_zero: fix_start,
            },
            ranges: vec![None; 4],
        }
    }

    #[test]
    fn counter_rejects_route_over_capacity() {
        let counter = dimension(
            Transit::unary(|node| if node == DEPOT { 0 } else { 1 }),
            0,
            2,
            true,
        );
        let two = route_path(&[NodeIndex(1), NodeIndex(2)]);
        let three = route_path(&[NodeIndex(1), NodeIndex(2), NodeIndex(3)]);
        assert!(propagate(&counter, 0, &two).is_some());
        assert!(propagate(&counter, 0, &three).is_none());
    }

    #[test]
    fn waiting_reaches_a_later_window() {
        let mut time = dimension(Transit::Constant(30), 1440, 1440, false);
        time.ranges[1] = Some((540, 720));
        let path = route_path(&[NodeIndex(1)]);
        let intervals = propagate(&time, 0, &path).unwrap();
        assert_eq!(intervals[1], (540, 720));
    }

    #[test]
    fn bounded_slack_blocks_long_waits() {
        let mut time = dimension(Transit::Constant(10), 5, 1440, true);
        time.ranges[1] = Some((100, 200));
        assert!(propagate(&time, 0, &route_path(&[NodeIndex(1)])).is_none());
    }

    #[test]
    fn earliest_cumuls_delay_start_for_bounded_slack() {
        let mut time = dimension(Transit::Constant(10), 5, 1440, false);
        time.ranges[2] = Some((100, 200));
        let path = route_path(&[NodeIndex(1), NodeIndex(2)]);
        let values = earliest_cumuls(&time, 0, &path);
        // node 2 at 100 forces node 1 to at least 85 and the start to 70.
        assert_eq!(values, vec![70, 85, 100, 110]);
    }

    #[test]
    fn latest_disjunction_wins() {
        let mut model = LocalSearchRouting::with_size(3, 1);
        model.add_disjunction(&[NodeIndex(1), NodeIndex(2)], 10).unwrap();
        model.add_disjunction(&[NodeIndex(1)], 99).unwrap();
        assert_eq!(model.disjunction_penalty(NodeIndex(1)), Some(99));
        assert_eq!(model.disjunction_penalty(NodeIndex(2)), Some(10));
        assert_eq!(model.disjunction_count(), 2);
    }

    #[test]
    fn rejects_invalid_mutations() {
        let mut model = LocalSearchRouting::with_size(2, 1);
        assert_eq!(
            model.add_disjunction(&[DEPOT], 1),
            Err(ModelError::DepotDisjunction)
        );
        assert_eq!(
            model.add_disjunction(&[NodeIndex(1)], -1),
            Err(ModelError::InvalidPenalty(-1))
        );
        assert_eq!(
            model.set_cumul_range(DimensionId(0), NodeIndex(1), 0, 10),
            Err(ModelError::UnknownDimension(0))
        );
        assert!(matches!(
            model.set_cumul_range(DimensionId(0), NodeIndex(7), 0, 10),
            Err(ModelError::NodeOutOfRange { node: 7, .. })
        ));
    }
}
