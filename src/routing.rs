//! Routing model capability.
//!
//! The assembler only talks to a routing engine through [`RoutingModel`], so
//! a different engine can be substituted without touching retrieval or
//! generation. [`crate::solver::LocalSearchRouting`] is the in-process engine.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ModelError;

/// A routing node. Node 0 is the depot; customer row `i` is node `i + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(pub usize);

/// Maps customer rows to routing nodes and back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexManager {
    customer_count: usize,
    vehicle_count: usize,
}

impl IndexManager {
    pub const DEPOT: NodeIndex = NodeIndex(0);

    pub fn new(customer_count: usize, vehicle_count: usize) -> Self {
        Self {
            customer_count,
            vehicle_count,
        }
    }

    pub fn depot(&self) -> NodeIndex {
        Self::DEPOT
    }

    /// Depot plus one node per customer.
    pub fn node_count(&self) -> usize {
        self.customer_count + 1
    }

    pub fn customer_count(&self) -> usize {
        self.customer_count
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicle_count
    }

    pub fn node_for_customer(&self, customer: usize) -> Option<NodeIndex> {
        (customer < self.customer_count).then_some(NodeIndex(customer + 1))
    }

    /// Customer row of a node, `None` for the depot.
    pub fn customer_for_node(&self, node: NodeIndex) -> Option<usize> {
        (node.0 >= 1 && node.0 <= self.customer_count).then(|| node.0 - 1)
    }

    pub fn customer_nodes(&self) -> impl Iterator<Item = (usize, NodeIndex)> {
        (0..self.customer_count).map(|customer| (customer, NodeIndex(customer + 1)))
    }
}

pub type UnaryCallback = Arc<dyn Fn(NodeIndex) -> i64 + Send + Sync>;
pub type ArcCallback = Arc<dyn Fn(NodeIndex, NodeIndex) -> i64 + Send + Sync>;

/// Per-arc contribution to a cost or a dimension.
#[derive(Clone)]
pub enum Transit {
    Constant(i64),
    /// Depends on the node the arc leaves.
    Unary(UnaryCallback),
    Arc(ArcCallback),
}

impl Transit {
    pub fn unary(callback: impl Fn(NodeIndex) -> i64 + Send + Sync + 'static) -> Self {
        Transit::Unary(Arc::new(callback))
    }

    pub fn arc(callback: impl Fn(NodeIndex, NodeIndex) -> i64 + Send + Sync + 'static) -> Self {
        Transit::Arc(Arc::new(callback))
    }

    pub fn evaluate(&self, from: NodeIndex, to: NodeIndex) -> i64 {
        match self {
            Transit::Constant(value) => *value,
            Transit::Unary(callback) => callback(from),
            Transit::Arc(callback) => callback(from, to),
        }
    }
}

impl fmt::Debug for Transit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transit::Constant(value) => write!(f, "Constant({})", value),
            Transit::Unary(_) => f.write_str("Unary(..)"),
            Transit::Arc(_) => f.write_str("Arc(..)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capacity {
    Uniform(i64),
    PerVehicle(Vec<i64>),
}

impl Capacity {
    pub fn for_vehicle(&self, vehicle: usize) -> i64 {
        match self {
            Capacity::Uniform(value) => *value,
            Capacity::PerVehicle(values) => values.get(vehicle).copied().unwrap_or(0),
        }
    }
}

/// A cumulative quantity tracked along every route.
#[derive(Debug, Clone)]
pub struct DimensionSpec {
    pub name: String,
    pub transit: Transit,
    /// Maximum waiting added on top of the transit of one arc.
    pub slack_max: i64,
    /// Upper bound of the cumul at every node of a route.
    pub capacity: Capacity,
    /// Pins the cumul at the route start to zero.
    pub fix_start_cumul_to_zero: bool,
}

/// Handle of a dimension inside one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DimensionId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstSolutionStrategy {
    /// Extend each route with the cheapest feasible arc, then insert leftovers.
    PathCheapestArc,
    /// Insert every node at its cheapest feasible position.
    CheapestInsertion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalSearchMetaheuristic {
    /// Stop at the first local optimum.
    GreedyDescent,
    /// Penalize arcs of local optima to escape them until the budget runs out.
    GuidedLocalSearch,
}

#[derive(Debug, Clone)]
pub struct SearchParameters {
    pub first_solution_strategy: FirstSolutionStrategy,
    pub local_search_metaheuristic: LocalSearchMetaheuristic,
    pub time_limit: Duration,
    /// Guided local search rounds without a new best before stopping.
    pub stagnation_rounds: usize,
}

impl Default for SearchParameters {
    fn default() -> Self {
        Self {
            first_solution_strategy: FirstSolutionStrategy::PathCheapestArc,
            local_search_metaheuristic: LocalSearchMetaheuristic::GuidedLocalSearch,
            time_limit: Duration::from_secs(30),
            stagnation_rounds: 64,
        }
    }
}

/// A solved assignment: the visited nodes of every vehicle, depot excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    routes: Vec<Vec<NodeIndex>>,
    /// `[dimension][vehicle][position]` earliest consistent cumul values.
    cumuls: Vec<Vec<Vec<i64>>>,
    dropped: Vec<NodeIndex>,
    objective: i64,
}

impl Solution {
    pub fn new(
        routes: Vec<Vec<NodeIndex>>,
        cumuls: Vec<Vec<Vec<i64>>>,
        dropped: Vec<NodeIndex>,
        objective: i64,
    ) -> Self {
        Self {
            routes,
            cumuls,
            dropped,
            objective,
        }
    }

    pub fn vehicle_count(&self) -> usize {
        self.routes.len()
    }

    /// Nodes visited by `vehicle`, in order, without the depot.
    pub fn route(&self, vehicle: usize) -> &[NodeIndex] {
        self.routes.get(vehicle).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Cumul of `dimension` at each visit of [`Solution::route`].
    pub fn cumuls(&self, dimension: DimensionId, vehicle: usize) -> &[i64] {
        self.cumuls
            .get(dimension.0)
            .and_then(|per_vehicle| per_vehicle.get(vehicle))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Optional nodes left unvisited.
    pub fn dropped(&self) -> &[NodeIndex] {
        &self.dropped
    }

    pub fn objective(&self) -> i64 {
        self.objective
    }
}

/// A vehicle routing problem under construction.
///
/// `solve` consumes the model: configuration must be complete before the
/// solve starts and nothing can touch the model afterwards. `Clone` lets the
/// assembler stage a batch of mutations and discard it on failure.
pub trait RoutingModel: Clone {
    fn node_count(&self) -> usize;

    fn vehicle_count(&self) -> usize;

    fn set_arc_cost(&mut self, cost: Transit);

    fn add_dimension(&mut self, spec: DimensionSpec) -> Result<DimensionId, ModelError>;

    fn dimension(&self, name: &str) -> Option<DimensionId>;

    /// Bounds the cumul of `dimension` at `node`, replacing earlier bounds.
    fn set_cumul_range(
        &mut self,
        dimension: DimensionId,
        node: NodeIndex,
        min: i64,
        max: i64,
    ) -> Result<(), ModelError>;

    fn cumul_range(&self, dimension: DimensionId, node: NodeIndex) -> Option<(i64, i64)>;

    /// Makes `nodes` optional: at most one of them is visited, and `penalty`
    /// is paid when none is.
    fn add_disjunction(&mut self, nodes: &[NodeIndex], penalty: i64) -> Result<(), ModelError>;

    fn disjunction_penalty(&self, node: NodeIndex) -> Option<i64>;

    /// Searches for an assignment. `None` when no feasible one was found.
    fn solve(self, parameters: &SearchParameters) -> Option<Solution>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manager_maps_customers_past_depot() {
        let manager = IndexManager::new(3, 1);
        assert_eq!(manager.node_count(), 4);
        assert_eq!(manager.node_for_customer(0), Some(NodeIndex(1)));
        assert_eq!(manager.node_for_customer(3), None);
        assert_eq!(manager.customer_for_node(NodeIndex(3)), Some(2));
        assert_eq!(manager.customer_for_node(IndexManager::DEPOT), None);
        assert_eq!(manager.customer_for_node(NodeIndex(4)), None);
    }

    #[test]
    fn transit_kinds_evaluate() {
        let constant = Transit::Constant(1);
        let unary = Transit::unary(|node| node.0 as i64 * 10);
        let arc = Transit::arc(|from, to| if from == to { 0 } else { 1 });
        assert_eq!(constant.evaluate(NodeIndex(2), NodeIndex(3)), 1);
        assert_eq!(unary.evaluate(NodeIndex(2), NodeIndex(3)), 20);
        assert_eq!(arc.evaluate(NodeIndex(2), NodeIndex(2)), 0);
    }

    #[test]
    fn per_vehicle_capacity_defaults_to_zero_past_end() {
        let capacity = Capacity::PerVehicle(vec![3, 5]);
        assert_eq!(capacity.for_vehicle(1), 5);
        assert_eq!(capacity.for_vehicle(2), 0);
    }

    #[test]
    fn solution_route_out_of_range_is_empty() {
        let solution = Solution::new(vec![vec![NodeIndex(1)]], vec![vec![vec![540]]], Vec::new(), 2);
        assert_eq!(solution.route(0), &[NodeIndex(1)]);
        assert!(solution.route(5).is_empty());
        assert_eq!(solution.cumuls(DimensionId(0), 0), &[540]);
        assert!(solution.cumuls(DimensionId(1), 0).is_empty());
    }
}
