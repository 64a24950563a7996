//! Routing engine tests
//!
//! Tests for dimensions, windows, capacities, disjunctions and staging.

use std::time::Duration;

use rule_planner::routing::{
    Capacity, DimensionSpec, FirstSolutionStrategy, IndexManager, LocalSearchMetaheuristic,
    NodeIndex, RoutingModel, SearchParameters, Transit,
};
use rule_planner::solver::LocalSearchRouting;

// ============================================================================
// Test Fixtures
// ============================================================================

fn params() -> SearchParameters {
    SearchParameters {
        time_limit: Duration::from_millis(500),
        stagnation_rounds: 16,
        ..SearchParameters::default()
    }
}

/// Model with unit arc costs, as the planner builds it.
fn model(customers: usize, vehicles: usize) -> LocalSearchRouting {
    let manager = IndexManager::new(customers, vehicles);
    let mut model = LocalSearchRouting::new(&manager);
    model.set_arc_cost(Transit::arc(|from, to| if from == to { 0 } else { 1 }));
    model
}

fn time_dimension(service: Vec<i64>) -> DimensionSpec {
    DimensionSpec {
        name: "Time".to_string(),
        transit: Transit::unary(move |node| service.get(node.0).copied().unwrap_or(0)),
        slack_max: 1440,
        capacity: Capacity::Uniform(1440),
        fix_start_cumul_to_zero: false,
    }
}

fn visit_count(capacity: Capacity) -> DimensionSpec {
    DimensionSpec {
        name: "VisitCount".to_string(),
        transit: Transit::unary(|node| if node == IndexManager::DEPOT { 0 } else { 1 }),
        slack_max: 0,
        capacity,
        fix_start_cumul_to_zero: true,
    }
}

fn visited(solution: &rule_planner::routing::Solution) -> Vec<NodeIndex> {
    let mut nodes: Vec<NodeIndex> = (0..solution.vehicle_count())
        .flat_map(|vehicle| solution.route(vehicle).to_vec())
        .collect();
    nodes.sort();
    nodes
}

// ============================================================================
// Windows
// ============================================================================

#[test]
fn windows_decide_visit_order() {
    let mut model = model(2, 1);
    let time = model.add_dimension(time_dimension(vec![0, 30, 30])).unwrap();
    model.set_cumul_range(time, NodeIndex(1), 600, 660).unwrap();
    model.set_cumul_range(time, NodeIndex(2), 480, 540).unwrap();

    let solution = model.solve(&params()).expect("feasible");

    assert_eq!(solution.route(0), &[NodeIndex(2), NodeIndex(1)]);
    assert_eq!(solution.cumuls(time, 0), &[480, 600]);
    assert_eq!(solution.objective(), 3);
}

#[test]
fn disjoint_windows_with_long_service_are_infeasible() {
    let mut model = model(2, 1);
    let time = model.add_dimension(time_dimension(vec![0, 120, 120])).unwrap();
    model.set_cumul_range(time, NodeIndex(1), 540, 540).unwrap();
    model.set_cumul_range(time, NodeIndex(2), 600, 600).unwrap();

    assert!(model.solve(&params()).is_none());
}

#[test]
fn later_range_replaces_earlier_one() {
    let mut model = model(1, 1);
    let time = model.add_dimension(time_dimension(vec![0, 30])).unwrap();
    model.set_cumul_range(time, NodeIndex(1), 0, 10).unwrap();
    model.set_cumul_range(time, NodeIndex(1), 540, 720).unwrap();
    assert_eq!(model.cumul_range(time, NodeIndex(1)), Some((540, 720)));

    let solution = model.solve(&params()).unwrap();
    assert_eq!(solution.cumuls(time, 0), &[540]);
}

// ============================================================================
// Capacities
// ============================================================================

#[test]
fn visit_cap_spreads_nodes_across_vehicles() {
    let mut model = model(4, 2);
    model.add_dimension(visit_count(Capacity::Uniform(2))).unwrap();

    let solution = model.solve(&params()).unwrap();

    assert_eq!(solution.route(0).len(), 2);
    assert_eq!(solution.route(1).len(), 2);
    assert_eq!(visited(&solution), (1..=4).map(NodeIndex).collect::<Vec<_>>());
}

#[test]
fn per_vehicle_capacity_is_honored() {
    let mut model = model(3, 2);
    model
        .add_dimension(visit_count(Capacity::PerVehicle(vec![0, 3])))
        .unwrap();

    let solution = model.solve(&params()).unwrap();

    assert!(solution.route(0).is_empty());
    assert_eq!(solution.route(1).len(), 3);
}

#[test]
fn mandatory_nodes_over_capacity_have_no_solution() {
    let mut model = model(3, 1);
    model.add_dimension(visit_count(Capacity::Uniform(2))).unwrap();
    assert!(model.solve(&params()).is_none());
}

#[test]
fn capacity_list_must_match_vehicles() {
    let mut model = model(3, 2);
    assert!(model
        .add_dimension(visit_count(Capacity::PerVehicle(vec![4])))
        .is_err());
}

#[test]
fn duplicate_dimension_is_rejected() {
    let mut model = model(1, 1);
    model.add_dimension(visit_count(Capacity::Uniform(4))).unwrap();
    assert!(model.add_dimension(visit_count(Capacity::Uniform(4))).is_err());
}

// ============================================================================
// Disjunctions
// ============================================================================

#[test]
fn optional_node_is_dropped_when_capacity_runs_out() {
    let mut model = model(2, 1);
    model.add_dimension(visit_count(Capacity::Uniform(1))).unwrap();
    model.add_disjunction(&[NodeIndex(2)], 5).unwrap();

    let solution = model.solve(&params()).unwrap();

    assert_eq!(solution.route(0), &[NodeIndex(1)]);
    assert_eq!(solution.dropped(), &[NodeIndex(2)]);
    assert_eq!(solution.objective(), 2 + 5);
}

#[test]
fn optional_node_is_visited_when_cheaper_than_penalty() {
    let mut model = model(2, 1);
    model.add_disjunction(&[NodeIndex(1)], 1000).unwrap();

    let solution = model.solve(&params()).unwrap();

    assert!(solution.dropped().is_empty());
    assert_eq!(visited(&solution), vec![NodeIndex(1), NodeIndex(2)]);
}

#[test]
fn zero_penalty_node_stays_unvisited() {
    let mut model = model(2, 1);
    model.add_disjunction(&[NodeIndex(2)], 0).unwrap();

    let solution = model.solve(&params()).unwrap();

    assert_eq!(solution.dropped(), &[NodeIndex(2)]);
    assert_eq!(solution.objective(), 2);
}

#[test]
fn maximal_penalties_saturate_the_objective() {
    let mut model = model(3, 1);
    model.add_dimension(visit_count(Capacity::Uniform(1))).unwrap();
    for node in 1..=3 {
        model.add_disjunction(&[NodeIndex(node)], i64::MAX).unwrap();
    }

    let solution = model.solve(&params()).expect("optional nodes are always feasible");

    assert_eq!(solution.route(0), &[NodeIndex(1)]);
    assert_eq!(solution.dropped(), &[NodeIndex(2), NodeIndex(3)]);
    assert_eq!(solution.objective(), i64::MAX);
}

// ============================================================================
// Search
// ============================================================================

#[test]
fn empty_model_solves_to_empty_routes() {
    let model = model(0, 2);
    let solution = model.solve(&params()).unwrap();
    assert!(solution.route(0).is_empty());
    assert!(solution.route(1).is_empty());
    assert_eq!(solution.objective(), 0);
}

#[test]
fn greedy_descent_with_cheapest_insertion() {
    let mut model = model(3, 1);
    model.add_dimension(time_dimension(vec![0, 30, 30, 30])).unwrap();
    let parameters = SearchParameters {
        first_solution_strategy: FirstSolutionStrategy::CheapestInsertion,
        local_search_metaheuristic: LocalSearchMetaheuristic::GreedyDescent,
        ..params()
    };

    let solution = model.solve(&parameters).unwrap();

    assert_eq!(solution.route(0).len(), 3);
    assert_eq!(solution.objective(), 4);
}

#[test]
fn staged_clone_does_not_touch_original() {
    let mut original = model(2, 1);
    original.add_dimension(visit_count(Capacity::Uniform(4))).unwrap();

    let mut staged = original.clone();
    staged.add_disjunction(&[NodeIndex(1)], 10).unwrap();
    staged.add_dimension(time_dimension(vec![0, 30, 30])).unwrap();

    assert_eq!(original.disjunction_penalty(NodeIndex(1)), None);
    assert!(original.dimension("Time").is_none());
    assert_eq!(staged.disjunction_penalty(NodeIndex(1)), Some(10));
}
