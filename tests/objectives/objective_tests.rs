//! Tests for objective combinators built on shared leaves

use crate::test_helpers::{approx_eq, taylor_check, two_leaves};
use approx::assert_relative_eq;
use ndarray::array;
use stellopt_rs::config::GraphConfig;
use stellopt_rs::graph::Graph;
use stellopt_rs::kernels::Identity;
use stellopt_rs::objectives::PenaltyKind;
use stellopt_rs::StelloptError;

fn leaf(graph: &mut Graph, label: &str, values: &[f64]) -> stellopt_rs::NodeId {
    let names: Vec<String> = (0..values.len()).map(|i| format!("{}{}", label, i)).collect();
    graph
        .add_leaf(label, Identity::new(&names).with_values(values))
        .unwrap()
}

#[test]
fn test_aliased_scalings_add_up() {
    let mut graph = Graph::new(GraphConfig::default());
    let x = leaf(&mut graph, "x", &[1.0, -2.0]);
    let two = graph.add_scaled("2x", x, 2.0).unwrap();
    let three = graph.add_scaled("3x", x, 3.0).unwrap();
    let total = graph.add_sum("5x", &[two, three]).unwrap();

    assert_eq!(graph.value(total).unwrap(), array![5.0, -10.0]);
    let d = graph.derivative(total).unwrap();
    assert_eq!(d.term(x).unwrap(), &(ndarray::Array2::<f64>::eye(2) * 5.0));
    assert_eq!(graph.free_count(total).unwrap(), 2);
}

#[test]
fn test_sum_lengths_must_agree() {
    let mut graph = Graph::new(GraphConfig::default());
    let x = leaf(&mut graph, "x", &[1.0, 2.0]);
    let y = leaf(&mut graph, "y", &[1.0]);
    let bad = graph.add_sum("bad", &[x, y]).unwrap();
    assert!(matches!(graph.value(bad), Err(StelloptError::DimensionMismatch(_))));
    assert!(matches!(graph.add_sum("empty", &[]), Err(StelloptError::ConfigError(_))));
}

#[test]
fn test_penalty_sides() {
    let mut graph = Graph::new(GraphConfig::default());
    let x = leaf(&mut graph, "x", &[3.0]);
    let max = graph.add_quadratic_penalty("max", x, 3.0, PenaltyKind::Max).unwrap();
    let min = graph.add_quadratic_penalty("min", x, 3.0, PenaltyKind::Min).unwrap();

    // Exactly at the threshold both sides are inactive
    assert_eq!(graph.scalar(max).unwrap(), 0.0);
    assert_eq!(graph.gradient(max).unwrap(), array![0.0]);
    assert_eq!(graph.scalar(min).unwrap(), 0.0);

    graph.set_free_vector(x, &[1.0]).unwrap();
    assert_eq!(graph.scalar(max).unwrap(), 0.0);
    assert_eq!(graph.gradient(max).unwrap(), array![0.0]);
    assert_eq!(graph.scalar(min).unwrap(), 4.0);
    assert_eq!(graph.gradient(min).unwrap(), array![-4.0]);

    graph.set_free_vector(x, &[4.5]).unwrap();
    assert_eq!(graph.scalar(max).unwrap(), 2.25);
    assert_eq!(graph.gradient(max).unwrap(), array![3.0]);
    assert_eq!(graph.scalar(min).unwrap(), 0.0);

    assert!(matches!(
        graph.add_quadratic_penalty("nan", x, f64::NAN, PenaltyKind::Identity),
        Err(StelloptError::ConfigError(_))
    ));
}

#[test_log::test]
fn test_two_leaves_taylor() {
    let mut t = two_leaves();
    t.graph.set_free_vector(t.top, &[0.3, -1.2, 0.7, 2.0]).unwrap();
    let report = taylor_check(&mut t.graph, t.top, 11);
    assert!(report.converged(), "errors: {:?}", report.errors);
}

#[test]
fn test_least_squares_objective_and_gradient() {
    let mut graph = Graph::new(GraphConfig::default());
    let a = leaf(&mut graph, "a", &[1.0, 2.0]);
    let b = leaf(&mut graph, "b", &[4.0]);
    let lsq = graph
        .add_least_squares_from_sigmas("lsq", &[a, b], &[1.0, 3.0], &[0.5, -2.0])
        .unwrap();

    // (a - 1) / 0.5 and (b - 3) / 2
    assert_eq!(graph.value(lsq).unwrap(), array![0.0, 2.0, 0.5]);
    assert_eq!(graph.least_squares_objective(lsq).unwrap(), 4.25);
    assert_eq!(
        graph.least_squares_gradient(lsq).unwrap(),
        array![0.0, 2.0 * 2.0 * 2.0, 2.0 * 0.5 * 0.5]
    );

    // The stack can be used directly as an objective vector
    let jac = graph.jacobian(lsq).unwrap();
    assert_eq!(jac, array![[2.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 0.5]]);

    assert!(matches!(
        graph.add_least_squares_from_sigmas("zero", &[a], &[1.0], &[0.0]),
        Err(StelloptError::ConfigError(_))
    ));
    assert!(matches!(
        graph.add_least_squares("neg", &[a], &[1.0], &[-1.0]),
        Err(StelloptError::ConfigError(_))
    ));
    assert!(matches!(
        graph.add_least_squares("short", &[a, b], &[1.0], &[1.0]),
        Err(StelloptError::ConfigError(_))
    ));
}

#[test]
fn test_least_squares_terms_are_editable() {
    let mut graph = Graph::new(GraphConfig::default());
    let a = leaf(&mut graph, "a", &[2.0]);
    let b = leaf(&mut graph, "b", &[5.0]);
    let lsq = graph.add_least_squares("lsq", &[a], &[0.0], &[1.0]).unwrap();
    assert_eq!(graph.least_squares_objective(lsq).unwrap(), 4.0);

    graph.push_least_squares_term(lsq, b, 1.0, 0.5).unwrap();
    assert_eq!(graph.free_count(lsq).unwrap(), 2);
    assert_eq!(graph.least_squares_objective(lsq).unwrap(), 8.0);

    graph.remove_least_squares_term(lsq, 0).unwrap();
    assert_eq!(graph.children(lsq).unwrap(), &[b]);
    assert_eq!(graph.least_squares_objective(lsq).unwrap(), 4.0);
    assert!(graph.remove_least_squares_term(lsq, 0).is_err());

    // Adding a term that depends on the stack itself would close a cycle
    let wrapped = graph.add_scaled("wrapped", lsq, 1.0).unwrap();
    assert!(matches!(
        graph.push_least_squares_term(lsq, wrapped, 0.0, 1.0),
        Err(StelloptError::CyclicDependency(_))
    ));
    assert!(graph.least_squares_objective(a).is_err());
}

#[test]
fn test_constrained_stack() {
    let mut graph = Graph::new(GraphConfig::default());
    let x = leaf(&mut graph, "x", &[1.0, 2.0]);
    let objective = graph
        .add_quadratic_penalty("J", x, 0.0, PenaltyKind::Identity)
        .unwrap();
    let doubled = graph.add_scaled("g", x, 2.0).unwrap();
    let constrained = graph
        .add_constrained("problem", objective, &[(doubled, 0.0, 3.0)])
        .unwrap();

    assert_eq!(graph.value(constrained).unwrap(), array![5.0, 2.0, 4.0]);
    let jac = graph.jacobian(constrained).unwrap();
    assert_eq!(jac, array![[2.0, 4.0], [2.0, 0.0], [0.0, 2.0]]);

    let constraints = graph.constraint_values(constrained).unwrap();
    assert_eq!(constraints.len(), 2);
    assert_eq!(constraints[0].violation(), 0.0);
    assert!(approx_eq(constraints[1].violation(), 1.0, 1e-15));

    // A vector objective is rejected when the node is evaluated
    let vector = graph
        .add_constrained("vector", doubled, &[(objective, 0.0, 1.0)])
        .unwrap();
    assert!(matches!(graph.value(vector), Err(StelloptError::ConfigError(_))));

    assert!(matches!(
        graph.add_constrained("inverted", objective, &[(doubled, 3.0, 0.0)]),
        Err(StelloptError::ConfigError(_))
    ));
    assert!(graph.constraint_values(objective).is_err());
}

#[test]
fn test_scaled_of_penalty_matches_finite_difference() {
    let mut graph = Graph::new(GraphConfig::default());
    let x = leaf(&mut graph, "x", &[0.4, 1.3, -0.2]);
    let penalty = graph
        .add_quadratic_penalty("p", x, 0.5, PenaltyKind::Max)
        .unwrap();
    let scaled = graph.add_scaled("s", penalty, -0.25).unwrap();

    let analytic = graph.gradient(scaled).unwrap();
    let fd = stellopt_rs::finite_difference::graph_gradient(
        &graph,
        scaled,
        &stellopt_rs::config::FiniteDifferenceConfig::default(),
    )
    .unwrap();
    for (a, f) in analytic.iter().zip(fd.iter()) {
        assert_relative_eq!(a, f, epsilon = 1e-6);
    }
    assert_eq!(analytic[0], 0.0);
}
