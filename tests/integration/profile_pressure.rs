//! Pressure from density and scaled temperature profiles, fitted to a
//! target by least squares.

use crate::test_helpers::{array_approx_eq, matrix_approx_eq};
use ndarray::{array, Array1};
use stellopt_rs::config::{FiniteDifferenceConfig, GraphConfig};
use stellopt_rs::finite_difference::jacobian;
use stellopt_rs::graph::Graph;
use stellopt_rs::kernels::{ProfilePolynomial, ProfilePressure, ProfileScaled};
use stellopt_rs::{GraphProblem, NodeId, Problem, StelloptError};

const S: [f64; 3] = [0.0, 0.5, 1.0];

fn pressure_fit() -> (Graph, NodeId, NodeId) {
    let mut graph = Graph::new(GraphConfig::default());
    let ne = graph
        .add_leaf("ne", ProfilePolynomial::new(vec![1.0, 0.0, -1.0], S.to_vec()))
        .unwrap();
    let te = graph
        .add_leaf("te", ProfilePolynomial::new(vec![2.0, -1.0], S.to_vec()))
        .unwrap();
    let te_scaled = graph
        .add_functional("te_scaled", ProfileScaled::new(1.5), &[te])
        .unwrap();
    let pressure = graph
        .add_functional("pressure", ProfilePressure, &[ne, te_scaled])
        .unwrap();
    let fit = graph
        .add_least_squares("fit", &[pressure], &[1.0], &[1.0])
        .unwrap();
    (graph, pressure, fit)
}

#[test]
fn test_pressure_value_and_layout() {
    let (mut graph, pressure, _) = pressure_fit();
    // ne = 1 - s², te = 1.5 (2 - s)
    assert!(array_approx_eq(
        &graph.value(pressure).unwrap(),
        &array![3.0, 1.6875, 0.0],
        1e-14
    ));
    assert_eq!(
        graph.free_dof_names(pressure).unwrap(),
        vec![
            "ne:c(0)",
            "ne:c(1)",
            "ne:c(2)",
            "te_scaled:scalefac",
            "te:c(0)",
            "te:c(1)"
        ]
    );
}

#[test]
fn test_jacobian_matches_finite_difference() {
    let (graph, _, fit) = pressure_fit();
    let mut problem = GraphProblem::new(graph, fit).unwrap();
    assert!(problem.has_custom_jacobian());

    let x = problem.x().unwrap();
    let analytic = Problem::jacobian(&mut problem, &x).unwrap();
    let mut probe = problem.clone();
    let fd = jacobian(
        |p: &Array1<f64>| probe.eval(p),
        &x,
        &FiniteDifferenceConfig::default(),
    )
    .unwrap();
    assert_eq!(analytic.dim(), (3, 6));
    assert!(matrix_approx_eq(&analytic, &fd, 1e-6));

    // Scalefac column: the unscaled temperature times the density
    let column = analytic.column(3).to_owned();
    assert!(array_approx_eq(&column, &array![2.0, 1.125, 0.0], 1e-14));
}

#[test]
fn test_objective_is_sum_of_squares() {
    let (graph, _, fit) = pressure_fit();
    let mut problem = GraphProblem::new(graph, fit).unwrap();
    let x = problem.x().unwrap();

    let residuals = problem.eval(&x).unwrap();
    assert!(array_approx_eq(&residuals, &array![2.0, 0.6875, -1.0], 1e-14));
    let cost = problem.eval_cost(&x).unwrap();
    assert!((problem.j().unwrap() - cost).abs() < 1e-14);

    let gradient = problem.dj().unwrap();
    let jacobian = problem.jacobian().unwrap();
    let expected = jacobian.t().dot(&residuals) * 2.0;
    assert!(array_approx_eq(&gradient, &expected, 1e-14));
}

#[test]
fn test_fixing_the_scale_factor() {
    let (mut graph, pressure, fit) = pressure_fit();
    let te_scaled = graph.children(pressure).unwrap()[1];
    graph.fix(te_scaled, "scalefac").unwrap();
    assert_eq!(graph.free_count(fit).unwrap(), 5);

    let mut problem = GraphProblem::new(graph, fit).unwrap();
    let x0 = problem.x().unwrap();
    let (j0, g0) = problem.value_and_gradient(&x0.to_vec()).unwrap();
    let step: Array1<f64> = &x0 - &(&g0 * (1e-3 / g0.dot(&g0).sqrt()));
    let (j1, _) = problem.value_and_gradient(&step.to_vec()).unwrap();
    assert!(j1 < j0);

    // The fixed factor kept its value
    let graph = problem.into_graph();
    assert_eq!(graph.dofs(te_scaled).unwrap().unwrap().get("scalefac").unwrap(), 1.5);
}

#[test]
fn test_mismatched_profiles() {
    let mut graph = Graph::new(GraphConfig::default());
    let ne = graph
        .add_leaf("ne", ProfilePolynomial::new(vec![1.0], S.to_vec()))
        .unwrap();
    let te = graph
        .add_leaf("te", ProfilePolynomial::new(vec![1.0], vec![0.0, 1.0]))
        .unwrap();
    let pressure = graph
        .add_functional("pressure", ProfilePressure, &[ne, te])
        .unwrap();
    assert!(matches!(
        graph.value(pressure),
        Err(StelloptError::DimensionMismatch(_))
    ));
    assert!(matches!(
        graph.add_functional("odd", ProfilePressure, &[ne]),
        Err(StelloptError::ConfigError(_))
    ));
}
