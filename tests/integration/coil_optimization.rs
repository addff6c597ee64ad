//! Two coils with length targets and a coil-coil distance penalty.

use crate::test_helpers::taylor_check;
use approx::assert_relative_eq;
use ndarray::Array1;
use stellopt_rs::config::{FiniteDifferenceConfig, GraphConfig};
use stellopt_rs::finite_difference::graph_gradient;
use stellopt_rs::graph::Graph;
use stellopt_rs::kernels::{CurveCurveDistance, CurveLength, CurveXYZFourier};
use stellopt_rs::objectives::PenaltyKind;
use stellopt_rs::problem::BlowupGuard;
use stellopt_rs::{ConstrainedProblem, GraphProblem, NodeId, Problem};

struct Coils {
    graph: Graph,
    coil_a: NodeId,
    coil_b: NodeId,
    distance: NodeId,
    total: NodeId,
}

/// Unit circles stacked 0.3 apart in z, each with a length target, plus a
/// weighted distance penalty. A threshold of 3 keeps every point pair
/// inside the smooth branch of the penalty.
fn coils(minimum_distance: f64) -> Coils {
    let mut graph = Graph::new(GraphConfig::default());
    let coil_a = graph
        .add_leaf("coil_a", CurveXYZFourier::circle(2, 16, [0.0, 0.0, 0.0], 1.0))
        .unwrap();
    let coil_b = graph
        .add_leaf("coil_b", CurveXYZFourier::circle(2, 16, [0.0, 0.0, 0.3], 1.0))
        .unwrap();
    graph.fix(coil_a, "zc(0)").unwrap();

    let mut terms = Vec::new();
    for (label, coil) in [("length_a", coil_a), ("length_b", coil_b)] {
        let length = graph.add_functional(label, CurveLength, &[coil]).unwrap();
        let target = format!("{}_target", label);
        terms.push(
            graph
                .add_quadratic_penalty(&target, length, 5.0, PenaltyKind::Identity)
                .unwrap(),
        );
    }
    let distance = graph
        .add_functional(
            "distance",
            CurveCurveDistance::new(minimum_distance),
            &[coil_a, coil_b],
        )
        .unwrap();
    terms.push(graph.add_scaled("distance_weighted", distance, 10.0).unwrap());
    let total = graph.add_sum("total", &terms).unwrap();

    Coils {
        graph,
        coil_a,
        coil_b,
        distance,
        total,
    }
}

#[test]
fn test_layout_of_two_coils() {
    let c = coils(3.0);
    // 15 DOFs per coil, one fixed
    assert_eq!(c.graph.free_count(c.total).unwrap(), 29);
    let names = c.graph.free_dof_names(c.total).unwrap();
    assert_eq!(names[0], "coil_a:xc(0)");
    assert_eq!(names[14], "coil_b:xc(0)");
    assert!(!names.contains(&"coil_a:zc(0)".to_string()));
}

#[test]
fn test_shortest_distance() {
    let mut c = coils(0.5);
    let a = c.graph.value(c.coil_a).unwrap();
    let b = c.graph.value(c.coil_b).unwrap();
    let shortest = CurveCurveDistance::shortest_distance(&[&a, &b]).unwrap();
    assert_relative_eq!(shortest, 0.3, epsilon = 1e-12);
    assert!(c.graph.scalar(c.distance).unwrap() > 0.0);

    // A threshold below the closest approach incurs no penalty and no gradient
    let far = coils(0.1);
    let mut graph = far.graph;
    assert_eq!(graph.scalar(far.distance).unwrap(), 0.0);
    assert!(graph.gradient(far.distance).unwrap().iter().all(|g| *g == 0.0));
}

#[test_log::test]
fn test_total_objective_taylor() {
    let mut c = coils(3.0);
    let report = taylor_check(&mut c.graph, c.total, 2024);
    assert!(report.converged(), "errors: {:?}", report.errors);

    let report = taylor_check(&mut c.graph, c.distance, 7);
    assert!(report.converged(), "errors: {:?}", report.errors);
}

#[test]
fn test_gradient_matches_finite_difference() {
    let mut c = coils(3.0);
    let config = FiniteDifferenceConfig::default().with_steps(1e-6, 0.0);
    let fd = graph_gradient(&c.graph, c.total, &config).unwrap();
    let analytic = c.graph.gradient(c.total).unwrap();
    assert_eq!(fd.len(), analytic.len());
    for (f, a) in fd.iter().zip(analytic.iter()) {
        assert_relative_eq!(f, a, epsilon = 1e-5, max_relative = 1e-6);
    }
}

#[test]
fn test_descent_steps_reduce_objective() {
    let c = coils(0.5);
    let mut problem = GraphProblem::new(c.graph, c.total).unwrap();
    let mut x = problem.x().unwrap();
    let (j0, _) = problem.value_and_gradient(&x.to_vec()).unwrap();

    let mut j = j0;
    for _ in 0..5 {
        let g = problem.dj().unwrap();
        let norm = g.dot(&g).sqrt();
        assert!(norm > 0.0);
        let trial: Array1<f64> = &x - &(&g * (1e-3 / norm));
        let (j_trial, _) = problem.value_and_gradient(&trial.to_vec()).unwrap();
        assert!(j_trial < j, "{} !< {}", j_trial, j);
        x = trial;
        j = j_trial;
    }
    assert!(j < j0);
    assert_eq!(Problem::parameter_count(&problem).unwrap(), 29);
    assert_eq!(problem.residual_count().unwrap(), 1);
}

#[test]
fn test_blowup_guard_clamps_objective() {
    let c = coils(0.5);
    let mut problem = GraphProblem::new(c.graph, c.total)
        .unwrap()
        .with_guard(BlowupGuard::new(1e-3).unwrap());
    assert_eq!(problem.j().unwrap(), 1e-3);
    assert!(problem.dj().unwrap().iter().all(|g| *g == 0.0));
    assert_eq!(problem.dj().unwrap().len(), 29);
}

#[test]
fn test_distance_as_constraint() {
    let Coils {
        mut graph,
        coil_a,
        distance,
        ..
    } = coils(0.5);
    let length = graph.add_functional("length", CurveLength, &[coil_a]).unwrap();
    let objective = graph
        .add_quadratic_penalty("objective", length, 5.0, PenaltyKind::Identity)
        .unwrap();
    let root = graph
        .add_constrained("problem", objective, &[(distance, f64::NEG_INFINITY, 1e-6)])
        .unwrap();

    let mut problem = ConstrainedProblem::new(graph, root).unwrap();
    assert_eq!(problem.x().unwrap().len(), 29);
    assert!(!problem.is_feasible(0.0).unwrap());
    assert_eq!(problem.constraint_jacobian().unwrap().dim(), (1, 29));

    // Moving coil B far away makes the distance constraint inactive
    let mut x = problem.x().unwrap();
    let names = problem.graph().free_dof_names(root).unwrap();
    let zc = names.iter().position(|n| n == "coil_b:zc(0)").unwrap();
    x[zc] = 5.0;
    problem.set_x(&x.to_vec()).unwrap();
    assert!(problem.is_feasible(0.0).unwrap());
    assert_eq!(problem.constraints().unwrap()[0].value, 0.0);

    // The objective ignores coil B
    let gradient = problem.objective_gradient().unwrap();
    assert!(gradient.iter().skip(14).all(|g| *g == 0.0));
}
