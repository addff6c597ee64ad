//! Tests for derivative projection onto free-DOF layouts

use crate::test_helpers::{matrix_approx_eq, two_leaves};
use ndarray::{array, Array1, Array2, Axis};
use serde_json::Value;
use stellopt_rs::config::GraphConfig;
use stellopt_rs::derivative::Derivative;
use stellopt_rs::graph::Graph;
use stellopt_rs::kernels::{Functional, FunctionalOutput, Identity};
use stellopt_rs::{Result, StelloptError};

/// `f(u, v) = u · v` over two vector inputs.
#[derive(Debug)]
struct Dot;

impl Functional for Dot {
    fn kind(&self) -> &str {
        "Dot"
    }

    fn accepts(&self, n: usize) -> bool {
        n == 2
    }

    fn apply(&self, _local: &[f64], inputs: &[&Array1<f64>]) -> Result<FunctionalOutput> {
        let (u, v) = (inputs[0], inputs[1]);
        Ok(FunctionalOutput {
            value: Array1::from_elem(1, u.dot(v)),
            d_local: None,
            d_inputs: vec![
                v.view().insert_axis(Axis(0)).to_owned(),
                u.view().insert_axis(Axis(0)).to_owned(),
            ],
        })
    }

    fn to_value(&self) -> Result<Value> {
        Ok(Value::Null)
    }
}

#[test]
fn test_projection_onto_sub_and_super_graphs() {
    let mut t = two_leaves();
    t.graph.set_free_vector(t.top, &[1.0, 2.0, 3.0, 4.0]).unwrap();
    let d = t.graph.derivative(t.top).unwrap();

    // The full partials are kept, fixed DOFs included
    assert_eq!(d.term(t.b).unwrap(), &array![[0.0, 8.0]]);
    assert_eq!(d.derivative_of(&t.graph, t.a).unwrap(), array![[2.0, 4.0, 6.0]]);

    // Projecting onto a leaf keeps only that leaf's free DOFs
    assert_eq!(d.gradient(&t.graph, t.a).unwrap(), array![2.0, 4.0, 6.0]);
    assert_eq!(d.gradient(&t.graph, t.b).unwrap(), array![8.0]);

    // Unfixing b0 after the fact exposes its (zero) partial
    t.graph.unfix(t.b, "b0").unwrap();
    assert_eq!(d.gradient(&t.graph, t.top).unwrap(), array![2.0, 4.0, 6.0, 0.0, 8.0]);
}

#[test]
fn test_chain_rule_through_functional() {
    let mut graph = Graph::new(GraphConfig::default());
    let u = graph
        .add_leaf("u", Identity::new(&["u0", "u1"]).with_values(&[1.0, 2.0]))
        .unwrap();
    let v = graph
        .add_leaf("v", Identity::new(&["v0", "v1"]).with_values(&[3.0, 5.0]))
        .unwrap();
    let dot = graph.add_functional("dot", Dot, &[u, v]).unwrap();
    assert_eq!(graph.scalar(dot).unwrap(), 13.0);
    assert_eq!(graph.gradient(dot).unwrap(), array![3.0, 5.0, 1.0, 2.0]);

    // Same leaf on both sides: d(u·u) = 2u
    let square = graph.add_functional("square", Dot, &[u, u]).unwrap();
    assert_eq!(graph.free_count(square).unwrap(), 2);
    assert_eq!(graph.gradient(square).unwrap(), array![2.0, 4.0]);

    assert!(matches!(
        graph.add_functional("bad", Dot, &[u]),
        Err(StelloptError::ConfigError(_))
    ));
}

#[test]
fn test_from_free_gradient() {
    let mut t = two_leaves();
    let d = Derivative::from_free_gradient(&t.graph, t.b, &array![7.0]).unwrap();
    assert_eq!(d.term(t.b).unwrap(), &array![[0.0, 7.0]]);
    assert_eq!(d.gradient(&t.graph, t.top).unwrap(), array![0.0, 0.0, 0.0, 7.0]);

    t.graph.unfix(t.b, "b0").unwrap();
    assert!(matches!(
        Derivative::from_free_gradient(&t.graph, t.b, &array![7.0]),
        Err(StelloptError::ShapeMismatch(_))
    ));
    assert!(matches!(
        Derivative::from_free_gradient(&t.graph, t.top, &array![7.0]),
        Err(StelloptError::ShapeMismatch(_))
    ));
}

#[test]
fn test_projection_rejects_foreign_shapes() {
    let t = two_leaves();
    let bad = Derivative::local(t.a, Array2::ones((1, 2)));
    assert!(matches!(
        bad.project(&t.graph, t.top),
        Err(StelloptError::ShapeMismatch(_))
    ));

    // Partials of nodes outside the closure are ignored
    let outside = Derivative::local(t.b, Array2::ones((1, 2)));
    assert_eq!(outside.gradient(&t.graph, t.a).unwrap(), array![0.0, 0.0, 0.0]);
}

#[test]
fn test_vector_jacobian_projection() {
    let mut t = two_leaves();
    let d = Derivative::local(t.a, Array2::eye(3)) * 2.0;
    let d = d
        .checked_add(&Derivative::local(t.b, array![[1.0, 1.0], [0.0, 0.0], [0.0, 1.0]]))
        .unwrap();
    let expected = array![
        [2.0, 0.0, 0.0, 1.0],
        [0.0, 2.0, 0.0, 0.0],
        [0.0, 0.0, 2.0, 1.0]
    ];
    assert!(matrix_approx_eq(&d.project(&t.graph, t.top).unwrap(), &expected, 1e-15));

    t.graph.fix(t.a, "a0").unwrap();
    assert_eq!(d.project(&t.graph, t.top).unwrap().dim(), (3, 3));
}
