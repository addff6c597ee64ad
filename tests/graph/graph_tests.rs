//! Tests for free-DOF assembly, edge edits and caching

use crate::test_helpers::{array_approx_eq, two_leaves};
use ndarray::array;
use stellopt_rs::config::{BoundsPolicy, GraphConfig};
use stellopt_rs::graph::Graph;
use stellopt_rs::kernels::Identity;
use stellopt_rs::StelloptError;

#[test]
fn test_two_leaves_layout() {
    let t = two_leaves();
    let graph = &t.graph;

    assert_eq!(graph.free_count(t.top).unwrap(), 4);
    assert_eq!(
        graph.free_dof_names(t.top).unwrap(),
        vec!["A:a0", "A:a1", "A:a2", "B:b1"]
    );
    assert_eq!(graph.free_count(t.a).unwrap(), 3);
    assert_eq!(graph.free_count(t.b).unwrap(), 1);
}

#[test]
fn test_free_vector_round_trip() {
    let mut t = two_leaves();
    t.graph.set_free_vector(t.top, &[1.0, 2.0, 3.0, 4.0]).unwrap();

    assert_eq!(t.graph.free_vector(t.top).unwrap(), array![1.0, 2.0, 3.0, 4.0]);
    let b = t.graph.dofs(t.b).unwrap().unwrap();
    assert_eq!(b.full(), array![0.0, 4.0]);

    // |A|² + |B|² with b0 held at zero
    assert_eq!(t.graph.scalar(t.top).unwrap(), 30.0);
    assert_eq!(t.graph.gradient(t.top).unwrap(), array![2.0, 4.0, 6.0, 8.0]);
}

#[test]
fn test_wrong_length_is_rejected() {
    let mut t = two_leaves();
    assert!(matches!(
        t.graph.set_free_vector(t.top, &[1.0, 2.0, 3.0]),
        Err(StelloptError::DimensionMismatch(_))
    ));
    assert_eq!(t.graph.free_vector(t.top).unwrap(), array![0.0, 0.0, 0.0, 0.0]);
}

#[test]
fn test_fix_and_unfix_reshape_the_vector() {
    let mut t = two_leaves();
    t.graph.set_free_vector(t.top, &[1.0, 2.0, 3.0, 4.0]).unwrap();

    t.graph.fix(t.a, "a1").unwrap();
    assert_eq!(t.graph.free_count(t.top).unwrap(), 3);
    assert_eq!(t.graph.free_vector(t.top).unwrap(), array![1.0, 3.0, 4.0]);
    assert_eq!(t.graph.gradient(t.top).unwrap(), array![2.0, 6.0, 8.0]);

    t.graph.unfix(t.b, "b0").unwrap();
    assert_eq!(
        t.graph.free_dof_names(t.top).unwrap(),
        vec!["A:a0", "A:a2", "B:b0", "B:b1"]
    );

    t.graph.set_closure_fixed(t.top, false).unwrap();
    assert_eq!(t.graph.free_vector(t.top).unwrap(), array![1.0, 2.0, 3.0, 0.0, 4.0]);

    t.graph.set_closure_fixed(t.top, true).unwrap();
    assert_eq!(t.graph.free_count(t.top).unwrap(), 0);
    assert_eq!(t.graph.gradient(t.top).unwrap().len(), 0);
}

#[test]
fn test_shared_leaf_counted_once() {
    let mut graph = Graph::new(GraphConfig::default());
    let x = graph
        .add_leaf("x", Identity::new(&["x0", "x1"]).with_values(&[1.0, -1.0]))
        .unwrap();
    let y = graph.add_leaf("y", Identity::new(&["y0", "y1"])).unwrap();
    let left = graph.add_sum("left", &[x]).unwrap();
    let right = graph.add_scaled("right", x, -1.0).unwrap();
    let top = graph.add_sum("top", &[left, y, right]).unwrap();
    graph.add_child(top, x).unwrap();

    assert_eq!(graph.dependency_closure(top).unwrap(), vec![top, left, x, y, right]);
    assert_eq!(graph.free_count(top).unwrap(), 4);

    // x + y - x + x, so x enters the Jacobian once with unit weight
    let jac = graph.jacobian(top).unwrap();
    assert_eq!(jac.dim(), (2, 4));
    assert!(array_approx_eq(&jac.row(0).to_owned(), &array![1.0, 0.0, 1.0, 0.0], 1e-15));
    assert!(array_approx_eq(&jac.row(1).to_owned(), &array![0.0, 1.0, 0.0, 1.0], 1e-15));
}

#[test]
fn test_edge_edits_keep_graph_acyclic() {
    let mut t = two_leaves();
    let norm_a = t.graph.parents(t.a).unwrap()[0];

    assert!(t.graph.is_ancestor_of(t.top, t.a).unwrap());
    assert!(!t.graph.is_ancestor_of(t.a, t.top).unwrap());

    assert!(matches!(
        t.graph.add_child(norm_a, t.top),
        Err(StelloptError::CyclicDependency(_))
    ));
    assert!(matches!(
        t.graph.add_child(t.top, t.top),
        Err(StelloptError::CyclicDependency(_))
    ));
    assert_eq!(t.graph.children(norm_a).unwrap(), &[t.a]);

    // Sum nodes accept any positive number of children
    t.graph.remove_child(t.top, norm_a).unwrap();
    assert_eq!(t.graph.free_count(t.top).unwrap(), 1);
    assert!(t.graph.parents(norm_a).unwrap().is_empty());
    assert!(matches!(
        t.graph.remove_child(t.top, norm_a),
        Err(StelloptError::ConfigError(_))
    ));
}

#[test]
fn test_cache_follows_dof_writes() {
    let mut t = two_leaves();
    t.graph.set_free_vector(t.top, &[1.0, 0.0, 0.0, 0.0]).unwrap();
    assert_eq!(t.graph.scalar(t.top).unwrap(), 1.0);
    assert!(t.graph.is_cached(t.top).unwrap());

    // A write below only one branch invalidates that branch and the top
    t.graph.dofs_mut(t.b).unwrap().set("b1", 2.0).unwrap();
    assert!(!t.graph.is_cached(t.top).unwrap());
    assert_eq!(t.graph.scalar(t.top).unwrap(), 5.0);

    t.graph.clear_caches();
    assert!(!t.graph.is_cached(t.top).unwrap());
    assert_eq!(t.graph.scalar(t.top).unwrap(), 5.0);
}

#[test]
fn test_set_free_vector_respects_bounds_policy() {
    let mut t = two_leaves();
    t.graph.dofs_mut(t.a).unwrap().set_bounds("a2", -1.0, 1.0).unwrap();

    let result = t.graph.set_free_vector(t.top, &[1.0, 1.0, 5.0, 1.0]);
    assert!(matches!(result, Err(StelloptError::OutOfBounds(_))));
    assert_eq!(t.graph.free_vector(t.top).unwrap(), array![0.0, 0.0, 0.0, 0.0]);

    let mut graph = Graph::new(GraphConfig::default().with_bounds_policy(BoundsPolicy::Clamp));
    let x = graph.add_leaf("x", Identity::new(&["x0"])).unwrap();
    graph.dofs_mut(x).unwrap().set_bounds("x0", -1.0, 1.0).unwrap();
    graph.set_free_vector(x, &[5.0]).unwrap();
    assert_eq!(graph.free_vector(x).unwrap(), array![1.0]);
    assert_eq!(graph.free_bounds(x).unwrap()[0].max, 1.0);
}

#[test]
fn test_unknown_nodes_and_dofs() {
    let mut t = two_leaves();
    let missing = stellopt_rs::NodeId::from_index(99);
    assert!(matches!(t.graph.free_count(missing), Err(StelloptError::NodeNotFound(99))));
    assert!(matches!(t.graph.fix(t.a, "zz"), Err(StelloptError::DofNotFound(_))));
    assert!(matches!(t.graph.fix(t.top, 0usize), Err(StelloptError::ConfigError(_))));
}
