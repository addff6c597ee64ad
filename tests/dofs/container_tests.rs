//! Tests for the DofContainer implementation

use stellopt_rs::config::BoundsPolicy;
use stellopt_rs::dofs::{Bounds, DofContainer};
use stellopt_rs::StelloptError;

fn rz_container(policy: BoundsPolicy) -> DofContainer {
    DofContainer::new(
        &["rc(0,0)", "rc(1,0)", "zs(1,0)", "rc(2,0)"],
        &[1.0, 0.1, 0.1, 0.01],
        policy,
    )
    .unwrap()
}

#[test]
fn test_fix_by_name_and_index() {
    let mut dofs = rz_container(BoundsPolicy::Reject);
    dofs.fix("rc(0,0)").unwrap();
    dofs.fix(3usize).unwrap();
    assert_eq!(dofs.free_names(), vec!["rc(1,0)", "zs(1,0)"]);
    assert_eq!(dofs.fixed_mask(), vec![true, false, false, true]);

    // Fixed values are kept and reappear on unfix at their old position
    dofs.set_free(&[0.2, 0.3]).unwrap();
    dofs.unfix_all();
    assert_eq!(dofs.free().to_vec(), vec![1.0, 0.2, 0.3, 0.01]);

    assert!(matches!(dofs.fix("nope"), Err(StelloptError::DofNotFound(_))));
    assert!(matches!(dofs.fix(9usize), Err(StelloptError::DofNotFound(_))));
}

#[test]
fn test_set_fixed_where() {
    let mut dofs = rz_container(BoundsPolicy::Reject);
    let changed = dofs.set_fixed_where(true, |name| name.starts_with("rc"));
    assert_eq!(changed, 3);
    assert_eq!(dofs.free_names(), vec!["zs(1,0)"]);
}

#[test]
fn test_reject_policy_is_atomic() {
    let mut dofs = rz_container(BoundsPolicy::Reject);
    dofs.set_bounds("rc(1,0)", 0.0, 0.5).unwrap();
    let version = dofs.version();

    let result = dofs.set_full(&[2.0, 0.9, 0.0, 0.0]);
    assert!(matches!(result, Err(StelloptError::OutOfBounds(_))));
    assert_eq!(dofs.full().to_vec(), vec![1.0, 0.1, 0.1, 0.01]);
    assert_eq!(dofs.version(), version);

    assert!(matches!(
        dofs.set_free(&[1.0, 0.2, f64::NAN, 0.0]),
        Err(StelloptError::OutOfBounds(_))
    ));
}

#[test]
fn test_clamp_policy() {
    let mut dofs = rz_container(BoundsPolicy::Clamp);
    dofs.set_bounds("rc(1,0)", 0.0, 0.5).unwrap();
    dofs.set_full(&[2.0, 0.9, 0.0, 0.0]).unwrap();
    assert_eq!(dofs.full().to_vec(), vec![2.0, 0.5, 0.0, 0.0]);
}

#[test]
fn test_invalid_bounds() {
    let mut dofs = rz_container(BoundsPolicy::Reject);
    assert!(matches!(
        dofs.set_bounds(0usize, 1.0, -1.0),
        Err(StelloptError::ConfigError(_))
    ));
    assert!(Bounds::new(f64::NAN, 1.0).is_err());
}

#[test]
fn test_every_mutation_bumps_version() {
    let mut dofs = rz_container(BoundsPolicy::Reject);
    let mut last = dofs.version();
    let mut bumped = |dofs: &DofContainer| {
        let v = dofs.version();
        let ok = v > last;
        last = v;
        ok
    };

    dofs.set("zs(1,0)", 0.2).unwrap();
    assert!(bumped(&dofs));
    dofs.fix("zs(1,0)").unwrap();
    assert!(bumped(&dofs));
    dofs.unfix("zs(1,0)").unwrap();
    assert!(bumped(&dofs));
    dofs.set_bounds("zs(1,0)", -1.0, 1.0).unwrap();
    assert!(bumped(&dofs));
    dofs.set_free(&[1.0, 0.1, 0.1, 0.01]).unwrap();
    assert!(bumped(&dofs));
}

#[test]
fn test_json_round_trip_keeps_flags_and_bounds() {
    let mut dofs = rz_container(BoundsPolicy::Clamp);
    dofs.fix("rc(0,0)").unwrap();
    dofs.set_bounds("zs(1,0)", 0.0, f64::INFINITY).unwrap();

    let json = serde_json::to_string(&dofs).unwrap();
    let restored: DofContainer = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.names(), dofs.names());
    assert_eq!(restored.fixed_mask(), dofs.fixed_mask());
    assert_eq!(restored.full(), dofs.full());
    assert_eq!(restored.policy(), BoundsPolicy::Clamp);
    let bounds = restored.dofs()[2].bounds();
    assert_eq!(bounds.min, 0.0);
    assert_eq!(bounds.max, f64::INFINITY);
}

#[test]
fn test_json_rejects_duplicates() {
    let json = r#"{"dofs":[{"name":"a","value":1.0,"fixed":false,"bounds":{"min":null,"max":null}},
                          {"name":"a","value":2.0,"fixed":false,"bounds":{"min":null,"max":null}}],
                   "policy":"Reject"}"#;
    assert!(serde_json::from_str::<DofContainer>(json).is_err());
}
