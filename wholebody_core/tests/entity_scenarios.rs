// wholebody_core/tests/entity_scenarios.rs

//! End-to-end scenarios driving a `DynamicEntity` through the instrumented
//! fixture engine: one Newton-Euler pass per tick, cache and generation
//! invalidation, shape and wiring failures.

use std::cell::Cell;
use std::rc::Rc;

use approx::assert_relative_eq;
use wholebody_core::prelude::*;

const GRAVITY: f64 = 9.81;

struct Node {
    entity: DynamicEntity,
    rnea_calls: Rc<Cell<usize>>,
}

fn node_with(models: &[(&str, f64)]) -> Node {
    let engine = FixtureEngine::new();
    let rnea_calls = engine.calls();
    let mut loader = FixtureLoader::new();
    for (path, mass) in models {
        loader = loader.with_model(*path, single_joint_model(path, *mass));
    }
    Node {
        entity: DynamicEntity::new("robot", Box::new(engine), Box::new(loader)),
        rnea_calls,
    }
}

/// Zero free-flyer pose and zero motion for the single-joint model.
fn plug_zero_motion(entity: &DynamicEntity) {
    entity.free_flyer_position.plug_value(Vector::zeros(6));
    entity.joint_position.plug_value(Vector::zeros(1));
    entity.free_flyer_velocity.plug_value(Vector::zeros(6));
    entity.joint_velocity.plug_value(Vector::zeros(1));
    entity.free_flyer_acceleration.plug_value(Vector::zeros(6));
    entity.joint_acceleration.plug_value(Vector::zeros(1));
}

#[test]
fn s1_one_newton_euler_pass_serves_every_dynamic_output() {
    let node = node_with(&[("one.urdf", 10.0)]);
    node.entity.set_urdf_path("one.urdf").unwrap();
    plug_zero_motion(&node.entity);

    let com = node.entity.com.read(1).unwrap();
    assert_relative_eq!(com[0], 0.0);
    assert_relative_eq!(com[1], 0.0);
    assert_relative_eq!(com[2], 0.1, epsilon = 1e-12);

    // Reading the rest of the dynamic outputs at the same tick reuses the
    // pass that `com` triggered.
    let zmp = node.entity.zmp.read(1).unwrap();
    node.entity.jcom.read(1).unwrap();
    node.entity.momenta.read(1).unwrap();
    node.entity.angular_momentum.read(1).unwrap();
    node.entity.dynamic_drift.read(1).unwrap();
    assert_relative_eq!(node.entity.foot_height.read(1).unwrap(), 0.105);
    assert_eq!(node.rnea_calls.get(), 1);

    // Root wrench (0, 0, m*g, 0.1m, -0.05m, 0) projected on the ground.
    assert_relative_eq!(zmp[0], 0.05 / GRAVITY, epsilon = 1e-12);
    assert_relative_eq!(zmp[1], 0.1 / GRAVITY, epsilon = 1e-12);
    assert_relative_eq!(zmp[2], 0.0);
}

#[test]
fn s2_real_inertia_is_inertia_plus_gearing_correction() {
    let node = node_with(&[("one.urdf", 10.0)]);
    node.entity.set_urdf_path("one.urdf").unwrap();
    plug_zero_motion(&node.entity);
    node.entity.joint_position.plug_value(Vector::from_element(1, 0.5));

    let inertia = node.entity.inertia.read(2).unwrap();
    let real = node.entity.inertia_real.read(2).unwrap();

    // gearRatio^2 * rotorInertia = 100^2 * 1e-4 = 1.0 on the one actuated
    // diagonal entry, zero everywhere else.
    let diff = &real - &inertia;
    for r in 0..7 {
        for c in 0..7 {
            let expected = if r == 6 && c == 6 { 1.0 } else { 0.0 };
            assert_relative_eq!(diff[(r, c)], expected, epsilon = 1e-12);
        }
    }

    // The symmetrization filled the lower triangle.
    assert_relative_eq!(inertia[(3, 1)], inertia[(1, 3)]);
}

#[test]
fn s3_reads_before_a_model_loads_fail_with_invalid_model() {
    let node = node_with(&[]);
    plug_zero_motion(&node.entity);

    assert!(matches!(
        node.entity.com.read(1),
        Err(SignalError::InvalidModel(_))
    ));
    assert!(matches!(
        node.entity.upper_joint_limits.read(1),
        Err(SignalError::InvalidModel(_))
    ));
    assert_eq!(node.rnea_calls.get(), 0);
}

#[test]
fn s4_wrong_joint_vector_length_is_a_shape_error() {
    let node = node_with(&[("one.urdf", 10.0)]);
    node.entity.set_urdf_path("one.urdf").unwrap();
    plug_zero_motion(&node.entity);
    node.entity.joint_position.plug_value(Vector::zeros(3));

    match node.entity.com.read(1) {
        Err(SignalError::Shape {
            signal,
            expected,
            actual,
        }) => {
            assert!(signal.contains("position"));
            assert_eq!(expected, 1);
            assert_eq!(actual, 3);
        }
        other => panic!("expected a shape error, got {other:?}"),
    }
    // The engine never ran, so the workspace is untouched.
    assert_eq!(node.rnea_calls.get(), 0);
}

#[test]
fn s5_replacing_the_model_invalidates_previously_cached_ticks() {
    let node = node_with(&[("a.urdf", 1.0), ("b.urdf", 2.0)]);
    node.entity.set_urdf_path("a.urdf").unwrap();
    plug_zero_motion(&node.entity);

    let com_a = node.entity.com.read(10).unwrap();
    assert_relative_eq!(com_a[2], 0.01, epsilon = 1e-12);

    node.entity.set_urdf_path("b.urdf").unwrap();
    let com_b = node.entity.com.read(10).unwrap();
    assert_relative_eq!(com_b[2], 0.02, epsilon = 1e-12);
    assert_eq!(node.rnea_calls.get(), 2);
}

#[test]
fn s6_unplugged_input_is_named_at_the_read_site() {
    let node = node_with(&[("one.urdf", 10.0)]);
    node.entity.set_urdf_path("one.urdf").unwrap();
    node.entity.free_flyer_position.plug_value(Vector::zeros(6));
    node.entity.joint_position.plug_value(Vector::zeros(1));
    node.entity.joint_velocity.plug_value(Vector::zeros(1));
    node.entity.free_flyer_acceleration.plug_value(Vector::zeros(6));
    node.entity.joint_acceleration.plug_value(Vector::zeros(1));

    match node.entity.momenta.read(1) {
        Err(SignalError::Unplugged(signal)) => {
            assert_eq!(signal, "sotDynamic(robot)::input(vector)::ffvelocity");
        }
        other => panic!("expected an unplugged error, got {other:?}"),
    }
}

#[test]
fn tick_cache_reuses_values_and_recomputes_on_new_ticks() {
    let node = node_with(&[("one.urdf", 10.0)]);
    node.entity.set_urdf_path("one.urdf").unwrap();
    plug_zero_motion(&node.entity);

    let first = node.entity.com.read(1).unwrap();
    let second = node.entity.com.read(1).unwrap();
    assert_eq!(first, second);
    assert_eq!(node.rnea_calls.get(), 1);

    node.entity.com.read(2).unwrap();
    assert_eq!(node.rnea_calls.get(), 2);
}

#[test]
fn reloading_the_same_path_still_recomputes_cached_ticks() {
    let node = node_with(&[("one.urdf", 10.0)]);
    node.entity.set_urdf_path("one.urdf").unwrap();
    plug_zero_motion(&node.entity);

    node.entity.com.read(5).unwrap();
    node.entity.set_urdf_path("one.urdf").unwrap();
    node.entity.com.read(5).unwrap();
    assert_eq!(node.rnea_calls.get(), 2);
}

#[test]
fn static_outputs_never_touch_the_newton_euler_driver() {
    let node = node_with(&[("one.urdf", 10.0)]);
    node.entity.set_urdf_path("one.urdf").unwrap();
    // Inputs stay unplugged on purpose: static outputs must not need them.

    let statics: [&Signal<Vector>; 8] = [
        &node.entity.upper_joint_limits,
        &node.entity.lower_joint_limits,
        &node.entity.upper_velocity_limits,
        &node.entity.lower_velocity_limits,
        &node.entity.upper_torque_limits,
        &node.entity.lower_torque_limits,
        &node.entity.inertia_rotor,
        &node.entity.gear_ratio,
    ];
    for signal in statics {
        let at_zero = signal.read(0).unwrap();
        let at_fifty = signal.read(50).unwrap();
        assert_eq!(at_zero, at_fifty);
    }
    assert_eq!(node.rnea_calls.get(), 0);
}

#[test]
fn out_of_graph_inverse_dynamics_does_not_leak_into_cached_outputs() {
    let node = node_with(&[("one.urdf", 10.0)]);
    node.entity.set_urdf_path("one.urdf").unwrap();
    plug_zero_motion(&node.entity);

    node.entity.momenta.read(1).unwrap();

    let mut q = Vector::zeros(8);
    q[0] = 5.0;
    node.entity
        .check_inverse_dynamics(&q, &Vector::zeros(7), &Vector::zeros(7))
        .unwrap();

    // The check wrote into the shared workspace, so the cached tick must be
    // recomputed from the plugged inputs rather than served as-is.
    let com = node.entity.com.read(1).unwrap();
    assert_relative_eq!(com[0], 0.0);
    assert_eq!(node.rnea_calls.get(), 3);
}

#[test]
fn momenta_scale_the_free_flyer_twist() {
    let node = node_with(&[("one.urdf", 10.0)]);
    node.entity.set_urdf_path("one.urdf").unwrap();
    plug_zero_motion(&node.entity);
    node.entity
        .free_flyer_velocity
        .plug_value(Vector::from_vec(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]));

    let momenta = node.entity.momenta.read(3).unwrap();
    let angular = node.entity.angular_momentum.read(3).unwrap();
    assert_eq!(momenta.len(), 6);
    assert_eq!(angular.len(), 3);
    for i in 0..3 {
        assert_relative_eq!(momenta[3 + i], angular[i]);
        assert_relative_eq!(angular[i], 10.0 * (0.4 + 0.1 * i as f64), epsilon = 1e-12);
    }
    assert_eq!(node.rnea_calls.get(), 1);
}
