// wholebody_core/src/configuration.rs

use std::cell::RefCell;
use std::rc::Rc;

use nalgebra::UnitQuaternion;

use crate::entity::RobotState;
use crate::error::SignalError;
use crate::signal::Signal;
use crate::types::{Tick, Vector};

/// Translates the external configuration representation (free-flyer as
/// `x, y, z, roll, pitch, yaw` plus a joint vector) into the internal layout
/// the dynamics engine consumes (`x, y, z` plus unit quaternion plus joints).
///
/// Velocity and acceleration are concatenated without any frame conversion:
/// the free-flyer twist is an independent input, expected in the convention
/// declared by `Model::free_flyer_convention`, never derived from Euler-angle
/// rates.
#[derive(Clone)]
pub(crate) struct ConfigurationAdapter {
    state: Rc<RefCell<RobotState>>,
    joint_position: Signal<Vector>,
    free_flyer_position: Signal<Vector>,
    joint_velocity: Signal<Vector>,
    free_flyer_velocity: Signal<Vector>,
    joint_acceleration: Signal<Vector>,
    free_flyer_acceleration: Signal<Vector>,
}

fn check_length(signal: &str, vector: &Vector, expected: usize) -> Result<(), SignalError> {
    if vector.len() != expected {
        return Err(SignalError::Shape {
            signal: signal.to_owned(),
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

impl ConfigurationAdapter {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        state: Rc<RefCell<RobotState>>,
        joint_position: Signal<Vector>,
        free_flyer_position: Signal<Vector>,
        joint_velocity: Signal<Vector>,
        free_flyer_velocity: Signal<Vector>,
        joint_acceleration: Signal<Vector>,
        free_flyer_acceleration: Signal<Vector>,
    ) -> Self {
        Self {
            state,
            joint_position,
            free_flyer_position,
            joint_velocity,
            free_flyer_velocity,
            joint_acceleration,
            free_flyer_acceleration,
        }
    }

    /// Dimensions of the currently loaded model. The requesting input signal
    /// names the failure when no model is loaded yet.
    fn dimensions(&self, requester: &str) -> Result<(usize, usize), SignalError> {
        let guard = self.state.borrow();
        let model = guard.model_or(requester)?;
        Ok((model.nq, model.nv))
    }

    /// Internal position `[x, y, z, qx, qy, qz, qw, joints...]` for `tick`.
    pub(crate) fn internal_position(&self, tick: Tick) -> Result<Vector, SignalError> {
        let ff = self.free_flyer_position.read(tick)?;
        let joints = self.joint_position.read(tick)?;
        let (nq, _) = self.dimensions(self.joint_position.name())?;

        check_length(self.free_flyer_position.name(), &ff, 6)?;
        check_length(self.joint_position.name(), &joints, nq - 7)?;

        // Roll-pitch-yaw to a normalized quaternion. Sign is whatever the
        // construction yields; q and -q are equivalent downstream.
        let rotation = UnitQuaternion::from_euler_angles(ff[3], ff[4], ff[5]);
        let coords = rotation.coords;

        let mut q = Vector::zeros(nq);
        q[0] = ff[0];
        q[1] = ff[1];
        q[2] = ff[2];
        q[3] = coords[0];
        q[4] = coords[1];
        q[5] = coords[2];
        q[6] = coords[3];
        q.rows_mut(7, nq - 7).copy_from(&joints);
        Ok(q)
    }

    /// Internal velocity `[free-flyer twist(6), joint rates...]` for `tick`.
    pub(crate) fn internal_velocity(&self, tick: Tick) -> Result<Vector, SignalError> {
        self.concatenate_tangent(
            tick,
            &self.free_flyer_velocity,
            &self.joint_velocity,
        )
    }

    /// Internal acceleration, same layout as the velocity.
    pub(crate) fn internal_acceleration(&self, tick: Tick) -> Result<Vector, SignalError> {
        self.concatenate_tangent(
            tick,
            &self.free_flyer_acceleration,
            &self.joint_acceleration,
        )
    }

    fn concatenate_tangent(
        &self,
        tick: Tick,
        free_flyer: &Signal<Vector>,
        joints: &Signal<Vector>,
    ) -> Result<Vector, SignalError> {
        let ff = free_flyer.read(tick)?;
        let joint_part = joints.read(tick)?;
        let (_, nv) = self.dimensions(joints.name())?;

        check_length(free_flyer.name(), &ff, 6)?;
        check_length(joints.name(), &joint_part, nv - 6)?;

        let mut out = Vector::zeros(nv);
        out.rows_mut(0, 6).copy_from(&ff);
        out.rows_mut(6, nv - 6).copy_from(&joint_part);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::RobotState;
    use crate::signal::GenerationCounter;
    use crate::testing::{single_joint_model, FixtureEngine, FixtureLoader};
    use approx::assert_relative_eq;

    fn adapter_with_model() -> ConfigurationAdapter {
        let state = Rc::new(RefCell::new(RobotState::new(
            Box::new(FixtureEngine::new()),
            Box::new(FixtureLoader::new()),
        )));
        let model = single_joint_model("test", 1.0);
        state.borrow_mut().data = Some(crate::model::Data::new(&model));
        state.borrow_mut().model = Some(model);

        let generation = GenerationCounter::new();
        let signal = |port: &str| Signal::<Vector>::input(port, &generation);
        ConfigurationAdapter::new(
            state,
            signal("position"),
            signal("ffposition"),
            signal("velocity"),
            signal("ffvelocity"),
            signal("acceleration"),
            signal("ffacceleration"),
        )
    }

    #[test]
    fn position_embeds_a_unit_quaternion() {
        let adapter = adapter_with_model();
        let (roll, pitch, yaw) = (0.3, -0.2, 1.1);
        adapter
            .free_flyer_position
            .plug_value(Vector::from_vec(vec![1.0, 2.0, 3.0, roll, pitch, yaw]));
        adapter.joint_position.plug_value(Vector::from_element(1, 0.7));

        let q = adapter.internal_position(1).unwrap();
        assert_eq!(q.len(), 8);
        assert_eq!((q[0], q[1], q[2]), (1.0, 2.0, 3.0));
        assert_eq!(q[7], 0.7);

        let norm = q[3] * q[3] + q[4] * q[4] + q[5] * q[5] + q[6] * q[6];
        assert_relative_eq!(norm, 1.0, epsilon = 1e-12);

        // Equal to the RPY quaternion up to sign.
        let expected = UnitQuaternion::from_euler_angles(roll, pitch, yaw).coords;
        let sign = if (q[6] - expected[3]).abs() < 1e-9 { 1.0 } else { -1.0 };
        for i in 0..4 {
            assert_relative_eq!(q[3 + i], sign * expected[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn wrong_joint_length_is_a_shape_error() {
        let adapter = adapter_with_model();
        adapter
            .free_flyer_position
            .plug_value(Vector::zeros(6));
        adapter.joint_position.plug_value(Vector::zeros(3));

        match adapter.internal_position(1) {
            Err(SignalError::Shape { expected, actual, .. }) => {
                assert_eq!(expected, 1);
                assert_eq!(actual, 3);
            }
            other => panic!("expected a shape error, got {other:?}"),
        }
    }

    #[test]
    fn wrong_free_flyer_length_is_a_shape_error() {
        let adapter = adapter_with_model();
        adapter.free_flyer_position.plug_value(Vector::zeros(5));
        adapter.joint_position.plug_value(Vector::zeros(1));
        assert!(matches!(
            adapter.internal_position(1),
            Err(SignalError::Shape { expected: 6, actual: 5, .. })
        ));
    }

    #[test]
    fn velocity_is_concatenated_without_conversion() {
        let adapter = adapter_with_model();
        adapter
            .free_flyer_velocity
            .plug_value(Vector::from_vec(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]));
        adapter.joint_velocity.plug_value(Vector::from_element(1, 9.0));

        let v = adapter.internal_velocity(1).unwrap();
        assert_eq!(v.len(), 7);
        assert_relative_eq!(v[0], 0.1);
        assert_relative_eq!(v[5], 0.6);
        assert_relative_eq!(v[6], 9.0);
    }

    #[test]
    fn no_model_is_an_invalid_model_error() {
        let state = Rc::new(RefCell::new(RobotState::new(
            Box::new(FixtureEngine::new()),
            Box::new(FixtureLoader::new()),
        )));
        let generation = GenerationCounter::new();
        let signal = |port: &str| Signal::<Vector>::input(port, &generation);
        let adapter = ConfigurationAdapter::new(
            state,
            signal("position"),
            signal("ffposition"),
            signal("velocity"),
            signal("ffvelocity"),
            signal("acceleration"),
            signal("ffacceleration"),
        );
        adapter.free_flyer_position.plug_value(Vector::zeros(6));
        adapter.joint_position.plug_value(Vector::zeros(1));

        assert!(matches!(
            adapter.internal_position(1),
            Err(SignalError::InvalidModel(_))
        ));
    }
}
