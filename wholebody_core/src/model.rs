// wholebody_core/src/model.rs

use serde::{Deserialize, Serialize};

use crate::types::{Matrix, Vector};

/// Frame in which the caller supplies the free-flyer twist and acceleration.
///
/// The adapter never differentiates the Euler angles of `ffposition`; the
/// free-flyer velocity block is an independent input and is passed through to
/// the engine untransformed, so the host must produce it in the convention
/// declared here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FreeFlyerConvention {
    /// Twist expressed in the base (body-fixed) frame.
    #[default]
    BodyFixed,
    /// Twist expressed in the world frame.
    World,
}

/// Immutable description of the articulated system after a URDF load.
///
/// Limit and gearing vectors are indexed per actuated joint, in joint order;
/// the free-flyer carries no limits. Replaced atomically, together with a
/// fresh [`Data`], by `DynamicEntity::set_urdf_path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    /// Configuration-space dimension; the free-flyer quaternion counts 4.
    pub nq: usize,
    /// Tangent-space dimension.
    pub nv: usize,
    /// Total mass of the mechanism.
    pub mass: f64,
    /// Vertical offset between the ankle frame and the foot sole.
    pub foot_height: f64,
    pub free_flyer_convention: FreeFlyerConvention,
    pub upper_position_limit: Vector,
    pub lower_position_limit: Vector,
    pub upper_velocity_limit: Vector,
    pub lower_velocity_limit: Vector,
    pub upper_torque_limit: Vector,
    pub lower_torque_limit: Vector,
    pub rotor_inertia: Vector,
    pub gear_ratio: Vector,
}

impl Model {
    /// Number of actuated joints (everything but the free-flyer).
    pub fn actuated_joints(&self) -> usize {
        self.nq - 7
    }
}

/// Mutable workspace the dynamics engine writes into.
///
/// Invariant: the contents are consistent with the `(q, v, a)` of exactly the
/// tick most recently processed by the Newton-Euler driver, which is the only
/// code allowed to mutate it; output callbacks only copy quantities out.
#[derive(Debug, Clone)]
pub struct Data {
    /// Internal configuration of the last pass, `[x y z qx qy qz qw joints..]`.
    pub q: Vector,
    pub v: Vector,
    pub a: Vector,
    /// Inverse-dynamics joint torques, length `nv`.
    pub tau: Vector,
    /// Bias forces, the torques of an RNEA pass with zero acceleration.
    pub drift: Vector,
    /// Center of mass, length 3.
    pub com: Vector,
    /// Center-of-mass Jacobian, 3 x `nv`.
    pub jcom: Matrix,
    /// Joint-space inertia matrix, `nv` x `nv`; the upper triangle is
    /// authoritative.
    pub m: Matrix,
    /// Centroidal momenta, linear then angular, length 6.
    pub momenta: Vector,
    /// Spatial wrench on the free-flyer root, force then torque, expressed at
    /// the world origin. Source of the ZMP.
    pub root_wrench: Vector,
}

impl Data {
    /// A zeroed workspace sized for `model`.
    pub fn new(model: &Model) -> Self {
        Self {
            q: Vector::zeros(model.nq),
            v: Vector::zeros(model.nv),
            a: Vector::zeros(model.nv),
            tau: Vector::zeros(model.nv),
            drift: Vector::zeros(model.nv),
            com: Vector::zeros(3),
            jcom: Matrix::zeros(3, model.nv),
            m: Matrix::zeros(model.nv, model.nv),
            momenta: Vector::zeros(6),
            root_wrench: Vector::zeros(6),
        }
    }
}
