// wholebody_core/src/testing.rs

//! Deterministic doubles for the external collaborator seams, used by the
//! test suites and the runnable example. The engine writes closed-form,
//! model-dependent quantities so expected values can be recomputed in
//! assertions, and counts its inverse-dynamics passes.

use std::cell::Cell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::engine::{DynamicsEngine, ModelLoader};
use crate::error::SignalError;
use crate::model::{Data, FreeFlyerConvention, Model};
use crate::types::{Matrix, Vector};

const GRAVITY: f64 = 9.81;

/// A free-flyer plus one actuated revolute joint: nq = 8, nv = 7.
pub fn single_joint_model(name: &str, mass: f64) -> Model {
    Model {
        name: name.to_owned(),
        nq: 8,
        nv: 7,
        mass,
        foot_height: 0.105,
        free_flyer_convention: FreeFlyerConvention::BodyFixed,
        upper_position_limit: Vector::from_element(1, 1.57),
        lower_position_limit: Vector::from_element(1, -1.57),
        upper_velocity_limit: Vector::from_element(1, 5.0),
        lower_velocity_limit: Vector::from_element(1, -5.0),
        upper_torque_limit: Vector::from_element(1, 80.0),
        lower_torque_limit: Vector::from_element(1, -80.0),
        rotor_inertia: Vector::from_element(1, 1.0e-4),
        gear_ratio: Vector::from_element(1, 100.0),
    }
}

/// Path-keyed model store standing in for the URDF parser. Unknown paths
/// fail with [`SignalError::Parse`], like a missing file would.
#[derive(Default)]
pub struct FixtureLoader {
    models: HashMap<PathBuf, Model>,
}

impl FixtureLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, path: impl Into<PathBuf>, model: Model) -> Self {
        self.models.insert(path.into(), model);
        self
    }
}

impl ModelLoader for FixtureLoader {
    fn build_model(&self, path: &Path) -> Result<Model, SignalError> {
        self.models
            .get(path)
            .cloned()
            .ok_or_else(|| SignalError::Parse {
                path: path.display().to_string(),
                reason: "no such fixture".to_owned(),
            })
    }
}

/// Instrumented engine double.
///
/// Quantities are synthetic but deterministic and depend on the model's
/// mass, so swapping models observably changes the outputs:
///
/// * `com = (q.x, q.y, q.z + 0.01 * mass)`
/// * `tau[i] = a[i] + v[i] + 0.1 * i`
/// * `jcom[r][c] = mass` on the diagonal, zero elsewhere
/// * `root_wrench = (0, 0, mass * g, 0.1 * mass, -0.05 * mass, 0)`
/// * `m[r][c] = mass / (1 + r + c)`, plus 1 on the diagonal (upper triangle
///   only, the lower is left zeroed)
/// * `momenta[i] = mass * v[i]`
/// * `drift[i] = 0.1 * mass + v[i]`
pub struct FixtureEngine {
    rnea_calls: Rc<Cell<usize>>,
}

impl FixtureEngine {
    pub fn new() -> Self {
        Self {
            rnea_calls: Rc::new(Cell::new(0)),
        }
    }

    /// Shared counter of inverse-dynamics invocations; clone it before
    /// boxing the engine.
    pub fn calls(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.rnea_calls)
    }
}

impl Default for FixtureEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicsEngine for FixtureEngine {
    fn inverse_dynamics(
        &self,
        model: &Model,
        data: &mut Data,
        q: &Vector,
        v: &Vector,
        a: &Vector,
    ) -> Result<(), SignalError> {
        self.rnea_calls.set(self.rnea_calls.get() + 1);

        data.tau = Vector::from_fn(model.nv, |i, _| a[i] + v[i] + 0.1 * i as f64);
        data.com = Vector::from_vec(vec![q[0], q[1], q[2] + 0.01 * model.mass]);
        data.jcom = Matrix::from_fn(3, model.nv, |r, c| if r == c { model.mass } else { 0.0 });
        data.root_wrench = Vector::from_vec(vec![
            0.0,
            0.0,
            model.mass * GRAVITY,
            0.1 * model.mass,
            -0.05 * model.mass,
            0.0,
        ]);
        Ok(())
    }

    fn crba(&self, model: &Model, data: &mut Data, _q: &Vector) -> Result<(), SignalError> {
        let nv = model.nv;
        data.m = Matrix::zeros(nv, nv);
        for r in 0..nv {
            for c in r..nv {
                data.m[(r, c)] = model.mass / (1.0 + (r + c) as f64);
                if r == c {
                    data.m[(r, c)] += 1.0;
                }
            }
        }
        Ok(())
    }

    fn centroidal_momentum(
        &self,
        model: &Model,
        data: &mut Data,
        _q: &Vector,
        v: &Vector,
    ) -> Result<(), SignalError> {
        data.momenta = Vector::from_fn(6, |i, _| model.mass * v[i]);
        Ok(())
    }

    fn bias_forces(
        &self,
        model: &Model,
        data: &mut Data,
        _q: &Vector,
        v: &Vector,
    ) -> Result<(), SignalError> {
        data.drift = Vector::from_fn(model.nv, |i, _| 0.1 * model.mass + v[i]);
        Ok(())
    }
}
