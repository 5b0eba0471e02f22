// wholebody_core/src/engine.rs

use std::path::Path;

use crate::error::SignalError;
use crate::model::{Data, Model};
use crate::types::Vector;

// --- External collaborator seams ---
// The URDF parser and the rigid-body-dynamics engine are libraries, not part
// of this crate; they are injected at entity construction. A mock implements
// these traits in tests (see `crate::testing`).

/// Rigid-body-dynamics engine.
///
/// Every call takes configuration vectors in the internal layout of the
/// engine: `[x, y, z, qx, qy, qz, qw, joints...]` for positions (length
/// `nq`), `[free-flyer twist(6), joint rates...]` for velocities and
/// accelerations (length `nv`). Implementations populate [`Data`] in place
/// and must not retain references to it.
pub trait DynamicsEngine {
    /// One recursive Newton-Euler pass. Fills `tau`, `com`, `jcom` and
    /// `root_wrench`.
    fn inverse_dynamics(
        &self,
        model: &Model,
        data: &mut Data,
        q: &Vector,
        v: &Vector,
        a: &Vector,
    ) -> Result<(), SignalError>;

    /// Composite-rigid-body pass. Fills the upper triangle of `m`.
    fn crba(&self, model: &Model, data: &mut Data, q: &Vector) -> Result<(), SignalError>;

    /// Centroidal momentum pass. Fills `momenta`, linear then angular.
    fn centroidal_momentum(
        &self,
        model: &Model,
        data: &mut Data,
        q: &Vector,
        v: &Vector,
    ) -> Result<(), SignalError>;

    /// Inverse dynamics with zero acceleration. Fills `drift`. Kept separate
    /// from [`DynamicsEngine::inverse_dynamics`] so the full pass runs
    /// exactly once per tick.
    fn bias_forces(
        &self,
        model: &Model,
        data: &mut Data,
        q: &Vector,
        v: &Vector,
    ) -> Result<(), SignalError>;
}

/// URDF parser. Builds the immutable model description from a file on disk.
pub trait ModelLoader {
    /// Fails with [`SignalError::Parse`] on a malformed or missing file.
    fn build_model(&self, path: &Path) -> Result<Model, SignalError>;
}
