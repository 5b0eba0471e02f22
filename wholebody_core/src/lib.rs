// wholebody_core/src/lib.rs

//! Reactive rigid-body-dynamics node for a whole-body motion-control stack.
//!
//! The crate models one graph entity: upstream nodes push the free-flyer and
//! joint configuration at every control tick, and the entity publishes derived
//! quantities (center of mass, momenta, whole-body inertia, ZMP, torque drift)
//! through lazily evaluated, tick-stamped signals. One Newton-Euler pass per
//! tick is shared by every dynamic output.
//!
//! The URDF parser and the rigid-body-dynamics engine are external
//! collaborators behind the [`engine::ModelLoader`] and
//! [`engine::DynamicsEngine`] traits; the host graph runtime that drives ticks
//! is out of scope. Evaluation is single-threaded within a tick: a host that
//! reads from several threads must serialize access to an entity.

pub mod configuration;
pub mod engine;
pub mod entity;
pub mod error;
pub mod model;
pub mod prelude;
pub mod signal;
pub mod testing;
pub mod types;
