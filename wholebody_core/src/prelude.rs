// wholebody_core/src/prelude.rs

// --- Core Abstractions (The main contracts of the library) ---
pub use crate::engine::{DynamicsEngine, ModelLoader};
pub use crate::error::SignalError;
pub use crate::signal::{GenerationCounter, Signal, SignalBase, SignalHandle};

// --- Core Data Structures (The "nouns" of the library) ---
pub use crate::entity::DynamicEntity;
pub use crate::model::{Data, FreeFlyerConvention, Model};
pub use crate::types::{Generation, Matrix, Tick, Vector};

// --- Test doubles (Export for host-side checks and demos) ---
pub use crate::testing::{single_joint_model, FixtureEngine, FixtureLoader};
