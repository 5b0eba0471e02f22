// wholebody_core/src/error.rs

use thiserror::Error;

/// Errors surfaced at the `read` site of a signal. Every variant carries the
/// fully qualified name of the offending signal so the host can tell which
/// port of which entity failed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SignalError {
    #[error("signal '{0}' is not plugged to a producer")]
    Unplugged(String),

    #[error("signal '{signal}' has length {actual}, expected {expected}")]
    Shape {
        signal: String,
        expected: usize,
        actual: usize,
    },

    #[error("signal '{0}' read before a model was loaded")]
    InvalidModel(String),

    #[error("could not build a model from '{path}': {reason}")]
    Parse { path: String, reason: String },

    #[error("dependency cycle detected while evaluating signal '{0}'")]
    Cycle(String),
}
