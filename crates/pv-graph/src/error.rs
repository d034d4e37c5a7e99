//! Graph-specific error types.

use pv_core::PvError;

/// Model construction and validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A module with the same absolute path already exists.
    DuplicateModule { path: String },

    /// The same module declares a variable at the same path twice.
    DuplicateVariable { path: String },

    /// A module id does not refer to a module of this model.
    UnknownModule,

    /// A variable id does not refer to a variable of this model.
    UnknownVariable,

    /// A qualified name could not be resolved.
    InvalidPath { path: String },

    /// More than one variable feeds the same network.
    MultipleFeeders { path: String, count: usize },

    /// Variables in one network disagree on the value type.
    TypeMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// Variables in one network disagree on the number of elements.
    LengthMismatch {
        path: String,
        expected: usize,
        actual: usize,
    },

    /// A status output tag was found on a consuming variable.
    StatusTagOnConsumer { path: String },
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphError::DuplicateModule { path } => {
                write!(f, "Module '{}' already exists", path)
            }
            GraphError::DuplicateVariable { path } => {
                write!(f, "Variable '{}' declared twice by the same module", path)
            }
            GraphError::UnknownModule => write!(f, "Module id not part of this model"),
            GraphError::UnknownVariable => write!(f, "Variable id not part of this model"),
            GraphError::InvalidPath { path } => write!(f, "Cannot resolve path '{}'", path),
            GraphError::MultipleFeeders { path, count } => {
                write!(f, "Network '{}' has {} feeders (at most 1 allowed)", path, count)
            }
            GraphError::TypeMismatch {
                path,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Network '{}' mixes value types {} and {}",
                    path, expected, actual
                )
            }
            GraphError::LengthMismatch {
                path,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Network '{}' mixes element counts {} and {}",
                    path, expected, actual
                )
            }
            GraphError::StatusTagOnConsumer { path } => {
                write!(f, "Status output tag found on consuming variable '{}'", path)
            }
        }
    }
}

impl std::error::Error for GraphError {}

impl From<GraphError> for PvError {
    fn from(err: GraphError) -> Self {
        PvError::Graph {
            what: err.to_string(),
        }
    }
}
