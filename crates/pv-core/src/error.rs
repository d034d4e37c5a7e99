use thiserror::Error;

pub type PvResult<T> = Result<T, PvError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PvError {
    /// A documented precondition was violated by the caller.
    #[error("Logic error: {what}")]
    Logic { what: String },

    #[error("Type mismatch for '{path}': expected {expected}, found {actual}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Graph error: {what}")]
    Graph { what: String },

    /// The owning application is shutting down; blocking reads return this.
    #[error("Application shut down")]
    Shutdown,
}

impl PvError {
    pub fn logic(what: impl Into<String>) -> Self {
        PvError::Logic { what: what.into() }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        PvError::NotFound { what: what.into() }
    }
}
