//! pv-core: stable foundation for the process-variable workspace.
//!
//! Contains:
//! - ids (element ids and version numbers shared by every accessor)
//! - validity (data validity flag carried with every update)
//! - tags (reserved system tags used for discovery)
//! - path (qualified variable/module path helpers)
//! - error (shared error types)

pub mod error;
pub mod ids;
pub mod path;
pub mod tags;
pub mod validity;

// Re-exports: nice ergonomics for downstream crates
pub use error::{PvError, PvResult};
pub use ids::*;
pub use tags::SystemTag;
pub use validity::DataValidity;
