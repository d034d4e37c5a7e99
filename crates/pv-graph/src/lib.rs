//! pv-graph: ownership and network model for process variables.
//!
//! Provides:
//! - The model graph: modules own variables and sub-modules, variables sharing
//!   an absolute path form a network with one feeder and any number of consumers
//! - Incremental construction API used while modules are being declared
//! - Read-only breadth-first queries used for discovery (tagged variables,
//!   aggregator outputs, feeders of a path)
//! - Network building and structural validation
//!
//! # Example
//!
//! ```
//! use pv_graph::{Direction, Model, ModuleKind, VariableSpec};
//!
//! let mut model = Model::new("app");
//! let root = model.root();
//! let sensor = model.add_module(root, "Sensor", ModuleKind::Application).unwrap();
//! let consumer = model.add_module(root, "Consumer", ModuleKind::Application).unwrap();
//! model
//!     .add_variable(sensor, VariableSpec::new("/temperature", Direction::Feeding, "f64"))
//!     .unwrap();
//! model
//!     .add_variable(consumer, VariableSpec::new("/temperature", Direction::Consuming, "f64"))
//!     .unwrap();
//!
//! let networks = model.build_networks().unwrap();
//! assert_eq!(networks.len(), 1);
//! assert_eq!(networks[0].consumers.len(), 1);
//! ```

pub mod builder;
pub mod dump;
pub mod error;
pub mod graph;
pub mod network;
pub mod query;
pub(crate) mod validate;

// Re-exports for ergonomics
pub use builder::VariableSpec;
pub use error::GraphError;
pub use graph::{
    AggregatorInfo, Direction, Model, ModelEdge, ModelItem, ModuleId, ModuleKind, ModuleNode,
    VariableId, VariableNode,
};
pub use network::Network;
