//! Network resolution.
//!
//! All variables sharing an absolute path form one network. A network has at
//! most one feeder; networks without a feeder keep their consumers at the
//! initial value forever.

use std::collections::BTreeMap;

use petgraph::visit::{EdgeRef, IntoEdgeReferences};

use crate::error::GraphError;
use crate::graph::{Direction, Model, ModelEdge, VariableId};
use crate::validate;

/// One resolved network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub path: String,
    pub feeder: Option<VariableId>,
    pub consumers: Vec<VariableId>,
}

impl Model {
    /// Group variables into networks, validate them and record feed edges.
    ///
    /// Can be called again after the model changed; previous feed edges are
    /// replaced.
    pub fn build_networks(&mut self) -> Result<Vec<Network>, GraphError> {
        validate::validate_tags(self)?;

        let mut by_path: BTreeMap<String, Vec<VariableId>> = BTreeMap::new();
        for (id, v) in self.variables() {
            by_path.entry(v.path.clone()).or_default().push(id);
        }

        let mut networks = Vec::with_capacity(by_path.len());
        for (path, members) in by_path {
            validate::validate_network(self, &path, &members)?;

            let mut feeder = None;
            let mut consumers = Vec::new();
            for id in members {
                match self.variable(id).map(|v| v.direction) {
                    Some(Direction::Feeding) => feeder = Some(id),
                    Some(Direction::Consuming) => consumers.push(id),
                    None => return Err(GraphError::UnknownVariable),
                }
            }
            networks.push(Network {
                path,
                feeder,
                consumers,
            });
        }

        let stale: Vec<_> = self
            .graph
            .edge_references()
            .filter(|e| *e.weight() == ModelEdge::Feeds)
            .map(|e| e.id())
            .collect();
        for edge in stale {
            self.graph.remove_edge(edge);
        }
        for network in &networks {
            if let Some(feeder) = network.feeder {
                for consumer in &network.consumers {
                    self.graph.add_edge(feeder.0, consumer.0, ModelEdge::Feeds);
                }
            }
        }

        tracing::debug!(count = networks.len(), "resolved variable networks");
        Ok(networks)
    }

    /// Consumers currently fed by `feeder` (after `build_networks`).
    pub fn fed_by(&self, feeder: VariableId) -> Vec<VariableId> {
        let mut targets: Vec<VariableId> = self
            .graph
            .edges_directed(feeder.0, petgraph::Direction::Outgoing)
            .filter(|e| *e.weight() == ModelEdge::Feeds)
            .map(|e| VariableId(e.target()))
            .collect();
        targets.sort();
        targets
    }
}
