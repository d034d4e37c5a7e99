//! Core model data structures.

use std::collections::BTreeSet;

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction as EdgeDirection;
use pv_core::{ElementId, SystemTag};

/// Identifier of a module node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub(crate) NodeIndex);

/// Identifier of a variable node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(pub(crate) NodeIndex);

/// Data flow direction of a variable, seen from its owning module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// The owner writes the variable (an output).
    Feeding,
    /// The owner reads the variable (an input).
    Consuming,
}

/// What a module node stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleKind {
    /// Pure grouping level without own behaviour.
    Group,
    /// A module running its own main loop.
    Application,
    /// A status aggregator, see [`AggregatorInfo`].
    Aggregator(AggregatorInfo),
}

/// Structural metadata an aggregator publishes about itself.
///
/// Other aggregators read this during discovery to decide whether they can
/// treat the aggregator's output as a summary of the whole branch below it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AggregatorInfo {
    /// Tags the aggregator restricts itself to.
    pub tags: BTreeSet<String>,
    /// Absolute path of the aggregated status output.
    pub output_path: String,
    /// Absolute path of the aggregated status message.
    pub message_path: String,
    /// Absolute paths of all status variables the aggregator consumes.
    pub input_paths: Vec<String>,
}

/// A module: a level in the ownership tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleNode {
    pub name: String,
    /// Absolute path, `/` for the root.
    pub path: String,
    pub description: String,
    pub kind: ModuleKind,
}

/// A variable declared by a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableNode {
    /// Element id of the accessor backing this variable.
    pub element: ElementId,
    /// Absolute path; variables sharing a path form one network.
    pub path: String,
    pub direction: Direction,
    /// Rust type name of the value, used to detect mismatching networks.
    pub value_type: String,
    pub n_elements: usize,
    pub unit: String,
    pub description: String,
    pub tags: BTreeSet<String>,
    /// The variable has a return (write-back) channel.
    pub writeback: bool,
    pub owner: ModuleId,
}

impl VariableNode {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn has_system_tag(&self, tag: SystemTag) -> bool {
        self.tags.contains(tag.as_str())
    }

    pub fn name(&self) -> &str {
        pv_core::path::unqualified_name(&self.path)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum ModelNode {
    Module(ModuleNode),
    Variable(VariableNode),
}

/// Edge kinds of the model graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelEdge {
    /// Ownership: module -> sub-module or module -> variable.
    Owns,
    /// Data flow: feeding variable -> consuming variable.
    Feeds,
}

/// One item visited by a model traversal.
#[derive(Debug, Clone, Copy)]
pub enum ModelItem<'a> {
    Module(ModuleId, &'a ModuleNode),
    Variable(VariableId, &'a VariableNode),
}

/// The model: modules, variables and the edges between them.
///
/// The model is built incrementally while modules declare their variables (see
/// `builder`), networks are resolved once by `build_networks`, and afterwards
/// the model is only queried.
#[derive(Debug, Clone)]
pub struct Model {
    pub(crate) graph: StableDiGraph<ModelNode, ModelEdge>,
    pub(crate) root: NodeIndex,
}

impl Model {
    /// Return the root module.
    pub fn root(&self) -> ModuleId {
        ModuleId(self.root)
    }

    /// Get a module by id.
    pub fn module(&self, id: ModuleId) -> Option<&ModuleNode> {
        match self.graph.node_weight(id.0)? {
            ModelNode::Module(m) => Some(m),
            ModelNode::Variable(_) => None,
        }
    }

    /// Get a variable by id.
    pub fn variable(&self, id: VariableId) -> Option<&VariableNode> {
        match self.graph.node_weight(id.0)? {
            ModelNode::Variable(v) => Some(v),
            ModelNode::Module(_) => None,
        }
    }

    /// Owner of a module, `None` for the root.
    pub fn parent(&self, id: ModuleId) -> Option<ModuleId> {
        self.graph
            .edges_directed(id.0, EdgeDirection::Incoming)
            .find(|e| *e.weight() == ModelEdge::Owns)
            .map(|e| ModuleId(e.source()))
    }

    /// Direct sub-modules of a module, in declaration order.
    pub fn submodules(&self, id: ModuleId) -> Vec<ModuleId> {
        self.owned(id.0)
            .into_iter()
            .filter(|n| matches!(self.graph[*n], ModelNode::Module(_)))
            .map(ModuleId)
            .collect()
    }

    /// Variables declared directly by a module, in declaration order.
    pub fn variables_of(&self, id: ModuleId) -> Vec<VariableId> {
        self.owned(id.0)
            .into_iter()
            .filter(|n| matches!(self.graph[*n], ModelNode::Variable(_)))
            .map(VariableId)
            .collect()
    }

    /// All variables of the model, in declaration order.
    pub fn variables(&self) -> impl Iterator<Item = (VariableId, &VariableNode)> {
        self.graph.node_indices().filter_map(|n| match &self.graph[n] {
            ModelNode::Variable(v) => Some((VariableId(n), v)),
            ModelNode::Module(_) => None,
        })
    }

    /// All modules of the model, in declaration order.
    pub fn modules(&self) -> impl Iterator<Item = (ModuleId, &ModuleNode)> {
        self.graph.node_indices().filter_map(|n| match &self.graph[n] {
            ModelNode::Module(m) => Some((ModuleId(n), m)),
            ModelNode::Variable(_) => None,
        })
    }

    /// Find the variable backed by the given accessor.
    pub fn variable_by_element(&self, element: ElementId) -> Option<VariableId> {
        self.variables()
            .find(|(_, v)| v.element == element)
            .map(|(id, _)| id)
    }

    pub(crate) fn owned(&self, n: NodeIndex) -> Vec<NodeIndex> {
        let mut children: Vec<NodeIndex> = self
            .graph
            .edges_directed(n, EdgeDirection::Outgoing)
            .filter(|e| *e.weight() == ModelEdge::Owns)
            .map(|e| e.target())
            .collect();
        // Node indices grow with declaration order in a graph without removals.
        children.sort();
        children
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_equality() {
        assert_eq!(Direction::Feeding, Direction::Feeding);
        assert_ne!(Direction::Feeding, Direction::Consuming);
    }

    #[test]
    fn variable_name_is_last_component() {
        let model = Model::new("app");
        let node = VariableNode {
            element: ElementId::next(),
            path: "/a/b/status".into(),
            direction: Direction::Feeding,
            value_type: "i32".into(),
            n_elements: 1,
            unit: String::new(),
            description: String::new(),
            tags: [SystemTag::StatusOutput.into()].into_iter().collect(),
            writeback: false,
            owner: model.root(),
        };
        assert_eq!(node.name(), "status");
        assert!(node.has_system_tag(SystemTag::StatusOutput));
        assert!(!node.has_tag("user"));
    }
}
