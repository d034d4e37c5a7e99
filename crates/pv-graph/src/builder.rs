//! Incremental model construction.
//!
//! Modules are added top-down, each declaring its variables. Variable names may
//! be qualified: relative names are resolved against the owning module's path,
//! absolute names are taken as they are.

use std::collections::BTreeSet;

use pv_core::{path, ElementId, SystemTag};

use crate::error::GraphError;
use crate::graph::{
    AggregatorInfo, Direction, Model, ModelEdge, ModelNode, ModuleId, ModuleKind, ModuleNode,
    VariableId, VariableNode,
};

/// Declaration of a variable, passed to [`Model::add_variable`].
#[derive(Debug, Clone)]
pub struct VariableSpec {
    pub name: String,
    pub direction: Direction,
    pub value_type: String,
    pub n_elements: usize,
    pub unit: String,
    pub description: String,
    pub tags: BTreeSet<String>,
    pub writeback: bool,
    pub element: ElementId,
}

impl VariableSpec {
    /// Scalar variable with a freshly allocated element id.
    pub fn new(name: impl Into<String>, direction: Direction, value_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction,
            value_type: value_type.into(),
            n_elements: 1,
            unit: String::new(),
            description: String::new(),
            tags: BTreeSet::new(),
            writeback: false,
            element: ElementId::next(),
        }
    }

    pub fn with_element(mut self, element: ElementId) -> Self {
        self.element = element;
        self
    }

    pub fn with_elements(mut self, n_elements: usize) -> Self {
        self.n_elements = n_elements;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_system_tag(mut self, tag: SystemTag) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_writeback(mut self, writeback: bool) -> Self {
        self.writeback = writeback;
        self
    }
}

impl Model {
    /// Create a model containing only the root module.
    pub fn new(name: impl Into<String>) -> Self {
        let mut graph = petgraph::stable_graph::StableDiGraph::new();
        let root = graph.add_node(ModelNode::Module(ModuleNode {
            name: name.into(),
            path: "/".to_string(),
            description: String::new(),
            kind: ModuleKind::Group,
        }));
        Self { graph, root }
    }

    /// Add a module below `parent` and return its id.
    pub fn add_module(
        &mut self,
        parent: ModuleId,
        name: impl Into<String>,
        kind: ModuleKind,
    ) -> Result<ModuleId, GraphError> {
        self.add_module_with_description(parent, name, "", kind)
    }

    /// Add a module below `parent`, with a description.
    pub fn add_module_with_description(
        &mut self,
        parent: ModuleId,
        name: impl Into<String>,
        description: impl Into<String>,
        kind: ModuleKind,
    ) -> Result<ModuleId, GraphError> {
        let name = name.into();
        let parent_path = self.module(parent).ok_or(GraphError::UnknownModule)?.path.clone();
        if name.is_empty() || name.contains('/') {
            return Err(GraphError::InvalidPath { path: name });
        }
        let module_path = path::join(&parent_path, &name);
        if self.modules().any(|(_, m)| m.path == module_path) {
            return Err(GraphError::DuplicateModule { path: module_path });
        }

        let idx = self.graph.add_node(ModelNode::Module(ModuleNode {
            name,
            path: module_path,
            description: description.into(),
            kind,
        }));
        self.graph.add_edge(parent.0, idx, ModelEdge::Owns);
        Ok(ModuleId(idx))
    }

    /// Declare a variable owned by `owner`.
    pub fn add_variable(
        &mut self,
        owner: ModuleId,
        spec: VariableSpec,
    ) -> Result<VariableId, GraphError> {
        let base = self.module(owner).ok_or(GraphError::UnknownModule)?.path.clone();
        let full = path::resolve(&base, &spec.name).map_err(|_| GraphError::InvalidPath {
            path: spec.name.clone(),
        })?;

        let duplicate = self.variables_of(owner).into_iter().any(|v| {
            self.variable(v)
                .is_some_and(|node| node.path == full && node.direction == spec.direction)
        });
        if duplicate {
            return Err(GraphError::DuplicateVariable { path: full });
        }

        let idx = self.graph.add_node(ModelNode::Variable(VariableNode {
            element: spec.element,
            path: full,
            direction: spec.direction,
            value_type: spec.value_type,
            n_elements: spec.n_elements,
            unit: spec.unit,
            description: spec.description,
            tags: spec.tags,
            writeback: spec.writeback,
            owner,
        }));
        self.graph.add_edge(owner.0, idx, ModelEdge::Owns);
        Ok(VariableId(idx))
    }

    /// Attach an additional tag to a variable.
    pub fn add_tag(&mut self, id: VariableId, tag: impl Into<String>) -> Result<(), GraphError> {
        self.variable_mut(id)?.tags.insert(tag.into());
        Ok(())
    }

    /// Move a variable to another network by changing its absolute path.
    ///
    /// Used to redirect feeders to internal inputs, e.g. by a fan-in.
    pub fn set_variable_path(
        &mut self,
        id: VariableId,
        new_path: impl Into<String>,
    ) -> Result<(), GraphError> {
        let new_path = new_path.into();
        if !path::is_absolute(&new_path) {
            return Err(GraphError::InvalidPath { path: new_path });
        }
        self.variable_mut(id)?.path = new_path;
        Ok(())
    }

    /// Publish the structural information of an aggregator module.
    pub fn set_aggregator_info(
        &mut self,
        id: ModuleId,
        info: AggregatorInfo,
    ) -> Result<(), GraphError> {
        match self.graph.node_weight_mut(id.0) {
            Some(ModelNode::Module(m)) => {
                m.kind = ModuleKind::Aggregator(info);
                Ok(())
            }
            _ => Err(GraphError::UnknownModule),
        }
    }

    fn variable_mut(&mut self, id: VariableId) -> Result<&mut VariableNode, GraphError> {
        match self.graph.node_weight_mut(id.0) {
            Some(ModelNode::Variable(v)) => Ok(v),
            _ => Err(GraphError::UnknownVariable),
        }
    }
}
