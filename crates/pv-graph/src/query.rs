//! Read-only queries over the ownership tree.
//!
//! Traversals follow ownership edges only and visit children in declaration
//! order, so results are deterministic for a given construction sequence.

use std::collections::VecDeque;

use crate::graph::{
    Direction, Model, ModelItem, ModelNode, ModuleId, ModuleKind, ModuleNode, VariableId,
};

impl Model {
    /// Breadth-first traversal of everything owned (directly or indirectly) by `scope`.
    ///
    /// The scope module itself is not part of the result. On each level the
    /// variables of a module come before its sub-modules.
    pub fn visit_bfs(&self, scope: ModuleId) -> Vec<ModelItem<'_>> {
        let mut items = Vec::new();
        let mut queue = VecDeque::from([scope.0]);

        while let Some(module) = queue.pop_front() {
            let children = self.owned(module);
            for child in children.iter().copied() {
                if let ModelNode::Variable(v) = &self.graph[child] {
                    items.push(ModelItem::Variable(VariableId(child), v));
                }
            }
            for child in children {
                if let ModelNode::Module(m) = &self.graph[child] {
                    items.push(ModelItem::Module(ModuleId(child), m));
                    queue.push_back(child);
                }
            }
        }

        items
    }

    /// All variables below `scope` carrying every one of `tags`.
    ///
    /// Returns `(absolute path, variable id)` pairs in breadth-first order.
    pub fn find_tagged(&self, tags: &[&str], scope: ModuleId) -> Vec<(String, VariableId)> {
        self.visit_bfs(scope)
            .into_iter()
            .filter_map(|item| match item {
                ModelItem::Variable(id, v) if tags.iter().all(|t| v.has_tag(t)) => {
                    Some((v.path.clone(), id))
                }
                _ => None,
            })
            .collect()
    }

    /// True if `path` is the output of any aggregator in the model.
    pub fn is_aggregator_output(&self, path: &str) -> bool {
        self.modules().any(|(_, m)| match &m.kind {
            ModuleKind::Aggregator(info) => info.output_path == path,
            _ => false,
        })
    }

    /// Find the module an absolute path refers to.
    pub fn module_by_path(&self, path: &str) -> Option<ModuleId> {
        self.modules().find(|(_, m)| m.path == path).map(|(id, _)| id)
    }

    /// Feeding variables at the given absolute path.
    pub fn feeders_of(&self, path: &str) -> Vec<VariableId> {
        self.variables_at(path, Direction::Feeding)
    }

    /// Consuming variables at the given absolute path.
    pub fn consumers_of(&self, path: &str) -> Vec<VariableId> {
        self.variables_at(path, Direction::Consuming)
    }

    /// Absolute path of a module.
    pub fn module_path(&self, id: ModuleId) -> Option<&str> {
        self.module(id).map(|m| m.path.as_str())
    }

    /// Walk up the ownership tree until a module satisfying `pred` is found.
    pub fn find_ancestor(
        &self,
        start: ModuleId,
        pred: impl Fn(&ModuleNode) -> bool,
    ) -> Option<ModuleId> {
        let mut current = Some(start);
        while let Some(id) = current {
            if self.module(id).is_some_and(&pred) {
                return Some(id);
            }
            current = self.parent(id);
        }
        None
    }

    fn variables_at(&self, path: &str, direction: Direction) -> Vec<VariableId> {
        self.variables()
            .filter(|(_, v)| v.path == path && v.direction == direction)
            .map(|(id, _)| id)
            .collect()
    }
}
