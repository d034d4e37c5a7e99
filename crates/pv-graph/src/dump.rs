//! Human readable rendering of the ownership tree.

use termtree::Tree;

use crate::graph::{Direction, Model, ModelNode, ModuleKind};

impl Model {
    /// Render the ownership tree. Variables are listed with direction, type and
    /// tags; aggregators are marked.
    pub fn dump_tree(&self) -> Tree<String> {
        self.dump_node(self.root)
    }

    fn dump_node(&self, n: petgraph::stable_graph::NodeIndex) -> Tree<String> {
        match &self.graph[n] {
            ModelNode::Module(m) => {
                let label = match &m.kind {
                    ModuleKind::Group => m.name.clone(),
                    ModuleKind::Application => format!("{} [module]", m.name),
                    ModuleKind::Aggregator(info) => {
                        format!("{} [aggregator -> {}]", m.name, info.output_path)
                    }
                };
                let mut tree = Tree::new(label);
                for child in self.owned(n) {
                    tree.leaves.push(self.dump_node(child));
                }
                tree
            }
            ModelNode::Variable(v) => {
                let arrow = match v.direction {
                    Direction::Feeding => "->",
                    Direction::Consuming => "<-",
                };
                let mut label = format!("{} {} ({})", arrow, v.path, v.value_type);
                if v.n_elements != 1 {
                    label.push_str(&format!("[{}]", v.n_elements));
                }
                if !v.tags.is_empty() {
                    let tags: Vec<&str> = v.tags.iter().map(String::as_str).collect();
                    label.push_str(&format!(" {{{}}}", tags.join(", ")));
                }
                Tree::new(label)
            }
        }
    }
}
