//! Structural validation of the model.

use pv_core::SystemTag;

use crate::error::GraphError;
use crate::graph::{Direction, Model, VariableId};

/// Status output tags may only be carried by feeding variables.
pub(crate) fn validate_tags(model: &Model) -> Result<(), GraphError> {
    for (_, v) in model.variables() {
        if v.direction == Direction::Consuming && v.has_system_tag(SystemTag::StatusOutput) {
            return Err(GraphError::StatusTagOnConsumer {
                path: v.path.clone(),
            });
        }
    }
    Ok(())
}

/// Validate the members of one network: at most one feeder, consistent types
/// and element counts.
pub(crate) fn validate_network(
    model: &Model,
    path: &str,
    members: &[VariableId],
) -> Result<(), GraphError> {
    let nodes: Vec<_> = members
        .iter()
        .map(|id| model.variable(*id).ok_or(GraphError::UnknownVariable))
        .collect::<Result<_, _>>()?;

    let feeders = nodes
        .iter()
        .filter(|v| v.direction == Direction::Feeding)
        .count();
    if feeders > 1 {
        return Err(GraphError::MultipleFeeders {
            path: path.to_string(),
            count: feeders,
        });
    }

    if let Some(first) = nodes.first() {
        for v in &nodes[1..] {
            if v.value_type != first.value_type {
                return Err(GraphError::TypeMismatch {
                    path: path.to_string(),
                    expected: first.value_type.clone(),
                    actual: v.value_type.clone(),
                });
            }
            if v.n_elements != first.n_elements {
                return Err(GraphError::LengthMismatch {
                    path: path.to_string(),
                    expected: first.n_elements,
                    actual: v.n_elements,
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::VariableSpec;
    use crate::graph::ModuleKind;

    #[test]
    fn type_mismatch_detected() {
        let mut model = Model::new("app");
        let root = model.root();
        let a = model.add_module(root, "A", ModuleKind::Application).unwrap();
        let b = model.add_module(root, "B", ModuleKind::Application).unwrap();
        model
            .add_variable(a, VariableSpec::new("/v", Direction::Feeding, "i32"))
            .unwrap();
        model
            .add_variable(b, VariableSpec::new("/v", Direction::Consuming, "f64"))
            .unwrap();
        let err = model.build_networks().unwrap_err();
        assert!(matches!(err, GraphError::TypeMismatch { .. }));
    }

    #[test]
    fn length_mismatch_detected() {
        let mut model = Model::new("app");
        let root = model.root();
        let a = model.add_module(root, "A", ModuleKind::Application).unwrap();
        let b = model.add_module(root, "B", ModuleKind::Application).unwrap();
        model
            .add_variable(a, VariableSpec::new("/v", Direction::Feeding, "vec").with_elements(4))
            .unwrap();
        model
            .add_variable(b, VariableSpec::new("/v", Direction::Consuming, "vec").with_elements(3))
            .unwrap();
        let err = model.build_networks().unwrap_err();
        assert!(matches!(err, GraphError::LengthMismatch { .. }));
    }

    #[test]
    fn status_tag_on_consumer_detected() {
        let mut model = Model::new("app");
        let root = model.root();
        let a = model.add_module(root, "A", ModuleKind::Application).unwrap();
        model
            .add_variable(
                a,
                VariableSpec::new("status", Direction::Consuming, "i32")
                    .with_system_tag(SystemTag::StatusOutput),
            )
            .unwrap();
        let err = model.build_networks().unwrap_err();
        assert_eq!(
            err,
            GraphError::StatusTagOnConsumer {
                path: "/A/status".into()
            }
        );
    }
}
