//! Integration tests for pv-graph.

use pv_core::{PvError, SystemTag};
use pv_graph::{AggregatorInfo, Direction, GraphError, Model, ModelItem, ModuleKind, VariableSpec};

fn status(name: &str) -> VariableSpec {
    VariableSpec::new(name, Direction::Feeding, "i32").with_system_tag(SystemTag::StatusOutput)
}

#[test]
fn status_discovery_over_nested_groups() {
    let mut model = Model::new("app");
    let root = model.root();
    let plant = model.add_module(root, "Plant", ModuleKind::Group).unwrap();
    let pump = model.add_module(plant, "Pump", ModuleKind::Application).unwrap();
    let valve = model.add_module(plant, "Valve", ModuleKind::Application).unwrap();
    model.add_variable(pump, status("status")).unwrap();
    model.add_variable(valve, status("status")).unwrap();
    model
        .add_variable(valve, VariableSpec::new("position", Direction::Feeding, "f64"))
        .unwrap();

    let found: Vec<String> = model
        .find_tagged(&[SystemTag::StatusOutput.as_str()], root)
        .into_iter()
        .map(|(p, _)| p)
        .collect();
    assert_eq!(found, vec!["/Plant/Pump/status", "/Plant/Valve/status"]);
}

#[test]
fn redirected_feeder_joins_internal_network() {
    let mut model = Model::new("app");
    let root = model.root();
    let src = model.add_module(root, "Src", ModuleKind::Application).unwrap();
    let sink = model.add_module(root, "Sink", ModuleKind::Application).unwrap();
    let feeder = model
        .add_variable(src, VariableSpec::new("/value", Direction::Feeding, "i32"))
        .unwrap();
    let internal = model
        .add_variable(
            sink,
            VariableSpec::new("/value/__internal__", Direction::Consuming, "i32")
                .with_system_tag(SystemTag::Internal),
        )
        .unwrap();

    for f in model.feeders_of("/value") {
        let target = format!("{}/__internal__", model.variable(f).unwrap().path);
        model.set_variable_path(f, target).unwrap();
    }
    let networks = model.build_networks().unwrap();
    let net = networks
        .iter()
        .find(|n| n.path == "/value/__internal__")
        .unwrap();
    assert_eq!(net.feeder, Some(feeder));
    assert_eq!(net.consumers, vec![internal]);
    assert!(model.feeders_of("/value").is_empty());
}

#[test]
fn aggregator_info_visible_in_traversal() {
    let mut model = Model::new("app");
    let root = model.root();
    let agg = model.add_module(root, "Agg", ModuleKind::Application).unwrap();
    model
        .set_aggregator_info(
            agg,
            AggregatorInfo {
                tags: ["A".to_string()].into_iter().collect(),
                output_path: "/Agg/status".into(),
                message_path: "/Agg/status_message".into(),
                input_paths: vec!["/x/status".into()],
            },
        )
        .unwrap();

    let kinds: Vec<bool> = model
        .visit_bfs(root)
        .into_iter()
        .map(|item| matches!(item, ModelItem::Module(_, m) if matches!(m.kind, ModuleKind::Aggregator(_))))
        .collect();
    assert_eq!(kinds, vec![true]);
}

#[test]
fn graph_error_converts_to_pv_error() {
    let err: PvError = GraphError::MultipleFeeders {
        path: "/v".into(),
        count: 2,
    }
    .into();
    assert!(matches!(err, PvError::Graph { .. }));
    assert!(err.to_string().contains("/v"));
}
