use std::path::{Path, PathBuf};

use pv_modules::{PriorityMode, Status, StatusAggregatorConfig};
use pv_scenario::schema::*;
use pv_scenario::{
    AggregateState, ScenarioError, ScenarioRunner, StepReport, load_yaml, parse_yaml, save_yaml,
};

fn demo(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../demos/scenarios")
        .join(name)
}

fn state(report: &StepReport, path: &str) -> (Status, String) {
    let AggregateState {
        status, message, ..
    } = report
        .aggregates
        .iter()
        .find(|a| a.path == path)
        .unwrap_or_else(|| panic!("no aggregate {path} in {report:?}"));
    (*status, message.clone())
}

#[test]
fn demos_load_and_validate() {
    for name in ["01_plant_health.yaml", "02_vacuum_tagged.yaml"] {
        load_yaml(&demo(name)).unwrap_or_else(|e| panic!("Failed to load {}: {}", name, e));
    }
}

#[test]
fn plant_health_demo() {
    let scenario = load_yaml(&demo("01_plant_health.yaml")).unwrap();
    let mut runner = ScenarioRunner::new(&scenario).unwrap();
    let reports = runner.run().unwrap();
    assert_eq!(reports.len(), 4);

    let cooling = "/Plant/Cooling/CoolingHealth/status";
    let plant = "/PlantHealth/status";

    assert_eq!(state(&reports[0], cooling), (Status::Ok, String::new()));
    assert_eq!(state(&reports[0], plant), (Status::Ok, String::new()));

    let fan_warning = "/Plant/Cooling/Fan/status switched to WARNING".to_string();
    assert_eq!(state(&reports[1], cooling), (Status::Warning, fan_warning.clone()));
    assert_eq!(state(&reports[1], plant), (Status::Warning, fan_warning.clone()));

    assert_eq!(state(&reports[2], cooling), (Status::Warning, fan_warning));
    assert_eq!(
        state(&reports[2], plant),
        (Status::Fault, "heater element open".to_string())
    );

    // OK outranks OFF in fwko
    assert_eq!(
        state(&reports[3], cooling),
        (
            Status::Off,
            "/Plant/Cooling/Pump/status switched to OFF".to_string()
        )
    );
    assert_eq!(state(&reports[3], plant), (Status::Ok, String::new()));

    let inputs: Vec<_> = runner
        .aggregators()
        .map(|a| a.inputs().len())
        .collect();
    assert_eq!(inputs, vec![2, 2]);
    runner.shutdown();
}

#[test]
fn tagged_vacuum_demo() {
    let scenario = load_yaml(&demo("02_vacuum_tagged.yaml")).unwrap();
    let mut runner = ScenarioRunner::new(&scenario).unwrap();
    let reports = runner.run().unwrap();

    let vacuum = "/Vacuum/VacuumHealth/status";
    let overall = "/Overall/status";

    assert_eq!(state(&reports[0], vacuum).0, Status::Ok);
    assert_eq!(state(&reports[0], overall).0, Status::Ok);

    assert_eq!(
        state(&reports[1], vacuum),
        (Status::Warning, "vacuum partly off".to_string())
    );
    assert_eq!(
        state(&reports[1], overall),
        (Status::Off, "/Vacuum/Valve/status switched to OFF".to_string())
    );

    assert_eq!(
        state(&reports[2], vacuum),
        (Status::Off, "/Vacuum/Gauge/status switched to OFF".to_string())
    );

    assert_eq!(
        state(&reports[3], overall),
        (Status::Fault, "/Chiller/status switched to FAULT".to_string())
    );
    assert_eq!(state(&reports[3], vacuum).0, Status::Off);

    // the untagged aggregator takes the tagged leaves directly
    let overall_inputs: Vec<String> = runner
        .aggregators()
        .nth(1)
        .unwrap()
        .inputs()
        .iter()
        .map(|i| i.name().to_string())
        .collect();
    assert_eq!(
        overall_inputs,
        vec!["/Chiller/status", "/Vacuum/Gauge/status", "/Vacuum/Valve/status"]
    );
}

#[test]
fn tree_lists_modules_and_aggregators() {
    let scenario = load_yaml(&demo("01_plant_health.yaml")).unwrap();
    let runner = ScenarioRunner::new(&scenario).unwrap();
    let rendered = runner.tree().to_string();
    for name in ["Plant", "Cooling", "Pump", "CoolingHealth", "PlantHealth", "status_message"] {
        assert!(rendered.contains(name), "{name} missing in\n{rendered}");
    }
}

#[test]
fn roundtrip_yaml() {
    let scenario = Scenario {
        version: LATEST_VERSION,
        name: "Roundtrip".to_string(),
        groups: vec![],
        sources: vec![SourceDef {
            id: "door".to_string(),
            module: "/Door".to_string(),
            output: "status".to_string(),
            tags: vec!["safety".to_string()],
            with_message: true,
            initial: Status::Off,
        }],
        aggregators: vec![AggregatorDef {
            owner: "/".to_string(),
            config: StatusAggregatorConfig::new("Safety", "status")
                .mode(PriorityMode::Ofwk)
                .tag("safety"),
        }],
        steps: vec![StepDef {
            description: "door opened".to_string(),
            set: vec![SetDef {
                source: "door".to_string(),
                status: Status::Fault,
                message: Some("door open".to_string()),
            }],
        }],
    };

    let path = std::env::temp_dir().join("pv_scenario_roundtrip.yaml");
    save_yaml(&path, &scenario).unwrap();
    let loaded = load_yaml(&path).unwrap();
    assert_eq!(scenario, loaded);
}

#[test]
fn message_source_reaches_summary() {
    let scenario = parse_yaml(
        r#"
version: 1
name: Door
sources:
  - id: door
    module: /Door
    with_message: true
aggregators:
  - name: Safety
    output: status
steps:
  - set:
      - source: door
        status: warning
"#,
    )
    .unwrap();
    let mut runner = ScenarioRunner::new(&scenario).unwrap();
    let reports = runner.run().unwrap();
    assert_eq!(
        state(&reports[1], "/Safety/status"),
        (Status::Warning, "door switched to WARNING".to_string())
    );
}

#[test]
fn unknown_source_in_step_rejected() {
    let err = parse_yaml(
        r#"
version: 1
name: Broken
sources:
  - id: door
    module: /Door
steps:
  - set:
      - source: window
        status: fault
"#,
    )
    .unwrap_err();
    assert!(matches!(err, ScenarioError::Validation(_)));
}

#[test]
fn aggregator_without_inputs_fails_to_run() {
    let scenario = parse_yaml(
        r#"
version: 1
name: Empty
aggregators:
  - name: Lonely
    output: status
"#,
    )
    .unwrap();
    let mut runner = ScenarioRunner::new(&scenario).unwrap();
    assert!(matches!(runner.run(), Err(ScenarioError::Runtime(_))));
}
