//! Scenario validation logic.

use crate::schema::{LATEST_VERSION, Scenario, SourceDef};
use pv_core::path;
use pv_modules::Status;
use std::collections::{HashMap, HashSet};

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Duplicate ID: {id} in {context}")]
    DuplicateId { id: String, context: String },

    #[error("Missing reference: {id} in {context}")]
    MissingReference { id: String, context: String },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported feature: {feature} - {reason}")]
    Unsupported { feature: String, reason: String },

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },
}

pub fn validate_scenario(scenario: &Scenario) -> Result<(), ValidationError> {
    if scenario.version == 0 || scenario.version > LATEST_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            version: scenario.version,
        });
    }

    // every module path in the tree, groups included
    let mut module_paths = HashSet::new();

    let mut group_paths = HashSet::new();
    for group in &scenario.groups {
        check_module_path("groups.path", &group.path)?;
        if !group_paths.insert(group.path.as_str()) {
            return Err(ValidationError::DuplicateId {
                id: group.path.clone(),
                context: "groups".to_string(),
            });
        }
        module_paths.insert(group.path.clone());
    }

    let mut sources: HashMap<&str, &SourceDef> = HashMap::new();
    for source in &scenario.sources {
        check_module_path("sources.module", &source.module)?;
        if sources.insert(source.id.as_str(), source).is_some() {
            return Err(ValidationError::DuplicateId {
                id: source.id.clone(),
                context: "sources".to_string(),
            });
        }
        if !module_paths.insert(source.module.clone()) {
            return Err(ValidationError::DuplicateId {
                id: source.module.clone(),
                context: format!("source '{}' module", source.id),
            });
        }
        if source.output.is_empty() || source.output.contains('/') {
            return Err(ValidationError::InvalidValue {
                field: format!("sources.{}.output", source.id),
                value: source.output.clone(),
                reason: "must be a plain variable name".to_string(),
            });
        }
    }

    for aggregator in &scenario.aggregators {
        let config = &aggregator.config;
        if aggregator.owner != "/" && !group_paths.contains(aggregator.owner.as_str()) {
            return Err(ValidationError::MissingReference {
                id: aggregator.owner.clone(),
                context: format!("aggregator '{}' owner", config.name),
            });
        }
        if config.name.is_empty() || config.name.contains('/') {
            return Err(ValidationError::InvalidValue {
                field: "aggregators.name".to_string(),
                value: config.name.clone(),
                reason: "must be a plain module name".to_string(),
            });
        }
        if config.tags.len() > 1 {
            return Err(ValidationError::Unsupported {
                feature: format!("aggregator '{}' tags", config.name),
                reason: "at most one aggregation tag is supported".to_string(),
            });
        }
        if config.warning_mixed_message.as_deref() == Some("") {
            return Err(ValidationError::InvalidValue {
                field: format!("aggregators.{}.warning_mixed_message", config.name),
                value: String::new(),
                reason: "must not be empty".to_string(),
            });
        }
        let module = path::join(&aggregator.owner, &config.name);
        if !module_paths.insert(module.clone()) {
            return Err(ValidationError::DuplicateId {
                id: module,
                context: "aggregators".to_string(),
            });
        }
    }

    for (index, step) in scenario.steps.iter().enumerate() {
        let context = format!("step {}", index + 1);
        for set in &step.set {
            let Some(source) = sources.get(set.source.as_str()) else {
                return Err(ValidationError::MissingReference {
                    id: set.source.clone(),
                    context,
                });
            };
            if let Some(message) = &set.message {
                if !source.with_message {
                    return Err(ValidationError::InvalidValue {
                        field: format!("{context}.{}.message", set.source),
                        value: message.clone(),
                        reason: "source has no message output".to_string(),
                    });
                }
                if set.status == Status::Ok {
                    return Err(ValidationError::InvalidValue {
                        field: format!("{context}.{}.message", set.source),
                        value: message.clone(),
                        reason: "OK carries no message".to_string(),
                    });
                }
            }
        }
    }

    Ok(())
}

fn check_module_path(field: &str, value: &str) -> Result<(), ValidationError> {
    let normalized = path::is_absolute(value)
        .then(|| path::resolve("/", value).ok())
        .flatten();
    if value == "/" || normalized.as_deref() != Some(value) {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: "must be a normalized absolute module path".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AggregatorDef, GroupDef, SetDef, StepDef};
    use pv_modules::StatusAggregatorConfig;

    fn source(id: &str, module: &str) -> SourceDef {
        SourceDef {
            id: id.to_string(),
            module: module.to_string(),
            output: "status".to_string(),
            tags: Vec::new(),
            with_message: false,
            initial: Status::Ok,
        }
    }

    fn scenario() -> Scenario {
        Scenario {
            version: LATEST_VERSION,
            name: "test".to_string(),
            groups: vec![GroupDef {
                path: "/Plant".to_string(),
            }],
            sources: vec![source("pump", "/Plant/Pump"), source("fan", "/Plant/Fan")],
            aggregators: vec![AggregatorDef {
                owner: "/Plant".to_string(),
                config: StatusAggregatorConfig::new("Health", "status"),
            }],
            steps: vec![StepDef {
                description: String::new(),
                set: vec![SetDef {
                    source: "pump".to_string(),
                    status: Status::Fault,
                    message: None,
                }],
            }],
        }
    }

    #[test]
    fn valid_scenario_passes() {
        validate_scenario(&scenario()).unwrap();
    }

    #[test]
    fn relative_module_path_rejected() {
        let mut s = scenario();
        s.sources[0].module = "Plant/Pump".to_string();
        assert!(matches!(
            validate_scenario(&s),
            Err(ValidationError::InvalidValue { .. })
        ));
        s.sources[0].module = "/Plant//Pump".to_string();
        assert!(validate_scenario(&s).is_err());
    }

    #[test]
    fn duplicate_module_rejected() {
        let mut s = scenario();
        s.sources[1].module = "/Plant/Pump".to_string();
        assert!(matches!(
            validate_scenario(&s),
            Err(ValidationError::DuplicateId { .. })
        ));
    }

    #[test]
    fn aggregator_clashing_with_source_rejected() {
        let mut s = scenario();
        s.aggregators[0].config.name = "Pump".to_string();
        assert!(matches!(
            validate_scenario(&s),
            Err(ValidationError::DuplicateId { .. })
        ));
    }

    #[test]
    fn unknown_owner_rejected() {
        let mut s = scenario();
        s.aggregators[0].owner = "/Nowhere".to_string();
        assert!(matches!(
            validate_scenario(&s),
            Err(ValidationError::MissingReference { .. })
        ));
    }

    #[test]
    fn two_tags_unsupported() {
        let mut s = scenario();
        s.aggregators[0].config = StatusAggregatorConfig::new("Health", "status")
            .tag("a")
            .tag("b");
        assert!(matches!(
            validate_scenario(&s),
            Err(ValidationError::Unsupported { .. })
        ));
    }

    #[test]
    fn step_references_checked() {
        let mut s = scenario();
        s.steps[0].set[0].source = "heater".to_string();
        assert!(matches!(
            validate_scenario(&s),
            Err(ValidationError::MissingReference { .. })
        ));
    }

    #[test]
    fn message_needs_message_output() {
        let mut s = scenario();
        s.steps[0].set[0].message = Some("stuck".to_string());
        assert!(validate_scenario(&s).is_err());
        s.sources[0].with_message = true;
        validate_scenario(&s).unwrap();
        s.steps[0].set[0].status = Status::Ok;
        assert!(validate_scenario(&s).is_err());
    }

    #[test]
    fn future_version_rejected() {
        let mut s = scenario();
        s.version = LATEST_VERSION + 1;
        assert!(matches!(
            validate_scenario(&s),
            Err(ValidationError::UnsupportedVersion { .. })
        ));
    }
}
