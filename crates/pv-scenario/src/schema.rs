//! Scenario schema definitions.

use pv_modules::{Status, StatusAggregatorConfig};
use serde::{Deserialize, Serialize};

pub const LATEST_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    pub version: u32,
    pub name: String,
    /// Grouping levels, created before anything else.
    #[serde(default)]
    pub groups: Vec<GroupDef>,
    #[serde(default)]
    pub sources: Vec<SourceDef>,
    /// Created in the listed order; nested aggregators must come first.
    #[serde(default)]
    pub aggregators: Vec<AggregatorDef>,
    #[serde(default)]
    pub steps: Vec<StepDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupDef {
    /// Absolute path, e.g. `/Plant/Cooling`.
    pub path: String,
}

/// A module publishing one status variable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceDef {
    pub id: String,
    /// Absolute path of the module.
    pub module: String,
    #[serde(default = "default_output")]
    pub output: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub with_message: bool,
    #[serde(default = "default_initial")]
    pub initial: Status,
}

fn default_output() -> String {
    "status".to_string()
}

fn default_initial() -> Status {
    Status::Ok
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregatorDef {
    /// Absolute path of the owning group, `/` for the root.
    #[serde(default = "default_owner")]
    pub owner: String,
    #[serde(flatten)]
    pub config: StatusAggregatorConfig,
}

fn default_owner() -> String {
    "/".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepDef {
    #[serde(default)]
    pub description: String,
    pub set: Vec<SetDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SetDef {
    pub source: String,
    pub status: Status,
    /// Only for sources with a message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
