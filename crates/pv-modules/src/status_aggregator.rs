//! Roll-up of status outputs into one summary status.
//!
//! A [`StatusAggregator`] is placed into the module tree like any other module.
//! When it is created it searches everything below its owner, breadth first,
//! for status outputs:
//!
//! - another aggregator with the same aggregation tag set contributes its
//!   output as one input; the status outputs it aggregates itself are not
//!   taken again
//! - any other status output carrying the aggregation tag (if there is one)
//!   becomes an input, together with its message if it has one
//!
//! Aggregators created directly next to this one (same owner) are ignored, as
//! are outputs of aggregators with a different tag set. Aggregators further
//! down must therefore be created first.
//!
//! The summary is the input status with the highest priority according to the
//! [`PriorityMode`], and carries that input's message.

use std::collections::BTreeSet;

use parking_lot::{const_mutex, Mutex};
use pv_core::{ElementId, PvError, PvResult, SystemTag};
use pv_graph::{AggregatorInfo, Direction, Model, ModelItem, ModuleId, ModuleKind};
use pv_runtime::{Decl, Module, PushInput, ReadAnyGroup, ReadAnyMember};
use serde::{Deserialize, Serialize};

use crate::status::{reduce, PriorityMode, Status};
use crate::status_with_message::{message_name, StatusWithMessage, StatusWithMessageInput};

/// Input shared by all aggregators; any write makes them dump their state.
pub const DEBUG_REQUEST_PATH: &str = "/Debug/statusAggregators";

pub const DEFAULT_WARNING_MIXED_MESSAGE: &str =
    "warning - StatusAggregator inputs have mixed values";

static DEBUG_DUMP_LOCK: Mutex<()> = const_mutex(());

/// Declarative description of an aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusAggregatorConfig {
    /// Name of the aggregator module below its owner.
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Output path, relative to the aggregator module.
    pub output: String,
    #[serde(default)]
    pub mode: PriorityMode,
    /// Aggregation tags; at most one is supported.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Extra tags attached to the output.
    #[serde(default)]
    pub output_tags: Vec<String>,
    #[serde(default)]
    pub warning_mixed_message: Option<String>,
}

impl StatusAggregatorConfig {
    pub fn new(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            output: output.into(),
            mode: PriorityMode::default(),
            tags: Vec::new(),
            output_tags: Vec::new(),
            warning_mixed_message: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn mode(mut self, mode: PriorityMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn output_tag(mut self, tag: impl Into<String>) -> Self {
        self.output_tags.push(tag.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    status: String,
    message: Option<String>,
}

fn push_candidate(candidates: &mut Vec<Candidate>, candidate: Candidate) {
    if !candidates.iter().any(|c| c.status == candidate.status) {
        candidates.push(candidate);
    }
}

/// Status variables below `scope` an aggregator in module `this` takes as
/// inputs, in breadth-first order.
fn discover(
    model: &Model,
    scope: ModuleId,
    this: ModuleId,
    tags: &BTreeSet<String>,
    output_path: &str,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    let mut excluded = BTreeSet::new();

    for item in model.visit_bfs(scope) {
        match item {
            ModelItem::Module(id, node) => {
                let ModuleKind::Aggregator(info) = &node.kind else {
                    continue;
                };
                if id == this || model.parent(id) == Some(scope) || &info.tags != tags {
                    continue;
                }
                push_candidate(
                    &mut candidates,
                    Candidate {
                        status: info.output_path.clone(),
                        message: Some(info.message_path.clone()),
                    },
                );
                excluded.extend(info.input_paths.iter().cloned());
            }
            ModelItem::Variable(_, var) => {
                if var.direction != Direction::Feeding
                    || !var.has_system_tag(SystemTag::StatusOutput)
                    || var.path == output_path
                    || model.is_aggregator_output(&var.path)
                    || !tags.iter().all(|t| var.has_tag(t))
                {
                    continue;
                }
                let message = var
                    .has_system_tag(SystemTag::StatusHasMessage)
                    .then(|| message_name(&var.path));
                push_candidate(
                    &mut candidates,
                    Candidate {
                        status: var.path.clone(),
                        message,
                    },
                );
            }
        }
    }

    candidates.retain(|c| !excluded.contains(&c.status));
    candidates
}

/// Summarizes the status outputs below its owner.
#[derive(Debug)]
pub struct StatusAggregator {
    module: Module,
    mode: PriorityMode,
    tags: BTreeSet<String>,
    output: StatusWithMessage,
    inputs: Vec<StatusWithMessageInput>,
    debug_request: PushInput<i32>,
    warning_mixed_message: String,
}

impl StatusAggregator {
    pub fn new(owner: &Module, config: StatusAggregatorConfig) -> PvResult<Self> {
        if config.tags.len() > 1 {
            return Err(PvError::logic(format!(
                "StatusAggregator '{}': at most one aggregation tag is supported, got {:?}",
                config.name, config.tags
            )));
        }
        let warning_mixed_message = match config.warning_mixed_message {
            Some(message) if message.is_empty() => {
                return Err(PvError::logic(format!(
                    "StatusAggregator '{}': the mixed values message must not be empty",
                    config.name
                )));
            }
            Some(message) => message,
            None => DEFAULT_WARNING_MIXED_MESSAGE.to_string(),
        };
        let tags: BTreeSet<String> = config.tags.into_iter().collect();

        let module = owner.add_module(&config.name, &config.description)?;
        let output_path = pv_core::path::resolve(module.path(), &config.output)?;
        let candidates = owner
            .app()
            .with_model(|m| discover(m, owner.id(), module.id(), &tags, &output_path));

        let mut inputs = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let mut input = StatusWithMessageInput::new(&module, &candidate.status, "")?;
            if let Some(message) = &candidate.message {
                input.set_message_source(Some(message))?;
            }
            inputs.push(input);
        }

        let output = StatusWithMessage::new(
            &module,
            Decl::new(output_path)
                .description(config.description)
                .tags(tags.iter().cloned())
                .tags(config.output_tags)
                .system_tag(SystemTag::AggregatedStatus),
        )?;
        let debug_request = module.push_input::<i32>(
            Decl::new(DEBUG_REQUEST_PATH).description("Print debug info for all status aggregators"),
        )?;

        let info = AggregatorInfo {
            tags: tags.clone(),
            output_path: output.name().to_string(),
            message_path: output.message_path().to_string(),
            input_paths: inputs.iter().map(|i| i.name().to_string()).collect(),
        };
        owner
            .app()
            .with_model_mut(|m| m.set_aggregator_info(module.id(), info))?;
        tracing::debug!(
            aggregator = %module.path(),
            output = %output.name(),
            inputs = inputs.len(),
            "status aggregator created"
        );

        Ok(Self {
            module,
            mode: config.mode,
            tags,
            output,
            inputs,
            debug_request,
            warning_mixed_message,
        })
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn mode(&self) -> PriorityMode {
        self.mode
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn output(&self) -> &StatusWithMessage {
        &self.output
    }

    pub fn inputs(&self) -> &[StatusWithMessageInput] {
        &self.inputs
    }

    /// Message reported when OK and OFF are mixed in
    /// [`PriorityMode::FwWarnMixed`].
    pub fn set_warning_mixed_message(&mut self, message: impl Into<String>) -> PvResult<()> {
        let message = message.into();
        if message.is_empty() {
            return Err(PvError::logic("the mixed values message must not be empty"));
        }
        self.warning_mixed_message = message;
        Ok(())
    }

    /// All inputs of the aggregator, including the debug request.
    pub fn read_any_group(&self) -> PvResult<ReadAnyGroup> {
        self.module.read_any_group()
    }

    /// True once every status input (and its message) holds a value.
    pub fn inputs_ready(&self) -> bool {
        self.inputs.iter().all(StatusWithMessageInput::is_initialized)
    }

    /// Block until every fed status input has a value.
    pub fn read_initial_values(&self) -> PvResult<()> {
        let members: Vec<&dyn ReadAnyMember> =
            self.inputs.iter().map(|i| i as &dyn ReadAnyMember).collect();
        if members.is_empty() {
            return Err(self.no_inputs());
        }
        ReadAnyGroup::new(&members)?.read_initial_values()
    }

    /// Recompute the summary and publish it if the status or the module's
    /// validity changed, or nothing was published yet. Returns true if
    /// published.
    pub fn update(&mut self) -> PvResult<bool> {
        let reduced = reduce(self.mode, self.inputs.iter().map(|i| i.status()))
            .ok_or_else(|| self.no_inputs())?;
        let changed = reduced.status != self.output.status()
            || !self.output.version_number().is_initialized()
            || self.module.validity() != self.output.validity();
        if !changed {
            return Ok(false);
        }

        match reduced.status {
            Status::Ok => self.output.write_ok(),
            status => {
                let message = match reduced.origin {
                    Some(index) => self.inputs[index].message(),
                    None => self.warning_mixed_message.clone(),
                };
                self.output.write(status, message)?;
            }
        }
        tracing::debug!(
            aggregator = %self.module.path(),
            status = %reduced.status,
            "aggregated status published"
        );
        Ok(true)
    }

    /// React to a change read by the module's group. Returns true if the
    /// summary was published.
    pub fn process(&mut self, change: ElementId) -> PvResult<bool> {
        if change == self.debug_request.id() {
            self.debug_dump();
            return Ok(false);
        }
        if !self.inputs.iter().any(|i| i.update(change)) {
            tracing::trace!(aggregator = %self.module.path(), %change, "incomplete update skipped");
            return Ok(false);
        }
        self.update()
    }

    /// Process every change already queued, without blocking. Returns the
    /// number of publications.
    pub fn step(&mut self, group: &ReadAnyGroup) -> PvResult<usize> {
        let mut published = 0;
        while let Some(change) = group.read_any_non_blocking() {
            if self.process(change)? {
                published += 1;
            }
        }
        Ok(published)
    }

    /// Run until the application shuts down.
    pub fn main_loop(&mut self) -> PvResult<()> {
        let group = self.read_any_group()?;
        self.read_initial_values()?;
        self.update()?;
        loop {
            let change = match group.read_any() {
                Ok(change) => change,
                Err(PvError::Shutdown) => return Ok(()),
                Err(err) => return Err(err),
            };
            self.process(change)?;
        }
    }

    /// Log the current state of every input. Dumps of different aggregators
    /// never interleave.
    pub fn debug_dump(&self) -> String {
        let _guard = DEBUG_DUMP_LOCK.lock();
        let mut text = format!(
            "StatusAggregator {} ({:?}): {} '{}'\n",
            self.module.path(),
            self.mode,
            self.output.status(),
            self.output.message()
        );
        for input in &self.inputs {
            text.push_str(&format!(
                "  {} = {} '{}'\n",
                input.name(),
                input.status(),
                input.message()
            ));
        }
        tracing::info!(target: "StatusAggregator", "{}", text);
        text
    }

    fn no_inputs(&self) -> PvError {
        PvError::logic(format!(
            "StatusAggregator '{}' has no inputs",
            self.module.path()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pv_runtime::Application;

    use crate::status_with_message::StatusOutput;

    #[test]
    fn more_than_one_tag_rejected() {
        let app = Application::new("t");
        let config = StatusAggregatorConfig::new("Agg", "status").tag("a").tag("b");
        let err = StatusAggregator::new(&app.root(), config).unwrap_err();
        assert!(matches!(err, PvError::Logic { .. }));
    }

    #[test]
    fn empty_aggregator_fails_at_first_reduction() {
        let app = Application::new("t");
        let mut agg =
            StatusAggregator::new(&app.root(), StatusAggregatorConfig::new("Agg", "status")).unwrap();
        assert!(agg.inputs().is_empty());
        assert!(matches!(agg.update(), Err(PvError::Logic { .. })));
    }

    #[test]
    fn discovery_respects_tags() {
        let app = Application::new("t");
        let a = app.root().add_module("A", "").unwrap();
        let b = app.root().add_module("B", "").unwrap();
        StatusOutput::new(&a, Decl::new("status").tag("vacuum")).unwrap();
        StatusOutput::new(&b, Decl::new("status")).unwrap();

        let all = StatusAggregator::new(&app.root(), StatusAggregatorConfig::new("All", "status"))
            .unwrap();
        let names: Vec<_> = all.inputs().iter().map(|i| i.name()).collect();
        assert_eq!(names, vec!["/A/status", "/B/status"]);

        let vacuum = StatusAggregator::new(
            &app.root(),
            StatusAggregatorConfig::new("Vacuum", "status").tag("vacuum"),
        )
        .unwrap();
        let names: Vec<_> = vacuum.inputs().iter().map(|i| i.name()).collect();
        assert_eq!(names, vec!["/A/status"]);
    }

    #[test]
    fn config_from_yaml() {
        let yaml = "name: Top\noutput: status\nmode: fwko\ntags: [vacuum]\n";
        let config: StatusAggregatorConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config,
            StatusAggregatorConfig::new("Top", "status")
                .mode(PriorityMode::Fwko)
                .tag("vacuum")
        );
    }

    #[test]
    fn mixed_message_must_not_be_empty() {
        let app = Application::new("t");
        let mut agg =
            StatusAggregator::new(&app.root(), StatusAggregatorConfig::new("Agg", "status")).unwrap();
        assert!(agg.set_warning_mixed_message("").is_err());
        agg.set_warning_mixed_message("ok and off mixed").unwrap();
    }
}
