//! Leaf modules turning a watched value into a status.
//!
//! A monitor watches one value against thresholds which are themselves inputs
//! (so they can be changed at runtime) and publishes a [`Status`]. Writing a
//! non-zero value to the `disable` input switches the monitor OFF.

use pv_core::{PvResult, path};
use pv_runtime::{Decl, Module, PushInput, ReadAnyGroup, UserType};
use serde::{Deserialize, Serialize};

use crate::status::Status;
use crate::status_with_message::StatusOutput;

/// What a monitor compares the watched value with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorKind {
    /// WARNING/FAULT at or above the upper thresholds.
    Max,
    /// WARNING/FAULT at or below the lower thresholds.
    Min,
    /// WARNING/FAULT outside the lower/upper thresholds.
    Range,
    /// FAULT unless the value equals the required value.
    Exact,
}

impl MonitorKind {
    /// Names of the threshold inputs, in evaluation order.
    pub fn parameter_names(self) -> &'static [&'static str] {
        match self {
            MonitorKind::Max => &["upper_warning_threshold", "upper_fault_threshold"],
            MonitorKind::Min => &["lower_warning_threshold", "lower_fault_threshold"],
            MonitorKind::Range => &[
                "lower_warning_threshold",
                "upper_warning_threshold",
                "lower_fault_threshold",
                "upper_fault_threshold",
            ],
            MonitorKind::Exact => &["required_value"],
        }
    }
}

pub fn evaluate_max<T: PartialOrd>(value: &T, warning: &T, fault: &T) -> Status {
    if value >= fault {
        Status::Fault
    } else if value >= warning {
        Status::Warning
    } else {
        Status::Ok
    }
}

pub fn evaluate_min<T: PartialOrd>(value: &T, warning: &T, fault: &T) -> Status {
    if value <= fault {
        Status::Fault
    } else if value <= warning {
        Status::Warning
    } else {
        Status::Ok
    }
}

pub fn evaluate_range<T: PartialOrd>(value: &T, warning: (&T, &T), fault: (&T, &T)) -> Status {
    if value <= fault.0 || value >= fault.1 {
        Status::Fault
    } else if value <= warning.0 || value >= warning.1 {
        Status::Warning
    } else {
        Status::Ok
    }
}

pub fn evaluate_exact<T: PartialEq>(value: &T, required: &T) -> Status {
    if value == required {
        Status::Ok
    } else {
        Status::Fault
    }
}

/// Where a monitor lives and what it is connected to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Name of the monitor module below its owner.
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Watched value, relative to the owner.
    pub input: String,
    /// Status output, relative to the owner.
    pub output: String,
    #[serde(default)]
    pub output_tags: Vec<String>,
    /// Tags attached to the threshold and disable inputs.
    #[serde(default)]
    pub parameter_tags: Vec<String>,
}

impl MonitorConfig {
    pub fn new(name: impl Into<String>, input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            input: input.into(),
            output: output.into(),
            output_tags: Vec::new(),
            parameter_tags: Vec::new(),
        }
    }

    pub fn output_tag(mut self, tag: impl Into<String>) -> Self {
        self.output_tags.push(tag.into());
        self
    }
}

/// A module publishing the status of one watched value.
#[derive(Debug)]
pub struct StatusMonitor<T: UserType + PartialOrd> {
    module: Module,
    kind: MonitorKind,
    watch: PushInput<T>,
    disable: PushInput<i32>,
    parameters: Vec<PushInput<T>>,
    status: StatusOutput,
}

impl<T: UserType + PartialOrd> StatusMonitor<T> {
    pub fn new(owner: &Module, kind: MonitorKind, config: MonitorConfig) -> PvResult<Self> {
        let module = owner.add_module(&config.name, &config.description)?;
        let watch = module.push_input::<T>(
            Decl::new(path::resolve(owner.path(), &config.input)?).description("Value to monitor"),
        )?;
        let disable = module.push_input::<i32>(
            Decl::new("disable")
                .description("Disable the status monitor")
                .tags(config.parameter_tags.iter().cloned()),
        )?;
        let parameters = kind
            .parameter_names()
            .iter()
            .map(|name| {
                module.push_input::<T>(Decl::new(*name).tags(config.parameter_tags.iter().cloned()))
            })
            .collect::<PvResult<Vec<_>>>()?;
        let status = StatusOutput::new(
            &module,
            Decl::new(path::resolve(owner.path(), &config.output)?)
                .description("Resulting status")
                .tags(config.output_tags),
        )?;
        tracing::debug!(monitor = %module.path(), ?kind, "status monitor created");
        Ok(Self {
            module,
            kind,
            watch,
            disable,
            parameters,
            status,
        })
    }

    pub fn max(owner: &Module, config: MonitorConfig) -> PvResult<Self> {
        Self::new(owner, MonitorKind::Max, config)
    }

    pub fn min(owner: &Module, config: MonitorConfig) -> PvResult<Self> {
        Self::new(owner, MonitorKind::Min, config)
    }

    pub fn range(owner: &Module, config: MonitorConfig) -> PvResult<Self> {
        Self::new(owner, MonitorKind::Range, config)
    }

    pub fn exact(owner: &Module, config: MonitorConfig) -> PvResult<Self> {
        Self::new(owner, MonitorKind::Exact, config)
    }

    pub fn kind(&self) -> MonitorKind {
        self.kind
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn output(&self) -> &StatusOutput {
        &self.status
    }

    /// Status for the values currently held by the inputs.
    pub fn evaluate(&self) -> Status {
        if self.disable.get() != 0 {
            return Status::Off;
        }
        let value = self.watch.get();
        let p: Vec<T> = self.parameters.iter().map(PushInput::get).collect();
        match (self.kind, p.as_slice()) {
            (MonitorKind::Max, [warning, fault]) => evaluate_max(&value, warning, fault),
            (MonitorKind::Min, [warning, fault]) => evaluate_min(&value, warning, fault),
            (MonitorKind::Range, [lw, uw, lf, uf]) => evaluate_range(&value, (lw, uw), (lf, uf)),
            (MonitorKind::Exact, [required]) => evaluate_exact(&value, required),
            _ => Status::Fault,
        }
    }

    /// Evaluate and publish. Exact monitors publish only on change.
    pub fn publish(&self) -> Status {
        let status = self.evaluate();
        match self.kind {
            MonitorKind::Exact => {
                self.status.write_if_changed(status, self.module.validity());
            }
            _ => self.status.write(status),
        }
        status
    }

    /// Publish once per queued change, without blocking.
    pub fn step(&self, group: &ReadAnyGroup) -> usize {
        let mut changes = 0;
        while group.read_any_non_blocking().is_some() {
            self.publish();
            changes += 1;
        }
        changes
    }

    pub fn main_loop(&self) -> PvResult<()> {
        let group = self.module.read_any_group()?;
        loop {
            self.publish();
            match group.read_any() {
                Ok(_) => {}
                Err(pv_core::PvError::Shutdown) => return Ok(()),
                Err(err) => return Err(err),
            }
        }
    }
}
