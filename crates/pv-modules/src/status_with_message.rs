//! Status variables, optionally paired with a human readable message.
//!
//! A status variable carries the integer code of a [`Status`]. When it has a
//! message, a string variable named `<status>_message` sits next to it and
//! both are always written with the same version number, so a reader can tell
//! whether the two parts it holds belong together.

use std::sync::Arc;

use pv_core::{DataValidity, ElementId, PvError, PvResult, SystemTag, VersionNumber};
use pv_runtime::{Decl, Module, Output, PushInput, ReadAnyMember, TransferElement};

use crate::status::Status;

/// Name of the message variable paired with `status_name`.
pub fn message_name(status_name: &str) -> String {
    format!("{status_name}_message")
}

fn user_tags(decl: &Decl) -> Vec<String> {
    decl.tags
        .iter()
        .filter(|t| !SystemTag::is_reserved(t))
        .cloned()
        .collect()
}

/// A plain status output without message.
#[derive(Debug)]
pub struct StatusOutput {
    output: Output<i32>,
}

impl StatusOutput {
    pub fn new(module: &Module, decl: Decl) -> PvResult<Self> {
        let output = module.output::<i32>(decl.system_tag(SystemTag::StatusOutput))?;
        Ok(Self { output })
    }

    /// Current status; unknown codes read as FAULT.
    pub fn status(&self) -> Status {
        Status::from_code(self.output.get()).unwrap_or(Status::Fault)
    }

    pub fn write(&self, status: Status) {
        self.output.set_and_write(status.code());
    }

    /// Write only when the status changed, nothing was written yet, or the
    /// validity of the owning module differs from the last write.
    pub fn write_if_changed(&self, status: Status, module_validity: DataValidity) -> bool {
        let changed = self.status() != status
            || !self.output.version_number().is_initialized()
            || self.output.validity() != module_validity;
        if changed {
            self.write(status);
        }
        changed
    }

    pub fn id(&self) -> ElementId {
        self.output.id()
    }

    pub fn name(&self) -> &str {
        self.output.name()
    }

    pub fn version_number(&self) -> VersionNumber {
        self.output.version_number()
    }

    pub fn validity(&self) -> DataValidity {
        self.output.validity()
    }
}

/// A status output with paired message output.
#[derive(Debug)]
pub struct StatusWithMessage {
    status: Output<i32>,
    message: Output<String>,
}

impl StatusWithMessage {
    pub fn new(module: &Module, decl: Decl) -> PvResult<Self> {
        let message_decl = Decl::new(message_name(&decl.name))
            .description(decl.description.clone())
            .tags(user_tags(&decl));
        let status = module.output::<i32>(
            decl.system_tag(SystemTag::StatusOutput)
                .system_tag(SystemTag::StatusHasMessage),
        )?;
        let message = module.output::<String>(message_decl)?;
        Ok(Self { status, message })
    }

    /// Publish a non-OK status together with its message.
    pub fn write(&self, status: Status, message: impl Into<String>) -> PvResult<()> {
        if status == Status::Ok {
            return Err(PvError::logic(format!(
                "'{}': use write_ok() to report OK",
                self.status.name()
            )));
        }
        let message = message.into();
        if message.is_empty() {
            return Err(PvError::logic(format!(
                "'{}': status {} needs a message",
                self.status.name(),
                status
            )));
        }
        self.publish(status, message);
        Ok(())
    }

    /// Publish OK and clear the message.
    pub fn write_ok(&self) {
        self.publish(Status::Ok, String::new());
    }

    fn publish(&self, status: Status, message: String) {
        let version = VersionNumber::new();
        self.status.set(status.code());
        self.message.set(message);
        self.status.write_with_version(version);
        self.message.write_with_version(version);
    }

    pub fn status(&self) -> Status {
        Status::from_code(self.status.get()).unwrap_or(Status::Fault)
    }

    pub fn message(&self) -> String {
        self.message.get()
    }

    pub fn name(&self) -> &str {
        self.status.name()
    }

    pub fn message_path(&self) -> &str {
        self.message.name()
    }

    pub fn id(&self) -> ElementId {
        self.status.id()
    }

    pub fn version_number(&self) -> VersionNumber {
        self.status.version_number()
    }

    pub fn validity(&self) -> DataValidity {
        self.status.validity()
    }

    /// Set the validity of both parts for subsequent writes.
    pub fn set_data_validity(&self, validity: DataValidity) {
        self.status.set_data_validity(validity);
        self.message.set_data_validity(validity);
    }
}

/// Consuming side of a status, with or without message.
#[derive(Debug)]
pub struct StatusWithMessageInput {
    module: Module,
    label: String,
    status: PushInput<i32>,
    message: Option<PushInput<String>>,
}

impl StatusWithMessageInput {
    /// `description` names the status in generated messages; the status path
    /// is used when it is empty.
    pub fn new(module: &Module, name: &str, description: &str) -> PvResult<Self> {
        let status = module.push_input::<i32>(Decl::new(name).description(description))?;
        let label = if description.is_empty() {
            status.name().to_string()
        } else {
            description.to_string()
        };
        Ok(Self {
            module: module.clone(),
            label,
            status,
            message: None,
        })
    }

    /// Read messages from `name`, by default `<status>_message`.
    pub fn set_message_source(&mut self, name: Option<&str>) -> PvResult<()> {
        if self.message.is_some() {
            return Err(PvError::logic(format!(
                "'{}' already has a message source",
                self.status.name()
            )));
        }
        let name = match name {
            Some(name) => name.to_string(),
            None => message_name(self.status.name()),
        };
        self.message = Some(self.module.push_input::<String>(Decl::new(name))?);
        Ok(())
    }

    pub fn has_message_source(&self) -> bool {
        self.message.is_some()
    }

    pub fn status(&self) -> Status {
        Status::from_code(self.status.get()).unwrap_or(Status::Fault)
    }

    /// Current message. Generated from the status when there is no message
    /// source or the source sent an empty message for a non-OK status.
    pub fn message(&self) -> String {
        let status = self.status();
        if status == Status::Ok {
            return String::new();
        }
        match &self.message {
            Some(message) => {
                let text = message.get();
                if text.is_empty() {
                    self.generated_message(status)
                } else {
                    text
                }
            }
            None => self.generated_message(status),
        }
    }

    fn generated_message(&self, status: Status) -> String {
        format!("{} switched to {}", self.label, status)
    }

    pub fn name(&self) -> &str {
        self.status.name()
    }

    pub fn is_initialized(&self) -> bool {
        self.status.version_number().is_initialized()
            && self
                .message
                .as_ref()
                .is_none_or(|m| m.version_number().is_initialized())
    }

    pub fn message_path(&self) -> Option<&str> {
        self.message.as_ref().map(|m| m.name())
    }

    pub fn status_id(&self) -> ElementId {
        self.status.id()
    }

    pub fn message_id(&self) -> Option<ElementId> {
        self.message.as_ref().map(|m| m.id())
    }

    pub fn owns(&self, id: ElementId) -> bool {
        self.status.id() == id || self.message_id() == Some(id)
    }

    /// Decide whether `change` completes an update of this input.
    ///
    /// With a message source, status and message arrive separately; only the
    /// part which makes both versions equal counts.
    pub fn update(&self, change: ElementId) -> bool {
        if !self.owns(change) {
            return false;
        }
        match &self.message {
            None => true,
            Some(message) => message.version_number() == self.status.version_number(),
        }
    }
}

impl ReadAnyMember for StatusWithMessageInput {
    fn transfer_elements(&self) -> Vec<Arc<dyn TransferElement>> {
        let mut elements = self.status.transfer_elements();
        if let Some(message) = &self.message {
            elements.extend(message.transfer_elements());
        }
        elements
    }
}
