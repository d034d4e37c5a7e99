//! Waiting for the next change among a set of inputs.

use std::collections::BTreeMap;
use std::sync::Arc;

use pv_core::{ElementId, PvError, PvResult};

use crate::accessor::{Handle, Output, PushInput, TransferElement};
use crate::module::ModuleRuntime;
use crate::user_type::UserType;

/// Anything that contributes accessors to a [`ReadAnyGroup`].
pub trait ReadAnyMember {
    fn transfer_elements(&self) -> Vec<Arc<dyn TransferElement>>;
}

impl<T: UserType> ReadAnyMember for PushInput<T> {
    fn transfer_elements(&self) -> Vec<Arc<dyn TransferElement>> {
        vec![self.handle().element()]
    }
}

impl<T: UserType> ReadAnyMember for Output<T> {
    fn transfer_elements(&self) -> Vec<Arc<dyn TransferElement>> {
        vec![self.handle().element()]
    }
}

impl<T: UserType> ReadAnyMember for Handle<T> {
    fn transfer_elements(&self) -> Vec<Arc<dyn TransferElement>> {
        vec![self.element()]
    }
}

/// A set of accessors of one module, read in the order their updates arrive.
///
/// Only one group per module should be active: notifications for accessors
/// which are not members are consumed and dropped.
pub struct ReadAnyGroup {
    module: Arc<ModuleRuntime>,
    members: BTreeMap<ElementId, Arc<dyn TransferElement>>,
}

impl ReadAnyGroup {
    pub fn new(members: &[&dyn ReadAnyMember]) -> PvResult<Self> {
        let elements = members
            .iter()
            .flat_map(|m| m.transfer_elements())
            .collect();
        Self::from_elements(elements)
    }

    pub fn from_elements(elements: Vec<Arc<dyn TransferElement>>) -> PvResult<Self> {
        let module = match elements.first() {
            Some(first) => Arc::clone(first.module()),
            None => return Err(PvError::logic("ReadAnyGroup needs at least one element")),
        };
        let mut members = BTreeMap::new();
        for element in elements {
            if !Arc::ptr_eq(element.module(), &module) {
                return Err(PvError::logic(format!(
                    "ReadAnyGroup mixes accessors of '{}' and '{}'",
                    module.path(),
                    element.module().path()
                )));
            }
            members.insert(element.id(), element);
        }
        Ok(Self { module, members })
    }

    /// Add more accessors of the same module.
    pub fn add(&mut self, member: &dyn ReadAnyMember) -> PvResult<()> {
        for element in member.transfer_elements() {
            if !Arc::ptr_eq(element.module(), &self.module) {
                return Err(PvError::logic(format!(
                    "cannot add '{}' to a ReadAnyGroup of '{}'",
                    element.name(),
                    self.module.path()
                )));
            }
            self.members.insert(element.id(), element);
        }
        Ok(())
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.members.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Read the first value of every fed member that has not seen one yet.
    ///
    /// Blocks until all feeders have written at least once.
    pub fn read_initial_values(&self) -> PvResult<()> {
        for element in self.members.values() {
            if element.is_fed() && !element.version_number().is_initialized() {
                element.read()?;
            }
        }
        Ok(())
    }

    /// Block until any member changes; return its id.
    ///
    /// Notifications whose update was already consumed by a direct read are
    /// skipped.
    pub fn read_any(&self) -> PvResult<ElementId> {
        loop {
            let id = self.module.wait_notification()?;
            if self.read_member(id) {
                return Ok(id);
            }
        }
    }

    /// Process the next pending change without blocking.
    pub fn read_any_non_blocking(&self) -> Option<ElementId> {
        while let Some(id) = self.module.try_notification() {
            if self.read_member(id) {
                return Some(id);
            }
        }
        None
    }

    fn read_member(&self, id: ElementId) -> bool {
        match self.members.get(&id) {
            Some(element) => element.read_non_blocking(),
            None => {
                tracing::trace!(module = self.module.path(), %id, "notification for non-member dropped");
                false
            }
        }
    }
}

impl std::fmt::Debug for ReadAnyGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadAnyGroup")
            .field("module", &self.module.path())
            .field("members", &self.members.keys().collect::<Vec<_>>())
            .finish()
    }
}
