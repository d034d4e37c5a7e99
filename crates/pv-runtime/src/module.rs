//! Per-module runtime state.
//!
//! Every module owns one notification channel. Each value delivered to one of
//! its inputs enqueues the input's element id, so changes are handed to the
//! module's loop in strict arrival order.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use pv_core::{DataValidity, ElementId, PvError, PvResult, SystemTag};

use crate::accessor::TransferElement;

/// Runtime side of a module: notification queue, fault counter and the list of
/// inputs declared by the module.
pub struct ModuleRuntime {
    path: String,
    notify_tx: Sender<ElementId>,
    notify_rx: Receiver<ElementId>,
    shutdown: Receiver<()>,
    faults: AtomicUsize,
    inputs: Mutex<Vec<Arc<dyn TransferElement>>>,
}

impl ModuleRuntime {
    pub(crate) fn new(path: impl Into<String>, shutdown: Receiver<()>) -> Self {
        let (notify_tx, notify_rx) = unbounded();
        Self {
            path: path.into(),
            notify_tx,
            notify_rx,
            shutdown,
            faults: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Absolute path of the module.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Number of inputs currently carrying faulty data.
    pub fn fault_count(&self) -> usize {
        self.faults.load(Ordering::Acquire)
    }

    /// Module-wide validity: faulty while any input is faulty.
    pub fn validity(&self) -> DataValidity {
        if self.fault_count() > 0 {
            DataValidity::Faulty
        } else {
            DataValidity::Ok
        }
    }

    /// Inputs declared by this module, in declaration order.
    pub fn inputs(&self) -> Vec<Arc<dyn TransferElement>> {
        self.inputs.lock().clone()
    }

    pub(crate) fn register_input(&self, input: Arc<dyn TransferElement>) {
        self.inputs.lock().push(input);
    }

    pub(crate) fn notifier(&self) -> Sender<ElementId> {
        self.notify_tx.clone()
    }

    /// Track validity transitions of an input.
    pub(crate) fn validity_changed(&self, old: DataValidity, new: DataValidity) {
        match (old, new) {
            (DataValidity::Ok, DataValidity::Faulty) => {
                self.faults.fetch_add(1, Ordering::AcqRel);
            }
            (DataValidity::Faulty, DataValidity::Ok) => {
                let _ = self
                    .faults
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
            }
            _ => {}
        }
    }

    /// Block until the next notification arrives or the application shuts down.
    pub(crate) fn wait_notification(&self) -> PvResult<ElementId> {
        self.wait_on(&self.notify_rx)
    }

    pub(crate) fn try_notification(&self) -> Option<ElementId> {
        self.notify_rx.try_recv().ok()
    }

    /// Receive from `rx`, returning `PvError::Shutdown` once the application is
    /// shut down.
    pub(crate) fn wait_on<M>(&self, rx: &Receiver<M>) -> PvResult<M> {
        crossbeam_channel::select! {
            recv(rx) -> msg => msg.map_err(|_| PvError::Shutdown),
            recv(self.shutdown) -> _ => Err(PvError::Shutdown),
        }
    }
}

impl std::fmt::Debug for ModuleRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRuntime")
            .field("path", &self.path)
            .field("faults", &self.fault_count())
            .finish()
    }
}

/// Declaration of an accessor: name (relative or absolute), unit, description,
/// tags and element count.
#[derive(Debug, Clone)]
pub struct Decl {
    pub name: String,
    pub unit: String,
    pub description: String,
    pub tags: BTreeSet<String>,
    pub n_elements: usize,
}

impl Decl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit: String::new(),
            description: String::new(),
            tags: BTreeSet::new(),
            n_elements: 1,
        }
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn system_tag(self, tag: SystemTag) -> Self {
        self.tag(tag)
    }

    pub fn elements(mut self, n_elements: usize) -> Self {
        self.n_elements = n_elements;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_counter_tracks_transitions() {
        let (_tx, rx) = unbounded();
        let module = ModuleRuntime::new("/M", rx);
        assert_eq!(module.validity(), DataValidity::Ok);

        module.validity_changed(DataValidity::Ok, DataValidity::Faulty);
        module.validity_changed(DataValidity::Ok, DataValidity::Faulty);
        assert_eq!(module.fault_count(), 2);
        assert_eq!(module.validity(), DataValidity::Faulty);

        module.validity_changed(DataValidity::Faulty, DataValidity::Ok);
        module.validity_changed(DataValidity::Faulty, DataValidity::Faulty);
        assert_eq!(module.fault_count(), 1);

        module.validity_changed(DataValidity::Faulty, DataValidity::Ok);
        module.validity_changed(DataValidity::Faulty, DataValidity::Ok);
        assert_eq!(module.fault_count(), 0);
    }

    #[test]
    fn wait_returns_shutdown_when_sender_dropped() {
        let (tx, rx) = unbounded::<()>();
        let module = ModuleRuntime::new("/M", rx);
        drop(tx);
        assert_eq!(module.wait_notification(), Err(PvError::Shutdown));
    }

    #[test]
    fn decl_builder() {
        let decl = Decl::new("x")
            .unit("mA")
            .tag("HW")
            .system_tag(SystemTag::Internal)
            .elements(3);
        assert_eq!(decl.unit, "mA");
        assert!(decl.tags.contains("HW"));
        assert!(decl.tags.contains(SystemTag::Internal.as_str()));
        assert_eq!(decl.n_elements, 3);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn validity() -> impl Strategy<Value = DataValidity> {
        prop::sample::select(vec![DataValidity::Ok, DataValidity::Faulty])
    }

    proptest! {
        #[test]
        fn fault_count_follows_input_states(
            changes in prop::collection::vec((0usize..4, validity()), 0..40)
        ) {
            let (_tx, rx) = unbounded();
            let module = ModuleRuntime::new("/M", rx);
            let mut inputs = [DataValidity::Ok; 4];
            for (input, new) in changes {
                module.validity_changed(inputs[input], new);
                inputs[input] = new;
                let faulty = inputs.iter().filter(|v| **v == DataValidity::Faulty).count();
                prop_assert_eq!(module.fault_count(), faulty);
                prop_assert_eq!(module.validity() == DataValidity::Faulty, faulty > 0);
            }
        }
    }
}
