//! Push-type accessors.
//!
//! An accessor is the endpoint of a variable network inside a module. The
//! feeding side is an [`Output`], the consuming side a [`PushInput`]. Both are
//! thin handles around one shared core holding the current value buffer, an
//! inbox for incoming updates and the list of subscribers a write is delivered
//! to.
//!
//! Accessors are deliberately not `Clone`: one accessor is one network
//! endpoint with one identity. Code that needs to look at an accessor from
//! elsewhere (validation predicates, aggregators) takes a [`Handle`].

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use pv_core::{DataValidity, ElementId, PvError, PvResult, VersionNumber};

use crate::module::ModuleRuntime;
use crate::user_type::UserType;

/// Role of an accessor within its network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessorKind {
    /// Feeding side.
    Output,
    /// Consuming side.
    Input,
    /// Consuming side with a return channel to the feeder.
    InputWb,
}

impl AccessorKind {
    pub fn is_input(self) -> bool {
        !matches!(self, AccessorKind::Output)
    }
}

/// One update travelling through a network.
#[derive(Debug, Clone, PartialEq)]
pub struct Update<T> {
    pub value: T,
    pub version: VersionNumber,
    pub validity: DataValidity,
}

/// Observer attached to an accessor.
///
/// `on_post_read` fires after a read placed a new value into the buffer. The
/// validation hooks fire when a validator registers the accessor and when it
/// accepts or rejects the current value. Hooks are never called while the
/// accessor's internal locks are held.
pub trait AccessorHook: Send + Sync {
    fn on_post_read(&self, _id: ElementId) {}
    fn on_add_validator(&self, _id: ElementId) {}
    fn on_accept(&self, _id: ElementId) {}
    fn on_reject(&self, _id: ElementId) {}
}

/// Validation events announced to the hooks of an accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    AddValidator,
    Accept,
    Reject,
}

/// Type-erased view of an accessor.
pub trait TransferElement: Send + Sync {
    fn id(&self) -> ElementId;

    /// Absolute path the accessor was declared with.
    fn name(&self) -> &str;

    fn version_number(&self) -> VersionNumber;

    fn validity(&self) -> DataValidity;

    /// True once the accessor has been connected to a feeder.
    fn is_fed(&self) -> bool;

    /// Runtime of the owning module.
    fn module(&self) -> &Arc<ModuleRuntime>;

    /// Take the next queued update, if any. Returns true if a value was read.
    fn read_non_blocking(&self) -> bool;

    /// Block until an update arrives.
    fn read(&self) -> PvResult<()>;

    fn add_hook(&self, hook: Arc<dyn AccessorHook>);
}

/// Wiring interface used by the application while connecting networks.
pub(crate) trait Endpoint: TransferElement {
    fn kind(&self) -> AccessorKind;

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Deliver all future writes of `self` to `consumer`.
    fn subscribe(&self, consumer: Arc<dyn Endpoint>) -> PvResult<()>;
}

struct Buffer<T> {
    value: T,
    version: VersionNumber,
    validity: DataValidity,
    /// Validity set explicitly on an output, combined with the module's.
    own_validity: DataValidity,
}

struct Subscriber<T> {
    tx: Sender<Update<T>>,
    notify: Sender<ElementId>,
    target: ElementId,
}

pub(crate) struct AccessorShared<T: UserType> {
    id: ElementId,
    name: String,
    kind: AccessorKind,
    n_elements: usize,
    module: Arc<ModuleRuntime>,
    buffer: Mutex<Buffer<T>>,
    inbox_tx: Sender<Update<T>>,
    inbox_rx: Receiver<Update<T>>,
    subscribers: Mutex<Vec<Subscriber<T>>>,
    hooks: Mutex<Vec<Arc<dyn AccessorHook>>>,
    fed: AtomicBool,
}

impl<T: UserType> AccessorShared<T> {
    pub(crate) fn new(
        id: ElementId,
        name: String,
        kind: AccessorKind,
        n_elements: usize,
        module: Arc<ModuleRuntime>,
    ) -> Self {
        let (inbox_tx, inbox_rx) = unbounded();
        Self {
            id,
            name,
            kind,
            n_elements,
            module,
            buffer: Mutex::new(Buffer {
                value: T::with_elements(n_elements),
                version: VersionNumber::UNINITIALIZED,
                validity: DataValidity::Ok,
                own_validity: DataValidity::Ok,
            }),
            inbox_tx,
            inbox_rx,
            subscribers: Mutex::new(Vec::new()),
            hooks: Mutex::new(Vec::new()),
            fed: AtomicBool::new(false),
        }
    }

    fn get(&self) -> T {
        self.buffer.lock().value.clone()
    }

    fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.buffer.lock().value)
    }

    fn set(&self, value: T) {
        self.buffer.lock().value = value;
    }

    fn writeable(&self) -> bool {
        matches!(self.kind, AccessorKind::Output | AccessorKind::InputWb)
    }

    /// Send the buffer content to all subscribers, stamped with `version`.
    fn publish(&self, version: VersionNumber) -> PvResult<()> {
        if !self.writeable() {
            return Err(PvError::logic(format!(
                "accessor '{}' has no return channel and cannot be written",
                self.name
            )));
        }
        let module_validity = self.module.validity();
        let (value, validity) = {
            let mut buf = self.buffer.lock();
            let validity = if module_validity.is_ok() && buf.own_validity.is_ok() {
                DataValidity::Ok
            } else {
                DataValidity::Faulty
            };
            buf.version = version;
            if self.kind == AccessorKind::Output {
                buf.validity = validity;
            }
            (buf.value.clone(), validity)
        };
        let subscribers = self.subscribers.lock();
        for sub in subscribers.iter() {
            let update = Update {
                value: value.clone(),
                version,
                validity,
            };
            if sub.tx.send(update).is_err() || sub.notify.send(sub.target).is_err() {
                tracing::trace!(source = %self.name, target = %sub.target, "subscriber gone");
            }
        }
        Ok(())
    }

    fn apply(&self, update: Update<T>) {
        let old_validity = {
            let mut buf = self.buffer.lock();
            let old = buf.validity;
            buf.value = update.value;
            buf.version = update.version;
            buf.validity = update.validity;
            old
        };
        if self.kind.is_input() {
            self.module.validity_changed(old_validity, update.validity);
        }
        for hook in self.hooks_snapshot() {
            hook.on_post_read(self.id);
        }
    }

    fn hooks_snapshot(&self) -> Vec<Arc<dyn AccessorHook>> {
        self.hooks.lock().clone()
    }

    fn announce(&self, event: HookEvent) {
        for hook in self.hooks_snapshot() {
            match event {
                HookEvent::AddValidator => hook.on_add_validator(self.id),
                HookEvent::Accept => hook.on_accept(self.id),
                HookEvent::Reject => hook.on_reject(self.id),
            }
        }
    }

    /// Discard everything queued and apply only the newest update.
    fn read_latest(&self) -> bool {
        let mut newest = None;
        while let Ok(update) = self.inbox_rx.try_recv() {
            newest = Some(update);
        }
        match newest {
            Some(update) => {
                self.apply(update);
                true
            }
            None => false,
        }
    }
}

impl<T: UserType> TransferElement for AccessorShared<T> {
    fn id(&self) -> ElementId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn version_number(&self) -> VersionNumber {
        self.buffer.lock().version
    }

    fn validity(&self) -> DataValidity {
        self.buffer.lock().validity
    }

    fn is_fed(&self) -> bool {
        self.fed.load(Ordering::Acquire)
    }

    fn module(&self) -> &Arc<ModuleRuntime> {
        &self.module
    }

    fn read_non_blocking(&self) -> bool {
        match self.inbox_rx.try_recv() {
            Ok(update) => {
                self.apply(update);
                true
            }
            Err(_) => false,
        }
    }

    fn read(&self) -> PvResult<()> {
        let update = self.module.wait_on(&self.inbox_rx)?;
        self.apply(update);
        Ok(())
    }

    fn add_hook(&self, hook: Arc<dyn AccessorHook>) {
        self.hooks.lock().push(hook);
    }
}

impl<T: UserType> Endpoint for AccessorShared<T> {
    fn kind(&self) -> AccessorKind {
        self.kind
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn subscribe(&self, consumer: Arc<dyn Endpoint>) -> PvResult<()> {
        let consumer_name = consumer.name().to_string();
        let consumer = consumer
            .as_any()
            .downcast::<AccessorShared<T>>()
            .map_err(|_| PvError::TypeMismatch {
                path: consumer_name,
                expected: std::any::type_name::<T>(),
                actual: "a different value type",
            })?;

        self.subscribers.lock().push(Subscriber {
            tx: consumer.inbox_tx.clone(),
            notify: consumer.module.notifier(),
            target: consumer.id,
        });
        consumer.fed.store(true, Ordering::Release);

        if consumer.kind == AccessorKind::InputWb {
            consumer.subscribers.lock().push(Subscriber {
                tx: self.inbox_tx.clone(),
                notify: self.module.notifier(),
                target: self.id,
            });
        }
        Ok(())
    }
}

/// Cloneable reference to an accessor.
///
/// Gives access to the value and validation hooks of an accessor owned by
/// someone else, e.g. inside a validation predicate.
pub struct Handle<T: UserType> {
    shared: Arc<AccessorShared<T>>,
}

impl<T: UserType> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: UserType> std::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .finish()
    }
}

impl<T: UserType> Handle<T> {
    pub fn id(&self) -> ElementId {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn n_elements(&self) -> usize {
        self.shared.n_elements
    }

    /// Role of the accessor the handle refers to.
    pub fn kind(&self) -> AccessorKind {
        self.shared.kind
    }

    pub fn get(&self) -> T {
        self.shared.get()
    }

    pub fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.shared.with_value(f)
    }

    /// Overwrite the local buffer without publishing.
    pub fn set(&self, value: T) {
        self.shared.set(value);
    }

    pub fn is_writeable(&self) -> bool {
        self.shared.writeable()
    }

    /// Publish the buffer with a new version number.
    pub fn write(&self) -> PvResult<()> {
        self.shared.publish(VersionNumber::new())
    }

    pub fn write_with_version(&self, version: VersionNumber) -> PvResult<()> {
        self.shared.publish(version)
    }

    pub fn version_number(&self) -> VersionNumber {
        TransferElement::version_number(&*self.shared)
    }

    pub fn validity(&self) -> DataValidity {
        TransferElement::validity(&*self.shared)
    }

    pub fn add_hook(&self, hook: Arc<dyn AccessorHook>) {
        self.shared.add_hook(hook);
    }

    /// Forward a validation event to the hooks of the accessor.
    pub fn announce(&self, event: HookEvent) {
        self.shared.announce(event);
    }

    pub fn element(&self) -> Arc<dyn TransferElement> {
        self.shared.clone()
    }
}

/// Feeding accessor.
pub struct Output<T: UserType> {
    shared: Arc<AccessorShared<T>>,
}

impl<T: UserType> Output<T> {
    pub(crate) fn from_shared(shared: Arc<AccessorShared<T>>) -> Self {
        Self { shared }
    }

    pub fn id(&self) -> ElementId {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn n_elements(&self) -> usize {
        self.shared.n_elements
    }

    pub fn get(&self) -> T {
        self.shared.get()
    }

    pub fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.shared.with_value(f)
    }

    pub fn set(&self, value: T) {
        self.shared.set(value);
    }

    /// Publish the current value with a new version number.
    pub fn write(&self) {
        self.write_with_version(VersionNumber::new());
    }

    /// Publish the current value with the given version number.
    pub fn write_with_version(&self, version: VersionNumber) {
        // outputs are always writeable
        let _ = self.shared.publish(version);
    }

    /// Mark the data of this output faulty (or ok again) for subsequent
    /// writes, independent of the module's own validity.
    pub fn set_data_validity(&self, validity: DataValidity) {
        self.shared.buffer.lock().own_validity = validity;
    }

    pub fn set_and_write(&self, value: T) {
        self.set(value);
        self.write();
    }

    /// Write only if the value differs from the current one or nothing has
    /// been written yet.
    pub fn write_if_different(&self, value: T) {
        let unchanged = self.shared.with_value(|v| *v == value)
            && self.version_number().is_initialized();
        if !unchanged {
            self.set_and_write(value);
        }
    }

    pub fn version_number(&self) -> VersionNumber {
        TransferElement::version_number(&*self.shared)
    }

    pub fn validity(&self) -> DataValidity {
        TransferElement::validity(&*self.shared)
    }

    /// Take a value written back by a consumer with a return channel.
    pub fn read_non_blocking(&self) -> bool {
        TransferElement::read_non_blocking(&*self.shared)
    }

    pub fn handle(&self) -> Handle<T> {
        Handle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: UserType> std::fmt::Debug for Output<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Output")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .finish()
    }
}

/// Consuming accessor fed through a push network.
pub struct PushInput<T: UserType> {
    shared: Arc<AccessorShared<T>>,
}

impl<T: UserType> PushInput<T> {
    pub(crate) fn from_shared(shared: Arc<AccessorShared<T>>) -> Self {
        Self { shared }
    }

    pub fn id(&self) -> ElementId {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn n_elements(&self) -> usize {
        self.shared.n_elements
    }

    pub fn get(&self) -> T {
        self.shared.get()
    }

    pub fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.shared.with_value(f)
    }

    pub fn set(&self, value: T) {
        self.shared.set(value);
    }

    /// Block until the next update arrives.
    pub fn read(&self) -> PvResult<()> {
        TransferElement::read(&*self.shared)
    }

    pub fn read_non_blocking(&self) -> bool {
        TransferElement::read_non_blocking(&*self.shared)
    }

    /// Skip to the newest queued update.
    pub fn read_latest(&self) -> bool {
        self.shared.read_latest()
    }

    /// True for inputs with a return channel.
    pub fn is_writeable(&self) -> bool {
        self.shared.writeable()
    }

    /// Send the current value back to the feeder. Only inputs with a return
    /// channel can be written.
    pub fn write(&self) -> PvResult<()> {
        self.shared.publish(VersionNumber::new())
    }

    pub fn is_fed(&self) -> bool {
        TransferElement::is_fed(&*self.shared)
    }

    pub fn version_number(&self) -> VersionNumber {
        TransferElement::version_number(&*self.shared)
    }

    pub fn validity(&self) -> DataValidity {
        TransferElement::validity(&*self.shared)
    }

    pub fn handle(&self) -> Handle<T> {
        Handle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: UserType> std::fmt::Debug for PushInput<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushInput")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("kind", &self.shared.kind)
            .finish()
    }
}
