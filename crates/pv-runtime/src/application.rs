//! Application: declaration, connection and shutdown.
//!
//! Modules and their accessors are declared first. Components which need to
//! know the complete model (e.g. a fan-in looking for all feeders of a name)
//! register a post-construct hook. [`Application::connect`] runs those hooks,
//! resolves the networks, wires every feeder to its consumers and finally runs
//! the prepare hooks. After that the declaration is frozen.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use pv_core::{DataValidity, ElementId, PvError, PvResult};
use pv_graph::{Direction, Model, ModuleId, ModuleKind, Network, VariableId, VariableSpec};

use crate::accessor::{AccessorKind, AccessorShared, Endpoint, Output, PushInput};
use crate::module::{Decl, ModuleRuntime};
use crate::read_any::ReadAnyGroup;
use crate::user_type::UserType;

/// Hook run by [`Application::connect`].
pub type ConnectHook = Box<dyn FnOnce(&Application) -> PvResult<()> + Send>;

/// Lifecycle phase of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Declaring,
    Connected,
    ShutDown,
}

struct AppInner {
    name: String,
    model: Mutex<Model>,
    root: Arc<ModuleRuntime>,
    endpoints: Mutex<BTreeMap<ElementId, Arc<dyn Endpoint>>>,
    post_construct: Mutex<Vec<ConnectHook>>,
    prepare: Mutex<Vec<ConnectHook>>,
    phase: Mutex<Phase>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,
}

/// Shared handle to an application. Cloning yields another handle to the same
/// application.
#[derive(Clone)]
pub struct Application {
    inner: Arc<AppInner>,
}

impl Application {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let (shutdown_tx, shutdown_rx) = unbounded();
        let root = Arc::new(ModuleRuntime::new("/", shutdown_rx.clone()));
        Self {
            inner: Arc::new(AppInner {
                model: Mutex::new(Model::new(name.clone())),
                name,
                root,
                endpoints: Mutex::new(BTreeMap::new()),
                post_construct: Mutex::new(Vec::new()),
                prepare: Mutex::new(Vec::new()),
                phase: Mutex::new(Phase::Declaring),
                shutdown_tx: Mutex::new(Some(shutdown_tx)),
                shutdown_rx,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The root group.
    pub fn root(&self) -> Module {
        let id = self.inner.model.lock().root();
        Module {
            app: self.clone(),
            id,
            runtime: Arc::clone(&self.inner.root),
        }
    }

    pub fn phase(&self) -> Phase {
        *self.inner.phase.lock()
    }

    /// Run `f` on the model. Do not call back into the application from `f`.
    pub fn with_model<R>(&self, f: impl FnOnce(&Model) -> R) -> R {
        f(&self.inner.model.lock())
    }

    /// Run `f` on the mutable model. Do not call back into the application
    /// from `f`.
    pub fn with_model_mut<R>(&self, f: impl FnOnce(&mut Model) -> R) -> R {
        f(&mut self.inner.model.lock())
    }

    /// Register a hook run at the start of [`connect`](Self::connect), before
    /// networks are resolved.
    pub fn on_post_construct(&self, hook: ConnectHook) -> PvResult<()> {
        self.ensure_declaring("register a post-construct hook")?;
        self.inner.post_construct.lock().push(hook);
        Ok(())
    }

    /// Register a hook run at the end of [`connect`](Self::connect), after all
    /// networks are wired.
    pub fn on_prepare(&self, hook: ConnectHook) -> PvResult<()> {
        self.ensure_declaring("register a prepare hook")?;
        self.inner.prepare.lock().push(hook);
        Ok(())
    }

    /// Resolve and wire all networks.
    pub fn connect(&self) -> PvResult<Vec<Network>> {
        self.ensure_declaring("connect")?;

        // Hooks may declare further variables and register further hooks.
        loop {
            let hooks = std::mem::take(&mut *self.inner.post_construct.lock());
            if hooks.is_empty() {
                break;
            }
            for hook in hooks {
                hook(self)?;
            }
        }

        let networks = self.with_model_mut(|m| m.build_networks())?;
        for network in &networks {
            let Some(feeder) = network.feeder else {
                tracing::debug!(path = %network.path, "network has no feeder");
                continue;
            };
            let feeder = self.endpoint_of(feeder)?;
            for consumer in &network.consumers {
                feeder.subscribe(self.endpoint_of(*consumer)?)?;
            }
        }
        *self.inner.phase.lock() = Phase::Connected;

        loop {
            let hooks = std::mem::take(&mut *self.inner.prepare.lock());
            if hooks.is_empty() {
                break;
            }
            for hook in hooks {
                hook(self)?;
            }
        }

        tracing::info!(app = %self.inner.name, networks = networks.len(), "application connected");
        Ok(networks)
    }

    /// Wake every blocked read with [`PvError::Shutdown`].
    pub fn shutdown(&self) {
        if self.inner.shutdown_tx.lock().take().is_some() {
            *self.inner.phase.lock() = Phase::ShutDown;
            tracing::info!(app = %self.inner.name, "application shut down");
        }
    }

    /// Run a module loop on its own thread.
    pub fn spawn<F>(&self, name: &str, body: F) -> PvResult<JoinHandle<PvResult<()>>>
    where
        F: FnOnce() -> PvResult<()> + Send + 'static,
    {
        std::thread::Builder::new()
            .name(name.to_string())
            .spawn(body)
            .map_err(|e| PvError::logic(format!("cannot spawn thread '{}': {}", name, e)))
    }

    fn ensure_declaring(&self, what: &str) -> PvResult<()> {
        match self.phase() {
            Phase::Declaring => Ok(()),
            phase => Err(PvError::logic(format!(
                "cannot {} in phase {:?}",
                what, phase
            ))),
        }
    }

    fn endpoint_of(&self, var: VariableId) -> PvResult<Arc<dyn Endpoint>> {
        let element = self
            .with_model(|m| m.variable(var).map(|v| v.element))
            .ok_or_else(|| PvError::not_found("variable id"))?;
        self.inner
            .endpoints
            .lock()
            .get(&element)
            .cloned()
            .ok_or_else(|| PvError::not_found(format!("accessor for element {}", element)))
    }

    fn register_endpoint(&self, endpoint: Arc<dyn Endpoint>) {
        self.inner.endpoints.lock().insert(endpoint.id(), endpoint);
    }

    fn module_runtime(&self, path: &str) -> Arc<ModuleRuntime> {
        Arc::new(ModuleRuntime::new(path, self.inner.shutdown_rx.clone()))
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("name", &self.inner.name)
            .field("phase", &self.phase())
            .finish()
    }
}

/// Handle to a module of an application.
#[derive(Clone)]
pub struct Module {
    app: Application,
    id: ModuleId,
    runtime: Arc<ModuleRuntime>,
}

impl Module {
    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn app(&self) -> &Application {
        &self.app
    }

    pub fn path(&self) -> &str {
        self.runtime.path()
    }

    pub fn runtime(&self) -> &Arc<ModuleRuntime> {
        &self.runtime
    }

    pub fn validity(&self) -> DataValidity {
        self.runtime.validity()
    }

    /// Add a pure grouping level.
    pub fn add_group(&self, name: &str) -> PvResult<Module> {
        self.add_child(name, "", ModuleKind::Group)
    }

    /// Add a module running its own loop.
    pub fn add_module(&self, name: &str, description: &str) -> PvResult<Module> {
        self.add_child(name, description, ModuleKind::Application)
    }

    fn add_child(&self, name: &str, description: &str, kind: ModuleKind) -> PvResult<Module> {
        self.app.ensure_declaring("add modules")?;
        let (id, path) = self.app.with_model_mut(|m| {
            let id = m.add_module_with_description(self.id, name, description, kind)?;
            let path = m.module_path(id).unwrap_or_default().to_string();
            Ok::<_, pv_graph::GraphError>((id, path))
        })?;
        tracing::debug!(module = %path, "module declared");
        Ok(Module {
            app: self.app.clone(),
            id,
            runtime: self.app.module_runtime(&path),
        })
    }

    pub fn output<T: UserType>(&self, decl: Decl) -> PvResult<Output<T>> {
        self.declare(decl, AccessorKind::Output).map(Output::from_shared)
    }

    pub fn push_input<T: UserType>(&self, decl: Decl) -> PvResult<PushInput<T>> {
        self.declare(decl, AccessorKind::Input).map(PushInput::from_shared)
    }

    /// Input with a return channel to its feeder.
    pub fn push_input_wb<T: UserType>(&self, decl: Decl) -> PvResult<PushInput<T>> {
        self.declare(decl, AccessorKind::InputWb).map(PushInput::from_shared)
    }

    /// A group of all inputs declared by this module so far.
    pub fn read_any_group(&self) -> PvResult<ReadAnyGroup> {
        ReadAnyGroup::from_elements(self.runtime.inputs())
    }

    fn declare<T: UserType>(
        &self,
        decl: Decl,
        kind: AccessorKind,
    ) -> PvResult<Arc<AccessorShared<T>>> {
        self.app.ensure_declaring("declare accessors")?;
        if !T::is_array() && decl.n_elements != 1 {
            return Err(PvError::logic(format!(
                "scalar accessor '{}' declared with {} elements",
                decl.name, decl.n_elements
            )));
        }

        let direction = match kind {
            AccessorKind::Output => Direction::Feeding,
            AccessorKind::Input | AccessorKind::InputWb => Direction::Consuming,
        };
        let n_elements = decl.n_elements;
        let spec = VariableSpec::new(decl.name, direction, std::any::type_name::<T>())
            .with_elements(n_elements)
            .with_unit(decl.unit)
            .with_description(decl.description)
            .with_tags(decl.tags)
            .with_writeback(kind == AccessorKind::InputWb);
        let element = spec.element;

        let path = self.app.with_model_mut(|m| {
            let var = m.add_variable(self.id, spec)?;
            Ok::<_, pv_graph::GraphError>(
                m.variable(var).map(|v| v.path.clone()).unwrap_or_default(),
            )
        })?;

        let shared = Arc::new(AccessorShared::<T>::new(
            element,
            path,
            kind,
            n_elements,
            Arc::clone(&self.runtime),
        ));
        self.app.register_endpoint(shared.clone());
        if kind.is_input() {
            self.runtime.register_input(shared.clone());
        }
        tracing::trace!(module = %self.path(), element = %element, ?kind, "accessor declared");
        Ok(shared)
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("path", &self.path())
            .finish()
    }
}
