//! Fan-in: several feeders merged into one logical variable.
//!
//! A [`FanIn`] declares an output under a logical name. When the application
//! connects, every other feeder of that name is redirected to an internal
//! input `<name>/__FanInNode_<i>__` owned by the fan-in's module, and further
//! inputs can be requested by name. Whenever one of the inputs is read, the
//! aggregator function computes the new output value from the id of the input
//! that changed and the current values of all inputs.
//!
//! The output is first written once every input has received a value. If a
//! [`UserInputValidator`](crate::UserInputValidator) guards the inputs, the
//! write waits for its accept/reject decision instead of happening on read.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use pv_core::{DataValidity, ElementId, PvError, PvResult, SystemTag, VersionNumber};
use pv_runtime::{
    AccessorHook, Application, Decl, Handle, Module, Output, PushInput, ReadAnyMember,
    TransferElement, UserType,
};

/// Computes the merged value from the id of the changed input and the current
/// values of all inputs.
pub type Aggregator<T> = Box<dyn Fn(ElementId, &BTreeMap<ElementId, T>) -> T + Send + Sync>;

/// Stock aggregator: the output follows whichever input changed last.
pub fn fan_in_keep_last_value<T: UserType>(changed: ElementId, values: &BTreeMap<ElementId, T>) -> T {
    values.get(&changed).cloned().unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateType {
    PostRead,
    Accept,
    Reject,
}

#[derive(Debug, Default)]
struct FanInState {
    last_update: ElementId,
    has_validator: bool,
    n_initial_values_validated: usize,
}

struct FanInCore<T: UserType> {
    name: String,
    output: Handle<T>,
    aggregator: Aggregator<T>,
    inputs: OnceLock<Vec<PushInput<T>>>,
    index: OnceLock<BTreeMap<ElementId, usize>>,
    state: Mutex<FanInState>,
}

impl<T: UserType> FanInCore<T> {
    fn create_inputs(
        &self,
        app: &Application,
        module: &Module,
        n_elements: usize,
        additional: &[String],
        writeback: bool,
    ) -> PvResult<()> {
        let output = self.output.id();
        let feeders = app.with_model(|m| {
            m.feeders_of(&self.name)
                .into_iter()
                .filter(|f| m.variable(*f).is_some_and(|v| v.element != output))
                .collect::<Vec<_>>()
        });

        let mut names = Vec::with_capacity(feeders.len() + additional.len());
        for (index, feeder) in feeders.into_iter().enumerate() {
            let name = format!("{}/__FanInNode_{}__", self.name, index);
            app.with_model_mut(|m| m.set_variable_path(feeder, name.clone()))?;
            names.push(name);
        }
        names.extend(additional.iter().cloned());

        let mut inputs = Vec::with_capacity(names.len());
        for name in names {
            let decl = Decl::new(name)
                .elements(n_elements)
                .system_tag(SystemTag::Internal);
            let input = if writeback {
                module.push_input_wb::<T>(decl)?
            } else {
                module.push_input::<T>(decl)?
            };
            inputs.push(input);
        }
        tracing::debug!(fan_in = %self.name, inputs = inputs.len(), "fan-in inputs created");
        self.inputs
            .set(inputs)
            .map_err(|_| PvError::logic(format!("FanIn '{}': inputs created twice", self.name)))
    }

    fn prepare(self: &Arc<Self>) -> PvResult<()> {
        let inputs = self.inputs.get().ok_or_else(|| {
            PvError::logic(format!(
                "FanIn '{}': prepare() called before the application connected",
                self.name
            ))
        })?;
        self.index.get_or_init(|| {
            let hook: Arc<dyn AccessorHook> = Arc::new(TrackingHook {
                core: Arc::downgrade(self),
            });
            for input in inputs {
                input.handle().add_hook(Arc::clone(&hook));
            }
            inputs
                .iter()
                .enumerate()
                .map(|(i, input)| (input.id(), i))
                .collect()
        });
        Ok(())
    }

    fn process_update(&self, change: ElementId, kind: UpdateType) {
        let Some(inputs) = self.inputs.get() else {
            return;
        };
        let has_validator = {
            let mut state = self.state.lock();
            state.last_update = change;
            state.has_validator
        };

        let output_uninitialized = !self.output.version_number().is_initialized();
        if output_uninitialized
            && inputs
                .iter()
                .any(|input| !input.version_number().is_initialized())
        {
            tracing::trace!(fan_in = %self.name, %change, "waiting for initial values");
            return;
        }

        if kind != UpdateType::Accept {
            let values: BTreeMap<ElementId, T> =
                inputs.iter().map(|input| (input.id(), input.get())).collect();
            self.output.set((self.aggregator)(change, &values));
        }

        if output_uninitialized && has_validator && kind != UpdateType::PostRead {
            let mut state = self.state.lock();
            state.n_initial_values_validated += 1;
            if state.n_initial_values_validated < inputs.len() {
                return;
            }
        }

        if !has_validator || kind != UpdateType::PostRead {
            tracing::trace!(fan_in = %self.name, %change, ?kind, "fan-in output written");
            if let Err(err) = self.output.write() {
                tracing::warn!(fan_in = %self.name, %err, "fan-in output not written");
            }
        }
    }
}

struct TrackingHook<T: UserType> {
    core: Weak<FanInCore<T>>,
}

impl<T: UserType> TrackingHook<T> {
    fn forward(&self, id: ElementId, kind: UpdateType) {
        if let Some(core) = self.core.upgrade() {
            core.process_update(id, kind);
        }
    }
}

impl<T: UserType> AccessorHook for TrackingHook<T> {
    fn on_post_read(&self, id: ElementId) {
        self.forward(id, UpdateType::PostRead);
    }

    fn on_add_validator(&self, _id: ElementId) {
        if let Some(core) = self.core.upgrade() {
            core.state.lock().has_validator = true;
        }
    }

    fn on_accept(&self, id: ElementId) {
        self.forward(id, UpdateType::Accept);
    }

    fn on_reject(&self, id: ElementId) {
        self.forward(id, UpdateType::Reject);
    }
}

/// Several feeders merged into one variable. `WB` selects inputs with a
/// return channel to their feeders.
pub struct FanIn<T: UserType, const WB: bool = false> {
    core: Arc<FanInCore<T>>,
    output: Output<T>,
}

pub type ScalarFanIn<T> = FanIn<T, false>;
pub type ArrayFanIn<E> = FanIn<Vec<E>, false>;
pub type ScalarFanInWB<T> = FanIn<T, true>;
pub type ArrayFanInWB<E> = FanIn<Vec<E>, true>;

impl<T: UserType, const WB: bool> FanIn<T, WB> {
    /// Merge all feeders of `decl.name`.
    pub fn new<F>(owner: &Module, decl: Decl, aggregator: F) -> PvResult<Self>
    where
        F: Fn(ElementId, &BTreeMap<ElementId, T>) -> T + Send + Sync + 'static,
    {
        Self::with_additional_inputs(owner, decl, Vec::<String>::new(), aggregator)
    }

    /// Merge all feeders of `decl.name` plus one input for each of
    /// `additional` (names relative to `owner`).
    pub fn with_additional_inputs<I, S, F>(
        owner: &Module,
        decl: Decl,
        additional: I,
        aggregator: F,
    ) -> PvResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(ElementId, &BTreeMap<ElementId, T>) -> T + Send + Sync + 'static,
    {
        let n_elements = decl.n_elements;
        let additional: Vec<String> = additional.into_iter().map(Into::into).collect();
        let output = owner.output::<T>(decl)?;
        let core = Arc::new(FanInCore {
            name: output.name().to_string(),
            output: output.handle(),
            aggregator: Box::new(aggregator),
            inputs: OnceLock::new(),
            index: OnceLock::new(),
            state: Mutex::new(FanInState::default()),
        });

        let weak = Arc::downgrade(&core);
        let module = owner.clone();
        owner
            .app()
            .on_post_construct(Box::new(move |app: &Application| -> PvResult<()> {
                match weak.upgrade() {
                    Some(core) => core.create_inputs(app, &module, n_elements, &additional, WB),
                    None => Ok(()),
                }
            }))?;
        let weak = Arc::downgrade(&core);
        owner
            .app()
            .on_prepare(Box::new(move |_app: &Application| -> PvResult<()> {
                match weak.upgrade() {
                    Some(core) => core.prepare(),
                    None => Ok(()),
                }
            }))?;

        Ok(Self { core, output })
    }

    /// Install the tracking hooks and build the id index. Runs automatically
    /// at the end of connecting; calling it again has no effect.
    pub fn prepare(&self) -> PvResult<()> {
        self.core.prepare()
    }

    /// The internal input with the given id.
    pub fn input(&self, id: ElementId) -> PvResult<&PushInput<T>> {
        let index = self.index()?;
        let position = index.get(&id).copied().ok_or_else(|| {
            PvError::not_found(format!("input {} of FanIn '{}'", id, self.core.name))
        })?;
        self.inputs_slice()
            .get(position)
            .ok_or_else(|| PvError::not_found(format!("input {} of FanIn '{}'", id, self.core.name)))
    }

    pub fn has_input(&self, id: ElementId) -> PvResult<bool> {
        Ok(self.index()?.contains_key(&id))
    }

    /// All internal inputs, in creation order.
    pub fn inputs(&self) -> PvResult<std::slice::Iter<'_, PushInput<T>>> {
        self.prepare()?;
        Ok(self.inputs_slice().iter())
    }

    /// Take over another fan-in, dropping this one.
    pub fn replace(&mut self, other: FanIn<T, WB>) {
        *self = other;
    }

    fn index(&self) -> PvResult<&BTreeMap<ElementId, usize>> {
        self.core.index.get().ok_or_else(|| {
            PvError::logic(format!(
                "FanIn '{}': input lookup before prepare()",
                self.core.name
            ))
        })
    }

    fn inputs_slice(&self) -> &[PushInput<T>] {
        self.core.inputs.get().map(Vec::as_slice).unwrap_or_default()
    }

    /// Id of the input which triggered the latest update.
    pub fn last_update(&self) -> ElementId {
        self.core.state.lock().last_update
    }

    pub fn id(&self) -> ElementId {
        self.output.id()
    }

    pub fn name(&self) -> &str {
        self.output.name()
    }

    pub fn get(&self) -> T {
        self.output.get()
    }

    pub fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.output.with_value(f)
    }

    pub fn version_number(&self) -> VersionNumber {
        self.output.version_number()
    }

    pub fn validity(&self) -> DataValidity {
        self.output.validity()
    }

    pub fn handle(&self) -> Handle<T> {
        self.output.handle()
    }
}

impl<T: UserType, const WB: bool> ReadAnyMember for FanIn<T, WB> {
    fn transfer_elements(&self) -> Vec<Arc<dyn TransferElement>> {
        self.inputs_slice()
            .iter()
            .map(|input| input.handle().element())
            .collect()
    }
}

impl<T: UserType, const WB: bool> std::fmt::Debug for FanIn<T, WB> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanIn")
            .field("name", &self.core.name)
            .field("inputs", &self.inputs_slice().len())
            .field("writeback", &WB)
            .finish()
    }
}
