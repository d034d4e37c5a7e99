//! Validation of values entered by users.
//!
//! A [`UserInputValidator`] holds a list of validators, each a predicate with
//! an error message, registered for one or more inputs. When one of those
//! inputs changes, every validator registered for it is evaluated in
//! registration order. The first failing validator reports its message and
//! the input is reverted to the last accepted value (or its fallback, if no
//! value has been accepted yet). Inputs with a return channel publish the
//! reverted value back to their feeder.
//!
//! ```
//! use pv_modules::UserInputValidator;
//! use pv_runtime::{Application, Decl};
//!
//! let app = Application::new("demo");
//! let panel = app.root().add_module("Panel", "").unwrap();
//! let m = app.root().add_module("Heater", "").unwrap();
//! let out = panel.output::<i32>(Decl::new("/setpoint")).unwrap();
//! let setpoint = m.push_input_wb::<i32>(Decl::new("/setpoint")).unwrap();
//! app.connect().unwrap();
//!
//! let mut validator = UserInputValidator::new(&m);
//! let value = setpoint.handle();
//! validator
//!     .add("setpoint must stay below 100", move || value.get() < 100, &[&setpoint])
//!     .unwrap();
//! validator.set_fallback(&setpoint, 20).unwrap();
//!
//! out.set_and_write(150);
//! assert!(setpoint.read_non_blocking());
//! assert!(validator.validate(setpoint.id()));
//! assert_eq!(setpoint.get(), 20);
//! ```

use std::any::Any;
use std::collections::BTreeMap;

use pv_core::{ElementId, PvError, PvResult, SystemTag};
use pv_runtime::{AccessorKind, Application, Handle, HookEvent, Module, PushInput, UserType};

use crate::history::History;

/// Entries kept per unit of history depth.
const HISTORY_PER_DEPTH: usize = 3;

/// Receives the message of a failed validator.
pub type ErrorFunction = Box<dyn FnMut(&str) + Send>;

/// Accessors a validator can guard. Only push-type inputs are accepted at
/// registration; a handle to an output is refused.
pub trait Validatable {
    type Value: UserType;

    fn validation_handle(&self) -> Handle<Self::Value>;
}

impl<T: UserType> Validatable for PushInput<T> {
    type Value = T;

    fn validation_handle(&self) -> Handle<T> {
        self.handle()
    }
}

impl<T: UserType> Validatable for Handle<T> {
    type Value = T;

    fn validation_handle(&self) -> Handle<T> {
        self.clone()
    }
}

/// Type-erased form of [`Validatable`], used to register accessors of
/// different value types with one validator.
pub trait Guarded {
    fn guarded_id(&self) -> ElementId;

    fn guarded_name(&self) -> String;

    fn guarded_kind(&self) -> AccessorKind;

    fn track(&self, history_capacity: usize) -> Box<dyn TrackedVariable>;
}

impl<V: Validatable> Guarded for V {
    fn guarded_id(&self) -> ElementId {
        self.validation_handle().id()
    }

    fn guarded_name(&self) -> String {
        self.validation_handle().name().to_string()
    }

    fn guarded_kind(&self) -> AccessorKind {
        self.validation_handle().kind()
    }

    fn track(&self, history_capacity: usize) -> Box<dyn TrackedVariable> {
        Box::new(Variable::new(self.validation_handle(), history_capacity))
    }
}

/// A guarded accessor with its accepted history.
pub trait TrackedVariable: Send {
    fn accept(&mut self);

    fn reject(&mut self);

    fn announce(&self, event: HookEvent);

    fn set_history_capacity(&mut self, capacity: usize);

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct Variable<T: UserType> {
    accessor: Handle<T>,
    history: History<T>,
    fallback: T,
}

impl<T: UserType> Variable<T> {
    fn new(accessor: Handle<T>, history_capacity: usize) -> Self {
        let fallback = T::with_elements(accessor.n_elements());
        Self {
            accessor,
            history: History::with_capacity(history_capacity),
            fallback,
        }
    }
}

impl<T: UserType> TrackedVariable for Variable<T> {
    fn accept(&mut self) {
        self.history.push(self.accessor.get());
        self.accessor.announce(HookEvent::Accept);
    }

    fn reject(&mut self) {
        let value = self
            .history
            .back()
            .cloned()
            .unwrap_or_else(|| self.fallback.clone());
        self.accessor.set(value);
        self.accessor.announce(HookEvent::Reject);
        if self.accessor.is_writeable() {
            if let Err(err) = self.accessor.write() {
                tracing::warn!(target: "UserInputValidator", accessor = self.accessor.name(), %err, "reverted value not written back");
            }
        }
    }

    fn announce(&self, event: HookEvent) {
        self.accessor.announce(event);
    }

    fn set_history_capacity(&mut self, capacity: usize) {
        self.history.set_capacity(capacity);
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct Validator {
    message: String,
    is_valid: Box<dyn Fn() -> bool + Send>,
}

/// Checks inputs against user supplied predicates and reverts invalid values.
pub struct UserInputValidator {
    app: Application,
    validators: Vec<Validator>,
    by_accessor: BTreeMap<ElementId, Vec<usize>>,
    variables: BTreeMap<ElementId, Box<dyn TrackedVariable>>,
    history_capacity: usize,
    error_fn: ErrorFunction,
}

impl UserInputValidator {
    /// A validator for inputs of `module`'s application.
    pub fn new(module: &Module) -> Self {
        Self {
            app: module.app().clone(),
            validators: Vec::new(),
            by_accessor: BTreeMap::new(),
            variables: BTreeMap::new(),
            history_capacity: HISTORY_PER_DEPTH,
            error_fn: Box::new(|message: &str| {
                tracing::warn!(target: "UserInputValidator", "{}", message);
            }),
        }
    }

    /// Register a predicate for `accessors`. `message` is reported whenever
    /// the predicate fails.
    pub fn add<F>(&mut self, message: impl Into<String>, is_valid: F, accessors: &[&dyn Guarded]) -> PvResult<()>
    where
        F: Fn() -> bool + Send + 'static,
    {
        let message = message.into();
        if accessors.is_empty() {
            return Err(PvError::logic(format!(
                "validator '{}' needs at least one accessor",
                message
            )));
        }
        for accessor in accessors {
            check_push_input(*accessor)?;
        }
        let index = self.validators.len();
        self.validators.push(Validator {
            message,
            is_valid: Box::new(is_valid),
        });
        for accessor in accessors {
            self.register(*accessor, index)?;
        }
        Ok(())
    }

    /// Like [`add`](Self::add), for any collection of accessors of one type,
    /// e.g. the inputs of a fan-in.
    pub fn add_all<'a, I, V, F>(&mut self, message: impl Into<String>, is_valid: F, accessors: I) -> PvResult<()>
    where
        I: IntoIterator<Item = &'a V>,
        V: Guarded + 'a,
        F: Fn() -> bool + Send + 'static,
    {
        let accessors: Vec<&dyn Guarded> = accessors.into_iter().map(|a| a as &dyn Guarded).collect();
        self.add(message, is_valid, &accessors)
    }

    /// Value used when a value is rejected before any value was accepted.
    pub fn set_fallback<A: Validatable>(&mut self, accessor: &A, value: A::Value) -> PvResult<()> {
        let handle = accessor.validation_handle();
        if value.n_elements() != handle.n_elements() {
            return Err(PvError::logic(format!(
                "fallback for '{}' has {} elements, the accessor has {}",
                handle.name(),
                value.n_elements(),
                handle.n_elements()
            )));
        }
        self.ensure_tracked(accessor)?;
        let variable = self
            .variables
            .get_mut(&handle.id())
            .and_then(|v| v.as_any_mut().downcast_mut::<Variable<A::Value>>())
            .ok_or_else(|| PvError::logic(format!("'{}' is tracked with another type", handle.name())))?;
        variable.fallback = value;
        Ok(())
    }

    /// Keep `3 * depth` accepted values per accessor.
    pub fn set_history_depth(&mut self, depth: usize) {
        self.history_capacity = HISTORY_PER_DEPTH * depth;
        for variable in self.variables.values_mut() {
            variable.set_history_capacity(self.history_capacity);
        }
    }

    /// Replace the reporter for failed validations.
    pub fn set_error_function(&mut self, error_fn: impl FnMut(&str) + Send + 'static) {
        self.error_fn = Box::new(error_fn);
    }

    /// Validate after `change` was read. [`ElementId::NONE`] validates every
    /// registered accessor. Returns true if a value was rejected.
    pub fn validate(&mut self, change: ElementId) -> bool {
        if !change.is_valid() {
            return self.validate_all();
        }
        let Some(indices) = self.by_accessor.get(&change) else {
            return false;
        };
        let Some(variable) = self.variables.get_mut(&change) else {
            return false;
        };
        for &index in indices {
            let validator = &self.validators[index];
            if !(validator.is_valid)() {
                (self.error_fn)(&validator.message);
                variable.reject();
                return true;
            }
        }
        variable.accept();
        false
    }

    /// Validate every registered accessor, e.g. once at start-up.
    pub fn validate_all(&mut self) -> bool {
        let ids: Vec<ElementId> = self.variables.keys().copied().collect();
        let mut rejected = false;
        for id in ids {
            rejected |= self.validate(id);
        }
        rejected
    }

    pub fn is_tracked(&self, id: ElementId) -> bool {
        self.variables.contains_key(&id)
    }

    fn register(&mut self, accessor: &dyn Guarded, index: usize) -> PvResult<()> {
        let id = accessor.guarded_id();
        if !self.variables.contains_key(&id) {
            self.track(accessor)?;
        }
        let indices = self.by_accessor.entry(id).or_default();
        if !indices.contains(&index) {
            indices.push(index);
        }
        Ok(())
    }

    fn ensure_tracked<A: Validatable>(&mut self, accessor: &A) -> PvResult<()> {
        if self.variables.contains_key(&accessor.guarded_id()) {
            return Ok(());
        }
        self.track(accessor)
    }

    fn track(&mut self, accessor: &dyn Guarded) -> PvResult<()> {
        check_push_input(accessor)?;
        let id = accessor.guarded_id();
        let variable = accessor.track(self.history_capacity);
        self.app.with_model_mut(|m| match m.variable_by_element(id) {
            Some(var) => m.add_tag(var, SystemTag::Validated),
            None => Ok(()),
        })?;
        variable.announce(HookEvent::AddValidator);
        self.variables.insert(id, variable);
        tracing::debug!(target: "UserInputValidator", accessor = %id, "accessor registered");
        Ok(())
    }
}

fn check_push_input(accessor: &dyn Guarded) -> PvResult<()> {
    if accessor.guarded_kind().is_input() {
        return Ok(());
    }
    Err(PvError::logic(format!(
        "'{}': only push-type inputs can be validated",
        accessor.guarded_name()
    )))
}

impl std::fmt::Debug for UserInputValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserInputValidator")
            .field("validators", &self.validators.len())
            .field("accessors", &self.variables.len())
            .field("history_capacity", &self.history_capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use pv_runtime::{Decl, Output};

    struct Rig {
        app: Application,
        module: Module,
        out: Output<i32>,
        x: PushInput<i32>,
    }

    fn rig() -> Rig {
        let app = Application::new("t");
        let panel = app.root().add_module("Panel", "").unwrap();
        let module = app.root().add_module("M", "").unwrap();
        let out = panel.output::<i32>(Decl::new("/x")).unwrap();
        let x = module.push_input_wb::<i32>(Decl::new("/x")).unwrap();
        app.connect().unwrap();
        Rig { app, module, out, x }
    }

    fn send(rig: &Rig, value: i32) {
        rig.out.set_and_write(value);
        assert!(rig.x.read_non_blocking());
    }

    #[test]
    fn rejection_reverts_to_last_accepted() {
        let r = rig();
        let mut v = UserInputValidator::new(&r.module);
        let x = r.x.handle();
        v.add("x too large", move || x.get() < 10, &[&r.x]).unwrap();
        v.set_fallback(&r.x, 1).unwrap();

        assert!(!v.validate_all());
        assert_eq!(r.x.get(), 0);

        send(&r, 15);
        assert!(v.validate(r.x.id()));
        assert_eq!(r.x.get(), 0);
        // the reverted value went back to the feeder
        assert!(r.out.read_non_blocking());
        assert_eq!(r.out.get(), 0);
    }

    #[test]
    fn rejection_without_history_uses_fallback() {
        let r = rig();
        let mut v = UserInputValidator::new(&r.module);
        let x = r.x.handle();
        v.add("x too large", move || x.get() < 10, &[&r.x]).unwrap();
        v.set_fallback(&r.x, 1).unwrap();

        send(&r, 12);
        assert!(v.validate(r.x.id()));
        assert_eq!(r.x.get(), 1);
    }

    #[test]
    fn first_failing_validator_reports() {
        let r = rig();
        let messages = Arc::new(Mutex::new(Vec::new()));
        let sink = messages.clone();
        let mut v = UserInputValidator::new(&r.module);
        v.set_error_function(move |m: &str| sink.lock().push(m.to_string()));
        let x = r.x.handle();
        v.add("below 10", move || x.get() < 10, &[&r.x]).unwrap();
        let x = r.x.handle();
        v.add("below 5", move || x.get() < 5, &[&r.x]).unwrap();

        send(&r, 7);
        assert!(v.validate(r.x.id()));
        send(&r, 20);
        assert!(v.validate(r.x.id()));
        assert_eq!(*messages.lock(), vec!["below 5".to_string(), "below 10".to_string()]);
    }

    #[test]
    fn unknown_change_is_ignored() {
        let r = rig();
        let mut v = UserInputValidator::new(&r.module);
        assert!(!v.validate(ElementId::next()));
        assert!(!v.validate_all());
    }

    #[test]
    fn registration_tags_the_variable() {
        let r = rig();
        let mut v = UserInputValidator::new(&r.module);
        v.add("always", || true, &[&r.x]).unwrap();
        assert!(v.is_tracked(r.x.id()));
        r.app.with_model(|m| {
            let var = m.variable_by_element(r.x.id()).unwrap();
            assert!(m.variable(var).unwrap().has_system_tag(SystemTag::Validated));
        });
        assert!(v.add("none", || true, &[]).is_err());
    }

    #[test]
    fn outputs_cannot_be_guarded() {
        let r = rig();
        let mut v = UserInputValidator::new(&r.module);
        let out = r.out.handle();
        let err = v.add("never", || true, &[&out]).unwrap_err();
        assert!(matches!(err, PvError::Logic { .. }));
        assert!(v.set_fallback(&out, 0).is_err());
        assert!(!v.is_tracked(out.id()));
        assert!(v.validators.is_empty());
    }

    #[test]
    fn fallback_length_must_match() {
        let app = Application::new("t");
        let m = app.root().add_module("M", "").unwrap();
        let arr = m.push_input::<Vec<f64>>(Decl::new("curve").elements(4)).unwrap();
        let mut v = UserInputValidator::new(&m);
        assert!(matches!(
            v.set_fallback(&arr, vec![0.0; 3]),
            Err(PvError::Logic { .. })
        ));
        v.set_fallback(&arr, vec![1.0; 4]).unwrap();
    }

    #[test]
    fn history_depth_scales_capacity() {
        let r = rig();
        let mut v = UserInputValidator::new(&r.module);
        v.set_history_depth(2);
        v.add("always", || true, &[&r.x]).unwrap();
        assert_eq!(v.history_capacity, 6);
    }
}
