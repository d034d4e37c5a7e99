//! pv-runtime: push-type process variables and the application that wires them.
//!
//! Provides:
//! - [`Output`] / [`PushInput`] accessors with version numbers, validity and
//!   optional return channel
//! - [`ReadAnyGroup`] to wait for the next change among a module's inputs
//! - [`AccessorHook`] observers for post-read and validation events
//! - [`Application`] / [`Module`] for declaring the model, connecting networks
//!   and shutting down
//!
//! # Example
//!
//! ```
//! use pv_runtime::{Application, Decl, ReadAnyGroup};
//!
//! let app = Application::new("demo");
//! let src = app.root().add_module("Source", "").unwrap();
//! let dst = app.root().add_module("Sink", "").unwrap();
//! let out = src.output::<i32>(Decl::new("/value")).unwrap();
//! let inp = dst.push_input::<i32>(Decl::new("/value")).unwrap();
//! app.connect().unwrap();
//!
//! let group = ReadAnyGroup::new(&[&inp]).unwrap();
//! out.set_and_write(7);
//! assert_eq!(group.read_any_non_blocking(), Some(inp.id()));
//! assert_eq!(inp.get(), 7);
//! ```

pub mod accessor;
pub mod application;
pub mod module;
pub mod read_any;
pub mod user_type;

pub use accessor::{AccessorHook, AccessorKind, Handle, HookEvent, Output, PushInput, TransferElement, Update};
pub use application::{Application, ConnectHook, Module, Phase};
pub use module::{Decl, ModuleRuntime};
pub use read_any::{ReadAnyGroup, ReadAnyMember};
pub use user_type::UserType;
