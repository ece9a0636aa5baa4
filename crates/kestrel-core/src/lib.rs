//! Kestrel object runtime
//!
//! This crate provides the object model shared by every scriptable type of
//! the window manager:
//! - Class descriptors with single inheritance, properties and methods
//! - Generic construction, property dispatch and checked casts
//! - Signal buses on instances, classes and the runtime
//! - Reference registry (identity table, global and per-instance pins)
//! - Isolated worker runtimes

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod class;
pub mod class_registry;
pub mod error;
pub mod object;
pub mod options;
pub mod registry;
pub mod runtime;
pub mod signal;
pub mod value;
pub mod worker;

pub use class::{Class, ClassBuilder, ClassId, Property};
pub use class_registry::ClassRegistry;
pub use error::{ObjectError, ObjectResult};
pub use object::{Instance, Object, ObjectState, WeakObject};
pub use options::{ConfigError, RuntimeOptions};
pub use registry::{RefTable, ReferenceRegistry};
pub use runtime::{Runtime, ERROR_SIGNAL, INDEX_MISS_SIGNAL, NEWINDEX_MISS_SIGNAL};
pub use signal::SignalTable;
pub use value::{
    arg_function, arg_object, arg_str, Function, Identity, Table, TableKey, Value, WeakValue,
};
pub use worker::{spawn_isolated, WorkerHandle};
