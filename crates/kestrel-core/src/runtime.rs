//! Object runtime
//!
//! The [`Runtime`] ties the components together: the class registry (rooted
//! at the implicit root class), the reference registry, the global signal
//! bus and the generic lifecycle and dispatch operations every class shares.
//!
//! A runtime is single-threaded (`!Send`). Handles are cheap to clone; the
//! runtime is torn down when the last handle is dropped.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::class::{Class, ClassBuilder, Property};
use crate::class_registry::ClassRegistry;
use crate::error::{ObjectError, ObjectResult};
use crate::object::{Instance, Object, ObjectState};
use crate::options::RuntimeOptions;
use crate::registry::ReferenceRegistry;
use crate::signal::SignalTable;
use crate::value::{arg_function, arg_object, arg_str, Function, Identity, Table, Value};

/// Signal emitted on the global bus when a read resolves nothing
pub const INDEX_MISS_SIGNAL: &str = "debug::index::miss";

/// Signal emitted on the global bus when a write resolves nothing
pub const NEWINDEX_MISS_SIGNAL: &str = "debug::newindex::miss";

/// Signal emitted on the global bus when a signal handler fails
pub const ERROR_SIGNAL: &str = "debug::error";

pub(crate) struct RuntimeInner {
    options: RuntimeOptions,
    classes: RefCell<ClassRegistry>,
    root: Class,
    pub(crate) registry: ReferenceRegistry,
    globals: SignalTable,
    emit_depth: Cell<usize>,
    reporting_error: Cell<bool>,
}

impl Drop for RuntimeInner {
    fn drop(&mut self) {
        self.globals.clear();
        self.registry.release_all();
        let classes = self.classes.get_mut().take_all();
        for class in &classes {
            class.teardown();
        }
        tracing::debug!(classes = classes.len(), "runtime shut down");
    }
}

/// Handle to an object runtime
#[derive(Clone)]
pub struct Runtime(Rc<RuntimeInner>);

/// Decrements the emission depth when dropped
pub(crate) struct EmitGuard<'a> {
    depth: &'a Cell<usize>,
}

impl Drop for EmitGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

impl Runtime {
    /// Create a runtime with default options
    pub fn new() -> Self {
        Self::build(RuntimeOptions::default())
    }

    /// Create a runtime with the given options
    pub fn with_options(options: RuntimeOptions) -> ObjectResult<Self> {
        options
            .validate()
            .map_err(|e| ObjectError::Config(e.to_string()))?;
        Ok(Self::build(options))
    }

    fn build(options: RuntimeOptions) -> Self {
        let (classes, root) = ClassRegistry::with_root(root_class(&options.root_class));
        tracing::debug!(root = root.name(), "runtime created");
        Runtime(Rc::new(RuntimeInner {
            options,
            classes: RefCell::new(classes),
            root,
            registry: ReferenceRegistry::new(),
            globals: SignalTable::new(),
            emit_depth: Cell::new(0),
            reporting_error: Cell::new(false),
        }))
    }

    pub(crate) fn from_inner(inner: Rc<RuntimeInner>) -> Self {
        Runtime(inner)
    }

    /// Runtime options
    pub fn options(&self) -> &RuntimeOptions {
        &self.0.options
    }

    /// Check if two handles refer to the same runtime
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    // ========================================================================
    // Classes
    // ========================================================================

    /// Register a class
    ///
    /// A class without an explicit parent inherits from the root class.
    pub fn register_class(&self, builder: ClassBuilder) -> ObjectResult<Class> {
        let class = self
            .0
            .classes
            .borrow_mut()
            .register_class(builder, Some(&self.0.root))?;
        tracing::debug!(
            class = class.name(),
            id = class.id(),
            parent = ?class.parent().map(Class::name),
            "register class"
        );
        Ok(class)
    }

    /// The implicit root class
    pub fn root_class(&self) -> &Class {
        &self.0.root
    }

    /// Look up a class by name
    pub fn class_by_name(&self, name: &str) -> Option<Class> {
        self.0.classes.borrow().get_class_by_name(name).cloned()
    }

    /// Every registered class, in registration order (root first)
    pub fn classes(&self) -> Vec<Class> {
        self.0.classes.borrow().iter().cloned().collect()
    }

    /// Class of `value`, if it is an object
    pub fn class_of(&self, value: &Value) -> Option<Class> {
        value.as_object().map(|obj| obj.class().clone())
    }

    /// `client/window/object: 0x...` for objects, the plain display form otherwise
    pub fn stringify(&self, value: &Value) -> String {
        match value {
            Value::Object(obj) => obj.describe(),
            other => other.to_string(),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Construct an instance of `class`
    ///
    /// Initializers run root-first, then the class-level `new` signal fires,
    /// then every string key of `props` that names a property with a
    /// construction-time callback is assigned. Other keys are ignored.
    pub fn construct(&self, class: &Class, props: Option<&Table>) -> ObjectResult<Object> {
        let obj = Object::new(Instance::allocate(class, Rc::downgrade(&self.0)));
        self.0.registry.store(&Value::Object(obj.clone()))?;

        let mut levels: Vec<Class> = class.ancestry().collect();
        levels.reverse();
        for level in &levels {
            if let Some(initializer) = level.initializer() {
                initializer(self, &obj)?;
            }
        }

        class.emit_signal(self, "new", &[Value::Object(obj.clone())])?;

        if let Some(props) = props {
            for (key, value) in props.pairs() {
                let Some(name) = key.as_str() else {
                    continue;
                };
                let on_new = class
                    .resolve_property(name)
                    .and_then(|prop| prop.new_callback().cloned());
                if let Some(on_new) = on_new {
                    tracing::trace!(object = %obj, property = name, "construct property");
                    on_new(self, &obj, &value)?;
                }
            }
        }

        obj.set_state(ObjectState::Live);
        tracing::debug!(object = %obj, "construct");
        Ok(obj)
    }

    /// Construct an instance of the class registered as `name`
    pub fn construct_named(&self, name: &str, props: Option<&Table>) -> ObjectResult<Object> {
        let class = self
            .class_by_name(name)
            .ok_or_else(|| ObjectError::UnknownClass(name.to_string()))?;
        self.construct(&class, props)
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Read `key` from `obj`
    ///
    /// Resolution order: property read callback (nearest class first), then
    /// method, then the nearest index miss handler. Without a handler the
    /// read yields nil.
    pub fn read(&self, obj: &Object, key: &str) -> ObjectResult<Value> {
        let class = obj.class();

        let reader = class
            .resolve_property(key)
            .and_then(|prop| prop.read_callback().cloned());
        if let Some(reader) = reader {
            tracing::trace!(object = %obj, property = key, "read");
            return reader(self, obj);
        }

        if let Some(method) = class.resolve_method(key) {
            return Ok(Value::Function(method));
        }

        let args = [Value::Object(obj.clone()), Value::string(key)];
        if let Some(handler) = class.index_miss_handler() {
            return handler.call(self, &args);
        }

        tracing::warn!(object = %obj, key, "read of unknown property");
        if self.0.options.miss_signals {
            self.emit_global(INDEX_MISS_SIGNAL, &args)?;
        }
        Ok(Value::Nil)
    }

    /// Write `value` to `key` on `obj`
    ///
    /// Calls the nearest property write callback, or the nearest newindex
    /// miss handler when there is none.
    pub fn write(&self, obj: &Object, key: &str, value: impl Into<Value>) -> ObjectResult<()> {
        let value = value.into();
        let class = obj.class();

        let writer = class
            .resolve_property(key)
            .and_then(|prop| prop.write_callback().cloned());
        if let Some(writer) = writer {
            tracing::trace!(object = %obj, property = key, "write");
            return writer(self, obj, &value);
        }

        let args = [Value::Object(obj.clone()), Value::string(key), value];
        if let Some(handler) = class.newindex_miss_handler() {
            handler.call(self, &args)?;
            return Ok(());
        }

        tracing::warn!(object = %obj, key, "write of unknown property");
        if self.0.options.miss_signals {
            self.emit_global(NEWINDEX_MISS_SIGNAL, &args)?;
        }
        Ok(())
    }

    /// Check that `value` is an instance of `class` (or a subclass) that
    /// passes `class`'s validity checker
    pub fn checked_cast(&self, value: &Value, class: &Class) -> ObjectResult<Object> {
        let mismatch = |got: String| ObjectError::TypeMismatch {
            expected: class.name().to_string(),
            got,
        };

        let obj = value
            .as_object()
            .ok_or_else(|| mismatch(value.type_name().to_string()))?;
        if !obj.class().is_subclass_of(class) {
            return Err(mismatch(obj.class().name().to_string()));
        }
        if !class.check(obj) {
            tracing::warn!(object = %obj, expected = class.name(), "invalid object");
            return Err(mismatch(format!("invalid {}", obj.class().name())));
        }
        Ok(obj.clone())
    }

    // ========================================================================
    // References
    // ========================================================================

    /// Reference registry
    pub fn registry(&self) -> &ReferenceRegistry {
        &self.0.registry
    }

    /// Register `value` in the identity table
    pub fn store(&self, value: &Value) -> ObjectResult<Identity> {
        self.0.registry.store(value)
    }

    /// Look up the value registered under `id`
    pub fn push(&self, id: Identity) -> Option<Value> {
        self.0.registry.push(id)
    }

    /// Pin `value` in the global reference table
    pub fn ref_value(&self, value: &Value) -> ObjectResult<Identity> {
        self.0.registry.ref_value(value)
    }

    /// Release one global reference
    pub fn unref(&self, id: Identity) -> ObjectResult<()> {
        self.0.registry.unref(id)
    }

    /// Global reference count of `id`
    pub fn ref_count(&self, id: Identity) -> usize {
        self.0.registry.ref_count(id)
    }

    /// Pin `value` for as long as `owner` lives
    ///
    /// Owners without an item table (anything but an object) fall back to
    /// the global table.
    ///
    /// Item references are strong. Two objects that hold each other (directly
    /// or through a longer chain) keep each other alive until one side calls
    /// [`unref_item`](Self::unref_item); nothing collects such a cycle.
    pub fn ref_item(&self, owner: &Value, value: &Value) -> ObjectResult<Identity> {
        let Some(obj) = owner.as_object() else {
            return self.ref_value(value);
        };
        let (id, first) = obj.items().incref(value)?;
        if first {
            self.0.registry.store(value)?;
        }
        tracing::trace!(owner = %obj, identity = %id, "ref item");
        Ok(id)
    }

    /// Release one item reference held by `owner`
    pub fn unref_item(&self, owner: &Value, id: Identity) -> ObjectResult<()> {
        let Some(obj) = owner.as_object() else {
            return self.unref(id);
        };
        let released = obj.items().decref(id)?;
        tracing::trace!(owner = %obj, identity = %id, "unref item");
        self.0.registry.release(id, released);
        Ok(())
    }

    /// Item reference count of `id` held by `owner`
    pub fn item_count(&self, owner: &Value, id: Identity) -> usize {
        match owner.as_object() {
            Some(obj) => obj.items().count(id),
            None => self.ref_count(id),
        }
    }

    // ========================================================================
    // Global signals
    // ========================================================================

    /// Connect a handler on the global bus
    pub fn connect_global(&self, name: &str, handler: Function) {
        self.0.globals.connect(name, handler);
    }

    /// Disconnect the first matching handler from the global bus
    pub fn disconnect_global(&self, name: &str, handler: &Function) -> bool {
        self.0.globals.disconnect(name, handler)
    }

    /// Emit on the global bus
    pub fn emit_global(&self, name: &str, args: &[Value]) -> ObjectResult<Vec<Value>> {
        self.0.globals.emit(self, name, args)
    }

    /// Global signal table
    pub fn globals(&self) -> &SignalTable {
        &self.0.globals
    }

    /// Current nesting of signal emissions
    pub fn emit_depth(&self) -> usize {
        self.0.emit_depth.get()
    }

    pub(crate) fn enter_emission(&self, name: &str) -> ObjectResult<EmitGuard<'_>> {
        let depth = self.0.emit_depth.get();
        let limit = self.0.options.max_emit_depth;
        if depth >= limit {
            tracing::error!(signal = name, depth, "maximum emission depth exceeded");
            return Err(ObjectError::EmitDepthExceeded {
                name: name.to_string(),
                depth: limit,
            });
        }
        self.0.emit_depth.set(depth + 1);
        Ok(EmitGuard {
            depth: &self.0.emit_depth,
        })
    }

    /// Log a failed handler and forward it to `debug::error`
    ///
    /// Failures inside `debug::error` handlers are only logged.
    pub(crate) fn report_handler_error(&self, name: &str, err: &ObjectError) {
        tracing::error!(signal = name, error = %err, "signal handler failed");
        if !self.0.options.error_signals || self.0.reporting_error.get() {
            return;
        }

        self.0.reporting_error.set(true);
        let message = Value::string(format!("{}: {}", name, err));
        let result = self.0.globals.emit(self, ERROR_SIGNAL, &[message]);
        self.0.reporting_error.set(false);

        if let Err(err) = result {
            tracing::error!(error = %err, "could not report handler failure");
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("root", &self.0.root.name())
            .field("classes", &self.0.classes.borrow().len())
            .field("registry", &self.0.registry)
            .field("emit_depth", &self.0.emit_depth.get())
            .finish()
    }
}

/// Root class with the members every object inherits
fn root_class(name: &str) -> ClassBuilder {
    ClassBuilder::new(name)
        .property(
            Property::new("valid").on_read(|_, obj| Ok(Value::Boolean(obj.is_valid()))),
        )
        .method(
            "connect_signal",
            Function::named("connect_signal", |_, args| {
                let obj = arg_object(args, 0, "connect_signal")?;
                let name = arg_str(args, 1, "connect_signal")?;
                let handler = arg_function(args, 2, "connect_signal")?;
                obj.connect_signal(name, handler.clone());
                Ok(Value::Nil)
            }),
        )
        .method(
            "disconnect_signal",
            Function::named("disconnect_signal", |_, args| {
                let obj = arg_object(args, 0, "disconnect_signal")?;
                let name = arg_str(args, 1, "disconnect_signal")?;
                let handler = arg_function(args, 2, "disconnect_signal")?;
                Ok(Value::Boolean(obj.disconnect_signal(name, handler)))
            }),
        )
        .method(
            "emit_signal",
            Function::named("emit_signal", |rt, args| {
                let obj = arg_object(args, 0, "emit_signal")?;
                let name = arg_str(args, 1, "emit_signal")?;
                obj.emit_signal(rt, name, &args[2..])?;
                Ok(Value::Nil)
            }),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> (Rc<Cell<usize>>, Function) {
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        let func = Function::new(move |_, _| {
            c.set(c.get() + 1);
            Ok(Value::Nil)
        });
        (count, func)
    }

    #[test]
    fn test_root_class_registered() {
        let rt = Runtime::new();
        assert_eq!(rt.root_class().name(), "object");
        assert!(rt.root_class().parent().is_none());
        assert_eq!(rt.class_by_name("object").as_ref(), Some(rt.root_class()));
    }

    #[test]
    fn test_custom_root_name() {
        let options = RuntimeOptions {
            root_class: "base".to_string(),
            ..RuntimeOptions::default()
        };
        let rt = Runtime::with_options(options).unwrap();
        let widget = rt.register_class(ClassBuilder::new("widget")).unwrap();
        assert_eq!(widget.parent().map(Class::name), Some("base"));
    }

    #[test]
    fn test_invalid_options_rejected() {
        let options = RuntimeOptions {
            max_emit_depth: 0,
            ..RuntimeOptions::default()
        };
        assert!(matches!(
            Runtime::with_options(options),
            Err(ObjectError::Config(_))
        ));
    }

    #[test]
    fn test_duplicate_class_rejected() {
        let rt = Runtime::new();
        rt.register_class(ClassBuilder::new("tag")).unwrap();
        assert_eq!(
            rt.register_class(ClassBuilder::new("tag")).unwrap_err(),
            ObjectError::DuplicateClass("tag".to_string())
        );
        assert_eq!(
            rt.register_class(ClassBuilder::new("object")).unwrap_err(),
            ObjectError::DuplicateClass("object".to_string())
        );
    }

    #[test]
    fn test_read_falls_through_to_method() {
        let rt = Runtime::new();
        let class = rt.register_class(ClassBuilder::new("w")).unwrap();
        let obj = rt.construct(&class, None).unwrap();

        let method = rt.read(&obj, "connect_signal").unwrap();
        assert!(method.as_function().is_some());
        assert_eq!(rt.read(&obj, "valid").unwrap(), Value::Boolean(true));
    }

    #[test]
    fn test_index_miss_signal() {
        let rt = Runtime::new();
        let class = rt.register_class(ClassBuilder::new("w")).unwrap();
        let obj = rt.construct(&class, None).unwrap();
        let (count, handler) = counter();
        rt.connect_global(INDEX_MISS_SIGNAL, handler);

        assert_eq!(rt.read(&obj, "nope").unwrap(), Value::Nil);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_miss_signals_disabled() {
        let options = RuntimeOptions {
            miss_signals: false,
            ..RuntimeOptions::default()
        };
        let rt = Runtime::with_options(options).unwrap();
        let class = rt.register_class(ClassBuilder::new("w")).unwrap();
        let obj = rt.construct(&class, None).unwrap();
        let (count, handler) = counter();
        rt.connect_global(NEWINDEX_MISS_SIGNAL, handler);

        rt.write(&obj, "nope", 1).unwrap();
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_index_miss_handler_result_returned() {
        let rt = Runtime::new();
        let class = rt.register_class(ClassBuilder::new("w")).unwrap();
        class.set_index_miss_handler(Some(Function::new(|_, args| {
            Ok(Value::string(format!("missing {}", args[1])))
        })));
        let obj = rt.construct(&class, None).unwrap();

        assert_eq!(rt.read(&obj, "x").unwrap(), Value::from("missing x"));
    }

    #[test]
    fn test_stringify_and_class_of() {
        let rt = Runtime::new();
        let window = rt.register_class(ClassBuilder::new("window")).unwrap();
        let client = rt
            .register_class(ClassBuilder::new("client").parent(&window))
            .unwrap();
        let obj = Value::from(rt.construct(&client, None).unwrap());

        let text = rt.stringify(&obj);
        assert!(text.starts_with("client/window/object: 0x"), "{}", text);
        assert_eq!(rt.class_of(&obj), Some(client));
        assert_eq!(rt.class_of(&Value::from(1)), None);
        assert_eq!(rt.stringify(&Value::from(1)), "1");
    }

    #[test]
    fn test_construct_named_unknown() {
        let rt = Runtime::new();
        assert_eq!(
            rt.construct_named("screen", None).unwrap_err(),
            ObjectError::UnknownClass("screen".to_string())
        );
    }

    #[test]
    fn test_emit_depth_guard() {
        let options = RuntimeOptions {
            max_emit_depth: 4,
            ..RuntimeOptions::default()
        };
        let rt = Runtime::with_options(options).unwrap();
        let depth_seen = Rc::new(Cell::new(0));
        let seen = depth_seen.clone();
        rt.connect_global(
            "loop",
            Function::new(move |rt, _| {
                seen.set(seen.get().max(rt.emit_depth()));
                rt.emit_global("loop", &[])?;
                Ok(Value::Nil)
            }),
        );

        rt.emit_global("loop", &[]).unwrap();
        assert_eq!(depth_seen.get(), 4);
        assert_eq!(rt.emit_depth(), 0);
    }

    #[test]
    fn test_handler_error_reported_once() {
        let rt = Runtime::new();
        let messages = Rc::new(RefCell::new(Vec::new()));
        let log = messages.clone();
        rt.connect_global(
            ERROR_SIGNAL,
            Function::new(move |_, args| {
                log.borrow_mut().push(args[0].to_string());
                Err("error handler failed too".into())
            }),
        );
        rt.connect_global("e", Function::new(|_, _| Err("boom".into())));

        rt.emit_global("e", &[]).unwrap();
        assert_eq!(*messages.borrow(), vec!["e: boom".to_string()]);
    }

    #[test]
    fn test_ref_item_falls_back_to_global() {
        let rt = Runtime::new();
        let value = Value::from(Table::new());
        let id = rt.ref_item(&Value::from(3), &value).unwrap();
        assert_eq!(rt.ref_count(id), 1);
        rt.unref_item(&Value::Nil, id).unwrap();
        assert_eq!(rt.ref_count(id), 0);
    }
}
