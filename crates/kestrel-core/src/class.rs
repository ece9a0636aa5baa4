//! Class descriptors
//!
//! A class is a named, single-inheritance descriptor shared by all of its
//! instances. It owns:
//!
//! - lifecycle hooks (payload allocator, initializer, destructor, validity checker)
//! - a property table (name → read/write/construct-time callbacks)
//! - a method table (name → function, returned as-is by property reads)
//! - a class-level signal table
//! - optional index/newindex miss handlers
//!
//! Lookups walk from the class itself towards the root, so a subclass that
//! registers a property under an ancestor's name shadows it.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::error::{ObjectError, ObjectResult};
use crate::object::{Instance, Object};
use crate::runtime::Runtime;
use crate::signal::SignalTable;
use crate::value::{Function, Value};

/// Class identifier (index into the runtime's class registry)
pub type ClassId = usize;

/// Payload allocator: produces the zeroed native data for one class level
pub type Allocator = fn() -> Box<dyn Any>;

/// Per-instance initializer, run once per class level, root first
pub type Initializer = Rc<dyn Fn(&Runtime, &Object) -> ObjectResult<()>>;

/// Per-instance destructor, run once per class level when the instance is dropped
pub type Destructor = Rc<dyn Fn(&Instance)>;

/// Validity checker
pub type Checker = Rc<dyn Fn(&Instance) -> bool>;

/// Property read callback
pub type PropertyReader = Rc<dyn Fn(&Runtime, &Object) -> ObjectResult<Value>>;

/// Property write / construct-time callback
pub type PropertyWriter = Rc<dyn Fn(&Runtime, &Object, &Value) -> ObjectResult<()>>;

// ============================================================================
// Properties
// ============================================================================

/// A named property with optional callbacks
///
/// A property without `on_read` is write-only or construct-only; reads of it
/// fall through to the method table and then to the miss handler.
#[derive(Clone)]
pub struct Property {
    name: String,
    on_new: Option<PropertyWriter>,
    on_read: Option<PropertyReader>,
    on_write: Option<PropertyWriter>,
}

impl Property {
    /// Create a property with no callbacks
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            on_new: None,
            on_read: None,
            on_write: None,
        }
    }

    /// Callback run during construction-time bulk assignment
    pub fn on_new<F>(mut self, f: F) -> Self
    where
        F: Fn(&Runtime, &Object, &Value) -> ObjectResult<()> + 'static,
    {
        self.on_new = Some(Rc::new(f));
        self
    }

    /// Callback run on reads
    pub fn on_read<F>(mut self, f: F) -> Self
    where
        F: Fn(&Runtime, &Object) -> ObjectResult<Value> + 'static,
    {
        self.on_read = Some(Rc::new(f));
        self
    }

    /// Callback run on writes
    pub fn on_write<F>(mut self, f: F) -> Self
    where
        F: Fn(&Runtime, &Object, &Value) -> ObjectResult<()> + 'static,
    {
        self.on_write = Some(Rc::new(f));
        self
    }

    /// Use the same callback for construction-time assignment and writes
    pub fn on_assign<F>(self, f: F) -> Self
    where
        F: Fn(&Runtime, &Object, &Value) -> ObjectResult<()> + 'static,
    {
        let writer: PropertyWriter = Rc::new(f);
        let mut prop = self;
        prop.on_new = Some(writer.clone());
        prop.on_write = Some(writer);
        prop
    }

    /// Property name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Construction-time callback
    pub fn new_callback(&self) -> Option<&PropertyWriter> {
        self.on_new.as_ref()
    }

    /// Read callback
    pub fn read_callback(&self) -> Option<&PropertyReader> {
        self.on_read.as_ref()
    }

    /// Write callback
    pub fn write_callback(&self) -> Option<&PropertyWriter> {
        self.on_write.as_ref()
    }

    /// Check if the property is readable
    pub fn is_readable(&self) -> bool {
        self.on_read.is_some()
    }

    /// Check if the property is writable after construction
    pub fn is_writable(&self) -> bool {
        self.on_write.is_some()
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("on_new", &self.on_new.is_some())
            .field("on_read", &self.on_read.is_some())
            .field("on_write", &self.on_write.is_some())
            .finish()
    }
}

// ============================================================================
// Class
// ============================================================================

pub(crate) struct ClassInner {
    id: ClassId,
    name: String,
    parent: Option<Class>,
    instance_layout_size: usize,
    allocator: Option<Allocator>,
    initializer: Option<Initializer>,
    destructor: Option<Destructor>,
    checker: Option<Checker>,
    properties: RefCell<FxHashMap<String, Rc<Property>>>,
    methods: RefCell<FxHashMap<String, Function>>,
    signals: SignalTable,
    index_miss: RefCell<Option<Function>>,
    newindex_miss: RefCell<Option<Function>>,
    instances: Cell<usize>,
}

/// Shared handle to a class descriptor
#[derive(Clone)]
pub struct Class(Rc<ClassInner>);

impl Class {
    /// Class ID
    pub fn id(&self) -> ClassId {
        self.0.id
    }

    /// Class name
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Parent class (`None` only for the root class)
    pub fn parent(&self) -> Option<&Class> {
        self.0.parent.as_ref()
    }

    /// Size of this class's own payload
    pub fn instance_layout_size(&self) -> usize {
        self.0.instance_layout_size
    }

    /// This class followed by every ancestor, most-derived first
    pub fn ancestry(&self) -> Ancestry {
        Ancestry {
            next: Some(self.clone()),
        }
    }

    /// Number of classes from this one up to the root, inclusive
    pub fn depth(&self) -> usize {
        self.ancestry().count()
    }

    /// Check if `self` is `other` or inherits from it
    pub fn is_subclass_of(&self, other: &Class) -> bool {
        self.ancestry().any(|c| c.ptr_eq(other))
    }

    /// Compare by identity
    pub fn ptr_eq(&self, other: &Class) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Live instances of this class and its subclasses
    pub fn instances(&self) -> usize {
        self.0.instances.get()
    }

    pub(crate) fn instance_created(&self) {
        for class in self.ancestry() {
            class.0.instances.set(class.0.instances.get() + 1);
        }
    }

    pub(crate) fn instance_dropped(&self) {
        for class in self.ancestry() {
            class.0.instances.set(class.0.instances.get().saturating_sub(1));
        }
    }

    pub(crate) fn allocator(&self) -> Option<Allocator> {
        self.0.allocator
    }

    pub(crate) fn initializer(&self) -> Option<Initializer> {
        self.0.initializer.clone()
    }

    pub(crate) fn destructor(&self) -> Option<Destructor> {
        self.0.destructor.clone()
    }

    /// Run this class's own validity checker (true when there is none)
    pub fn check(&self, instance: &Instance) -> bool {
        self.0.checker.as_ref().map_or(true, |checker| checker(instance))
    }

    /// Check if this class has its own validity checker
    pub fn has_checker(&self) -> bool {
        self.0.checker.is_some()
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    /// Register a property on this class
    ///
    /// Registering the same name twice on one class is an error; the same
    /// name on a subclass shadows the ancestor's entry.
    pub fn add_property(&self, property: Property) -> ObjectResult<()> {
        let mut properties = self.0.properties.borrow_mut();
        if properties.contains_key(property.name()) {
            return Err(ObjectError::DuplicateProperty {
                class: self.name().to_string(),
                property: property.name().to_string(),
            });
        }
        tracing::trace!(class = self.name(), property = property.name(), "add property");
        properties.insert(property.name().to_string(), Rc::new(property));
        Ok(())
    }

    /// Find a property on this class or the nearest ancestor that has it
    pub fn resolve_property(&self, name: &str) -> Option<Rc<Property>> {
        self.ancestry().find_map(|class| class.own_property(name))
    }

    /// Property registered on this exact class
    pub fn own_property(&self, name: &str) -> Option<Rc<Property>> {
        self.0.properties.borrow().get(name).cloned()
    }

    /// Names of properties registered on this exact class, sorted
    pub fn own_property_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.0.properties.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    // ------------------------------------------------------------------
    // Methods
    // ------------------------------------------------------------------

    /// Add or replace a method, returning the replaced one
    pub fn add_method(&self, name: &str, method: Function) -> Option<Function> {
        self.0.methods.borrow_mut().insert(name.to_string(), method)
    }

    /// Find a method on this class or the nearest ancestor that has it
    pub fn resolve_method(&self, name: &str) -> Option<Function> {
        self.ancestry().find_map(|class| class.own_method(name))
    }

    /// Method registered on this exact class
    pub fn own_method(&self, name: &str) -> Option<Function> {
        self.0.methods.borrow().get(name).cloned()
    }

    /// Names of methods registered on this exact class, sorted
    pub fn own_method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.0.methods.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    // ------------------------------------------------------------------
    // Miss handlers
    // ------------------------------------------------------------------

    /// Set (or clear) the handler called on reads that resolve nothing
    ///
    /// The handler is called with `(object, key)` and its result is the
    /// result of the read.
    pub fn set_index_miss_handler(&self, handler: Option<Function>) {
        let previous = self.0.index_miss.replace(handler);
        drop(previous);
    }

    /// Set (or clear) the handler called on writes that resolve nothing
    ///
    /// The handler is called with `(object, key, value)`.
    pub fn set_newindex_miss_handler(&self, handler: Option<Function>) {
        let previous = self.0.newindex_miss.replace(handler);
        drop(previous);
    }

    /// Nearest index miss handler in the chain
    pub fn index_miss_handler(&self) -> Option<Function> {
        self.ancestry().find_map(|class| class.own_index_miss_handler())
    }

    /// Nearest newindex miss handler in the chain
    pub fn newindex_miss_handler(&self) -> Option<Function> {
        self.ancestry().find_map(|class| class.own_newindex_miss_handler())
    }

    fn own_index_miss_handler(&self) -> Option<Function> {
        self.0.index_miss.borrow().clone()
    }

    fn own_newindex_miss_handler(&self) -> Option<Function> {
        self.0.newindex_miss.borrow().clone()
    }

    // ------------------------------------------------------------------
    // Class-level signals
    // ------------------------------------------------------------------

    /// This class's own signal table
    pub fn signals(&self) -> &SignalTable {
        &self.0.signals
    }

    /// Connect a class-level handler
    pub fn connect_signal(&self, name: &str, handler: Function) {
        self.0.signals.connect(name, handler);
    }

    /// Disconnect the first matching class-level handler
    pub fn disconnect_signal(&self, name: &str, handler: &Function) -> bool {
        self.0.signals.disconnect(name, handler)
    }

    /// Emit on this class, then on every ancestor up to the root
    ///
    /// Handlers of the most-derived class fire first.
    pub fn emit_signal(&self, rt: &Runtime, name: &str, args: &[Value]) -> ObjectResult<Vec<Value>> {
        let mut results = Vec::new();
        for class in self.ancestry() {
            results.extend(class.0.signals.emit(rt, name, args)?);
        }
        Ok(results)
    }

    pub(crate) fn teardown(&self) {
        self.0.signals.clear();
        self.set_index_miss_handler(None);
        self.set_newindex_miss_handler(None);
        let methods = std::mem::take(&mut *self.0.methods.borrow_mut());
        drop(methods);
        let properties = std::mem::take(&mut *self.0.properties.borrow_mut());
        drop(properties);
    }
}

impl PartialEq for Class {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Class {}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .field("parent", &self.parent().map(Class::name))
            .field("instance_layout_size", &self.0.instance_layout_size)
            .finish()
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.name)
    }
}

/// Iterator over a class and its ancestors
pub struct Ancestry {
    next: Option<Class>,
}

impl Iterator for Ancestry {
    type Item = Class;

    fn next(&mut self) -> Option<Class> {
        let current = self.next.take()?;
        self.next = current.parent().cloned();
        Some(current)
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Describes a class before registration
///
/// ```rust,ignore
/// let tag = rt.register_class(
///     ClassBuilder::new("tag")
///         .payload::<TagData>()
///         .checker(|inst| inst.data::<TagData>().is_some()),
/// )?;
/// ```
pub struct ClassBuilder {
    name: String,
    parent: Option<Class>,
    instance_layout_size: usize,
    allocator: Option<Allocator>,
    initializer: Option<Initializer>,
    destructor: Option<Destructor>,
    checker: Option<Checker>,
    properties: Vec<Property>,
    methods: Vec<(String, Function)>,
}

impl ClassBuilder {
    /// Start describing a class; without `parent` it inherits from the root class
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parent: None,
            instance_layout_size: 0,
            allocator: None,
            initializer: None,
            destructor: None,
            checker: None,
            properties: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Set the parent class
    pub fn parent(mut self, parent: &Class) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// Declare the native payload of this class level
    ///
    /// Every instance gets a `T::default()` slot for this class.
    pub fn payload<T: Default + 'static>(mut self) -> Self {
        fn alloc<T: Default + 'static>() -> Box<dyn Any> {
            Box::new(T::default())
        }
        self.instance_layout_size = std::mem::size_of::<T>();
        self.allocator = Some(alloc::<T>);
        self
    }

    /// Set the initializer
    pub fn initializer<F>(mut self, f: F) -> Self
    where
        F: Fn(&Runtime, &Object) -> ObjectResult<()> + 'static,
    {
        self.initializer = Some(Rc::new(f));
        self
    }

    /// Set the destructor
    pub fn destructor<F>(mut self, f: F) -> Self
    where
        F: Fn(&Instance) + 'static,
    {
        self.destructor = Some(Rc::new(f));
        self
    }

    /// Set the validity checker
    pub fn checker<F>(mut self, f: F) -> Self
    where
        F: Fn(&Instance) -> bool + 'static,
    {
        self.checker = Some(Rc::new(f));
        self
    }

    /// Add a property
    pub fn property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    /// Add a method
    pub fn method(mut self, name: &str, method: Function) -> Self {
        self.methods.push((name.to_string(), method));
        self
    }

    /// Class name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// First property name declared twice on this builder
    pub(crate) fn duplicate_property(&self) -> Option<&str> {
        self.properties.iter().enumerate().find_map(|(idx, prop)| {
            self.properties[..idx]
                .iter()
                .any(|earlier| earlier.name() == prop.name())
                .then(|| prop.name())
        })
    }

    pub(crate) fn build(self, id: ClassId, default_parent: Option<&Class>) -> Class {
        let parent = self.parent.or_else(|| default_parent.cloned());
        let properties = self
            .properties
            .into_iter()
            .map(|prop| (prop.name().to_string(), Rc::new(prop)))
            .collect();
        let methods = self.methods.into_iter().collect();
        Class(Rc::new(ClassInner {
            id,
            name: self.name,
            parent,
            instance_layout_size: self.instance_layout_size,
            allocator: self.allocator,
            initializer: self.initializer,
            destructor: self.destructor,
            checker: self.checker,
            properties: RefCell::new(properties),
            methods: RefCell::new(methods),
            signals: SignalTable::new(),
            index_miss: RefCell::new(None),
            newindex_miss: RefCell::new(None),
            instances: Cell::new(0),
        }))
    }
}

impl fmt::Debug for ClassBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassBuilder")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(Class::name))
            .field("instance_layout_size", &self.instance_layout_size)
            .finish()
    }
}
