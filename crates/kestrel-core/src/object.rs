//! Object instances
//!
//! An [`Instance`] is one allocated, script-visible object: its class, one
//! payload slot per class level that declares a payload, its own signal table
//! and its item table (references whose lifetime follows the instance).
//! [`Object`] is the shared handle scripts and native code pass around.
//!
//! Dropping the last `Object` destroys the instance: its signals are torn
//! down, every destructor in the class chain runs (most-derived first), the
//! item table is released and the identity entry is forgotten.

use std::any::Any;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::ops::Deref;
use std::rc::{Rc, Weak};

use crate::class::{Class, ClassId};
use crate::error::ObjectResult;
use crate::registry::RefTable;
use crate::runtime::{Runtime, RuntimeInner};
use crate::signal::SignalTable;
use crate::value::{Function, Identity, Value};

/// Lifecycle state of an instance
///
/// `Unconstructed` has no representation: an instance exists only once it
/// has been allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    /// Allocated, initializers and construction-time properties running
    Initializing,
    /// Fully constructed
    Live,
    /// Destruction in progress or finished (terminal)
    Destroyed,
}

struct PayloadSlot {
    class_id: ClassId,
    data: RefCell<Box<dyn Any>>,
}

/// Instance data shared behind an [`Object`] handle
pub struct Instance {
    class: Class,
    state: Cell<ObjectState>,
    payload: Vec<PayloadSlot>,
    signals: SignalTable,
    items: RefTable,
    runtime: Weak<RuntimeInner>,
}

impl Instance {
    pub(crate) fn allocate(class: &Class, runtime: Weak<RuntimeInner>) -> Self {
        // Root-first, matching initializer order
        let mut levels: Vec<Class> = class.ancestry().collect();
        levels.reverse();
        let payload = levels
            .iter()
            .filter_map(|level| {
                level.allocator().map(|alloc| PayloadSlot {
                    class_id: level.id(),
                    data: RefCell::new(alloc()),
                })
            })
            .collect();

        class.instance_created();
        Self {
            class: class.clone(),
            state: Cell::new(ObjectState::Initializing),
            payload,
            signals: SignalTable::new(),
            items: RefTable::new(),
            runtime,
        }
    }

    /// The exact class this instance was constructed with
    pub fn class(&self) -> &Class {
        &self.class
    }

    /// Lifecycle state
    pub fn state(&self) -> ObjectState {
        self.state.get()
    }

    pub(crate) fn set_state(&self, state: ObjectState) {
        self.state.set(state);
    }

    /// The runtime that created this instance, if it is still alive
    pub fn runtime(&self) -> Option<Runtime> {
        self.runtime.upgrade().map(Runtime::from_inner)
    }

    /// Identity (address) of this instance
    pub fn identity(&self) -> Identity {
        Identity::from_ptr(self as *const Instance)
    }

    /// Instance-level signal table
    pub fn signals(&self) -> &SignalTable {
        &self.signals
    }

    /// Item table: references held for as long as this instance lives
    pub fn items(&self) -> &RefTable {
        &self.items
    }

    /// Check the validity checker of every class in the chain
    pub fn is_valid(&self) -> bool {
        self.state.get() != ObjectState::Destroyed
            && self.class.ancestry().all(|class| class.check(self))
    }

    /// Borrow the payload of type `T`
    ///
    /// Returns `None` if no class level declared a `T` payload or it is
    /// currently borrowed mutably.
    pub fn data<T: 'static>(&self) -> Option<Ref<'_, T>> {
        self.payload.iter().find_map(|slot| {
            let borrowed = slot.data.try_borrow().ok()?;
            Ref::filter_map(borrowed, |data| data.downcast_ref::<T>()).ok()
        })
    }

    /// Mutably borrow the payload of type `T`
    pub fn data_mut<T: 'static>(&self) -> Option<RefMut<'_, T>> {
        self.payload.iter().find_map(|slot| {
            let borrowed = slot.data.try_borrow_mut().ok()?;
            RefMut::filter_map(borrowed, |data| data.downcast_mut::<T>()).ok()
        })
    }

    /// Payload slot of a specific class level
    pub fn data_of(&self, class: &Class) -> Option<Ref<'_, dyn Any>> {
        self.payload
            .iter()
            .find(|slot| slot.class_id == class.id())
            .and_then(|slot| slot.data.try_borrow().ok())
            .map(|data| Ref::map(data, |boxed| boxed.as_ref()))
    }

    /// `class/parent/.../root: 0x...`
    pub fn describe(&self) -> String {
        let mut chain: Vec<&str> = Vec::new();
        let mut current = Some(&self.class);
        while let Some(class) = current {
            chain.push(class.name());
            current = class.parent();
        }
        format!("{}: {}", chain.join("/"), self.identity())
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        self.state.set(ObjectState::Destroyed);
        tracing::debug!(object = %self.describe(), "destroy");

        self.signals.clear();

        for class in self.class.ancestry() {
            if let Some(destructor) = class.destructor() {
                destructor(self);
            }
        }

        let items = self.items.clear();
        match self.runtime.upgrade() {
            Some(inner) => {
                for item in items {
                    if let Some(id) = item.identity() {
                        inner.registry.release(id, Some(item));
                    }
                }
                inner.registry.forget(self.identity());
            }
            None => drop(items),
        }
        self.class.instance_dropped();
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("class", &self.class.name())
            .field("identity", &self.identity())
            .field("state", &self.state.get())
            .finish()
    }
}

/// Shared handle to an instance
#[derive(Clone)]
pub struct Object(Rc<Instance>);

impl Object {
    pub(crate) fn new(instance: Instance) -> Self {
        Object(Rc::new(instance))
    }

    /// Identity (address) of the instance
    pub fn identity(&self) -> Identity {
        Identity::from_ptr(Rc::as_ptr(&self.0))
    }

    /// Compare by identity
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Create a weak handle
    pub fn downgrade(&self) -> WeakObject {
        WeakObject(Rc::downgrade(&self.0))
    }

    /// Number of strong handles
    pub fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    /// Connect an instance-level handler
    pub fn connect_signal(&self, name: &str, handler: Function) {
        self.signals.connect(name, handler);
    }

    /// Disconnect the first matching instance-level handler
    pub fn disconnect_signal(&self, name: &str, handler: &Function) -> bool {
        self.signals.disconnect(name, handler)
    }

    /// Emit `name` on this object
    ///
    /// Instance handlers fire first, then the handlers of the object's class
    /// and its ancestors. Every handler receives the object followed by
    /// `args`.
    pub fn emit_signal(&self, rt: &Runtime, name: &str, args: &[Value]) -> ObjectResult<Vec<Value>> {
        let mut full_args = Vec::with_capacity(args.len() + 1);
        full_args.push(Value::Object(self.clone()));
        full_args.extend_from_slice(args);

        let mut results = self.signals.emit(rt, name, &full_args)?;
        results.extend(self.class.emit_signal(rt, name, &full_args)?);
        Ok(results)
    }

    /// Emit `property::<name>`
    pub fn emit_property_changed(&self, rt: &Runtime, name: &str) -> ObjectResult<()> {
        self.emit_signal(rt, &format!("property::{}", name), &[])?;
        Ok(())
    }
}

impl Deref for Object {
    type Target = Instance;

    fn deref(&self) -> &Instance {
        &self.0
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Object {}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

/// Weak handle to an instance
#[derive(Clone)]
pub struct WeakObject(Weak<Instance>);

impl WeakObject {
    /// Upgrade if the instance is still alive
    pub fn upgrade(&self) -> Option<Object> {
        self.0.upgrade().map(Object)
    }

    /// Check if the instance has been destroyed
    pub fn is_dead(&self) -> bool {
        self.0.strong_count() == 0
    }
}

impl fmt::Debug for WeakObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakObject({})", Identity::from_ptr(self.0.as_ptr()))
    }
}
