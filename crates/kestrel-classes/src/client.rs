//! `client` class
//!
//! A client is a managed top-level window. It stays valid while managed;
//! once unmanaged, checked casts to `client` fail even though the object
//! itself may still be referenced.
//!
//! The focused client is pinned in the global reference table: focus must
//! survive independently of any tag or other owner.

use std::cell::Cell;
use std::rc::Rc;

use kestrel_core::{
    arg_object, Class, ClassBuilder, Function, Identity, Object, ObjectError, ObjectResult,
    Property, Runtime, Table, Value,
};

use crate::convert::{field_property, payload, payload_mut, to_bool, to_string};

/// Class name
pub const CLIENT: &str = "client";

/// Native payload of a client
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClientData {
    /// Window title
    pub name: String,
    /// Demands attention
    pub urgent: bool,
    /// Iconified
    pub minimized: bool,
    /// Managed by the window manager
    pub managed: bool,
}

/// Focus bookkeeping shared with the class's method closures
///
/// Method closures live in the class's own method table, so they hold this
/// state and look the class up by name instead of owning it.
struct FocusState {
    class_name: String,
    focused: Cell<Option<Identity>>,
}

impl FocusState {
    fn focused(&self, rt: &Runtime) -> Option<Object> {
        let id = self.focused.get()?;
        rt.push(id).and_then(|value| value.as_object().cloned())
    }

    fn ensure_managed(&self, rt: &Runtime, client: &Object) -> ObjectResult<()> {
        let class = rt
            .class_by_name(&self.class_name)
            .ok_or_else(|| ObjectError::UnknownClass(self.class_name.clone()))?;
        rt.checked_cast(&Value::from(client.clone()), &class)?;
        Ok(())
    }

    fn focus(&self, rt: &Runtime, client: &Object) -> ObjectResult<()> {
        self.ensure_managed(rt, client)?;
        if self.focused.get() == Some(client.identity()) {
            return Ok(());
        }

        self.release(rt)?;
        let id = rt.ref_value(&Value::from(client.clone()))?;
        self.focused.set(Some(id));
        tracing::debug!(client = %client, "focus");
        client.emit_signal(rt, "focus", &[])?;
        Ok(())
    }

    /// Unpin the focused client and send it `unfocus`
    fn release(&self, rt: &Runtime) -> ObjectResult<()> {
        let Some(id) = self.focused.take() else {
            return Ok(());
        };
        // Keep it alive across the signal
        let previous = rt.push(id);
        rt.unref(id)?;
        if let Some(previous) = previous.as_ref().and_then(Value::as_object) {
            previous.emit_signal(rt, "unfocus", &[])?;
        }
        Ok(())
    }

    fn unmanage(&self, rt: &Runtime, client: &Object) -> ObjectResult<()> {
        if self.focused.get() == Some(client.identity()) {
            self.release(rt)?;
        }

        let was_managed = {
            let mut data = payload_mut::<ClientData>(client, CLIENT)?;
            std::mem::replace(&mut data.managed, false)
        };
        if !was_managed {
            return Ok(());
        }

        tracing::debug!(client = %client, "unmanage");
        client.emit_signal(rt, "unmanage", &[])?;
        client.emit_property_changed(rt, "managed")
    }
}

/// The registered `client` class
#[derive(Clone)]
pub struct ClientClass {
    class: Class,
    state: Rc<FocusState>,
}

impl ClientClass {
    /// Register the `client` class as a subclass of `window`
    pub fn register(rt: &Runtime, window: &Class) -> ObjectResult<Self> {
        let state = Rc::new(FocusState {
            class_name: CLIENT.to_string(),
            focused: Cell::new(None),
        });

        let focus_state = state.clone();
        let unmanage_state = state.clone();
        let class = rt.register_class(
            ClassBuilder::new(CLIENT)
                .parent(window)
                .payload::<ClientData>()
                .checker(|inst| inst.data::<ClientData>().map_or(false, |data| data.managed))
                .destructor(|inst| {
                    if let Some(data) = inst.data::<ClientData>() {
                        tracing::debug!(client = %data.name, "client destroyed");
                    }
                })
                .property(field_property(
                    CLIENT,
                    "name",
                    |data: &ClientData| data.name.clone(),
                    |data: &mut ClientData, value| data.name = value,
                    to_string,
                ))
                .property(field_property(
                    CLIENT,
                    "urgent",
                    |data: &ClientData| data.urgent,
                    |data: &mut ClientData, value| data.urgent = value,
                    to_bool,
                ))
                .property(field_property(
                    CLIENT,
                    "minimized",
                    |data: &ClientData| data.minimized,
                    |data: &mut ClientData, value| data.minimized = value,
                    to_bool,
                ))
                .property(Property::new("managed").on_read(|_, obj| {
                    let data = payload::<ClientData>(obj, CLIENT)?;
                    Ok(Value::from(data.managed))
                }))
                .method(
                    "focus",
                    Function::named("focus", move |rt, args| {
                        let client = arg_object(args, 0, "focus")?;
                        focus_state.focus(rt, client)?;
                        Ok(Value::Nil)
                    }),
                )
                .method(
                    "unmanage",
                    Function::named("unmanage", move |rt, args| {
                        let client = arg_object(args, 0, "unmanage")?;
                        unmanage_state.unmanage(rt, client)?;
                        Ok(Value::Nil)
                    }),
                ),
        )?;

        Ok(Self { class, state })
    }

    /// The class descriptor
    pub fn class(&self) -> &Class {
        &self.class
    }

    /// Construct a managed client and announce it with the `manage` signal
    pub fn manage(&self, rt: &Runtime, props: Option<&Table>) -> ObjectResult<Object> {
        let client = rt.construct(&self.class, props)?;
        payload_mut::<ClientData>(&client, CLIENT)?.managed = true;
        tracing::debug!(client = %client, "manage");
        client.emit_signal(rt, "manage", &[])?;
        Ok(client)
    }

    /// Stop managing `client`
    ///
    /// Drops focus if `client` has it, invalidates it and emits `unmanage`.
    pub fn unmanage(&self, rt: &Runtime, client: &Object) -> ObjectResult<()> {
        self.state.unmanage(rt, client)
    }

    /// Give focus to `client`
    ///
    /// The previous client receives `unfocus`, then `client` receives
    /// `focus`. Focusing an unmanaged client is a type error.
    pub fn focus(&self, rt: &Runtime, client: &Object) -> ObjectResult<()> {
        self.state.focus(rt, client)
    }

    /// The focused client, if any
    pub fn focused(&self, rt: &Runtime) -> Option<Object> {
        self.state.focused(rt)
    }
}
