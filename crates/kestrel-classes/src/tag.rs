//! `tag` class
//!
//! A tag groups clients. Tagged clients are pinned in the tag's item table,
//! so they stay referenced exactly as long as the tag itself is reachable.

use kestrel_core::{
    arg_object, Class, ClassBuilder, Function, Identity, Object, ObjectError, ObjectResult,
    Runtime, Table, Value,
};

use crate::client::CLIENT;
use crate::convert::{field_property, payload, payload_mut, to_bool, to_string};

/// Class name
pub const TAG: &str = "tag";

/// Native payload of a tag
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TagData {
    /// Display name
    pub name: String,
    /// Shown on its screen
    pub selected: bool,
    /// Usable (deactivated tags are being removed)
    pub activated: bool,
    /// Item-table identities of the tagged clients, in tagging order
    clients: Vec<Identity>,
}

/// The registered `tag` class
#[derive(Clone, Debug)]
pub struct TagClass {
    class: Class,
}

impl TagClass {
    /// Register the `tag` class
    pub fn register(rt: &Runtime) -> ObjectResult<Self> {
        let class = rt.register_class(
            ClassBuilder::new(TAG)
                .payload::<TagData>()
                .property(field_property(
                    TAG,
                    "name",
                    |data: &TagData| data.name.clone(),
                    |data: &mut TagData, value| data.name = value,
                    to_string,
                ))
                .property(field_property(
                    TAG,
                    "selected",
                    |data: &TagData| data.selected,
                    |data: &mut TagData, value| data.selected = value,
                    to_bool,
                ))
                .property(field_property(
                    TAG,
                    "activated",
                    |data: &TagData| data.activated,
                    |data: &mut TagData, value| data.activated = value,
                    to_bool,
                ))
                .method("clients", Function::named("clients", clients_method))
                .method("tag_client", Function::named("tag_client", tag_client_method))
                .method(
                    "untag_client",
                    Function::named("untag_client", untag_client_method),
                ),
        )?;
        Ok(Self { class })
    }

    /// The class descriptor
    pub fn class(&self) -> &Class {
        &self.class
    }

    /// Construct a tag
    pub fn create(&self, rt: &Runtime, props: Option<&Table>) -> ObjectResult<Object> {
        rt.construct(&self.class, props)
    }
}

fn cast(rt: &Runtime, value: &Object, class_name: &str) -> ObjectResult<Object> {
    let class = rt
        .class_by_name(class_name)
        .ok_or_else(|| ObjectError::UnknownClass(class_name.to_string()))?;
    rt.checked_cast(&Value::from(value.clone()), &class)
}

/// Attach `client` to `tag`
///
/// The client must be a managed client. Tagging twice is a no-op.
pub fn tag_client(rt: &Runtime, tag: &Object, client: &Object) -> ObjectResult<()> {
    cast(rt, tag, TAG)?;
    cast(rt, client, CLIENT)?;

    let already = payload::<TagData>(tag, TAG)?
        .clients
        .contains(&client.identity());
    if already {
        return Ok(());
    }

    let id = rt.ref_item(&Value::from(tag.clone()), &Value::from(client.clone()))?;
    payload_mut::<TagData>(tag, TAG)?.clients.push(id);
    tracing::debug!(tag = %tag, client = %client, "tagged");

    tag.emit_signal(rt, "tagged", &[Value::from(client.clone())])?;
    client.emit_signal(rt, "tagged", &[Value::from(tag.clone())])?;
    Ok(())
}

/// Detach `client` from `tag`; a no-op if it was not tagged
pub fn untag_client(rt: &Runtime, tag: &Object, client: &Object) -> ObjectResult<()> {
    cast(rt, tag, TAG)?;

    let id = client.identity();
    let removed = {
        let mut data = payload_mut::<TagData>(tag, TAG)?;
        match data.clients.iter().position(|c| *c == id) {
            Some(idx) => {
                data.clients.remove(idx);
                true
            }
            None => false,
        }
    };
    if !removed {
        return Ok(());
    }

    rt.unref_item(&Value::from(tag.clone()), id)?;
    tracing::debug!(tag = %tag, client = %client, "untagged");

    tag.emit_signal(rt, "untagged", &[Value::from(client.clone())])?;
    client.emit_signal(rt, "untagged", &[Value::from(tag.clone())])?;
    Ok(())
}

/// Tagged clients that are still valid, in tagging order
pub fn clients(tag: &Object) -> ObjectResult<Vec<Object>> {
    let ids = payload::<TagData>(tag, TAG)?.clients.clone();
    Ok(ids
        .into_iter()
        .filter_map(|id| tag.items().get(id))
        .filter_map(|value| value.as_object().cloned())
        .filter(|client| client.is_valid())
        .collect())
}

fn clients_method(_rt: &Runtime, args: &[Value]) -> ObjectResult<Value> {
    let tag = arg_object(args, 0, "clients")?;
    let list = clients(tag)?;
    Ok(Value::from(Table::from_sequence(list)))
}

fn tag_client_method(rt: &Runtime, args: &[Value]) -> ObjectResult<Value> {
    let tag = arg_object(args, 0, "tag_client")?;
    let client = arg_object(args, 1, "tag_client")?;
    tag_client(rt, tag, client)?;
    Ok(Value::Nil)
}

fn untag_client_method(rt: &Runtime, args: &[Value]) -> ObjectResult<Value> {
    let tag = arg_object(args, 0, "untag_client")?;
    let client = arg_object(args, 1, "untag_client")?;
    untag_client(rt, tag, client)?;
    Ok(Value::Nil)
}
