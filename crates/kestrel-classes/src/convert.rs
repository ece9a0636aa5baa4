//! Property value conversion and payload access

use std::cell::{Ref, RefMut};

use kestrel_core::{Object, ObjectError, ObjectResult, Property, Value};

fn expected(property: &str, kind: &str, value: &Value) -> ObjectError {
    ObjectError::ArgumentError(format!(
        "{}: expected {}, got {}",
        property,
        kind,
        value.type_name()
    ))
}

pub(crate) fn to_integer(property: &str, value: &Value) -> ObjectResult<i64> {
    value
        .as_integer()
        .ok_or_else(|| expected(property, "integer", value))
}

pub(crate) fn to_number(property: &str, value: &Value) -> ObjectResult<f64> {
    value
        .as_number()
        .ok_or_else(|| expected(property, "number", value))
}

pub(crate) fn to_bool(property: &str, value: &Value) -> ObjectResult<bool> {
    value
        .as_bool()
        .ok_or_else(|| expected(property, "boolean", value))
}

pub(crate) fn to_string(property: &str, value: &Value) -> ObjectResult<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| expected(property, "string", value))
}

/// Borrow the `T` payload of `obj`
pub(crate) fn payload<'a, T: 'static>(obj: &'a Object, class: &str) -> ObjectResult<Ref<'a, T>> {
    obj.data::<T>().ok_or_else(|| ObjectError::TypeMismatch {
        expected: class.to_string(),
        got: obj.class().name().to_string(),
    })
}

/// Mutably borrow the `T` payload of `obj`
pub(crate) fn payload_mut<'a, T: 'static>(
    obj: &'a Object,
    class: &str,
) -> ObjectResult<RefMut<'a, T>> {
    obj.data_mut::<T>().ok_or_else(|| ObjectError::TypeMismatch {
        expected: class.to_string(),
        got: obj.class().name().to_string(),
    })
}

/// Readable, writable, constructible payload field
///
/// Writes that change the value emit `property::<name>`.
pub(crate) fn field_property<D, T>(
    class: &'static str,
    name: &'static str,
    get: fn(&D) -> T,
    set: fn(&mut D, T),
    convert: fn(&str, &Value) -> ObjectResult<T>,
) -> Property
where
    D: 'static,
    T: PartialEq + Into<Value> + 'static,
{
    Property::new(name)
        .on_new(move |_, obj, value| {
            let value = convert(name, value)?;
            set(&mut *payload_mut::<D>(obj, class)?, value);
            Ok(())
        })
        .on_read(move |_, obj| {
            let data = payload::<D>(obj, class)?;
            Ok(get(&*data).into())
        })
        .on_write(move |rt, obj, value| {
            let value = convert(name, value)?;
            let changed = {
                let mut data = payload_mut::<D>(obj, class)?;
                let changed = get(&*data) != value;
                set(&mut *data, value);
                changed
            };
            if changed {
                obj.emit_property_changed(rt, name)?;
            }
            Ok(())
        })
}
