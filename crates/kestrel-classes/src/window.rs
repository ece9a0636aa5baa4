//! `window` class
//!
//! Base class of everything that occupies screen space. Geometry keys are
//! writable one at a time through properties, or together through the
//! `geometry` method; every change emits `property::<key>` followed by a
//! single `property::geometry`.

use kestrel_core::{
    arg_object, Class, ClassBuilder, Function, Object, ObjectError, ObjectResult, Property,
    Runtime, Table, Value,
};

use crate::convert::{payload, payload_mut, to_integer, to_number};

/// Class name
pub const WINDOW: &str = "window";

/// Keys of the geometry properties
pub const GEOMETRY_KEYS: [&str; 4] = ["x", "y", "width", "height"];

/// Window geometry in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Left edge
    pub x: i64,
    /// Top edge
    pub y: i64,
    /// Width (> 0)
    pub width: i64,
    /// Height (> 0)
    pub height: i64,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            width: 1,
            height: 1,
        }
    }
}

impl Geometry {
    fn field(&self, key: &str) -> Option<i64> {
        match key {
            "x" => Some(self.x),
            "y" => Some(self.y),
            "width" => Some(self.width),
            "height" => Some(self.height),
            _ => None,
        }
    }

    fn field_mut(&mut self, key: &str) -> Option<&mut i64> {
        match key {
            "x" => Some(&mut self.x),
            "y" => Some(&mut self.y),
            "width" => Some(&mut self.width),
            "height" => Some(&mut self.height),
            _ => None,
        }
    }

    /// Keys whose value differs from `other`
    fn changed_keys(&self, other: &Geometry) -> Vec<&'static str> {
        GEOMETRY_KEYS
            .iter()
            .copied()
            .filter(|key| self.field(key) != other.field(key))
            .collect()
    }

    fn to_table(self) -> Table {
        Table::from_pairs(GEOMETRY_KEYS.iter().map(|key| (*key, self.field(key))))
    }
}

/// Native payload of a window
#[derive(Debug, Clone, PartialEq)]
pub struct WindowData {
    /// Position and size
    pub geometry: Geometry,
    /// Opacity in `[0, 1]`
    pub opacity: f64,
    /// Border width in pixels
    pub border_width: i64,
}

impl Default for WindowData {
    fn default() -> Self {
        Self {
            geometry: Geometry::default(),
            opacity: 1.0,
            border_width: 0,
        }
    }
}

/// Register the `window` class
pub fn register(rt: &Runtime) -> ObjectResult<Class> {
    let mut builder = ClassBuilder::new(WINDOW).payload::<WindowData>();
    for key in GEOMETRY_KEYS {
        builder = builder.property(geometry_property(key));
    }
    rt.register_class(
        builder
            .property(opacity_property())
            .property(border_width_property())
            .method("geometry", Function::named("geometry", geometry_method)),
    )
}

/// Current geometry of `window`
pub fn geometry(window: &Object) -> ObjectResult<Geometry> {
    Ok(payload::<WindowData>(window, WINDOW)?.geometry)
}

/// Replace the geometry of `window`, emitting signals for what changed
pub fn set_geometry(rt: &Runtime, window: &Object, geometry: Geometry) -> ObjectResult<()> {
    validate_size("width", geometry.width)?;
    validate_size("height", geometry.height)?;

    let changed = {
        let mut data = payload_mut::<WindowData>(window, WINDOW)?;
        let changed = geometry.changed_keys(&data.geometry);
        data.geometry = geometry;
        changed
    };

    if changed.is_empty() {
        return Ok(());
    }
    for key in &changed {
        window.emit_property_changed(rt, key)?;
    }
    window.emit_property_changed(rt, "geometry")
}

fn validate_size(key: &str, value: i64) -> ObjectResult<()> {
    if value <= 0 {
        return Err(ObjectError::ArgumentError(format!(
            "{}: must be positive, got {}",
            key, value
        )));
    }
    Ok(())
}

/// Store one geometry key, returning whether it changed
fn store_geometry_key(window: &Object, key: &str, value: &Value) -> ObjectResult<bool> {
    let value = to_integer(key, value)?;
    if key == "width" || key == "height" {
        validate_size(key, value)?;
    }
    let mut data = payload_mut::<WindowData>(window, WINDOW)?;
    match data.geometry.field_mut(key) {
        Some(slot) if *slot != value => {
            *slot = value;
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn geometry_property(key: &'static str) -> Property {
    Property::new(key)
        .on_new(move |_, obj, value| store_geometry_key(obj, key, value).map(|_| ()))
        .on_read(move |_, obj| {
            let data = payload::<WindowData>(obj, WINDOW)?;
            Ok(data.geometry.field(key).map(Value::from).unwrap_or_default())
        })
        .on_write(move |rt, obj, value| {
            if store_geometry_key(obj, key, value)? {
                obj.emit_property_changed(rt, key)?;
                obj.emit_property_changed(rt, "geometry")?;
            }
            Ok(())
        })
}

fn store_opacity(window: &Object, value: &Value) -> ObjectResult<bool> {
    let opacity = to_number("opacity", value)?;
    if !(0.0..=1.0).contains(&opacity) {
        return Err(ObjectError::ArgumentError(format!(
            "opacity: must be between 0 and 1, got {}",
            opacity
        )));
    }
    let mut data = payload_mut::<WindowData>(window, WINDOW)?;
    let changed = data.opacity != opacity;
    data.opacity = opacity;
    Ok(changed)
}

fn opacity_property() -> Property {
    Property::new("opacity")
        .on_new(|_, obj, value| store_opacity(obj, value).map(|_| ()))
        .on_read(|_, obj| Ok(Value::from(payload::<WindowData>(obj, WINDOW)?.opacity)))
        .on_write(|rt, obj, value| {
            if store_opacity(obj, value)? {
                obj.emit_property_changed(rt, "opacity")?;
            }
            Ok(())
        })
}

fn store_border_width(window: &Object, value: &Value) -> ObjectResult<bool> {
    let width = to_integer("border_width", value)?;
    if width < 0 {
        return Err(ObjectError::ArgumentError(format!(
            "border_width: must not be negative, got {}",
            width
        )));
    }
    let mut data = payload_mut::<WindowData>(window, WINDOW)?;
    let changed = data.border_width != width;
    data.border_width = width;
    Ok(changed)
}

fn border_width_property() -> Property {
    Property::new("border_width")
        .on_new(|_, obj, value| store_border_width(obj, value).map(|_| ()))
        .on_read(|_, obj| Ok(Value::from(payload::<WindowData>(obj, WINDOW)?.border_width)))
        .on_write(|rt, obj, value| {
            if store_border_width(obj, value)? {
                obj.emit_property_changed(rt, "border_width")?;
            }
            Ok(())
        })
}

/// `window:geometry([table])`: optionally update, then return the geometry
fn geometry_method(rt: &Runtime, args: &[Value]) -> ObjectResult<Value> {
    let window = arg_object(args, 0, "geometry")?;
    let mut current = geometry(window)?;

    if let Some(update) = args.get(1).and_then(Value::as_table) {
        for key in GEOMETRY_KEYS {
            let value = update.get(key);
            if value.is_nil() {
                continue;
            }
            if let Some(slot) = current.field_mut(key) {
                *slot = to_integer(key, &value)?;
            }
        }
        set_geometry(rt, window, current)?;
    }

    Ok(Value::from(current.to_table()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changed_keys() {
        let a = Geometry::default();
        let b = Geometry {
            x: 5,
            width: 20,
            ..a
        };
        assert_eq!(b.changed_keys(&a), vec!["x", "width"]);
        assert!(a.changed_keys(&a).is_empty());
    }

    #[test]
    fn test_geometry_table() {
        let table = Geometry {
            x: 1,
            y: 2,
            width: 3,
            height: 4,
        }
        .to_table();
        assert_eq!(table.get("x"), Value::from(1));
        assert_eq!(table.get("height"), Value::from(4));
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_defaults() {
        let data = WindowData::default();
        assert_eq!(data.opacity, 1.0);
        assert_eq!(data.geometry.width, 1);
    }
}
