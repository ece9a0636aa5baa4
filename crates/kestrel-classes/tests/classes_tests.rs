//! Integration tests for the window manager classes
//!
//! Tests cover:
//! - Window geometry properties and change signals
//! - Client management, validity and focus (global references)
//! - Tag membership (item references) and class-level listeners

use std::cell::RefCell;
use std::rc::Rc;

use kestrel_classes::{register_all, tag, window, DomainClasses, Geometry};
use kestrel_core::{Function, Object, ObjectError, Runtime, Table, Value};

type Log = Rc<RefCell<Vec<String>>>;

fn setup() -> (Runtime, DomainClasses) {
    let rt = Runtime::new();
    let classes = register_all(&rt).unwrap();
    (rt, classes)
}

fn recorder(log: &Log, tag: &str) -> Function {
    let log = log.clone();
    let tag = tag.to_string();
    Function::new(move |_, _| {
        log.borrow_mut().push(tag.clone());
        Ok(Value::Nil)
    })
}

fn managed(rt: &Runtime, classes: &DomainClasses, name: &str) -> Object {
    let props = Table::from_pairs([("name", name)]);
    classes.clients.manage(rt, Some(&props)).unwrap()
}

// ===== Window =====

#[test]
fn test_window_construct_with_geometry() {
    let (rt, classes) = setup();
    let props = Table::from_pairs([("x", 10), ("width", 300), ("height", 200)]);
    let win = rt.construct(&classes.window, Some(&props)).unwrap();

    assert_eq!(rt.read(&win, "x").unwrap(), Value::from(10));
    assert_eq!(rt.read(&win, "y").unwrap(), Value::from(0));
    assert_eq!(rt.read(&win, "width").unwrap(), Value::from(300));
    assert_eq!(rt.read(&win, "opacity").unwrap(), Value::from(1.0));
}

#[test]
fn test_window_write_emits_key_and_geometry() {
    let (rt, classes) = setup();
    let win = rt.construct(&classes.window, None).unwrap();
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    win.connect_signal("property::x", recorder(&log, "x"));
    win.connect_signal("property::geometry", recorder(&log, "geometry"));

    rt.write(&win, "x", 42).unwrap();
    assert_eq!(*log.borrow(), vec!["x", "geometry"]);

    // Unchanged value emits nothing
    log.borrow_mut().clear();
    rt.write(&win, "x", 42).unwrap();
    assert!(log.borrow().is_empty());
}

#[test]
fn test_window_rejects_bad_values() {
    let (rt, classes) = setup();
    let win = rt.construct(&classes.window, None).unwrap();

    assert!(matches!(
        rt.write(&win, "width", 0),
        Err(ObjectError::ArgumentError(_))
    ));
    assert!(matches!(
        rt.write(&win, "opacity", 1.5),
        Err(ObjectError::ArgumentError(_))
    ));
    assert!(matches!(
        rt.write(&win, "x", "left"),
        Err(ObjectError::ArgumentError(_))
    ));
    assert_eq!(window::geometry(&win).unwrap(), Geometry::default());
}

#[test]
fn test_geometry_method_updates_together() {
    let (rt, classes) = setup();
    let win = rt.construct(&classes.window, None).unwrap();
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    win.connect_signal("property::geometry", recorder(&log, "geometry"));

    let method = rt.read(&win, "geometry").unwrap();
    let update = Table::from_pairs([("x", 5), ("y", 6)]);
    let result = method
        .as_function()
        .unwrap()
        .call(&rt, &[Value::from(win.clone()), Value::from(update)])
        .unwrap();

    let result = result.as_table().unwrap();
    assert_eq!(result.get("x"), Value::from(5));
    assert_eq!(result.get("y"), Value::from(6));
    assert_eq!(log.borrow().len(), 1);
}

// ===== Client =====

#[test]
fn test_client_inherits_window_properties() {
    let (rt, classes) = setup();
    let client = managed(&rt, &classes, "xterm");

    assert_eq!(rt.read(&client, "name").unwrap(), Value::from("xterm"));
    rt.write(&client, "width", 640).unwrap();
    assert_eq!(rt.read(&client, "width").unwrap(), Value::from(640));
    assert_eq!(rt.read(&client, "managed").unwrap(), Value::from(true));
    assert!(rt
        .checked_cast(&Value::from(client.clone()), &classes.window)
        .is_ok());
    assert!(rt.stringify(&Value::from(client)).starts_with("client/window/object: "));
}

#[test]
fn test_managed_is_read_only() {
    let (rt, classes) = setup();
    let client = managed(&rt, &classes, "xterm");
    rt.write(&client, "managed", false).unwrap();
    assert_eq!(rt.read(&client, "managed").unwrap(), Value::from(true));
}

#[test]
fn test_manage_signal_reaches_class_listeners() {
    let (rt, classes) = setup();
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    classes
        .clients
        .class()
        .connect_signal("manage", recorder(&log, "client"));
    classes.window.connect_signal("manage", recorder(&log, "window"));

    managed(&rt, &classes, "xterm");
    assert_eq!(*log.borrow(), vec!["client", "window"]);
}

#[test]
fn test_unmanaged_client_fails_cast() {
    let (rt, classes) = setup();
    let client = managed(&rt, &classes, "xterm");
    classes.clients.unmanage(&rt, &client).unwrap();

    let err = rt
        .checked_cast(&Value::from(client.clone()), classes.clients.class())
        .unwrap_err();
    assert_eq!(
        err,
        ObjectError::TypeMismatch {
            expected: "client".to_string(),
            got: "invalid client".to_string()
        }
    );
    assert_eq!(rt.read(&client, "valid").unwrap(), Value::from(false));
    assert!(classes.clients.focus(&rt, &client).is_err());
}

#[test]
fn test_focus_moves_between_clients() {
    let (rt, classes) = setup();
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let first = managed(&rt, &classes, "first");
    let second = managed(&rt, &classes, "second");
    first.connect_signal("focus", recorder(&log, "focus first"));
    first.connect_signal("unfocus", recorder(&log, "unfocus first"));
    second.connect_signal("focus", recorder(&log, "focus second"));

    classes.clients.focus(&rt, &first).unwrap();
    classes.clients.focus(&rt, &first).unwrap();
    classes.clients.focus(&rt, &second).unwrap();

    assert_eq!(
        *log.borrow(),
        vec!["focus first", "unfocus first", "focus second"]
    );
    assert_eq!(classes.clients.focused(&rt), Some(second.clone()));
    assert_eq!(rt.ref_count(second.identity()), 1);
    assert_eq!(rt.ref_count(first.identity()), 0);
}

#[test]
fn test_focus_pins_client() {
    let (rt, classes) = setup();
    let client = managed(&rt, &classes, "xterm");
    let weak = client.downgrade();

    classes.clients.focus(&rt, &client).unwrap();
    drop(client);
    assert!(!weak.is_dead());

    let focused = classes.clients.focused(&rt).unwrap();
    classes.clients.unmanage(&rt, &focused).unwrap();
    drop(focused);
    assert!(weak.is_dead());
    assert!(classes.clients.focused(&rt).is_none());
}

#[test]
fn test_focus_through_method() {
    let (rt, classes) = setup();
    let client = managed(&rt, &classes, "xterm");
    let focus = rt.read(&client, "focus").unwrap();
    focus
        .as_function()
        .unwrap()
        .call(&rt, &[Value::from(client.clone())])
        .unwrap();
    assert_eq!(classes.clients.focused(&rt), Some(client));
}

// ===== Tag =====

#[test]
fn test_tag_holds_clients_while_reachable() {
    let (rt, classes) = setup();
    let web = classes.tags.create(&rt, None).unwrap();
    let client = managed(&rt, &classes, "browser");
    let weak = client.downgrade();

    tag::tag_client(&rt, &web, &client).unwrap();
    tag::tag_client(&rt, &web, &client).unwrap();
    drop(client);
    assert!(!weak.is_dead());
    assert_eq!(tag::clients(&web).unwrap().len(), 1);

    drop(web);
    assert!(weak.is_dead());
}

#[test]
fn test_untag_releases_client() {
    let (rt, classes) = setup();
    let web = classes.tags.create(&rt, None).unwrap();
    let client = managed(&rt, &classes, "browser");
    let weak = client.downgrade();

    tag::tag_client(&rt, &web, &client).unwrap();
    tag::untag_client(&rt, &web, &client).unwrap();
    assert!(tag::clients(&web).unwrap().is_empty());

    drop(client);
    assert!(weak.is_dead());
}

#[test]
fn test_tag_clients_skip_unmanaged() {
    let (rt, classes) = setup();
    let web = classes.tags.create(&rt, None).unwrap();
    let kept = managed(&rt, &classes, "kept");
    let gone = managed(&rt, &classes, "gone");
    tag::tag_client(&rt, &web, &kept).unwrap();
    tag::tag_client(&rt, &web, &gone).unwrap();

    classes.clients.unmanage(&rt, &gone).unwrap();

    let clients = rt.read(&web, "clients").unwrap();
    let list = clients
        .as_function()
        .unwrap()
        .call(&rt, &[Value::from(web.clone())])
        .unwrap();
    let list = list.as_table().unwrap().sequence();
    assert_eq!(list, vec![Value::from(kept)]);
}

#[test]
fn test_tagging_requires_managed_client() {
    let (rt, classes) = setup();
    let web = classes.tags.create(&rt, None).unwrap();
    let win = rt.construct(&classes.window, None).unwrap();

    let err = tag::tag_client(&rt, &web, &win).unwrap_err();
    assert_eq!(
        err,
        ObjectError::TypeMismatch {
            expected: "client".to_string(),
            got: "window".to_string()
        }
    );
}

#[test]
fn test_selected_reaches_class_listeners() {
    let (rt, classes) = setup();
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    classes
        .tags
        .class()
        .connect_signal("property::selected", recorder(&log, "any tag"));

    let props = Table::from_pairs([("name", "web")]);
    let web = classes.tags.create(&rt, Some(&props)).unwrap();
    rt.write(&web, "selected", true).unwrap();
    rt.write(&web, "selected", true).unwrap();

    assert_eq!(*log.borrow(), vec!["any tag"]);
    assert_eq!(rt.read(&web, "name").unwrap(), Value::from("web"));
    assert_eq!(rt.read(&web, "selected").unwrap(), Value::from(true));
}

#[test]
fn test_tagged_signal_on_both_sides() {
    let (rt, classes) = setup();
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let web = classes.tags.create(&rt, None).unwrap();
    let client = managed(&rt, &classes, "browser");
    web.connect_signal("tagged", recorder(&log, "tag"));
    client.connect_signal("tagged", recorder(&log, "client"));

    tag::tag_client(&rt, &web, &client).unwrap();
    assert_eq!(*log.borrow(), vec!["tag", "client"]);
}
