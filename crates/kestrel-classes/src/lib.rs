//! Kestrel window manager classes
//!
//! Scriptable classes built on `kestrel-core` through its public contract:
//! - `window`: geometry, opacity and border width
//! - `client` (a `window`): managed top-level windows with focus
//! - `tag`: groups of clients

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod client;
mod convert;
pub mod tag;
pub mod window;

pub use client::{ClientClass, ClientData, CLIENT};
pub use tag::{TagClass, TagData, TAG};
pub use window::{Geometry, WindowData, WINDOW};

use kestrel_core::{Class, ObjectResult, Runtime};

/// Handles to the registered classes
#[derive(Clone)]
pub struct DomainClasses {
    /// `window`
    pub window: Class,
    /// `client`
    pub clients: ClientClass,
    /// `tag`
    pub tags: TagClass,
}

/// Register `window`, `client` and `tag` on `rt`
pub fn register_all(rt: &Runtime) -> ObjectResult<DomainClasses> {
    let window = window::register(rt)?;
    let clients = ClientClass::register(rt, &window)?;
    let tags = TagClass::register(rt)?;
    tracing::debug!(classes = rt.classes().len(), "domain classes registered");
    Ok(DomainClasses {
        window,
        clients,
        tags,
    })
}
