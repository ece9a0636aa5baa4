//! Signal bus
//!
//! A signal table maps event names to ordered handler lists. Instances,
//! classes and the runtime each own one.
//!
//! Emission snapshots the handler list before invoking anything, so handlers
//! may connect or disconnect (including themselves) without affecting the
//! emission in progress. A failing handler is reported and the remaining
//! handlers still run.

use std::cell::RefCell;
use std::fmt;

use rustc_hash::FxHashMap;

use crate::error::ObjectResult;
use crate::runtime::Runtime;
use crate::value::{Function, Value};

/// Name → ordered handler list
#[derive(Default)]
pub struct SignalTable {
    entries: RefCell<FxHashMap<String, Vec<Function>>>,
}

impl SignalTable {
    /// Create an empty signal table
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler; duplicates are allowed and fire once per occurrence
    pub fn connect(&self, name: &str, handler: Function) {
        self.entries
            .borrow_mut()
            .entry(name.to_string())
            .or_default()
            .push(handler);
    }

    /// Remove the first occurrence of `handler` (by identity)
    ///
    /// Returns `true` if a handler was removed.
    pub fn disconnect(&self, name: &str, handler: &Function) -> bool {
        let removed = {
            let mut entries = self.entries.borrow_mut();
            let Some(handlers) = entries.get_mut(name) else {
                return false;
            };
            let removed = handlers
                .iter()
                .position(|h| h.ptr_eq(handler))
                .map(|idx| handlers.remove(idx));
            if handlers.is_empty() {
                entries.remove(name);
            }
            removed
        };
        removed.is_some()
    }

    /// Point-in-time copy of the handlers for `name`
    pub fn handlers(&self, name: &str) -> Vec<Function> {
        self.entries
            .borrow()
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of handlers connected to `name`
    pub fn handler_count(&self, name: &str) -> usize {
        self.entries.borrow().get(name).map_or(0, Vec::len)
    }

    /// Names with at least one handler, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if no handlers are connected
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Drop every handler
    pub fn clear(&self) {
        let entries = std::mem::take(&mut *self.entries.borrow_mut());
        drop(entries);
    }

    /// Invoke every handler connected to `name`, in connection order
    ///
    /// Returns the non-nil results. Handler failures are reported through
    /// the runtime and do not stop the emission. Fails only when the nested
    /// emission depth limit is exceeded.
    pub fn emit(&self, rt: &Runtime, name: &str, args: &[Value]) -> ObjectResult<Vec<Value>> {
        let handlers = self.handlers(name);
        if handlers.is_empty() {
            return Ok(Vec::new());
        }

        let _guard = rt.enter_emission(name)?;
        tracing::trace!(signal = name, handlers = handlers.len(), "emit");

        let mut results = Vec::new();
        for handler in &handlers {
            match handler.call(rt, args) {
                Ok(Value::Nil) => {}
                Ok(value) => results.push(value),
                Err(err) => rt.report_handler_error(name, &err),
            }
        }
        Ok(results)
    }
}

impl fmt::Debug for SignalTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.borrow();
        let mut map = f.debug_map();
        for (name, handlers) in entries.iter() {
            map.entry(name, &handlers.len());
        }
        map.finish()
    }
}
