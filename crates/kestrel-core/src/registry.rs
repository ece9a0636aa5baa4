//! Reference registry
//!
//! Two tables decide how long script values live when native code holds on
//! to them:
//!
//! - the **identity table** maps an [`Identity`] to a weak handle, so
//!   [`ReferenceRegistry::push`] returns the same value for the same identity
//!   for as long as anything keeps the value alive;
//! - a **reference table** ([`RefTable`]) pins values with an explicit count.
//!   The runtime owns one global table; every instance owns one more (its
//!   item table) whose pins last only as long as the instance.
//!
//! Values removed from a table are always dropped after the table's borrow
//! is released: dropping an object runs its destructors, which may call
//! back into the registry.

use std::cell::{Cell, RefCell};
use std::fmt;

use rustc_hash::FxHashMap;

use crate::error::{ObjectError, ObjectResult};
use crate::value::{Identity, Value, WeakValue};

struct RefEntry {
    value: Value,
    count: usize,
}

/// Counted strong references keyed by identity
#[derive(Default)]
pub struct RefTable {
    entries: RefCell<FxHashMap<Identity, RefEntry>>,
}

impl RefTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the count for `value`, pinning it on 0 → 1
    ///
    /// Returns the identity and whether this was the first reference.
    pub fn incref(&self, value: &Value) -> ObjectResult<(Identity, bool)> {
        let id = value
            .identity()
            .ok_or_else(|| ObjectError::NotReferenceable(value.type_name().to_string()))?;
        let mut entries = self.entries.borrow_mut();
        let entry = entries.entry(id).or_insert_with(|| RefEntry {
            value: value.clone(),
            count: 0,
        });
        entry.count += 1;
        Ok((id, entry.count == 1))
    }

    /// Decrement the count for `id`
    ///
    /// Returns the value when the count reaches zero so the caller can drop
    /// it outside any borrow. Decrementing an identity that holds no count is
    /// a programming error: it panics in debug builds and returns
    /// [`ObjectError::UnbalancedUnref`] otherwise.
    pub fn decref(&self, id: Identity) -> ObjectResult<Option<Value>> {
        let mut entries = self.entries.borrow_mut();
        let Some(entry) = entries.get_mut(&id) else {
            drop(entries);
            tracing::error!(identity = %id, "unref of a value that holds no reference");
            if cfg!(debug_assertions) {
                panic!("unbalanced unref of {}", id);
            }
            return Err(ObjectError::UnbalancedUnref(id.addr()));
        };
        entry.count -= 1;
        if entry.count == 0 {
            Ok(entries.remove(&id).map(|e| e.value))
        } else {
            Ok(None)
        }
    }

    /// Current count for `id` (0 if not referenced)
    pub fn count(&self, id: Identity) -> usize {
        self.entries.borrow().get(&id).map_or(0, |e| e.count)
    }

    /// Get the pinned value for `id`
    pub fn get(&self, id: Identity) -> Option<Value> {
        self.entries.borrow().get(&id).map(|e| e.value.clone())
    }

    /// Number of pinned values
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Check if nothing is pinned
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Pinned values, in no particular order
    pub fn values(&self) -> Vec<Value> {
        self.entries
            .borrow()
            .values()
            .map(|e| e.value.clone())
            .collect()
    }

    /// Unpin everything, returning the released values
    pub fn clear(&self) -> Vec<Value> {
        let entries = std::mem::take(&mut *self.entries.borrow_mut());
        entries.into_values().map(|e| e.value).collect()
    }
}

impl fmt::Debug for RefTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefTable").field("len", &self.len()).finish()
    }
}

/// Identity table size below which `store` never sweeps
const MIN_PRUNE_THRESHOLD: usize = 64;

/// Process-wide identity table plus the global reference table
pub struct ReferenceRegistry {
    identities: RefCell<FxHashMap<Identity, WeakValue>>,
    refs: RefTable,
    /// Identity table size that triggers the next sweep in `store`
    prune_at: Cell<usize>,
}

impl Default for ReferenceRegistry {
    fn default() -> Self {
        Self {
            identities: RefCell::default(),
            refs: RefTable::default(),
            prune_at: Cell::new(MIN_PRUNE_THRESHOLD),
        }
    }
}

impl ReferenceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value` under its identity (weakly); idempotent
    ///
    /// Entries of values dropped while unpinned are swept once the table
    /// has doubled since the last sweep.
    pub fn store(&self, value: &Value) -> ObjectResult<Identity> {
        let (id, weak) = value
            .identity()
            .zip(value.downgrade())
            .ok_or_else(|| ObjectError::NotReferenceable(value.type_name().to_string()))?;
        let (previous, len) = {
            let mut identities = self.identities.borrow_mut();
            let previous = identities.insert(id, weak);
            (previous, identities.len())
        };
        drop(previous);

        if len >= self.prune_at.get() {
            let pruned = self.prune();
            let live = self.identity_count();
            self.prune_at.set((live * 2).max(MIN_PRUNE_THRESHOLD));
            tracing::trace!(pruned, live, "identity table swept");
        }
        Ok(id)
    }

    /// Look up the value registered under `id`
    ///
    /// Returns `None` if `id` was never stored or the value has been dropped.
    pub fn push(&self, id: Identity) -> Option<Value> {
        let weak = self.identities.borrow().get(&id).cloned()?;
        match weak.upgrade() {
            Some(value) => Some(value),
            None => {
                self.forget(id);
                None
            }
        }
    }

    /// Pin `value` in the global table
    ///
    /// The first reference also stores the value in the identity table.
    pub fn ref_value(&self, value: &Value) -> ObjectResult<Identity> {
        let (id, first) = self.refs.incref(value)?;
        if first {
            self.store(value)?;
        }
        tracing::trace!(identity = %id, count = self.refs.count(id), "ref");
        Ok(id)
    }

    /// Release one global reference
    ///
    /// When this was the last holder the identity entry goes too; otherwise
    /// it stays for as long as something else keeps the value alive.
    pub fn unref(&self, id: Identity) -> ObjectResult<()> {
        let released = self.refs.decref(id)?;
        tracing::trace!(identity = %id, count = self.refs.count(id), "unref");
        self.release(id, released);
        Ok(())
    }

    /// Drop a value released from any reference table, then forget its
    /// identity if that was the last strong handle
    pub(crate) fn release(&self, id: Identity, released: Option<Value>) {
        let Some(value) = released else {
            return;
        };
        let weak = value.downgrade();
        drop(value);
        if weak.map_or(true, |weak| weak.is_dead()) {
            self.forget(id);
        }
    }

    /// Global reference count for `id`
    pub fn ref_count(&self, id: Identity) -> usize {
        self.refs.count(id)
    }

    /// Check if `id` is pinned by the global table
    pub fn is_pinned(&self, id: Identity) -> bool {
        self.refs.count(id) > 0
    }

    /// Global reference table
    pub fn refs(&self) -> &RefTable {
        &self.refs
    }

    /// Remove the identity entry for `id`
    ///
    /// Called while an object is being destroyed, possibly from inside
    /// another registry operation; a busy table keeps the dead entry, which
    /// `push` prunes later.
    pub fn forget(&self, id: Identity) {
        if let Ok(mut identities) = self.identities.try_borrow_mut() {
            let removed = identities.remove(&id);
            drop(identities);
            drop(removed);
        }
    }

    /// Number of identity entries (live or not yet pruned)
    pub fn identity_count(&self) -> usize {
        self.identities.borrow().len()
    }

    /// Drop identity entries whose values are gone
    pub fn prune(&self) -> usize {
        let Ok(mut identities) = self.identities.try_borrow_mut() else {
            return 0;
        };
        let before = identities.len();
        identities.retain(|_, weak| !weak.is_dead());
        before - identities.len()
    }

    /// Release every global reference
    pub(crate) fn release_all(&self) {
        let released = self.refs.clear();
        drop(released);
    }
}

impl fmt::Debug for ReferenceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceRegistry")
            .field("identities", &self.identity_count())
            .field("refs", &self.refs.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Function, Table};

    #[test]
    fn test_store_and_push_return_same_value() {
        let registry = ReferenceRegistry::new();
        let table = Value::from(Table::new());
        let id = registry.store(&table).unwrap();

        assert_eq!(registry.push(id), Some(table.clone()));
        assert_eq!(registry.push(id), Some(table.clone()));
        // Idempotent
        assert_eq!(registry.store(&table).unwrap(), id);
        assert_eq!(registry.identity_count(), 1);
    }

    #[test]
    fn test_push_unknown_is_none() {
        let registry = ReferenceRegistry::new();
        let table = Table::new();
        assert!(registry.push(table.identity()).is_none());
    }

    #[test]
    fn test_store_is_weak() {
        let registry = ReferenceRegistry::new();
        let table = Table::new();
        let id = registry.store(&Value::from(table.clone())).unwrap();

        drop(table);
        assert!(registry.push(id).is_none());
        // Dead entry was pruned by push
        assert_eq!(registry.identity_count(), 0);
    }

    #[test]
    fn test_ref_pins_value() {
        let registry = ReferenceRegistry::new();
        let table = Table::new();
        let id = registry.ref_value(&Value::from(table.clone())).unwrap();
        drop(table);

        let pinned = registry.push(id).unwrap();
        assert!(pinned.as_table().is_some());
        assert_eq!(registry.ref_count(id), 1);
    }

    #[test]
    fn test_refcount_pins_until_balanced() {
        let registry = ReferenceRegistry::new();
        let func = Function::new(|_, _| Ok(Value::Nil));
        let value = Value::from(func.clone());
        let id = registry.ref_value(&value).unwrap();
        registry.ref_value(&value).unwrap();
        registry.ref_value(&value).unwrap();
        drop(value);
        drop(func);

        registry.unref(id).unwrap();
        registry.unref(id).unwrap();
        assert!(registry.is_pinned(id));
        assert!(registry.push(id).is_some());

        registry.unref(id).unwrap();
        assert!(!registry.is_pinned(id));
        assert!(registry.push(id).is_none());
    }

    #[test]
    fn test_unref_keeps_identity_while_reachable() {
        let registry = ReferenceRegistry::new();
        let table = Table::new();
        let value = Value::from(table.clone());
        let id = registry.ref_value(&value).unwrap();
        registry.unref(id).unwrap();

        // Still reachable through `table`
        assert_eq!(registry.push(id), Some(value));
    }

    #[test]
    fn test_primitives_are_not_referenceable() {
        let registry = ReferenceRegistry::new();
        assert_eq!(
            registry.ref_value(&Value::from(3)),
            Err(ObjectError::NotReferenceable("integer".to_string()))
        );
        assert!(registry.store(&Value::Nil).is_err());
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "unbalanced unref"))]
    fn test_unbalanced_unref() {
        let registry = ReferenceRegistry::new();
        let table = Table::new();
        let result = registry.unref(table.identity());
        assert_eq!(result, Err(ObjectError::UnbalancedUnref(table.identity().addr())));
    }

    #[test]
    fn test_prune_removes_dead_entries() {
        let registry = ReferenceRegistry::new();
        let keep = Table::new();
        registry.store(&Value::from(keep.clone())).unwrap();
        registry.store(&Value::from(Table::new())).unwrap();

        assert_eq!(registry.identity_count(), 2);
        assert_eq!(registry.prune(), 1);
        assert_eq!(registry.identity_count(), 1);
    }

    #[test]
    fn test_unref_forgets_released_values() {
        let registry = ReferenceRegistry::new();
        for _ in 0..1000 {
            let id = registry.ref_value(&Value::from(Table::new())).unwrap();
            registry.unref(id).unwrap();

            let func = Function::new(|_, _| Ok(Value::Nil));
            let id = registry.ref_value(&Value::from(func)).unwrap();
            registry.unref(id).unwrap();
        }
        assert_eq!(registry.identity_count(), 0);
    }

    #[test]
    fn test_store_sweeps_dead_entries() {
        let registry = ReferenceRegistry::new();
        let keep = Value::from(Table::new());
        registry.store(&keep).unwrap();

        // Values dropped after their last unref leave entries for `store` to sweep
        for _ in 0..1000 {
            let table = Value::from(Table::new());
            let id = registry.ref_value(&table).unwrap();
            registry.unref(id).unwrap();
            drop(table);
        }
        assert!(registry.identity_count() <= MIN_PRUNE_THRESHOLD);
        assert!(registry.push(keep.identity().unwrap()).is_some());
    }

    #[test]
    fn test_ref_table_clear_returns_values() {
        let refs = RefTable::new();
        let a = Value::from(Table::new());
        refs.incref(&a).unwrap();
        refs.incref(&a).unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs.clear(), vec![a]);
        assert!(refs.is_empty());
    }
}
