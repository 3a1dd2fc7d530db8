//! Reader/writer concurrency wrapper around [`TableState`].
//!
//! All mutators require the exclusive lock, all lookups and iteration the
//! shared lock. The guards register the table in the process-wide lock-order
//! registry under [`LockClass::HandleTable`] for the duration of the hold.
//! The `*_safe` methods bracket a single mutation in an exclusive
//! acquisition; callers that batch several mutations take
//! [`HandleTable::lock_exclusive`] once instead.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use gport_core::{lock_order, Handle, HandleError, LockClass, ObjectKind, Process};

use crate::table::{TableConfig, TableState};

/// A process-scoped generational handle table.
///
/// Cheap to share across threads behind an `Arc`; each table carries its own
/// reader/writer lock and is independent of every other table.
pub struct HandleTable<T> {
    state: RwLock<TableState<T>>,
}

impl<T> HandleTable<T> {
    /// Create an empty table attached to `process`, with default growth
    /// parameters. No backing array is allocated until the first use.
    pub fn new(process: Arc<Process>) -> Self {
        Self::with_config(process, TableConfig::new())
    }

    /// Create an empty table with explicit growth parameters.
    pub fn with_config(process: Arc<Process>, config: TableConfig) -> Self {
        Self {
            state: RwLock::new(TableState::new(process, config)),
        }
    }

    /// Acquire the shared lock for lookups and iteration.
    pub fn lock_shared(&self) -> TableReadGuard<'_, T> {
        lock_order::acquire(LockClass::HandleTable);
        TableReadGuard {
            inner: self.state.read(),
        }
    }

    /// Acquire the exclusive lock for one or more mutations.
    pub fn lock_exclusive(&self) -> TableWriteGuard<'_, T> {
        lock_order::acquire(LockClass::HandleTable);
        TableWriteGuard {
            inner: self.state.write(),
        }
    }

    /// Allocate a handle under a private exclusive acquisition.
    pub fn alloc_handle_safe(&self, object: T, kind: ObjectKind, make_valid: bool) -> Handle {
        let mut table = self.lock_exclusive();
        table.alloc_handle(object, kind, make_valid)
    }

    /// Adopt an externally-chosen handle under a private exclusive
    /// acquisition.
    pub fn assign_handle_safe(
        &self,
        object: T,
        kind: ObjectKind,
        handle: Handle,
    ) -> Result<(), HandleError> {
        let mut table = self.lock_exclusive();
        table.assign_handle(object, kind, handle)
    }

    /// Free a handle under a private exclusive acquisition.
    pub fn free_handle_safe(&self, kind: ObjectKind, handle: Handle) -> bool {
        let mut table = self.lock_exclusive();
        table.free_handle(kind, handle)
    }

    /// Mark an entry destroyed under a private exclusive acquisition.
    pub fn mark_destroyed_safe(&self, handle: Handle) -> bool {
        let mut table = self.lock_exclusive();
        table.mark_destroyed(handle)
    }

    /// Clear an entry's destroyed flag under a private exclusive
    /// acquisition.
    pub fn unmark_destroyed_safe(&self, handle: Handle) -> bool {
        let mut table = self.lock_exclusive();
        table.unmark_destroyed(handle)
    }

    /// Look up an entry's kind under a private shared acquisition.
    pub fn object_kind_safe(&self, handle: Handle) -> ObjectKind {
        self.lock_shared().object_kind(handle)
    }
}

impl<T: Clone> HandleTable<T> {
    /// Resolve a handle under a private shared acquisition.
    pub fn get_object_safe(&self, handle: Handle) -> Option<T> {
        self.lock_shared().get_object(handle)
    }
}

// Compile-time assertion: tables of shareable objects are Send + Sync.
const _: fn() = || {
    fn assert<S: Send + Sync>() {}
    assert::<HandleTable<Arc<u32>>>();
};

/// Shared-mode guard; dereferences to the read-only table operations.
pub struct TableReadGuard<'a, T> {
    inner: RwLockReadGuard<'a, TableState<T>>,
}

impl<T> Deref for TableReadGuard<'_, T> {
    type Target = TableState<T>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> Drop for TableReadGuard<'_, T> {
    fn drop(&mut self) {
        lock_order::release(LockClass::HandleTable);
    }
}

/// Exclusive-mode guard; dereferences mutably, which is what makes the
/// `&mut self` table mutators reachable.
pub struct TableWriteGuard<'a, T> {
    inner: RwLockWriteGuard<'a, TableState<T>>,
}

impl<T> Deref for TableWriteGuard<'_, T> {
    type Target = TableState<T>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> DerefMut for TableWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl<T> Drop for TableWriteGuard<'_, T> {
    fn drop(&mut self) {
        lock_order::release(LockClass::HandleTable);
    }
}
