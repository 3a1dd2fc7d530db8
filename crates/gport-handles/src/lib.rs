//! Process-scoped generational handle table.
//!
//! Issues opaque 32-bit [`Handle`](gport_core::Handle)s for kernel-side
//! objects and resolves them back with structural protection against stale,
//! forged, and type-confused references: a per-slot generation counter, a
//! type tag checked on every lookup, and a minimum-free-entries floor that
//! delays slot reuse long enough for the 2-bit generation to diverge from
//! any stale handle.
//!
//! [`HandleTable`] is the concurrency wrapper: shared-mode guards for
//! lookups and iteration, an exclusive-mode guard for batched mutations, and
//! `*_safe` variants that bracket a single mutation. [`TableState`] holds the
//! slot array and the free-list threaded through it.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod slot;

pub mod guard;
pub mod table;

pub use guard::{HandleTable, TableReadGuard, TableWriteGuard};
pub use table::{Entries, Entry, TableConfig, TableState};
