//! Shared fixtures for the gport benchmarks.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

use std::sync::Arc;

use gport_core::{Handle, ObjectKind, Process};
use gport_handles::HandleTable;

/// Build a table holding `count` resource entries, returning the issued
/// handles alongside it.
pub fn populated_table(count: u32) -> (HandleTable<u64>, Vec<Handle>) {
    let table = HandleTable::new(Arc::new(Process::new()));
    let handles = {
        let mut guard = table.lock_exclusive();
        (0..count)
            .map(|i| guard.alloc_handle(u64::from(i), ObjectKind::Resource, true))
            .collect()
    };
    (table, handles)
}
