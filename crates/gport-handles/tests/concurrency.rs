//! Threaded smoke tests for the reader/writer wrapper.

use std::sync::Arc;
use std::thread;

use gport_core::{ObjectKind, Process};
use gport_handles::HandleTable;

#[test]
fn concurrent_writers_and_readers() {
    let table: Arc<HandleTable<u64>> = Arc::new(HandleTable::new(Arc::new(Process::new())));

    let writers: Vec<_> = (0..4u64)
        .map(|thread_id| {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                for i in 0..200u64 {
                    let payload = thread_id * 1_000 + i;
                    let handle = table.alloc_handle_safe(payload, ObjectKind::Resource, true);
                    assert!(!handle.is_null());
                    assert_eq!(table.get_object_safe(handle), Some(payload));

                    if i % 3 == 0 {
                        assert!(table.mark_destroyed_safe(handle));
                        assert_eq!(table.get_object_safe(handle), None);
                        assert!(table.unmark_destroyed_safe(handle));
                    }
                    assert!(table.free_handle_safe(ObjectKind::Resource, handle));
                    assert_eq!(table.get_object_safe(handle), None);
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                for _ in 0..100 {
                    let guard = table.lock_shared();
                    // A consistent snapshot: every entry the iterator yields
                    // resolves under the same hold.
                    for entry in guard.entries() {
                        assert_eq!(
                            guard.get_object_ignore_destroyed(entry.handle, entry.kind),
                            Some(*entry.object)
                        );
                    }
                    guard.validate().unwrap();
                }
            })
        })
        .collect();

    for writer in writers {
        writer.join().unwrap();
    }
    for reader in readers {
        reader.join().unwrap();
    }

    let guard = table.lock_shared();
    guard.validate().unwrap();
    assert_eq!(guard.used_entry_count(), 0);
}

#[test]
fn batched_critical_section_is_atomic_to_readers() {
    let table: Arc<HandleTable<u64>> = Arc::new(HandleTable::new(Arc::new(Process::new())));

    let writer = {
        let table = Arc::clone(&table);
        thread::spawn(move || {
            for _ in 0..100 {
                // Allocate a pair and free it again under one exclusive hold;
                // readers must never observe an odd entry count.
                let mut guard = table.lock_exclusive();
                let a = guard.alloc_handle(1, ObjectKind::Device, true);
                let b = guard.alloc_handle(2, ObjectKind::Device, true);
                assert!(guard.free_handle(ObjectKind::Device, a));
                assert!(guard.free_handle(ObjectKind::Device, b));
            }
        })
    };

    let reader = {
        let table = Arc::clone(&table);
        thread::spawn(move || {
            for _ in 0..100 {
                let guard = table.lock_shared();
                assert_eq!(guard.used_entry_count() % 2, 0);
            }
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();
}
