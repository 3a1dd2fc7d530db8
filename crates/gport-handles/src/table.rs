//! Slot table, free-list, growth, and the table operations.
//!
//! [`TableState`] owns the backing slot array with a doubly-linked free-list
//! threaded through it (array indices, no pointers; [`INVALID_INDEX`] is the
//! terminator). Mutating operations take `&mut self` and are reachable only
//! through an exclusive-mode guard; lookups and iteration take `&self`.
//!
//! Allocation pops the free-list head; freeing appends at the tail and bumps
//! the slot's generation. Growth keeps at least
//! [`TableConfig::min_free_entries`] slots free, so a freed slot sits behind
//! that many allocations before its index is reissued — enough for the 2-bit
//! generation to diverge from any stale handle.

use std::fmt;
use std::sync::Arc;

use gport_core::{Handle, HandleError, MemTag, ObjectKind, Process, INDEX_MAX, INVALID_INDEX};

use crate::slot::Slot;

/// Hard ceiling on the slot count: every index must fit the handle's 24-bit
/// index field.
const MAX_TABLE_SIZE: u32 = INDEX_MAX + 1;

/// Generations cycle through 1..=3; 0 never appears after a slot's first
/// free and is what a zeroed or forged handle most likely carries.
const GENERATION_LIMIT: u8 = 3;

/// Configuration for a handle table.
///
/// Values are immutable after the table is created.
#[derive(Clone, Debug)]
pub struct TableConfig {
    /// How many slots each growth step adds.
    ///
    /// Default: 1024. Must be greater than `min_free_entries`, so one growth
    /// step always restores the free floor.
    pub size_increment: u32,

    /// Lower bound on the number of free slots, maintained by proactive
    /// growth on the allocation path.
    ///
    /// Default: 128. This floor is the temporal gap that makes the 2-bit
    /// generation sufficient: a freed slot is reissued only after at least
    /// this many other allocations.
    pub min_free_entries: u32,
}

impl TableConfig {
    /// Default growth step.
    pub const DEFAULT_SIZE_INCREMENT: u32 = 1024;

    /// Default free-slot floor.
    pub const DEFAULT_MIN_FREE_ENTRIES: u32 = 128;

    /// Create a config with the default increment and floor.
    pub fn new() -> Self {
        Self {
            size_increment: Self::DEFAULT_SIZE_INCREMENT,
            min_free_entries: Self::DEFAULT_MIN_FREE_ENTRIES,
        }
    }
}

impl Default for TableConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// One occupied entry, as seen by iteration.
#[derive(Clone, Copy, Debug)]
pub struct Entry<'a, T> {
    /// Slot index of the entry.
    pub index: u32,
    /// The entry's type tag.
    pub kind: ObjectKind,
    /// The canonical handle for the entry.
    pub handle: Handle,
    /// The registered object.
    pub object: &'a T,
}

/// The slot array, free-list and counters of one handle table.
///
/// Obtained through the guards of [`HandleTable`](crate::HandleTable); see
/// the crate docs for the locking contract.
pub struct TableState<T> {
    slots: Vec<Slot<T>>,
    free_head: u32,
    free_tail: u32,
    free_count: u32,
    config: TableConfig,
    process: Arc<Process>,
}

impl<T> TableState<T> {
    pub(crate) fn new(process: Arc<Process>, config: TableConfig) -> Self {
        debug_assert!(
            config.size_increment > config.min_free_entries,
            "one growth step must clear the free floor"
        );
        Self {
            slots: Vec::new(),
            free_head: INVALID_INDEX,
            free_tail: INVALID_INDEX,
            free_count: 0,
            config,
            process,
        }
    }

    /// Current slot count.
    pub fn size(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Number of occupied entries.
    pub fn used_entry_count(&self) -> u32 {
        debug_assert!(self.size() >= self.free_count);
        self.size() - self.free_count
    }

    /// Whether no entry is occupied.
    pub fn is_empty(&self) -> bool {
        self.free_count == self.size()
    }

    /// The process this table is attached to.
    pub fn process(&self) -> &Arc<Process> {
        &self.process
    }

    /// Grow the backing array to at least `min_entries` slots (0 means one
    /// increment), splicing the new slots onto the free-list tail.
    fn expand(&mut self, min_entries: u32) -> Result<(), HandleError> {
        let size = self.size();

        // The tail must terminate the list before we splice onto it.
        if self.free_count != 0 {
            let tail = self.free_tail;
            if tail >= size || self.slots[tail as usize].next_free() != INVALID_INDEX {
                log::error!("handle table free-list tail {tail:#x} does not terminate the list");
                return Err(HandleError::Corruption {
                    detail: "free-list tail does not terminate the list",
                });
            }
        }

        let mut new_size = size.saturating_add(self.config.size_increment);
        if new_size < min_entries {
            new_size = min_entries;
        }
        if new_size > MAX_TABLE_SIZE {
            log::error!("handle table cannot grow to {new_size} entries (limit {MAX_TABLE_SIZE})");
            return Err(HandleError::NoMemory {
                requested_entries: new_size,
            });
        }

        let added = new_size - size;
        let bytes = added as usize * std::mem::size_of::<Slot<T>>();
        if let Err(err) = self.process.charge(MemTag::HandleTable, bytes) {
            log::error!("handle table growth refused: {err}");
            return Err(HandleError::NoMemory {
                requested_entries: new_size,
            });
        }

        // Chain the new slots; the first one links back to the old tail.
        self.slots.reserve_exact(added as usize);
        for index in size..new_size {
            let prev_free = if index == size {
                if self.free_count == 0 {
                    INVALID_INDEX
                } else {
                    self.free_tail
                }
            } else {
                index - 1
            };
            let next_free = if index + 1 == new_size {
                INVALID_INDEX
            } else {
                index + 1
            };
            self.slots.push(Slot::Free {
                prev_free,
                next_free,
                generation: 1,
            });
        }

        if self.free_count == 0 {
            self.free_head = size;
        } else {
            self.slots[self.free_tail as usize].set_next_free(size);
        }
        self.free_tail = new_size - 1;
        self.free_count += added;

        log::debug!("handle table grown to {new_size} entries ({added} added)");
        Ok(())
    }

    /// Allocate a handle for `object`.
    ///
    /// The slot's stored generation is preserved — it was bumped when the
    /// slot was last freed. With `make_valid` false the entry starts in the
    /// destroyed state and must be unmarked before strict lookups accept it.
    ///
    /// Returns [`Handle::NULL`] if the table cannot grow (capacity or
    /// process quota) or its bookkeeping is found corrupted.
    pub fn alloc_handle(&mut self, object: T, kind: ObjectKind, make_valid: bool) -> Handle {
        debug_assert!(kind.is_object());
        debug_assert!(kind <= ObjectKind::LIMIT);

        if self.free_count <= self.config.min_free_entries {
            if let Err(err) = self.expand(0) {
                log::error!("handle allocation failed: {err}");
                return Handle::NULL;
            }
        }

        let index = self.free_head;
        if index >= self.size() {
            log::error!("corrupted handle table free-list head {index:#x}");
            return Handle::NULL;
        }

        let (next, generation) = match &self.slots[index as usize] {
            Slot::Free {
                next_free,
                generation,
                ..
            } => (*next_free, *generation),
            Slot::Occupied { .. } => {
                log::error!("handle table free-list head {index} is occupied");
                return Handle::NULL;
            }
        };
        // The back-link of a successor that is also the tail is left as-is.
        if next != self.free_tail {
            if next >= self.size() {
                log::error!("handle table has invalid next free index {next:#x}");
                return Handle::NULL;
            }
            self.slots[next as usize].set_prev_free(INVALID_INDEX);
        }
        self.free_head = next;

        self.slots[index as usize] = Slot::Occupied {
            object,
            kind,
            generation,
            instance: 0,
            destroyed: !make_valid,
        };
        self.free_count -= 1;

        Handle::encode(index, generation as u32, 0)
    }

    /// Adopt a handle value chosen by another authority.
    ///
    /// The target slot must be free; it is unlinked from whatever position
    /// it holds in the free-list and takes the handle's generation verbatim,
    /// so subsequent lookups of exactly this handle resolve. The collision
    /// risk is borne by the authority that chose the handle.
    pub fn assign_handle(
        &mut self,
        object: T,
        kind: ObjectKind,
        handle: Handle,
    ) -> Result<(), HandleError> {
        debug_assert!(kind.is_object());

        if handle.is_null() {
            log::error!("cannot assign the null handle");
            return Err(HandleError::InvalidParameter {
                handle,
                reason: "the null handle is reserved",
            });
        }

        let index = handle.index();
        debug_assert!(index <= INDEX_MAX);

        if index >= self.size() {
            let min_entries =
                index.saturating_add(self.config.size_increment).min(MAX_TABLE_SIZE);
            self.expand(min_entries)?;
        }

        let (prev, next) = match &self.slots[index as usize] {
            Slot::Free {
                prev_free,
                next_free,
                ..
            } => (*prev_free, *next_free),
            Slot::Occupied { .. } => {
                log::error!(
                    "assign target slot {index} is busy, held by {}",
                    self.entry_handle(index)
                );
                return Err(HandleError::InvalidParameter {
                    handle,
                    reason: "target slot is occupied",
                });
            }
        };

        // Both neighbor links must be in range before anything is patched.
        if index != self.free_tail && next >= self.size() {
            log::error!("handle table has invalid next free index {next:#x}");
            return Err(HandleError::InvalidParameter {
                handle,
                reason: "corrupt free-list successor link",
            });
        }
        if index != self.free_head && prev >= self.size() {
            log::error!("handle table has invalid prev free index {prev:#x}");
            return Err(HandleError::InvalidParameter {
                handle,
                reason: "corrupt free-list predecessor link",
            });
        }

        if index == self.free_tail {
            self.free_tail = prev;
        } else {
            self.slots[next as usize].set_prev_free(prev);
        }
        if index == self.free_head {
            self.free_head = next;
        } else {
            self.slots[prev as usize].set_next_free(next);
        }

        self.slots[index as usize] = Slot::Occupied {
            object,
            kind,
            generation: handle.generation() as u8,
            instance: 0,
            destroyed: false,
        };
        self.free_count -= 1;
        Ok(())
    }

    /// Return an entry's slot to the free-list.
    ///
    /// Validates ignoring the destroyed flag — a logically deleted entry is
    /// still physically freeable. The generation advances (wrapping within
    /// 1..=3) and the slot joins the free-list tail, maximizing its distance
    /// from reuse. Returns false, without mutating, for an invalid handle.
    pub fn free_handle(&mut self, kind: ObjectKind, handle: Handle) -> bool {
        if !self.is_valid(handle, true, kind) {
            log::error!("free of invalid handle {handle}");
            return false;
        }

        let index = handle.index();
        debug_assert!(self.free_count < self.size());

        let old_generation = self.slots[index as usize].generation();
        let generation = (old_generation % GENERATION_LIMIT) + 1;

        self.slots[index as usize] = Slot::Free {
            prev_free: self.free_tail,
            next_free: INVALID_INDEX,
            generation,
        };
        self.free_count += 1;

        if self.free_tail == INVALID_INDEX {
            self.free_head = index;
        } else {
            self.slots[self.free_tail as usize].set_next_free(index);
        }
        self.free_tail = index;
        true
    }

    /// Logically delete an entry: strict lookups refuse it until it is
    /// either unmarked or physically freed.
    pub fn mark_destroyed(&mut self, handle: Handle) -> bool {
        if !self.is_valid(handle, false, ObjectKind::Free) {
            return false;
        }
        if let Slot::Occupied { destroyed, .. } = &mut self.slots[handle.index() as usize] {
            *destroyed = true;
        }
        true
    }

    /// Roll back a logical delete.
    pub fn unmark_destroyed(&mut self, handle: Handle) -> bool {
        if !self.is_valid(handle, true, ObjectKind::Free) {
            return false;
        }
        if let Slot::Occupied { destroyed, .. } = &mut self.slots[handle.index() as usize] {
            debug_assert!(*destroyed, "unmark of an entry that is not marked destroyed");
            *destroyed = false;
        }
        true
    }

    /// Central validation: index in range, generation match, destroyed
    /// check, slot occupied, kind match (`ObjectKind::Free` accepts any
    /// object kind). Logs the first failing check; never mutates.
    fn is_valid(&self, handle: Handle, ignore_destroyed: bool, kind: ObjectKind) -> bool {
        let index = handle.index();
        if index >= self.size() {
            log::error!(
                "handle {handle}: index {index} out of range (table size {})",
                self.size()
            );
            return false;
        }
        match &self.slots[index as usize] {
            Slot::Free { .. } => {
                log::error!("handle {handle}: entry {index} is freed");
                false
            }
            Slot::Occupied {
                generation,
                destroyed,
                kind: entry_kind,
                ..
            } => {
                if handle.generation() != *generation as u32 {
                    log::error!(
                        "handle {handle}: generation mismatch (entry has {generation})"
                    );
                    return false;
                }
                if *destroyed && !ignore_destroyed {
                    log::error!("handle {handle}: entry is marked destroyed");
                    return false;
                }
                if kind != ObjectKind::Free && kind != *entry_kind {
                    log::error!(
                        "handle {handle}: kind mismatch (want {kind}, entry is {entry_kind})"
                    );
                    return false;
                }
                true
            }
        }
    }

    /// The entry's type tag, or `ObjectKind::Free` if the handle does not
    /// validate — callers may discriminate on the result.
    pub fn object_kind(&self, handle: Handle) -> ObjectKind {
        if !self.is_valid(handle, false, ObjectKind::Free) {
            return ObjectKind::Free;
        }
        self.entry_kind(handle.index())
    }

    /// The type tag stored at `index`; `Free` for unoccupied slots.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn entry_kind(&self, index: u32) -> ObjectKind {
        self.slots[index as usize].kind()
    }

    /// The object stored at `index`, for iteration use.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range or the slot is free.
    pub fn entry_object(&self, index: u32) -> &T {
        match &self.slots[index as usize] {
            Slot::Occupied { object, .. } => object,
            Slot::Free { .. } => panic!("entry {index} is free"),
        }
    }

    /// Reconstruct the canonical handle for the slot at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn entry_handle(&self, index: u32) -> Handle {
        match &self.slots[index as usize] {
            Slot::Occupied {
                generation,
                instance,
                ..
            } => Handle::encode(index, *generation as u32, *instance as u32),
            Slot::Free { generation, .. } => Handle::encode(index, *generation as u32, 0),
        }
    }

    /// Advance `cursor` to the next occupied slot and return its entry.
    ///
    /// On a hit, `cursor` moves past the returned index, so repeated calls
    /// visit each occupied slot exactly once in ascending index order.
    /// Returns `None` when the remainder of the table holds no entries.
    pub fn next_entry(&self, cursor: &mut u32) -> Option<Entry<'_, T>> {
        for index in *cursor..self.size() {
            if let Slot::Occupied {
                object,
                kind,
                generation,
                instance,
                ..
            } = &self.slots[index as usize]
            {
                *cursor = index + 1;
                return Some(Entry {
                    index,
                    kind: *kind,
                    handle: Handle::encode(index, *generation as u32, *instance as u32),
                    object,
                });
            }
        }
        None
    }

    /// Iterate over all occupied entries in ascending index order.
    pub fn entries(&self) -> Entries<'_, T> {
        Entries {
            state: self,
            cursor: 0,
        }
    }

    /// Walk the table's bookkeeping and report the first broken invariant.
    ///
    /// A debugging and test aid: checks the counter identity, the free-list
    /// double linkage and termination, the free/occupied partition, and the
    /// generation ranges. Read-only.
    pub fn validate(&self) -> Result<(), HandleError> {
        let size = self.size();
        if self.free_count > size {
            return Err(HandleError::Corruption {
                detail: "free count exceeds table size",
            });
        }

        if self.free_count == 0 {
            if self.free_head != INVALID_INDEX || self.free_tail != INVALID_INDEX {
                return Err(HandleError::Corruption {
                    detail: "empty free-list is not terminated at both ends",
                });
            }
        } else {
            let mut visited = 0u32;
            let mut prev = INVALID_INDEX;
            let mut current = self.free_head;
            while current != INVALID_INDEX {
                if current >= size {
                    return Err(HandleError::Corruption {
                        detail: "free-list index out of range",
                    });
                }
                let slot = &self.slots[current as usize];
                if !slot.is_free() {
                    return Err(HandleError::Corruption {
                        detail: "occupied slot linked into the free-list",
                    });
                }
                if slot.prev_free() != prev {
                    return Err(HandleError::Corruption {
                        detail: "free-list back-link mismatch",
                    });
                }
                visited += 1;
                if visited > self.free_count {
                    return Err(HandleError::Corruption {
                        detail: "free-list longer than the free count (cycle?)",
                    });
                }
                prev = current;
                current = slot.next_free();
            }
            if prev != self.free_tail {
                return Err(HandleError::Corruption {
                    detail: "free-list does not end at the tail",
                });
            }
            if visited != self.free_count {
                return Err(HandleError::Corruption {
                    detail: "free-list shorter than the free count",
                });
            }
        }

        let mut free_slots = 0u32;
        for slot in &self.slots {
            if slot.is_free() {
                free_slots += 1;
                if slot.generation() == 0 || slot.generation() > GENERATION_LIMIT {
                    return Err(HandleError::Corruption {
                        detail: "free slot generation out of range",
                    });
                }
            } else if slot.generation() > GENERATION_LIMIT {
                return Err(HandleError::Corruption {
                    detail: "occupied slot generation out of range",
                });
            }
        }
        if free_slots != self.free_count {
            return Err(HandleError::Corruption {
                detail: "free slot count disagrees with the free count",
            });
        }

        Ok(())
    }

    /// Emit the [`fmt::Debug`] status summary at debug level.
    pub fn log_status(&self) {
        log::debug!("handle table status: {self:?}");
    }
}

impl<T: Clone> TableState<T> {
    /// Resolve a handle of any object kind. Destroyed entries are refused.
    pub fn get_object(&self, handle: Handle) -> Option<T> {
        self.get_object_ref(handle, false, ObjectKind::Free).cloned()
    }

    /// Resolve a handle, requiring the entry to have the given kind.
    pub fn get_object_by_type(&self, handle: Handle, kind: ObjectKind) -> Option<T> {
        self.get_object_ref(handle, false, kind).cloned()
    }

    /// Resolve a handle even if the entry is marked destroyed.
    ///
    /// This is the lookup the two-phase deletion protocol uses between the
    /// logical and the physical delete.
    pub fn get_object_ignore_destroyed(&self, handle: Handle, kind: ObjectKind) -> Option<T> {
        self.get_object_ref(handle, true, kind).cloned()
    }

    fn get_object_ref(
        &self,
        handle: Handle,
        ignore_destroyed: bool,
        kind: ObjectKind,
    ) -> Option<&T> {
        if !self.is_valid(handle, ignore_destroyed, kind) {
            return None;
        }
        match &self.slots[handle.index() as usize] {
            Slot::Occupied { object, .. } => Some(object),
            Slot::Free { .. } => None,
        }
    }
}

impl<T> Drop for TableState<T> {
    fn drop(&mut self) {
        let bytes = self.slots.len() * std::mem::size_of::<Slot<T>>();
        if bytes > 0 {
            self.process.release(MemTag::HandleTable, bytes);
        }
    }
}

/// How many leading entries the status rendering includes.
const STATUS_ENTRIES: u32 = 3;

impl<T> fmt::Debug for TableState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableState")
            .field("size", &self.size())
            .field("used", &self.used_entry_count())
            .field("free_count", &self.free_count)
            .field("free_head", &format_args!("{:#x}", self.free_head))
            .field("free_tail", &format_args!("{:#x}", self.free_tail))
            .field("leading", &LeadingEntries(self))
            .finish()
    }
}

/// Renders a table's first few slots for the status summary.
struct LeadingEntries<'a, T>(&'a TableState<T>);

impl<T> fmt::Debug for LeadingEntries<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                (0..self.0.size().min(STATUS_ENTRIES)).map(|index| SlotStatus {
                    index,
                    state: self.0,
                }),
            )
            .finish()
    }
}

struct SlotStatus<'a, T> {
    index: u32,
    state: &'a TableState<T>,
}

impl<T> fmt::Debug for SlotStatus<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let index = self.index;
        match &self.state.slots[index as usize] {
            Slot::Occupied { kind, .. } => {
                write!(f, "{index}: {kind} {}", self.state.entry_handle(index))
            }
            Slot::Free {
                prev_free,
                next_free,
                ..
            } => write!(f, "{index}: free, prev {prev_free:#x} next {next_free:#x}"),
        }
    }
}

/// Iterator over a table's occupied entries; see [`TableState::entries`].
pub struct Entries<'a, T> {
    state: &'a TableState<T>,
    cursor: u32,
}

impl<'a, T> Iterator for Entries<'a, T> {
    type Item = Entry<'a, T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.state.next_entry(&mut self.cursor)
    }
}
