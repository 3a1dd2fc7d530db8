//! Advisory lock-order registry.
//!
//! The graphics-port services share a ranked lock hierarchy. Each lock
//! acquisition registers its [`LockClass`] on a per-thread stack and each
//! release pops it; acquiring a class ranked at or below one already held
//! logs an inversion diagnostic. The registry never blocks and never fails —
//! it is purely a detection aid.

use std::cell::RefCell;
use std::fmt;

use smallvec::SmallVec;

/// Ranked lock classes of the graphics-port services.
///
/// Locks must be acquired in increasing rank order. `HandleTable` is a leaf:
/// nothing is acquired beneath it except `Channel`.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockClass {
    /// The host-wide process list.
    ProcessList = 0,
    /// Per-adapter state.
    Adapter,
    /// Per-device state.
    Device,
    /// A process handle table.
    HandleTable,
    /// The submission channel.
    Channel,
}

impl LockClass {
    fn rank(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for LockClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ProcessList => "process-list",
            Self::Adapter => "adapter",
            Self::Device => "device",
            Self::HandleTable => "handle-table",
            Self::Channel => "channel",
        };
        f.write_str(name)
    }
}

thread_local! {
    static HELD: RefCell<SmallVec<[LockClass; 8]>> = const { RefCell::new(SmallVec::new_const()) };
}

/// Register an acquisition of `class` on this thread.
///
/// Logs if a lock of equal or higher rank is already held (equal rank is
/// permitted: a process may hold several handle-table locks at once).
pub fn acquire(class: LockClass) {
    HELD.with(|held| {
        let mut held = held.borrow_mut();
        if let Some(worst) = held.iter().copied().max() {
            if worst.rank() > class.rank() {
                log::error!("lock order inversion: acquiring {class} while holding {worst}");
            }
        }
        held.push(class);
    });
}

/// Register a release of `class` on this thread.
///
/// Releases are expected in reverse acquisition order; out-of-order or
/// unmatched releases are logged and tolerated.
pub fn release(class: LockClass) {
    HELD.with(|held| {
        let mut held = held.borrow_mut();
        match held.last() {
            Some(&top) if top == class => {
                held.pop();
            }
            _ => match held.iter().rposition(|&h| h == class) {
                Some(position) => {
                    log::error!("out-of-order release of {class}");
                    held.remove(position);
                }
                None => {
                    log::error!("release of {class} which is not held on this thread");
                }
            },
        }
    });
}

/// Number of lock classes currently registered as held on this thread.
pub fn held_count() -> usize {
    HELD.with(|held| held.borrow().len())
}
