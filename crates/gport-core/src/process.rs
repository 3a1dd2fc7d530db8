//! The owning process object and its tagged memory accounting.
//!
//! Every handle table is attached to a [`Process`]. The process meters the
//! memory its services pin, per [`MemTag`], against an optional byte quota;
//! the handle table charges its slot array here before growing it.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::error::QuotaError;

/// Tags for process-charged allocations.
///
/// Opaque to the services that charge under them; used for attribution in
/// diagnostics and accounting queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemTag {
    /// Handle-table slot arrays.
    HandleTable,
    /// Adapter state.
    Adapter,
    /// Device state.
    Device,
    /// Resource backing metadata.
    Resource,
    /// Synchronization object state.
    SyncObject,
}

impl MemTag {
    const COUNT: usize = 5;

    fn index(self) -> usize {
        match self {
            Self::HandleTable => 0,
            Self::Adapter => 1,
            Self::Device => 2,
            Self::Resource => 3,
            Self::SyncObject => 4,
        }
    }
}

impl fmt::Display for MemTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::HandleTable => "handle-table",
            Self::Adapter => "adapter",
            Self::Device => "device",
            Self::Resource => "resource",
            Self::SyncObject => "sync-object",
        };
        f.write_str(name)
    }
}

/// Counter for unique [`ProcessId`] allocation.
static PROCESS_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique per-process identifier.
///
/// Allocated from a monotonic atomic counter via [`Process::new`]. Two
/// distinct processes always have different IDs within this host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(u64);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A client process as seen by the graphics-port services.
///
/// Holds per-tag byte accounting with an optional total quota. All counters
/// are atomic; charging and releasing are thread-safe.
pub struct Process {
    id: ProcessId,
    quota: Option<usize>,
    total: AtomicUsize,
    per_tag: [AtomicUsize; MemTag::COUNT],
}

impl Process {
    /// Create a process with no memory quota.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a process with a total byte quota across all tags.
    pub fn with_quota(quota: usize) -> Self {
        Self::build(Some(quota))
    }

    fn build(quota: Option<usize>) -> Self {
        Self {
            id: ProcessId(PROCESS_ID_COUNTER.fetch_add(1, Ordering::Relaxed)),
            quota,
            total: AtomicUsize::new(0),
            per_tag: std::array::from_fn(|_| AtomicUsize::new(0)),
        }
    }

    /// This process's identifier.
    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// Charge `bytes` under `tag`, failing if the quota would be exceeded.
    pub fn charge(&self, tag: MemTag, bytes: usize) -> Result<(), QuotaError> {
        match self.quota {
            Some(quota) => {
                let mut in_use = self.total.load(Ordering::Relaxed);
                loop {
                    let next = in_use.saturating_add(bytes);
                    if next > quota {
                        return Err(QuotaError::Exceeded {
                            tag,
                            requested: bytes,
                            quota,
                            in_use,
                        });
                    }
                    match self.total.compare_exchange_weak(
                        in_use,
                        next,
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    ) {
                        Ok(_) => break,
                        Err(observed) => in_use = observed,
                    }
                }
            }
            None => {
                self.total.fetch_add(bytes, Ordering::Relaxed);
            }
        }
        self.per_tag[tag.index()].fetch_add(bytes, Ordering::Relaxed);
        Ok(())
    }

    /// Release `bytes` previously charged under `tag`.
    ///
    /// Releasing more than was charged saturates at zero rather than
    /// underflowing; the mismatch is logged.
    pub fn release(&self, tag: MemTag, bytes: usize) {
        saturating_sub_atomic(&self.per_tag[tag.index()], bytes, tag, "tag");
        saturating_sub_atomic(&self.total, bytes, tag, "total");
    }

    /// Bytes currently charged under `tag`.
    pub fn bytes_for(&self, tag: MemTag) -> usize {
        self.per_tag[tag.index()].load(Ordering::Relaxed)
    }

    /// Bytes currently charged across all tags.
    pub fn total_bytes(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }
}

impl Default for Process {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("id", &self.id)
            .field("quota", &self.quota)
            .field("total_bytes", &self.total_bytes())
            .finish()
    }
}

fn saturating_sub_atomic(counter: &AtomicUsize, bytes: usize, tag: MemTag, which: &str) {
    let result = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
        Some(current.saturating_sub(bytes))
    });
    if let Ok(previous) = result {
        if previous < bytes {
            log::error!("release of {bytes} bytes under {tag} exceeds charged {which} {previous}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = Process::new();
        let b = Process::new();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn charge_and_release_track_per_tag() {
        let process = Process::new();
        process.charge(MemTag::HandleTable, 128).unwrap();
        process.charge(MemTag::Resource, 64).unwrap();

        assert_eq!(process.bytes_for(MemTag::HandleTable), 128);
        assert_eq!(process.bytes_for(MemTag::Resource), 64);
        assert_eq!(process.total_bytes(), 192);

        process.release(MemTag::HandleTable, 128);
        assert_eq!(process.bytes_for(MemTag::HandleTable), 0);
        assert_eq!(process.total_bytes(), 64);
    }

    #[test]
    fn quota_is_enforced_across_tags() {
        let process = Process::with_quota(100);
        process.charge(MemTag::HandleTable, 60).unwrap();

        let err = process.charge(MemTag::Resource, 41).unwrap_err();
        let QuotaError::Exceeded {
            requested, quota, in_use, ..
        } = err;
        assert_eq!(requested, 41);
        assert_eq!(quota, 100);
        assert_eq!(in_use, 60);

        // Exactly at the quota is allowed.
        process.charge(MemTag::Resource, 40).unwrap();
        assert_eq!(process.total_bytes(), 100);
    }

    #[test]
    fn release_makes_room_under_quota() {
        let process = Process::with_quota(100);
        process.charge(MemTag::HandleTable, 100).unwrap();
        assert!(process.charge(MemTag::HandleTable, 1).is_err());

        process.release(MemTag::HandleTable, 50);
        process.charge(MemTag::HandleTable, 50).unwrap();
    }

    #[test]
    fn over_release_saturates_at_zero() {
        let process = Process::new();
        process.charge(MemTag::Device, 10).unwrap();
        process.release(MemTag::Device, 30);
        assert_eq!(process.bytes_for(MemTag::Device), 0);
        assert_eq!(process.total_bytes(), 0);
    }

    #[test]
    fn concurrent_charges_never_exceed_quota() {
        use std::sync::Arc;

        let process = Arc::new(Process::with_quota(1000));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let process = Arc::clone(&process);
                std::thread::spawn(move || {
                    let mut granted = 0usize;
                    for _ in 0..1000 {
                        if process.charge(MemTag::HandleTable, 1).is_ok() {
                            granted += 1;
                        }
                    }
                    granted
                })
            })
            .collect();

        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 1000);
        assert_eq!(process.total_bytes(), 1000);
    }
}
