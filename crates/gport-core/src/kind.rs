//! Type tags for table-registered objects.

use std::fmt;

/// The kind of object a handle-table slot refers to.
///
/// `Free` is reserved as the discriminant of unoccupied slots and doubles as
/// the "any kind" wildcard in lookup paths. The remaining variants name the
/// graphics-port object families the driver tracks per process.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    /// Unoccupied slot; also the lookup wildcard. Never a valid object kind.
    Free = 0,
    /// A virtual adapter exposed to the process.
    Adapter,
    /// A device opened on an adapter.
    Device,
    /// An execution context of a device.
    Context,
    /// An allocation-backed resource.
    Resource,
    /// A resource shared across devices.
    SharedResource,
    /// A synchronization object.
    SyncObject,
    /// A paging queue.
    PagingQueue,
    /// A hardware submission queue.
    HwQueue,
}

impl ObjectKind {
    /// The highest-valued object kind.
    pub const LIMIT: ObjectKind = ObjectKind::HwQueue;

    /// Whether this tag names an actual object (anything but `Free`).
    pub fn is_object(self) -> bool {
        self != ObjectKind::Free
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Free => "free",
            Self::Adapter => "adapter",
            Self::Device => "device",
            Self::Context => "context",
            Self::Resource => "resource",
            Self::SharedResource => "shared resource",
            Self::SyncObject => "sync object",
            Self::PagingQueue => "paging queue",
            Self::HwQueue => "hardware queue",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_is_reserved_discriminant_zero() {
        assert_eq!(ObjectKind::Free as u8, 0);
        assert!(!ObjectKind::Free.is_object());
    }

    #[test]
    fn object_kinds_are_objects() {
        assert!(ObjectKind::Adapter.is_object());
        assert!(ObjectKind::HwQueue.is_object());
    }

    #[test]
    fn limit_bounds_every_kind() {
        for kind in [
            ObjectKind::Adapter,
            ObjectKind::Device,
            ObjectKind::Context,
            ObjectKind::Resource,
            ObjectKind::SharedResource,
            ObjectKind::SyncObject,
            ObjectKind::PagingQueue,
            ObjectKind::HwQueue,
        ] {
            assert!(kind <= ObjectKind::LIMIT);
        }
    }
}
