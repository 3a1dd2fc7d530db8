//! Error types for the gport services.

use std::error::Error;
use std::fmt;

use crate::handle::Handle;
use crate::process::MemTag;

/// Errors raised by handle-table operations.
///
/// Validation routines and the destroyed-flag protocol stay boolean, and the
/// allocation path keeps its distinguished null-handle failure return; this
/// enum covers the paths that report structured failures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandleError {
    /// A caller-supplied handle or index is out of range, or an assignment
    /// target is not available.
    InvalidParameter {
        /// The offending handle.
        handle: Handle,
        /// What was wrong with it.
        reason: &'static str,
    },
    /// The owning process refused a growth request.
    NoMemory {
        /// The table size (in entries) the failed growth was aiming for.
        requested_entries: u32,
    },
    /// Internal bookkeeping is inconsistent; the operation was abandoned
    /// without mutating.
    Corruption {
        /// Which invariant was found broken.
        detail: &'static str,
    },
}

impl fmt::Display for HandleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameter { handle, reason } => {
                write!(f, "invalid parameter: handle {handle}: {reason}")
            }
            Self::NoMemory { requested_entries } => {
                write!(f, "out of memory growing handle table to {requested_entries} entries")
            }
            Self::Corruption { detail } => {
                write!(f, "handle table corruption: {detail}")
            }
        }
    }
}

impl Error for HandleError {}

/// A tagged memory charge was refused by the process quota.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QuotaError {
    /// The charge would push the process past its configured quota.
    Exceeded {
        /// Tag the charge was made under.
        tag: MemTag,
        /// Bytes requested by the charge.
        requested: usize,
        /// The process quota in bytes.
        quota: usize,
        /// Bytes already charged across all tags.
        in_use: usize,
    },
}

impl fmt::Display for QuotaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exceeded {
                tag,
                requested,
                quota,
                in_use,
            } => {
                write!(
                    f,
                    "quota exceeded: {requested} bytes under tag {tag} (quota {quota}, in use {in_use})"
                )
            }
        }
    }
}

impl Error for QuotaError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = HandleError::InvalidParameter {
            handle: Handle::encode(5, 1, 0),
            reason: "target slot is occupied",
        };
        let msg = format!("{err}");
        assert!(msg.contains("invalid parameter"));
        assert!(msg.contains("occupied"));

        let err = HandleError::NoMemory {
            requested_entries: 2048,
        };
        assert!(format!("{err}").contains("2048"));

        let err = QuotaError::Exceeded {
            tag: MemTag::HandleTable,
            requested: 64,
            quota: 32,
            in_use: 0,
        };
        assert!(format!("{err}").contains("quota"));
    }
}
