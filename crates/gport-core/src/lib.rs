//! Core types for the gport graphics-port services.
//!
//! This is the leaf crate with zero internal gport dependencies. It defines
//! the 32-bit [`Handle`] and its bit-level codec, the [`ObjectKind`] type
//! tags, error types, the owning [`Process`] object with tagged memory
//! accounting, and the advisory lock-order registry.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod handle;
pub mod kind;
pub mod lock_order;
pub mod process;

// Re-export core types at crate root for convenience.
pub use error::{HandleError, QuotaError};
pub use handle::{Handle, GENERATION_MAX, INDEX_MAX, INSTANCE_MAX, INVALID_INDEX};
pub use kind::ObjectKind;
pub use lock_order::LockClass;
pub use process::{MemTag, Process, ProcessId};
