//! Virtual-filesystem contract for wherry.
//!
//! The file-operation engine never touches `std::fs` directly; it drives a
//! [`Vfs`] implementation, which may be backed by a local disk, an archive,
//! or a remote protocol. This crate defines the contract, the metadata
//! snapshot types shared by every backend, a local-disk implementation, and
//! fault-injecting wrappers used by the engine's tests.

mod error;
mod fault;
mod local;
mod types;
mod vfs;

pub use error::{VfsError, VfsResult};
pub use fault::FaultFs;
pub use local::{LocalFs, current_umask};
pub use types::{FileId, FileKind, Metadata};
pub use vfs::{Vfs, VfsDir, VfsFile, WriteMode, file_id};
