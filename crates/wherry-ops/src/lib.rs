//! Transfer and deletion engine for wherry.
//!
//! This crate walks trees, preserves hardlinks, detects cycles, negotiates
//! failures with the user through the collaborator traits, and reports
//! progress. One [`OperationContext`] owns all mutable state of one
//! user-initiated operation; nothing here is global.

mod background;
mod context;
mod erase;
mod guards;
mod hardlink;
mod operate;
mod progress;
mod recover;
mod symlink;
mod transfer;
mod tree;

pub use background::{BackgroundOperation, UiRequest, UiResponse, operate_in_background};
pub use context::{OperationContext, OperationKind};
pub use erase::{erase_dir, erase_file};
pub use guards::AncestorChain;
pub use hardlink::HardlinkOutcome;
pub use operate::{OperateSpec, compute_dir_size, operate, selection, selection_totals};
pub use progress::ProgressTracker;
pub use transfer::copy_file_file;
pub use tree::{copy_dir_dir, move_dir_dir, move_file_file};
