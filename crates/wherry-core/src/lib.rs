//! Core types for wherry.
//!
//! This crate provides the directory-listing model operations act on, the
//! pluggable sort engine, the durable option set of one operation, and the
//! contracts of the UI collaborators the engine calls back into.

mod entry;
mod listing;
mod options;
mod sort;
mod status;
mod ui;

pub use entry::{DirEntry, EntryFlags};
pub use listing::{DirListing, ListEvent, ListingFilter, RESIZE_STEP};
pub use options::{OperationOptions, OperationOptionsBuilder};
pub use sort::{SortField, SortOptions, natural_cmp};
pub use status::{
    ErrorChoice, OpResult, OpStatus, PartialChoice, PollChoice, RecursiveChoice, ReplaceChoice,
};
pub use ui::{
    FileProgress, IdentityTransform, NameOutcome, NameTransform, OpError, OperationUi,
    TotalProgress,
};
