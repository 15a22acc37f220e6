//! Contracts of the UI collaborators the engine calls back into.
//!
//! The engine never renders anything; every prompt, progress update, and
//! error dialog goes through [`OperationUi`]. Implementations may be a
//! terminal front end, a scripted test double, or the remote stub that
//! marshals calls back to the owning thread during background execution.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use wherry_vfs::Metadata;

use crate::status::{ErrorChoice, PartialChoice, PollChoice, RecursiveChoice, ReplaceChoice};

/// A failed step, rendered for the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpError {
    /// What the engine was doing, e.g. "Cannot stat source file".
    pub what: String,
    /// The offending path.
    pub path: PathBuf,
    /// Second path for two-path failures (rename, link), if any.
    pub second: Option<PathBuf>,
    /// Human-readable rendering of the underlying backend error.
    pub detail: String,
}

impl OpError {
    /// Create a one-path error report.
    pub fn new(what: impl Into<String>, path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self {
            what: what.into(),
            path: path.into(),
            second: None,
            detail: detail.into(),
        }
    }

    /// Create a two-path error report.
    pub fn with_second(mut self, second: impl Into<PathBuf>) -> Self {
        self.second = Some(second.into());
        self
    }
}

impl std::fmt::Display for OpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.second {
            Some(second) => write!(
                f,
                "{} \"{}\" -> \"{}\": {}",
                self.what,
                self.path.display(),
                second.display(),
                self.detail
            ),
            None => write!(f, "{} \"{}\": {}", self.what, self.path.display(), self.detail),
        }
    }
}

/// Byte progress of the file currently transferring.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FileProgress {
    /// Bytes transferred so far.
    pub done: u64,
    /// Size of the file, 0 when unknown.
    pub total: u64,
}

/// Progress of the whole operation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TotalProgress {
    /// Items completed.
    pub files_done: u64,
    /// Items in the selection, or the best estimate.
    pub files_total: u64,
    /// Bytes completed.
    pub bytes_done: u64,
    /// Total bytes, 0 when totals were not computed.
    pub bytes_total: u64,
    /// Transfer rate in bytes per second, prompt time excluded.
    pub bytes_per_second: u64,
    /// Estimated seconds to completion, 0 when unknown.
    pub eta_secs: u64,
    /// No bytes have arrived for longer than the stall threshold.
    pub stalled: bool,
}

/// The interactive collaborator of one operation.
pub trait OperationUi {
    /// Display the path currently being read, or clear it.
    fn show_source(&mut self, path: Option<&Path>);

    /// Display the path currently being written, or clear it.
    fn show_target(&mut self, path: Option<&Path>);

    /// Display the path currently being deleted.
    fn show_deleting(&mut self, path: &Path);

    /// Update the per-file progress bar.
    fn show_file_progress(&mut self, progress: &FileProgress);

    /// Update the operation-wide counters.
    fn show_total_progress(&mut self, progress: &TotalProgress);

    /// Poll for a pending cancel or pause request.
    fn poll(&mut self) -> PollChoice;

    /// Report a failed step. `retryable` is false for policy conflicts
    /// that re-running cannot fix.
    fn report(&mut self, error: &OpError, retryable: bool) -> ErrorChoice;

    /// Show a one-off message that needs no decision (same-file notice,
    /// cyclic-link skip, downgrade warnings).
    fn note(&mut self, message: &str);

    /// Ask whether to replace an existing destination.
    fn confirm_overwrite(
        &mut self,
        source: &Path,
        source_meta: &Metadata,
        dest: &Path,
        dest_meta: &Metadata,
    ) -> ReplaceChoice;

    /// Ask whether to delete a non-empty directory recursively.
    fn confirm_recursive_delete(&mut self, path: &Path) -> RecursiveChoice;

    /// Ask what to do with an incompletely transferred destination.
    fn confirm_partial(&mut self, dest: &Path) -> PartialChoice;
}

/// Outcome of applying a name mask to one source name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameOutcome {
    /// Use this destination name.
    Name(String),
    /// Skip this entry.
    Skip,
    /// Abort the operation (invalid mask).
    Abort,
}

/// The name-mask service computing destination names from source names.
/// Mask parsing and search-and-replace live outside the engine; this is
/// the consumed contract only.
pub trait NameTransform {
    /// Transform one source name into its destination name.
    fn apply(&self, source_name: &str) -> NameOutcome;
}

/// The trivial transform: destination name equals source name.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransform;

impl NameTransform for IdentityTransform {
    fn apply(&self, source_name: &str) -> NameOutcome {
        NameOutcome::Name(source_name.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_error_renders_paths() {
        let err = OpError::new("Cannot stat source file", "/a/b", "permission denied");
        assert_eq!(
            err.to_string(),
            "Cannot stat source file \"/a/b\": permission denied"
        );
        let err = err.with_second("/c/d");
        assert!(err.to_string().contains("-> \"/c/d\""));
    }

    #[test]
    fn identity_transform_keeps_name() {
        assert_eq!(
            IdentityTransform.apply("a.txt"),
            NameOutcome::Name("a.txt".into())
        );
    }
}
