//! Status values threaded through every engine step.

use serde::{Deserialize, Serialize};

/// Result alias used by the engine: `Ok` means the step completed and the
/// caller continues; `Err` carries only [`OpStatus::Skip`] or
/// [`OpStatus::Abort`].
pub type OpResult<T = ()> = Result<T, OpStatus>;

/// Outcome of one engine step. Components return these rather than
/// panicking; callers at every level either continue, skip the current
/// item, or propagate Abort upward immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpStatus {
    /// The step succeeded; keep going.
    Continue,
    /// The current item is skipped; siblings still run.
    Skip,
    /// Re-issue the failed primitive.
    Retry,
    /// Proceed as if the step had trivially succeeded.
    Ignore,
    /// Like Ignore, and latch the decision for the rest of the operation.
    IgnoreAll,
    /// Unwind through every calling frame, releasing resources only.
    Abort,
}

impl OpStatus {
    /// Whether this status aborts the whole operation.
    pub fn is_abort(self) -> bool {
        self == Self::Abort
    }
}

/// Answer from the error-report collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorChoice {
    /// Proceed as if the step succeeded.
    Ignore,
    /// Ignore, and silence further prompts of this class for the rest of
    /// the operation.
    IgnoreAll,
    /// Re-issue the failed primitive.
    Retry,
    /// Abort the operation.
    Abort,
}

/// Answer from the overwrite-confirmation collaborator.
///
/// The sticky variants latch in the operation context and suppress further
/// prompts, mirroring the recursive-delete protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplaceChoice {
    /// Overwrite this destination.
    Yes,
    /// Skip this destination.
    No,
    /// Overwrite every remaining destination.
    Always,
    /// Skip every remaining destination.
    Never,
    /// Overwrite only when the source is newer, for the whole operation.
    Update,
    /// Overwrite only when the sizes differ, for the whole operation.
    IfSizeDiffers,
    /// Append the source to the destination.
    Append,
    /// Resume: seek the source to the destination's length and append.
    Reget,
    /// Abort the operation.
    Abort,
}

impl ReplaceChoice {
    /// Whether this decision latches for the remainder of the operation.
    pub fn is_sticky(self) -> bool {
        matches!(
            self,
            Self::Always | Self::Never | Self::Update | Self::IfSizeDiffers
        )
    }
}

/// Answer from the recursive-delete confirmation collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecursiveChoice {
    /// Delete this directory recursively.
    Yes,
    /// Keep this directory.
    No,
    /// Delete recursively without asking again.
    All,
    /// Keep every non-empty directory without asking again.
    None,
    /// Abort the operation.
    Abort,
}

/// Disposition of an incompletely transferred destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartialChoice {
    /// Remove the partial destination.
    Delete,
    /// Keep it (it can be resumed later).
    Keep,
}

/// Answer to a cancel/pause poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollChoice {
    /// Keep transferring.
    Continue,
    /// Pause; the engine polls again and excludes the wait from rate
    /// calculations.
    Suspend,
    /// Cancel the operation.
    Abort,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sticky_replace_choices() {
        assert!(ReplaceChoice::Always.is_sticky());
        assert!(ReplaceChoice::Never.is_sticky());
        assert!(ReplaceChoice::Update.is_sticky());
        assert!(ReplaceChoice::IfSizeDiffers.is_sticky());
        assert!(!ReplaceChoice::Yes.is_sticky());
        assert!(!ReplaceChoice::Append.is_sticky());
        assert!(!ReplaceChoice::Reget.is_sticky());
    }
}
