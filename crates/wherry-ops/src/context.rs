//! Per-operation state.

use std::collections::VecDeque;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::Display;
use wherry_core::{OperationOptions, RecursiveChoice, ReplaceChoice};
use wherry_vfs::current_umask;

use crate::guards::DestDirRegistry;
use crate::hardlink::HardlinkCache;
use crate::progress::ProgressTracker;

/// What the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum OperationKind {
    Copy,
    Move,
    Delete,
}

/// A source entry whose deletion was deferred until the destination tree
/// is complete.
#[derive(Debug, Clone)]
pub(crate) struct EraseItem {
    pub path: PathBuf,
    pub is_dir: bool,
}

/// All mutable state of one user-initiated operation.
///
/// Created when the operation starts and dropped when it ends; the hardlink
/// cache, cycle guards, and deferred-erase queue live here so concurrent
/// operations can never alias each other's state.
pub struct OperationContext {
    /// The operation kind.
    pub kind: OperationKind,
    /// Durable choices fixed at start.
    pub opts: OperationOptions,
    /// Umask applied to created modes.
    pub umask: u32,
    /// Live copy of the stable-symlinks option; disabled mid-operation
    /// when an endpoint turns out to be non-local.
    pub stable_symlinks: bool,
    /// Whether exact totals were computed by the pre-pass.
    pub totals_computed: bool,
    /// Running counters and timers.
    pub progress: ProgressTracker,
    /// Append to the destination instead of truncating (one file only).
    pub do_append: bool,
    /// Resume offset for the next transfer (one file only).
    pub reget_offset: u64,
    pub(crate) ignore_all: bool,
    pub(crate) replace_latch: Option<ReplaceChoice>,
    pub(crate) recursive_latch: Option<RecursiveChoice>,
    pub(crate) hardlinks: HardlinkCache,
    pub(crate) dest_dirs: DestDirRegistry,
    pub(crate) erase_queue: VecDeque<EraseItem>,
}

impl OperationContext {
    /// Create the context for one operation.
    pub fn new(kind: OperationKind, opts: OperationOptions) -> Self {
        let umask = opts.umask.unwrap_or_else(current_umask);
        let stable_symlinks = opts.stable_symlinks;
        Self {
            kind,
            opts,
            umask,
            stable_symlinks,
            totals_computed: false,
            progress: ProgressTracker::new(),
            do_append: false,
            reget_offset: 0,
            ignore_all: false,
            replace_latch: None,
            recursive_latch: None,
            hardlinks: HardlinkCache::new(),
            dest_dirs: DestDirRegistry::new(),
            erase_queue: VecDeque::new(),
        }
    }

    /// Mask `mode` with the operation's umask.
    pub fn mode_with_umask(&self, mode: u32) -> u32 {
        mode & !self.umask
    }

    /// Whether further error prompts are silenced.
    pub fn ignore_all(&self) -> bool {
        self.ignore_all
    }

    pub(crate) fn latch_ignore_all(&mut self) {
        self.ignore_all = true;
    }

    /// Take the one-file append/resume settings, resetting them.
    pub(crate) fn take_resume(&mut self) -> (bool, u64) {
        let resume = (self.do_append, self.reget_offset);
        self.do_append = false;
        self.reget_offset = 0;
        resume
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn umask_masks_created_modes() {
        let opts = OperationOptions {
            umask: Some(0o022),
            ..OperationOptions::default()
        };
        let ctx = OperationContext::new(OperationKind::Copy, opts);
        assert_eq!(ctx.mode_with_umask(0o777), 0o755);
        assert_eq!(ctx.mode_with_umask(0o666), 0o644);
    }

    #[test]
    fn take_resume_resets() {
        let mut ctx = OperationContext::new(OperationKind::Copy, OperationOptions::default());
        ctx.do_append = true;
        ctx.reget_offset = 42;
        assert_eq!(ctx.take_resume(), (true, 42));
        assert_eq!(ctx.take_resume(), (false, 0));
    }
}
