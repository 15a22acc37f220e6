//! The error-recovery protocol threaded through every fallible primitive.

use std::path::Path;
use std::time::Duration;

use wherry_core::{ErrorChoice, OpError, OpResult, OpStatus, OperationUi, PollChoice};
use wherry_vfs::VfsResult;

use crate::context::OperationContext;

/// Run a primitive whose result the caller cannot proceed without.
///
/// Retry re-issues the call; Ignore and IgnoreAll resolve to skipping the
/// current item; Abort propagates. When IgnoreAll is already latched the
/// failure resolves silently.
pub(crate) fn retry_required<T>(
    ctx: &mut OperationContext,
    ui: &mut dyn OperationUi,
    what: &str,
    path: &Path,
    mut f: impl FnMut() -> VfsResult<T>,
) -> OpResult<T> {
    loop {
        match f() {
            Ok(value) => return Ok(value),
            Err(err) => {
                tracing::debug!(what, path = %path.display(), error = %err, "step failed");
                if ctx.ignore_all() {
                    return Err(OpStatus::Skip);
                }
                match ask(ctx, ui, &OpError::new(what, path, err.to_string()), true) {
                    ErrorChoice::Retry => continue,
                    ErrorChoice::Ignore => return Err(OpStatus::Skip),
                    ErrorChoice::IgnoreAll => {
                        ctx.latch_ignore_all();
                        return Err(OpStatus::Skip);
                    }
                    ErrorChoice::Abort => return Err(OpStatus::Abort),
                }
            }
        }
    }
}

/// Run a primitive the operation can proceed without (attribute sync,
/// close of a read handle). Ignore and IgnoreAll proceed as if the step
/// had succeeded; only Abort fails.
pub(crate) fn retry_tolerant<T>(
    ctx: &mut OperationContext,
    ui: &mut dyn OperationUi,
    what: &str,
    path: &Path,
    mut f: impl FnMut() -> VfsResult<T>,
) -> OpResult<Option<T>> {
    loop {
        match f() {
            Ok(value) => return Ok(Some(value)),
            Err(err) => {
                tracing::debug!(what, path = %path.display(), error = %err, "step failed");
                if ctx.ignore_all() {
                    return Ok(None);
                }
                match ask(ctx, ui, &OpError::new(what, path, err.to_string()), true) {
                    ErrorChoice::Retry => continue,
                    ErrorChoice::Ignore => return Ok(None),
                    ErrorChoice::IgnoreAll => {
                        ctx.latch_ignore_all();
                        return Ok(None);
                    }
                    ErrorChoice::Abort => return Err(OpStatus::Abort),
                }
            }
        }
    }
}

/// Surface one report, keeping prompt time out of the rate window.
pub(crate) fn ask(
    ctx: &mut OperationContext,
    ui: &mut dyn OperationUi,
    error: &OpError,
    retryable: bool,
) -> ErrorChoice {
    ctx.progress.pause_begin();
    let choice = ui.report(error, retryable);
    ctx.progress.pause_end();
    choice
}

/// Poll the UI for a pending cancel or pause request. A pause blocks here
/// with the wait excluded from rate calculations.
pub(crate) fn poll_ui(ctx: &mut OperationContext, ui: &mut dyn OperationUi) -> OpResult<()> {
    let mut suspended = false;
    let result = loop {
        match ui.poll() {
            PollChoice::Continue => break Ok(()),
            PollChoice::Abort => break Err(OpStatus::Abort),
            PollChoice::Suspend => {
                if !suspended {
                    suspended = true;
                    ctx.progress.pause_begin();
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        }
    };
    if suspended {
        ctx.progress.pause_end();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use wherry_core::{FileProgress, PartialChoice, RecursiveChoice, ReplaceChoice, TotalProgress};
    use wherry_vfs::{Metadata, VfsError};

    use crate::context::OperationKind;
    use wherry_core::OperationOptions;

    struct ChoiceUi {
        choices: VecDeque<ErrorChoice>,
        reports: usize,
    }

    impl OperationUi for ChoiceUi {
        fn show_source(&mut self, _path: Option<&Path>) {}
        fn show_target(&mut self, _path: Option<&Path>) {}
        fn show_deleting(&mut self, _path: &Path) {}
        fn show_file_progress(&mut self, _progress: &FileProgress) {}
        fn show_total_progress(&mut self, _progress: &TotalProgress) {}
        fn poll(&mut self) -> PollChoice {
            PollChoice::Continue
        }
        fn report(&mut self, _error: &OpError, _retryable: bool) -> ErrorChoice {
            self.reports += 1;
            self.choices.pop_front().unwrap_or(ErrorChoice::Abort)
        }
        fn note(&mut self, _message: &str) {}
        fn confirm_overwrite(
            &mut self,
            _source: &Path,
            _source_meta: &Metadata,
            _dest: &Path,
            _dest_meta: &Metadata,
        ) -> ReplaceChoice {
            ReplaceChoice::No
        }
        fn confirm_recursive_delete(&mut self, _path: &Path) -> RecursiveChoice {
            RecursiveChoice::No
        }
        fn confirm_partial(&mut self, _dest: &Path) -> PartialChoice {
            PartialChoice::Keep
        }
    }

    fn ctx() -> OperationContext {
        OperationContext::new(OperationKind::Copy, OperationOptions::default())
    }

    #[test]
    fn retry_reissues_until_success() {
        let mut ctx = ctx();
        let mut ui = ChoiceUi {
            choices: VecDeque::from([ErrorChoice::Retry, ErrorChoice::Retry]),
            reports: 0,
        };
        let mut attempts = 0;
        let result = retry_required(&mut ctx, &mut ui, "Cannot open", &PathBuf::from("/x"), || {
            attempts += 1;
            if attempts < 3 {
                Err(VfsError::unsupported("/x"))
            } else {
                Ok(attempts)
            }
        });
        assert_eq!(result, Ok(3));
        assert_eq!(ui.reports, 2);
    }

    #[test]
    fn ignore_all_latches_and_silences() {
        let mut ctx = ctx();
        let mut ui = ChoiceUi {
            choices: VecDeque::from([ErrorChoice::IgnoreAll]),
            reports: 0,
        };
        let r: OpResult<()> = retry_required(&mut ctx, &mut ui, "Cannot open", &PathBuf::from("/x"), || {
            Err(VfsError::unsupported("/x"))
        });
        assert_eq!(r, Err(OpStatus::Skip));
        assert!(ctx.ignore_all());

        // Second failure resolves without a prompt.
        let r: OpResult<()> = retry_required(&mut ctx, &mut ui, "Cannot open", &PathBuf::from("/y"), || {
            Err(VfsError::unsupported("/y"))
        });
        assert_eq!(r, Err(OpStatus::Skip));
        assert_eq!(ui.reports, 1);
    }

    #[test]
    fn tolerant_ignore_is_success() {
        let mut ctx = ctx();
        let mut ui = ChoiceUi {
            choices: VecDeque::from([ErrorChoice::Ignore]),
            reports: 0,
        };
        let r = retry_tolerant(&mut ctx, &mut ui, "Cannot chmod", &PathBuf::from("/x"), || {
            Err::<(), _>(VfsError::unsupported("/x"))
        });
        assert_eq!(r, Ok(None));
    }

    #[test]
    fn abort_propagates() {
        let mut ctx = ctx();
        let mut ui = ChoiceUi {
            choices: VecDeque::from([ErrorChoice::Abort]),
            reports: 0,
        };
        let r: OpResult<()> = retry_required(&mut ctx, &mut ui, "Cannot open", &PathBuf::from("/x"), || {
            Err(VfsError::unsupported("/x"))
        });
        assert_eq!(r, Err(OpStatus::Abort));
    }
}
