//! Single-file transfer.

use std::path::Path;

use wherry_core::{
    ErrorChoice, OpError, OpResult, OpStatus, OperationUi, PartialChoice, ReplaceChoice,
};
use wherry_vfs::{Metadata, Vfs, WriteMode};

use crate::context::OperationContext;
use crate::hardlink::{HardlinkOutcome, check_hardlinks};
use crate::recover::{ask, poll_ui, retry_required, retry_tolerant};
use crate::symlink::make_symlink;

/// Destination state while a transfer is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DestState {
    /// Created but not fully copied.
    Short,
    /// Fully copied.
    Full,
}

/// Stat a source path honoring the follow-symlinks choice.
pub(crate) fn source_stat(
    follow_symlinks: bool,
    fs: &dyn Vfs,
    path: &Path,
) -> wherry_vfs::VfsResult<Metadata> {
    if follow_symlinks {
        fs.stat(path)
    } else {
        fs.lstat(path)
    }
}

/// Resolve a sticky or fresh overwrite decision for one destination.
///
/// Sticky answers latch in the context; Append and Reget arm the one-file
/// resume state consumed by the next transfer.
pub(crate) fn query_replace(
    ctx: &mut OperationContext,
    ui: &mut dyn OperationUi,
    src: &Path,
    src_meta: &Metadata,
    dst: &Path,
    dst_meta: &Metadata,
) -> OpResult<()> {
    let choice = match ctx.replace_latch {
        Some(latched) => latched,
        None => {
            ctx.progress.pause_begin();
            let choice = ui.confirm_overwrite(src, src_meta, dst, dst_meta);
            ctx.progress.pause_end();
            if choice.is_sticky() {
                ctx.replace_latch = Some(choice);
            }
            choice
        }
    };

    match choice {
        ReplaceChoice::Yes | ReplaceChoice::Always => Ok(()),
        ReplaceChoice::No | ReplaceChoice::Never => Err(OpStatus::Skip),
        ReplaceChoice::Update => {
            if src_meta.mtime > dst_meta.mtime {
                Ok(())
            } else {
                Err(OpStatus::Skip)
            }
        }
        ReplaceChoice::IfSizeDiffers => {
            if src_meta.size != dst_meta.size {
                Ok(())
            } else {
                Err(OpStatus::Skip)
            }
        }
        ReplaceChoice::Reget => {
            ctx.reget_offset = dst_meta.size;
            ctx.do_append = true;
            Ok(())
        }
        ReplaceChoice::Append => {
            ctx.do_append = true;
            Ok(())
        }
        ReplaceChoice::Abort => Err(OpStatus::Abort),
    }
}

/// Copy one file.
///
/// Handles the same-file and destination-is-directory policy conflicts,
/// the hardlink cache, symlinks and special files, the clone fast path,
/// the chunked transfer loop with per-chunk cancellation, resume offsets,
/// the partial-destination prompt, and post-copy attribute sync.
///
/// `toplevel` marks an entry of the user's selection; nested entries only
/// advance the counters when exact totals were computed.
pub fn copy_file_file(
    ctx: &mut OperationContext,
    ui: &mut dyn OperationUi,
    fs: &dyn Vfs,
    src: &Path,
    dst: &Path,
    ask_overwrite: bool,
    toplevel: bool,
) -> OpResult<()> {
    ui.show_source(Some(src));
    ui.show_target(Some(dst));
    poll_ui(ctx, ui)?;

    // The destination must not be a directory.
    let mut dst_meta = None;
    loop {
        match fs.stat(dst) {
            Ok(meta) if meta.is_dir() => {
                if ctx.ignore_all() {
                    return Err(OpStatus::Skip);
                }
                let error =
                    OpError::new("Cannot overwrite directory", dst, "destination is a directory");
                match ask(ctx, ui, &error, true) {
                    ErrorChoice::Retry => continue,
                    ErrorChoice::Ignore => return Err(OpStatus::Skip),
                    ErrorChoice::IgnoreAll => {
                        ctx.latch_ignore_all();
                        return Err(OpStatus::Skip);
                    }
                    ErrorChoice::Abort => return Err(OpStatus::Abort),
                }
            }
            Ok(meta) => {
                dst_meta = Some(meta);
                break;
            }
            Err(_) => break,
        }
    }

    let follow = ctx.opts.follow_symlinks;
    let src_meta = retry_required(ctx, ui, "Cannot stat source file", src, || {
        source_stat(follow, fs, src)
    })?;

    if let Some(dmeta) = dst_meta {
        // Policy conflict, not a retryable failure: the only outcomes are
        // skipping or aborting, and aborting is the poll's job.
        if src_meta.same_file(&dmeta) {
            ui.note(&format!(
                "\"{}\" and \"{}\" are the same file",
                src.display(),
                dst.display()
            ));
            return Err(OpStatus::Skip);
        }

        if ask_overwrite && ctx.opts.confirm_overwrite {
            query_replace(ctx, ui, src, &src_meta, dst, &dmeta)?;
        }
    }

    if !ctx.do_append {
        if !ctx.opts.follow_symlinks && src_meta.nlink > 1 {
            match check_hardlinks(ctx, ui, fs, src, dst, &src_meta) {
                HardlinkOutcome::Linked => {
                    return finish(ctx, ui, src_meta.size, toplevel);
                }
                HardlinkOutcome::Abort => return Err(OpStatus::Abort),
                HardlinkOutcome::Cached
                | HardlinkOutcome::NotALink
                | HardlinkOutcome::Unsupported
                | HardlinkOutcome::Failed => {}
            }
        }

        if src_meta.is_symlink() {
            return make_symlink(ctx, ui, fs, src, dst);
        }

        if src_meta.is_special() {
            let mode = ctx.mode_with_umask(src_meta.mode);
            retry_required(ctx, ui, "Cannot create special file", dst, || {
                fs.mknod(dst, src_meta.kind, mode, src_meta.rdev)
            })?;
            if ctx.opts.preserve_owner {
                retry_required(ctx, ui, "Cannot chown target file", dst, || {
                    fs.chown(dst, src_meta.uid, src_meta.gid)
                })?;
            }
            if ctx.opts.preserve {
                retry_required(ctx, ui, "Cannot chmod target file", dst, || {
                    fs.chmod(dst, mode)
                })?;
            }
            return Ok(());
        }
    }

    copy_regular(ctx, ui, fs, src, dst, toplevel)
}

/// The regular-file data path.
fn copy_regular(
    ctx: &mut OperationContext,
    ui: &mut dyn OperationUi,
    fs: &dyn Vfs,
    src: &Path,
    dst: &Path,
    toplevel: bool,
) -> OpResult<()> {
    let (mut appending, mut reget) = ctx.take_resume();

    let mut src_file = retry_required(ctx, ui, "Cannot open source file", src, || {
        fs.open_read(src)
    })?;

    if reget > 0 && src_file.seek_to(reget).is_err() {
        ui.note("Resume failed, about to overwrite file");
        reget = 0;
        appending = false;
    }

    let open_meta = retry_required(ctx, ui, "Cannot fstat source file", src, || {
        src_file.metadata()
    })?;
    let file_size = open_meta.size;
    // Some defective backends report no permissions at all; if data is
    // readable the destination still needs a usable mode.
    let src_mode = if open_meta.mode & 0o777 == 0 {
        0o644
    } else {
        open_meta.mode
    };

    let write_mode = if appending {
        WriteMode::Append
    } else {
        WriteMode::Create
    };
    // Created with tight permissions; the real mode is applied after the
    // data is on disk.
    let mut dst_file = retry_required(ctx, ui, "Cannot create target file", dst, || {
        fs.open_write(dst, write_mode, 0o600)
    })?;

    let mut dst_state = DestState::Short;

    ctx.progress.begin_file(file_size);
    ctx.progress.refresh();
    ui.show_file_progress(&ctx.progress.file_progress());
    ui.show_total_progress(&ctx.progress.snapshot());

    let body: OpResult<()> = 'copy: {
        if !appending && reget == 0 {
            match fs.clone_file(src, dst) {
                Ok(true) => {
                    tracing::debug!(src = %src.display(), dst = %dst.display(), "cloned");
                    ctx.progress.add_file_bytes(file_size);
                    ui.show_file_progress(&ctx.progress.file_progress());
                    dst_state = DestState::Full;
                    break 'copy Ok(());
                }
                Ok(false) => {}
                Err(err) => {
                    tracing::debug!(error = %err, "clone hint failed, copying in chunks");
                }
            }
        }

        if !appending {
            let _ = dst_file.preallocate(file_size);
        }

        let mut buf = vec![0u8; fs.block_size(src)];
        loop {
            let n = match retry_required(ctx, ui, "Cannot read source file", src, || {
                src_file.read(&mut buf)
            }) {
                Ok(n) => n,
                Err(status) => break 'copy Err(status),
            };
            if n == 0 {
                break;
            }

            // Short writes are legal; zero-progress writes (disk full,
            // dropped connection) go through recovery.
            let mut written = 0;
            while written < n {
                match dst_file.write(&buf[written..n]) {
                    Ok(count) if count > 0 => written += count,
                    result => {
                        if ctx.ignore_all() {
                            break 'copy Err(OpStatus::Skip);
                        }
                        let detail = match result {
                            Err(err) => err.to_string(),
                            Ok(_) => "no bytes written".to_owned(),
                        };
                        let error = OpError::new("Cannot write target file", dst, detail);
                        match ask(ctx, ui, &error, true) {
                            ErrorChoice::Retry => continue,
                            ErrorChoice::Ignore => break 'copy Err(OpStatus::Skip),
                            ErrorChoice::IgnoreAll => {
                                ctx.latch_ignore_all();
                                break 'copy Err(OpStatus::Skip);
                            }
                            ErrorChoice::Abort => break 'copy Err(OpStatus::Abort),
                        }
                    }
                }
            }

            ctx.progress.add_file_bytes(n as u64);
            ui.show_file_progress(&ctx.progress.file_progress());
            if ctx.progress.due() {
                ctx.progress.refresh();
                ui.show_total_progress(&ctx.progress.snapshot());
            }
            if let Err(status) = poll_ui(ctx, ui) {
                break 'copy Err(status);
            }
        }

        dst_state = DestState::Full;
        Ok(())
    };

    let mut status = body;

    // Handles are released on every exit path; close failures are
    // retryable and an Abort from either escalates.
    if retry_tolerant(ctx, ui, "Cannot close source file", src, || src_file.close()).is_err() {
        status = Err(OpStatus::Abort);
    }
    if retry_tolerant(ctx, ui, "Cannot close target file", dst, || dst_file.close()).is_err() {
        status = Err(OpStatus::Abort);
    }
    drop(src_file);
    drop(dst_file);

    match dst_state {
        DestState::Short => {
            ctx.progress.pause_begin();
            let choice = ui.confirm_partial(dst);
            ctx.progress.pause_end();
            if choice == PartialChoice::Delete {
                let _ = fs.unlink(dst);
            }
        }
        DestState::Full => {
            if !appending {
                if ctx.opts.preserve_owner
                    && retry_tolerant(ctx, ui, "Cannot chown target file", dst, || {
                        fs.chown(dst, open_meta.uid, open_meta.gid)
                    })
                    .is_err()
                {
                    status = Err(OpStatus::Abort);
                }

                if ctx.opts.preserve {
                    let mode = ctx.mode_with_umask(src_mode);
                    if retry_tolerant(ctx, ui, "Cannot chmod target file", dst, || {
                        fs.chmod(dst, mode)
                    })
                    .is_err()
                    {
                        status = Err(OpStatus::Abort);
                    }
                } else if let Err(err) = fs.chmod(dst, ctx.mode_with_umask(0o666)) {
                    tracing::debug!(path = %dst.display(), error = %err, "cannot set default mode");
                }

                // Timestamps always follow the source; attribute errors of
                // the unsupported class are swallowed silently.
                if let Err(err) = fs.set_times(dst, open_meta.atime, open_meta.mtime)
                    && !err.is_unsupported()
                {
                    tracing::debug!(path = %dst.display(), error = %err, "cannot set times");
                }
                if ctx.opts.preserve
                    && let Err(err) = fs.copy_attrs(src, dst)
                    && !err.is_unsupported()
                {
                    tracing::debug!(path = %dst.display(), error = %err, "cannot copy attributes");
                }
            }
        }
    }

    match status {
        Ok(()) => finish(ctx, ui, file_size, toplevel),
        err => err,
    }
}

/// Advance the operation counters after one successful item and give the
/// UI a chance to cancel.
fn finish(
    ctx: &mut OperationContext,
    ui: &mut dyn OperationUi,
    bytes: u64,
    toplevel: bool,
) -> OpResult<()> {
    ctx.progress
        .complete_item(bytes, toplevel || ctx.totals_computed);
    ctx.progress.refresh();
    ui.show_total_progress(&ctx.progress.snapshot());
    poll_ui(ctx, ui)
}
