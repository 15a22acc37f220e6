//! Directory-tree transfer and the move fallback path.

use std::path::{Path, PathBuf};

use wherry_core::{ErrorChoice, OpError, OpResult, OpStatus, OperationUi};
use wherry_vfs::{Metadata, Vfs, file_id};

use crate::context::{EraseItem, OperationContext};
use crate::erase::{erase_dir_if_empty, erase_file, flush_erase_queue};
use crate::guards::AncestorChain;
use crate::hardlink::{HardlinkOutcome, check_hardlinks};
use crate::recover::{ask, poll_ui, retry_required};
use crate::symlink::make_symlink;
use crate::transfer::{copy_file_file, query_replace, source_stat};

/// Copy the directory tree at `s` to `d`.
///
/// Cycle safety: a source identity already recorded as a destination
/// created by this run means the tree is being copied into itself and is
/// treated as already copied; a source identity on the ancestor chain is a
/// symlink back into its own ancestry and is skipped with a message. The
/// chain is pushed for the duration of the call and popped on every exit.
///
/// With `delete` set each fully transferred entry is removed — immediately,
/// or queued on the deferred-erase queue when the operation asked for
/// erase-at-end. `move_over` lets a filesystem-local move replace the
/// directory creation with a rename.
///
/// Returns `Err(Skip)` when any entry could not be transferred, so a
/// caller deleting the source afterwards knows the tree is incomplete.
pub fn copy_dir_dir(
    ctx: &mut OperationContext,
    ui: &mut dyn OperationUi,
    fs: &dyn Vfs,
    s: &Path,
    d: &Path,
    toplevel: bool,
    move_over: bool,
    delete: bool,
    chain: &mut AncestorChain,
) -> OpResult<()> {
    let follow = ctx.opts.follow_symlinks;
    let mut src_meta = retry_required(ctx, ui, "Cannot stat source directory", s, || {
        source_stat(follow, fs, s)
    })?;

    let src_id = file_id(fs, s, &src_meta);
    if ctx.dest_dirs.contains(&src_id) {
        // This directory was created by this very run: the tree is being
        // copied into itself. Treat it as already copied.
        tracing::debug!(path = %s.display(), "self-copy detected, not recursing");
        return Ok(());
    }

    // Some backends hard-link directories.
    if ctx.opts.preserve && src_meta.nlink > 1 {
        match check_hardlinks(ctx, ui, fs, s, d, &src_meta) {
            HardlinkOutcome::Linked => return Ok(()),
            HardlinkOutcome::Abort => return Err(OpStatus::Abort),
            _ => {}
        }
    }

    while !src_meta.is_dir() {
        if ctx.ignore_all() {
            return Err(OpStatus::Skip);
        }
        let error = OpError::new("Source is not a directory", s, "expected a directory");
        match ask(ctx, ui, &error, true) {
            ErrorChoice::Retry => {
                src_meta = retry_required(ctx, ui, "Cannot stat source directory", s, || {
                    source_stat(follow, fs, s)
                })?;
            }
            ErrorChoice::Ignore => return Err(OpStatus::Skip),
            ErrorChoice::IgnoreAll => {
                ctx.latch_ignore_all();
                return Err(OpStatus::Skip);
            }
            ErrorChoice::Abort => return Err(OpStatus::Abort),
        }
    }

    if chain.contains(&src_id) {
        ui.note(&format!(
            "Cannot copy cyclic symbolic link \"{}\"",
            s.display()
        ));
        return Err(OpStatus::Skip);
    }

    chain.push(src_id);
    let result = copy_dir_inner(ctx, ui, fs, s, d, &src_meta, toplevel, move_over, delete, chain);
    chain.pop();
    result
}

#[allow(clippy::too_many_arguments)]
fn copy_dir_inner(
    ctx: &mut OperationContext,
    ui: &mut dyn OperationUi,
    fs: &dyn Vfs,
    s: &Path,
    d: &Path,
    src_meta: &Metadata,
    toplevel: bool,
    move_over: bool,
    delete: bool,
    chain: &mut AncestorChain,
) -> OpResult<()> {
    // Resolve the destination directory.
    let mut created = false;
    let dest_dir: PathBuf = match fs.stat(d) {
        Err(_) => {
            // Absent: a filesystem-local move can simply take the name.
            if move_over && fs.rename(s, d).is_ok() {
                return Ok(());
            }
            created = true;
            d.to_path_buf()
        }
        Ok(meta) if !meta.is_dir() => {
            if ctx.ignore_all() {
                return Err(OpStatus::Skip);
            }
            let error = OpError::new("Destination must be a directory", d, "not a directory");
            return match ask(ctx, ui, &error, false) {
                ErrorChoice::Abort => Err(OpStatus::Abort),
                _ => Err(OpStatus::Skip),
            };
        }
        Ok(_) => {
            if toplevel && ctx.opts.dive_into_subdirs {
                // Merge policy: nest under the source's base name instead
                // of spilling into the existing directory.
                created = true;
                match s.file_name() {
                    Some(base) => d.join(base),
                    None => d.to_path_buf(),
                }
            } else {
                d.to_path_buf()
            }
        }
    };

    if created {
        // Keep the directory traversable by its creator until attributes
        // are settled after the loop.
        let mode = ctx.mode_with_umask(src_meta.mode) | 0o700;
        retry_required(ctx, ui, "Cannot create target directory", &dest_dir, || {
            fs.mkdir(&dest_dir, mode)
        })?;

        if let Ok(meta) = fs.stat(&dest_dir) {
            ctx.dest_dirs.record(file_id(fs, &dest_dir, &meta));
        }

        if ctx.opts.preserve_owner {
            retry_required(ctx, ui, "Cannot chown target directory", &dest_dir, || {
                fs.chown(&dest_dir, src_meta.uid, src_meta.gid)
            })?;
        }
    }

    let mut reading = retry_required(ctx, ui, "Cannot read source directory", s, || {
        fs.open_dir(s)
    })?;

    let follow = ctx.opts.follow_symlinks;
    let mut incomplete = false;
    let mut aborted = false;

    loop {
        let name = match reading.next_entry() {
            Ok(Some(name)) => name,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(path = %s.display(), error = %err, "readdir failed");
                incomplete = true;
                break;
            }
        };
        if name == "." || name == ".." {
            continue;
        }

        let path = s.join(&name);
        let meta = match retry_required(ctx, ui, "Cannot stat file", &path, || {
            source_stat(follow, fs, &path)
        }) {
            Ok(meta) => meta,
            Err(OpStatus::Abort) => {
                aborted = true;
                break;
            }
            Err(_) => {
                incomplete = true;
                continue;
            }
        };

        let status = if meta.is_dir() {
            let target = dest_dir.join(&name);
            copy_dir_dir(ctx, ui, fs, &path, &target, false, false, delete, chain)
        } else {
            let target = dest_dir.join(&name);
            copy_file_file(ctx, ui, fs, &path, &target, true, false)
        };

        match status {
            Ok(()) => {
                if delete {
                    if ctx.opts.erase_at_end {
                        ctx.erase_queue.push_back(EraseItem {
                            path: path.clone(),
                            is_dir: meta.is_dir(),
                        });
                    } else {
                        let erased = if meta.is_dir() {
                            erase_dir_if_empty(ctx, ui, fs, &path)
                        } else {
                            erase_file(ctx, ui, fs, &path, false)
                        };
                        match erased {
                            Ok(()) => {}
                            Err(OpStatus::Abort) => {
                                aborted = true;
                                break;
                            }
                            Err(_) => incomplete = true,
                        }
                    }
                }
            }
            Err(OpStatus::Abort) => {
                aborted = true;
                break;
            }
            Err(_) => incomplete = true,
        }
    }
    drop(reading);

    // Attributes of the directory itself come last, after its children.
    if ctx.opts.preserve {
        if let Err(err) = fs.chmod(&dest_dir, ctx.mode_with_umask(src_meta.mode)) {
            tracing::debug!(path = %dest_dir.display(), error = %err, "cannot chmod directory");
        }
        if let Err(err) = fs.set_times(&dest_dir, src_meta.atime, src_meta.mtime)
            && !err.is_unsupported()
        {
            tracing::debug!(path = %dest_dir.display(), error = %err, "cannot set directory times");
        }
        if let Err(err) = fs.copy_attrs(s, &dest_dir)
            && !err.is_unsupported()
        {
            tracing::debug!(path = %dest_dir.display(), error = %err, "cannot copy directory attributes");
        }
    } else if created && let Err(err) = fs.chmod(&dest_dir, ctx.mode_with_umask(0o777)) {
        tracing::debug!(path = %dest_dir.display(), error = %err, "cannot set default directory mode");
    }

    if aborted {
        Err(OpStatus::Abort)
    } else if incomplete {
        Err(OpStatus::Skip)
    } else {
        Ok(())
    }
}

/// Move one non-directory entry: rename when the backend can, otherwise
/// copy and delete the source.
pub fn move_file_file(
    ctx: &mut OperationContext,
    ui: &mut dyn OperationUi,
    fs: &dyn Vfs,
    s: &Path,
    d: &Path,
) -> OpResult<()> {
    ui.show_source(Some(s));
    ui.show_target(Some(d));
    poll_ui(ctx, ui)?;

    let src_meta = retry_required(ctx, ui, "Cannot stat file", s, || fs.lstat(s))?;

    if let Ok(dst_meta) = fs.lstat(d) {
        if src_meta.same_file(&dst_meta) {
            ui.note(&format!(
                "\"{}\" and \"{}\" are the same file",
                s.display(),
                d.display()
            ));
            return Err(OpStatus::Skip);
        }
        if dst_meta.is_dir() {
            ui.note(&format!("Cannot overwrite directory \"{}\"", d.display()));
            return Err(OpStatus::Skip);
        }
        if ctx.opts.confirm_overwrite {
            query_replace(ctx, ui, s, &src_meta, d, &dst_meta)?;
        }
    }

    if !ctx.do_append {
        // A stable symlink cannot be renamed into place: its target must
        // be rewritten for the new location.
        if src_meta.is_symlink() && ctx.stable_symlinks {
            make_symlink(ctx, ui, fs, s, d)?;
            retry_required(ctx, ui, "Cannot remove file", s, || fs.unlink(s))?;
            return finish_move(ctx, ui, src_meta.size);
        }

        if fs.rename(s, d).is_ok() {
            return finish_move(ctx, ui, src_meta.size);
        }
        // Rename can fail with EXDEV, or with EIO from network filesystems
        // that straddle a boundary; either way copy-then-delete works.
    }

    copy_file_file(ctx, ui, fs, s, d, false, true)?;

    ui.show_source(None);
    ui.show_file_progress(&ctx.progress.file_progress());

    retry_required(ctx, ui, "Cannot remove file", s, || fs.unlink(s))?;
    Ok(())
}

/// Move a directory: rename when the backend can, otherwise copy the tree
/// and erase the source, deferring deletions when erase-at-end is set.
pub fn move_dir_dir(
    ctx: &mut OperationContext,
    ui: &mut dyn OperationUi,
    fs: &dyn Vfs,
    s: &Path,
    d: &Path,
) -> OpResult<()> {
    ui.show_source(Some(s));
    ui.show_target(Some(d));
    poll_ui(ctx, ui)?;

    let src_meta = retry_required(ctx, ui, "Cannot stat source directory", s, || fs.stat(s))?;
    let dst_meta = fs.stat(d).ok();

    let mut move_over = false;
    let destdir: PathBuf = match &dst_meta {
        None => d.to_path_buf(),
        Some(_) if !ctx.opts.dive_into_subdirs => {
            move_over = true;
            d.to_path_buf()
        }
        Some(_) => match s.file_name() {
            Some(base) => d.join(base),
            None => d.to_path_buf(),
        },
    };

    if let Some(dmeta) = &dst_meta
        && src_meta.same_file(dmeta)
    {
        ui.note(&format!(
            "\"{}\" and \"{}\" are the same directory",
            s.display(),
            d.display()
        ));
        return Err(OpStatus::Skip);
    }

    let mut chain = AncestorChain::new();
    let result = if fs.stat(&destdir).is_ok() {
        if move_over {
            copy_dir_dir(ctx, ui, fs, s, &destdir, false, true, true, &mut chain)
        } else {
            // The resolved destination already exists and merging was not
            // requested.
            if ctx.ignore_all() {
                return Err(OpStatus::Skip);
            }
            let error = OpError::new("Cannot overwrite destination", &destdir, "already exists");
            return match ask(ctx, ui, &error, false) {
                ErrorChoice::Abort => Err(OpStatus::Abort),
                _ => Err(OpStatus::Skip),
            };
        }
    } else {
        match fs.rename(s, &destdir) {
            Ok(()) => return finish_move(ctx, ui, 0),
            Err(err) if err.is_cross_device() => {
                // Filesystem boundary: fall back to copy-then-delete.
                copy_dir_dir(ctx, ui, fs, s, &destdir, false, false, true, &mut chain)
            }
            Err(err) => {
                if ctx.ignore_all() {
                    return Err(OpStatus::Skip);
                }
                let error = OpError::new("Cannot move directory", s, err.to_string())
                    .with_second(&destdir);
                match ask(ctx, ui, &error, true) {
                    ErrorChoice::Retry => return move_dir_dir(ctx, ui, fs, s, d),
                    ErrorChoice::Abort => return Err(OpStatus::Abort),
                    _ => return Err(OpStatus::Skip),
                }
            }
        }
    };

    match result {
        Ok(()) => {
            ui.show_source(None);

            if ctx.opts.erase_at_end {
                flush_erase_queue(ctx, ui, fs)?;
            }
            // Subdirectories were erased (or queued) as their contents
            // completed; only the now-empty top directory remains.
            erase_dir_if_empty(ctx, ui, fs, s)?;
            Ok(())
        }
        Err(status) => {
            // Leave the source untouched when the copy was incomplete.
            ctx.erase_queue.clear();
            Err(status)
        }
    }
}

fn finish_move(ctx: &mut OperationContext, ui: &mut dyn OperationUi, bytes: u64) -> OpResult<()> {
    ctx.progress.complete_item(bytes, true);
    ctx.progress.refresh();
    ui.show_total_progress(&ctx.progress.snapshot());
    poll_ui(ctx, ui)
}
