//! The deletion engine.

use std::path::Path;

use wherry_core::{OpResult, OpStatus, OperationUi, RecursiveChoice};
use wherry_vfs::{Vfs, VfsResult};

use crate::context::{EraseItem, OperationContext};
use crate::recover::{poll_ui, retry_required};

/// Delete one non-directory entry.
///
/// With `counted` set the deletion advances the operation counters; nested
/// deletions during a tree move pass false so totals stay consistent.
pub fn erase_file(
    ctx: &mut OperationContext,
    ui: &mut dyn OperationUi,
    fs: &dyn Vfs,
    path: &Path,
    counted: bool,
) -> OpResult<()> {
    ui.show_deleting(path);
    poll_ui(ctx, ui)?;

    let size = if counted {
        fs.lstat(path).map(|m| m.size).unwrap_or(0)
    } else {
        0
    };

    retry_required(ctx, ui, "Cannot delete file", path, || fs.unlink(path))?;

    if counted {
        ctx.progress.complete_item(size, true);
        ctx.progress.refresh();
        ui.show_total_progress(&ctx.progress.snapshot());
    }
    Ok(())
}

/// Delete a directory entry selected by the user.
///
/// An empty directory is removed outright. A non-empty one goes through the
/// recursive-delete confirmation, whose All/None answers latch for the rest
/// of the operation.
pub fn erase_dir(
    ctx: &mut OperationContext,
    ui: &mut dyn OperationUi,
    fs: &dyn Vfs,
    path: &Path,
    counted: bool,
) -> OpResult<()> {
    if is_dot_entry(path) {
        return Err(OpStatus::Skip);
    }

    ui.show_deleting(path);
    poll_ui(ctx, ui)?;

    // rmdir's errno for a non-empty directory is unreliable across
    // backends; scanning the directory is.
    if matches!(check_dir_is_empty(fs, path), Ok(false)) {
        query_recursive(ctx, ui, path)?;
        return recursive_erase(ctx, ui, fs, path, counted);
    }

    retry_required(ctx, ui, "Cannot remove directory", path, || fs.rmdir(path))
}

/// Remove a directory only when it is truly empty; a populated directory
/// is left alone without an error.
pub(crate) fn erase_dir_if_empty(
    ctx: &mut OperationContext,
    ui: &mut dyn OperationUi,
    fs: &dyn Vfs,
    path: &Path,
) -> OpResult<()> {
    if is_dot_entry(path) {
        return Err(OpStatus::Skip);
    }

    ui.show_deleting(path);
    poll_ui(ctx, ui)?;

    if !matches!(check_dir_is_empty(fs, path), Ok(true)) {
        return Ok(());
    }

    retry_required(ctx, ui, "Cannot remove directory", path, || fs.rmdir(path))
}

/// Depth-first removal of a tree: children first, directories after their
/// own contents. An Abort from any nested decision propagates immediately.
fn recursive_erase(
    ctx: &mut OperationContext,
    ui: &mut dyn OperationUi,
    fs: &dyn Vfs,
    path: &Path,
    counted: bool,
) -> OpResult<()> {
    let mut reading = retry_required(ctx, ui, "Cannot read directory", path, || fs.open_dir(path))?;

    let count_children = counted && ctx.totals_computed;
    loop {
        let name = match reading.next_entry() {
            Ok(Some(name)) => name,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "readdir failed");
                break;
            }
        };
        if name == "." || name == ".." {
            continue;
        }
        let child = path.join(&name);
        let meta = retry_required(ctx, ui, "Cannot stat file", &child, || fs.lstat(&child))?;
        if meta.is_dir() {
            recursive_erase(ctx, ui, fs, &child, counted)?;
        } else {
            erase_file(ctx, ui, fs, &child, count_children)?;
        }
    }
    drop(reading);

    ui.show_deleting(path);
    poll_ui(ctx, ui)?;

    retry_required(ctx, ui, "Cannot remove directory", path, || fs.rmdir(path))
}

/// Drain the deferred-erase queue after a tree copy that requested
/// erase-at-end: nothing is removed until everything is confirmed copied.
pub(crate) fn flush_erase_queue(
    ctx: &mut OperationContext,
    ui: &mut dyn OperationUi,
    fs: &dyn Vfs,
) -> OpResult<()> {
    while let Some(EraseItem { path, is_dir }) = ctx.erase_queue.pop_front() {
        let result = if is_dir {
            erase_dir_if_empty(ctx, ui, fs, &path)
        } else {
            erase_file(ctx, ui, fs, &path, false)
        };
        match result {
            Ok(()) | Err(OpStatus::Skip) => {}
            Err(status) => {
                ctx.erase_queue.clear();
                return Err(status);
            }
        }
    }
    Ok(())
}

/// Ask, once per operation, whether non-empty directories may be deleted
/// recursively. All and None latch; Abort latches too so nested frames see
/// the same answer.
fn query_recursive(
    ctx: &mut OperationContext,
    ui: &mut dyn OperationUi,
    path: &Path,
) -> OpResult<()> {
    let choice = match ctx.recursive_latch {
        Some(latched) => latched,
        None => {
            ctx.progress.pause_begin();
            let choice = ui.confirm_recursive_delete(path);
            ctx.progress.pause_end();
            if matches!(
                choice,
                RecursiveChoice::All | RecursiveChoice::None | RecursiveChoice::Abort
            ) {
                ctx.recursive_latch = Some(choice);
            }
            choice
        }
    };

    match choice {
        RecursiveChoice::Yes | RecursiveChoice::All => Ok(()),
        RecursiveChoice::No | RecursiveChoice::None => Err(OpStatus::Skip),
        RecursiveChoice::Abort => Err(OpStatus::Abort),
    }
}

/// Whether `path` has an entry besides "." and "..".
fn check_dir_is_empty(fs: &dyn Vfs, path: &Path) -> VfsResult<bool> {
    let mut reading = fs.open_dir(path)?;
    while let Some(name) = reading.next_entry()? {
        if name != "." && name != ".." {
            return Ok(false);
        }
    }
    Ok(true)
}

fn is_dot_entry(path: &Path) -> bool {
    use std::path::Component;
    matches!(
        path.components().next_back(),
        Some(Component::CurDir | Component::ParentDir)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn dot_entries_are_refused() {
        assert!(is_dot_entry(&PathBuf::from("..")));
        assert!(is_dot_entry(&PathBuf::from(".")));
        assert!(!is_dot_entry(&PathBuf::from("/a/b")));
        assert!(!is_dot_entry(&PathBuf::from("..a")));
    }
}
