//! The top-level entry point driving one operation over a selection.

use std::path::{Path, PathBuf};

use wherry_core::{
    DirListing, ErrorChoice, NameOutcome, NameTransform, OpError, OpResult, OpStatus,
    OperationOptions, OperationUi,
};
use wherry_vfs::Vfs;

use crate::context::{OperationContext, OperationKind};
use crate::erase::{erase_dir, erase_file};
use crate::guards::AncestorChain;
use crate::recover::{ask, poll_ui, retry_required};
use crate::transfer::{copy_file_file, source_stat};
use crate::tree::{copy_dir_dir, move_dir_dir, move_file_file};

/// What to operate on and where to put it.
#[derive(Debug, Clone)]
pub struct OperateSpec {
    /// The operation kind.
    pub kind: OperationKind,
    /// Directory the listing was read from; sources resolve against it.
    pub cwd: PathBuf,
    /// Destination directory for copy and move; ignored for delete.
    pub dest: Option<PathBuf>,
    /// Operate on `selected` even when entries are marked.
    pub force_single: bool,
    /// The cursor entry, used when nothing is marked or when forced.
    pub selected: usize,
}

/// Files and bytes under `path`, recursing as required. Unreadable entries
/// are skipped; this is a pre-pass for progress totals, not an audit.
pub fn compute_dir_size(fs: &dyn Vfs, path: &Path) -> (u64, u64) {
    let mut files = 0;
    let mut bytes = 0;
    let Ok(mut reading) = fs.open_dir(path) else {
        return (0, 0);
    };
    while let Ok(Some(name)) = reading.next_entry() {
        if name == "." || name == ".." {
            continue;
        }
        let child = path.join(&name);
        let Ok(meta) = fs.lstat(&child) else {
            continue;
        };
        if meta.is_dir() {
            let (sub_files, sub_bytes) = compute_dir_size(fs, &child);
            files += sub_files;
            bytes += sub_bytes;
        } else {
            files += 1;
            bytes += meta.size;
        }
    }
    (files, bytes)
}

/// Files and bytes of the given listing entries, used to build the initial
/// confirmation prompt and the progress totals.
pub fn selection_totals(
    fs: &dyn Vfs,
    listing: &DirListing,
    cwd: &Path,
    items: &[usize],
) -> (u64, u64) {
    let mut files = 0;
    let mut bytes = 0;
    for &idx in items {
        let Some(entry) = listing.get(idx) else {
            continue;
        };
        if entry.meta.is_dir() {
            let (sub_files, sub_bytes) = compute_dir_size(fs, &cwd.join(entry.name.as_str()));
            files += sub_files;
            bytes += sub_bytes;
        } else {
            files += 1;
            bytes += entry.meta.size;
        }
    }
    (files, bytes)
}

/// The entries one call to [`operate`] will act on.
pub fn selection(listing: &DirListing, spec: &OperateSpec) -> Vec<usize> {
    if spec.force_single {
        return vec![spec.selected];
    }
    let marked = listing.marked_indexes();
    if marked.is_empty() {
        vec![spec.selected]
    } else {
        marked
    }
}

/// Perform one operation over the listing's selection.
///
/// Entries are processed in listing order; each successful entry is
/// unmarked so the panel reflects what remains. Returns whether the
/// directory structure changed, so the caller knows to reload.
pub fn operate(
    fs: &dyn Vfs,
    listing: &mut DirListing,
    spec: &OperateSpec,
    opts: OperationOptions,
    transform: &dyn NameTransform,
    ui: &mut dyn OperationUi,
) -> bool {
    let items = selection(listing, spec);
    if items.iter().any(|&i| listing.get(i).is_none()) {
        ui.note("Selection is out of date");
        return false;
    }
    if items
        .iter()
        .any(|&i| listing.get(i).is_some_and(|e| e.is_dot_dot()))
    {
        ui.note("Cannot operate on \"..\"!");
        return false;
    }

    let mut ctx = OperationContext::new(spec.kind, opts);

    // A multi-entry copy or move needs an existing directory to land in.
    if spec.kind != OperationKind::Delete {
        let Some(dest) = spec.dest.as_deref() else {
            ui.note("No destination given");
            return false;
        };
        if items.len() > 1 {
            loop {
                match fs.stat(dest) {
                    Ok(meta) if meta.is_dir() => break,
                    Ok(_) => {
                        let error = OpError::new(
                            "Destination must be a directory",
                            dest,
                            "not a directory",
                        );
                        match ask(&mut ctx, ui, &error, true) {
                            ErrorChoice::Retry => continue,
                            _ => return false,
                        }
                    }
                    Err(err) => {
                        let error =
                            OpError::new("Cannot stat destination", dest, err.to_string());
                        match ask(&mut ctx, ui, &error, true) {
                            ErrorChoice::Retry => continue,
                            _ => return false,
                        }
                    }
                }
            }
        }
    }

    // Exact totals make the progress bars honest but cost a tree walk; a
    // move mutates the tree it would walk, so it keeps estimates.
    if spec.kind != OperationKind::Move && ctx.opts.compute_totals {
        let (files, bytes) = selection_totals(fs, listing, &spec.cwd, &items);
        ctx.progress.set_totals(files, bytes);
        ctx.totals_computed = true;
    } else {
        let files = items.len() as u64;
        let bytes = items
            .iter()
            .filter_map(|&i| listing.get(i))
            .map(|e| e.meta.size)
            .sum();
        ctx.progress.set_totals(files, bytes);
    }

    let mut changed = false;
    let mut chain = AncestorChain::new();

    for idx in items {
        let Some(entry) = listing.get(idx) else {
            continue;
        };
        let name = entry.name.clone();
        let entry_meta = entry.meta;
        let source = spec.cwd.join(name.as_str());

        let status: OpResult<()> = match spec.kind {
            OperationKind::Delete => {
                if entry_meta.is_dir() {
                    erase_dir(&mut ctx, ui, fs, &source, true)
                } else {
                    erase_file(&mut ctx, ui, fs, &source, true)
                }
            }
            OperationKind::Copy | OperationKind::Move => {
                match transform.apply(name.as_str()) {
                    NameOutcome::Skip => Err(OpStatus::Skip),
                    NameOutcome::Abort => Err(OpStatus::Abort),
                    NameOutcome::Name(new_name) => {
                        let dest = spec
                            .dest
                            .as_ref()
                            .map(|d| d.join(&new_name))
                            .unwrap_or_else(|| PathBuf::from(&new_name));
                        dispatch(&mut ctx, ui, fs, spec.kind, &source, &dest, &mut chain)
                    }
                }
            }
        };

        match status {
            Ok(()) => {
                changed = true;
                if !spec.force_single
                    && let Some(entry) = listing.get_mut(idx)
                {
                    entry.flags.marked = false;
                }
            }
            Err(OpStatus::Abort) => break,
            Err(_) => {
                // Entry skipped; siblings still run.
            }
        }

        ctx.progress.refresh();
        ui.show_total_progress(&ctx.progress.snapshot());
        if poll_ui(&mut ctx, ui).is_err() {
            break;
        }
    }

    changed
}

fn dispatch(
    ctx: &mut OperationContext,
    ui: &mut dyn OperationUi,
    fs: &dyn Vfs,
    kind: OperationKind,
    source: &Path,
    dest: &Path,
    chain: &mut AncestorChain,
) -> OpResult<()> {
    match kind {
        OperationKind::Copy => {
            let follow = ctx.opts.follow_symlinks;
            let meta = retry_required(ctx, ui, "Cannot stat source file", source, || {
                source_stat(follow, fs, source)
            })?;
            let result = if meta.is_dir() {
                copy_dir_dir(ctx, ui, fs, source, dest, true, false, false, chain)
            } else {
                copy_file_file(ctx, ui, fs, source, dest, true, true)
            };
            // The self-copy registry only matters within one tree.
            ctx.dest_dirs.clear();
            result
        }
        OperationKind::Move => {
            let meta = retry_required(ctx, ui, "Cannot stat file", source, || fs.lstat(source))?;
            if meta.is_dir() {
                move_dir_dir(ctx, ui, fs, source, dest)
            } else {
                move_file_file(ctx, ui, fs, source, dest)
            }
        }
        OperationKind::Delete => unreachable!("delete is dispatched by the caller"),
    }
}
