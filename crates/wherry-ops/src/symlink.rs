//! Symlink materialization.

use std::path::{Component, Path, PathBuf};

use wherry_core::{OpResult, OperationUi};
use wherry_vfs::Vfs;

use crate::context::OperationContext;
use crate::recover::{ask, retry_required};
use wherry_core::{ErrorChoice, OpError, OpStatus};

/// Recreate the symlink at `src_path` as `dst_path`.
///
/// With stable symlinks enabled, a relative target is rewritten so that,
/// resolved from the destination's directory, it still reaches the same
/// logical target it reached from the source's directory. An existing
/// symlink at the destination is removed and recreated rather than
/// failing.
pub(crate) fn make_symlink(
    ctx: &mut OperationContext,
    ui: &mut dyn OperationUi,
    fs: &dyn Vfs,
    src_path: &Path,
    dst_path: &Path,
) -> OpResult<()> {
    let dst_is_symlink = fs.lstat(dst_path).is_ok_and(|m| m.is_symlink());

    let mut target = retry_required(ctx, ui, "Cannot read source link", src_path, || {
        fs.readlink(src_path)
    })?;

    if ctx.stable_symlinks && !(fs.is_local(src_path) && fs.is_local(dst_path)) {
        ui.note(
            "Cannot make stable symlinks across non-local filesystems; \
             stable symlinks disabled for this operation",
        );
        ctx.stable_symlinks = false;
    }

    if ctx.stable_symlinks && target.is_relative() {
        target = rewrite_relative_target(src_path, dst_path, &target);
    }

    loop {
        match fs.symlink(&target, dst_path) {
            Ok(()) => break,
            Err(err) => {
                // A leftover symlink at the destination is replaced, not
                // reported.
                if dst_is_symlink
                    && fs.unlink(dst_path).is_ok()
                    && fs.symlink(&target, dst_path).is_ok()
                {
                    break;
                }
                if ctx.ignore_all() {
                    return Err(OpStatus::Skip);
                }
                let report = OpError::new("Cannot create target symlink", dst_path, err.to_string());
                match ask(ctx, ui, &report, true) {
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

    // Timestamp preservation on the link itself is best-effort and never
    // fatal.
    if ctx.opts.preserve
        && let Ok(meta) = fs.lstat(src_path)
        && let Err(err) = fs.set_symlink_times(dst_path, meta.atime, meta.mtime)
        && !err.is_unsupported()
    {
        tracing::debug!(path = %dst_path.display(), error = %err, "cannot set link times");
    }

    Ok(())
}

/// Rewrite a relative symlink target for its new home.
///
/// The target is resolved against the source's directory, then re-expressed
/// relative to the destination's directory by common-prefix diffing.
fn rewrite_relative_target(src_path: &Path, dst_path: &Path, target: &Path) -> PathBuf {
    let src_dir = src_path.parent().unwrap_or_else(|| Path::new(""));
    let dst_dir = dst_path.parent().unwrap_or_else(|| Path::new(""));

    let absolute = normalize(&src_dir.join(target));
    let base = normalize(dst_dir);
    diff_paths(&absolute, &base).unwrap_or_else(|| target.to_path_buf())
}

/// Lexically fold "." and ".." components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            // ".." cancels a normal component, is dropped at the root, and
            // accumulates otherwise.
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) => {}
                _ => out.push(".."),
            },
            other => out.push(other),
        }
    }
    out
}

/// Express `target` relative to `base` by stripping the common prefix and
/// climbing out of what remains of `base`.
fn diff_paths(target: &Path, base: &Path) -> Option<PathBuf> {
    if target.is_absolute() != base.is_absolute() {
        return None;
    }
    let mut t = target.components().peekable();
    let mut b = base.components().peekable();
    while let (Some(tc), Some(bc)) = (t.peek(), b.peek()) {
        if tc != bc {
            break;
        }
        t.next();
        b.next();
    }
    let mut out = PathBuf::new();
    for _ in b {
        out.push("..");
    }
    for comp in t {
        out.push(comp.as_os_str());
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_dots() {
        assert_eq!(normalize(Path::new("/a/b/../c/./d")), Path::new("/a/c/d"));
        assert_eq!(normalize(Path::new("a/../../b")), Path::new("../b"));
    }

    #[test]
    fn rewrite_keeps_logical_target() {
        // /src/dir/link -> "data/file"; copied to /dst/link the target must
        // climb out of /dst and back into /src/dir.
        let rewritten = rewrite_relative_target(
            Path::new("/src/dir/link"),
            Path::new("/dst/link"),
            Path::new("data/file"),
        );
        assert_eq!(rewritten, Path::new("../src/dir/data/file"));
    }

    #[test]
    fn rewrite_within_same_directory_is_unchanged() {
        let rewritten = rewrite_relative_target(
            Path::new("/a/link"),
            Path::new("/a/copy-of-link"),
            Path::new("file"),
        );
        assert_eq!(rewritten, Path::new("file"));
    }

    #[test]
    fn diff_climbs_out_of_base() {
        assert_eq!(
            diff_paths(Path::new("/a/b/c"), Path::new("/a/x")).unwrap(),
            Path::new("../b/c")
        );
        assert_eq!(
            diff_paths(Path::new("/a"), Path::new("/a")).unwrap(),
            Path::new(".")
        );
    }
}
