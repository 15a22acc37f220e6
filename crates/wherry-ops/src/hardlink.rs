//! The hardlink cache: copy an inode once, link every later name.

use std::path::{Path, PathBuf};

use dashmap::DashMap;
use wherry_core::{OpStatus, OperationUi};
use wherry_vfs::{FileId, Metadata, Vfs, file_id};

use crate::context::OperationContext;
use crate::recover::retry_required;

/// Result of consulting the cache for one source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardlinkOutcome {
    /// The destination was created as a hard link to an earlier copy; no
    /// data transfer is needed.
    Linked,
    /// First sighting of this inode; it was registered and the caller
    /// copies normally.
    Cached,
    /// The source has no other names; nothing to deduplicate.
    NotALink,
    /// The backend cannot create hard links.
    Unsupported,
    /// The inode was seen before but linking failed or the cached entry no
    /// longer matches; the caller falls back to a plain copy.
    Failed,
    /// The user aborted from the link-failure prompt.
    Abort,
}

/// First-seen (source, destination) pair of one inode.
#[derive(Debug, Clone)]
struct LinkPair {
    source: PathBuf,
    dest: PathBuf,
}

/// Maps (backend, device, inode) to the first place that inode was copied
/// to. Scoped to one operation; cleared when the context is created and
/// dropped with it.
#[derive(Debug, Default)]
pub(crate) struct HardlinkCache {
    map: DashMap<FileId, LinkPair>,
}

impl HardlinkCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(&self, key: &FileId) -> Option<(PathBuf, PathBuf)> {
        self.map
            .get(key)
            .map(|pair| (pair.source.clone(), pair.dest.clone()))
    }

    fn register(&self, key: FileId, source: &Path, dest: &Path) {
        self.map.insert(
            key,
            LinkPair {
                source: source.to_path_buf(),
                dest: dest.to_path_buf(),
            },
        );
    }
}

/// Consult the cache for `src` (already stat'ed as `meta`) about to be
/// copied to `dst`.
///
/// On a second sighting the cached source is re-validated by a fresh stat
/// and backend comparison before linking; a link failure is surfaced once
/// through the error-report collaborator and then degrades to a plain copy
/// of this file.
pub(crate) fn check_hardlinks(
    ctx: &mut OperationContext,
    ui: &mut dyn OperationUi,
    fs: &dyn Vfs,
    src: &Path,
    dst: &Path,
    meta: &Metadata,
) -> HardlinkOutcome {
    if meta.nlink < 2 {
        return HardlinkOutcome::NotALink;
    }
    if !fs.supports_hardlinks(src) {
        return HardlinkOutcome::Unsupported;
    }

    let key = file_id(fs, src, meta);
    let Some((cached_src, cached_dst)) = ctx.hardlinks.lookup(&key) else {
        ctx.hardlinks.register(key, src, dst);
        return HardlinkOutcome::Cached;
    };

    // Both ends must still resolve under the same backends as when the
    // inode was first seen, and the cached source must still be the same
    // inode.
    let still_valid = fs
        .stat(&cached_src)
        .is_ok_and(|m| m.dev == key.dev && m.ino == key.ino)
        && fs.backend_id(&cached_src) == key.backend
        && fs.backend_id(&cached_dst) == fs.backend_id(dst)
        && fs.stat(&cached_dst).is_ok();

    if !still_valid {
        tracing::debug!(src = %src.display(), "cached hardlink entry no longer valid");
        ui.note("Cannot make the hardlink");
        return HardlinkOutcome::Failed;
    }

    match retry_required(ctx, ui, "Cannot make the hardlink", dst, || {
        fs.link(&cached_dst, dst)
    }) {
        Ok(()) => {
            tracing::debug!(src = %src.display(), dst = %dst.display(), "hardlink created");
            HardlinkOutcome::Linked
        }
        Err(OpStatus::Abort) => HardlinkOutcome::Abort,
        Err(_) => HardlinkOutcome::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_registers_once_per_key() {
        let cache = HardlinkCache::new();
        let key = FileId::new(0, 1, 99);
        assert!(cache.lookup(&key).is_none());
        cache.register(key, Path::new("/a"), Path::new("/b"));
        let (src, dst) = cache.lookup(&key).unwrap();
        assert_eq!(src, Path::new("/a"));
        assert_eq!(dst, Path::new("/b"));

        // Re-registering replaces; there is at most one entry per key.
        cache.register(key, Path::new("/c"), Path::new("/d"));
        assert_eq!(cache.map.len(), 1);
    }
}
