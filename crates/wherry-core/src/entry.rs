//! Directory entry records.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use wherry_vfs::Metadata;

/// Per-entry state bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFlags {
    /// Selected for the next operation.
    pub marked: bool,
    /// Symlink that resolves to a directory.
    pub link_to_dir: bool,
    /// Symlink whose target does not resolve.
    pub stale_link: bool,
    /// Directory size has already been computed for the totals display.
    pub size_computed: bool,
}

/// One entry of a directory listing: a name, a metadata snapshot taken when
/// the directory was read, and two operation-scoped sort keys.
///
/// The sort keys are computed on demand before a sort and released right
/// after it; they never outlive one sort call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (no directory components).
    pub name: CompactString,
    /// Metadata snapshot from the backend.
    pub meta: Metadata,
    /// State bits.
    pub flags: EntryFlags,
    #[serde(skip)]
    name_key: Option<CompactString>,
    #[serde(skip)]
    ext_key: Option<CompactString>,
}

impl DirEntry {
    /// Create an entry from a backend read.
    pub fn new(
        name: impl Into<CompactString>,
        meta: Metadata,
        link_to_dir: bool,
        stale_link: bool,
    ) -> Self {
        Self {
            name: name.into(),
            meta,
            flags: EntryFlags {
                marked: false,
                link_to_dir,
                stale_link,
                size_computed: false,
            },
            name_key: None,
            ext_key: None,
        }
    }

    /// Synthesize the leading ".." entry.
    pub fn dot_dot() -> Self {
        Self::new("..", Metadata::synthetic_dir(), false, false)
    }

    /// Whether this entry is the synthesized ".." entry.
    pub fn is_dot_dot(&self) -> bool {
        self.name == ".."
    }

    /// Whether the entry sorts with directories: a real directory or a
    /// symlink resolving to one.
    pub fn is_dir_like(&self) -> bool {
        self.meta.is_dir() || self.flags.link_to_dir
    }

    /// The extension part of the name (after the last dot), or "".
    pub fn extension(&self) -> &str {
        match self.name.rfind('.') {
            Some(idx) if idx + 1 < self.name.len() => &self.name[idx + 1..],
            _ => "",
        }
    }

    /// Compute both sort keys if absent. Case sensitivity affects key
    /// generation, not the stored name.
    pub(crate) fn ensure_sort_keys(&mut self, case_sensitive: bool) {
        if self.name_key.is_none() {
            self.name_key = Some(fold_key(&self.name, case_sensitive));
        }
        if self.ext_key.is_none() {
            self.ext_key = Some(fold_key(self.extension(), case_sensitive));
        }
    }

    /// Release the keys once sorting is done.
    pub(crate) fn release_sort_keys(&mut self) {
        self.name_key = None;
        self.ext_key = None;
    }

    pub(crate) fn name_key(&self) -> &str {
        self.name_key.as_deref().unwrap_or(&self.name)
    }

    pub(crate) fn ext_key(&self) -> &str {
        self.ext_key.as_deref().unwrap_or("")
    }
}

fn fold_key(s: &str, case_sensitive: bool) -> CompactString {
    if case_sensitive {
        CompactString::new(s)
    } else {
        s.to_lowercase().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_after_last_dot() {
        let e = DirEntry::new("archive.tar.gz", Metadata::unreadable(), false, false);
        assert_eq!(e.extension(), "gz");
        let e = DirEntry::new("Makefile", Metadata::unreadable(), false, false);
        assert_eq!(e.extension(), "");
        let e = DirEntry::new("trailing.", Metadata::unreadable(), false, false);
        assert_eq!(e.extension(), "");
    }

    #[test]
    fn sort_keys_fold_case() {
        let mut e = DirEntry::new("README.TXT", Metadata::unreadable(), false, false);
        e.ensure_sort_keys(false);
        assert_eq!(e.name_key(), "readme.txt");
        assert_eq!(e.ext_key(), "txt");
        e.release_sort_keys();

        e.ensure_sort_keys(true);
        assert_eq!(e.name_key(), "README.TXT");
    }

    #[test]
    fn link_to_dir_is_dir_like() {
        let mut e = DirEntry::new("link", Metadata::unreadable(), true, false);
        assert!(e.is_dir_like());
        e.flags.link_to_dir = false;
        assert!(!e.is_dir_like());
    }
}
