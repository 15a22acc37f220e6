//! The directory-listing model.

use std::collections::HashSet;
use std::path::Path;

use compact_str::CompactString;
use globset::GlobSet;
use wherry_vfs::{Vfs, VfsResult};

use crate::entry::DirEntry;
use crate::sort::{SortField, SortOptions, compare};

/// Capacity is grown in steps of this many entries rather than per entry.
pub const RESIZE_STEP: usize = 128;

/// Side-effect events fired while a listing is being read, for callers that
/// cross-reference a companion index.
#[derive(Debug)]
pub enum ListEvent<'a> {
    /// The directory was opened for reading.
    DirOpened(&'a Path),
    /// One entry was read and accepted.
    EntryRead(&'a str),
    /// The directory handle was closed.
    DirClosed,
}

/// Name filter applied to non-directory entries while loading.
#[derive(Debug, Clone, Default)]
pub struct ListingFilter {
    globs: Option<GlobSet>,
}

impl ListingFilter {
    /// A filter that accepts everything.
    pub fn accept_all() -> Self {
        Self::default()
    }

    /// A filter from a compiled glob set.
    pub fn from_globs(globs: GlobSet) -> Self {
        Self { globs: Some(globs) }
    }

    fn matches(&self, name: &str) -> bool {
        match &self.globs {
            Some(set) => set.is_match(name),
            None => true,
        }
    }
}

/// An ordered, resizable collection of entries for one directory.
///
/// Invariant: if a ".." entry is present it sits at index 0 and is exempt
/// from sorting.
#[derive(Default)]
pub struct DirListing {
    entries: Vec<DirEntry>,
    callback: Option<Box<dyn FnMut(ListEvent<'_>) + Send>>,
}

impl std::fmt::Debug for DirListing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirListing")
            .field("entries", &self.entries.len())
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

impl DirListing {
    /// Create an empty listing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a per-event callback fired during load and reload.
    pub fn set_callback(&mut self, callback: Box<dyn FnMut(ListEvent<'_>) + Send>) {
        self.callback = Some(callback);
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the listing is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at `index`.
    pub fn get(&self, index: usize) -> Option<&DirEntry> {
        self.entries.get(index)
    }

    /// Mutable entry at `index`.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut DirEntry> {
        self.entries.get_mut(index)
    }

    /// Iterate over entries in listing order.
    pub fn iter(&self) -> impl Iterator<Item = &DirEntry> {
        self.entries.iter()
    }

    /// Indexes of marked entries, in listing order.
    pub fn marked_indexes(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.flags.marked)
            .map(|(i, _)| i)
            .collect()
    }

    /// Number of marked entries.
    pub fn marked_count(&self) -> usize {
        self.entries.iter().filter(|e| e.flags.marked).count()
    }

    /// Append an entry, growing capacity in [`RESIZE_STEP`] chunks. Never
    /// reorders existing entries.
    pub fn append(&mut self, entry: DirEntry) {
        if self.entries.len() == self.entries.capacity() {
            self.entries.reserve_exact(RESIZE_STEP);
        }
        self.entries.push(entry);
    }

    /// Release entry storage and shrink capacity back to the minimum.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.entries.shrink_to(RESIZE_STEP);
    }

    /// Sort all entries except a leading "..".
    ///
    /// Sort keys are computed before and released immediately after the
    /// sort, so the listing carries no key storage between calls.
    pub fn sort(&mut self, field: SortField, opts: &SortOptions) {
        // Pin ".." at index 0 wherever it currently sits.
        if let Some(pos) = self.entries.iter().position(DirEntry::is_dot_dot)
            && pos > 0
        {
            self.entries.swap(0, pos);
        }
        let start = usize::from(self.entries.first().is_some_and(DirEntry::is_dot_dot));

        let tail = &mut self.entries[start..];
        if field.needs_keys() {
            for entry in tail.iter_mut() {
                entry.ensure_sort_keys(opts.case_sensitive);
            }
        }
        tail.sort_by(|a, b| compare(field, opts, a, b));
        for entry in tail.iter_mut() {
            entry.release_sort_keys();
        }
    }

    /// Scan `path` into this listing, replacing previous contents.
    ///
    /// Entries whose lstat fails are kept with zeroed metadata; the filter
    /// applies to non-directory entries only; a ".." entry is synthesized
    /// unless `path` is the filesystem root. An unreadable directory
    /// degrades to a listing holding just "..".
    pub fn load(
        &mut self,
        fs: &dyn Vfs,
        path: &Path,
        filter: &ListingFilter,
        field: SortField,
        opts: &SortOptions,
    ) -> VfsResult<usize> {
        self.clear();
        self.scan(fs, path, filter)?;
        self.sort(field, opts);
        Ok(self.len())
    }

    /// Re-scan `path`, preserving each previously-marked entry's flag by
    /// name, then re-sort.
    pub fn reload(
        &mut self,
        fs: &dyn Vfs,
        path: &Path,
        filter: &ListingFilter,
        field: SortField,
        opts: &SortOptions,
    ) -> VfsResult<usize> {
        let mut marked: HashSet<CompactString> = HashSet::new();
        for entry in &self.entries {
            if entry.flags.marked {
                marked.insert(entry.name.clone());
            }
        }

        self.clear();
        self.scan(fs, path, filter)?;

        if !marked.is_empty() {
            for entry in &mut self.entries {
                if marked.remove(entry.name.as_str()) {
                    entry.flags.marked = true;
                    if marked.is_empty() {
                        break;
                    }
                }
            }
        }

        self.sort(field, opts);
        Ok(self.len())
    }

    fn scan(&mut self, fs: &dyn Vfs, path: &Path, filter: &ListingFilter) -> VfsResult<usize> {
        let mut reading = match fs.open_dir(path) {
            Ok(dir) => dir,
            Err(err) => {
                // No access: degrade to a ".."-only listing so navigation
                // out is still possible.
                tracing::warn!(path = %path.display(), error = %err, "cannot read directory");
                if path.parent().is_some() {
                    self.append(DirEntry::dot_dot());
                }
                return Ok(self.len());
            }
        };
        self.emit(ListEvent::DirOpened(path));

        while let Some(name) = reading.next_entry()? {
            if name == "." || name == ".." {
                continue;
            }
            let full = path.join(&name);
            let meta = fs.lstat(&full).unwrap_or_else(|_| {
                // Entries the backend cannot stat are listed anyway,
                // identified by mode 0.
                wherry_vfs::Metadata::unreadable()
            });

            let mut link_to_dir = false;
            let mut stale_link = false;
            if meta.is_symlink() {
                match fs.stat(&full) {
                    Ok(target) => link_to_dir = target.is_dir(),
                    Err(_) => stale_link = true,
                }
            }

            if !(meta.is_dir() || link_to_dir) && !filter.matches(&name) {
                continue;
            }

            self.emit(ListEvent::EntryRead(&name));
            self.append(DirEntry::new(name, meta, link_to_dir, stale_link));
        }
        drop(reading);
        self.emit(ListEvent::DirClosed);

        if path.parent().is_some() {
            self.append(DirEntry::dot_dot());
        }
        Ok(self.len())
    }

    fn emit(&mut self, event: ListEvent<'_>) {
        if let Some(cb) = self.callback.as_mut() {
            cb(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wherry_vfs::Metadata;

    fn named(name: &str) -> DirEntry {
        DirEntry::new(name, Metadata::unreadable(), false, false)
    }

    #[test]
    fn append_grows_in_chunks() {
        let mut listing = DirListing::new();
        listing.append(named("a"));
        assert!(listing.entries.capacity() >= RESIZE_STEP);
        for i in 0..RESIZE_STEP {
            listing.append(named(&format!("f{i}")));
        }
        assert!(listing.entries.capacity() >= 2 * RESIZE_STEP);
    }

    #[test]
    fn clear_shrinks_capacity() {
        let mut listing = DirListing::new();
        for i in 0..1000 {
            listing.append(named(&format!("f{i}")));
        }
        listing.clear();
        assert_eq!(listing.len(), 0);
        assert!(listing.entries.capacity() <= 2 * RESIZE_STEP);
    }

    #[test]
    fn sort_pins_dot_dot_first() {
        let mut listing = DirListing::new();
        listing.append(named("zeta"));
        listing.append(named("alpha"));
        listing.append(DirEntry::dot_dot());

        listing.sort(SortField::Name, &SortOptions::default());
        assert!(listing.get(0).unwrap().is_dot_dot());

        // ".." is dir-like, but stays pinned even under reverse.
        listing.sort(
            SortField::Name,
            &SortOptions {
                reverse: true,
                ..SortOptions::default()
            },
        );
        assert!(listing.get(0).unwrap().is_dot_dot());
    }

    #[test]
    fn sort_is_idempotent() {
        let mut listing = DirListing::new();
        for name in ["b", "c", "a", "d"] {
            listing.append(named(name));
        }
        listing.append(DirEntry::dot_dot());
        let opts = SortOptions::default();
        listing.sort(SortField::Name, &opts);
        let first: Vec<_> = listing.iter().map(|e| e.name.clone()).collect();
        listing.sort(SortField::Name, &opts);
        let second: Vec<_> = listing.iter().map(|e| e.name.clone()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn unsorted_then_name_matches_single_name_sort() {
        let names: Vec<String> = (0..100).map(|i| format!("entry{:03}", 997 - i * 7)).collect();

        let mut once = DirListing::new();
        let mut twice = DirListing::new();
        for name in &names {
            once.append(named(name));
            twice.append(named(name));
        }

        let opts = SortOptions::default();
        once.sort(SortField::Name, &opts);
        twice.sort(SortField::Unsorted, &opts);
        twice.sort(SortField::Name, &opts);

        let a: Vec<_> = once.iter().map(|e| e.name.clone()).collect();
        let b: Vec<_> = twice.iter().map(|e| e.name.clone()).collect();
        assert_eq!(a, b);
    }
}
