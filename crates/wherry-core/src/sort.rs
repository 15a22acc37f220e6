//! Pluggable comparators for directory listings.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::entry::DirEntry;

/// The sort key of a listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum SortField {
    /// Keep backend order.
    Unsorted,
    /// Locale-folded name.
    #[default]
    Name,
    /// Extension, ties broken by name.
    Extension,
    /// Size, largest first.
    Size,
    /// Modification time, oldest first.
    ModifyTime,
    /// Access time, oldest first.
    AccessTime,
    /// Status-change time, oldest first.
    ChangeTime,
    /// Inode number.
    Inode,
    /// Numeric-aware name comparison ("v2" before "v10").
    Version,
}

/// Options applied on top of the sort field.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SortOptions {
    /// Negate the final ordering (the directory/file partition is exempt).
    pub reverse: bool,
    /// Compare raw-case keys instead of folded ones.
    pub case_sensitive: bool,
    /// Do not partition directories before files.
    pub mix_all_files: bool,
}

impl SortField {
    /// Whether this field compares the cached string keys.
    pub(crate) fn needs_keys(self) -> bool {
        matches!(self, Self::Name | Self::Extension | Self::Version)
    }
}

/// Compare two entries under a field and options. The directory-first
/// partition applies before the field and is never reversed.
pub(crate) fn compare(field: SortField, opts: &SortOptions, a: &DirEntry, b: &DirEntry) -> Ordering {
    if !opts.mix_all_files {
        let ad = a.is_dir_like();
        let bd = b.is_dir_like();
        if ad != bd {
            // Directories first, regardless of the reverse flag.
            return if ad { Ordering::Less } else { Ordering::Greater };
        }
    }

    let ord = match field {
        SortField::Unsorted => Ordering::Equal,
        SortField::Name => a.name_key().cmp(b.name_key()),
        SortField::Extension => a
            .ext_key()
            .cmp(b.ext_key())
            .then_with(|| a.name_key().cmp(b.name_key())),
        SortField::Size => b.meta.size.cmp(&a.meta.size),
        SortField::ModifyTime => a.meta.mtime.cmp(&b.meta.mtime),
        SortField::AccessTime => a.meta.atime.cmp(&b.meta.atime),
        SortField::ChangeTime => a.meta.ctime.cmp(&b.meta.ctime),
        SortField::Inode => a.meta.ino.cmp(&b.meta.ino),
        SortField::Version => {
            natural_cmp(a.name_key(), b.name_key()).then_with(|| a.name_key().cmp(b.name_key()))
        }
    };

    if opts.reverse { ord.reverse() } else { ord }
}

/// Numeric-aware string comparison: digit runs compare as numbers, so
/// "file2" sorts before "file10".
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut ia = a.char_indices().peekable();
    let mut ib = b.char_indices().peekable();

    loop {
        match (ia.peek().copied(), ib.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some((pa, ca)), Some((pb, cb))) => {
                if ca.is_ascii_digit() && cb.is_ascii_digit() {
                    let run_a = digit_run(a, pa);
                    let run_b = digit_run(b, pb);
                    // Longer runs (after leading zeros) are larger numbers;
                    // equal-length runs compare lexically.
                    let trim_a = run_a.trim_start_matches('0');
                    let trim_b = run_b.trim_start_matches('0');
                    let ord = trim_a
                        .len()
                        .cmp(&trim_b.len())
                        .then_with(|| trim_a.cmp(trim_b))
                        .then_with(|| run_a.len().cmp(&run_b.len()));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                    for _ in 0..run_a.len() {
                        ia.next();
                    }
                    for _ in 0..run_b.len() {
                        ib.next();
                    }
                } else {
                    match ca.cmp(&cb) {
                        Ordering::Equal => {
                            ia.next();
                            ib.next();
                        }
                        ord => return ord,
                    }
                }
            }
        }
    }
}

fn digit_run(s: &str, start: usize) -> &str {
    let end = s[start..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(s.len(), |off| start + off);
    &s[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use wherry_vfs::{FileKind, Metadata};

    fn file(name: &str, size: u64) -> DirEntry {
        let mut meta = Metadata::unreadable();
        meta.kind = FileKind::Regular;
        meta.size = size;
        let mut e = DirEntry::new(name, meta, false, false);
        e.ensure_sort_keys(false);
        e
    }

    fn dir(name: &str) -> DirEntry {
        let mut e = DirEntry::new(name, Metadata::synthetic_dir(), false, false);
        e.ensure_sort_keys(false);
        e
    }

    #[test]
    fn directories_partition_before_files() {
        let d = dir("zzz");
        let f = file("aaa", 0);
        let opts = SortOptions::default();
        assert_eq!(compare(SortField::Name, &opts, &d, &f), Ordering::Less);

        // Reverse does not flip the partition.
        let rev = SortOptions {
            reverse: true,
            ..SortOptions::default()
        };
        assert_eq!(compare(SortField::Name, &rev, &d, &f), Ordering::Less);
    }

    #[test]
    fn mix_all_files_ignores_partition() {
        let d = dir("zzz");
        let f = file("aaa", 0);
        let opts = SortOptions {
            mix_all_files: true,
            ..SortOptions::default()
        };
        assert_eq!(compare(SortField::Name, &opts, &d, &f), Ordering::Greater);
    }

    #[test]
    fn size_sorts_largest_first() {
        let small = file("a", 10);
        let big = file("b", 100);
        let opts = SortOptions::default();
        assert_eq!(compare(SortField::Size, &opts, &big, &small), Ordering::Less);
    }

    #[test]
    fn extension_ties_break_by_name() {
        let a = file("b.txt", 0);
        let b = file("a.txt", 0);
        let opts = SortOptions::default();
        assert_eq!(
            compare(SortField::Extension, &opts, &a, &b),
            Ordering::Greater
        );
    }

    #[test]
    fn natural_compare_orders_numbers() {
        assert_eq!(natural_cmp("file2", "file10"), Ordering::Less);
        assert_eq!(natural_cmp("file10", "file10"), Ordering::Equal);
        assert_eq!(natural_cmp("v1.9", "v1.10"), Ordering::Less);
        assert_eq!(natural_cmp("a02", "a2"), Ordering::Greater);
        assert_eq!(natural_cmp("abc", "abd"), Ordering::Less);
    }
}
