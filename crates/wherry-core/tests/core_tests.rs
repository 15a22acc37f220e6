//! Integration tests for directory listings over the local backend.

use std::fs;

use globset::{Glob, GlobSetBuilder};
use tempfile::TempDir;
use wherry_core::{DirListing, ListingFilter, SortField, SortOptions};
use wherry_vfs::LocalFs;

fn sample_tree() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();

    fs::create_dir(root.join("music")).unwrap();
    fs::create_dir(root.join("art")).unwrap();
    fs::write(root.join("notes.txt"), "hello").unwrap();
    fs::write(root.join("Makefile"), "all:").unwrap();
    fs::write(root.join("zebra.txt"), "zzz").unwrap();

    temp
}

#[test]
fn load_partitions_directories_first() {
    let temp = sample_tree();
    let fs_ = LocalFs::new();
    let mut listing = DirListing::new();

    let count = listing
        .load(
            &fs_,
            temp.path(),
            &ListingFilter::accept_all(),
            SortField::Name,
            &SortOptions::default(),
        )
        .unwrap();
    assert_eq!(count, 6);

    // ".." leads, then directories, then files by folded name.
    let names: Vec<_> = listing.iter().map(|e| e.name.as_str().to_owned()).collect();
    assert_eq!(names, ["..", "art", "music", "Makefile", "notes.txt", "zebra.txt"]);
}

#[test]
fn reverse_keeps_dot_dot_and_partition() {
    let temp = sample_tree();
    let fs_ = LocalFs::new();
    let mut listing = DirListing::new();

    listing
        .load(
            &fs_,
            temp.path(),
            &ListingFilter::accept_all(),
            SortField::Name,
            &SortOptions {
                reverse: true,
                ..SortOptions::default()
            },
        )
        .unwrap();

    let names: Vec<_> = listing.iter().map(|e| e.name.as_str().to_owned()).collect();
    assert_eq!(names, ["..", "music", "art", "zebra.txt", "notes.txt", "Makefile"]);
}

#[test]
fn sorting_twice_is_idempotent_for_all_fields() {
    let temp = sample_tree();
    let fs_ = LocalFs::new();

    for field in [
        SortField::Unsorted,
        SortField::Name,
        SortField::Extension,
        SortField::Size,
        SortField::ModifyTime,
        SortField::Inode,
        SortField::Version,
    ] {
        for reverse in [false, true] {
            for case_sensitive in [false, true] {
                let opts = SortOptions {
                    reverse,
                    case_sensitive,
                    mix_all_files: false,
                };
                let mut listing = DirListing::new();
                listing
                    .load(&fs_, temp.path(), &ListingFilter::accept_all(), field, &opts)
                    .unwrap();
                let first: Vec<_> = listing.iter().map(|e| e.name.clone()).collect();
                listing.sort(field, &opts);
                let second: Vec<_> = listing.iter().map(|e| e.name.clone()).collect();
                assert_eq!(first, second, "field {field} reverse {reverse}");
                assert!(listing.get(0).unwrap().is_dot_dot());
            }
        }
    }
}

#[test]
fn filter_applies_to_files_only() {
    let temp = sample_tree();
    let fs_ = LocalFs::new();

    let globs = GlobSetBuilder::new()
        .add(Glob::new("*.txt").unwrap())
        .build()
        .unwrap();
    let mut listing = DirListing::new();
    listing
        .load(
            &fs_,
            temp.path(),
            &ListingFilter::from_globs(globs),
            SortField::Name,
            &SortOptions::default(),
        )
        .unwrap();

    let names: Vec<_> = listing.iter().map(|e| e.name.as_str().to_owned()).collect();
    // Directories are exempt from the filter; "Makefile" is not.
    assert_eq!(names, ["..", "art", "music", "notes.txt", "zebra.txt"]);
}

#[test]
fn reload_preserves_marks_by_name() {
    let temp = sample_tree();
    let fs_ = LocalFs::new();
    let mut listing = DirListing::new();
    let field = SortField::Name;
    let opts = SortOptions::default();

    listing
        .load(&fs_, temp.path(), &ListingFilter::accept_all(), field, &opts)
        .unwrap();

    for entry in ["notes.txt", "music"] {
        let idx = listing
            .iter()
            .position(|e| e.name.as_str() == entry)
            .unwrap();
        listing.get_mut(idx).unwrap().flags.marked = true;
    }

    // The tree changes underneath: one marked entry disappears, a new one
    // shows up.
    fs::remove_file(temp.path().join("notes.txt")).unwrap();
    fs::write(temp.path().join("fresh.txt"), "new").unwrap();

    listing
        .reload(&fs_, temp.path(), &ListingFilter::accept_all(), field, &opts)
        .unwrap();

    let marked: Vec<_> = listing
        .iter()
        .filter(|e| e.flags.marked)
        .map(|e| e.name.as_str().to_owned())
        .collect();
    assert_eq!(marked, ["music"]);
    assert!(listing.iter().any(|e| e.name.as_str() == "fresh.txt"));
}

#[cfg(unix)]
#[test]
fn symlinks_are_classified() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::create_dir(root.join("real_dir")).unwrap();
    fs::write(root.join("real_file"), "x").unwrap();
    std::os::unix::fs::symlink(root.join("real_dir"), root.join("to_dir")).unwrap();
    std::os::unix::fs::symlink(root.join("gone"), root.join("dangling")).unwrap();

    let fs_ = LocalFs::new();
    let mut listing = DirListing::new();
    listing
        .load(
            &fs_,
            root,
            &ListingFilter::accept_all(),
            SortField::Name,
            &SortOptions::default(),
        )
        .unwrap();

    let find = |name: &str| listing.iter().find(|e| e.name.as_str() == name).unwrap();
    assert!(find("to_dir").flags.link_to_dir);
    assert!(find("dangling").flags.stale_link);
    assert!(!find("real_file").flags.link_to_dir);

    // A symlink to a directory sorts with the directories.
    let names: Vec<_> = listing.iter().map(|e| e.name.as_str().to_owned()).collect();
    assert_eq!(names, ["..", "real_dir", "to_dir", "dangling", "real_file"]);
}
