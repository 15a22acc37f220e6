//! Durable choices of one operation.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// The option set fixed when an operation starts.
///
/// These are the durable choices of the copy/move dialog; transient
/// recovery state (ignore-all, sticky replace decisions) lives in the
/// operation context instead.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into))]
pub struct OperationOptions {
    /// Stat through symlinks instead of copying the links themselves.
    #[builder(default = "false")]
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Preserve permission bits, timestamps, and extended attributes.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub preserve: bool,

    /// Preserve owner and group (usually needs privileges).
    #[builder(default = "false")]
    #[serde(default)]
    pub preserve_owner: bool,

    /// Rewrite relative symlink targets so they still resolve from the
    /// destination.
    #[builder(default = "false")]
    #[serde(default)]
    pub stable_symlinks: bool,

    /// Ask before overwriting an existing destination.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub confirm_overwrite: bool,

    /// When copying a tree onto an existing top-level directory, nest under
    /// the source's base name instead of merging.
    #[builder(default = "false")]
    #[serde(default)]
    pub dive_into_subdirs: bool,

    /// For moves that fall back to copy: defer source deletions until the
    /// whole destination tree is built.
    #[builder(default = "false")]
    #[serde(default)]
    pub erase_at_end: bool,

    /// Walk the selection up front to compute exact totals for progress.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub compute_totals: bool,

    /// Umask applied to created modes; `None` reads the process umask.
    #[builder(default)]
    #[serde(default)]
    pub umask: Option<u32>,
}

fn default_true() -> bool {
    true
}

impl OperationOptions {
    /// Create an options builder.
    pub fn builder() -> OperationOptionsBuilder {
        OperationOptionsBuilder::default()
    }
}

impl Default for OperationOptions {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            preserve: true,
            preserve_owner: false,
            stable_symlinks: false,
            confirm_overwrite: true,
            dive_into_subdirs: false,
            erase_at_end: false,
            compute_totals: true,
            umask: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let opts = OperationOptions::builder().build().unwrap();
        assert!(opts.preserve);
        assert!(opts.confirm_overwrite);
        assert!(!opts.follow_symlinks);
        assert!(opts.umask.is_none());
    }

    #[test]
    fn builder_overrides() {
        let opts = OperationOptions::builder()
            .stable_symlinks(true)
            .erase_at_end(true)
            .umask(Some(0o077))
            .build()
            .unwrap();
        assert!(opts.stable_symlinks);
        assert!(opts.erase_at_end);
        assert_eq!(opts.umask, Some(0o077));
    }
}
