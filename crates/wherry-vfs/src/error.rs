//! Error type for backend operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for backend calls.
pub type VfsResult<T> = Result<T, VfsError>;

/// Errors returned by backend primitives.
///
/// The engine never matches on raw OS codes; the classifications it cares
/// about (cross-device rename, attribute support, disk full) are promoted to
/// variants here.
#[derive(Debug, Error)]
pub enum VfsError {
    /// Permission denied for a path.
    #[error("permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("no such file or directory: {path}")]
    NotFound { path: PathBuf },

    /// A directory was expected.
    #[error("not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// A directory could not be removed because it has entries.
    #[error("directory not empty: {path}")]
    NotEmpty { path: PathBuf },

    /// Rename or link across a filesystem boundary.
    #[error("cross-device link: {path}")]
    CrossDevice { path: PathBuf },

    /// The backend ran out of space.
    #[error("no space left on device: {path}")]
    NoSpace { path: PathBuf },

    /// The backend does not implement this operation. Attribute operations
    /// failing with this variant are tolerated silently by the engine.
    #[error("operation not supported by backend: {path}")]
    Unsupported { path: PathBuf },

    /// Generic I/O error.
    #[error("{source}: {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl VfsError {
    /// Classify an `io::Error` with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            io::ErrorKind::NotFound => Self::NotFound { path },
            io::ErrorKind::NotADirectory => Self::NotADirectory { path },
            io::ErrorKind::DirectoryNotEmpty => Self::NotEmpty { path },
            io::ErrorKind::CrossesDevices => Self::CrossDevice { path },
            io::ErrorKind::StorageFull | io::ErrorKind::QuotaExceeded => Self::NoSpace { path },
            io::ErrorKind::Unsupported => Self::Unsupported { path },
            _ => match source.raw_os_error() {
                Some(code) if is_unsupported_code(code) => Self::Unsupported { path },
                _ => Self::Io { path, source },
            },
        }
    }

    /// Create an unsupported-operation error.
    pub fn unsupported(path: impl Into<PathBuf>) -> Self {
        Self::Unsupported { path: path.into() }
    }

    /// Whether this is the fixed "backend cannot do attributes" class the
    /// engine swallows silently.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    /// Whether a rename failed because source and destination live on
    /// different filesystems.
    pub fn is_cross_device(&self) -> bool {
        matches!(self, Self::CrossDevice { .. })
    }

    /// Whether the path simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The path the error refers to.
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::PermissionDenied { path }
            | Self::NotFound { path }
            | Self::NotADirectory { path }
            | Self::NotEmpty { path }
            | Self::CrossDevice { path }
            | Self::NoSpace { path }
            | Self::Unsupported { path }
            | Self::Io { path, .. } => path,
        }
    }
}

/// OS error codes that mean "this filesystem cannot hold extended
/// attributes" rather than "the operation failed".
#[cfg(unix)]
fn is_unsupported_code(code: i32) -> bool {
    code == libc::ENOSYS
        || code == libc::ENOTSUP
        || code == libc::EOPNOTSUPP
        || code == libc::ENODATA
}

#[cfg(not(unix))]
fn is_unsupported_code(_code: i32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_io_kinds() {
        let err = VfsError::io(
            "/x",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, VfsError::PermissionDenied { .. }));

        let err = VfsError::io("/x", io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(err.is_not_found());
    }

    #[cfg(unix)]
    #[test]
    fn classifies_unsupported_codes() {
        let err = VfsError::io("/x", io::Error::from_raw_os_error(libc::ENOTSUP));
        assert!(err.is_unsupported());
        let err = VfsError::io("/x", io::Error::from_raw_os_error(libc::EXDEV));
        assert!(err.is_cross_device());
    }
}
