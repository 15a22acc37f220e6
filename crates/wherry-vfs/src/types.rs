//! Metadata snapshot types shared by every backend.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// File type as reported by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    /// Regular file.
    Regular,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Character device node.
    CharDevice,
    /// Block device node.
    BlockDevice,
    /// Named pipe.
    Fifo,
    /// Unix domain socket.
    Socket,
    /// Anything the backend could not classify.
    Unknown,
}

impl FileKind {
    /// Whether this kind is recreated with a device-node call rather than a
    /// data copy (devices, fifos, sockets).
    pub fn is_special(self) -> bool {
        matches!(
            self,
            Self::CharDevice | Self::BlockDevice | Self::Fifo | Self::Socket
        )
    }
}

/// A point-in-time metadata snapshot of one path.
///
/// Snapshots are plain owned values; the engine takes one per path it works
/// on and never shares it between recursion frames.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Metadata {
    /// File type.
    pub kind: FileKind,
    /// Permission bits (low 12 bits of st_mode).
    pub mode: u32,
    /// Owning user id.
    pub uid: u32,
    /// Owning group id.
    pub gid: u32,
    /// Size in bytes.
    pub size: u64,
    /// Device the file lives on.
    pub dev: u64,
    /// Inode number.
    pub ino: u64,
    /// Number of hard links.
    pub nlink: u64,
    /// Device id for device nodes, 0 otherwise.
    pub rdev: u64,
    /// Last access time.
    pub atime: SystemTime,
    /// Last modification time.
    pub mtime: SystemTime,
    /// Last status change time.
    pub ctime: SystemTime,
}

impl Metadata {
    /// Check if this snapshot describes a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    /// Check if this snapshot describes a symlink.
    pub fn is_symlink(&self) -> bool {
        self.kind == FileKind::Symlink
    }

    /// Check if this snapshot describes a device, fifo, or socket.
    pub fn is_special(&self) -> bool {
        self.kind.is_special()
    }

    /// Whether two snapshots name the same underlying file on the same
    /// device.
    pub fn same_file(&self, other: &Metadata) -> bool {
        self.dev == other.dev && self.ino == other.ino
    }

    /// A zeroed snapshot for entries whose lstat failed; such entries are
    /// identified by `mode == 0`.
    pub fn unreadable() -> Self {
        Self {
            kind: FileKind::Unknown,
            mode: 0,
            uid: 0,
            gid: 0,
            size: 0,
            dev: 0,
            ino: 0,
            nlink: 0,
            rdev: 0,
            atime: SystemTime::UNIX_EPOCH,
            mtime: SystemTime::UNIX_EPOCH,
            ctime: SystemTime::UNIX_EPOCH,
        }
    }

    /// A synthetic snapshot for the ".." listing entry.
    pub fn synthetic_dir() -> Self {
        Self {
            kind: FileKind::Directory,
            mode: 0o755,
            ..Self::unreadable()
        }
    }
}

/// The tuple that recognizes "the same underlying file" across paths:
/// backend identity plus device plus inode.
///
/// Used for hardlink detection, cycle detection, and self-copy detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId {
    /// Backend identity within the VFS namespace.
    pub backend: u64,
    /// Device id.
    pub dev: u64,
    /// Inode number.
    pub ino: u64,
}

impl FileId {
    /// Create a new file identity.
    pub fn new(backend: u64, dev: u64, ino: u64) -> Self {
        Self { backend, dev, ino }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn special_kinds() {
        assert!(FileKind::Fifo.is_special());
        assert!(FileKind::CharDevice.is_special());
        assert!(!FileKind::Regular.is_special());
        assert!(!FileKind::Directory.is_special());
    }

    #[test]
    fn same_file_compares_dev_and_ino() {
        let mut a = Metadata::unreadable();
        a.dev = 7;
        a.ino = 42;
        let mut b = a;
        assert!(a.same_file(&b));
        b.ino = 43;
        assert!(!a.same_file(&b));
    }
}
