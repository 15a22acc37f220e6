//! Fault-injecting wrapper around a real backend.
//!
//! Wraps any [`Vfs`] and overrides selected primitives to fail in
//! controlled ways: force a cross-device condition on rename, fail a write
//! once after a byte threshold, or refuse hard links. The engine's tests
//! use this to exercise recovery paths against a real local tree.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use crate::error::{VfsError, VfsResult};
use crate::types::{FileKind, Metadata};
use crate::vfs::{Vfs, VfsDir, VfsFile, WriteMode};

/// A backend decorator that injects failures.
pub struct FaultFs<V> {
    inner: V,
    cross_device_rename: bool,
    deny_hardlinks: bool,
    write_fail_after: Option<u64>,
    write_failed_once: Arc<AtomicBool>,
}

impl<V: Vfs> FaultFs<V> {
    /// Wrap a backend with no faults armed.
    pub fn new(inner: V) -> Self {
        Self {
            inner,
            cross_device_rename: false,
            deny_hardlinks: false,
            write_fail_after: None,
            write_failed_once: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Every rename fails with a cross-device error, forcing the
    /// copy-then-delete fallback.
    pub fn cross_device_renames(mut self) -> Self {
        self.cross_device_rename = true;
        self
    }

    /// Report that hard links are unsupported.
    pub fn without_hardlinks(mut self) -> Self {
        self.deny_hardlinks = true;
        self
    }

    /// The first write that would push a file handle past `bytes` fails
    /// once; subsequent writes succeed.
    pub fn fail_write_once_after(mut self, bytes: u64) -> Self {
        self.write_fail_after = Some(bytes);
        self
    }

    /// Whether the armed write failure has fired.
    pub fn write_fault_fired(&self) -> bool {
        self.write_failed_once.load(Ordering::Relaxed)
    }
}

/// File handle wrapper that counts written bytes and fails once at the
/// configured threshold.
struct FaultFile {
    inner: Box<dyn VfsFile>,
    path: PathBuf,
    written: u64,
    fail_after: u64,
    failed_once: Arc<AtomicBool>,
}

impl VfsFile for FaultFile {
    fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        self.inner.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> VfsResult<usize> {
        if self.written + buf.len() as u64 > self.fail_after
            && !self.failed_once.swap(true, Ordering::Relaxed)
        {
            return Err(VfsError::io(
                &self.path,
                std::io::Error::other("injected write failure"),
            ));
        }
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn seek_to(&mut self, offset: u64) -> VfsResult<u64> {
        self.inner.seek_to(offset)
    }

    fn metadata(&self) -> VfsResult<Metadata> {
        self.inner.metadata()
    }

    fn preallocate(&mut self, len: u64) -> VfsResult<()> {
        self.inner.preallocate(len)
    }

    fn close(&mut self) -> VfsResult<()> {
        self.inner.close()
    }
}

impl<V: Vfs> Vfs for FaultFs<V> {
    fn backend_id(&self, path: &Path) -> u64 {
        self.inner.backend_id(path)
    }

    fn is_local(&self, path: &Path) -> bool {
        self.inner.is_local(path)
    }

    fn supports_hardlinks(&self, path: &Path) -> bool {
        !self.deny_hardlinks && self.inner.supports_hardlinks(path)
    }

    fn block_size(&self, path: &Path) -> usize {
        self.inner.block_size(path)
    }

    fn stat(&self, path: &Path) -> VfsResult<Metadata> {
        self.inner.stat(path)
    }

    fn lstat(&self, path: &Path) -> VfsResult<Metadata> {
        self.inner.lstat(path)
    }

    fn open_read(&self, path: &Path) -> VfsResult<Box<dyn VfsFile>> {
        self.inner.open_read(path)
    }

    fn open_write(&self, path: &Path, mode: WriteMode, perm: u32) -> VfsResult<Box<dyn VfsFile>> {
        let file = self.inner.open_write(path, mode, perm)?;
        match self.write_fail_after {
            Some(threshold) => Ok(Box::new(FaultFile {
                inner: file,
                path: path.to_path_buf(),
                written: 0,
                fail_after: threshold,
                failed_once: Arc::clone(&self.write_failed_once),
            })),
            None => Ok(file),
        }
    }

    fn open_dir(&self, path: &Path) -> VfsResult<Box<dyn VfsDir>> {
        self.inner.open_dir(path)
    }

    fn mkdir(&self, path: &Path, mode: u32) -> VfsResult<()> {
        self.inner.mkdir(path, mode)
    }

    fn rmdir(&self, path: &Path) -> VfsResult<()> {
        self.inner.rmdir(path)
    }

    fn unlink(&self, path: &Path) -> VfsResult<()> {
        self.inner.unlink(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
        if self.cross_device_rename {
            return Err(VfsError::CrossDevice {
                path: from.to_path_buf(),
            });
        }
        self.inner.rename(from, to)
    }

    fn link(&self, existing: &Path, new: &Path) -> VfsResult<()> {
        if self.deny_hardlinks {
            return Err(VfsError::unsupported(new));
        }
        self.inner.link(existing, new)
    }

    fn symlink(&self, target: &Path, link: &Path) -> VfsResult<()> {
        self.inner.symlink(target, link)
    }

    fn readlink(&self, path: &Path) -> VfsResult<PathBuf> {
        self.inner.readlink(path)
    }

    fn chmod(&self, path: &Path, mode: u32) -> VfsResult<()> {
        self.inner.chmod(path, mode)
    }

    fn chown(&self, path: &Path, uid: u32, gid: u32) -> VfsResult<()> {
        self.inner.chown(path, uid, gid)
    }

    fn set_times(&self, path: &Path, atime: SystemTime, mtime: SystemTime) -> VfsResult<()> {
        self.inner.set_times(path, atime, mtime)
    }

    fn set_symlink_times(&self, path: &Path, atime: SystemTime, mtime: SystemTime) -> VfsResult<()> {
        self.inner.set_symlink_times(path, atime, mtime)
    }

    fn copy_attrs(&self, from: &Path, to: &Path) -> VfsResult<()> {
        self.inner.copy_attrs(from, to)
    }

    fn mknod(&self, path: &Path, kind: FileKind, mode: u32, rdev: u64) -> VfsResult<()> {
        self.inner.mknod(path, kind, mode, rdev)
    }

    fn clone_file(&self, from: &Path, to: &Path) -> VfsResult<bool> {
        // A backend with an armed write fault must not bypass the chunked
        // loop, or the fault never fires.
        if self.write_fail_after.is_some() {
            return Ok(false);
        }
        self.inner.clone_file(from, to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalFs;
    use tempfile::TempDir;

    #[test]
    fn rename_reports_cross_device() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        std::fs::write(&a, b"x").unwrap();

        let fs = FaultFs::new(LocalFs::new()).cross_device_renames();
        let err = fs.rename(&a, &temp.path().join("b")).unwrap_err();
        assert!(err.is_cross_device());
        assert!(a.exists());
    }

    #[test]
    fn write_fails_once_then_recovers() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");

        let fs = FaultFs::new(LocalFs::new()).fail_write_once_after(4);
        let mut f = fs.open_write(&path, WriteMode::Create, 0o600).unwrap();
        assert!(f.write(b"ab").is_ok());
        assert!(f.write(b"cdef").is_err());
        assert!(f.write(b"cdef").is_ok());
        assert!(fs.write_fault_fired());
    }
}
