//! Local-disk backend.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
#[cfg(unix)]
use std::time::Duration;
use std::time::SystemTime;

use crate::error::{VfsError, VfsResult};
use crate::types::{FileKind, Metadata};
use crate::vfs::{Vfs, VfsDir, VfsFile, WriteMode};

/// The local-disk backend: paths are served by the operating system's own
/// filesystem namespace.
#[derive(Debug, Default)]
pub struct LocalFs;

impl LocalFs {
    /// Create a new local backend.
    pub fn new() -> Self {
        Self
    }
}

/// An open local file.
struct LocalFile {
    file: File,
    path: PathBuf,
}

impl VfsFile for LocalFile {
    fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        self.file
            .read(buf)
            .map_err(|e| VfsError::io(&self.path, e))
    }

    fn write(&mut self, buf: &[u8]) -> VfsResult<usize> {
        self.file
            .write(buf)
            .map_err(|e| VfsError::io(&self.path, e))
    }

    fn seek_to(&mut self, offset: u64) -> VfsResult<u64> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| VfsError::io(&self.path, e))
    }

    fn metadata(&self) -> VfsResult<Metadata> {
        let meta = self
            .file
            .metadata()
            .map_err(|e| VfsError::io(&self.path, e))?;
        Ok(convert_metadata(&meta))
    }

    #[cfg(target_os = "linux")]
    fn preallocate(&mut self, len: u64) -> VfsResult<()> {
        use std::os::fd::AsRawFd;

        if len == 0 {
            return Ok(());
        }
        // Best-effort hint; filesystems without fallocate report Unsupported
        // and the caller ignores it.
        let rc = unsafe { libc::fallocate(self.file.as_raw_fd(), 0, 0, len as libc::off_t) };
        if rc == 0 {
            Ok(())
        } else {
            Err(VfsError::io(&self.path, std::io::Error::last_os_error()))
        }
    }

    fn close(&mut self) -> VfsResult<()> {
        self.file.flush().map_err(|e| VfsError::io(&self.path, e))
    }
}

/// An open local directory.
struct LocalDir {
    inner: fs::ReadDir,
    path: PathBuf,
}

impl VfsDir for LocalDir {
    fn next_entry(&mut self) -> VfsResult<Option<String>> {
        match self.inner.next() {
            None => Ok(None),
            Some(Ok(entry)) => Ok(Some(entry.file_name().to_string_lossy().into_owned())),
            Some(Err(e)) => Err(VfsError::io(&self.path, e)),
        }
    }
}

impl Vfs for LocalFs {
    fn backend_id(&self, _path: &Path) -> u64 {
        0
    }

    fn is_local(&self, _path: &Path) -> bool {
        true
    }

    fn supports_hardlinks(&self, _path: &Path) -> bool {
        true
    }

    fn stat(&self, path: &Path) -> VfsResult<Metadata> {
        let meta = fs::metadata(path).map_err(|e| VfsError::io(path, e))?;
        Ok(convert_metadata(&meta))
    }

    fn lstat(&self, path: &Path) -> VfsResult<Metadata> {
        let meta = fs::symlink_metadata(path).map_err(|e| VfsError::io(path, e))?;
        Ok(convert_metadata(&meta))
    }

    fn open_read(&self, path: &Path) -> VfsResult<Box<dyn VfsFile>> {
        let file = File::open(path).map_err(|e| VfsError::io(path, e))?;
        Ok(Box::new(LocalFile {
            file,
            path: path.to_path_buf(),
        }))
    }

    fn open_write(&self, path: &Path, mode: WriteMode, perm: u32) -> VfsResult<Box<dyn VfsFile>> {
        let mut options = OpenOptions::new();
        options.write(true);
        match mode {
            WriteMode::Create => {
                options.create(true).truncate(true);
                #[cfg(unix)]
                {
                    use std::os::unix::fs::OpenOptionsExt;
                    options.mode(perm);
                }
                #[cfg(not(unix))]
                let _ = perm;
            }
            WriteMode::Append => {
                options.append(true);
            }
        }
        let file = options.open(path).map_err(|e| VfsError::io(path, e))?;
        Ok(Box::new(LocalFile {
            file,
            path: path.to_path_buf(),
        }))
    }

    fn open_dir(&self, path: &Path) -> VfsResult<Box<dyn VfsDir>> {
        let inner = fs::read_dir(path).map_err(|e| VfsError::io(path, e))?;
        Ok(Box::new(LocalDir {
            inner,
            path: path.to_path_buf(),
        }))
    }

    fn mkdir(&self, path: &Path, mode: u32) -> VfsResult<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            fs::DirBuilder::new()
                .mode(mode)
                .create(path)
                .map_err(|e| VfsError::io(path, e))
        }
        #[cfg(not(unix))]
        {
            let _ = mode;
            fs::create_dir(path).map_err(|e| VfsError::io(path, e))
        }
    }

    fn rmdir(&self, path: &Path) -> VfsResult<()> {
        fs::remove_dir(path).map_err(|e| VfsError::io(path, e))
    }

    fn unlink(&self, path: &Path) -> VfsResult<()> {
        fs::remove_file(path).map_err(|e| VfsError::io(path, e))
    }

    fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
        fs::rename(from, to).map_err(|e| VfsError::io(from, e))
    }

    fn link(&self, existing: &Path, new: &Path) -> VfsResult<()> {
        fs::hard_link(existing, new).map_err(|e| VfsError::io(new, e))
    }

    fn symlink(&self, target: &Path, link: &Path) -> VfsResult<()> {
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(target, link).map_err(|e| VfsError::io(link, e))
        }
        #[cfg(not(unix))]
        {
            let _ = target;
            Err(VfsError::unsupported(link))
        }
    }

    fn readlink(&self, path: &Path) -> VfsResult<PathBuf> {
        fs::read_link(path).map_err(|e| VfsError::io(path, e))
    }

    fn chmod(&self, path: &Path, mode: u32) -> VfsResult<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(mode))
                .map_err(|e| VfsError::io(path, e))
        }
        #[cfg(not(unix))]
        {
            let _ = mode;
            Err(VfsError::unsupported(path))
        }
    }

    #[cfg(unix)]
    fn chown(&self, path: &Path, uid: u32, gid: u32) -> VfsResult<()> {
        use std::os::unix::ffi::OsStrExt;

        let cpath = std::ffi::CString::new(path.as_os_str().as_bytes())
            .map_err(|_| VfsError::unsupported(path))?;
        let rc = unsafe { libc::chown(cpath.as_ptr(), uid, gid) };
        if rc == 0 {
            Ok(())
        } else {
            Err(VfsError::io(path, std::io::Error::last_os_error()))
        }
    }

    #[cfg(not(unix))]
    fn chown(&self, path: &Path, _uid: u32, _gid: u32) -> VfsResult<()> {
        Err(VfsError::unsupported(path))
    }

    fn set_times(&self, path: &Path, atime: SystemTime, mtime: SystemTime) -> VfsResult<()> {
        #[cfg(unix)]
        {
            use filetime::FileTime;
            filetime::set_file_times(
                path,
                FileTime::from_system_time(atime),
                FileTime::from_system_time(mtime),
            )
            .map_err(|e| VfsError::io(path, e))
        }
        #[cfg(not(unix))]
        {
            let _ = (atime, mtime);
            Err(VfsError::unsupported(path))
        }
    }

    #[cfg(unix)]
    fn set_symlink_times(&self, path: &Path, atime: SystemTime, mtime: SystemTime) -> VfsResult<()> {
        use filetime::FileTime;
        filetime::set_symlink_file_times(
            path,
            FileTime::from_system_time(atime),
            FileTime::from_system_time(mtime),
        )
        .map_err(|e| VfsError::io(path, e))
    }

    #[cfg(unix)]
    fn copy_attrs(&self, from: &Path, to: &Path) -> VfsResult<()> {
        let names = xattr::list(from).map_err(|e| VfsError::io(from, e))?;
        for name in names {
            if let Some(value) = xattr::get(from, &name).map_err(|e| VfsError::io(from, e))? {
                xattr::set(to, &name, &value).map_err(|e| VfsError::io(to, e))?;
            }
        }
        Ok(())
    }

    #[cfg(unix)]
    fn mknod(&self, path: &Path, kind: FileKind, mode: u32, rdev: u64) -> VfsResult<()> {
        use std::os::unix::ffi::OsStrExt;

        let type_bits = match kind {
            FileKind::CharDevice => libc::S_IFCHR,
            FileKind::BlockDevice => libc::S_IFBLK,
            FileKind::Fifo => libc::S_IFIFO,
            FileKind::Socket => libc::S_IFSOCK,
            _ => return Err(VfsError::unsupported(path)),
        };
        let cpath = std::ffi::CString::new(path.as_os_str().as_bytes())
            .map_err(|_| VfsError::unsupported(path))?;
        let rc = unsafe {
            libc::mknod(
                cpath.as_ptr(),
                type_bits | mode as libc::mode_t,
                rdev as libc::dev_t,
            )
        };
        if rc == 0 {
            Ok(())
        } else {
            Err(VfsError::io(path, std::io::Error::last_os_error()))
        }
    }

    #[cfg(not(unix))]
    fn mknod(&self, path: &Path, _kind: FileKind, _mode: u32, _rdev: u64) -> VfsResult<()> {
        Err(VfsError::unsupported(path))
    }

    #[cfg(target_os = "linux")]
    fn clone_file(&self, from: &Path, to: &Path) -> VfsResult<bool> {
        use std::os::fd::AsRawFd;

        let src = File::open(from).map_err(|e| VfsError::io(from, e))?;
        let dst = OpenOptions::new()
            .write(true)
            .open(to)
            .map_err(|e| VfsError::io(to, e))?;
        let len = src.metadata().map_err(|e| VfsError::io(from, e))?.len();

        let mut copied: u64 = 0;
        while copied < len {
            let chunk = (len - copied).min(1 << 30) as usize;
            let rc = unsafe {
                libc::copy_file_range(
                    src.as_raw_fd(),
                    std::ptr::null_mut(),
                    dst.as_raw_fd(),
                    std::ptr::null_mut(),
                    chunk,
                    0,
                )
            };
            if rc < 0 {
                let err = std::io::Error::last_os_error();
                // Kernel or filesystem cannot accelerate this pair; hand the
                // transfer back to the chunked loop.
                if copied == 0 {
                    return Ok(false);
                }
                return Err(VfsError::io(to, err));
            }
            if rc == 0 {
                // Source shrank underneath us; report what we have.
                return Err(VfsError::io(
                    from,
                    std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "source truncated"),
                ));
            }
            copied += rc as u64;
        }
        Ok(true)
    }
}

/// The process umask, read once.
pub fn current_umask() -> u32 {
    #[cfg(unix)]
    {
        use std::sync::OnceLock;
        static UMASK: OnceLock<u32> = OnceLock::new();
        *UMASK.get_or_init(|| unsafe {
            let mask = libc::umask(0);
            libc::umask(mask);
            mask as u32
        })
    }
    #[cfg(not(unix))]
    {
        0o022
    }
}

#[cfg(unix)]
fn convert_metadata(meta: &fs::Metadata) -> Metadata {
    use std::os::unix::fs::FileTypeExt;
    use std::os::unix::fs::MetadataExt;

    let ft = meta.file_type();
    let kind = if ft.is_dir() {
        FileKind::Directory
    } else if ft.is_symlink() {
        FileKind::Symlink
    } else if ft.is_file() {
        FileKind::Regular
    } else if ft.is_char_device() {
        FileKind::CharDevice
    } else if ft.is_block_device() {
        FileKind::BlockDevice
    } else if ft.is_fifo() {
        FileKind::Fifo
    } else if ft.is_socket() {
        FileKind::Socket
    } else {
        FileKind::Unknown
    };

    Metadata {
        kind,
        mode: meta.mode() & 0o7777,
        uid: meta.uid(),
        gid: meta.gid(),
        size: meta.len(),
        dev: meta.dev(),
        ino: meta.ino(),
        nlink: meta.nlink(),
        rdev: meta.rdev(),
        atime: meta.accessed().unwrap_or(SystemTime::UNIX_EPOCH),
        mtime: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        ctime: epoch_time(meta.ctime(), meta.ctime_nsec()),
    }
}

#[cfg(not(unix))]
fn convert_metadata(meta: &fs::Metadata) -> Metadata {
    let ft = meta.file_type();
    let kind = if ft.is_dir() {
        FileKind::Directory
    } else if ft.is_symlink() {
        FileKind::Symlink
    } else if ft.is_file() {
        FileKind::Regular
    } else {
        FileKind::Unknown
    };
    Metadata {
        kind,
        mode: if meta.permissions().readonly() {
            0o444
        } else {
            0o644
        },
        uid: 0,
        gid: 0,
        size: meta.len(),
        dev: 0,
        ino: 0,
        nlink: 1,
        rdev: 0,
        atime: meta.accessed().unwrap_or(SystemTime::UNIX_EPOCH),
        mtime: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        ctime: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
    }
}

#[cfg(unix)]
fn epoch_time(secs: i64, nsec: i64) -> SystemTime {
    if secs >= 0 {
        SystemTime::UNIX_EPOCH + Duration::new(secs as u64, nsec as u32)
    } else {
        SystemTime::UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn stat_classifies_kinds() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("f");
        fs::write(&file, b"abc").unwrap();

        let fs_ = LocalFs::new();
        let meta = fs_.lstat(&file).unwrap();
        assert_eq!(meta.kind, FileKind::Regular);
        assert_eq!(meta.size, 3);

        let dir = fs_.lstat(temp.path()).unwrap();
        assert!(dir.is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn lstat_sees_symlink_stat_follows() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("f");
        let link = temp.path().join("l");
        fs::write(&file, b"abc").unwrap();
        std::os::unix::fs::symlink(&file, &link).unwrap();

        let fs_ = LocalFs::new();
        assert!(fs_.lstat(&link).unwrap().is_symlink());
        assert_eq!(fs_.stat(&link).unwrap().kind, FileKind::Regular);
        assert_eq!(fs_.readlink(&link).unwrap(), file);
    }

    #[test]
    fn open_dir_lists_entries() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a"), b"").unwrap();
        fs::write(temp.path().join("b"), b"").unwrap();

        let fs_ = LocalFs::new();
        let mut dir = fs_.open_dir(temp.path()).unwrap();
        let mut names = Vec::new();
        while let Some(name) = dir.next_entry().unwrap() {
            names.push(name);
        }
        names.sort();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn write_modes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        let fs_ = LocalFs::new();

        let mut f = fs_.open_write(&path, WriteMode::Create, 0o600).unwrap();
        f.write(b"hello").unwrap();
        f.close().unwrap();

        let mut f = fs_.open_write(&path, WriteMode::Append, 0o600).unwrap();
        f.write(b" world").unwrap();
        f.close().unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"hello world");
    }

    #[cfg(unix)]
    #[test]
    fn hard_link_shares_inode() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        fs::write(&a, b"x").unwrap();

        let fs_ = LocalFs::new();
        fs_.link(&a, &b).unwrap();
        let ma = fs_.lstat(&a).unwrap();
        let mb = fs_.lstat(&b).unwrap();
        assert!(ma.same_file(&mb));
        assert_eq!(ma.nlink, 2);
    }
}
