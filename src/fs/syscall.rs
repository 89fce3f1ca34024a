// SPDX-License-Identifier: MPL-2.0

//! The syscall-facing VFS operations table (§4.3). Each function takes the
//! caller's own descriptor table, cwd, and filesystem root explicitly
//! rather than reaching into a global — the process supervisor owns those
//! fields and calls straight through.

use crate::error::Errno;
use crate::fs::device::DeviceKind;
use crate::fs::file_table::{Fd, FileTable, OpenFile, Whence};
use crate::fs::path::{self, OpenFlags};
use crate::fs::vnode::{Stat, Vnode};
use crate::prelude::*;

pub fn open(
    root: &Arc<Vnode>,
    cwd: &Arc<Vnode>,
    files: &mut FileTable,
    path_str: &str,
    oflags: OpenFlags,
    devid: Option<(DeviceKind, crate::fs::vnode::VnodeType)>,
) -> Result<Fd> {
    let readable = !oflags.contains(OpenFlags::O_WRONLY) || oflags.contains(OpenFlags::O_RDWR);
    let writable = oflags.contains(OpenFlags::O_WRONLY) || oflags.contains(OpenFlags::O_RDWR);
    if oflags.contains(OpenFlags::O_WRONLY) && oflags.contains(OpenFlags::O_RDWR) {
        return_errno_with_message!(Errno::EINVAL, "O_WRONLY and O_RDWR are mutually exclusive");
    }
    let vnode = path::open(root, Some(cwd), path_str, oflags, devid)?;
    if vnode.is_dir() && writable {
        return_errno_with_message!(Errno::EISDIR, "cannot open a directory for writing");
    }
    let fd = files.get_empty_fd()?;
    files.install(fd, OpenFile::new(vnode, readable, writable, oflags.contains(OpenFlags::O_APPEND)));
    Ok(fd)
}

pub fn read(files: &FileTable, fd: Fd, buf: &mut [u8]) -> Result<usize> {
    let file = files.get(fd)?;
    if !file.readable {
        return_errno!(Errno::EBADF);
    }
    if file.vnode.is_dir() {
        return_errno!(Errno::EISDIR);
    }
    let pos = file.pos();
    let n = file.vnode.read_at(pos, buf)?;
    file.advance(n as u64);
    Ok(n)
}

pub fn write(files: &FileTable, fd: Fd, buf: &[u8]) -> Result<usize> {
    let file = files.get(fd)?;
    if !file.writable {
        return_errno!(Errno::EBADF);
    }
    if file.append {
        file.set_pos(file.vnode.size());
    }
    let pos = file.pos();
    let n = file.vnode.write_at(pos, buf)?;
    file.advance(n as u64);
    Ok(n)
}

pub fn close(files: &mut FileTable, fd: Fd) -> Result<()> {
    files.close(fd)
}

pub fn dup(files: &mut FileTable, fd: Fd) -> Result<Fd> {
    files.dup(fd, 0)
}

pub fn dup2(files: &mut FileTable, old_fd: Fd, new_fd: Fd) -> Result<Fd> {
    if files.get(new_fd).is_ok() && old_fd != new_fd {
        let _ = files.close(new_fd);
    }
    files.dup2(old_fd, new_fd)
}

/// *mknod(path, kind, vtype)*: creates a device node directly, its own
/// syscall contract per spec.md §4.3 rather than `open`'s `O_CREAT` path.
pub fn mknod(
    root: &Arc<Vnode>,
    cwd: &Arc<Vnode>,
    path_str: &str,
    kind: DeviceKind,
    vtype: crate::fs::vnode::VnodeType,
) -> Result<()> {
    path::mknod(root, Some(cwd), path_str, kind, vtype)?;
    Ok(())
}

pub fn mkdir(root: &Arc<Vnode>, cwd: &Arc<Vnode>, path_str: &str) -> Result<()> {
    let (parent, basename) = path::dir(root, Some(cwd), path_str)?;
    parent.mkdir(basename)?;
    Ok(())
}

pub fn rmdir(root: &Arc<Vnode>, cwd: &Arc<Vnode>, path_str: &str) -> Result<()> {
    let (parent, basename) = path::dir(root, Some(cwd), path_str)?;
    parent.rmdir(basename)
}

pub fn unlink(root: &Arc<Vnode>, cwd: &Arc<Vnode>, path_str: &str) -> Result<()> {
    let (parent, basename) = path::dir(root, Some(cwd), path_str)?;
    parent.unlink(basename)
}

/// *link(oldpath, newpath)*. Each directory mutation below is already
/// atomic under that directory's own lock; the canonical (inode-order)
/// acquisition rule only has teeth once an operation needs two directory
/// locks held *simultaneously*, which neither `link` nor `rename` does here
/// — each step locks, mutates, and releases one directory at a time.
pub fn link(root: &Arc<Vnode>, cwd: &Arc<Vnode>, old_path: &str, new_path: &str) -> Result<()> {
    let old = path::resolve(root, Some(cwd), old_path)?;
    if old.is_dir() {
        return_errno_with_message!(Errno::EPERM, "cannot hard-link a directory");
    }
    let (new_parent, basename) = path::dir(root, Some(cwd), new_path)?;
    new_parent.link(basename, &old)
}

/// *rename(oldpath, newpath)*: implemented as link-then-unlink, matching
/// the two `namev_dir` resolutions the syscall table specifies.
pub fn rename(root: &Arc<Vnode>, cwd: &Arc<Vnode>, old_path: &str, new_path: &str) -> Result<()> {
    let (old_parent, old_name) = path::dir(root, Some(cwd), old_path)?;
    let (new_parent, new_name) = path::dir(root, Some(cwd), new_path)?;
    let target = old_parent.lookup(old_name)?;
    new_parent.link(new_name, &target)?;
    old_parent.unlink(old_name)?;
    Ok(())
}

pub fn chdir(root: &Arc<Vnode>, cwd: &mut Arc<Vnode>, path_str: &str) -> Result<()> {
    let target = path::resolve(root, Some(cwd), path_str)?;
    if !target.is_dir() {
        return_errno!(Errno::ENOTDIR);
    }
    *cwd = target;
    Ok(())
}

pub fn getdent(files: &FileTable, fd: Fd) -> Result<Option<(String, u64)>> {
    let file = files.get(fd)?;
    if !file.vnode.is_dir() {
        return_errno!(Errno::ENOTDIR);
    }
    let pos = file.pos();
    match file.vnode.readdir(pos)? {
        Some((name, ino, next_pos)) => {
            file.set_pos(next_pos);
            Ok(Some((name, ino)))
        }
        None => Ok(None),
    }
}

pub fn lseek(files: &FileTable, fd: Fd, whence: Whence, offset: i64) -> Result<u64> {
    let file = files.get(fd)?;
    file.seek(whence, offset)
}

pub fn stat(root: &Arc<Vnode>, cwd: &Arc<Vnode>, path_str: &str) -> Result<Stat> {
    let v = path::resolve(root, Some(cwd), path_str)?;
    Ok(v.stat())
}
