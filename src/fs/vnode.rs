// SPDX-License-Identifier: MPL-2.0

//! Vnodes: the filesystem-independent handle every path component resolves
//! to.
//!
//! Grounded on `aster-nix::fs::utils::inode::Inode` (a trait object behind
//! an `Arc`, dispatched per concrete filesystem) and `fs::path::dentry`
//! (name → inode lookups cached per directory). This core has exactly one
//! backing filesystem kind (the ambient ramfs), so the operation table
//! collapses into a single `Vnode` type matched on its own variant instead
//! of a trait object, per SPEC_FULL.md's polymorphism redesign note applied
//! the same way as for memory objects.

use std::collections::BTreeMap;

use spin::Mutex as SpinMutex;

use crate::config::{NAME_LEN, PAGE_SIZE};
use crate::error::Errno;
use crate::fs::device::DeviceKind;
use crate::prelude::*;

pub type Ino = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VnodeType {
    Regular,
    Directory,
    CharDevice,
    BlockDevice,
}

enum Data {
    Regular(SpinMutex<Vec<u8>>),
    Directory(SpinMutex<BTreeMap<String, Ino>>),
    Device(DeviceKind),
}

/// A filesystem node, interned by inode id within its owning filesystem (see
/// [`crate::fs::ramfs::RamFs`]). Held by directories' parent pointers only
/// non-owningly (`fs`); strong ownership of content lives in the
/// filesystem's inode table plus whatever open-files/cwd/vmareas currently
/// hold a clone of this `Arc`.
pub struct Vnode {
    pub ino: Ino,
    pub vtype: VnodeType,
    data: Data,
    fs: Weak<crate::fs::ramfs::RamFs>,
}

#[derive(Debug, Clone, Copy)]
pub struct Stat {
    pub ino: Ino,
    pub vtype: VnodeType,
    pub size: u64,
}

impl Vnode {
    pub(crate) fn new_regular(ino: Ino, fs: Weak<crate::fs::ramfs::RamFs>) -> Arc<Self> {
        Arc::new(Self {
            ino,
            vtype: VnodeType::Regular,
            data: Data::Regular(SpinMutex::new(Vec::new())),
            fs,
        })
    }

    pub(crate) fn new_directory(ino: Ino, fs: Weak<crate::fs::ramfs::RamFs>) -> Arc<Self> {
        Arc::new(Self {
            ino,
            vtype: VnodeType::Directory,
            data: Data::Directory(SpinMutex::new(BTreeMap::new())),
            fs,
        })
    }

    pub(crate) fn new_device(ino: Ino, kind: DeviceKind, vtype: VnodeType, fs: Weak<crate::fs::ramfs::RamFs>) -> Arc<Self> {
        Arc::new(Self {
            ino,
            vtype,
            data: Data::Device(kind),
            fs,
        })
    }

    /// The root directory is its own parent; every other directory gets its
    /// `.`/`..` entries from [`Vnode::create`].
    pub(crate) fn seed_root_dots(self: &Arc<Self>) {
        let children = self.dir_children().expect("root is a directory");
        let mut guard = children.lock();
        guard.insert(".".to_string(), self.ino);
        guard.insert("..".to_string(), self.ino);
    }

    pub fn is_dir(&self) -> bool {
        self.vtype == VnodeType::Directory
    }

    fn fs(&self) -> Arc<crate::fs::ramfs::RamFs> {
        self.fs.upgrade().expect("vnode outlived its filesystem")
    }

    fn dir_children(&self) -> Result<&SpinMutex<BTreeMap<String, Ino>>> {
        match &self.data {
            Data::Directory(c) => Ok(c),
            _ => return_errno_with_message!(Errno::ENOTDIR, "not a directory"),
        }
    }

    fn check_name(name: &str) -> Result<()> {
        if name.is_empty() || name.len() > NAME_LEN {
            return_errno_with_message!(Errno::ENAMETOOLONG, "path component too long");
        }
        Ok(())
    }

    /// *lookup(name)*: directory-only, returns a fresh held reference.
    pub fn lookup(&self, name: &str) -> Result<Arc<Vnode>> {
        let children = self.dir_children()?;
        let ino = *children
            .lock()
            .get(name)
            .ok_or_else(|| Error::new(Errno::ENOENT))?;
        Ok(self.fs().get(ino).expect("dangling directory entry"))
    }

    pub fn create(&self, name: &str, vtype: VnodeType) -> Result<Arc<Vnode>> {
        Self::check_name(name)?;
        let children = self.dir_children()?;
        let mut guard = children.lock();
        if guard.contains_key(name) {
            return_errno_with_message!(Errno::EEXIST, "name already exists in directory");
        }
        let fs = self.fs();
        let child = match vtype {
            VnodeType::Regular => fs.alloc_regular(),
            VnodeType::Directory => {
                let dir = fs.alloc_directory();
                let children = dir.dir_children()?;
                let mut dir_guard = children.lock();
                dir_guard.insert(".".to_string(), dir.ino);
                dir_guard.insert("..".to_string(), self.ino);
                drop(dir_guard);
                dir
            }
            _ => return_errno_with_message!(Errno::EINVAL, "create only makes regular files or directories"),
        };
        guard.insert(name.to_string(), child.ino);
        Ok(child)
    }

    pub fn mkdir(&self, name: &str) -> Result<Arc<Vnode>> {
        self.create(name, VnodeType::Directory)
    }

    pub fn mknod(&self, name: &str, kind: DeviceKind, vtype: VnodeType) -> Result<Arc<Vnode>> {
        Self::check_name(name)?;
        let children = self.dir_children()?;
        let mut guard = children.lock();
        if guard.contains_key(name) {
            return_errno_with_message!(Errno::EEXIST, "name already exists in directory");
        }
        let child = self.fs().alloc_device(kind, vtype);
        guard.insert(name.to_string(), child.ino);
        Ok(child)
    }

    /// *rmdir(name)*: `.` is `EINVAL`, `..` is `ENOTEMPTY` (it is never
    /// actually empty-removable at the root of the lookup context).
    pub fn rmdir(&self, name: &str) -> Result<()> {
        if name == "." {
            return_errno_with_message!(Errno::EINVAL, "cannot rmdir '.'");
        }
        if name == ".." {
            return_errno_with_message!(Errno::ENOTEMPTY, "cannot rmdir '..'");
        }
        let children = self.dir_children()?;
        let mut guard = children.lock();
        let ino = *guard.get(name).ok_or_else(|| Error::new(Errno::ENOENT))?;
        let target = self.fs().get(ino).expect("dangling directory entry");
        if !target.is_dir() {
            return_errno_with_message!(Errno::ENOTDIR, "rmdir target is not a directory");
        }
        if target.dir_children()?.lock().keys().any(|n| n != "." && n != "..") {
            return_errno_with_message!(Errno::ENOTEMPTY, "directory is not empty");
        }
        guard.remove(name);
        self.fs().forget(ino);
        Ok(())
    }

    /// *unlink(name)*: directories may never be unlinked.
    pub fn unlink(&self, name: &str) -> Result<()> {
        let children = self.dir_children()?;
        let mut guard = children.lock();
        let ino = *guard.get(name).ok_or_else(|| Error::new(Errno::ENOENT))?;
        let target = self.fs().get(ino).expect("dangling directory entry");
        if target.is_dir() {
            return_errno_with_message!(Errno::EPERM, "cannot unlink a directory");
        }
        guard.remove(name);
        self.fs().forget(ino);
        Ok(())
    }

    /// *link(name, target)*: hard-links an existing non-directory vnode
    /// under a new name in `self`.
    pub fn link(&self, name: &str, target: &Arc<Vnode>) -> Result<()> {
        if target.is_dir() {
            return_errno_with_message!(Errno::EPERM, "cannot hard-link a directory");
        }
        Self::check_name(name)?;
        let children = self.dir_children()?;
        let mut guard = children.lock();
        if guard.contains_key(name) {
            return_errno_with_message!(Errno::EEXIST, "name already exists in directory");
        }
        guard.insert(name.to_string(), target.ino);
        Ok(())
    }

    pub fn readdir(&self, pos: u64) -> Result<Option<(String, Ino, u64)>> {
        let children = self.dir_children()?;
        let guard = children.lock();
        Ok(guard
            .iter()
            .nth(pos as usize)
            .map(|(name, &ino)| (name.clone(), ino, pos + 1)))
    }

    pub fn size(&self) -> u64 {
        match &self.data {
            Data::Regular(buf) => buf.lock().len() as u64,
            _ => 0,
        }
    }

    pub fn truncate(&self, len: u64) -> Result<()> {
        match &self.data {
            Data::Regular(buf) => {
                buf.lock().resize(len as usize, 0);
                Ok(())
            }
            _ => return_errno_with_message!(Errno::EINVAL, "truncate only applies to regular files"),
        }
    }

    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        match &self.data {
            Data::Regular(content) => {
                let content = content.lock();
                let offset = offset as usize;
                if offset >= content.len() {
                    return Ok(0);
                }
                let n = buf.len().min(content.len() - offset);
                buf[..n].copy_from_slice(&content[offset..offset + n]);
                Ok(n)
            }
            Data::Device(kind) => kind.read(buf),
            Data::Directory(_) => return_errno_with_message!(Errno::EISDIR, "cannot read a directory"),
        }
    }

    pub fn write_at(&self, offset: u64, buf: &[u8]) -> Result<usize> {
        match &self.data {
            Data::Regular(content) => {
                let mut content = content.lock();
                let offset = offset as usize;
                if content.len() < offset + buf.len() {
                    content.resize(offset + buf.len(), 0);
                }
                content[offset..offset + buf.len()].copy_from_slice(buf);
                Ok(buf.len())
            }
            Data::Device(kind) => kind.write(buf),
            Data::Directory(_) => return_errno_with_message!(Errno::EISDIR, "cannot write a directory"),
        }
    }

    /// Supports [`crate::vm::mobj::Mobj`]'s file-backed fill: returns the
    /// (possibly short, end-of-file-truncated) bytes for one page, or `None`
    /// if the page is entirely past the end of the file.
    pub fn read_page(&self, pagenum: u64) -> Result<Option<Vec<u8>>> {
        let offset = pagenum * PAGE_SIZE as u64;
        if offset >= self.size() {
            return Ok(None);
        }
        let mut buf = vec![0u8; PAGE_SIZE];
        let n = self.read_at(offset, &mut buf)?;
        buf.truncate(n);
        Ok(Some(buf))
    }

    pub fn write_page(&self, pagenum: u64, data: &[u8]) -> Result<()> {
        let offset = pagenum * PAGE_SIZE as u64;
        self.write_at(offset, data)?;
        Ok(())
    }

    pub fn stat(&self) -> Stat {
        Stat {
            ino: self.ino,
            vtype: self.vtype,
            size: self.size(),
        }
    }

    pub fn supports_mmap(&self) -> bool {
        matches!(self.vtype, VnodeType::Regular)
    }
}
