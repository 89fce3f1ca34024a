// SPDX-License-Identifier: MPL-2.0

//! Path resolution: the two primitives every syscall that takes a path
//! builds on.
//!
//! Grounded on `aster-nix::fs::fs_resolver::FsResolver` (split-on-`/`,
//! component-by-component `lookup`, `AT_FDCWD`-style base handling), adapted
//! to this core's single ambient filesystem. A `null` `base` means "use the
//! caller's cwd"; callers resolve that themselves and pass it in, keeping
//! this module free of any dependency on the process module.

use crate::config::NAME_LEN;
use crate::error::Errno;
use crate::fs::device::DeviceKind;
use crate::fs::vnode::{Vnode, VnodeType};
use crate::prelude::*;

/// *resolve(base, path) → vnode*.
pub fn resolve(root: &Arc<Vnode>, base: Option<&Arc<Vnode>>, path: &str) -> Result<Arc<Vnode>> {
    let mut cur = start_vnode(root, base, path);
    for component in components(path)? {
        if !cur.is_dir() {
            return_errno_with_message!(Errno::ENOTDIR, "intermediate path component is not a directory");
        }
        cur = cur.lookup(component)?;
    }
    Ok(cur)
}

/// *dir(base, path) → (parent_dir_vnode, basename)*: resolves up to but not
/// including the final component.
pub fn dir<'a>(root: &Arc<Vnode>, base: Option<&Arc<Vnode>>, path: &'a str) -> Result<(Arc<Vnode>, &'a str)> {
    let comps = components(path)?;
    let Some((&basename, init)) = comps.split_last() else {
        return_errno_with_message!(Errno::ENOENT, "empty path has no basename");
    };
    let mut cur = start_vnode(root, base, path);
    for component in init {
        if !cur.is_dir() {
            return_errno_with_message!(Errno::ENOTDIR, "intermediate path component is not a directory");
        }
        cur = cur.lookup(component)?;
    }
    Ok((cur, basename))
}

bitflags::bitflags! {
    pub struct OpenFlags: u32 {
        const O_RDONLY = 0;
        const O_WRONLY = 0b0001;
        const O_RDWR   = 0b0010;
        const O_CREAT  = 0b0100;
        const O_TRUNC  = 0b1000;
        const O_APPEND = 0b1_0000;
    }
}

/// *open(base, path, oflags, mode, devid) → vnode*. `devid`, when present,
/// carries the device's `(kind, vtype)` so a missing path created with
/// `O_CREAT` can come up as the node type the caller actually asked for
/// (char or block), not unconditionally as a char device.
pub fn open(
    root: &Arc<Vnode>,
    base: Option<&Arc<Vnode>>,
    path: &str,
    oflags: OpenFlags,
    devid: Option<(DeviceKind, VnodeType)>,
) -> Result<Arc<Vnode>> {
    match resolve(root, base, path) {
        Ok(v) => {
            if oflags.contains(OpenFlags::O_TRUNC) && v.vtype == VnodeType::Regular {
                v.truncate(0)?;
            }
            Ok(v)
        }
        Err(e) if e.errno() == Errno::ENOENT && oflags.contains(OpenFlags::O_CREAT) => {
            let (parent, basename) = dir(root, base, path)?;
            match devid {
                Some((kind, vtype)) => parent.mknod(basename, kind, vtype),
                None => parent.create(basename, VnodeType::Regular),
            }
        }
        Err(e) => Err(e),
    }
}

/// *mknod(base, path, kind, vtype) → vnode*: its own syscall contract per
/// spec.md §4.3, distinct from `open`'s `O_CREAT` convenience — creates a
/// device node directly rather than opening (or creating-then-opening) a
/// regular file.
pub fn mknod(
    root: &Arc<Vnode>,
    base: Option<&Arc<Vnode>>,
    path: &str,
    kind: DeviceKind,
    vtype: VnodeType,
) -> Result<Arc<Vnode>> {
    let (parent, basename) = dir(root, base, path)?;
    parent.mknod(basename, kind, vtype)
}

fn start_vnode(root: &Arc<Vnode>, base: Option<&Arc<Vnode>>, path: &str) -> Arc<Vnode> {
    if path.starts_with('/') {
        root.clone()
    } else {
        base.cloned().unwrap_or_else(|| root.clone())
    }
}

fn components(path: &str) -> Result<Vec<&str>> {
    let mut out = Vec::new();
    for c in path.split('/') {
        if c.is_empty() || c == "." {
            continue;
        }
        if c.len() > NAME_LEN {
            return_errno_with_message!(Errno::ENAMETOOLONG, "path component exceeds NAME_LEN");
        }
        out.push(c);
    }
    Ok(out)
}
