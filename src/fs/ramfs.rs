// SPDX-License-Identifier: MPL-2.0

//! The ambient backing filesystem: an in-memory tree of directories and
//! growable regular files, interning vnodes by inode id.
//!
//! Grounded on `aster-nix::fs::ramfs::fs::RamFS` (an inode table keyed by a
//! monotonic id, holding the root directory) per SPEC_FULL.md's backing
//! filesystem supplement. The on-disk format this would otherwise sit on
//! top of is an out-of-scope collaborator; this filesystem's "disk" is just
//! process memory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex as SpinMutex;

use crate::fs::device::DeviceKind;
use crate::fs::vnode::{Ino, Vnode, VnodeType};
use crate::prelude::*;

pub struct RamFs {
    inodes: SpinMutex<HashMap<Ino, Arc<Vnode>>>,
    next_ino: AtomicU64,
    root_ino: Ino,
}

impl RamFs {
    pub fn new() -> Arc<Self> {
        const ROOT_INO: Ino = 1;
        Arc::new_cyclic(|weak: &Weak<RamFs>| {
            let root = Vnode::new_directory(ROOT_INO, weak.clone());
            root.seed_root_dots();
            let mut inodes = HashMap::new();
            inodes.insert(ROOT_INO, root);
            Self {
                inodes: SpinMutex::new(inodes),
                next_ino: AtomicU64::new(ROOT_INO + 1),
                root_ino: ROOT_INO,
            }
        })
    }

    pub fn root(&self) -> Arc<Vnode> {
        self.get(self.root_ino).expect("root inode always present")
    }

    fn alloc_ino(&self) -> Ino {
        self.next_ino.fetch_add(1, Ordering::Relaxed)
    }

    pub fn alloc_regular(self: &Arc<Self>) -> Arc<Vnode> {
        let ino = self.alloc_ino();
        let v = Vnode::new_regular(ino, Arc::downgrade(self));
        self.inodes.lock().insert(ino, v.clone());
        v
    }

    pub fn alloc_directory(self: &Arc<Self>) -> Arc<Vnode> {
        let ino = self.alloc_ino();
        let v = Vnode::new_directory(ino, Arc::downgrade(self));
        self.inodes.lock().insert(ino, v.clone());
        v
    }

    pub fn alloc_device(self: &Arc<Self>, kind: DeviceKind, vtype: VnodeType) -> Arc<Vnode> {
        let ino = self.alloc_ino();
        let v = Vnode::new_device(ino, kind, vtype, Arc::downgrade(self));
        self.inodes.lock().insert(ino, v.clone());
        v
    }

    /// Returns the interned vnode for `ino`, if this filesystem still knows
    /// about it. Every `lookup`/`create` on a directory goes through this so
    /// two resolutions of the same inode return clones of the same `Arc`.
    pub fn get(&self, ino: Ino) -> Option<Arc<Vnode>> {
        self.inodes.lock().get(&ino).cloned()
    }

    /// Removes `ino` from the interning table. Any `Arc<Vnode>` clone
    /// already held elsewhere (an open file, a process's cwd) keeps the
    /// vnode alive and usable; this only makes future path resolution fail
    /// to find it, matching unlink-while-open semantics.
    pub fn forget(&self, ino: Ino) {
        self.inodes.lock().remove(&ino);
    }
}
