// SPDX-License-Identifier: MPL-2.0

//! Open-file objects and each process's fixed-size descriptor table.
//!
//! Grounded on `aster-nix::fs::file_table::FileTable`, but deliberately
//! *not* reusing its growable `SlotVec` backing: SPEC_FULL.md's descriptor
//! table is a fixed `NFILES`-slot array per process, matching the source's
//! `proc->p_files[NFILES]`.

use spin::Mutex as SpinMutex;

use crate::config::NFILES;
use crate::error::Errno;
use crate::fs::vnode::Vnode;
use crate::prelude::*;

pub type Fd = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

/// An open-file description: shared by every fd that `dup`/`dup2` fan out
/// from, since they must share one seek position.
pub struct OpenFile {
    pub vnode: Arc<Vnode>,
    pos: SpinMutex<u64>,
    pub readable: bool,
    pub writable: bool,
    pub append: bool,
}

impl OpenFile {
    pub fn new(vnode: Arc<Vnode>, readable: bool, writable: bool, append: bool) -> Arc<Self> {
        Arc::new(Self {
            vnode,
            pos: SpinMutex::new(0),
            readable,
            writable,
            append,
        })
    }

    pub fn pos(&self) -> u64 {
        *self.pos.lock()
    }

    pub fn set_pos(&self, pos: u64) {
        *self.pos.lock() = pos;
    }

    /// Advances the position by `n` bytes, returning the offset it was at
    /// beforehand — the offset the I/O actually happened at.
    pub fn advance(&self, n: u64) -> u64 {
        let mut pos = self.pos.lock();
        let before = *pos;
        *pos += n;
        before
    }

    pub fn seek(&self, whence: Whence, offset: i64) -> Result<u64> {
        let mut pos = self.pos.lock();
        let base: i64 = match whence {
            Whence::Set => 0,
            Whence::Cur => *pos as i64,
            Whence::End => self.vnode.size() as i64,
        };
        let new_pos = base + offset;
        if new_pos < 0 {
            return_errno_with_message!(Errno::EINVAL, "seek would produce a negative offset");
        }
        *pos = new_pos as u64;
        Ok(*pos)
    }
}

/// A process's fixed-size descriptor table.
pub struct FileTable {
    slots: [Option<Arc<OpenFile>>; NFILES],
}

impl FileTable {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    /// Lowest-numbered free slot, scanning low to high.
    pub fn get_empty_fd(&self) -> Result<Fd> {
        self.slots
            .iter()
            .position(|s| s.is_none())
            .map(|i| i as Fd)
            .ok_or_else(|| Error::with_message(Errno::EMFILE, "descriptor table is full"))
    }

    pub fn install(&mut self, fd: Fd, file: Arc<OpenFile>) {
        self.slots[fd as usize] = Some(file);
    }

    pub fn get(&self, fd: Fd) -> Result<Arc<OpenFile>> {
        self.slots
            .get(fd as usize)
            .and_then(|s| s.clone())
            .ok_or_else(|| Error::new(Errno::EBADF))
    }

    pub fn close(&mut self, fd: Fd) -> Result<()> {
        let slot = self
            .slots
            .get_mut(fd as usize)
            .ok_or_else(|| Error::new(Errno::EBADF))?;
        if slot.take().is_none() {
            return_errno!(Errno::EBADF);
        }
        Ok(())
    }

    /// *dup*: lowest free fd at or above `min`.
    pub fn dup(&mut self, fd: Fd, min: Fd) -> Result<Fd> {
        let file = self.get(fd)?;
        let new_fd = ((min as usize)..NFILES)
            .find(|&i| self.slots[i].is_none())
            .ok_or_else(|| Error::with_message(Errno::EMFILE, "descriptor table is full"))? as Fd;
        self.install(new_fd, file);
        Ok(new_fd)
    }

    /// *dup2*: a no-op when `old_fd == new_fd` (and valid); otherwise closes
    /// `new_fd` first if occupied.
    pub fn dup2(&mut self, old_fd: Fd, new_fd: Fd) -> Result<Fd> {
        let file = self.get(old_fd)?;
        if old_fd == new_fd {
            return Ok(new_fd);
        }
        if (new_fd as usize) >= NFILES {
            return_errno!(Errno::EBADF);
        }
        self.slots[new_fd as usize] = Some(file);
        Ok(new_fd)
    }

    /// Deep-copies every occupied slot (sharing the underlying `OpenFile`),
    /// used by fork.
    pub fn fork(&self) -> Self {
        Self {
            slots: std::array::from_fn(|i| self.slots[i].clone()),
        }
    }

    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
    }
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}
