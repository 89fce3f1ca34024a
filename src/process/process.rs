// SPDX-License-Identifier: MPL-2.0

//! Process control blocks.
//!
//! Grounded on `aster-nix::process::Process` (pid, parent/children, a
//! `ProcessVm`, a `FileTable`, a `fs::ResolvePath`-style cwd, all behind
//! locks reachable from a global process table), narrowed to this core's
//! one-thread-per-process model (see SPEC_FULL.md's Non-goals).

use spin::Mutex as SpinMutex;

use crate::config::NAME_LEN;
use crate::fs::{FileTable, Vnode};
use crate::prelude::*;
use crate::sched::{Thread, WaitQueue};
use crate::vm::{AddressSpace, SoftPageTable};

pub type Pid = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Running,
    Dead,
}

/// A process: owner of its thread, address space, descriptor table, and
/// cwd. The back-reference to its parent is non-owning, per SPEC_FULL.md's
/// "Cyclic references" note — ownership flows parent → children only.
pub struct Process {
    pub pid: Pid,
    pub name: [u8; NAME_LEN],
    pub name_len: usize,
    parent: SpinMutex<Option<Weak<Process>>>,
    children: SpinMutex<Vec<Arc<Process>>>,
    thread: SpinMutex<Option<Arc<Thread>>>,
    state: SpinMutex<ProcState>,
    exit_status: std::sync::atomic::AtomicI32,
    /// Threads sleeping in `waitpid` for one of this process's children.
    pub wait_queue: Arc<WaitQueue>,
    pub vm: SpinMutex<AddressSpace>,
    pub page_table: SoftPageTable,
    pub files: SpinMutex<FileTable>,
    cwd: SpinMutex<Option<Arc<Vnode>>>,
}

impl Process {
    pub fn new(pid: Pid, name: &str, cwd: Arc<Vnode>) -> Arc<Self> {
        let mut name_buf = [0u8; NAME_LEN];
        let bytes = name.as_bytes();
        let n = bytes.len().min(NAME_LEN);
        name_buf[..n].copy_from_slice(&bytes[..n]);
        Arc::new(Self {
            pid,
            name: name_buf,
            name_len: n,
            parent: SpinMutex::new(None),
            children: SpinMutex::new(Vec::new()),
            thread: SpinMutex::new(None),
            state: SpinMutex::new(ProcState::Running),
            exit_status: std::sync::atomic::AtomicI32::new(0),
            wait_queue: Arc::new(WaitQueue::new()),
            vm: SpinMutex::new(AddressSpace::new()),
            page_table: SoftPageTable::new(),
            files: SpinMutex::new(FileTable::new()),
            cwd: SpinMutex::new(Some(cwd)),
        })
    }

    /// The current working directory. Panics if called after
    /// [`Process::release_cwd`] — i.e. on an already-exited process, which
    /// no live code path should be consulting for a path lookup.
    pub fn cwd(&self) -> Arc<Vnode> {
        self.cwd
            .lock()
            .clone()
            .expect("cwd accessed after release_cwd")
    }

    pub(crate) fn set_cwd(&self, v: Arc<Vnode>) {
        *self.cwd.lock() = Some(v);
    }

    pub(crate) fn release_cwd(&self) {
        *self.cwd.lock() = None;
    }

    pub fn name(&self) -> &str {
        std::str::from_utf8(&self.name[..self.name_len]).unwrap_or("<invalid>")
    }

    pub fn parent(&self) -> Option<Arc<Process>> {
        self.parent.lock().as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn set_parent(&self, parent: &Arc<Process>) {
        *self.parent.lock() = Some(Arc::downgrade(parent));
    }

    pub fn children(&self) -> Vec<Arc<Process>> {
        self.children.lock().clone()
    }

    pub(crate) fn add_child(&self, child: Arc<Process>) {
        self.children.lock().push(child);
    }

    pub(crate) fn remove_child(&self, pid: Pid) -> Option<Arc<Process>> {
        let mut children = self.children.lock();
        let pos = children.iter().position(|c| c.pid == pid)?;
        Some(children.remove(pos))
    }

    pub(crate) fn reparent_children_to(&self, new_parent: &Arc<Process>) {
        let mut children = self.children.lock();
        for child in children.drain(..) {
            child.set_parent(new_parent);
            new_parent.add_child(child);
        }
    }

    pub fn thread(&self) -> Option<Arc<Thread>> {
        self.thread.lock().clone()
    }

    pub(crate) fn set_thread(&self, t: Arc<Thread>) {
        *self.thread.lock() = Some(t);
    }

    pub fn state(&self) -> ProcState {
        *self.state.lock()
    }

    pub(crate) fn mark_dead(&self, status: i32) {
        *self.state.lock() = ProcState::Dead;
        self.exit_status.store(status, std::sync::atomic::Ordering::Release);
    }

    pub fn exit_status(&self) -> i32 {
        self.exit_status.load(std::sync::atomic::Ordering::Acquire)
    }
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}
