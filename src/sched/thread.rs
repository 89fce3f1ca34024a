// SPDX-License-Identifier: MPL-2.0

//! Thread control blocks.
//!
//! Grounded on `aster-frame::task::Task`/`TaskStatus`: a thread owns its
//! status under a lock, a cancellation flag, and a return value, and is
//! referred to everywhere else by `Arc<Thread>`.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

use spin::Mutex as SpinMutex;

use crate::prelude::*;

/// Monotonically increasing thread id, unique for the process lifetime of the core.
pub type ThreadId = u64;

/// The state machine of §4.1. Transitions are driven only by the scheduler
/// primitives in [`crate::sched::scheduler`], never written directly by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    NoState,
    Runnable,
    OnCpu,
    Sleep,
    SleepCancellable,
    Exited,
}

/// A kernel thread.
///
/// The actual suspension mechanism (the out-of-scope "Context primitive" of
/// §6) is realized here by parking the real OS thread that is running this
/// `Thread`'s body on `cpu_cvar`, gated by the scheduler's single run-queue
/// lock. See `sched::scheduler` for the dispatch loop.
pub struct Thread {
    pub id: ThreadId,
    /// Owning process, set once at creation. A back-reference: not owned.
    pub process: SpinMutex<Option<Weak<crate::process::Process>>>,
    state: SpinMutex<ThreadState>,
    /// The wait channel this thread is parked on, if any.
    pub(crate) wait_channel: SpinMutex<Option<Arc<super::queue::WaitQueue>>>,
    cancelled: AtomicBool,
    retval: AtomicI32,
    preempt_disable_count: AtomicUsize,
    /// Gate used to park/unpark the OS thread backing this kernel thread.
    pub(crate) cpu_gate: Mutex<bool>,
    pub(crate) cpu_cvar: Condvar,
}

impl Thread {
    pub(crate) fn new(id: ThreadId) -> Arc<Self> {
        Arc::new(Self {
            id,
            process: SpinMutex::new(None),
            state: SpinMutex::new(ThreadState::NoState),
            wait_channel: SpinMutex::new(None),
            cancelled: AtomicBool::new(false),
            retval: AtomicI32::new(0),
            preempt_disable_count: AtomicUsize::new(0),
            cpu_gate: Mutex::new(false),
            cpu_cvar: Condvar::new(),
        })
    }

    pub fn state(&self) -> ThreadState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: ThreadState) {
        *self.state.lock() = state;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn set_cancelled(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn retval(&self) -> i32 {
        self.retval.load(Ordering::Acquire)
    }

    pub fn set_retval(&self, v: i32) {
        self.retval.store(v, Ordering::Release);
    }

    /// Disables preemption; a counter rather than a bool since sections nest.
    /// No-op on this single-core cooperative host, kept for fidelity with
    /// the source's preemption-disable discipline.
    pub fn disable_preempt(&self) {
        self.preempt_disable_count.fetch_add(1, Ordering::AcqRel);
    }

    pub fn enable_preempt(&self) {
        let prev = self.preempt_disable_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "preempt count underflow");
    }

    pub fn process(&self) -> Option<Arc<crate::process::Process>> {
        self.process.lock().as_ref().and_then(Weak::upgrade)
    }
}

impl std::fmt::Debug for Thread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}
