// SPDX-License-Identifier: MPL-2.0

//! FIFO queues used as both the run queue and wait channels.
//!
//! Grounded on `aster-frame::task::scheduler::FifoScheduler` (a `VecDeque`
//! behind a lock) and `aster-frame::sync::WaitQueue`: both the run queue and
//! every wait channel in this core are the same type, matching §4.1's "Wait
//! queues are the same FIFO type, addressable as wait channels."

use std::collections::VecDeque;

use spin::Mutex as SpinMutex;

use crate::prelude::*;
use crate::sched::thread::Thread;

/// A FIFO of threads. Used both as the run queue and as arbitrary wait
/// channels (mmap/munmap completions, process death, etc).
#[derive(Default)]
pub struct WaitQueue {
    inner: SpinMutex<VecDeque<Arc<Thread>>>,
}

impl WaitQueue {
    pub const fn new() -> Self {
        Self {
            inner: SpinMutex::new(VecDeque::new()),
        }
    }

    pub(crate) fn push_back(&self, t: Arc<Thread>) {
        self.inner.lock().push_back(t);
    }

    pub(crate) fn pop_front(&self) -> Option<Arc<Thread>> {
        self.inner.lock().pop_front()
    }

    /// Removes a specific thread from the middle of the queue (used by `cancel`).
    pub(crate) fn remove(&self, id: crate::sched::thread::ThreadId) -> bool {
        let mut q = self.inner.lock();
        if let Some(pos) = q.iter().position(|t| t.id == id) {
            q.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }
}
