// SPDX-License-Identifier: MPL-2.0

//! The scheduler: run queue management, cooperative switching, cancellable
//! and uninterruptible sleep, broadcast wakeup.
//!
//! Grounded on `aster-frame::task::scheduler` (a `Scheduler` trait dequeuing
//! from a FIFO run queue under a lock) and `aster-frame::sync::wait`
//! (`WaitQueue`/`Waker` flipping a `TaskStatus` and re-enqueuing). The one
//! substitution this core makes, licensed by SPEC_FULL.md §4.1's
//! "Implementation note": the hand-rolled `context_switch` assembly stub is
//! replaced by parking the real OS thread backing each `Thread` on its own
//! condition variable, gated by this module's single run-queue lock, which
//! plays the role of "interrupts masked to HIGH".

use std::cell::RefCell;
use std::thread as os_thread;

use spin::Mutex as SpinMutex;

use crate::error::Errno;
use crate::prelude::*;
use crate::sched::queue::WaitQueue;
use crate::sched::thread::{Thread, ThreadId, ThreadState};

struct Inner {
    run_queue: std::collections::VecDeque<Arc<Thread>>,
    current: Option<Arc<Thread>>,
    next_id: ThreadId,
}

/// The single-core scheduler. One instance per running kernel core; this
/// core spec only models one core (see Non-goals).
pub struct Scheduler {
    inner: SpinMutex<Inner>,
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<Thread>>> = const { RefCell::new(None) };
}

lazy_static::lazy_static! {
    pub static ref SCHEDULER: Scheduler = Scheduler::new();
}

impl Scheduler {
    fn new() -> Self {
        Self {
            inner: SpinMutex::new(Inner {
                run_queue: std::collections::VecDeque::new(),
                current: None,
                next_id: 1,
            }),
        }
    }

    fn alloc_thread_id(&self) -> ThreadId {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        id
    }

    /// Returns the `Thread` backing the calling OS thread.
    ///
    /// Panics if called from an OS thread that was not created through
    /// [`Scheduler::spawn`] — mirroring the source's reliance on a valid
    /// `curthr` always being set once scheduling has begun.
    pub fn current(&self) -> Arc<Thread> {
        CURRENT.with(|c| c.borrow().clone())
            .expect("current() called outside a scheduled thread")
    }

    pub fn try_current(&self) -> Option<Arc<Thread>> {
        CURRENT.with(|c| c.borrow().clone())
    }

    /// Creates a new thread in `NO_STATE` and spawns the OS thread that will
    /// run its body once dispatched. The thread is not runnable until
    /// [`Scheduler::make_runnable`] is called on it.
    pub fn spawn<F>(&self, body: F) -> Arc<Thread>
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.alloc_thread_id();
        let thread = Thread::new(id);
        let handoff = thread.clone();
        os_thread::Builder::new()
            .name(format!("kthread-{id}"))
            .spawn(move || {
                CURRENT.with(|c| *c.borrow_mut() = Some(handoff.clone()));
                self_park_until_dispatched(&handoff);
                body();
                // A thread whose body returns without calling exit_current
                // is treated as having exited with status 0, matching the
                // teacher's `kernel_task_entry` which always calls `exit()`
                // after the task function returns.
                SCHEDULER.exit_current(0);
            })
            .expect("failed to spawn kernel thread");
        thread
    }

    /// *make_runnable(t)*: precondition `t != current`, `t.state != ON_CPU`.
    pub fn make_runnable(&self, t: &Arc<Thread>) {
        let mut inner = self.inner.lock();
        if let Some(cur) = &inner.current {
            debug_assert_ne!(cur.id, t.id, "cannot make the current thread runnable");
        }
        debug_assert_ne!(t.state(), ThreadState::OnCpu);
        t.set_state(ThreadState::Runnable);
        *t.wait_channel.lock() = None;
        inner.run_queue.push_back(t.clone());
        self.kick_idle(&mut inner);
    }

    /// *yield()*: precondition current is ON_CPU.
    pub fn yield_now(&self) {
        let current = self.current();
        {
            let mut inner = self.inner.lock();
            debug_assert_eq!(current.state(), ThreadState::OnCpu);
            current.set_state(ThreadState::Runnable);
            self.switch_locked(&mut inner, current.clone(), Deposit::RunQueue);
        }
        self.park_until_current(&current);
    }

    /// *sleep_on(q)* (uninterruptible).
    pub fn sleep_on(&self, q: &Arc<WaitQueue>) {
        let current = self.current();
        {
            let mut inner = self.inner.lock();
            current.set_state(ThreadState::Sleep);
            *current.wait_channel.lock() = Some(q.clone());
            self.switch_locked(&mut inner, current.clone(), Deposit::Queue(q.clone()));
        }
        self.park_until_current(&current);
    }

    /// *cancellable_sleep_on(q)*.
    pub fn cancellable_sleep_on(&self, q: &Arc<WaitQueue>) -> Result<()> {
        let current = self.current();
        if current.is_cancelled() {
            return_errno!(Errno::EINTR);
        }
        {
            let mut inner = self.inner.lock();
            current.set_state(ThreadState::SleepCancellable);
            *current.wait_channel.lock() = Some(q.clone());
            self.switch_locked(&mut inner, current.clone(), Deposit::Queue(q.clone()));
        }
        self.park_until_current(&current);
        if current.is_cancelled() {
            return_errno!(Errno::EINTR);
        }
        Ok(())
    }

    /// *wakeup_on(q, out)*: dequeue one, make it runnable.
    pub fn wakeup_on(&self, q: &WaitQueue) -> Option<Arc<Thread>> {
        let woken = q.pop_front()?;
        self.make_runnable(&woken);
        Some(woken)
    }

    /// *broadcast_on(q)*: repeatedly wakeup until empty.
    pub fn broadcast_on(&self, q: &WaitQueue) {
        while self.wakeup_on(q).is_some() {}
    }

    /// *cancel(t)*: never touches an uninterruptible sleeper.
    pub fn cancel(&self, t: &Arc<Thread>) {
        t.set_cancelled();
        if t.state() == ThreadState::SleepCancellable {
            let channel = t.wait_channel.lock().clone();
            if let Some(q) = channel {
                if q.remove(t.id) {
                    self.make_runnable(t);
                }
            }
        }
    }

    /// Marks the calling thread `Exited` with `retval` and switches away
    /// with no deposit target. Never returns.
    pub fn exit_current(&self, retval: i32) -> ! {
        let current = self.current();
        current.set_retval(retval);
        let mut inner = self.inner.lock();
        current.set_state(ThreadState::Exited);
        self.switch_locked(&mut inner, current.clone(), Deposit::None);
        drop(inner);
        // This OS thread's kernel thread has exited; it must never be
        // dispatched again, so there is nothing left to park for.
        loop {
            std::thread::park();
        }
    }

    /// If the core is idle (nobody ON_CPU) and the run queue is non-empty,
    /// immediately dispatch — the moral equivalent of an interrupt waking a
    /// halted core.
    fn kick_idle(&self, inner: &mut Inner) {
        if inner.current.is_none() {
            if let Some(next) = inner.run_queue.pop_front() {
                next.set_state(ThreadState::OnCpu);
                inner.current = Some(next.clone());
                arm(&next);
            }
        }
    }

    /// Core switch primitive: deposits `outgoing` per `deposit`, then picks
    /// the next runnable thread (if any) and arms it.
    fn switch_locked(&self, inner: &mut Inner, outgoing: Arc<Thread>, deposit: Deposit) {
        match deposit {
            Deposit::RunQueue => inner.run_queue.push_back(outgoing.clone()),
            Deposit::Queue(q) => q.push_back(outgoing.clone()),
            Deposit::None => {}
        }
        if inner.current.as_ref().map(|c| c.id) == Some(outgoing.id) {
            inner.current = None;
        }
        if let Some(next) = inner.run_queue.pop_front() {
            next.set_state(ThreadState::OnCpu);
            inner.current = Some(next.clone());
            arm(&next);
        }
    }

    fn park_until_current(&self, t: &Arc<Thread>) {
        self_park_until_dispatched(t);
    }
}

enum Deposit {
    RunQueue,
    Queue(Arc<WaitQueue>),
    None,
}

fn arm(t: &Arc<Thread>) {
    let mut gate = t.cpu_gate.lock().unwrap();
    *gate = true;
    t.cpu_cvar.notify_one();
}

fn self_park_until_dispatched(t: &Arc<Thread>) {
    let mut gate = t.cpu_gate.lock().unwrap();
    while !*gate {
        gate = t.cpu_cvar.wait(gate).unwrap();
    }
    *gate = false;
}
