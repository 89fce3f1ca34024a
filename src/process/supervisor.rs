// SPDX-License-Identifier: MPL-2.0

//! Ties the scheduler, virtual memory, and VFS together: process creation,
//! fork, exit, reaping, and kill.
//!
//! Grounded on `aster-nix::process::{process_table, exit}` (a global pid →
//! process map, reparenting to a recorded init process on exit, waking the
//! parent's exit `WaitQueue`).

use std::collections::HashMap;

use spin::Mutex as SpinMutex;

use crate::config::{IDLE_PID, INIT_PID, MAX_PID, SEGV_EXIT_STATUS};
use crate::error::Errno;
use crate::fs::Vnode;
use crate::prelude::*;
use crate::process::process::{Pid, ProcState, Process};
use crate::sched::SCHEDULER;
use crate::vm::vmarea::VmArea;
use crate::vm::{FaultCause, Mobj};

struct Table {
    by_pid: HashMap<Pid, Arc<Process>>,
    next_pid: Pid,
    idle: Option<Arc<Process>>,
    init: Option<Arc<Process>>,
}

lazy_static::lazy_static! {
    static ref TABLE: SpinMutex<Table> = SpinMutex::new(Table {
        by_pid: HashMap::new(),
        next_pid: INIT_PID + 1,
        idle: None,
        init: None,
    });
}

fn alloc_pid(table: &mut Table) -> Pid {
    loop {
        let pid = table.next_pid;
        table.next_pid = if pid + 1 >= MAX_PID { INIT_PID + 1 } else { pid + 1 };
        if !table.by_pid.contains_key(&pid) {
            return pid;
        }
    }
}

pub fn idle_process() -> Arc<Process> {
    TABLE.lock().idle.clone().expect("idle process not yet bootstrapped")
}

pub fn init_process() -> Arc<Process> {
    TABLE.lock().init.clone().expect("init process not yet bootstrapped")
}

pub fn lookup(pid: Pid) -> Option<Arc<Process>> {
    TABLE.lock().by_pid.get(&pid).cloned()
}

/// Creates a fresh process with no parent and a brand-new (empty) address
/// space — used only for the two processes bootstrap creates directly
/// (idle, init); every other process comes from [`fork`].
fn spawn_root_process(name: &str, pid: Pid, root: Arc<Vnode>) -> Arc<Process> {
    let proc = Process::new(pid, name, root);
    let mut table = TABLE.lock();
    table.by_pid.insert(pid, proc.clone());
    proc
}

/// Boots the process subsystem: creates the reserved idle (pid 0) and init
/// (pid 1) processes, records init as the global init process, and starts
/// both running `body_idle`/`body_init`. Returns `(idle, init)`.
pub fn bootstrap<FIdle, FInit>(root: Arc<Vnode>, body_idle: FIdle, body_init: FInit) -> (Arc<Process>, Arc<Process>)
where
    FIdle: FnOnce() + Send + 'static,
    FInit: FnOnce() + Send + 'static,
{
    let idle = spawn_root_process("idle", IDLE_PID, root.clone());
    let init = spawn_root_process("init", INIT_PID, root);
    init.set_parent(&idle);
    idle.add_child(init.clone());
    {
        let mut table = TABLE.lock();
        table.idle = Some(idle.clone());
        table.init = Some(init.clone());
    }

    let idle_thread = SCHEDULER.spawn(exit_wrapper(idle.clone(), body_idle));
    idle.set_thread(idle_thread.clone());
    bind_thread_to_process(&idle_thread, &idle);

    let init_thread = SCHEDULER.spawn(exit_wrapper(init.clone(), body_init));
    init.set_thread(init_thread.clone());
    bind_thread_to_process(&init_thread, &init);

    SCHEDULER.make_runnable(&init_thread);
    SCHEDULER.make_runnable(&idle_thread);

    (idle, init)
}

fn bind_thread_to_process(t: &Arc<crate::sched::Thread>, p: &Arc<Process>) {
    *t.process.lock() = Some(Arc::downgrade(p));
}

/// Every process's one thread implicitly calls `exit()` when its body
/// function returns, exactly as a real thread returning from its entry point
/// falls through to a trailing `do_exit()` — this is that fallthrough at the
/// process level, wrapping [`Scheduler::spawn`]'s own thread-level one.
fn exit_wrapper(proc: Arc<Process>, body: impl FnOnce() + Send + 'static) -> impl FnOnce() + Send + 'static {
    move || {
        body();
        thread_exit(&proc, 0);
    }
}

/// *create/fork*: clones `parent`'s address space with copy-on-write,
/// duplicates its open files, inherits its cwd, and spawns `child_body` as
/// the child's single thread. Returns the child's pid — the "parent's
/// fork() returns the child pid" half of SPEC_FULL.md's fork decision; the
/// child's own "fork() returns 0" half is realized by `child_body` simply
/// being a fresh closure, per that same decision.
pub fn fork(parent: &Arc<Process>, child_body: impl FnOnce() + Send + 'static) -> Pid {
    let pid = alloc_pid(&mut TABLE.lock());
    let child = Process::new(pid, parent.name(), parent.cwd());
    child.set_parent(parent);
    parent.add_child(child.clone());

    *child.files.lock() = parent.files.lock().fork();

    {
        let mut parent_vm = parent.vm.lock();
        let mut child_areas = Vec::new();
        let mut parent_areas = Vec::new();
        for a in parent_vm.clone_areas() {
            if a.is_private() {
                let parent_shadow = Mobj::new_shadow(&a.mobj);
                let child_shadow = Mobj::new_shadow(&a.mobj);
                let (start, end) = (a.start, a.end);
                parent_areas.push(VmArea::new(start, end, a.page_off, a.prot, a.flags, parent_shadow));
                child_areas.push(VmArea::new(start, end, a.page_off, a.prot, a.flags, child_shadow));
                let page_size = crate::config::PAGE_SIZE;
                parent.page_table.unmap_range(start as usize * page_size, end as usize * page_size);
            } else {
                parent_areas.push(VmArea::new(a.start, a.end, a.page_off, a.prot, a.flags, a.mobj.clone()));
                child_areas.push(VmArea::new(a.start, a.end, a.page_off, a.prot, a.flags, a.mobj));
            }
        }
        parent_vm.replace_areas(parent_areas);
        child.vm.lock().replace_areas(child_areas);
    }

    TABLE.lock().by_pid.insert(pid, child.clone());

    let thread = SCHEDULER.spawn(exit_wrapper(child.clone(), child_body));
    child.set_thread(thread.clone());
    bind_thread_to_process(&thread, &child);
    SCHEDULER.make_runnable(&thread);

    pid
}

/// *thread_exit*: terminal — never returns, the calling thread ends up
/// `Exited` inside [`crate::sched::Scheduler::exit_current`].
pub fn thread_exit(proc: &Arc<Process>, status: i32) -> ! {
    proc.mark_dead(status);

    if let Some(parent) = proc.parent() {
        if !Arc::ptr_eq(&parent, proc) {
            let init = init_process();
            if Arc::ptr_eq(proc, &init) {
                // Init exiting is a system-shutdown event in a real kernel;
                // out of scope for this core (see SPEC_FULL.md's boot
                // sequence, which has no analogous teardown path). Children
                // are still reparented to idle so `waitpid` bookkeeping
                // stays consistent if callers keep running after this.
                proc.reparent_children_to(&idle_process());
            } else {
                proc.reparent_children_to(&init);
            }
            proc.files.lock().clear();
            proc.release_cwd();
            SCHEDULER.broadcast_on(&parent.wait_queue);
        }
    }

    SCHEDULER.exit_current(status);
}

/// *waitpid(pid, options)*. `options` must be `0`; only `pid > 0` (a direct
/// child) and `pid == -1` (any child) are supported.
pub fn waitpid(parent: &Arc<Process>, pid: Pid, options: i32) -> Result<(Pid, i32)> {
    if options != 0 {
        return_errno_with_message!(Errno::ENOTSUP, "waitpid options are not supported");
    }
    if pid == 0 || pid <= -2 {
        return_errno_with_message!(Errno::ENOTSUP, "waitpid only supports pid > 0 or pid == -1");
    }

    loop {
        if pid > 0 {
            let child = parent
                .children()
                .into_iter()
                .find(|c| c.pid == pid)
                .ok_or_else(|| Error::new(Errno::ECHILD))?;
            if child.state() == ProcState::Dead {
                return Ok(reap(parent, pid));
            }
        } else {
            let children = parent.children();
            if children.is_empty() {
                return_errno!(Errno::ECHILD);
            }
            if let Some(dead) = children.into_iter().find(|c| c.state() == ProcState::Dead) {
                return Ok(reap(parent, dead.pid));
            }
        }
        SCHEDULER.sleep_on(&parent.wait_queue);
    }
}

fn reap(parent: &Arc<Process>, pid: Pid) -> (Pid, i32) {
    let child = parent.remove_child(pid).expect("reaped pid must be a child");
    let status = child.exit_status();
    TABLE.lock().by_pid.remove(&pid);
    (pid, status)
}

/// *exit(status)*: called by the currently running thread itself, e.g. from
/// a syscall handler, rather than by a supervisor caller holding the
/// process's `Arc` already. Looks up the calling thread's own process.
pub fn exit_process(status: i32) -> ! {
    let proc = SCHEDULER
        .current()
        .process()
        .expect("exit() called by a thread with no owning process");
    thread_exit(&proc, status)
}

/// *handle_user_fault(vaddr, cause)*: resolves a page fault against the
/// calling thread's own process. On success returns normally so the faulting
/// access can be retried. On failure — no vmarea, permission mismatch,
/// pframe acquisition error — terminates the calling thread's process with a
/// segfault status and never returns, per SPEC_FULL.md §4.2/§7's "fatal user
/// faults ... terminate the faulting process with a segfault status".
pub fn handle_user_fault(vaddr: usize, cause: FaultCause) {
    let proc = SCHEDULER
        .current()
        .process()
        .expect("page fault in a thread with no owning process");
    let result = {
        let space = proc.vm.lock();
        crate::vm::handle_page_fault(&space, &proc.page_table, vaddr, cause)
    };
    if result.is_err() {
        thread_exit(&proc, SEGV_EXIT_STATUS);
    }
}

/// *kill(p, status)*: cancels every thread of `p` (one, in this core) with
/// `status` as its retval.
pub fn kill(p: &Arc<Process>, status: i32) {
    if let Some(t) = p.thread() {
        t.set_retval(status);
        SCHEDULER.cancel(&t);
    }
}

/// *kill_all*: cancels every process but the caller and init, then exits the
/// caller with status `-1`. Never returns.
pub fn kill_all(caller: &Arc<Process>) -> ! {
    let idle = idle_process();
    let victims: Vec<Arc<Process>> = TABLE
        .lock()
        .by_pid
        .values()
        .filter(|p| !Arc::ptr_eq(p, caller))
        .filter(|p| !p.parent().is_some_and(|pp| Arc::ptr_eq(&pp, &idle)))
        .cloned()
        .collect();
    for victim in victims {
        kill(&victim, -1);
    }
    thread_exit(caller, -1);
}
