// SPDX-License-Identifier: MPL-2.0

//! The process supervisor (§4.4): process control blocks plus fork, exit,
//! wait, and kill, tying the scheduler, VM, and VFS together.

pub mod process;
pub mod supervisor;

pub use process::{Pid, ProcState, Process};
pub use supervisor::{
    bootstrap, exit_process, fork, handle_user_fault, idle_process, init_process, kill, kill_all, lookup, thread_exit,
    waitpid,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::RamFs;
    use crate::sched::SCHEDULER;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc as StdArc;
    use std::time::Duration;

    fn settle() {
        std::thread::sleep(Duration::from_millis(30));
    }

    #[test]
    fn fork_exit_and_wait() {
        let _g = crate::test_support::serialize();
        let fs = RamFs::new();
        let root = fs.root();
        let (_idle, init) = bootstrap(root, || loop { SCHEDULER.yield_now() }, || loop {
            SCHEDULER.yield_now()
        });
        settle();

        let child_ran = StdArc::new(AtomicI32::new(0));
        let child_ran2 = child_ran.clone();
        let child_pid = fork(&init, move || {
            child_ran2.store(1, Ordering::SeqCst);
        });
        settle();
        assert_eq!(child_ran.load(Ordering::SeqCst), 1);

        let (reaped_pid, status) = waitpid(&init, child_pid, 0).unwrap();
        assert_eq!(reaped_pid, child_pid);
        assert_eq!(status, 0);
        assert!(lookup(child_pid).is_none(), "reaped child must leave the process table");
    }

    #[test]
    fn orphan_reparented_to_init() {
        let _g = crate::test_support::serialize();
        let fs = RamFs::new();
        let root = fs.root();
        let (_idle, init) = bootstrap(root, || loop { SCHEDULER.yield_now() }, || loop {
            SCHEDULER.yield_now()
        });
        settle();

        let mid_pid = fork(&init, move || {
            // Exits immediately without ever forking or waiting on anyone;
            // its own (nonexistent) children are the subject of this test,
            // so this body just needs to outlive `grandchild`'s fork call.
            settle();
        });
        let mid = lookup(mid_pid).unwrap();
        let grandchild_pid = fork(&mid, || {});
        settle();

        // `mid` has exited by now; its one child should have been
        // reparented to init.
        let reparented = init
            .children()
            .into_iter()
            .any(|c| c.pid == grandchild_pid);
        assert!(reparented, "grandchild should be reparented to init after mid exits");

        waitpid(&init, grandchild_pid, 0).unwrap();
    }

    #[test]
    fn unresolved_user_fault_kills_the_faulting_process_with_segfault_status() {
        let _g = crate::test_support::serialize();
        let fs = RamFs::new();
        let root = fs.root();
        let (_idle, init) = bootstrap(root, || loop { SCHEDULER.yield_now() }, || loop {
            SCHEDULER.yield_now()
        });
        settle();

        let child_pid = fork(&init, || {
            // No vmarea covers this address: the fault cannot be resolved,
            // so `handle_user_fault` must kill this process instead of
            // returning here.
            crate::process::handle_user_fault(0, crate::vm::FaultCause::empty());
            unreachable!("handle_user_fault must not return on a fatal fault");
        });
        let (reaped_pid, status) = waitpid(&init, child_pid, 0).unwrap();
        assert_eq!(reaped_pid, child_pid);
        assert_eq!(status, crate::config::SEGV_EXIT_STATUS);
    }
}
