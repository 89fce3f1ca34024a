//! End-to-end scenarios exercising the scheduler, VM, and VFS together
//! through the public `boot`/`process`/`fs` surface, rather than any one
//! module in isolation.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nucleus_core::fs::{syscall, OpenFlags};
use nucleus_core::process::{self, Pid};
use nucleus_core::sched::SCHEDULER;

fn settle() {
    std::thread::sleep(Duration::from_millis(30));
}

fn idle_loop() {
    loop {
        SCHEDULER.yield_now();
    }
}

#[test]
fn boot_fork_exit_wait_roundtrip() {
    let _g = nucleus_core::test_support::serialize();
    let (_idle, init) = nucleus_core::boot::init(idle_loop, idle_loop);
    settle();

    let root = init.cwd();
    let ran: Arc<AtomicI32> = Arc::new(AtomicI32::new(0));
    let ran2 = ran.clone();
    let child_pid: Pid = process::fork(&init, move || {
        ran2.store(1, Ordering::SeqCst);
    });
    settle();
    assert_eq!(ran.load(Ordering::SeqCst), 1);

    let (reaped, status) = process::waitpid(&init, child_pid, 0).unwrap();
    assert_eq!(reaped, child_pid);
    assert_eq!(status, 0);
    assert!(process::lookup(child_pid).is_none());

    // the root filesystem and its device nodes survive the whole exercise
    let mut files = nucleus_core::fs::FileTable::new();
    let fd = syscall::open(&root, &root, &mut files, "/dev/null", OpenFlags::O_WRONLY, None).unwrap();
    assert_eq!(syscall::write(&files, fd, b"discarded").unwrap(), 9);
}

#[test]
fn path_resolution_relative_and_absolute_agree() {
    let _g = nucleus_core::test_support::serialize();
    let (_idle, init) = nucleus_core::boot::init(idle_loop, idle_loop);
    settle();

    let root = init.cwd();
    syscall::mkdir(&root, &root, "a").unwrap();
    syscall::mkdir(&root, &root, "a/b").unwrap();

    let mut cwd = root.clone();
    syscall::chdir(&root, &mut cwd, "a/b").unwrap();

    let via_relative = syscall::stat(&root, &cwd, "..").unwrap();
    let via_absolute = syscall::stat(&root, &root, "a").unwrap();
    assert_eq!(via_relative.ino, via_absolute.ino);

    let back_to_root = syscall::stat(&root, &cwd, "../..").unwrap();
    assert_eq!(back_to_root.ino, root.stat().ino);
}

#[test]
fn unlink_of_directory_is_rejected() {
    let _g = nucleus_core::test_support::serialize();
    let (_idle, init) = nucleus_core::boot::init(idle_loop, idle_loop);
    settle();

    let root = init.cwd();
    syscall::mkdir(&root, &root, "d").unwrap();
    let err = syscall::unlink(&root, &root, "d").unwrap_err();
    assert_eq!(err.errno(), nucleus_core::error::Errno::EPERM);
    syscall::rmdir(&root, &root, "d").unwrap();
}

#[test]
fn fork_gives_child_a_copy_on_write_address_space() {
    let _g = nucleus_core::test_support::serialize();
    let (_idle, init) = nucleus_core::boot::init(idle_loop, idle_loop);
    settle();

    // carve out a heap in init's own address space before forking from it
    let heap_start = nucleus_core::config::DEFAULT_START_BRK as u64;
    {
        let mut vm = init.vm.lock();
        vm.brk(Some(heap_start + 0x1000)).unwrap();
        vm.write(heap_start, b"parent").unwrap();
    }

    let child_pid = process::fork(&init, || {
        settle();
    });
    let child = process::lookup(child_pid).unwrap();

    {
        let mut child_vm = child.vm.lock();
        let mut buf = [0u8; 6];
        child_vm.read(heap_start, &mut buf).unwrap();
        assert_eq!(&buf, b"parent", "child inherits the parent's pre-fork contents");

        child_vm.write(heap_start, b"CHILD!").unwrap();
    }

    let mut parent_buf = [0u8; 6];
    init.vm.lock().read(heap_start, &mut parent_buf).unwrap();
    assert_eq!(&parent_buf, b"parent", "parent's page is untouched by the child's write");

    process::waitpid(&init, child_pid, 0).unwrap();
}
