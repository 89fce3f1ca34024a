// SPDX-License-Identifier: MPL-2.0

//! Staged boot sequence (§6). The real subsystem order — debug, interrupts,
//! page, pagetable, ACPI, APIC, per-core, slab, pframe cache, pci, vga,
//! anon-mobj, shadow-mobj, address-space, process, thread, char-dev,
//! block-dev, kshell, file, pipe, syscall, elf, idle-process init, btree —
//! collapses here to the stages this core actually models: logging, the
//! root filesystem and its device nodes, and the process supervisor,
//! brought up in that relative order and handed off to the idle loop,
//! mirroring the teacher's staged `component`-based boot in `aster-nix`.

use std::sync::Once;

use crate::fs::{syscall, DeviceKind, RamFs, Vnode, VnodeType};
use crate::prelude::*;
use crate::process::Process;

/// Number of tty minors and hda (disk) minors init registers as
/// driver-less placeholders, per SPEC_FULL.md's device node layout.
const TTY_COUNT: u32 = 4;
const HDA_COUNT: u32 = 2;

const TTY_MAJOR: u32 = 4;
const HDA_MAJOR: u32 = 3;

static LOGGING: Once = Once::new();

/// Installs the `log` backend exactly once, matching the teacher's `debug`
/// boot stage. Safe to call from multiple bootstraps (tests each boot their
/// own filesystem and process pair, but share one process-wide logger).
fn init_logging() {
    LOGGING.call_once(|| {
        let _ = env_logger::try_init();
    });
}

/// Lays down `/dev` with `/dev/null`, `/dev/zero`, and the tty/hda
/// placeholder nodes described in SPEC_FULL.md's device node layout, through
/// the same `syscall::mkdir`/`syscall::mknod` entry points a userspace
/// `mknod(2)` call would use — there is no privileged shortcut around the
/// public VFS syscall surface, even at boot.
fn populate_dev(root: &Arc<Vnode>) {
    syscall::mkdir(root, root, "dev").expect("fresh root has no /dev yet");
    syscall::mknod(root, root, "dev/null", DeviceKind::Null, VnodeType::CharDevice)
        .expect("fresh /dev has no null yet");
    syscall::mknod(root, root, "dev/zero", DeviceKind::Zero, VnodeType::CharDevice)
        .expect("fresh /dev has no zero yet");
    for minor in 0..TTY_COUNT {
        let path = format!("dev/tty{minor}");
        syscall::mknod(
            root,
            root,
            &path,
            DeviceKind::Placeholder {
                major: TTY_MAJOR,
                minor,
            },
            VnodeType::CharDevice,
        )
        .expect("fresh /dev has no tty nodes yet");
    }
    for minor in 0..HDA_COUNT {
        let path = format!("dev/hda{minor}");
        syscall::mknod(
            root,
            root,
            &path,
            DeviceKind::Placeholder {
                major: HDA_MAJOR,
                minor,
            },
            VnodeType::BlockDevice,
        )
        .expect("fresh /dev has no hda nodes yet");
    }
    debug!("populated /dev with null, zero, {TTY_COUNT} tty nodes, {HDA_COUNT} hda nodes");
}

/// Brings up logging, the root ramfs plus its device nodes, and the process
/// supervisor, then starts `idle_body`/`init_body` running as the idle and
/// init processes. Returns `(idle, init)`, matching the source's "init
/// process is created and made runnable, then the idle loop takes over" —
/// modeled here by handing both bodies to [`crate::process::bootstrap`]
/// rather than literally blocking the calling thread on an idle loop.
pub fn init<FIdle, FInit>(idle_body: FIdle, init_body: FInit) -> (Arc<Process>, Arc<Process>)
where
    FIdle: FnOnce() + Send + 'static,
    FInit: FnOnce() + Send + 'static,
{
    init_logging();
    info!("booting nucleus-core");

    let fs = RamFs::new();
    let root = fs.root();
    populate_dev(&root);
    info!("root filesystem ready");

    let (idle, init) = crate::process::bootstrap(root, idle_body, init_body);
    info!("process supervisor ready: idle={}, init={}", idle.pid, init.pid);
    (idle, init)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::OpenFlags;
    use crate::sched::SCHEDULER;

    #[test]
    fn boot_populates_dev_and_starts_init() {
        let _g = crate::test_support::serialize();
        let (_idle, init) = init(|| loop { SCHEDULER.yield_now() }, || loop {
            SCHEDULER.yield_now()
        });
        let root = init.cwd();

        let dev = root.lookup("dev").unwrap();
        assert!(dev.is_dir());
        let null = dev.lookup("null").unwrap();
        assert_eq!(null.vtype, VnodeType::CharDevice);
        let tty0 = dev.lookup("tty0").unwrap();
        assert_eq!(tty0.vtype, VnodeType::CharDevice);
        let hda0 = dev.lookup("hda0").unwrap();
        assert_eq!(hda0.vtype, VnodeType::BlockDevice);

        let mut files = crate::fs::FileTable::new();
        let fd = syscall::open(&root, &root, &mut files, "/dev/zero", OpenFlags::O_RDONLY, None).unwrap();
        let mut buf = [0xffu8; 16];
        let n = syscall::read(&files, fd, &mut buf).unwrap();
        assert_eq!(n, 16);
        assert_eq!(buf, [0u8; 16]);

        let tty_fd = syscall::open(&root, &root, &mut files, "/dev/tty0", OpenFlags::O_RDONLY, None).unwrap();
        assert!(syscall::read(&files, tty_fd, &mut [0u8; 1]).is_err());
    }
}
