// SPDX-License-Identifier: MPL-2.0

//! Core scheduler, virtual memory, and VFS subsystems of an instructional
//! kernel, plus the process supervisor that ties them together.
//!
//! This crate models a single-core, cooperatively-scheduled kernel. The
//! pieces it deliberately treats as external collaborators — physical page
//! allocation, real page-table plumbing, boot/ACPI/APIC, device driver
//! bodies, the on-disk filesystem format, the ELF loader — are specified
//! only at their interfaces (see `vm::frame` and `fs::device`).

pub mod boot;
pub mod config;
pub mod error;
pub mod fs;
pub mod prelude;
pub mod process;
pub mod sched;
pub mod vm;

/// Serializes tests that touch the global [`sched::SCHEDULER`] or other
/// process-wide singletons. `cargo test` runs tests in parallel by default;
/// this core has exactly one scheduler instance for the lifetime of the
/// process, the same way a booted kernel has exactly one instance for the
/// lifetime of a test session. Every test that spawns kernel threads should
/// take this lock for its duration.
pub mod test_support {
    use std::sync::{Mutex, MutexGuard};

    static LOCK: Mutex<()> = Mutex::new(());

    pub fn serialize() -> MutexGuard<'static, ()> {
        match LOCK.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
