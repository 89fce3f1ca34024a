// SPDX-License-Identifier: MPL-2.0

//! Page-fault resolution and the page-table stand-in it drives.
//!
//! Real page-table plumbing and TLB shootdown are out-of-scope collaborators
//! (SPEC_FULL.md §4.2's "Deliberately out of scope"); `SoftPageTable` is the
//! minimal in-memory stand-in this core needs so the fault path can be
//! exercised end to end without real hardware, grounded on the same
//! `PageFaultHandler` trait shape `aster-nix::vm::page_fault_handler` uses.

use std::collections::HashMap;

use bitflags::bitflags;
use spin::Mutex as SpinMutex;

use crate::config::page_align_down;
use crate::error::Errno;
use crate::prelude::*;
use crate::vm::address_space::AddressSpace;
use crate::vm::vmarea::Prot;

bitflags! {
    pub struct FaultCause: u8 {
        const USER  = 0b001;
        const WRITE = 0b010;
        const EXEC  = 0b100;
    }
}

/// A trace of `(vaddr, writable)` mappings installed by the fault handler.
/// Stands in for the hardware page table and its TLB.
#[derive(Default)]
pub struct SoftPageTable {
    mappings: SpinMutex<HashMap<usize, bool>>,
}

impl SoftPageTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map(&self, vaddr: usize, writable: bool) {
        self.mappings.lock().insert(page_align_down(vaddr), writable);
    }

    pub fn unmap_range(&self, start_vaddr: usize, end_vaddr: usize) {
        let mut m = self.mappings.lock();
        m.retain(|&va, _| va < start_vaddr || va >= end_vaddr);
    }

    pub fn is_mapped(&self, vaddr: usize) -> bool {
        self.mappings.lock().contains_key(&page_align_down(vaddr))
    }

    pub fn is_writable(&self, vaddr: usize) -> bool {
        self.mappings
            .lock()
            .get(&page_align_down(vaddr))
            .copied()
            .unwrap_or(false)
    }

    /// Flushing the TLB for one page is a no-op stand-in; the mapping table
    /// above already reflects the current state immediately.
    pub fn flush(&self, _vaddr: usize) {}

    pub fn flush_range(&self, _start: usize, _end: usize) {}
}

/// *Pagefault handling*: resolves `(vaddr, cause)` against `space`, installs
/// a mapping in `table` on success. Returns `Err` (segfault) on any of: no
/// vmarea, permission mismatch, or pframe acquisition failure — the caller
/// is expected to kill the faulting process in that case.
pub fn handle_page_fault(space: &AddressSpace, table: &SoftPageTable, vaddr: usize, cause: FaultCause) -> Result<()> {
    let vfn = (vaddr / crate::config::PAGE_SIZE) as u64;
    let vma = space
        .lookup(vfn)
        .ok_or_else(|| Error::with_message(Errno::EFAULT, "no vmarea covers the faulting address"))?;

    let mut required = Prot::empty();
    if cause.contains(FaultCause::WRITE) {
        required |= Prot::WRITE;
    }
    if cause.contains(FaultCause::EXEC) {
        required |= Prot::EXEC;
    }
    if required.is_empty() {
        required = Prot::READ;
    }
    if !vma.prot.contains(required) {
        return_errno_with_message!(Errno::EACCES, "fault cause not permitted by vmarea protection");
    }

    let forwrite = cause.contains(FaultCause::WRITE);
    let pagenum = vma.object_pagenum(vfn);
    vma.mobj.get_pframe(pagenum, forwrite)?;

    let page_addr = page_align_down(vaddr);
    let writable = vma.prot.contains(Prot::WRITE) && forwrite;
    table.map(page_addr, writable);
    table.flush(page_addr);
    Ok(())
}
