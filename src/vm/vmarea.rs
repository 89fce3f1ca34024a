// SPDX-License-Identifier: MPL-2.0

//! Virtual memory areas: contiguous, uniformly-protected page ranges.
//!
//! Grounded on `aster-nix::vm::vmar::vm_mapping::VmMapping` (a `[start, end)`
//! range with its own permission bits and backing VMO), minus the
//! capability-rights machinery, which is out of scope here.

use bitflags::bitflags;

use crate::prelude::*;
use crate::vm::mobj::Mobj;

bitflags! {
    /// Protection bits, matching the hardware page-table bits this core's
    /// fault handler installs.
    #[derive(Clone, Copy)]
    pub struct Prot: u8 {
        const READ  = 0b001;
        const WRITE = 0b010;
        const EXEC  = 0b100;
    }
}

bitflags! {
    #[derive(Clone, Copy)]
    pub struct MapFlags: u8 {
        const PRIVATE = 0b001;
        const SHARED  = 0b010;
        const ANON    = 0b100;
        const FIXED   = 0b1000;
    }
}

/// A single mapped range, in units of pages: `[start, end)`.
pub struct VmArea {
    pub start: u64,
    pub end: u64,
    /// Page offset into the backing object of `start`.
    pub page_off: u64,
    pub prot: Prot,
    pub flags: MapFlags,
    pub mobj: Arc<Mobj>,
}

impl VmArea {
    pub fn new(start: u64, end: u64, page_off: u64, prot: Prot, flags: MapFlags, mobj: Arc<Mobj>) -> Self {
        debug_assert!(start < end, "vmarea must be non-empty");
        Self {
            start,
            end,
            page_off,
            prot,
            flags,
            mobj,
        }
    }

    pub fn npages(&self) -> u64 {
        self.end - self.start
    }

    pub fn contains(&self, vfn: u64) -> bool {
        self.start <= vfn && vfn < self.end
    }

    pub fn overlaps(&self, start: u64, end: u64) -> bool {
        self.start < end && start < self.end
    }

    /// Object-relative page number for a virtual frame number inside this area.
    pub fn object_pagenum(&self, vfn: u64) -> u64 {
        debug_assert!(self.contains(vfn));
        vfn - self.start + self.page_off
    }

    pub fn is_private(&self) -> bool {
        self.flags.contains(MapFlags::PRIVATE)
    }
}
