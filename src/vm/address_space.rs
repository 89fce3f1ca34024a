// SPDX-License-Identifier: MPL-2.0

//! Per-process address space: an ordered list of disjoint vmareas.
//!
//! Grounded on `aster-nix::vm::vmar::Vmar_`'s `IntervalSet` of mappings,
//! generalized to a plain sorted `Vec` (this core has no rights capability
//! layer to thread through lookups) per SPEC_FULL.md's vmarea invariants.

use crate::config::{page_align_down, page_align_up, DEFAULT_START_BRK, PAGE_SIZE, USER_HIGH, USER_LOW};
use crate::error::Errno;
use crate::prelude::*;
use crate::vm::mobj::Mobj;
use crate::vm::vmarea::{MapFlags, Prot, VmArea};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    LowToHigh,
    HighToLow,
}

/// An ordered, disjoint set of vmareas covering part of `[USER_LOW, USER_HIGH)`.
pub struct AddressSpace {
    areas: Vec<VmArea>,
    start_brk: Option<u64>,
    brk: u64,
}

impl AddressSpace {
    pub fn new() -> Self {
        Self {
            areas: Vec::new(),
            start_brk: None,
            brk: 0,
        }
    }

    pub fn areas(&self) -> &[VmArea] {
        &self.areas
    }

    /// *insert(vma)*: keeps `areas` sorted by `start`; the caller is
    /// responsible for having verified disjointness (typically via
    /// `is_range_empty`).
    pub fn insert(&mut self, vma: VmArea) {
        let pos = self.areas.partition_point(|a| a.start < vma.start);
        debug_assert!(
            pos == self.areas.len() || self.areas[pos].start >= vma.end,
            "insert would overlap the next vmarea"
        );
        debug_assert!(
            pos == 0 || self.areas[pos - 1].end <= vma.start,
            "insert would overlap the previous vmarea"
        );
        self.areas.insert(pos, vma);
    }

    /// *lookup(vfn)*.
    pub fn lookup(&self, vfn: u64) -> Option<&VmArea> {
        let pos = self.areas.partition_point(|a| a.end <= vfn);
        self.areas.get(pos).filter(|a| a.contains(vfn))
    }

    fn lookup_mut(&mut self, vfn: u64) -> Option<&mut VmArea> {
        let pos = self.areas.partition_point(|a| a.end <= vfn);
        if self.areas.get(pos).is_some_and(|a| a.contains(vfn)) {
            self.areas.get_mut(pos)
        } else {
            None
        }
    }

    /// *is_range_empty(start, n)*.
    pub fn is_range_empty(&self, start: u64, n: u64) -> bool {
        let end = start + n;
        !self.areas.iter().any(|a| a.overlaps(start, end))
    }

    /// *find_range(npages, dir)*: first-fit scan over `[USER_LOW, USER_HIGH)`
    /// in page units.
    pub fn find_range(&self, npages: u64, dir: Direction) -> Option<u64> {
        let low = USER_LOW as u64 / PAGE_SIZE as u64;
        let high = USER_HIGH as u64 / PAGE_SIZE as u64;
        match dir {
            Direction::LowToHigh => {
                let mut cursor = low;
                for a in &self.areas {
                    if a.start >= cursor && a.start - cursor >= npages {
                        return Some(cursor);
                    }
                    cursor = cursor.max(a.end);
                }
                if high - cursor >= npages {
                    Some(cursor)
                } else {
                    None
                }
            }
            Direction::HighToLow => {
                let mut cursor = high;
                for a in self.areas.iter().rev() {
                    if cursor >= a.end && cursor - a.end >= npages {
                        return Some(cursor - npages);
                    }
                    cursor = cursor.min(a.start);
                }
                if cursor - low >= npages {
                    Some(cursor - npages)
                } else {
                    None
                }
            }
        }
    }

    /// *remove(start, n)*: splits or truncates overlapping vmareas so that
    /// `[start, start+n)` ends up entirely unmapped.
    pub fn remove(&mut self, start: u64, n: u64) {
        let end = start + n;
        let mut i = 0;
        let mut to_insert: Vec<VmArea> = Vec::new();
        while i < self.areas.len() {
            if !self.areas[i].overlaps(start, end) {
                i += 1;
                continue;
            }
            let a = self.areas.remove(i);
            if a.start < start {
                let head_off = a.page_off;
                to_insert.push(VmArea::new(a.start, start, head_off, a.prot, a.flags, a.mobj.clone()));
            }
            if a.end > end {
                let tail_off = a.page_off + (end - a.start);
                to_insert.push(VmArea::new(end, a.end, tail_off, a.prot, a.flags, a.mobj.clone()));
            }
            if a.mobj.is_shadow() {
                a.mobj.collapse_if_possible();
            }
        }
        for vma in to_insert {
            self.insert(vma);
        }
    }

    /// *clone()*: used by fork. The caller has already decided, per vmarea,
    /// whether to wrap it in a fresh shadow (PRIVATE) or share the mobj
    /// directly (SHARED); this just deep-copies the list structure.
    pub fn clone_areas(&self) -> Vec<VmArea> {
        self.areas
            .iter()
            .map(|a| VmArea::new(a.start, a.end, a.page_off, a.prot, a.flags, a.mobj.clone()))
            .collect()
    }

    pub fn replace_areas(&mut self, areas: Vec<VmArea>) {
        self.areas = areas;
    }

    /// *read(vaddr, buf, n)*: resolves each page through its vmarea's mobj
    /// and copies bytes out, independent of any hardware mapping.
    pub fn read(&self, vaddr: u64, buf: &mut [u8]) -> Result<()> {
        self.copy(vaddr, buf.len() as u64, |a, pagenum, page_off, chunk| {
            let pf = a.mobj.get_pframe(pagenum, false)?;
            pf.frame().read_at(page_off as usize, chunk);
            Ok(())
        }, buf)
    }

    /// *write(vaddr, buf, n)*.
    pub fn write(&self, vaddr: u64, buf: &[u8]) -> Result<()> {
        let mut remaining = buf;
        let mut addr = vaddr;
        while !remaining.is_empty() {
            let vfn = addr / PAGE_SIZE as u64;
            let a = self
                .lookup(vfn)
                .ok_or_else(|| Error::with_message(Errno::EFAULT, "write outside any vmarea"))?;
            if !a.prot.contains(Prot::WRITE) {
                return_errno_with_message!(Errno::EACCES, "vmarea is not writable");
            }
            let page_off = (addr % PAGE_SIZE as u64) as usize;
            let chunk_len = (PAGE_SIZE - page_off).min(remaining.len());
            let pagenum = a.object_pagenum(vfn);
            let pf = a.mobj.get_pframe(pagenum, true)?;
            pf.frame().write_at(page_off, &remaining[..chunk_len]);
            pf.mark_dirty();
            remaining = &remaining[chunk_len..];
            addr += chunk_len as u64;
        }
        Ok(())
    }

    fn copy(
        &self,
        vaddr: u64,
        len: u64,
        per_chunk: impl Fn(&VmArea, u64, u64, &mut [u8]) -> Result<()>,
        buf: &mut [u8],
    ) -> Result<()> {
        let mut done = 0usize;
        let mut addr = vaddr;
        while (done as u64) < len {
            let vfn = addr / PAGE_SIZE as u64;
            let a = self
                .lookup(vfn)
                .ok_or_else(|| Error::with_message(Errno::EFAULT, "read outside any vmarea"))?;
            let page_off = addr % PAGE_SIZE as u64;
            let chunk_len = (PAGE_SIZE as u64 - page_off).min(len - done as u64) as usize;
            let pagenum = a.object_pagenum(vfn);
            per_chunk(a, pagenum, page_off, &mut buf[done..done + chunk_len])?;
            done += chunk_len;
            addr += chunk_len as u64;
        }
        Ok(())
    }

    /// *brk(new_brk)*: grows or shrinks the dynamic region, returning the
    /// resulting break.
    pub fn brk(&mut self, new_brk: Option<u64>) -> Result<u64> {
        let start_brk = match self.start_brk {
            Some(b) => b,
            None => {
                self.start_brk = Some(DEFAULT_START_BRK as u64);
                self.brk = DEFAULT_START_BRK as u64;
                DEFAULT_START_BRK as u64
            }
        };
        let Some(new_brk) = new_brk else {
            return Ok(self.brk);
        };
        if new_brk < start_brk || new_brk > USER_HIGH as u64 {
            return_errno_with_message!(Errno::ENOMEM, "brk target outside the dynamic region");
        }
        let old_page = page_align_up(self.brk as usize) as u64 / PAGE_SIZE as u64;
        let new_page = page_align_up(new_brk as usize) as u64 / PAGE_SIZE as u64;
        if new_page > old_page {
            if !self.is_range_empty(old_page, new_page - old_page) {
                return_errno_with_message!(Errno::ENOMEM, "brk growth would overlap another mapping");
            }
            if let Some(heap) = self.lookup_mut(old_page.saturating_sub(1)).filter(|a| a.end == old_page && a.is_private()) {
                heap.end = new_page;
            } else {
                self.insert(VmArea::new(
                    old_page,
                    new_page,
                    0,
                    Prot::READ | Prot::WRITE,
                    MapFlags::PRIVATE | MapFlags::ANON,
                    Mobj::new_anon(),
                ));
            }
        } else if new_page < old_page {
            self.remove(new_page, old_page - new_page);
        }
        self.brk = new_brk;
        Ok(self.brk)
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}
