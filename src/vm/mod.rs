// SPDX-License-Identifier: MPL-2.0

//! Virtual memory core (§4.2): address spaces, memory objects, shadow
//! chains, and page-fault resolution.

pub mod address_space;
pub mod fault;
pub mod frame;
pub mod mobj;
pub mod vmarea;

pub use address_space::{AddressSpace, Direction};
pub use fault::{handle_page_fault, FaultCause, SoftPageTable};
pub use mobj::{Mobj, PFrame};
pub use vmarea::{MapFlags, Prot, VmArea};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PAGE_SIZE;
    use std::sync::{Arc, Weak};

    fn vfn(addr: usize) -> u64 {
        (addr / PAGE_SIZE) as u64
    }

    #[test]
    fn anon_write_then_read_roundtrips() {
        let mut space = AddressSpace::new();
        let base = crate::config::USER_LOW;
        space.insert(VmArea::new(
            vfn(base),
            vfn(base) + 4,
            0,
            Prot::READ | Prot::WRITE,
            MapFlags::PRIVATE | MapFlags::ANON,
            Mobj::new_anon(),
        ));
        space.write(base as u64, b"hello").unwrap();
        let mut buf = [0u8; 5];
        space.read(base as u64, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn cow_after_fork_diverges() {
        let mut parent = AddressSpace::new();
        let base = crate::config::USER_LOW;
        parent.insert(VmArea::new(
            vfn(base),
            vfn(base) + 1,
            0,
            Prot::READ | Prot::WRITE,
            MapFlags::PRIVATE | MapFlags::ANON,
            Mobj::new_anon(),
        ));
        parent.write(base as u64, &[0x41]).unwrap();

        // fork: wrap the PRIVATE vmarea's mobj in a fresh shadow for both sides.
        let mut child_areas = Vec::new();
        let mut parent_areas = Vec::new();
        for a in parent.clone_areas() {
            if a.is_private() {
                let parent_shadow = Mobj::new_shadow(&a.mobj);
                let child_shadow = Mobj::new_shadow(&a.mobj);
                parent_areas.push(VmArea::new(a.start, a.end, a.page_off, a.prot, a.flags, parent_shadow));
                child_areas.push(VmArea::new(a.start, a.end, a.page_off, a.prot, a.flags, child_shadow));
            } else {
                parent_areas.push(VmArea::new(a.start, a.end, a.page_off, a.prot, a.flags, a.mobj.clone()));
                child_areas.push(VmArea::new(a.start, a.end, a.page_off, a.prot, a.flags, a.mobj));
            }
        }
        parent.replace_areas(parent_areas);
        let mut child = AddressSpace::new();
        child.replace_areas(child_areas);

        let mut buf = [0u8; 1];
        child.read(base as u64, &mut buf).unwrap();
        assert_eq!(buf[0], 0x41, "child should see the parent's pre-fork write");

        child.write(base as u64, &[0x42]).unwrap();
        parent.read(base as u64, &mut buf).unwrap();
        assert_eq!(buf[0], 0x41, "parent must not observe the child's post-fork write");

        child.read(base as u64, &mut buf).unwrap();
        assert_eq!(buf[0], 0x42, "child must observe its own write");
    }

    #[test]
    fn find_range_first_fit_low_to_high() {
        let mut space = AddressSpace::new();
        let low = crate::config::USER_LOW as u64 / PAGE_SIZE as u64;
        space.insert(VmArea::new(
            low,
            low + 2,
            0,
            Prot::READ,
            MapFlags::PRIVATE | MapFlags::ANON,
            Mobj::new_anon(),
        ));
        let found = space.find_range(1, Direction::LowToHigh).unwrap();
        assert_eq!(found, low + 2);
    }

    #[test]
    fn munmap_splits_vmarea() {
        let mut space = AddressSpace::new();
        let base = crate::config::USER_LOW as u64 / PAGE_SIZE as u64;
        space.insert(VmArea::new(
            base,
            base + 4,
            0,
            Prot::READ | Prot::WRITE,
            MapFlags::PRIVATE | MapFlags::ANON,
            Mobj::new_anon(),
        ));
        space.remove(base + 1, 2);
        assert!(space.lookup(base).is_some());
        assert!(space.lookup(base + 1).is_none());
        assert!(space.lookup(base + 2).is_none());
        assert!(space.lookup(base + 3).is_some());
    }

    #[test]
    fn brk_grows_and_shrinks() {
        let mut space = AddressSpace::new();
        let start = space.brk(None).unwrap();
        let grown = space.brk(Some(start + PAGE_SIZE as u64)).unwrap();
        assert_eq!(grown, start + PAGE_SIZE as u64);
        assert!(space.lookup(start / PAGE_SIZE as u64).is_some());
        let shrunk = space.brk(Some(start)).unwrap();
        assert_eq!(shrunk, start);
        assert!(space.lookup(start / PAGE_SIZE as u64).is_none());
    }

    #[test]
    fn collapse_splices_out_a_middle_shadow_with_no_other_referrers() {
        let anon = Mobj::new_anon();
        let mid = Mobj::new_shadow(&anon);
        // fault a page into `mid` so the collapse has something to migrate.
        mid.get_pframe(0, true).unwrap();
        let top = Mobj::new_shadow(&mid);

        let mid_weak: Weak<Mobj> = Arc::downgrade(&mid);
        drop(mid);
        assert_eq!(mid_weak.strong_count(), 1, "only `top`'s shadowed field references mid");

        top.collapse_if_possible();

        assert_eq!(
            mid_weak.strong_count(),
            0,
            "collapse should have spliced mid out, dropping the last reference to it"
        );
        // the migrated page is still readable through `top` after the splice.
        let pf = top.get_pframe(0, false).unwrap();
        assert_eq!(pf.pagenum(), 0);
    }
}
