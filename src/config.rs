// SPDX-License-Identifier: MPL-2.0

//! Constants the rest of the core is specified in terms of.

/// Page size in bytes. Real page-table geometry is an out-of-scope collaborator;
/// this core only needs a consistent unit to count pages in.
pub const PAGE_SIZE: usize = 4096;

/// Lowest page-aligned address user mappings may occupy.
pub const USER_LOW: usize = 0x0040_0000;

/// One past the highest address user mappings may occupy.
pub const USER_HIGH: usize = 0x7f80_0000;

/// Maximum length of a single path component.
pub const NAME_LEN: usize = 255;

/// Exclusive upper bound of the pid space. Pid 0 is reserved for idle, pid 1 for init.
pub const MAX_PID: i32 = 32768;

pub const IDLE_PID: i32 = 0;
pub const INIT_PID: i32 = 1;

/// Size of a process's fixed descriptor table.
pub const NFILES: usize = 256;

/// Default dynamic-region base used when no ELF loader has set `start_brk`,
/// standing in for "end of BSS" (see SPEC_FULL.md open question on `do_brk`).
pub const DEFAULT_START_BRK: usize = USER_LOW + 0x0010_0000;

/// Exit status reported for a process killed by a fatal, unresolved user
/// page fault: the conventional 128 + signal number, SIGSEGV being 11.
pub const SEGV_EXIT_STATUS: i32 = 139;

pub const fn page_align_down(addr: usize) -> usize {
    addr & !(PAGE_SIZE - 1)
}

pub const fn page_align_up(addr: usize) -> usize {
    page_align_down(addr + PAGE_SIZE - 1)
}

pub const fn is_page_aligned(addr: usize) -> bool {
    addr % PAGE_SIZE == 0
}
