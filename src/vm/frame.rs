// SPDX-License-Identifier: MPL-2.0

//! Physical page frames.
//!
//! Real physical page allocation is an out-of-scope collaborator (see
//! SPEC_FULL.md's boot sequence): a production core would obtain `Frame`s
//! from a buddy/slab allocator over real RAM. Here a `Frame` is simply a
//! heap-allocated, shareable page-sized buffer, which is enough to exercise
//! every byte-level invariant (zero-fill, copy-on-write content divergence)
//! the rest of this module is specified against.

use spin::Mutex as SpinMutex;

use crate::config::PAGE_SIZE;
use crate::prelude::*;

/// A physical page, addressable only through its owning [`PFrame`](super::mobj::PFrame).
#[derive(Clone)]
pub struct Frame(Arc<SpinMutex<Box<[u8; PAGE_SIZE]>>>);

impl Frame {
    pub fn zeroed() -> Self {
        Self(Arc::new(SpinMutex::new(Box::new([0u8; PAGE_SIZE]))))
    }

    /// Copies the full page contents from `other` into `self`.
    pub fn copy_from(&self, other: &Frame) {
        let src = other.0.lock();
        let mut dst = self.0.lock();
        dst.copy_from_slice(&src[..]);
    }

    /// Reads `buf.len()` bytes starting at `offset` within the page.
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) {
        let src = self.0.lock();
        let end = offset + buf.len();
        buf.copy_from_slice(&src[offset..end]);
    }

    /// Writes `buf` into the page starting at `offset`.
    pub fn write_at(&self, offset: usize, buf: &[u8]) {
        let mut dst = self.0.lock();
        let end = offset + buf.len();
        dst[offset..end].copy_from_slice(buf);
    }

    /// Fills the whole page from a shorter source slice (used when a file's
    /// tail page only partially covers `PAGE_SIZE` bytes); the remainder
    /// stays zero.
    pub fn fill_from_short(&self, data: &[u8]) {
        let mut dst = self.0.lock();
        dst[..data.len()].copy_from_slice(data);
        dst[data.len()..].fill(0);
    }
}
