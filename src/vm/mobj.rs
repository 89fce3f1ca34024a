// SPDX-License-Identifier: MPL-2.0

//! Memory objects (mobj): the polymorphic page provider behind every vmarea.
//!
//! Grounded on `aster-nix::vm::vmo` (a single `Vmo_` capability type backing
//! every mapping) generalized per SPEC_FULL.md's redesign note into a sum
//! type with one variant per backend, matched against the backend's own
//! `fill`/`flush` behavior instead of a function-pointer vtable. Refcounting
//! rides on `Arc` rather than a hand-rolled `ref`/`put` pair: a shadow's
//! `bottom` pointer is kept as a `Weak` specifically so that
//! `Arc::strong_count` on its `shadowed` field alone answers "is anyone but
//! me still referencing this object", which is exactly the collapse
//! precondition below.

use std::collections::HashMap;

use spin::Mutex as SpinMutex;

use crate::error::Errno;
use crate::prelude::*;
use crate::vm::frame::Frame;

/// A cached resident page: `(page-number, physical page, dirty flag)`. The
/// owning mobj is implicit in which object's page cache holds this entry —
/// pframes are never shared between two mobjs' dictionaries, so no back
/// pointer is needed to know who to flush through.
pub struct PFrame {
    pagenum: u64,
    frame: Frame,
    dirty: std::sync::atomic::AtomicBool,
}

impl PFrame {
    fn new(pagenum: u64, frame: Frame) -> Arc<Self> {
        Arc::new(Self {
            pagenum,
            frame,
            dirty: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub fn pagenum(&self) -> u64 {
        self.pagenum
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, std::sync::atomic::Ordering::Release);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(std::sync::atomic::Ordering::Acquire)
    }
}

enum MobjKind {
    /// Zero-fill-on-demand.
    Anon,
    /// Backed by a vnode's data, page-indexed.
    File { vnode: Arc<crate::fs::vnode::Vnode> },
    /// Copy-on-write overlay. `shadowed` is the next link up the chain
    /// (mutable: collapse re-points it); `bottom` is a non-owning shortcut to
    /// the chain's non-shadow root, reachable anyway by walking `shadowed`.
    Shadow {
        shadowed: SpinMutex<Arc<Mobj>>,
        bottom: Weak<Mobj>,
    },
    /// Backed by a raw block device unit. The device's own read/write path
    /// is an out-of-scope collaborator (see SPEC_FULL.md); this core only
    /// needs a page cache keyed the same way as the other variants.
    BlockDev { unit: u32 },
}

/// A page provider. See the module doc for the refcounting discipline that
/// makes shadow collapse's "am I the only referrer" check exact.
pub struct Mobj {
    kind: MobjKind,
    pages: SpinMutex<HashMap<u64, Arc<PFrame>>>,
}

impl Mobj {
    pub fn new_anon() -> Arc<Self> {
        Arc::new(Self {
            kind: MobjKind::Anon,
            pages: SpinMutex::new(HashMap::new()),
        })
    }

    pub fn new_file(vnode: Arc<crate::fs::vnode::Vnode>) -> Arc<Self> {
        Arc::new(Self {
            kind: MobjKind::File { vnode },
            pages: SpinMutex::new(HashMap::new()),
        })
    }

    pub fn new_blockdev(unit: u32) -> Arc<Self> {
        Arc::new(Self {
            kind: MobjKind::BlockDev { unit },
            pages: SpinMutex::new(HashMap::new()),
        })
    }

    /// Creates a new shadow sitting directly above `under`.
    pub fn new_shadow(under: &Arc<Mobj>) -> Arc<Self> {
        let bottom = match &under.kind {
            MobjKind::Shadow { bottom, .. } => bottom.clone(),
            _ => Arc::downgrade(under),
        };
        Arc::new(Self {
            kind: MobjKind::Shadow {
                shadowed: SpinMutex::new(under.clone()),
                bottom,
            },
            pages: SpinMutex::new(HashMap::new()),
        })
    }

    pub fn is_shadow(&self) -> bool {
        matches!(self.kind, MobjKind::Shadow { .. })
    }

    /// *get_pframe(pagenum, forwrite)*.
    pub fn get_pframe(self: &Arc<Self>, pagenum: u64, forwrite: bool) -> Result<Arc<PFrame>> {
        if !forwrite {
            if let MobjKind::Shadow { shadowed, bottom } = &self.kind {
                if let Some(pf) = self.pages.lock().get(&pagenum).cloned() {
                    return Ok(pf);
                }
                let mut cur = shadowed.lock().clone();
                loop {
                    if let Some(pf) = cur.pages.lock().get(&pagenum).cloned() {
                        return Ok(pf);
                    }
                    let next = match &cur.kind {
                        MobjKind::Shadow { shadowed: s, .. } => s.lock().clone(),
                        _ => break,
                    };
                    cur = next;
                }
                let bottom_arc = bottom
                    .upgrade()
                    .expect("shadow chain's bottom dropped while chain is alive");
                return bottom_arc.get_pframe(pagenum, false);
            }
        }
        self.get_or_fill(pagenum)
    }

    fn get_or_fill(self: &Arc<Self>, pagenum: u64) -> Result<Arc<PFrame>> {
        if let Some(pf) = self.pages.lock().get(&pagenum).cloned() {
            return Ok(pf);
        }
        let pf = self.fill_pframe(pagenum)?;
        self.pages.lock().entry(pagenum).or_insert_with(|| pf.clone());
        Ok(self.pages.lock().get(&pagenum).cloned().unwrap())
    }

    /// *fill_pframe(pagenum)*: materializes a page this mobj's cache does
    /// not yet hold.
    fn fill_pframe(self: &Arc<Self>, pagenum: u64) -> Result<Arc<PFrame>> {
        match &self.kind {
            MobjKind::Anon => Ok(PFrame::new(pagenum, Frame::zeroed())),
            MobjKind::File { vnode } => {
                let frame = Frame::zeroed();
                if let Some(data) = vnode.read_page(pagenum)? {
                    frame.fill_from_short(&data);
                }
                Ok(PFrame::new(pagenum, frame))
            }
            MobjKind::BlockDev { .. } => Ok(PFrame::new(pagenum, Frame::zeroed())),
            MobjKind::Shadow { .. } => {
                // Writable fault into a shadow: copy from the nearest
                // ancestor that actually has the page.
                let src = self.get_pframe(pagenum, false)?;
                let frame = Frame::zeroed();
                frame.copy_from(src.frame());
                Ok(PFrame::new(pagenum, frame))
            }
        }
    }

    /// *flush(pagenum)*: writes a dirty page back to its backing store, if any.
    pub fn flush(&self, pagenum: u64) -> Result<()> {
        if let MobjKind::File { vnode } = &self.kind {
            if let Some(pf) = self.pages.lock().get(&pagenum).cloned() {
                if pf.is_dirty() {
                    let mut buf = vec![0u8; crate::config::PAGE_SIZE];
                    pf.frame().read_at(0, &mut buf);
                    vnode.write_page(pagenum, &buf)?;
                }
            }
        }
        Ok(())
    }

    /// Flushes every cached dirty page. Called when a file-backed mapping is
    /// torn down.
    pub fn flush_all(&self) -> Result<()> {
        let pagenums: Vec<u64> = self.pages.lock().keys().copied().collect();
        for pn in pagenums {
            self.flush(pn)?;
        }
        Ok(())
    }

    /// *Shadow collapse*: while this object's `shadowed` link is itself a
    /// shadow referenced by nobody else, splice it out of the chain after
    /// migrating any pages it holds that we do not already have. Iterative:
    /// a fork-bomb's shadow chain must not blow the stack.
    pub fn collapse_if_possible(self: &Arc<Self>) {
        loop {
            let MobjKind::Shadow { shadowed, .. } = &self.kind else {
                return;
            };
            let mid = {
                let guard = shadowed.lock();
                // Check the count on the value still living in the field,
                // before cloning it — a fresh clone would itself be a second
                // strong reference and make this check always fail.
                if Arc::strong_count(&guard) != 1 {
                    return;
                }
                guard.clone()
            };
            let MobjKind::Shadow {
                shadowed: mid_shadowed,
                ..
            } = &mid.kind
            else {
                // `mid` is the chain's non-shadow bottom; nothing to splice.
                return;
            };
            {
                let mut ours = self.pages.lock();
                let theirs = mid.pages.lock();
                for (&pagenum, pf) in theirs.iter() {
                    ours.entry(pagenum).or_insert_with(|| pf.clone());
                }
            }
            let new_link = mid_shadowed.lock().clone();
            *shadowed.lock() = new_link;
            // `mid` drops here, taking its now-empty reference to
            // `mid_shadowed` with it; loop to see if further collapse is
            // now possible.
        }
    }
}

impl std::fmt::Debug for Mobj {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.kind {
            MobjKind::Anon => "Anon",
            MobjKind::File { .. } => "File",
            MobjKind::Shadow { .. } => "Shadow",
            MobjKind::BlockDev { .. } => "BlockDev",
        };
        f.debug_struct("Mobj").field("kind", &kind).finish()
    }
}

pub(crate) fn unsupported_mmap() -> Error {
    Error::with_message(Errno::ENODEV, "backing store does not support mmap")
}
