// SPDX-License-Identifier: MPL-2.0

//! Device nodes: `/dev/null` and `/dev/zero` with real bodies, plus
//! placeholder major/minor pairs for the tty and disk nodes init lays down.
//!
//! Real device driver bodies (TTY line discipline, disk) are out-of-scope
//! collaborators (see SPEC_FULL.md); null/zero are simple enough that their
//! *entire* contract is the interface, so they are implemented directly
//! rather than stubbed, grounded on `aster-nix::fs::device`'s null/zero unit.
//! `Placeholder` nodes exist so path resolution and `stat` work for
//! `/dev/tty*`/`/dev/hda*` even though no driver body backs them.

use crate::error::Errno;
use crate::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Null,
    Zero,
    /// A registered major/minor with no backing driver.
    Placeholder { major: u32, minor: u32 },
}

impl DeviceKind {
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        match self {
            DeviceKind::Null => Ok(0),
            DeviceKind::Zero => {
                buf.fill(0);
                Ok(buf.len())
            }
            DeviceKind::Placeholder { .. } => return_errno_with_message!(Errno::ENXIO, "no driver backs this device node"),
        }
    }

    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        match self {
            DeviceKind::Null | DeviceKind::Zero => Ok(buf.len()),
            DeviceKind::Placeholder { .. } => return_errno_with_message!(Errno::ENXIO, "no driver backs this device node"),
        }
    }
}
