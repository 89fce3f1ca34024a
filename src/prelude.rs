// SPDX-License-Identifier: MPL-2.0

//! Crate-wide imports, mirroring the teacher's `prelude` convention.

pub(crate) use std::sync::{Arc, Weak};

pub(crate) use log::{debug, error, info, trace, warn};

pub(crate) use crate::error::{Errno, Error, Result};
pub(crate) use crate::{return_errno, return_errno_with_message};
