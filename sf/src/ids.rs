// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Identifier spaces of subfunctions.
//!
//! Auxiliary device ids are process-wide so that `<module>.sf.<id>` names are unique on the bus
//! whatever PF the subfunction belongs to.  Subfunction numbers are per PF.

use id::{Id, IdAllocator, LIMIT_32B, LIMIT_32B_ALLOC1};
use std::sync::{Arc, LazyLock};

/// Marker for auxiliary device ids of subfunctions.
#[derive(Debug)]
pub enum SfAux {}

/// Id of the auxiliary device of an active subfunction.  Never zero.
pub type AuxId = Id<SfAux>;

pub type AuxIdAllocator = IdAllocator<SfAux>;

/// Marker for subfunction numbers.
#[derive(Debug)]
pub enum SfNumber {}

/// User-visible subfunction number (`sfnum`), unique within a PF.
pub type SfNum = Id<SfNumber>;

static AUX_IDS: LazyLock<Arc<AuxIdAllocator>> =
    LazyLock::new(|| Arc::new(IdAllocator::new(LIMIT_32B_ALLOC1)));

/// The process-wide auxiliary id allocator.
pub fn aux_ids() -> Arc<AuxIdAllocator> {
    Arc::clone(&AUX_IDS)
}

/// An empty subfunction number space.
pub(crate) fn sfnums() -> IdAllocator<SfNumber> {
    IdAllocator::new(LIMIT_32B)
}
