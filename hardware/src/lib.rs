// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The NIC as the subfunction core sees it: PCI addressing, VSIs and the hardware access layer.

#![deny(clippy::pedantic, clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

pub mod nic;
pub mod pci;
pub mod vsi;
