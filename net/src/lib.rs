// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::pedantic)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

//! Network device model: addresses, interface names, net devices and their op tables, and the
//! networking stack they register with.

pub mod eth;
pub mod interface;
pub mod netdev;
pub mod stack;
pub mod vlan;
