// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Ethernet types

pub mod mac;

/// Length of an ethernet address in bytes.
pub const ETH_ALEN: usize = 6;
