// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! An in-process auxiliary bus.
//!
//! A driver carves a piece of its device out as an [`AuxDevice`], hands it a payload, and
//! publishes it on an [`AuxiliaryBus`].  The bus matches it against registered [`AuxDriver`]s by
//! `<module>.<name>` and calls `probe` synchronously from [`AuxiliaryBus::add`]; `remove` runs
//! synchronously from [`AuxiliaryBus::delete`].
//!
//! Devices are reference counted.  The payload is owned by the device from
//! [`AuxiliaryBus::device_init`] on and handed to the device's release function when the last
//! reference goes away, which may be later than [`AuxDevice::uninit`].

#![deny(
    unsafe_code,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

mod bus;
mod device;

pub use bus::{AddError, AuxDriver, AuxiliaryBus, DriverError};
pub use device::{AuxDevice, AuxDeviceConfig, DeviceAttribute, InitError, InitFailure};
