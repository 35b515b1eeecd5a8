// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Dynamic ethernet subfunction ports.
//!
//! An administrator creates a subfunction port on a PF with `devlink port add`, activates it
//! with `devlink port function set state active` and gets a network interface sharing the PF's
//! hardware.  Activation publishes an auxiliary device; probing that device configures the VSI,
//! the admin port of the subfunction and its net device.  Deactivation removes the auxiliary
//! device, which undoes all of it.
//!
//! ```text
//!  port-new ──► DynamicPort ──activate──► sf aux id ──► SfDev ──► aux init ──► aux add
//!                                                                                │ probe
//!                                         netdev ◄── virtual port ◄── VSI cfg ◄──┘
//! ```

#![deny(
    unsafe_code,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

mod activate;
pub mod aux;
mod config;
mod counters;
mod devlink_port;
mod error;
pub mod ids;
pub mod netdev;
mod pf;
mod port;
mod probe;
mod vsi;

pub use aux::{SfBus, SfDev, SfDriver, driver_register, driver_unregister};
pub use config::{PfConfig, PfConfigBuilder, PfConfigBuilderError};
pub use counters::{CounterSnapshot, Counters};
pub use error::SfError;
pub use pf::{Collaborators, Pf};
pub use port::{DynamicPort, DynamicPortInfo, FlavourData, PortStore};
