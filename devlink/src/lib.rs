// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The administrative bus: devlink instances, their ports, and the port function operations a
//! driver implements for dynamically created ports.

#![deny(
    unsafe_code,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

mod extack;
mod instance;
mod port;
mod registry;

pub use extack::Extack;
pub use instance::{Devlink, DevlinkError, Errno, PortOps};
pub use port::{
    DevlinkPort, NetdevBinding, PciSfAttrs, PortFlavour, PortFlavourKind, PortFnOpState,
    PortFnState, PortIndex, PortNewAttrs,
};
pub use registry::DevlinkRegistry;
