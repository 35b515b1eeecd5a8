// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `sfctl`: build a PF over in-process collaborators, replay a scenario of subfunction admin
//! operations on it and report the admin ports and net devices left behind.

#![deny(
    unsafe_code,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

pub mod args;
pub mod display;
pub mod scenario;
