// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Per-target tracing levels, adjustable at runtime.
//!
//! Every module that logs declares its target once with [`trace_target!`].  The declarations
//! are gathered at link time; [`get_trace_ctl`] installs a subscriber whose filter starts from
//! the declared levels and can then be changed by name, by tag, or all at once.

pub mod control;
pub mod display;
pub mod targets;

pub use control::{TraceCtlError, TracingControl, get_trace_ctl};
pub use tracing_subscriber::filter::LevelFilter;
