// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Command line of `sfctl`.

pub use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sfctl")]
#[command(version = "1.0")]
#[command(about = "Replay subfunction port operations against a simulated PF", long_about = None)]
pub struct CmdArgs {
    #[arg(
        long,
        value_name = "scenario file",
        help = "YAML file with the PF configuration and the operations to replay",
        required_unless_present = "show_tracing_targets"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        default_value_t = false,
        help = "Show configurable tracing targets and exit"
    )]
    show_tracing_targets: bool,

    #[arg(
        long,
        value_name = "tracing configuration",
        help = "Tracing config string as comma-separated sequence of tag=level, with level one in [off,error,warn,info,debug,trace].
Passing default=level sets the default log-level. E.g. default=info,sf=debug"
    )]
    tracing: Option<String>,
}

impl CmdArgs {
    pub fn config(&self) -> Option<&PathBuf> {
        self.config.as_ref()
    }
    pub fn show_tracing_targets(&self) -> bool {
        self.show_tracing_targets
    }
    pub fn tracing(&self) -> Option<&String> {
        self.tracing.as_ref()
    }
}
