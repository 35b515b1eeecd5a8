// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(clippy::all, clippy::pedantic)]

use subfn_cli::args::{CmdArgs, Parser};
use subfn_cli::display;
use subfn_cli::scenario::{Scenario, World};
use tracectl::{get_trace_ctl, trace_target};
use tracing::{error, info, level_filters::LevelFilter};

trace_target!("sfctl-main", LevelFilter::INFO, &["cli"]);

fn main() {
    let args = CmdArgs::parse();
    if let Some(tracing) = args.tracing()
        && let Err(e) = get_trace_ctl().setup_from_string(tracing)
    {
        eprintln!("Invalid tracing configuration: {e}");
        std::process::exit(2);
    }
    if args.show_tracing_targets() {
        get_trace_ctl().dump();
        std::process::exit(0);
    }
    let Some(path) = args.config() else {
        eprintln!("no scenario given");
        std::process::exit(2);
    };

    let scenario = match Scenario::load(path) {
        Ok(scenario) => scenario,
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    info!(
        "replaying {} operations on PF {}",
        scenario.ops.len(),
        scenario.pf.pci_address
    );
    let mut world = match World::new(scenario.pf, scenario.nic) {
        Ok(world) => world,
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let outcomes = world.replay(&scenario.ops);
    print!("{}", display::outcomes(&outcomes));
    if let Some(pf) = world.pf() {
        print!("{}", display::dynamic_ports(&pf.ports()));
    }
    print!("{}", display::admin_ports(&world));
    print!("{}", display::netdevs(&world));
    world.shutdown();

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    if failed > 0 {
        info!("{failed} operations failed");
        std::process::exit(1);
    }
}
