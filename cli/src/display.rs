// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Tables printed by `sfctl`.

use crate::scenario::{Outcome, World};
use colored::Colorize;
use net::interface::OperationalState;
use net::netdev::NetDevice;
use net::stack::NetStack;
use sf::DynamicPortInfo;
use std::fmt::Write;

fn heading(out: &mut String, title: &str, columns: &str) {
    let _ = writeln!(out, "\n{}", title.bright_white().bold());
    let _ = writeln!(out, "{}", columns.bold());
}

/// One line per replayed operation.
pub fn outcomes(outcomes: &[Outcome]) -> String {
    let mut out = String::new();
    heading(
        &mut out,
        "Operations",
        &format!("{:<4} {:<44} {:<6} {}", "#", "operation", "result", "details"),
    );
    for (n, outcome) in outcomes.iter().enumerate() {
        let op = outcome.op.to_string();
        let line = match &outcome.result {
            Ok(done) => format!("{n:<4} {op:<44} {} {done}", format!("{:<6}", "ok").green()),
            Err(failure) => {
                let mut details = format!("{} ({})", failure.error, failure.errno);
                if let Some(extack) = &failure.extack {
                    let _ = write!(details, ": {extack}");
                }
                format!("{n:<4} {op:<44} {} {details}", format!("{:<6}", "failed").red())
            }
        };
        let _ = writeln!(out, "{line}");
    }
    out
}

/// The PF's dynamic ports.
pub fn dynamic_ports(ports: &[DynamicPortInfo]) -> String {
    let mut out = String::new();
    heading(
        &mut out,
        "Subfunction ports",
        &format!(
            "{:<6} {:<6} {:<18} {:<8} {:<4} {:<5} {:<16} {}",
            "port", "sfnum", "hw_addr", "state", "vsi", "repr", "aux device", "netdev"
        ),
    );
    for port in ports {
        let state = if port.active {
            format!("{:<8}", "active").green()
        } else {
            format!("{:<8}", "inactive").yellow()
        };
        let repr = port.repr_id.map(|r| r.to_string()).unwrap_or_default();
        let _ = writeln!(
            out,
            "{:<6} {:<6} {:<18} {state} {:<4} {:<5} {:<16} {}",
            port.port_index,
            port.sfnum,
            port.hw_addr,
            port.vsi,
            repr,
            port.aux_dev.as_deref().unwrap_or("-"),
            port.netdev.as_deref().unwrap_or("-"),
        );
    }
    out
}

/// Ports of every registered devlink instance.
pub fn admin_ports(world: &World) -> String {
    let mut out = String::new();
    heading(
        &mut out,
        "Devlink ports",
        &format!("{:<28} {:<6} {:<34} {}", "instance", "port", "flavour", "netdev"),
    );
    for devlink in world.registry.instances() {
        for port in devlink.ports() {
            let netdev = port
                .netdev()
                .map_or_else(|| "-".to_string(), |b| format!("{} ({})", b.name, b.ifindex));
            let _ = writeln!(
                out,
                "{:<28} {:<6} {:<34} {netdev}",
                devlink.handle(),
                port.index(),
                port.flavour().to_string(),
            );
        }
    }
    out
}

fn netdev_line(netdev: &NetDevice) -> String {
    let name = netdev.name().map(ToString::to_string).unwrap_or_default();
    let ifindex = netdev.ifindex().map(|i| i.to_string()).unwrap_or_default();
    let oper = netdev.oper_state();
    let state = oper.to_string();
    let state = format!("{state:<8}");
    let state = match oper {
        OperationalState::Up => state.green(),
        OperationalState::Down => state.red(),
    };
    let bus_info = netdev.drvinfo().map(|d| d.bus_info).unwrap_or_default();
    format!(
        "{name:<16} {ifindex:<8} {:<18} {state} {:<6} {bus_info}",
        netdev.dev_addr().to_string(),
        netdev.mtu(),
    )
}

/// Net devices registered with the stack.
pub fn netdevs(world: &World) -> String {
    let mut out = String::new();
    heading(
        &mut out,
        "Net devices",
        &format!(
            "{:<16} {:<8} {:<18} {:<8} {:<6} {}",
            "name", "ifindex", "address", "state", "mtu", "bus"
        ),
    );
    for netdev in world.stack.devices() {
        let _ = writeln!(out, "{}", netdev_line(&netdev));
    }
    out
}

#[cfg(test)]
mod test {
    use super::{admin_ports, dynamic_ports, netdevs, outcomes};
    use crate::scenario::{Scenario, World};

    #[test]
    fn tables_show_the_active_subfunction() {
        let scenario = Scenario::parse(
            r#"
pf:
  pci_address: "0000:3b:00.0"
  netdev_name: ens2f0
ops:
  - port-new: { sfnum: 3, hw_addr: "02:aa:00:00:00:03" }
  - activate: { sfnum: 3 }
  - port-del: { sfnum: 7 }
"#,
        )
        .unwrap();
        let world = World::new(scenario.pf, scenario.nic).unwrap();
        let done = world.replay(&scenario.ops);

        let table = outcomes(&done);
        assert!(table.contains("port-new sfnum 3 hw_addr 02:aa:00:00:00:03"));
        assert!(table.contains("no port with sfnum 7"));

        let pf = world.pf().unwrap();
        let table = dynamic_ports(&pf.ports());
        assert!(table.contains("02:aa:00:00:00:03"));
        assert!(table.contains("active"));
        assert!(table.contains("ens2f0_s3"));

        let table = admin_ports(&world);
        assert!(table.contains("pci/0000:3b:00.0"));
        assert!(table.contains("auxiliary/ice.sf."));

        let table = netdevs(&world);
        assert!(table.contains("ens2f0_s3"));
        assert!(table.contains("ice.sf."));
        assert!(table.contains("down"));
    }
}
