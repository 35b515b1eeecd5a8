// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Scenarios: a PF configuration and the admin operations to replay on it.
//!
//! ```yaml
//! pf:
//!   pci_address: "0000:3b:00.0"
//!   netdev_name: ens2f0
//! ops:
//!   - port-new: { sfnum: 3, hw_addr: "02:aa:00:00:00:03" }
//!   - activate: { sfnum: 3 }
//!   - deactivate: { sfnum: 3 }
//!   - port-del: { sfnum: 3 }
//! ```
//!
//! Operations name ports by subfunction number.

use auxbus::DriverError;
use devlink::{DevlinkRegistry, Extack, PortIndex, PortNewAttrs};
use hardware::nic::SimNic;
use hardware::vsi::PortInfo;
use net::eth::mac::Mac;
use net::stack::LocalNetStack;
use serde::{Deserialize, Serialize};
use sf::{Collaborators, Pf, PfConfig, SfBus, SfError, driver_register, driver_unregister};
use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;
use tracectl::trace_target;
use tracing::{debug, info, warn};

trace_target!("sfctl", LevelFilter::INFO, &["cli"]);

const ENODEV: i32 = 19;

/// Errors setting a scenario up.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("could not read {0}: {1}")]
    Io(String, std::io::Error),
    #[error("invalid scenario: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
    #[error("driver registration failed: {0}")]
    Driver(#[from] DriverError),
    #[error("PF setup failed: {0}")]
    Pf(#[from] SfError),
}

fn default_queues() -> u16 {
    256
}

fn default_mac() -> Mac {
    Mac([0x02, 0, 0, 0, 0, 0x01])
}

/// The simulated NIC under the PF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NicConfig {
    #[serde(default)]
    pub lport: u8,
    #[serde(default = "default_mac")]
    pub mac: Mac,
    #[serde(default = "default_queues")]
    pub txq: u16,
    #[serde(default = "default_queues")]
    pub rxq: u16,
}

impl Default for NicConfig {
    fn default() -> Self {
        Self {
            lport: 0,
            mac: default_mac(),
            txq: default_queues(),
            rxq: default_queues(),
        }
    }
}

/// An admin operation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub enum Op {
    /// `devlink port add pci/<pf> flavour pcisf pfnum <pfnum> sfnum <sfnum>`
    PortNew {
        #[serde(default)]
        sfnum: Option<u32>,
        hw_addr: Mac,
        /// Defaults to the PF's own number.
        #[serde(default)]
        pfnum: Option<u16>,
    },
    Activate {
        sfnum: u32,
    },
    Deactivate {
        sfnum: u32,
    },
    PortDel {
        sfnum: u32,
    },
}

impl Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Op::PortNew { sfnum, hw_addr, .. } => match sfnum {
                Some(sfnum) => write!(f, "port-new sfnum {sfnum} hw_addr {hw_addr}"),
                None => write!(f, "port-new hw_addr {hw_addr}"),
            },
            Op::Activate { sfnum } => write!(f, "activate sfnum {sfnum}"),
            Op::Deactivate { sfnum } => write!(f, "deactivate sfnum {sfnum}"),
            Op::PortDel { sfnum } => write!(f, "port-del sfnum {sfnum}"),
        }
    }
}

/// A PF and the operations to replay on it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub pf: PfConfig,
    #[serde(default)]
    pub nic: NicConfig,
    /// One single-key map per operation: `- activate: { sfnum: 3 }`.
    #[serde(default, with = "serde_yaml_ng::with::singleton_map_recursive")]
    pub ops: Vec<Op>,
}

impl Scenario {
    pub fn parse(yaml: &str) -> Result<Self, ScenarioError> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| ScenarioError::Io(path.display().to_string(), e))?;
        Self::parse(&yaml)
    }
}

/// Why an operation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpFailure {
    pub errno: i32,
    pub error: String,
    pub extack: Option<String>,
}

impl OpFailure {
    fn new(error: &SfError, extack: &Extack) -> Self {
        Self {
            errno: error.errno(),
            error: error.to_string(),
            extack: extack.msg().map(str::to_string),
        }
    }
}

/// An operation and what came of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub op: Op,
    pub result: Result<String, OpFailure>,
}

/// A PF over a simulated NIC, an in-process stack, an auxiliary bus and a devlink registry.
pub struct World {
    pub nic: Arc<SimNic>,
    pub stack: Arc<LocalNetStack>,
    pub bus: Arc<SfBus>,
    pub registry: Arc<DevlinkRegistry>,
    pf: Option<Pf>,
}

impl World {
    /// Register the `sf` driver and bring the PF up.
    pub fn new(pf: PfConfig, nic: NicConfig) -> Result<Self, ScenarioError> {
        let sim = Arc::new(SimNic::new(
            PortInfo {
                lport: nic.lport,
                mac: nic.mac,
            },
            nic.txq,
            nic.rxq,
        ));
        let stack = Arc::new(LocalNetStack::new());
        let bus = Arc::new(SfBus::new());
        driver_register(&bus)?;
        let registry = Arc::new(DevlinkRegistry::new());
        let deps = Collaborators::new(
            sim.clone(),
            stack.clone(),
            bus.clone(),
            registry.clone(),
        );
        let pf = match Pf::new(pf, deps) {
            Ok(pf) => pf,
            Err(e) => {
                if let Err(e) = driver_unregister(&bus) {
                    warn!("{e}");
                }
                return Err(e.into());
            }
        };
        Ok(Self {
            nic: sim,
            stack,
            bus,
            registry,
            pf: Some(pf),
        })
    }

    /// The PF, until [`World::shutdown`].
    pub fn pf(&self) -> Option<&Pf> {
        self.pf.as_ref()
    }

    fn port_of(pf: &Pf, sfnum: u32) -> Option<PortIndex> {
        pf.ports()
            .iter()
            .find(|port| port.sfnum == sfnum)
            .map(|port| PortIndex::from_raw(port.port_index))
    }

    fn no_such_port(sfnum: u32) -> OpFailure {
        OpFailure {
            errno: -ENODEV,
            error: format!("no port with sfnum {sfnum}"),
            extack: None,
        }
    }

    fn run_op(pf: &Pf, op: &Op) -> Result<String, OpFailure> {
        let mut extack = Extack::new();
        match *op {
            Op::PortNew {
                sfnum,
                hw_addr,
                pfnum,
            } => {
                let pfnum = pfnum.unwrap_or(pf.config().pf_id);
                let attrs = PortNewAttrs::pci_sf(pfnum, sfnum, hw_addr);
                let index = pf
                    .port_new(&attrs, &mut extack)
                    .map_err(|e| OpFailure::new(&e, &extack))?;
                Ok(format!("port {index}"))
            }
            Op::Activate { sfnum } => {
                let index = Self::port_of(pf, sfnum).ok_or_else(|| Self::no_such_port(sfnum))?;
                pf.activate(index, &mut extack)
                    .map_err(|e| OpFailure::new(&e, &extack))?;
                let netdev = pf
                    .sf_netdev(index)
                    .and_then(|netdev| netdev.name().map(ToString::to_string))
                    .unwrap_or_default();
                Ok(format!("port {index} up as {netdev}"))
            }
            Op::Deactivate { sfnum } => {
                let index = Self::port_of(pf, sfnum).ok_or_else(|| Self::no_such_port(sfnum))?;
                pf.deactivate(index, &mut extack)
                    .map_err(|e| OpFailure::new(&e, &extack))?;
                Ok(format!("port {index} inactive"))
            }
            Op::PortDel { sfnum } => {
                let index = Self::port_of(pf, sfnum).ok_or_else(|| Self::no_such_port(sfnum))?;
                pf.port_del(index, &mut extack)
                    .map_err(|e| OpFailure::new(&e, &extack))?;
                Ok(format!("port {index} deleted"))
            }
        }
    }

    /// Run one operation.  Failures are reported, not propagated.
    pub fn apply(&self, op: &Op) -> Outcome {
        let result = match &self.pf {
            Some(pf) => Self::run_op(pf, op),
            None => Err(OpFailure {
                errno: -ENODEV,
                error: "the PF is shut down".to_string(),
                extack: None,
            }),
        };
        match &result {
            Ok(done) => info!("{op}: {done}"),
            Err(failure) => warn!("{op}: {} ({})", failure.error, failure.errno),
        }
        Outcome {
            op: op.clone(),
            result,
        }
    }

    /// Run every operation in order.
    pub fn replay(&self, ops: &[Op]) -> Vec<Outcome> {
        ops.iter().map(|op| self.apply(op)).collect()
    }

    /// Tear the PF down and unregister the driver.
    pub fn shutdown(&mut self) {
        if let Some(pf) = self.pf.take() {
            pf.shutdown();
            debug!("PF shut down");
        }
        if let Err(e) = driver_unregister(&self.bus) {
            debug!("{e}");
        }
    }
}

impl Drop for World {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod test {
    use super::{Op, Scenario, World};
    use net::eth::mac::Mac;
    use pretty_assertions::assert_eq;

    const SCENARIO: &str = r#"
pf:
  pci_address: "0000:3b:00.0"
  netdev_name: ens2f0
  num_vsi: 4
nic:
  txq: 32
  rxq: 32
ops:
  - port-new: { sfnum: 3, hw_addr: "02:aa:00:00:00:03" }
  - port-new: { sfnum: 3, hw_addr: "02:aa:00:00:00:04" }
  - activate: { sfnum: 3 }
  - activate: { sfnum: 9 }
  - port-new: { hw_addr: "02:aa:00:00:00:05", pfnum: 1 }
"#;

    #[test]
    fn parse_scenario() {
        let scenario = Scenario::parse(SCENARIO).unwrap();
        assert_eq!(scenario.pf.netdev_name.as_deref(), Some("ens2f0"));
        assert_eq!(scenario.nic.txq, 32);
        assert_eq!(scenario.ops.len(), 5);
        assert_eq!(
            scenario.ops[0],
            Op::PortNew {
                sfnum: Some(3),
                hw_addr: Mac([0x02, 0xaa, 0, 0, 0, 3]),
                pfnum: None,
            }
        );
        assert_eq!(scenario.ops[2], Op::Activate { sfnum: 3 });
        assert!(Scenario::parse("pf: {}\n").is_err());
        assert!(Scenario::parse("pf: { pci_address: \"0000:3b:00.0\" }\nops: [ reboot ]\n").is_err());
    }

    #[test]
    fn ops_are_single_key_maps() {
        let mut scenario = Scenario::parse(SCENARIO).unwrap();
        scenario.ops = vec![Op::Activate { sfnum: 3 }];
        let yaml = serde_yaml_ng::to_string(&scenario).unwrap();
        assert!(yaml.contains("- activate:"), "{yaml}");
        assert!(!yaml.contains('!'), "{yaml}");
        assert_eq!(Scenario::parse(&yaml).unwrap(), scenario);
    }

    #[test]
    fn replay_reports_each_outcome() {
        let scenario = Scenario::parse(SCENARIO).unwrap();
        let mut world = World::new(scenario.pf, scenario.nic).unwrap();
        let outcomes = world.replay(&scenario.ops);
        assert_eq!(outcomes.len(), 5);
        assert_eq!(outcomes[0].result, Ok("port 1".to_string()));

        let dup = outcomes[1].result.as_ref().unwrap_err();
        assert_eq!(dup.errno, -16);
        assert_eq!(
            dup.extack.as_deref(),
            Some("Subfunction with given sfnum already exists")
        );

        assert_eq!(
            outcomes[2].result,
            Ok("port 1 up as ens2f0_s3".to_string())
        );
        assert_eq!(outcomes[3].result.as_ref().unwrap_err().errno, -19);
        let wrong_pf = outcomes[4].result.as_ref().unwrap_err();
        assert_eq!(wrong_pf.extack.as_deref(), Some("Incorrect pfnum supplied"));

        assert_eq!(world.stack.len(), 1);
        world.shutdown();
        assert!(world.pf().is_none());
        assert!(world.stack.is_empty());
        assert!(world.registry.instances().is_empty());
        let after = world.apply(&Op::PortDel { sfnum: 3 });
        assert!(after.result.is_err());
    }
}
