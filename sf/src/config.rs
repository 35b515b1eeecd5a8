// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! PF configuration.

use derive_builder::Builder;
use hardware::pci::PciAddress;
use serde::{Deserialize, Serialize};

const DEFAULT_MODULE: &str = "ice";
const DEFAULT_NUM_VSI: u16 = 16;
const DEFAULT_QUEUES: u16 = 4;

fn default_module() -> String {
    DEFAULT_MODULE.to_string()
}

fn default_num_vsi() -> u16 {
    DEFAULT_NUM_VSI
}

fn default_queues() -> u16 {
    DEFAULT_QUEUES
}

fn default_true() -> bool {
    true
}

/// Configuration of a PF supporting subfunctions.
#[derive(Builder, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct PfConfig {
    /// PCI address of the PF; the devlink handle is `pci/<address>`.
    pub pci_address: PciAddress,

    /// PF number.  `port-new` requests for another PF are refused.
    #[builder(default)]
    #[serde(default)]
    pub pf_id: u16,

    /// Kernel module name, prefix of the auxiliary device names.
    #[builder(setter(into), default = default_module())]
    #[serde(default = "default_module")]
    pub module_name: String,

    /// Name of the PF's net device.  Subfunction net devices are named `<name>_s<sfnum>`.
    #[builder(setter(into, strip_option), default)]
    #[serde(default)]
    pub netdev_name: Option<String>,

    /// Number of VSIs of the PF, its own included.
    #[builder(default = default_num_vsi())]
    #[serde(default = "default_num_vsi")]
    pub num_vsi: u16,

    /// TX queues requested per VSI.
    #[builder(default = default_queues())]
    #[serde(default = "default_queues")]
    pub txq: u16,

    /// RX queues requested per VSI.
    #[builder(default = default_queues())]
    #[serde(default = "default_queues")]
    pub rxq: u16,

    /// Whether MSI-X vectors can be allocated at runtime.  Subfunctions need it.
    #[builder(default = true)]
    #[serde(default = "default_true")]
    pub dynamic_msix: bool,

    /// Double VLAN mode: subfunction net devices also filter S-tags.
    #[builder(default)]
    #[serde(default)]
    pub double_vlan_mode: bool,
}

impl PfConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.num_vsi == Some(0) {
            return Err("a PF needs at least its own VSI".to_string());
        }
        if self.txq == Some(0) || self.rxq == Some(0) {
            return Err("VSIs need at least one queue of each kind".to_string());
        }
        if self.module_name.as_ref().is_some_and(String::is_empty) {
            return Err("module name must not be empty".to_string());
        }
        Ok(())
    }
}

impl PfConfig {
    /// A configuration for the PF at `pci_address`, everything else at its default.
    pub fn new(pci_address: PciAddress) -> Self {
        Self {
            pci_address,
            pf_id: 0,
            module_name: default_module(),
            netdev_name: None,
            num_vsi: DEFAULT_NUM_VSI,
            txq: DEFAULT_QUEUES,
            rxq: DEFAULT_QUEUES,
            dynamic_msix: true,
            double_vlan_mode: false,
        }
    }
}
