// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Devlink ports, their flavours and the attributes of a port-new request.

use id::Id;
use net::eth::mac::Mac;
use net::interface::{InterfaceIndex, InterfaceName};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Index of a port within its devlink instance.
pub type PortIndex = Id<DevlinkPort>;

/// PCI subfunction attributes of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PciSfAttrs {
    /// Controller number (0 for the local host).
    pub controller: u32,
    /// PF number the subfunction belongs to.
    pub pf: u16,
    /// Subfunction number, unique within the PF.
    pub sf: u32,
    /// Whether the subfunction belongs to an external controller.
    pub external: bool,
}

/// What a port represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase", tag = "flavour")]
pub enum PortFlavour {
    /// A physical port of the NIC.
    Physical {
        /// Front panel port number.
        port_number: u32,
    },
    /// A port with no physical or PCI counterpart.
    Virtual,
    /// A PCI subfunction.
    PciSf(PciSfAttrs),
}

impl PortFlavour {
    /// The flavour without its attributes.
    pub fn kind(&self) -> PortFlavourKind {
        match self {
            PortFlavour::Physical { .. } => PortFlavourKind::Physical,
            PortFlavour::Virtual => PortFlavourKind::Virtual,
            PortFlavour::PciSf(_) => PortFlavourKind::PciSf,
        }
    }

    /// Subfunction attributes, for `pcisf` ports.
    pub fn pci_sf(&self) -> Option<&PciSfAttrs> {
        match self {
            PortFlavour::PciSf(attrs) => Some(attrs),
            _ => None,
        }
    }
}

impl Display for PortFlavour {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortFlavour::Physical { port_number } => write!(f, "physical port {port_number}"),
            PortFlavour::Virtual => write!(f, "virtual"),
            PortFlavour::PciSf(attrs) => write!(
                f,
                "pcisf controller {} pfnum {} sfnum {}{}",
                attrs.controller,
                attrs.pf,
                attrs.sf,
                if attrs.external { " external" } else { "" }
            ),
        }
    }
}

/// Flavour requested by a port-new command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PortFlavourKind {
    Physical,
    Virtual,
    PciPf,
    PciVf,
    PciSf,
}

/// Attributes of a port-new command (`devlink port add`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortNewAttrs {
    /// Requested flavour.
    pub flavour: PortFlavourKind,
    /// PF number the new port belongs to.
    pub pfnum: u16,
    /// Requested subfunction number; the driver picks one if absent.
    #[serde(default)]
    pub sfnum: Option<u32>,
    /// Requested port index; the driver picks one if absent.
    #[serde(default)]
    pub port_index: Option<u32>,
    /// Requested controller number.
    #[serde(default)]
    pub controller: Option<u32>,
    /// Hardware address of the port function.
    #[serde(default)]
    pub hw_addr: Option<Mac>,
}

impl PortNewAttrs {
    /// A request for a PCI subfunction port on PF `pfnum`.
    pub fn pci_sf(pfnum: u16, sfnum: Option<u32>, hw_addr: Mac) -> Self {
        Self {
            flavour: PortFlavourKind::PciSf,
            pfnum,
            sfnum,
            port_index: None,
            controller: None,
            hw_addr: Some(hw_addr),
        }
    }
}

/// Administrative state of a port function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PortFnState {
    Inactive,
    Active,
}

/// Operational state of a port function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PortFnOpState {
    /// No driver is bound to the function.
    Detached,
    /// A driver is bound to the function.
    Attached,
}

/// The net device a port is paired with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NetdevBinding {
    pub ifindex: InterfaceIndex,
    pub name: InterfaceName,
}

/// A registered devlink port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DevlinkPort {
    pub(crate) index: PortIndex,
    pub(crate) flavour: PortFlavour,
    pub(crate) netdev: Option<NetdevBinding>,
}

impl DevlinkPort {
    pub fn index(&self) -> PortIndex {
        self.index
    }

    pub fn flavour(&self) -> &PortFlavour {
        &self.flavour
    }

    /// The paired net device, if any.
    pub fn netdev(&self) -> Option<&NetdevBinding> {
        self.netdev.as_ref()
    }
}
