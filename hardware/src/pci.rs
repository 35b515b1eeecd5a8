// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! PCI device addressing in the extended BDF format: `domain:bus:device.function`
//! (e.g. `0000:03:00.0`).
//!
//! ```
//! use subfn_hardware::pci::PciAddress;
//!
//! let addr = PciAddress::try_from("0000:3b:00.1").unwrap();
//! assert_eq!(addr.bus, 0x3b);
//! assert_eq!(addr.function, 1);
//! assert_eq!(addr.to_string(), "0000:3b:00.1");
//! ```

use std::fmt::Display;
use std::str::FromStr;

/// A PCI device address.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct PciAddress {
    /// PCI domain (segment) number.
    pub domain: u16,
    /// PCI bus number.
    pub bus: u8,
    /// Device number on the bus (5 bits).
    pub device: u8,
    /// Function number within the device (3 bits).
    pub function: u8,
}

/// Errors that can occur when building or parsing a PCI address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidPciAddress {
    /// Invalid address syntax.
    #[error("invalid PCI address syntax (should be domain:bus:device.function): {0}")]
    Syntax(String),
    /// Device number does not fit in 5 bits.
    #[error("PCI device number {0:#x} is larger than 0x1f")]
    Device(u8),
    /// Function number does not fit in 3 bits.
    #[error("PCI function number {0:#x} is larger than 0x7")]
    Function(u8),
}

impl PciAddress {
    /// Largest legal device number.
    pub const MAX_DEVICE: u8 = 0x1f;
    /// Largest legal function number.
    pub const MAX_FUNCTION: u8 = 0x7;

    /// Creates a new PCI address from its components.
    ///
    /// # Errors
    ///
    /// Returns an error if `device` or `function` is out of range.
    pub fn new(domain: u16, bus: u8, device: u8, function: u8) -> Result<Self, InvalidPciAddress> {
        if device > Self::MAX_DEVICE {
            return Err(InvalidPciAddress::Device(device));
        }
        if function > Self::MAX_FUNCTION {
            return Err(InvalidPciAddress::Function(function));
        }
        Ok(Self {
            domain,
            bus,
            device,
            function,
        })
    }
}

impl Display for PciAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:01x}",
            self.domain, self.bus, self.device, self.function
        )
    }
}

impl FromStr for PciAddress {
    type Err = InvalidPciAddress;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let syntax = || InvalidPciAddress::Syntax(value.to_string());
        if !value.is_ascii() || value.len() != 12 {
            return Err(syntax());
        }
        let mut parts = value.split(':');
        let (Some(domain), Some(bus), Some(dev_fn), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(syntax());
        };
        let Some((device, function)) = dev_fn.split_once('.') else {
            return Err(syntax());
        };
        if domain.len() != 4 || bus.len() != 2 || device.len() != 2 || function.len() != 1 {
            return Err(syntax());
        }
        let domain = u16::from_str_radix(domain, 16).map_err(|_| syntax())?;
        let bus = u8::from_str_radix(bus, 16).map_err(|_| syntax())?;
        let device = u8::from_str_radix(device, 16).map_err(|_| syntax())?;
        let function = u8::from_str_radix(function, 16).map_err(|_| syntax())?;
        PciAddress::new(domain, bus, device, function)
    }
}

impl TryFrom<&str> for PciAddress {
    type Error = InvalidPciAddress;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<String> for PciAddress {
    type Error = InvalidPciAddress;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PciAddress> for String {
    fn from(value: PciAddress) -> Self {
        value.to_string()
    }
}

#[cfg(any(test, feature = "bolero"))]
mod contract {
    use super::PciAddress;
    use bolero::{Driver, TypeGenerator};

    impl TypeGenerator for PciAddress {
        fn generate<D: Driver>(driver: &mut D) -> Option<Self> {
            Some(PciAddress {
                domain: driver.produce()?,
                bus: driver.produce()?,
                device: driver.produce::<u8>()? & PciAddress::MAX_DEVICE,
                function: driver.produce::<u8>()? & PciAddress::MAX_FUNCTION,
            })
        }
    }
}

#[cfg(test)]
mod test {
    use super::{InvalidPciAddress, PciAddress};

    #[test]
    fn display_and_parse_agree() {
        bolero::check!()
            .with_type()
            .for_each(|addr: &PciAddress| {
                let parsed: PciAddress = addr.to_string().parse().unwrap();
                assert_eq!(parsed, *addr);
            });
    }

    #[test]
    fn out_of_range_components() {
        assert_eq!(
            PciAddress::new(0, 0, 0x20, 0),
            Err(InvalidPciAddress::Device(0x20))
        );
        assert_eq!(
            PciAddress::new(0, 0, 0, 8),
            Err(InvalidPciAddress::Function(8))
        );
        assert_eq!(
            "0000:00:20.0".parse::<PciAddress>(),
            Err(InvalidPciAddress::Device(0x20))
        );
    }

    #[test]
    fn bad_syntax() {
        for bad in ["", "0000:00:00", "0000:00.00.0", "000:000:00.0", "0000:0g:00.0"] {
            assert!(matches!(
                bad.parse::<PciAddress>(),
                Err(InvalidPciAddress::Syntax(_))
            ));
        }
    }

    #[test]
    fn serde_as_string() {
        let addr = PciAddress::new(0, 0x3b, 0, 1).unwrap();
        let yaml = serde_yaml_ng::to_string(&addr).unwrap();
        assert!(yaml.contains("0000:3b:00.1"));
        let back: PciAddress = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(back, addr);
    }
}
