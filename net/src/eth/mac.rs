// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Ethernet addresses.

use crate::eth::ETH_ALEN;
use arrayvec::ArrayVec;
use std::fmt::Display;
use std::str::FromStr;

/// An ethernet (MAC) address.
///
/// Serialized as its `aa:bb:cc:dd:ee:ff` text form.
#[repr(transparent)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Mac(pub [u8; ETH_ALEN]);

/// A string which is not six colon separated pairs of hex digits.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed MAC address '{0}'")]
pub struct MacParseError(String);

/// Why a [`Mac`] can not be a device or source address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceMacAddressError {
    #[error("{0} is a group address")]
    MulticastSource(Mac),
    #[error("the zero address is not a device address")]
    ZeroSource(Mac),
}

impl Mac {
    pub const BROADCAST: Mac = Mac([0xff; ETH_ALEN]);
    /// Unset address.
    pub const ZERO: Mac = Mac([0; ETH_ALEN]);

    pub fn is_broadcast(&self) -> bool {
        *self == Mac::BROADCAST
    }

    /// Group bit (I/G) set.  Broadcast is a multicast address.
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    pub fn is_zero(&self) -> bool {
        *self == Mac::ZERO
    }

    /// Locally administered bit (U/L) set.
    pub fn is_local(&self) -> bool {
        self.0[0] & 0x02 != 0
    }

    /// Whether the address may be assigned to a device: neither zero nor a group address.
    pub fn valid_src(&self) -> Result<(), SourceMacAddressError> {
        if self.is_zero() {
            return Err(SourceMacAddressError::ZeroSource(*self));
        }
        if self.is_multicast() {
            return Err(SourceMacAddressError::MulticastSource(*self));
        }
        Ok(())
    }
}

impl From<[u8; ETH_ALEN]> for Mac {
    fn from(octets: [u8; ETH_ALEN]) -> Self {
        Mac(octets)
    }
}

impl FromStr for Mac {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || MacParseError(s.to_string());
        let mut octets = ArrayVec::<u8, ETH_ALEN>::new();
        for pair in s.split(':') {
            if pair.len() != 2 || !pair.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(malformed());
            }
            let octet = u8::from_str_radix(pair, 16).map_err(|_| malformed())?;
            octets.try_push(octet).map_err(|_| malformed())?;
        }
        octets.into_inner().map(Mac).map_err(|_| malformed())
    }
}

impl TryFrom<&str> for Mac {
    type Error = MacParseError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl TryFrom<String> for Mac {
    type Error = MacParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Mac> for String {
    fn from(mac: Mac) -> Self {
        mac.to_string()
    }
}

impl Display for Mac {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

#[cfg(any(test, feature = "bolero"))]
mod contract {
    use super::Mac;
    use bolero::{Driver, TypeGenerator};

    impl TypeGenerator for Mac {
        fn generate<D: Driver>(u: &mut D) -> Option<Self> {
            Some(Mac(u.produce()?))
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Mac, SourceMacAddressError};

    #[test]
    fn text_form_parses_back() {
        bolero::check!().with_type().for_each(|mac: &Mac| {
            assert_eq!(mac.to_string().parse::<Mac>(), Ok(*mac));
        });
    }

    #[test]
    fn malformed_strings_are_rejected() {
        for bad in [
            "",
            "02:aa:bb:cc:dd",
            "02:aa:bb:cc:dd:01:02",
            "02:aa:bb:cc:dd:1",
            "02:aa:bb:cc:dd:zz",
            "02-aa-bb-cc-dd-01",
            "+2:aa:bb:cc:dd:01",
        ] {
            assert!(bad.parse::<Mac>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn device_addresses() {
        let mac: Mac = "02:AA:bb:cc:dd:01".parse().unwrap();
        assert_eq!(mac.to_string(), "02:aa:bb:cc:dd:01");
        assert!(mac.is_local());
        assert_eq!(mac.valid_src(), Ok(()));
        assert_eq!(
            Mac::ZERO.valid_src(),
            Err(SourceMacAddressError::ZeroSource(Mac::ZERO))
        );
        assert_eq!(
            Mac::BROADCAST.valid_src(),
            Err(SourceMacAddressError::MulticastSource(Mac::BROADCAST))
        );
        assert!(Mac::BROADCAST.is_broadcast());
        assert!(Mac([0x01, 0, 0x5e, 0, 0, 1]).valid_src().is_err());
    }

    #[test]
    fn yaml_uses_the_text_form() {
        let mac: Mac = serde_yaml_ng::from_str("\"02:aa:00:00:00:03\"").unwrap();
        assert_eq!(mac, Mac([0x02, 0xaa, 0, 0, 0, 3]));
        assert!(serde_yaml_ng::from_str::<Mac>("\"02:aa\"").is_err());
    }
}
