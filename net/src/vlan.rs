// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! VLAN ids.

use std::num::NonZero;

/// A VLAN id in `1..=4094`.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Vid(NonZero<u16>);

#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidVid {
    /// Priority tagged frames carry VID 0.
    #[error("VLAN id 0 is reserved")]
    Zero,
    #[error("VLAN id {0} is reserved or does not fit in 12 bits")]
    OutOfRange(u16),
}

impl Vid {
    const LAST: u16 = 4094;

    pub fn new(vid: u16) -> Result<Self, InvalidVid> {
        match NonZero::new(vid) {
            None => Err(InvalidVid::Zero),
            Some(_) if vid > Self::LAST => Err(InvalidVid::OutOfRange(vid)),
            Some(vid) => Ok(Self(vid)),
        }
    }

    pub const fn as_u16(self) -> u16 {
        self.0.get()
    }
}

impl From<Vid> for u16 {
    fn from(vid: Vid) -> u16 {
        vid.as_u16()
    }
}

impl TryFrom<u16> for Vid {
    type Error = InvalidVid;

    fn try_from(vid: u16) -> Result<Vid, Self::Error> {
        Vid::new(vid)
    }
}

impl std::fmt::Display for Vid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

#[cfg(test)]
mod test {
    use super::{InvalidVid, Vid};

    #[test]
    fn vid_bounds() {
        assert_eq!(Vid::new(0), Err(InvalidVid::Zero));
        assert_eq!(Vid::new(4095), Err(InvalidVid::OutOfRange(4095)));
        assert_eq!(Vid::new(4096), Err(InvalidVid::OutOfRange(4096)));
        assert_eq!(Vid::new(4094).map(Vid::as_u16), Ok(4094));
        assert_eq!(u16::from(Vid::new(1).unwrap()), 1);
    }
}
