// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Interface indices, names and operational state.

use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};
use std::num::NonZero;

/// An ifindex: assigned by the stack at registration, never zero.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct InterfaceIndex(NonZero<u32>);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("interface index must not be zero")]
pub struct ZeroInterfaceIndex;

impl InterfaceIndex {
    pub fn new(raw: NonZero<u32>) -> Self {
        Self(raw)
    }

    pub fn try_new(raw: u32) -> Result<Self, ZeroInterfaceIndex> {
        NonZero::new(raw).map(Self).ok_or(ZeroInterfaceIndex)
    }

    pub fn to_u32(self) -> u32 {
        self.0.get()
    }
}

impl Debug for InterfaceIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl Display for InterfaceIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl TryFrom<u32> for InterfaceIndex {
    type Error = ZeroInterfaceIndex;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        Self::try_new(raw)
    }
}

impl From<InterfaceIndex> for u32 {
    fn from(index: InterfaceIndex) -> Self {
        index.to_u32()
    }
}

/// A legal interface name: 1 to 15 bytes of ASCII alphanumerics, `.`, `-` and `_`, and not
/// `.` or `..`.
#[repr(transparent)]
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InterfaceName(String);

impl InterfaceName {
    /// `IFNAMSIZ` less the terminating NUL.
    pub const MAX_LEN: usize = 15;

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Why a string is not an [`InterfaceName`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IllegalInterfaceName {
    #[error("interface name is empty")]
    Empty,
    #[error("'{0}' is not a usable interface name")]
    Dots(String),
    #[error("interface name '{0}' is longer than {max} bytes", max = InterfaceName::MAX_LEN)]
    TooLong(String),
    #[error("interface name '{0}' has characters other than ASCII alphanumerics and .-_")]
    IllegalCharacters(String),
}

impl TryFrom<String> for InterfaceName {
    type Error = IllegalInterfaceName;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        let legal = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_');
        match name.as_str() {
            "" => Err(IllegalInterfaceName::Empty),
            "." | ".." => Err(IllegalInterfaceName::Dots(name)),
            s if !s.chars().all(legal) => Err(IllegalInterfaceName::IllegalCharacters(name)),
            s if s.len() > Self::MAX_LEN => Err(IllegalInterfaceName::TooLong(name)),
            _ => Ok(Self(name)),
        }
    }
}

impl TryFrom<&str> for InterfaceName {
    type Error = IllegalInterfaceName;

    fn try_from(name: &str) -> Result<Self, Self::Error> {
        Self::try_from(name.to_string())
    }
}

impl From<InterfaceName> for String {
    fn from(name: InterfaceName) -> Self {
        name.0
    }
}

impl AsRef<str> for InterfaceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for InterfaceName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether an interface passes traffic: up and with carrier.
#[derive(Copy, Clone, Debug, Hash, Ord, PartialOrd, Eq, PartialEq, Serialize, Deserialize)]
#[derive(strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum OperationalState {
    Down,
    Up,
}
