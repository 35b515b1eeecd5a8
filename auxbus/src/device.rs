// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use std::fmt::{Debug, Display, Formatter};
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// A read-only device attribute (a sysfs file of the device).
pub struct DeviceAttribute<T: Send + Sync + 'static> {
    /// File name.
    pub name: &'static str,
    /// Renders the file contents.
    pub show: fn(&AuxDevice<T>) -> String,
}

/// Everything [`crate::AuxiliaryBus::device_init`] needs besides the payload.
pub struct AuxDeviceConfig<T: Send + Sync + 'static> {
    /// Device name; the bus name is `<module>.<name>.<id>`.
    pub name: &'static str,
    /// Device id, unique among devices of the same name.
    pub id: u32,
    /// Name of the parent device.
    pub parent: Option<String>,
    /// Attribute groups exposed by the device.
    pub groups: &'static [&'static [DeviceAttribute<T>]],
    /// Called with the payload and the id once the last reference to the device is gone.
    pub release: fn(T, u32),
}

/// Why a device could not be initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InitFailure {
    /// Auxiliary devices must hang off a parent.
    #[error("auxiliary device has no parent")]
    NoParent,
    /// Names must be non-empty and must not contain `.`.
    #[error("invalid auxiliary device name {0:?}")]
    InvalidName(&'static str),
    /// Refused by an injected failure.
    #[cfg(any(test, feature = "testing"))]
    #[error("injected failure")]
    Injected,
}

/// A failed [`crate::AuxiliaryBus::device_init`].  The release function was not armed and the
/// payload is handed back.
pub struct InitError<T> {
    pub payload: T,
    pub reason: InitFailure,
}

impl<T> Debug for InitError<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitError")
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

impl<T> Display for InitError<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "auxiliary device init failed: {}", self.reason)
    }
}

impl<T> std::error::Error for InitError<T> {}

struct DeviceInner<T: Send + Sync + 'static> {
    name: &'static str,
    id: u32,
    parent: String,
    groups: &'static [&'static [DeviceAttribute<T>]],
    release: fn(T, u32),
    dev_name: OnceLock<String>,
    payload: Option<T>,
}

impl<T: Send + Sync + 'static> Drop for DeviceInner<T> {
    fn drop(&mut self) {
        if let Some(payload) = self.payload.take() {
            debug!(
                "releasing auxiliary device {}",
                self.dev_name.get().map_or(self.name, String::as_str)
            );
            (self.release)(payload, self.id);
        }
    }
}

/// A reference to an auxiliary device.
///
/// Cloning takes another reference; dropping (or [`AuxDevice::uninit`]) gives one back.  The
/// release function runs when the last reference is gone.
pub struct AuxDevice<T: Send + Sync + 'static>(Arc<DeviceInner<T>>);

impl<T: Send + Sync + 'static> Clone for AuxDevice<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Send + Sync + 'static> Debug for AuxDevice<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuxDevice")
            .field("name", &self.0.name)
            .field("id", &self.0.id)
            .field("dev_name", &self.0.dev_name.get())
            .field("parent", &self.0.parent)
            .finish_non_exhaustive()
    }
}

impl<T: Send + Sync + 'static> AuxDevice<T> {
    pub(crate) fn init(config: AuxDeviceConfig<T>, payload: T) -> Result<Self, InitError<T>> {
        let Some(parent) = config.parent else {
            return Err(InitError {
                payload,
                reason: InitFailure::NoParent,
            });
        };
        if config.name.is_empty() || config.name.contains('.') {
            return Err(InitError {
                payload,
                reason: InitFailure::InvalidName(config.name),
            });
        }
        Ok(Self(Arc::new(DeviceInner {
            name: config.name,
            id: config.id,
            parent,
            groups: config.groups,
            release: config.release,
            dev_name: OnceLock::new(),
            payload: Some(payload),
        })))
    }

    /// Give back the reference taken by init.
    pub fn uninit(self) {
        drop(self);
    }

    /// The short device name (`sf`).
    pub fn name(&self) -> &'static str {
        self.0.name
    }

    pub fn id(&self) -> u32 {
        self.0.id
    }

    pub fn parent(&self) -> &str {
        &self.0.parent
    }

    /// The bus name (`ice.sf.1`), once the device has been added.
    pub fn dev_name(&self) -> Option<&str> {
        self.0.dev_name.get().map(String::as_str)
    }

    pub(crate) fn set_dev_name(&self, dev_name: String) -> bool {
        self.0.dev_name.set(dev_name).is_ok()
    }

    /// The payload handed over at init.
    pub fn payload(&self) -> &T {
        match &self.0.payload {
            Some(payload) => payload,
            None => unreachable!("auxiliary device payload taken before release"),
        }
    }

    /// Number of live references to the device.
    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Names of every attribute of the device.
    pub fn attributes(&self) -> Vec<&'static str> {
        self.0
            .groups
            .iter()
            .flat_map(|group| group.iter().map(|attr| attr.name))
            .collect()
    }

    /// Read attribute `name`.
    pub fn show_attr(&self, name: &str) -> Option<String> {
        self.0
            .groups
            .iter()
            .flat_map(|group| group.iter())
            .find(|attr| attr.name == name)
            .map(|attr| (attr.show)(self))
    }
}
