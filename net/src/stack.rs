// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Registration of net devices with the networking stack.

use crate::interface::{InterfaceIndex, InterfaceName};
use crate::netdev::NetDevice;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::num::NonZero;
use std::sync::Arc;
#[cfg(any(test, feature = "testing"))]
use std::sync::atomic::{AtomicUsize, Ordering};
use tracectl::trace_target;
use tracing::{debug, warn};

trace_target!("netstack", LevelFilter::INFO, &["net"]);

/// Errors which may occur when registering a [`NetDevice`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
    /// The device is already registered.
    #[error("net device is already registered")]
    AlreadyRegistered,
    /// Another device already uses the requested name.
    #[error("interface name {0} is taken")]
    NameTaken(InterfaceName),
    /// The stack ran out of interface names or indices.
    #[error("no free interface name or index")]
    Exhausted,
    /// Registration was refused by an injected failure.
    #[cfg(any(test, feature = "testing"))]
    #[error("injected registration failure")]
    Injected,
}

/// The networking stack, as seen by a driver.
pub trait NetStack: Send + Sync {
    /// Publish `dev`, assigning it a name and an index.
    ///
    /// # Errors
    ///
    /// See [`RegisterError`].
    fn register_netdev(&self, dev: &Arc<NetDevice>) -> Result<(), RegisterError>;

    /// Withdraw `dev`.  Unknown devices are ignored.
    fn unregister_netdev(&self, dev: &NetDevice);

    /// Look a registered device up by name.
    fn get_by_name(&self, name: &str) -> Option<Arc<NetDevice>>;

    /// Look a registered device up by index.
    fn get_by_index(&self, ifindex: InterfaceIndex) -> Option<Arc<NetDevice>>;

    /// All registered devices, in index order.
    fn devices(&self) -> Vec<Arc<NetDevice>>;
}

#[derive(Default)]
struct Tables {
    next_ifindex: u32,
    by_index: BTreeMap<InterfaceIndex, Arc<NetDevice>>,
    by_name: BTreeMap<InterfaceName, InterfaceIndex>,
}

impl Tables {
    fn free_eth_name(&self) -> Option<InterfaceName> {
        (0..u32::MAX)
            .filter_map(|n| InterfaceName::try_from(format!("eth{n}")).ok())
            .find(|name| !self.by_name.contains_key(name))
    }

    fn next_index(&mut self) -> Option<InterfaceIndex> {
        let next = self.next_ifindex.checked_add(1)?;
        self.next_ifindex = next;
        NonZero::new(next).map(InterfaceIndex::new)
    }
}

/// An in-process networking stack.
///
/// Indices are handed out monotonically starting at 1 and never reused.  Devices registered
/// without a name hint get the lowest free `eth<N>` name.
#[derive(Default)]
pub struct LocalNetStack {
    tables: Mutex<Tables>,
    #[cfg(any(test, feature = "testing"))]
    fail_register: AtomicUsize,
}

impl LocalNetStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` registrations fail.
    #[cfg(any(test, feature = "testing"))]
    pub fn fail_next_registrations(&self, count: usize) {
        self.fail_register.store(count, Ordering::SeqCst);
    }

    #[cfg(any(test, feature = "testing"))]
    fn injected_failure(&self) -> bool {
        self.fail_register
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Number of registered devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.lock().by_index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NetStack for LocalNetStack {
    fn register_netdev(&self, dev: &Arc<NetDevice>) -> Result<(), RegisterError> {
        #[cfg(any(test, feature = "testing"))]
        if self.injected_failure() {
            warn!("refusing registration of net device {}", dev.dev_addr());
            return Err(RegisterError::Injected);
        }
        if dev.is_registered() || dev.ifindex().is_some() {
            return Err(RegisterError::AlreadyRegistered);
        }
        let mut tables = self.tables.lock();
        let name = match dev.name_hint() {
            Some(hint) if tables.by_name.contains_key(hint) => {
                return Err(RegisterError::NameTaken(hint.clone()));
            }
            Some(hint) => hint.clone(),
            None => tables.free_eth_name().ok_or(RegisterError::Exhausted)?,
        };
        let ifindex = tables.next_index().ok_or(RegisterError::Exhausted)?;
        if !dev.mark_registered(name.clone(), ifindex) {
            return Err(RegisterError::AlreadyRegistered);
        }
        tables.by_name.insert(name.clone(), ifindex);
        tables.by_index.insert(ifindex, Arc::clone(dev));
        debug!("registered net device {name} (ifindex {ifindex})");
        Ok(())
    }

    fn unregister_netdev(&self, dev: &NetDevice) {
        let Some(ifindex) = dev.ifindex() else {
            warn!("unregister of a net device which was never registered");
            return;
        };
        let mut tables = self.tables.lock();
        if tables.by_index.remove(&ifindex).is_none() {
            warn!("unregister of unknown net device (ifindex {ifindex})");
            return;
        }
        if let Some(name) = dev.name() {
            tables.by_name.remove(name);
        }
        drop(tables);
        dev.mark_unregistered();
        debug!("unregistered net device with ifindex {ifindex}");
    }

    fn get_by_name(&self, name: &str) -> Option<Arc<NetDevice>> {
        let name = InterfaceName::try_from(name).ok()?;
        let tables = self.tables.lock();
        let ifindex = tables.by_name.get(&name)?;
        tables.by_index.get(ifindex).cloned()
    }

    fn get_by_index(&self, ifindex: InterfaceIndex) -> Option<Arc<NetDevice>> {
        self.tables.lock().by_index.get(&ifindex).cloned()
    }

    fn devices(&self) -> Vec<Arc<NetDevice>> {
        self.tables.lock().by_index.values().cloned().collect()
    }
}

#[cfg(test)]
mod test {
    use super::{LocalNetStack, NetStack, RegisterError};
    use crate::interface::InterfaceName;
    use crate::netdev::NetDevice;
    use std::sync::Arc;

    fn dev(hint: Option<&str>) -> Arc<NetDevice> {
        let mut dev = NetDevice::alloc_etherdev_mqs(1, 1).unwrap();
        if let Some(hint) = hint {
            dev.set_name_hint(InterfaceName::try_from(hint).unwrap());
        }
        Arc::new(dev)
    }

    #[test]
    fn names_and_indices() {
        let stack = LocalNetStack::new();
        let a = dev(None);
        let b = dev(Some("ens4_s3"));
        let c = dev(None);
        stack.register_netdev(&a).unwrap();
        stack.register_netdev(&b).unwrap();
        stack.register_netdev(&c).unwrap();
        assert_eq!(a.name().unwrap().as_ref(), "eth0");
        assert_eq!(b.name().unwrap().as_ref(), "ens4_s3");
        assert_eq!(c.name().unwrap().as_ref(), "eth1");
        assert_eq!(a.ifindex().unwrap().to_u32(), 1);
        assert_eq!(c.ifindex().unwrap().to_u32(), 3);
        assert!(Arc::ptr_eq(&stack.get_by_name("ens4_s3").unwrap(), &b));
        assert_eq!(stack.devices().len(), 3);

        stack.unregister_netdev(&b);
        assert!(!b.is_registered());
        assert!(stack.get_by_name("ens4_s3").is_none());
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn duplicate_names_and_double_registration() {
        let stack = LocalNetStack::new();
        let a = dev(Some("sf0"));
        let b = dev(Some("sf0"));
        stack.register_netdev(&a).unwrap();
        assert!(matches!(
            stack.register_netdev(&b),
            Err(RegisterError::NameTaken(_))
        ));
        assert_eq!(
            stack.register_netdev(&a),
            Err(RegisterError::AlreadyRegistered)
        );
    }

    #[test]
    fn injected_failures_are_consumed() {
        let stack = LocalNetStack::new();
        stack.fail_next_registrations(1);
        let a = dev(None);
        assert_eq!(stack.register_netdev(&a), Err(RegisterError::Injected));
        assert!(!a.is_registered());
        stack.register_netdev(&a).unwrap();
        assert!(a.is_registered());
    }
}
