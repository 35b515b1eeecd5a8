// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Devlink instances and the port operations a driver plugs into them.

use crate::extack::Extack;
use crate::port::{
    DevlinkPort, NetdevBinding, PortFlavour, PortFnOpState, PortFnState, PortIndex, PortNewAttrs,
};
use net::eth::mac::Mac;
use net::netdev::{DevlinkPortRef, NetDevice};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Weak;
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(any(test, feature = "testing"))]
use std::sync::atomic::AtomicUsize;
use tracectl::trace_target;
use tracing::{debug, warn};

trace_target!("devlink", LevelFilter::INFO, &["devlink"]);

const EOPNOTSUPP: i32 = 95;
const ENODEV: i32 = 19;

/// A (negative) errno returned by a port operation.  The reason is in the request's [`Extack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("port operation failed with errno {0}")]
pub struct Errno(pub i32);

/// Errors of devlink instance bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DevlinkError {
    /// A port with this index is already registered.
    #[error("port {0} already exists on {1}")]
    PortExists(PortIndex, String),
    /// No port with this index.
    #[error("no port {0} on {1}")]
    PortNotFound(PortIndex, String),
    /// The net device has not been registered with the stack yet.
    #[error("net device is not registered")]
    NetdevNotRegistered,
    /// Another instance already uses this handle.
    #[error("devlink instance {0} already exists")]
    InstanceExists(String),
    /// The instance is already registered.
    #[error("devlink instance {0} is already registered")]
    AlreadyRegistered(String),
    /// Registration was refused by an injected failure.
    #[cfg(any(test, feature = "testing"))]
    #[error("injected failure")]
    Injected,
}

/// Port function operations of a driver supporting dynamic ports.
///
/// Mirrors the `port_new`/`port_del` and `port_fn_*` callbacks of a devlink driver.  Failures
/// return a negative errno and describe themselves in `extack`.
pub trait PortOps: Send + Sync {
    /// Create a port.
    fn port_new(&self, attrs: &PortNewAttrs, extack: &mut Extack) -> Result<PortIndex, Errno>;

    /// Destroy a port created by [`PortOps::port_new`].
    fn port_del(&self, port: PortIndex, extack: &mut Extack) -> Result<(), Errno>;

    /// Administrative and operational state of the port function.
    fn port_fn_state_get(
        &self,
        port: PortIndex,
        extack: &mut Extack,
    ) -> Result<(PortFnState, PortFnOpState), Errno>;

    /// Activate or deactivate the port function.
    fn port_fn_state_set(
        &self,
        port: PortIndex,
        state: PortFnState,
        extack: &mut Extack,
    ) -> Result<(), Errno>;

    /// Hardware address of the port function.
    fn port_fn_hw_addr_get(&self, port: PortIndex, extack: &mut Extack) -> Result<Mac, Errno>;

    /// Change the hardware address of the port function.
    fn port_fn_hw_addr_set(
        &self,
        port: PortIndex,
        mac: Mac,
        extack: &mut Extack,
    ) -> Result<(), Errno>;
}

/// A devlink instance: one per device (PCI function, auxiliary device, ...).
pub struct Devlink {
    handle: String,
    registered: AtomicBool,
    ports: Mutex<BTreeMap<PortIndex, DevlinkPort>>,
    ops: Mutex<Option<Weak<dyn PortOps>>>,
    #[cfg(any(test, feature = "testing"))]
    fail_port_register: AtomicUsize,
}

impl std::fmt::Debug for Devlink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Devlink")
            .field("handle", &self.handle)
            .field("registered", &self.is_registered())
            .field("ports", &self.ports.lock().len())
            .finish_non_exhaustive()
    }
}

impl Devlink {
    /// Allocate an instance for the device `bus/device` (e.g. `pci/0000:3b:00.0`).
    #[must_use]
    pub fn alloc(bus: &str, device: &str) -> Self {
        Self {
            handle: format!("{bus}/{device}"),
            registered: AtomicBool::new(false),
            ports: Mutex::new(BTreeMap::new()),
            ops: Mutex::new(None),
            #[cfg(any(test, feature = "testing"))]
            fail_port_register: AtomicUsize::new(0),
        }
    }

    /// The `bus/device` handle of the instance.
    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    pub(crate) fn set_registered(&self, registered: bool) -> bool {
        self.registered.swap(registered, Ordering::AcqRel)
    }

    /// Plug in the driver's port operations.  The instance does not keep the driver alive.
    pub fn set_port_ops(&self, ops: Weak<dyn PortOps>) {
        *self.ops.lock() = Some(ops);
    }

    /// Make the next `count` port registrations fail.
    #[cfg(any(test, feature = "testing"))]
    pub fn fail_next_port_registrations(&self, count: usize) {
        self.fail_port_register.store(count, Ordering::SeqCst);
    }

    /// Register a port.
    pub fn port_register(&self, index: PortIndex, flavour: PortFlavour) -> Result<(), DevlinkError> {
        #[cfg(any(test, feature = "testing"))]
        if self
            .fail_port_register
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(DevlinkError::Injected);
        }
        let mut ports = self.ports.lock();
        if ports.contains_key(&index) {
            return Err(DevlinkError::PortExists(index, self.handle.clone()));
        }
        ports.insert(
            index,
            DevlinkPort {
                index,
                flavour,
                netdev: None,
            },
        );
        debug!("{}: registered port {index} ({flavour})", self.handle);
        Ok(())
    }

    /// Unregister a port.  Returns the port as it was.
    pub fn port_unregister(&self, index: PortIndex) -> Option<DevlinkPort> {
        let port = self.ports.lock().remove(&index);
        match &port {
            None => warn!("{}: unregister of unknown port {index}", self.handle),
            Some(port) => {
                if let Some(netdev) = &port.netdev {
                    warn!(
                        "{}: port {index} unregistered while paired with {}",
                        self.handle, netdev.name
                    );
                }
                debug!("{}: unregistered port {index}", self.handle);
            }
        }
        port
    }

    /// Pair a port with a registered net device.
    pub fn port_set_netdev(&self, index: PortIndex, netdev: &NetDevice) -> Result<(), DevlinkError> {
        let (Some(ifindex), Some(name)) = (netdev.ifindex(), netdev.name()) else {
            return Err(DevlinkError::NetdevNotRegistered);
        };
        let mut ports = self.ports.lock();
        let port = ports
            .get_mut(&index)
            .ok_or_else(|| DevlinkError::PortNotFound(index, self.handle.clone()))?;
        port.netdev = Some(NetdevBinding {
            ifindex,
            name: name.clone(),
        });
        Ok(())
    }

    /// Forget the net device paired with a port.
    pub fn port_clear_netdev(&self, index: PortIndex) {
        if let Some(port) = self.ports.lock().get_mut(&index) {
            port.netdev = None;
        }
    }

    /// A reference to port `index` suitable for binding a net device to it.
    pub fn port_ref(&self, index: PortIndex) -> DevlinkPortRef {
        DevlinkPortRef {
            instance: self.handle.clone(),
            index: index.into_raw(),
        }
    }

    pub fn port(&self, index: PortIndex) -> Option<DevlinkPort> {
        self.ports.lock().get(&index).cloned()
    }

    /// Every port, in index order.
    pub fn ports(&self) -> Vec<DevlinkPort> {
        self.ports.lock().values().cloned().collect()
    }

    fn with_ops<T>(
        &self,
        extack: &mut Extack,
        what: &str,
        f: impl FnOnce(&dyn PortOps, &mut Extack) -> Result<T, Errno>,
    ) -> Result<T, Errno> {
        let ops = self.ops.lock().as_ref().and_then(Weak::upgrade);
        let Some(ops) = ops else {
            extack.set_msg(format!("{what} is not supported"));
            return Err(Errno(-EOPNOTSUPP));
        };
        f(ops.as_ref(), extack)
    }

    fn check_port(&self, index: PortIndex, extack: &mut Extack) -> Result<(), Errno> {
        if self.ports.lock().contains_key(&index) {
            Ok(())
        } else {
            extack.set_msg("Port does not exist");
            Err(Errno(-ENODEV))
        }
    }

    /// `devlink port add`
    pub fn port_new(&self, attrs: &PortNewAttrs, extack: &mut Extack) -> Result<PortIndex, Errno> {
        self.with_ops(extack, "Port add", |ops, extack| ops.port_new(attrs, extack))
    }

    /// `devlink port del`
    pub fn port_del(&self, index: PortIndex, extack: &mut Extack) -> Result<(), Errno> {
        self.check_port(index, extack)?;
        self.with_ops(extack, "Port del", |ops, extack| ops.port_del(index, extack))
    }

    /// `devlink port function show` (state part)
    pub fn port_fn_state_get(
        &self,
        index: PortIndex,
        extack: &mut Extack,
    ) -> Result<(PortFnState, PortFnOpState), Errno> {
        self.check_port(index, extack)?;
        self.with_ops(extack, "Port function state", |ops, extack| {
            ops.port_fn_state_get(index, extack)
        })
    }

    /// `devlink port function set state`
    pub fn port_fn_state_set(
        &self,
        index: PortIndex,
        state: PortFnState,
        extack: &mut Extack,
    ) -> Result<(), Errno> {
        self.check_port(index, extack)?;
        self.with_ops(extack, "Port function state", |ops, extack| {
            ops.port_fn_state_set(index, state, extack)
        })
    }

    /// `devlink port function show` (hw_addr part)
    pub fn port_fn_hw_addr_get(&self, index: PortIndex, extack: &mut Extack) -> Result<Mac, Errno> {
        self.check_port(index, extack)?;
        self.with_ops(extack, "Port function hw_addr", |ops, extack| {
            ops.port_fn_hw_addr_get(index, extack)
        })
    }

    /// `devlink port function set hw_addr`
    pub fn port_fn_hw_addr_set(
        &self,
        index: PortIndex,
        mac: Mac,
        extack: &mut Extack,
    ) -> Result<(), Errno> {
        self.check_port(index, extack)?;
        self.with_ops(extack, "Port function hw_addr", |ops, extack| {
            ops.port_fn_hw_addr_set(index, mac, extack)
        })
    }
}

#[cfg(test)]
mod test {
    use super::{Devlink, DevlinkError, Errno, PortOps};
    use crate::extack::Extack;
    use crate::port::{
        PciSfAttrs, PortFlavour, PortFnOpState, PortFnState, PortIndex, PortNewAttrs,
    };
    use net::eth::mac::Mac;
    use net::netdev::NetDevice;
    use net::stack::{LocalNetStack, NetStack};
    use parking_lot::Mutex;
    use std::sync::{Arc, Weak};

    fn sf_flavour(sf: u32) -> PortFlavour {
        PortFlavour::PciSf(PciSfAttrs {
            controller: 0,
            pf: 0,
            sf,
            external: false,
        })
    }

    #[test]
    fn ports_are_unique() {
        let devlink = Devlink::alloc("pci", "0000:3b:00.0");
        let idx = PortIndex::from_raw(1);
        devlink.port_register(idx, sf_flavour(3)).unwrap();
        assert!(matches!(
            devlink.port_register(idx, PortFlavour::Virtual),
            Err(DevlinkError::PortExists(..))
        ));
        assert_eq!(devlink.ports().len(), 1);
        assert_eq!(
            devlink.port(idx).unwrap().flavour().pci_sf().unwrap().sf,
            3
        );
        assert!(devlink.port_unregister(idx).is_some());
        assert!(devlink.port_unregister(idx).is_none());
    }

    #[test]
    fn netdev_pairing_needs_a_registered_netdev() {
        let devlink = Devlink::alloc("auxiliary", "ice.sf.1");
        let idx = PortIndex::from_raw(0);
        devlink.port_register(idx, PortFlavour::Virtual).unwrap();
        let mut netdev = NetDevice::alloc_etherdev_mqs(1, 1).unwrap();
        netdev.set_devlink_port(devlink.port_ref(idx));
        let netdev = Arc::new(netdev);
        assert_eq!(
            devlink.port_set_netdev(idx, &netdev),
            Err(DevlinkError::NetdevNotRegistered)
        );
        let stack = LocalNetStack::new();
        stack.register_netdev(&netdev).unwrap();
        devlink.port_set_netdev(idx, &netdev).unwrap();
        let port = devlink.port(idx).unwrap();
        assert_eq!(port.netdev().unwrap().ifindex, netdev.ifindex().unwrap());
        assert_eq!(netdev.devlink_port().unwrap().instance, "auxiliary/ice.sf.1");
        devlink.port_clear_netdev(idx);
        assert!(devlink.port(idx).unwrap().netdev().is_none());
    }

    #[test]
    fn injected_port_registration_failure() {
        let devlink = Devlink::alloc("pci", "0000:3b:00.0");
        devlink.fail_next_port_registrations(1);
        assert_eq!(
            devlink.port_register(PortIndex::from_raw(1), PortFlavour::Virtual),
            Err(DevlinkError::Injected)
        );
        devlink
            .port_register(PortIndex::from_raw(1), PortFlavour::Virtual)
            .unwrap();
    }

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl PortOps for Recorder {
        fn port_new(&self, attrs: &PortNewAttrs, _: &mut Extack) -> Result<PortIndex, Errno> {
            self.calls.lock().push(format!("new {:?}", attrs.sfnum));
            Ok(PortIndex::from_raw(1))
        }

        fn port_del(&self, port: PortIndex, _: &mut Extack) -> Result<(), Errno> {
            self.calls.lock().push(format!("del {port}"));
            Ok(())
        }

        fn port_fn_state_get(
            &self,
            _: PortIndex,
            _: &mut Extack,
        ) -> Result<(PortFnState, PortFnOpState), Errno> {
            Ok((PortFnState::Inactive, PortFnOpState::Detached))
        }

        fn port_fn_state_set(
            &self,
            port: PortIndex,
            state: PortFnState,
            _: &mut Extack,
        ) -> Result<(), Errno> {
            self.calls.lock().push(format!("state {port} {state}"));
            Ok(())
        }

        fn port_fn_hw_addr_get(&self, _: PortIndex, _: &mut Extack) -> Result<Mac, Errno> {
            Ok(Mac([0x02, 0, 0, 0, 0, 1]))
        }

        fn port_fn_hw_addr_set(
            &self,
            _: PortIndex,
            _: Mac,
            extack: &mut Extack,
        ) -> Result<(), Errno> {
            extack.set_msg("Setting hw_addr is not supported");
            Err(Errno(-95))
        }
    }

    #[test]
    fn requests_are_dispatched_to_the_driver() {
        let devlink = Devlink::alloc("pci", "0000:3b:00.0");
        let mut extack = Extack::new();
        let attrs = PortNewAttrs::pci_sf(0, Some(3), Mac([0x02, 0, 0, 0, 0, 1]));
        assert_eq!(devlink.port_new(&attrs, &mut extack), Err(Errno(-95)));
        assert_eq!(extack.msg(), Some("Port add is not supported"));

        let recorder = Arc::new(Recorder::default());
        let weak: Weak<dyn PortOps> = Arc::downgrade(&recorder) as Weak<dyn PortOps>;
        devlink.set_port_ops(weak);
        let idx = devlink.port_new(&attrs, &mut extack).unwrap();
        assert_eq!(
            devlink.port_fn_state_set(idx, PortFnState::Active, &mut Extack::new()),
            Err(Errno(-19))
        );
        devlink.port_register(idx, sf_flavour(3)).unwrap();
        devlink
            .port_fn_state_set(idx, PortFnState::Active, &mut Extack::new())
            .unwrap();
        let mut extack = Extack::new();
        assert_eq!(
            devlink.port_fn_hw_addr_set(idx, Mac([0x02, 0, 0, 0, 0, 2]), &mut extack),
            Err(Errno(-95))
        );
        assert_eq!(extack.msg(), Some("Setting hw_addr is not supported"));
        devlink.port_del(idx, &mut Extack::new()).unwrap();
        assert_eq!(
            *recorder.calls.lock(),
            vec!["new Some(3)", "state 1 active", "del 1"]
        );

        drop(recorder);
        assert_eq!(
            devlink.port_del(idx, &mut Extack::new()),
            Err(Errno(-95))
        );
    }
}
