// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! A model of a multi-queue ethernet net device.
//!
//! A [`NetDevice`] is configured while its allocator still owns it (queues, features, addresses,
//! op tables, private data) and then shared (`Arc<NetDevice>`) with a [`crate::stack::NetStack`]
//! for registration.  Everything that changes after registration (carrier, queue state, MTU,
//! counters) is interior-mutable.

pub mod features;
pub mod ops;

use crate::eth::mac::Mac;
use crate::interface::{InterfaceIndex, InterfaceName, OperationalState};
use crate::netdev::features::{NetdevFeatures, XdpFeatures};
use crate::netdev::ops::{
    ChannelCounts, DrvInfo, EthtoolOps, LinkStats, NetDeviceOps, NetdevOpError, NetdevTx, XdpProg,
};
use crate::vlan::Vid;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Minimum MTU of an ethernet device.
pub const ETH_MIN_MTU: u32 = 68;
/// Default MTU of an ethernet device.
pub const ETH_DATA_LEN: u32 = 1500;

/// Errors which may occur when allocating a [`NetDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NetdevAllocError {
    /// A net device needs at least one TX and one RX queue.
    #[error("cannot allocate a net device with {txq} tx and {rxq} rx queues")]
    NoQueues {
        /// Requested TX queues
        txq: usize,
        /// Requested RX queues
        rxq: usize,
    },
}

/// The management port a net device is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct DevlinkPortRef {
    /// Name of the devlink instance owning the port.
    pub instance: String,
    /// Index of the port within its instance.
    pub index: u32,
}

#[derive(Debug, Default)]
struct TxQueue {
    stopped: AtomicBool,
}

#[derive(Debug, Default)]
struct Counters {
    tx_packets: AtomicU64,
    tx_bytes: AtomicU64,
    tx_dropped: AtomicU64,
    tx_timeouts: AtomicU64,
    xdp_xmit: AtomicU64,
}

#[derive(Debug, Default)]
struct Runtime {
    vlans: BTreeSet<Vid>,
    xdp_prog: Option<XdpProg>,
}

/// A multi-queue ethernet device.
pub struct NetDevice {
    tx_queues: Vec<TxQueue>,
    num_rx_queues: usize,
    parent: Option<String>,
    name_hint: Option<InterfaceName>,
    features: NetdevFeatures,
    hw_features: NetdevFeatures,
    vlan_features: NetdevFeatures,
    xdp_features: XdpFeatures,
    dev_addr: Mac,
    perm_addr: Mac,
    min_mtu: u32,
    max_mtu: u32,
    ops: Option<Arc<dyn NetDeviceOps>>,
    ethtool_ops: Option<Arc<dyn EthtoolOps>>,
    devlink_port: Option<DevlinkPortRef>,
    private: Option<Box<dyn Any + Send + Sync>>,
    name: OnceLock<InterfaceName>,
    ifindex: OnceLock<InterfaceIndex>,
    registered: AtomicBool,
    up: AtomicBool,
    carrier: AtomicBool,
    mtu: AtomicU32,
    runtime: Mutex<Runtime>,
    counters: Counters,
}

impl Debug for NetDevice {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetDevice")
            .field("name", &self.name())
            .field("ifindex", &self.ifindex())
            .field("dev_addr", &self.dev_addr)
            .field("txq", &self.tx_queues.len())
            .field("rxq", &self.num_rx_queues)
            .field("registered", &self.is_registered())
            .field("carrier", &self.carrier_ok())
            .field("devlink_port", &self.devlink_port)
            .finish_non_exhaustive()
    }
}

impl NetDevice {
    /// Allocate an ethernet device with `txq` transmit and `rxq` receive queues.
    ///
    /// The device starts with every TX queue stopped, carrier off and the default ethernet MTU.
    ///
    /// # Errors
    ///
    /// Returns [`NetdevAllocError::NoQueues`] if either queue count is zero.
    pub fn alloc_etherdev_mqs(txq: usize, rxq: usize) -> Result<NetDevice, NetdevAllocError> {
        if txq == 0 || rxq == 0 {
            return Err(NetdevAllocError::NoQueues { txq, rxq });
        }
        let tx_queues = (0..txq)
            .map(|_| TxQueue {
                stopped: AtomicBool::new(true),
            })
            .collect();
        Ok(NetDevice {
            tx_queues,
            num_rx_queues: rxq,
            parent: None,
            name_hint: None,
            features: NetdevFeatures::empty(),
            hw_features: NetdevFeatures::empty(),
            vlan_features: NetdevFeatures::empty(),
            xdp_features: XdpFeatures::empty(),
            dev_addr: Mac::ZERO,
            perm_addr: Mac::ZERO,
            min_mtu: ETH_MIN_MTU,
            max_mtu: ETH_DATA_LEN,
            ops: None,
            ethtool_ops: None,
            devlink_port: None,
            private: None,
            name: OnceLock::new(),
            ifindex: OnceLock::new(),
            registered: AtomicBool::new(false),
            up: AtomicBool::new(false),
            carrier: AtomicBool::new(false),
            mtu: AtomicU32::new(ETH_DATA_LEN),
            runtime: Mutex::new(Runtime::default()),
            counters: Counters::default(),
        })
    }

    /// Set the name of the device this net device hangs off.
    pub fn set_parent(&mut self, parent: impl Into<String>) {
        self.parent = Some(parent.into());
    }

    /// Ask the stack for a specific name at registration.
    pub fn set_name_hint(&mut self, name: InterfaceName) {
        self.name_hint = Some(name);
    }

    /// Set the active, changeable and VLAN-inherited feature sets.
    pub fn set_features(
        &mut self,
        features: NetdevFeatures,
        hw_features: NetdevFeatures,
        vlan_features: NetdevFeatures,
    ) {
        self.features = features;
        self.hw_features = hw_features;
        self.vlan_features = vlan_features;
    }

    /// Set the advertised XDP capabilities.
    pub fn set_xdp_features(&mut self, xdp_features: XdpFeatures) {
        self.xdp_features = xdp_features;
    }

    /// Set both the current and the permanent hardware address.
    pub fn set_hw_addr(&mut self, mac: Mac) {
        self.dev_addr = mac;
        self.perm_addr = mac;
    }

    /// Set the legal MTU range.
    pub fn set_mtu_range(&mut self, min_mtu: u32, max_mtu: u32) {
        self.min_mtu = min_mtu;
        self.max_mtu = max_mtu;
    }

    /// Install the driver op table.
    pub fn set_ops(&mut self, ops: Arc<dyn NetDeviceOps>) {
        self.ops = Some(ops);
    }

    /// Install the ethtool op table.
    pub fn set_ethtool_ops(&mut self, ops: Arc<dyn EthtoolOps>) {
        self.ethtool_ops = Some(ops);
    }

    /// Bind the device to a management port.
    pub fn set_devlink_port(&mut self, port: DevlinkPortRef) {
        self.devlink_port = Some(port);
    }

    /// Attach driver private data.
    pub fn set_private<T: Any + Send + Sync>(&mut self, private: T) {
        self.private = Some(Box::new(private));
    }

    /// Driver private data, if it is of type `T`.
    #[must_use]
    pub fn private<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.private.as_ref().and_then(|p| p.downcast_ref::<T>())
    }

    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    #[must_use]
    pub fn name_hint(&self) -> Option<&InterfaceName> {
        self.name_hint.as_ref()
    }

    /// The name assigned by the stack at registration.
    #[must_use]
    pub fn name(&self) -> Option<&InterfaceName> {
        self.name.get()
    }

    /// The index assigned by the stack at registration.
    #[must_use]
    pub fn ifindex(&self) -> Option<InterfaceIndex> {
        self.ifindex.get().copied()
    }

    #[must_use]
    pub fn features(&self) -> NetdevFeatures {
        self.features
    }

    #[must_use]
    pub fn hw_features(&self) -> NetdevFeatures {
        self.hw_features
    }

    #[must_use]
    pub fn vlan_features(&self) -> NetdevFeatures {
        self.vlan_features
    }

    #[must_use]
    pub fn xdp_features(&self) -> XdpFeatures {
        self.xdp_features
    }

    #[must_use]
    pub fn dev_addr(&self) -> Mac {
        self.dev_addr
    }

    #[must_use]
    pub fn perm_addr(&self) -> Mac {
        self.perm_addr
    }

    #[must_use]
    pub fn devlink_port(&self) -> Option<&DevlinkPortRef> {
        self.devlink_port.as_ref()
    }

    #[must_use]
    pub fn ops(&self) -> Option<&Arc<dyn NetDeviceOps>> {
        self.ops.as_ref()
    }

    #[must_use]
    pub fn ethtool_ops(&self) -> Option<&Arc<dyn EthtoolOps>> {
        self.ethtool_ops.as_ref()
    }

    #[must_use]
    pub fn num_tx_queues(&self) -> usize {
        self.tx_queues.len()
    }

    #[must_use]
    pub fn num_rx_queues(&self) -> usize {
        self.num_rx_queues
    }

    #[must_use]
    pub fn min_mtu(&self) -> u32 {
        self.min_mtu
    }

    #[must_use]
    pub fn max_mtu(&self) -> u32 {
        self.max_mtu
    }

    #[must_use]
    pub fn mtu(&self) -> u32 {
        self.mtu.load(Ordering::Acquire)
    }

    /// Record a new MTU.  Range checks belong to the driver's `change_mtu`.
    pub fn set_mtu(&self, mtu: u32) {
        self.mtu.store(mtu, Ordering::Release);
    }

    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// Whether the device is administratively up.
    #[must_use]
    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn carrier_ok(&self) -> bool {
        self.carrier.load(Ordering::Acquire)
    }

    pub fn carrier_on(&self) {
        self.carrier.store(true, Ordering::Release);
    }

    pub fn carrier_off(&self) {
        self.carrier.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn oper_state(&self) -> OperationalState {
        if self.is_up() && self.carrier_ok() {
            OperationalState::Up
        } else {
            OperationalState::Down
        }
    }

    pub fn tx_stop_all_queues(&self) {
        for queue in &self.tx_queues {
            queue.stopped.store(true, Ordering::Release);
        }
    }

    pub fn tx_wake_all_queues(&self) {
        for queue in &self.tx_queues {
            queue.stopped.store(false, Ordering::Release);
        }
    }

    /// Whether TX queue `queue` is stopped.  Queues out of range read as stopped.
    #[must_use]
    pub fn tx_queue_stopped(&self, queue: usize) -> bool {
        self.tx_queues
            .get(queue)
            .is_none_or(|q| q.stopped.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn all_tx_queues_stopped(&self) -> bool {
        (0..self.tx_queues.len()).all(|q| self.tx_queue_stopped(q))
    }

    /// VLANs currently accepted on receive.
    #[must_use]
    pub fn vlans(&self) -> Vec<Vid> {
        self.runtime.lock().vlans.iter().copied().collect()
    }

    /// Record `vid` as accepted, returning false if it already was.
    pub fn vlan_insert(&self, vid: Vid) -> bool {
        self.runtime.lock().vlans.insert(vid)
    }

    /// Forget `vid`, returning false if it was not accepted.
    pub fn vlan_remove(&self, vid: Vid) -> bool {
        self.runtime.lock().vlans.remove(&vid)
    }

    #[must_use]
    pub fn xdp_prog(&self) -> Option<XdpProg> {
        self.runtime.lock().xdp_prog.clone()
    }

    /// Swap the attached XDP program, returning the previous one.
    pub fn replace_xdp_prog(&self, prog: Option<XdpProg>) -> Option<XdpProg> {
        std::mem::replace(&mut self.runtime.lock().xdp_prog, prog)
    }

    /// Account a transmitted frame.
    pub fn count_tx(&self, bytes: usize) {
        self.counters.tx_packets.fetch_add(1, Ordering::Relaxed);
        self.counters
            .tx_bytes
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn count_tx_dropped(&self) {
        self.counters.tx_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_tx_timeout(&self) {
        self.counters.tx_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_xdp_xmit(&self, frames: usize) {
        self.counters
            .xdp_xmit
            .fetch_add(frames as u64, Ordering::Relaxed);
    }

    /// Snapshot of the device counters.
    #[must_use]
    pub fn link_stats(&self) -> LinkStats {
        let c = &self.counters;
        LinkStats {
            tx_packets: c.tx_packets.load(Ordering::Relaxed),
            tx_bytes: c.tx_bytes.load(Ordering::Relaxed),
            tx_dropped: c.tx_dropped.load(Ordering::Relaxed),
            tx_timeouts: c.tx_timeouts.load(Ordering::Relaxed),
            xdp_xmit: c.xdp_xmit.load(Ordering::Relaxed),
        }
    }

    fn ops_or_unsupported(&self) -> Result<&Arc<dyn NetDeviceOps>, NetdevOpError> {
        self.ops.as_ref().ok_or(NetdevOpError::NotSupported)
    }

    /// Bring the device up (`ip link set up`).
    ///
    /// # Errors
    ///
    /// Returns [`NetdevOpError::Down`] if the device is not registered, or whatever the driver's
    /// `open` returns.
    pub fn open(&self) -> Result<(), NetdevOpError> {
        if !self.is_registered() {
            return Err(NetdevOpError::Down);
        }
        if self.is_up() {
            return Ok(());
        }
        self.ops_or_unsupported()?.open(self)?;
        self.up.store(true, Ordering::Release);
        Ok(())
    }

    /// Bring the device down (`ip link set down`).
    ///
    /// # Errors
    ///
    /// Whatever the driver's `stop` returns.
    pub fn close(&self) -> Result<(), NetdevOpError> {
        if !self.is_up() {
            return Ok(());
        }
        self.ops_or_unsupported()?.stop(self)?;
        self.up.store(false, Ordering::Release);
        Ok(())
    }

    /// Hand a frame to the driver.  Unregistered devices and devices without ops refuse it.
    pub fn xmit(&self, queue: usize, frame: &[u8]) -> NetdevTx {
        if !self.is_registered() {
            return NetdevTx::Busy;
        }
        match &self.ops {
            Some(ops) => ops.start_xmit(self, queue, frame),
            None => NetdevTx::Busy,
        }
    }

    /// Add a VLAN filter through the driver.
    ///
    /// # Errors
    ///
    /// Whatever the driver's `vlan_rx_add_vid` returns.
    pub fn add_vlan(&self, vid: Vid) -> Result<(), NetdevOpError> {
        self.ops_or_unsupported()?.vlan_rx_add_vid(self, vid)
    }

    /// Remove a VLAN filter through the driver.
    ///
    /// # Errors
    ///
    /// Whatever the driver's `vlan_rx_kill_vid` returns.
    pub fn kill_vlan(&self, vid: Vid) -> Result<(), NetdevOpError> {
        self.ops_or_unsupported()?.vlan_rx_kill_vid(self, vid)
    }

    /// Change the MTU through the driver.
    ///
    /// # Errors
    ///
    /// Whatever the driver's `change_mtu` returns.
    pub fn change_mtu(&self, mtu: u32) -> Result<(), NetdevOpError> {
        self.ops_or_unsupported()?.change_mtu(self, mtu)
    }

    /// Read counters through the driver (or directly if none is installed).
    #[must_use]
    pub fn stats64(&self) -> LinkStats {
        match &self.ops {
            Some(ops) => ops.get_stats64(self),
            None => self.link_stats(),
        }
    }

    /// Report a stuck TX queue to the driver.
    pub fn tx_timeout(&self, queue: usize) {
        if let Some(ops) = &self.ops {
            ops.tx_timeout(self, queue);
        }
    }

    /// Install or remove an XDP program through the driver.
    ///
    /// # Errors
    ///
    /// Whatever the driver's `xdp_setup` returns.
    pub fn xdp_setup(&self, prog: Option<XdpProg>) -> Result<Option<XdpProg>, NetdevOpError> {
        self.ops_or_unsupported()?.xdp_setup(self, prog)
    }

    /// Redirect XDP frames out of this device.
    ///
    /// # Errors
    ///
    /// Whatever the driver's `xdp_xmit` returns.
    pub fn xdp_xmit(&self, frames: &[&[u8]]) -> Result<usize, NetdevOpError> {
        self.ops_or_unsupported()?.xdp_xmit(self, frames)
    }

    /// Wake an AF_XDP socket through the driver.
    ///
    /// # Errors
    ///
    /// Whatever the driver's `xsk_wakeup` returns.
    pub fn xsk_wakeup(&self, queue: usize) -> Result<(), NetdevOpError> {
        self.ops_or_unsupported()?.xsk_wakeup(self, queue)
    }

    /// Driver information through ethtool.
    #[must_use]
    pub fn drvinfo(&self) -> Option<DrvInfo> {
        self.ethtool_ops.as_ref().map(|ops| ops.get_drvinfo(self))
    }

    /// Link state through ethtool.
    #[must_use]
    pub fn link(&self) -> Option<bool> {
        self.ethtool_ops.as_ref().map(|ops| ops.get_link(self))
    }

    /// Queue counts through ethtool.
    #[must_use]
    pub fn channels(&self) -> Option<ChannelCounts> {
        self.ethtool_ops.as_ref().map(|ops| ops.get_channels(self))
    }

    pub(crate) fn mark_registered(&self, name: InterfaceName, ifindex: InterfaceIndex) -> bool {
        if self.name.set(name).is_err() || self.ifindex.set(ifindex).is_err() {
            return false;
        }
        self.registered.store(true, Ordering::Release);
        true
    }

    pub(crate) fn mark_unregistered(&self) {
        self.up.store(false, Ordering::Release);
        self.carrier_off();
        self.tx_stop_all_queues();
        self.registered.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod test {
    use super::{NetDevice, NetdevAllocError};
    use crate::eth::mac::Mac;
    use crate::netdev::ops::{NetdevOpError, NetdevTx};

    #[test]
    fn queueless_devices_are_refused() {
        assert_eq!(
            NetDevice::alloc_etherdev_mqs(0, 4).unwrap_err(),
            NetdevAllocError::NoQueues { txq: 0, rxq: 4 }
        );
        assert!(NetDevice::alloc_etherdev_mqs(4, 0).is_err());
    }

    #[test]
    fn fresh_device_is_quiet() {
        let mut dev = NetDevice::alloc_etherdev_mqs(4, 2).unwrap();
        let mac: Mac = "02:aa:bb:cc:dd:01".parse().unwrap();
        dev.set_hw_addr(mac);
        dev.set_private(7u32);
        assert_eq!(dev.num_tx_queues(), 4);
        assert_eq!(dev.num_rx_queues(), 2);
        assert_eq!(dev.dev_addr(), mac);
        assert_eq!(dev.perm_addr(), mac);
        assert_eq!(dev.private::<u32>(), Some(&7));
        assert_eq!(dev.private::<u64>(), None);
        assert!(dev.all_tx_queues_stopped());
        assert!(!dev.carrier_ok());
        assert!(!dev.is_registered());
        assert_eq!(dev.xmit(0, &[0; 64]), NetdevTx::Busy);
        assert_eq!(dev.open(), Err(NetdevOpError::Down));
    }

    #[test]
    fn queue_state() {
        let dev = NetDevice::alloc_etherdev_mqs(2, 2).unwrap();
        dev.tx_wake_all_queues();
        assert!(!dev.tx_queue_stopped(0));
        assert!(!dev.tx_queue_stopped(1));
        assert!(dev.tx_queue_stopped(2));
        dev.tx_stop_all_queues();
        assert!(dev.all_tx_queues_stopped());
    }
}
