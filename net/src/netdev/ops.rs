// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Operation tables a driver installs on a [`NetDevice`].

use crate::netdev::NetDevice;
use crate::vlan::Vid;
use serde::Serialize;

/// Errors returned by net device and ethtool operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetdevOpError {
    /// The device or queue cannot accept the request right now.
    #[error("device or resource busy")]
    Busy,
    /// The device is not up.
    #[error("network is down")]
    Down,
    /// A parameter of the request is out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The operation is not implemented by this device.
    #[error("operation not supported")]
    NotSupported,
}

/// Outcome of a transmit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetdevTx {
    /// The frame was consumed by the driver.
    Ok,
    /// The queue is stopped; the caller keeps the frame.
    Busy,
}

/// An attached XDP program.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct XdpProg {
    /// Program id as known to the loader.
    pub id: u32,
    /// Program name.
    pub name: String,
}

/// 64-bit interface counters.  Receive is not modeled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub tx_dropped: u64,
    pub tx_timeouts: u64,
    pub xdp_xmit: u64,
}

/// Driver information reported through ethtool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrvInfo {
    /// Driver name.
    pub driver: String,
    /// Bus address of the device the driver is bound to.
    pub bus_info: String,
}

/// Queue counts reported through ethtool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelCounts {
    pub rx: usize,
    pub tx: usize,
}

/// Driver callbacks of a net device.
///
/// All callbacks receive the device they are installed on.
pub trait NetDeviceOps: Send + Sync {
    /// Bring the device up.
    ///
    /// # Errors
    ///
    /// Driver specific.
    fn open(&self, dev: &NetDevice) -> Result<(), NetdevOpError>;

    /// Bring the device down.
    ///
    /// # Errors
    ///
    /// Driver specific.
    fn stop(&self, dev: &NetDevice) -> Result<(), NetdevOpError>;

    /// Transmit one frame on the given queue.
    fn start_xmit(&self, dev: &NetDevice, queue: usize, frame: &[u8]) -> NetdevTx;

    /// Start accepting frames tagged with `vid`.
    ///
    /// # Errors
    ///
    /// Driver specific.
    fn vlan_rx_add_vid(&self, dev: &NetDevice, vid: Vid) -> Result<(), NetdevOpError>;

    /// Stop accepting frames tagged with `vid`.
    ///
    /// # Errors
    ///
    /// Driver specific.
    fn vlan_rx_kill_vid(&self, dev: &NetDevice, vid: Vid) -> Result<(), NetdevOpError>;

    /// Change the MTU of the device.
    ///
    /// # Errors
    ///
    /// Returns [`NetdevOpError::InvalidArgument`] if the MTU is out of the device's range.
    fn change_mtu(&self, dev: &NetDevice, mtu: u32) -> Result<(), NetdevOpError>;

    /// Read the device counters.
    fn get_stats64(&self, dev: &NetDevice) -> LinkStats;

    /// The watchdog found `queue` stuck.
    fn tx_timeout(&self, dev: &NetDevice, queue: usize);

    /// Install (`Some`) or remove (`None`) an XDP program, returning the previous one.
    ///
    /// # Errors
    ///
    /// Driver specific.
    fn xdp_setup(
        &self,
        dev: &NetDevice,
        prog: Option<XdpProg>,
    ) -> Result<Option<XdpProg>, NetdevOpError>;

    /// Transmit redirected XDP frames, returning how many were sent.
    ///
    /// # Errors
    ///
    /// Driver specific.
    fn xdp_xmit(&self, dev: &NetDevice, frames: &[&[u8]]) -> Result<usize, NetdevOpError>;

    /// Kick an AF_XDP socket bound to `queue`.
    ///
    /// # Errors
    ///
    /// Driver specific.
    fn xsk_wakeup(&self, dev: &NetDevice, queue: usize) -> Result<(), NetdevOpError>;
}

/// Ethtool callbacks of a net device.
pub trait EthtoolOps: Send + Sync {
    /// Driver name and bus information.
    fn get_drvinfo(&self, dev: &NetDevice) -> DrvInfo;
    /// Whether the link is up.
    fn get_link(&self, dev: &NetDevice) -> bool;
    /// Number of RX and TX queues.
    fn get_channels(&self, dev: &NetDevice) -> ChannelCounts;
}
