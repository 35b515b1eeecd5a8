// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Net devices of subfunctions: construction and the driver op tables.

use crate::error::SfError;
use hardware::nic::Nic;
use hardware::vsi::{Vsi, VsiIdx, VsiState};
use net::eth::mac::Mac;
use net::interface::InterfaceName;
use net::netdev::features::{NetdevFeatures, XdpFeatures};
use net::netdev::ops::{
    ChannelCounts, DrvInfo, EthtoolOps, LinkStats, NetDeviceOps, NetdevOpError, NetdevTx, XdpProg,
};
use net::netdev::{DevlinkPortRef, ETH_MIN_MTU, NetDevice};
use net::stack::NetStack;
use net::vlan::Vid;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracectl::trace_target;
use tracing::{debug, info, warn};

trace_target!("sf-netdev", LevelFilter::INFO, &["sf"]);

/// Largest MTU a subfunction net device accepts.
pub const SF_MAX_MTU: u32 = 9702;

/// Driver name reported through ethtool.
pub const SF_NETDEV_DRIVER: &str = "ice";

/// Feature sets of a subfunction net device, as `(features, hw_features, vlan_features)`.
///
/// S-tag filtering is only offered in double VLAN mode.
pub fn standard_features(double_vlan: bool) -> (NetdevFeatures, NetdevFeatures, NetdevFeatures) {
    let dflt = NetdevFeatures::SG
        | NetdevFeatures::HIGHDMA
        | NetdevFeatures::NTUPLE
        | NetdevFeatures::RXHASH;
    let csumo = NetdevFeatures::RXCSUM | NetdevFeatures::CSUM;
    let mut vlano = NetdevFeatures::VLAN_CTAG;
    if double_vlan {
        vlano |= NetdevFeatures::HW_VLAN_STAG_FILTER;
    }
    let tso = NetdevFeatures::TSO
        | NetdevFeatures::TSO_ECN
        | NetdevFeatures::TSO6
        | NetdevFeatures::GSO_UDP_L4
        | NetdevFeatures::TUNNEL_GSO;

    let features = dflt | csumo | vlano | tso;
    let mut hw_features = features
        | NetdevFeatures::HW_TC
        | NetdevFeatures::LOOPBACK
        | NetdevFeatures::RXFCS;
    if double_vlan {
        hw_features |= NetdevFeatures::HW_VLAN_STAG_RX | NetdevFeatures::HW_VLAN_STAG_TX;
    }
    (features, hw_features, dflt | csumo | tso)
}

/// XDP capabilities of a subfunction net device.
pub fn xdp_features() -> XdpFeatures {
    XdpFeatures::BASIC | XdpFeatures::REDIRECT | XdpFeatures::XSK_ZEROCOPY | XdpFeatures::RX_SG
}

/// Private data of a subfunction net device.
#[derive(Debug)]
pub struct SfNetdevPriv {
    vsi: Weak<Mutex<Vsi>>,
    vsi_idx: VsiIdx,
}

impl SfNetdevPriv {
    pub fn vsi_idx(&self) -> VsiIdx {
        self.vsi_idx
    }

    fn vsi(&self) -> Result<Arc<Mutex<Vsi>>, NetdevOpError> {
        self.vsi.upgrade().ok_or(NetdevOpError::Down)
    }
}

fn sf_priv(dev: &NetDevice) -> Result<&SfNetdevPriv, NetdevOpError> {
    dev.private::<SfNetdevPriv>().ok_or(NetdevOpError::NotSupported)
}

fn vsi_down(dev: &NetDevice) -> bool {
    sf_priv(dev)
        .and_then(SfNetdevPriv::vsi)
        .map_or(true, |vsi| vsi.lock().state().contains(VsiState::DOWN))
}

/// Net device op table of subfunctions.
pub struct SfNetdevOps {
    nic: Arc<dyn Nic>,
}

impl SfNetdevOps {
    pub fn new(nic: Arc<dyn Nic>) -> Self {
        Self { nic }
    }
}

impl NetDeviceOps for SfNetdevOps {
    fn open(&self, dev: &NetDevice) -> Result<(), NetdevOpError> {
        let vsi = sf_priv(dev)?.vsi()?;
        {
            let mut vsi = vsi.lock();
            if !vsi.is_configured() {
                return Err(NetdevOpError::Down);
            }
            vsi.clear_state(VsiState::DOWN);
        }
        if self.nic.link_up() {
            dev.carrier_on();
        }
        dev.tx_wake_all_queues();
        Ok(())
    }

    fn stop(&self, dev: &NetDevice) -> Result<(), NetdevOpError> {
        dev.carrier_off();
        dev.tx_stop_all_queues();
        if let Ok(vsi) = sf_priv(dev).and_then(SfNetdevPriv::vsi) {
            vsi.lock().set_state(VsiState::DOWN);
        }
        Ok(())
    }

    fn start_xmit(&self, dev: &NetDevice, queue: usize, frame: &[u8]) -> NetdevTx {
        if dev.tx_queue_stopped(queue) {
            return NetdevTx::Busy;
        }
        if vsi_down(dev) {
            dev.count_tx_dropped();
            return NetdevTx::Ok;
        }
        dev.count_tx(frame.len());
        NetdevTx::Ok
    }

    fn vlan_rx_add_vid(&self, dev: &NetDevice, vid: Vid) -> Result<(), NetdevOpError> {
        if !dev.vlan_insert(vid) {
            debug!("VLAN {} already enabled", vid.as_u16());
        }
        Ok(())
    }

    fn vlan_rx_kill_vid(&self, dev: &NetDevice, vid: Vid) -> Result<(), NetdevOpError> {
        dev.vlan_remove(vid);
        Ok(())
    }

    fn change_mtu(&self, dev: &NetDevice, mtu: u32) -> Result<(), NetdevOpError> {
        if !(dev.min_mtu()..=dev.max_mtu()).contains(&mtu) {
            return Err(NetdevOpError::InvalidArgument(format!(
                "MTU {mtu} out of range {}..={}",
                dev.min_mtu(),
                dev.max_mtu()
            )));
        }
        dev.set_mtu(mtu);
        Ok(())
    }

    fn get_stats64(&self, dev: &NetDevice) -> LinkStats {
        dev.link_stats()
    }

    fn tx_timeout(&self, dev: &NetDevice, queue: usize) {
        warn!(
            "{}: TX timeout on queue {queue}",
            dev.name().map_or_else(String::new, ToString::to_string)
        );
        dev.count_tx_timeout();
    }

    fn xdp_setup(
        &self,
        dev: &NetDevice,
        prog: Option<XdpProg>,
    ) -> Result<Option<XdpProg>, NetdevOpError> {
        Ok(dev.replace_xdp_prog(prog))
    }

    fn xdp_xmit(&self, dev: &NetDevice, frames: &[&[u8]]) -> Result<usize, NetdevOpError> {
        if vsi_down(dev) {
            return Err(NetdevOpError::Down);
        }
        if dev.xdp_prog().is_none() {
            return Err(NetdevOpError::NotSupported);
        }
        dev.count_xdp_xmit(frames.len());
        Ok(frames.len())
    }

    fn xsk_wakeup(&self, dev: &NetDevice, queue: usize) -> Result<(), NetdevOpError> {
        if vsi_down(dev) || !dev.carrier_ok() {
            return Err(NetdevOpError::Down);
        }
        if dev.xdp_prog().is_none() {
            return Err(NetdevOpError::InvalidArgument("no XDP program".to_string()));
        }
        if queue >= dev.num_rx_queues() {
            return Err(NetdevOpError::InvalidArgument(format!("no queue {queue}")));
        }
        Ok(())
    }
}

/// Ethtool op table of subfunctions.
#[derive(Debug, Default)]
pub struct SfEthtoolOps;

impl EthtoolOps for SfEthtoolOps {
    fn get_drvinfo(&self, dev: &NetDevice) -> DrvInfo {
        DrvInfo {
            driver: SF_NETDEV_DRIVER.to_string(),
            bus_info: dev.parent().unwrap_or_default().to_string(),
        }
    }

    fn get_link(&self, dev: &NetDevice) -> bool {
        dev.carrier_ok()
    }

    fn get_channels(&self, dev: &NetDevice) -> ChannelCounts {
        ChannelCounts {
            rx: dev.num_rx_queues(),
            tx: dev.num_tx_queues(),
        }
    }
}

/// What [`build`] needs besides the VSI.
#[derive(Debug, Clone)]
pub(crate) struct NetdevSpec {
    /// Bus name of the auxiliary device.
    pub(crate) parent: String,
    pub(crate) hw_addr: Mac,
    /// Admin port the device is bound to.
    pub(crate) port: DevlinkPortRef,
    /// Requested interface name.
    pub(crate) name: Option<InterfaceName>,
    pub(crate) double_vlan: bool,
}

/// Create and register the net device of a configured subfunction VSI.
///
/// On success the VSI owns the device, which is registered with carrier off and every TX
/// queue stopped.  On failure the VSI is left without a device.
pub(crate) fn build(
    vsi: &Arc<Mutex<Vsi>>,
    spec: NetdevSpec,
    nic: &Arc<dyn Nic>,
    stack: &dyn NetStack,
) -> Result<Arc<NetDevice>, SfError> {
    let (vsi_idx, txq, rxq) = {
        let vsi = vsi.lock();
        (vsi.idx(), vsi.alloc_txq(), vsi.alloc_rxq())
    };
    let mut netdev = NetDevice::alloc_etherdev_mqs(usize::from(txq), usize::from(rxq))
        .map_err(|e| SfError::NetdevAllocFailed(e.to_string()))?;
    netdev.set_private(SfNetdevPriv {
        vsi: Arc::downgrade(vsi),
        vsi_idx,
    });
    netdev.set_parent(spec.parent);
    vsi.lock().set_state(VsiState::NETDEV_ALLOCD);

    let (features, hw_features, vlan_features) = standard_features(spec.double_vlan);
    netdev.set_features(features, hw_features, vlan_features);
    netdev.set_xdp_features(xdp_features());
    netdev.set_hw_addr(spec.hw_addr);
    netdev.set_mtu_range(ETH_MIN_MTU, SF_MAX_MTU);
    netdev.set_ops(Arc::new(SfNetdevOps::new(Arc::clone(nic))));
    netdev.set_ethtool_ops(Arc::new(SfEthtoolOps));
    netdev.set_devlink_port(spec.port);
    if let Some(name) = spec.name {
        netdev.set_name_hint(name);
    }

    // configured while uniquely owned, handed to the VSI before registration
    let netdev = Arc::new(netdev);
    vsi.lock().set_netdev(Arc::clone(&netdev));

    if let Err(e) = stack.register_netdev(&netdev) {
        let mut vsi = vsi.lock();
        vsi.take_netdev();
        vsi.clear_state(VsiState::NETDEV_ALLOCD);
        return Err(SfError::NetdevRegisterFailed(e.to_string()));
    }

    vsi.lock().set_state(VsiState::NETDEV_REGISTERED);
    netdev.carrier_off();
    netdev.tx_stop_all_queues();
    info!(
        "registered net device {} for VSI {vsi_idx}",
        netdev.name().map_or_else(String::new, ToString::to_string)
    );
    Ok(netdev)
}
