// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The NIC hardware access layer: VSI configuration, switch filters, NAPI wiring and port
//! representors.

use crate::vsi::{PortInfo, Vsi, VsiCfgParams, VsiIdx, VsiState};
use id::{Id, IdAllocError, IdAllocator, LIMIT_32B_ALLOC1};
use net::eth::mac::Mac;
use parking_lot::Mutex;
use std::collections::BTreeMap;
#[cfg(any(test, feature = "testing"))]
use std::sync::atomic::{AtomicUsize, Ordering};
use tracectl::trace_target;
use tracing::{debug, info, warn};

trace_target!("nic", LevelFilter::INFO, &["hardware"]);

/// Marker for port representor ids.
#[derive(Debug)]
pub enum Representor {}

/// Identifier of an attached port representor.
pub type ReprId = Id<Representor>;

/// What a switch filter does with matching frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display)]
pub enum FwdAction {
    /// Deliver to the VSI owning the filter.
    #[strum(serialize = "fwd-to-vsi")]
    ToVsi,
    /// Drop.
    #[strum(serialize = "drop")]
    Drop,
}

/// A switch filter as programmed on the NIC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacFilter {
    pub mac: Mac,
    pub vsi: VsiIdx,
    pub action: FwdAction,
}

/// Errors of the hardware access layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NicError {
    /// The NIC has no queues left for this VSI.
    #[error("no queues left for VSI {0}")]
    NoQueues(VsiIdx),
    /// The VSI is already configured.
    #[error("VSI {0} is already configured")]
    AlreadyConfigured(VsiIdx),
    /// The VSI is not configured.
    #[error("VSI {0} is not configured")]
    NotConfigured(VsiIdx),
    /// A unicast MAC is already forwarded to another VSI.
    #[error("MAC {mac} is already forwarded to VSI {owner}")]
    FilterExists { mac: Mac, owner: VsiIdx },
    /// The MAC cannot be the key of a filter.
    #[error("{0} is not a valid filter address")]
    InvalidFilter(Mac),
    /// No representor ids left.
    #[error(transparent)]
    Representor(#[from] IdAllocError),
    /// Failure injected by a test.
    #[cfg(any(test, feature = "testing"))]
    #[error("injected failure in {0}")]
    Injected(&'static str),
}

/// Operations the subfunction core needs from the NIC.
pub trait Nic: Send + Sync {
    /// Description of the physical port SF VSIs bind to.
    fn port_info(&self) -> PortInfo;

    /// Whether the physical link is up.
    fn link_up(&self) -> bool;

    /// Allocate queues and program the hardware context of `vsi`.
    ///
    /// # Errors
    ///
    /// Fails if the VSI is already configured or no queues are left.
    fn vsi_cfg(&self, vsi: &mut Vsi, params: &VsiCfgParams) -> Result<(), NicError>;

    /// Undo [`Nic::vsi_cfg`], removing every filter of the VSI.  Unconfigured VSIs are left
    /// alone.
    fn vsi_decfg(&self, vsi: &mut Vsi);

    /// Stop traffic on `vsi` (and on its net device, if any).
    fn vsi_close(&self, vsi: &mut Vsi);

    /// Forward `mac` and broadcast frames to `vsi`.
    ///
    /// # Errors
    ///
    /// Fails if the VSI is not configured or `mac` is forwarded elsewhere.
    fn add_mac_and_broadcast(&self, vsi: &Vsi, mac: Mac, action: FwdAction)
    -> Result<(), NicError>;

    /// Wire the interrupt vectors of `vsi` to its queues.
    fn napi_add(&self, vsi: &mut Vsi);

    /// Attach a port representor for the VSI.
    ///
    /// # Errors
    ///
    /// Fails if no representor ids are left.
    fn attach_repr(&self, vsi: VsiIdx) -> Result<ReprId, NicError>;

    /// Detach a representor attached by [`Nic::attach_repr`].
    fn detach_repr(&self, repr: ReprId);
}

#[cfg(any(test, feature = "testing"))]
#[derive(Debug, Default)]
struct Fault(AtomicUsize);

#[cfg(any(test, feature = "testing"))]
impl Fault {
    fn arm(&self, count: usize) {
        self.0.store(count, Ordering::SeqCst);
    }

    fn fire(&self) -> bool {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[cfg(any(test, feature = "testing"))]
#[derive(Debug, Default)]
struct Faults {
    vsi_cfg: Fault,
    filters: Fault,
    repr: Fault,
}

#[derive(Debug)]
struct SimState {
    free_txq: u16,
    free_rxq: u16,
    link_up: bool,
    filters: BTreeMap<(Mac, VsiIdx), FwdAction>,
    reprs: BTreeMap<ReprId, VsiIdx>,
}

/// An in-process NIC with a fixed queue budget and a MAC switch table.
#[derive(Debug)]
pub struct SimNic {
    port_info: PortInfo,
    state: Mutex<SimState>,
    repr_ids: IdAllocator<Representor>,
    #[cfg(any(test, feature = "testing"))]
    faults: Faults,
}

impl SimNic {
    /// A NIC with `txq`/`rxq` queues to distribute among VSIs.  The link starts up.
    #[must_use]
    pub fn new(port_info: PortInfo, txq: u16, rxq: u16) -> Self {
        Self {
            port_info,
            state: Mutex::new(SimState {
                free_txq: txq,
                free_rxq: rxq,
                link_up: true,
                filters: BTreeMap::new(),
                reprs: BTreeMap::new(),
            }),
            repr_ids: IdAllocator::new(LIMIT_32B_ALLOC1),
            #[cfg(any(test, feature = "testing"))]
            faults: Faults::default(),
        }
    }

    pub fn set_link(&self, up: bool) {
        self.state.lock().link_up = up;
    }

    /// Queues not assigned to any VSI, as `(tx, rx)`.
    pub fn free_queues(&self) -> (u16, u16) {
        let state = self.state.lock();
        (state.free_txq, state.free_rxq)
    }

    /// Every programmed filter, sorted.
    pub fn filters(&self) -> Vec<MacFilter> {
        self.state
            .lock()
            .filters
            .iter()
            .map(|(&(mac, vsi), &action)| MacFilter { mac, vsi, action })
            .collect()
    }

    /// Attached representors and the VSI each one stands for.
    pub fn representors(&self) -> Vec<(ReprId, VsiIdx)> {
        self.state
            .lock()
            .reprs
            .iter()
            .map(|(&repr, &vsi)| (repr, vsi))
            .collect()
    }

    /// Make the next `count` VSI configurations fail.
    #[cfg(any(test, feature = "testing"))]
    pub fn fail_next_vsi_cfg(&self, count: usize) {
        self.faults.vsi_cfg.arm(count);
    }

    /// Make the next `count` filter additions fail.
    #[cfg(any(test, feature = "testing"))]
    pub fn fail_next_filter_add(&self, count: usize) {
        self.faults.filters.arm(count);
    }

    /// Make the next `count` representor attachments fail.
    #[cfg(any(test, feature = "testing"))]
    pub fn fail_next_attach_repr(&self, count: usize) {
        self.faults.repr.arm(count);
    }
}

impl Nic for SimNic {
    fn port_info(&self) -> PortInfo {
        self.port_info
    }

    fn link_up(&self) -> bool {
        self.state.lock().link_up
    }

    fn vsi_cfg(&self, vsi: &mut Vsi, params: &VsiCfgParams) -> Result<(), NicError> {
        #[cfg(any(test, feature = "testing"))]
        if self.faults.vsi_cfg.fire() {
            return Err(NicError::Injected("vsi_cfg"));
        }
        if vsi.is_configured() {
            return Err(NicError::AlreadyConfigured(vsi.idx()));
        }
        let mut state = self.state.lock();
        let txq = vsi.req_txq().min(state.free_txq);
        let rxq = vsi.req_rxq().min(state.free_rxq);
        if txq == 0 || rxq == 0 {
            return Err(NicError::NoQueues(vsi.idx()));
        }
        state.free_txq -= txq;
        state.free_rxq -= rxq;
        vsi.apply_hw_config(txq, rxq, params.port_info);
        info!(
            "configured {} VSI {} ({txq} tx, {rxq} rx queues, flags {:?})",
            params.vsi_type,
            vsi.idx(),
            params.flags
        );
        Ok(())
    }

    fn vsi_decfg(&self, vsi: &mut Vsi) {
        if !vsi.is_configured() {
            debug!("VSI {} is not configured, nothing to undo", vsi.idx());
            return;
        }
        let idx = vsi.idx();
        let mut state = self.state.lock();
        state.filters.retain(|&(_, owner), _| owner != idx);
        state.free_txq = state.free_txq.saturating_add(vsi.alloc_txq());
        state.free_rxq = state.free_rxq.saturating_add(vsi.alloc_rxq());
        drop(state);
        vsi.clear_hw_config();
        info!("deconfigured VSI {idx}");
    }

    fn vsi_close(&self, vsi: &mut Vsi) {
        if vsi.state().contains(VsiState::DOWN) {
            return;
        }
        vsi.set_state(VsiState::DOWN);
        if let Some(netdev) = vsi.netdev() {
            netdev.carrier_off();
            netdev.tx_stop_all_queues();
        }
        debug!("closed VSI {}", vsi.idx());
    }

    fn add_mac_and_broadcast(
        &self,
        vsi: &Vsi,
        mac: Mac,
        action: FwdAction,
    ) -> Result<(), NicError> {
        #[cfg(any(test, feature = "testing"))]
        if self.faults.filters.fire() {
            return Err(NicError::Injected("add_mac_and_broadcast"));
        }
        let idx = vsi.idx();
        if !vsi.is_configured() {
            return Err(NicError::NotConfigured(idx));
        }
        if mac.is_zero() || mac.is_multicast() {
            return Err(NicError::InvalidFilter(mac));
        }
        let mut state = self.state.lock();
        if let Some(&(_, owner)) = state
            .filters
            .keys()
            .find(|&&(m, owner)| m == mac && owner != idx)
        {
            return Err(NicError::FilterExists { mac, owner });
        }
        state.filters.insert((mac, idx), action);
        state.filters.insert((Mac::BROADCAST, idx), action);
        debug!("MAC {mac} and broadcast filters ({action}) added for VSI {idx}");
        Ok(())
    }

    fn napi_add(&self, vsi: &mut Vsi) {
        if !vsi.is_configured() {
            warn!("not wiring NAPI for unconfigured VSI {}", vsi.idx());
            return;
        }
        vsi.set_napi(true);
    }

    fn attach_repr(&self, vsi: VsiIdx) -> Result<ReprId, NicError> {
        #[cfg(any(test, feature = "testing"))]
        if self.faults.repr.fire() {
            return Err(NicError::Injected("attach_repr"));
        }
        let repr = self.repr_ids.alloc()?;
        self.state.lock().reprs.insert(repr, vsi);
        debug!("attached representor {repr} for VSI {vsi}");
        Ok(repr)
    }

    fn detach_repr(&self, repr: ReprId) {
        if self.state.lock().reprs.remove(&repr).is_none() {
            warn!("detach of unknown representor {repr}");
            return;
        }
        self.repr_ids.free(repr);
        debug!("detached representor {repr}");
    }
}

#[cfg(test)]
mod test {
    use super::{FwdAction, MacFilter, Nic, NicError, SimNic};
    use crate::vsi::{PortInfo, VsiCfgFlags, VsiCfgParams, VsiPool, VsiState, VsiType};
    use net::eth::mac::Mac;
    use net::netdev::NetDevice;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn port_info() -> PortInfo {
        PortInfo {
            lport: 0,
            mac: Mac([0x02, 0, 0, 0, 0, 0xff]),
        }
    }

    fn params() -> VsiCfgParams {
        VsiCfgParams {
            vsi_type: VsiType::Sf,
            port_info: port_info(),
            flags: VsiCfgFlags::INIT,
        }
    }

    #[test]
    fn configure_and_deconfigure_return_queues() {
        let nic = SimNic::new(port_info(), 6, 6);
        let mut pool = VsiPool::new(4);
        let a = pool.alloc(VsiType::Sf, 4, 4).unwrap();
        let b = pool.alloc(VsiType::Sf, 4, 4).unwrap();
        nic.vsi_cfg(&mut a.lock(), &params()).unwrap();
        assert_eq!(nic.free_queues(), (2, 2));
        nic.vsi_cfg(&mut b.lock(), &params()).unwrap();
        assert_eq!(b.lock().alloc_txq(), 2);
        assert_eq!(nic.free_queues(), (0, 0));
        let a_idx = a.lock().idx();
        assert_eq!(
            nic.vsi_cfg(&mut a.lock(), &params()),
            Err(NicError::AlreadyConfigured(a_idx))
        );
        nic.vsi_decfg(&mut a.lock());
        nic.vsi_decfg(&mut b.lock());
        assert_eq!(nic.free_queues(), (6, 6));
        assert!(!a.lock().is_configured());
    }

    #[test]
    fn filters_follow_the_vsi() {
        let nic = SimNic::new(port_info(), 8, 8);
        let mut pool = VsiPool::new(4);
        let a = pool.alloc(VsiType::Sf, 1, 1).unwrap();
        let b = pool.alloc(VsiType::Sf, 1, 1).unwrap();
        let mac = Mac([0x02, 0xaa, 0xbb, 0xcc, 0xdd, 0x01]);
        assert!(matches!(
            nic.add_mac_and_broadcast(&a.lock(), mac, FwdAction::ToVsi),
            Err(NicError::NotConfigured(_))
        ));
        nic.vsi_cfg(&mut a.lock(), &params()).unwrap();
        nic.vsi_cfg(&mut b.lock(), &params()).unwrap();
        nic.add_mac_and_broadcast(&a.lock(), mac, FwdAction::ToVsi)
            .unwrap();
        let a_idx = a.lock().idx();
        assert_eq!(
            nic.filters(),
            vec![
                MacFilter {
                    mac,
                    vsi: a_idx,
                    action: FwdAction::ToVsi
                },
                MacFilter {
                    mac: Mac::BROADCAST,
                    vsi: a_idx,
                    action: FwdAction::ToVsi
                },
            ]
        );
        assert_eq!(
            nic.add_mac_and_broadcast(&b.lock(), mac, FwdAction::ToVsi),
            Err(NicError::FilterExists { mac, owner: a_idx })
        );
        nic.vsi_decfg(&mut a.lock());
        assert!(nic.filters().is_empty());
    }

    #[test]
    fn close_quiesces_the_netdev() {
        let nic = SimNic::new(port_info(), 8, 8);
        let mut pool = VsiPool::new(1);
        let vsi = pool.alloc(VsiType::Sf, 2, 2).unwrap();
        nic.vsi_cfg(&mut vsi.lock(), &params()).unwrap();
        let netdev = Arc::new(NetDevice::alloc_etherdev_mqs(2, 2).unwrap());
        netdev.carrier_on();
        netdev.tx_wake_all_queues();
        vsi.lock().set_netdev(Arc::clone(&netdev));
        nic.vsi_close(&mut vsi.lock());
        assert!(vsi.lock().state().contains(VsiState::DOWN));
        assert!(!netdev.carrier_ok());
        assert!(netdev.all_tx_queues_stopped());
    }

    #[test]
    fn representors_and_injected_faults() {
        let nic = SimNic::new(port_info(), 8, 8);
        let mut pool = VsiPool::new(1);
        let vsi = pool.alloc(VsiType::Sf, 1, 1).unwrap();
        let idx = vsi.lock().idx();
        let repr = nic.attach_repr(idx).unwrap();
        assert_eq!(nic.representors(), vec![(repr, idx)]);
        nic.detach_repr(repr);
        assert!(nic.representors().is_empty());

        nic.fail_next_attach_repr(1);
        assert_eq!(
            nic.attach_repr(idx),
            Err(NicError::Injected("attach_repr"))
        );
        nic.fail_next_vsi_cfg(1);
        assert_eq!(
            nic.vsi_cfg(&mut vsi.lock(), &params()),
            Err(NicError::Injected("vsi_cfg"))
        );
        nic.vsi_cfg(&mut vsi.lock(), &params()).unwrap();
    }
}
