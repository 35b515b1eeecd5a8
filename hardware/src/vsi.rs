// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Virtual Station Interfaces (VSIs) and the pool a PF allocates them from.

use bitflags::bitflags;
use id::Id;
use net::eth::mac::Mac;
use net::netdev::NetDevice;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracectl::trace_target;
use tracing::debug;

trace_target!("vsi", LevelFilter::INFO, &["hardware"]);

/// Index of a VSI within its PF.
pub type VsiIdx = Id<Vsi, u16>;

/// What a VSI serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum VsiType {
    /// The PF's own VSI.
    Pf,
    /// A single-root IOV virtual function.
    Vf,
    /// A subfunction.
    Sf,
    /// Control VSI (flow director).
    Ctrl,
}

bitflags! {
    /// Software state bits of a VSI.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct VsiState: u32 {
        /// Traffic is stopped.
        const DOWN = 1 << 0;
        /// A net device has been allocated for this VSI.
        const NETDEV_ALLOCD = 1 << 1;
        /// The VSI's net device is registered with the stack.
        const NETDEV_REGISTERED = 1 << 2;
    }
}

bitflags! {
    /// Flags of a VSI configuration request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct VsiCfgFlags: u32 {
        /// First configuration of the VSI (as opposed to a rebuild).
        const INIT = 1 << 0;
    }
}

/// The physical port a VSI transmits through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortInfo {
    /// Logical port number.
    pub lport: u8,
    /// MAC address of the physical port.
    pub mac: Mac,
}

/// Parameters of [`crate::nic::Nic::vsi_cfg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VsiCfgParams {
    pub vsi_type: VsiType,
    pub port_info: PortInfo,
    pub flags: VsiCfgFlags,
}

/// A VSI.
///
/// Owned by its PF's [`VsiPool`]; the subfunction owning it is recorded by port index in
/// [`Vsi::sf`].
#[derive(Debug)]
pub struct Vsi {
    idx: VsiIdx,
    vsi_type: VsiType,
    req_txq: u16,
    req_rxq: u16,
    alloc_txq: u16,
    alloc_rxq: u16,
    port_info: Option<PortInfo>,
    state: VsiState,
    napi: bool,
    netdev: Option<Arc<NetDevice>>,
    sf: Option<u32>,
}

impl Vsi {
    /// A fresh, unconfigured VSI requesting the given queue counts.
    pub fn new(idx: VsiIdx, vsi_type: VsiType, req_txq: u16, req_rxq: u16) -> Self {
        Self {
            idx,
            vsi_type,
            req_txq,
            req_rxq,
            alloc_txq: 0,
            alloc_rxq: 0,
            port_info: None,
            state: VsiState::DOWN,
            napi: false,
            netdev: None,
            sf: None,
        }
    }

    pub fn idx(&self) -> VsiIdx {
        self.idx
    }

    pub fn vsi_type(&self) -> VsiType {
        self.vsi_type
    }

    pub fn req_txq(&self) -> u16 {
        self.req_txq
    }

    pub fn req_rxq(&self) -> u16 {
        self.req_rxq
    }

    /// TX queues allocated by the hardware (zero while unconfigured).
    pub fn alloc_txq(&self) -> u16 {
        self.alloc_txq
    }

    /// RX queues allocated by the hardware (zero while unconfigured).
    pub fn alloc_rxq(&self) -> u16 {
        self.alloc_rxq
    }

    pub fn is_configured(&self) -> bool {
        self.port_info.is_some()
    }

    pub fn port_info(&self) -> Option<PortInfo> {
        self.port_info
    }

    /// Record a successful hardware configuration.  For [`crate::nic::Nic`] implementations.
    pub fn apply_hw_config(&mut self, alloc_txq: u16, alloc_rxq: u16, port_info: PortInfo) {
        self.alloc_txq = alloc_txq;
        self.alloc_rxq = alloc_rxq;
        self.port_info = Some(port_info);
        self.state.remove(VsiState::DOWN);
    }

    /// Forget the hardware configuration.  For [`crate::nic::Nic`] implementations.
    pub fn clear_hw_config(&mut self) {
        self.alloc_txq = 0;
        self.alloc_rxq = 0;
        self.port_info = None;
        self.napi = false;
        self.state.insert(VsiState::DOWN);
    }

    pub fn state(&self) -> VsiState {
        self.state
    }

    pub fn set_state(&mut self, bits: VsiState) {
        self.state.insert(bits);
    }

    pub fn clear_state(&mut self, bits: VsiState) {
        self.state.remove(bits);
    }

    pub fn napi_enabled(&self) -> bool {
        self.napi
    }

    pub fn set_napi(&mut self, enabled: bool) {
        self.napi = enabled;
    }

    pub fn netdev(&self) -> Option<&Arc<NetDevice>> {
        self.netdev.as_ref()
    }

    pub fn set_netdev(&mut self, netdev: Arc<NetDevice>) {
        self.netdev = Some(netdev);
    }

    pub fn take_netdev(&mut self) -> Option<Arc<NetDevice>> {
        self.netdev.take()
    }

    /// Port index of the subfunction using this VSI.
    pub fn sf(&self) -> Option<u32> {
        self.sf
    }

    pub fn set_sf(&mut self, sf: Option<u32>) {
        self.sf = sf;
    }
}

/// Errors of [`VsiPool`] operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VsiPoolError {
    /// Every slot is taken.
    #[error("no free VSI (pool of {0})")]
    Exhausted(u16),
    /// No VSI with this index.
    #[error("no VSI {0}")]
    NotFound(VsiIdx),
    /// The VSI is still configured or still has a net device.
    #[error("VSI {0} is still in use")]
    InUse(VsiIdx),
}

/// A fixed-size set of VSI slots.
#[derive(Debug)]
pub struct VsiPool {
    capacity: u16,
    vsis: BTreeMap<VsiIdx, Arc<Mutex<Vsi>>>,
}

impl VsiPool {
    #[must_use]
    pub fn new(capacity: u16) -> Self {
        Self {
            capacity,
            vsis: BTreeMap::new(),
        }
    }

    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.vsis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vsis.is_empty()
    }

    /// Take the lowest free slot.
    pub fn alloc(
        &mut self,
        vsi_type: VsiType,
        req_txq: u16,
        req_rxq: u16,
    ) -> Result<Arc<Mutex<Vsi>>, VsiPoolError> {
        let idx = (0..self.capacity)
            .map(VsiIdx::from_raw)
            .find(|idx| !self.vsis.contains_key(idx))
            .ok_or(VsiPoolError::Exhausted(self.capacity))?;
        let vsi = Arc::new(Mutex::new(Vsi::new(idx, vsi_type, req_txq, req_rxq)));
        self.vsis.insert(idx, Arc::clone(&vsi));
        debug!("allocated {vsi_type} VSI {idx}");
        Ok(vsi)
    }

    /// Return a slot.  The VSI must be deconfigured and without a net device.
    pub fn release(&mut self, idx: VsiIdx) -> Result<(), VsiPoolError> {
        let vsi = self.vsis.get(&idx).ok_or(VsiPoolError::NotFound(idx))?;
        {
            let vsi = vsi.lock();
            if vsi.is_configured() || vsi.netdev().is_some() {
                return Err(VsiPoolError::InUse(idx));
            }
        }
        self.vsis.remove(&idx);
        debug!("released VSI {idx}");
        Ok(())
    }

    pub fn get(&self, idx: VsiIdx) -> Option<Arc<Mutex<Vsi>>> {
        self.vsis.get(&idx).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Mutex<Vsi>>> {
        self.vsis.values()
    }
}

#[cfg(test)]
mod test {
    use super::{PortInfo, VsiIdx, VsiPool, VsiPoolError, VsiState, VsiType};
    use net::eth::mac::Mac;

    #[test]
    fn lowest_free_slot() {
        let mut pool = VsiPool::new(3);
        let a = pool.alloc(VsiType::Pf, 4, 4).unwrap();
        let b = pool.alloc(VsiType::Sf, 4, 4).unwrap();
        assert_eq!(a.lock().idx(), VsiIdx::from_raw(0));
        assert_eq!(b.lock().idx(), VsiIdx::from_raw(1));
        pool.release(VsiIdx::from_raw(0)).unwrap();
        let c = pool.alloc(VsiType::Sf, 1, 1).unwrap();
        assert_eq!(c.lock().idx(), VsiIdx::from_raw(0));
        pool.alloc(VsiType::Sf, 1, 1).unwrap();
        assert_eq!(
            pool.alloc(VsiType::Sf, 1, 1).unwrap_err(),
            VsiPoolError::Exhausted(3)
        );
    }

    #[test]
    fn configured_vsis_stay_in_the_pool() {
        let mut pool = VsiPool::new(1);
        let vsi = pool.alloc(VsiType::Sf, 2, 2).unwrap();
        let idx = vsi.lock().idx();
        vsi.lock().apply_hw_config(
            2,
            2,
            PortInfo {
                lport: 0,
                mac: Mac([0x02, 0, 0, 0, 0, 1]),
            },
        );
        assert!(!vsi.lock().state().contains(VsiState::DOWN));
        assert_eq!(pool.release(idx), Err(VsiPoolError::InUse(idx)));
        vsi.lock().clear_hw_config();
        assert_eq!(vsi.lock().alloc_txq(), 0);
        pool.release(idx).unwrap();
        assert_eq!(pool.release(idx), Err(VsiPoolError::NotFound(idx)));
    }
}
