// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The PF side of subfunctions: dynamic port creation and deletion, port function state, and
//! teardown of every port when the PF goes away.
//!
//! Locks are taken in this order: `admin`, `state`, a VSI.  The `state` lock is never held
//! while an auxiliary device is added or deleted, since probe and remove take it.

use crate::activate;
use crate::aux::{SfBus, SfDev};
use crate::config::PfConfig;
use crate::counters::Counters;
use crate::devlink_port::{create_sf_port, destroy_sf_port};
use crate::error::SfError;
use crate::ids::{AuxIdAllocator, SfNum, SfNumber, aux_ids, sfnums};
use crate::port::{DynamicPort, DynamicPortInfo, PortStore};
use auxbus::AuxDevice;
use devlink::{
    Devlink, DevlinkRegistry, Errno, Extack, PciSfAttrs, PortFlavour, PortFlavourKind,
    PortFnOpState, PortFnState, PortIndex, PortNewAttrs, PortOps,
};
use hardware::nic::Nic;
use hardware::vsi::{Vsi, VsiCfgFlags, VsiCfgParams, VsiIdx, VsiPool, VsiType};
use id::IdAllocator;
use net::eth::mac::Mac;
use net::netdev::NetDevice;
use net::stack::NetStack;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracectl::trace_target;
use tracing::{debug, error, info, warn};

trace_target!("sf-pf", LevelFilter::INFO, &["sf"]);

/// The services a PF drives.
#[derive(Clone)]
pub struct Collaborators {
    pub nic: Arc<dyn Nic>,
    pub stack: Arc<dyn NetStack>,
    pub bus: Arc<SfBus>,
    pub registry: Arc<DevlinkRegistry>,
    /// Auxiliary id space; the process-wide one unless replaced.
    pub aux_ids: Arc<AuxIdAllocator>,
}

impl Collaborators {
    pub fn new(
        nic: Arc<dyn Nic>,
        stack: Arc<dyn NetStack>,
        bus: Arc<SfBus>,
        registry: Arc<DevlinkRegistry>,
    ) -> Self {
        Self {
            nic,
            stack,
            bus,
            registry,
            aux_ids: aux_ids(),
        }
    }

    #[must_use]
    pub fn with_aux_ids(mut self, aux_ids: Arc<AuxIdAllocator>) -> Self {
        self.aux_ids = aux_ids;
        self
    }
}

pub(crate) struct PfState {
    pub(crate) ports: PortStore,
    vsis: VsiPool,
    sfnums: IdAllocator<SfNumber>,
}

pub(crate) struct PfInner {
    me: Weak<PfInner>,
    pub(crate) config: PfConfig,
    pub(crate) devlink: Arc<Devlink>,
    pub(crate) nic: Arc<dyn Nic>,
    pub(crate) stack: Arc<dyn NetStack>,
    pub(crate) bus: Arc<SfBus>,
    pub(crate) registry: Arc<DevlinkRegistry>,
    pub(crate) aux_ids: Arc<AuxIdAllocator>,
    pub(crate) counters: Arc<Counters>,
    admin: Mutex<()>,
    pub(crate) state: Mutex<PfState>,
    pf_vsi: Arc<Mutex<Vsi>>,
    pf_port: PortIndex,
    torn_down: AtomicBool,
}

impl std::fmt::Debug for PfInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PfInner")
            .field("devlink", &self.devlink.handle())
            .field("pf_port", &self.pf_port)
            .finish_non_exhaustive()
    }
}

fn port_index(vsi: VsiIdx) -> PortIndex {
    PortIndex::from_raw(u32::from(*vsi.as_raw()))
}

fn not_found(index: PortIndex, extack: &mut Extack) -> SfError {
    extack.set_msg("Port does not exist");
    SfError::NotFound(index.as_u32())
}

impl PfInner {
    fn reserve_sfnum(
        &self,
        state: &PfState,
        sfnum: Option<u32>,
        extack: &mut Extack,
    ) -> Result<SfNum, SfError> {
        match sfnum {
            Some(raw) => {
                let sfnum = SfNum::from_raw(raw);
                state.sfnums.insert(sfnum).map_err(|e| {
                    extack.set_msg("Subfunction with given sfnum already exists");
                    SfError::Busy(e.to_string())
                })?;
                Ok(sfnum)
            }
            None => state.sfnums.alloc().map_err(|e| {
                extack.set_msg("Unable to allocate subfunction number");
                SfError::Busy(e.to_string())
            }),
        }
    }

    fn port_new(&self, attrs: &PortNewAttrs, extack: &mut Extack) -> Result<PortIndex, SfError> {
        let _admin = self.admin.lock();
        if attrs.flavour != PortFlavourKind::PciSf {
            extack.set_msg("Flavour other than pcisf is not supported");
            return Err(SfError::NotSupported);
        }
        if attrs.controller.is_some() {
            extack.set_msg("Setting controller is not supported");
            return Err(SfError::NotSupported);
        }
        if attrs.port_index.is_some() {
            extack.set_msg("Driver does not support user defined port index assignment");
            return Err(SfError::NotSupported);
        }
        if attrs.pfnum != self.config.pf_id {
            extack.set_msg("Incorrect pfnum supplied");
            return Err(SfError::InvalidArgument(format!("pfnum {}", attrs.pfnum)));
        }
        if !self.config.dynamic_msix {
            extack.set_msg("Dynamic MSIX-X interrupt allocation is not supported");
            return Err(SfError::NotSupported);
        }

        let mut state = self.state.lock();
        let sfnum = self.reserve_sfnum(&state, attrs.sfnum, extack)?;

        let hw_addr = match attrs.hw_addr {
            Some(mac) if mac.valid_src().is_ok() => mac,
            other => {
                extack.set_msg("Invalid MAC address");
                state.sfnums.free(sfnum);
                return Err(SfError::InvalidArgument(format!(
                    "hw_addr {}",
                    other.unwrap_or(Mac::ZERO)
                )));
            }
        };

        let vsi = match state
            .vsis
            .alloc(VsiType::Sf, self.config.txq, self.config.rxq)
        {
            Ok(vsi) => vsi,
            Err(e) => {
                extack.set_msg("Unable to allocate VSI");
                state.sfnums.free(sfnum);
                return Err(SfError::VsiAllocFailed(e.to_string()));
            }
        };
        let vsi_idx = vsi.lock().idx();
        let index = port_index(vsi_idx);

        if let Err(e) = state
            .ports
            .create(DynamicPort::new(index, sfnum, hw_addr, vsi, vsi_idx))
        {
            extack.set_msg("Port registration failed");
            Self::release_vsi(&mut state, vsi_idx);
            state.sfnums.free(sfnum);
            return Err(e);
        }

        let attrs = PciSfAttrs {
            controller: 0,
            pf: self.config.pf_id,
            sf: sfnum.as_u32(),
            external: false,
        };
        if let Err(e) = create_sf_port(&self.devlink, index, attrs) {
            extack.set_msg("Port registration failed");
            error!("registration of port {index} failed: {e}");
            Self::unwind_port(&mut state, index, sfnum);
            return Err(e);
        }

        match self.nic.attach_repr(vsi_idx) {
            Ok(repr) => {
                if let Some(port) = state.ports.lookup_mut(index) {
                    port.repr_id = Some(repr);
                }
            }
            Err(e) => {
                extack.set_msg("Failed to attach SF to eswitch");
                error!("representor of port {index} failed: {e}");
                destroy_sf_port(&self.devlink, index);
                Self::unwind_port(&mut state, index, sfnum);
                return Err(SfError::EswitchAttachFailed(e.to_string()));
            }
        }

        info!(
            "{}: created port {index} (sfnum {sfnum}, hw_addr {hw_addr}, VSI {vsi_idx})",
            self.devlink.handle()
        );
        Ok(index)
    }

    fn release_vsi(state: &mut PfState, vsi: VsiIdx) {
        if let Err(e) = state.vsis.release(vsi) {
            warn!("could not release VSI {vsi}: {e}");
        }
    }

    fn unwind_port(state: &mut PfState, index: PortIndex, sfnum: SfNum) {
        match state.ports.destroy(index) {
            Ok(port) => {
                let vsi = port.vsi_idx;
                drop(port);
                Self::release_vsi(state, vsi);
            }
            Err(e) => warn!("could not destroy port {index}: {e}"),
        }
        state.sfnums.free(sfnum);
    }

    fn activate(&self, index: PortIndex, extack: &mut Extack) -> Result<(), SfError> {
        let unbound = {
            let mut state = self.state.lock();
            let port = state
                .ports
                .lookup_mut(index)
                .ok_or_else(|| not_found(index, extack))?;
            if port.is_active() {
                debug!("port {index} is already active");
                return Ok(());
            }
            port.take_sf_dev()
        };
        // left behind by a driver unbind
        if let Some(adev) = unbound {
            activate::deactivate(&self.bus, adev);
        }
        let me = self.me.upgrade().ok_or(SfError::NotFound(index.as_u32()))?;
        let adev = activate::activate(&me, index, extack)?;

        let mut state = self.state.lock();
        if let Some(port) = state.ports.lookup_mut(index) {
            port.attach_sf_dev(adev);
            port.active = true;
            return Ok(());
        }
        drop(state);
        warn!("port {index} vanished while activating");
        activate::deactivate(&self.bus, adev);
        Err(not_found(index, extack))
    }

    fn deactivate(&self, index: PortIndex, extack: &mut Extack) -> Result<(), SfError> {
        let adev = {
            let mut state = self.state.lock();
            let port = state
                .ports
                .lookup_mut(index)
                .ok_or_else(|| not_found(index, extack))?;
            port.active = false;
            port.take_sf_dev()
        };
        match adev {
            Some(adev) => activate::deactivate(&self.bus, adev),
            None => debug!("port {index} is not active"),
        }
        Ok(())
    }

    fn port_del(&self, index: PortIndex, extack: &mut Extack) -> Result<(), SfError> {
        self.deactivate(index, extack)?;
        let mut state = self.state.lock();
        let port = state.ports.destroy(index).inspect_err(|_| {
            extack.set_msg("Port is still active");
        })?;
        if let Some(repr) = port.repr_id {
            self.nic.detach_repr(repr);
        }
        destroy_sf_port(&self.devlink, index);
        let (vsi, sfnum) = (port.vsi_idx, port.sfnum);
        drop(port);
        Self::release_vsi(&mut state, vsi);
        state.sfnums.free(sfnum);
        info!("{}: deleted port {index}", self.devlink.handle());
        Ok(())
    }

    fn dealloc_all_dynamic_ports(&self) {
        let _admin = self.admin.lock();
        let ports = self.state.lock().ports.newest_first();
        for index in ports {
            let mut extack = Extack::new();
            if let Err(e) = self.port_del(index, &mut extack) {
                warn!("could not delete port {index}: {e} ({extack})");
            }
        }
    }

    fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.dealloc_all_dynamic_ports();
        self.registry.unregister(&self.devlink);
        self.devlink.port_unregister(self.pf_port);
        let mut state = self.state.lock();
        let pf_vsi = {
            let mut vsi = self.pf_vsi.lock();
            self.nic.vsi_decfg(&mut vsi);
            vsi.idx()
        };
        Self::release_vsi(&mut state, pf_vsi);
        info!("{}: PF torn down", self.devlink.handle());
    }
}

impl PortOps for PfInner {
    fn port_new(&self, attrs: &PortNewAttrs, extack: &mut Extack) -> Result<PortIndex, Errno> {
        Ok(PfInner::port_new(self, attrs, extack)?)
    }

    fn port_del(&self, port: PortIndex, extack: &mut Extack) -> Result<(), Errno> {
        let _admin = self.admin.lock();
        Ok(PfInner::port_del(self, port, extack)?)
    }

    fn port_fn_state_get(
        &self,
        index: PortIndex,
        extack: &mut Extack,
    ) -> Result<(PortFnState, PortFnOpState), Errno> {
        let state = self.state.lock();
        let Some(port) = state.ports.lookup(index) else {
            return Err(not_found(index, extack).into());
        };
        let fn_state = if port.is_active() {
            PortFnState::Active
        } else {
            PortFnState::Inactive
        };
        let bound = port
            .sf_dev()
            .and_then(AuxDevice::dev_name)
            .is_some_and(|name| self.bus.is_bound(name));
        let opstate = if bound {
            PortFnOpState::Attached
        } else {
            PortFnOpState::Detached
        };
        Ok((fn_state, opstate))
    }

    fn port_fn_state_set(
        &self,
        port: PortIndex,
        state: PortFnState,
        extack: &mut Extack,
    ) -> Result<(), Errno> {
        let _admin = self.admin.lock();
        match state {
            PortFnState::Active => Ok(self.activate(port, extack)?),
            PortFnState::Inactive => Ok(self.deactivate(port, extack)?),
        }
    }

    fn port_fn_hw_addr_get(&self, index: PortIndex, extack: &mut Extack) -> Result<Mac, Errno> {
        let state = self.state.lock();
        match state.ports.lookup(index) {
            Some(port) => Ok(port.hw_addr()),
            None => Err(not_found(index, extack).into()),
        }
    }

    fn port_fn_hw_addr_set(
        &self,
        _port: PortIndex,
        _mac: Mac,
        extack: &mut Extack,
    ) -> Result<(), Errno> {
        extack.set_msg("Setting hw_addr is not supported");
        Err(SfError::NotSupported.into())
    }
}

/// A PF supporting dynamic subfunction ports.
///
/// Registers the PF devlink instance (`pci/<address>`) with the PF's physical port and answers
/// its port operations.  Dropping the PF deletes every dynamic port, newest first.
#[derive(Debug)]
pub struct Pf {
    inner: Arc<PfInner>,
}

impl Pf {
    /// Bring up the PF: its own VSI, its devlink instance and physical port.
    pub fn new(config: PfConfig, deps: Collaborators) -> Result<Self, SfError> {
        let mut vsis = VsiPool::new(config.num_vsi);
        let pf_vsi = vsis
            .alloc(VsiType::Pf, config.txq, config.rxq)
            .map_err(|e| SfError::VsiAllocFailed(e.to_string()))?;
        let port_info = deps.nic.port_info();
        let pf_vsi_idx = {
            let mut vsi = pf_vsi.lock();
            deps.nic
                .vsi_cfg(
                    &mut vsi,
                    &VsiCfgParams {
                        vsi_type: VsiType::Pf,
                        port_info,
                        flags: VsiCfgFlags::INIT,
                    },
                )
                .map_err(|e| SfError::VsiConfigFailed(e.to_string()))?;
            vsi.idx()
        };

        let devlink = Arc::new(Devlink::alloc("pci", &config.pci_address.to_string()));
        let pf_port = port_index(pf_vsi_idx);
        let registered = devlink
            .port_register(
                pf_port,
                PortFlavour::Physical {
                    port_number: u32::from(port_info.lport),
                },
            )
            .and_then(|()| deps.registry.register(&devlink));
        if let Err(e) = registered {
            devlink.port_unregister(pf_port);
            deps.nic.vsi_decfg(&mut pf_vsi.lock());
            return Err(SfError::AdminPortCreateFailed(e.to_string()));
        }

        let inner = Arc::new_cyclic(|me| PfInner {
            me: me.clone(),
            config,
            devlink: Arc::clone(&devlink),
            nic: deps.nic,
            stack: deps.stack,
            bus: deps.bus,
            registry: deps.registry,
            aux_ids: deps.aux_ids,
            counters: Arc::new(Counters::default()),
            admin: Mutex::new(()),
            state: Mutex::new(PfState {
                ports: PortStore::new(),
                vsis,
                sfnums: sfnums(),
            }),
            pf_vsi,
            pf_port,
            torn_down: AtomicBool::new(false),
        });
        let ops: Weak<PfInner> = Arc::downgrade(&inner);
        devlink.set_port_ops(ops);
        info!("{}: PF up", devlink.handle());
        Ok(Self { inner })
    }

    pub fn config(&self) -> &PfConfig {
        &self.inner.config
    }

    /// The PF devlink instance.  Port operations issued on it reach this PF.
    pub fn devlink(&self) -> &Arc<Devlink> {
        &self.inner.devlink
    }

    /// The PF's physical devlink port.
    pub fn pf_port(&self) -> PortIndex {
        self.inner.pf_port
    }

    /// Lifecycle counters of this PF's subfunctions.
    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.inner.counters)
    }

    /// Every dynamic port, by index.
    pub fn ports(&self) -> Vec<DynamicPortInfo> {
        self.inner
            .state
            .lock()
            .ports
            .iter()
            .map(DynamicPort::info)
            .collect()
    }

    /// VSI of dynamic port `port`.
    pub fn vsi(&self, port: PortIndex) -> Option<Arc<Mutex<Vsi>>> {
        self.inner
            .state
            .lock()
            .ports
            .lookup(port)
            .map(|port| Arc::clone(port.vsi()))
    }

    /// Net device of dynamic port `port`, while it is active.
    pub fn sf_netdev(&self, port: PortIndex) -> Option<Arc<NetDevice>> {
        self.vsi(port)?.lock().netdev().cloned()
    }

    /// A new reference to the auxiliary device of dynamic port `port`, while it is active.
    pub fn sf_dev(&self, port: PortIndex) -> Option<AuxDevice<SfDev>> {
        self.inner
            .state
            .lock()
            .ports
            .lookup(port)
            .and_then(|port| port.sf_dev().cloned())
    }

    /// `devlink port add`
    pub fn port_new(&self, attrs: &PortNewAttrs, extack: &mut Extack) -> Result<PortIndex, SfError> {
        self.inner.port_new(attrs, extack)
    }

    /// `devlink port function set state active`
    pub fn activate(&self, port: PortIndex, extack: &mut Extack) -> Result<(), SfError> {
        let _admin = self.inner.admin.lock();
        self.inner.activate(port, extack)
    }

    /// `devlink port function set state inactive`
    pub fn deactivate(&self, port: PortIndex, extack: &mut Extack) -> Result<(), SfError> {
        let _admin = self.inner.admin.lock();
        self.inner.deactivate(port, extack)
    }

    /// `devlink port del`
    pub fn port_del(&self, port: PortIndex, extack: &mut Extack) -> Result<(), SfError> {
        let _admin = self.inner.admin.lock();
        self.inner.port_del(port, extack)
    }

    /// Delete every dynamic port, newest first.
    pub fn dealloc_all_dynamic_ports(&self) {
        self.inner.dealloc_all_dynamic_ports();
    }

    /// Tear the PF down: delete every dynamic port and withdraw the devlink instance.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for Pf {
    fn drop(&mut self) {
        self.inner.teardown();
    }
}

#[cfg(test)]
mod test {
    use super::{Collaborators, Pf};
    use crate::aux::{SfBus, driver_register};
    use crate::config::{PfConfig, PfConfigBuilder};
    use crate::error::SfError;
    use devlink::{
        DevlinkRegistry, Errno, Extack, PortFlavour, PortFlavourKind, PortFnOpState, PortFnState,
        PortIndex, PortNewAttrs,
    };
    use hardware::nic::SimNic;
    use hardware::pci::PciAddress;
    use hardware::vsi::PortInfo;
    use net::eth::mac::Mac;
    use net::stack::LocalNetStack;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const MAC: Mac = Mac([0x02, 0xaa, 0xbb, 0xcc, 0xdd, 0x01]);

    struct Rig {
        nic: Arc<SimNic>,
        stack: Arc<LocalNetStack>,
        registry: Arc<DevlinkRegistry>,
        pf: Pf,
    }

    fn rig_with(config: PfConfig) -> Rig {
        let nic = Arc::new(SimNic::new(
            PortInfo {
                lport: 0,
                mac: Mac([0x02, 0, 0, 0, 0, 0xee]),
            },
            64,
            64,
        ));
        let stack = Arc::new(LocalNetStack::new());
        let bus = Arc::new(SfBus::new());
        driver_register(&bus).unwrap();
        let registry = Arc::new(DevlinkRegistry::new());
        let deps = Collaborators::new(nic.clone(), stack.clone(), bus, registry.clone());
        let pf = Pf::new(config, deps).unwrap();
        Rig {
            nic,
            stack,
            registry,
            pf,
        }
    }

    fn config() -> PfConfig {
        PfConfigBuilder::default()
            .pci_address(PciAddress::try_from("0000:3b:00.0").unwrap())
            .netdev_name("ens2f0")
            .num_vsi(4)
            .build()
            .unwrap()
    }

    fn rig() -> Rig {
        rig_with(config())
    }

    fn refused(rig: &Rig, attrs: &PortNewAttrs) -> (SfError, String) {
        let mut extack = Extack::new();
        let err = rig.pf.port_new(attrs, &mut extack).unwrap_err();
        (err, extack.msg().unwrap_or_default().to_string())
    }

    #[test]
    fn pf_instance_is_registered_with_its_physical_port() {
        let rig = rig();
        let devlink = rig.registry.get("pci/0000:3b:00.0").unwrap();
        assert!(Arc::ptr_eq(&devlink, rig.pf.devlink()));
        let ports = devlink.ports();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].index(), rig.pf.pf_port());
        assert_eq!(ports[0].flavour(), &PortFlavour::Physical { port_number: 0 });
    }

    #[test]
    fn port_new_validation() {
        let rig = rig();
        let mut attrs = PortNewAttrs::pci_sf(0, Some(1), MAC);
        attrs.flavour = PortFlavourKind::PciVf;
        assert_eq!(
            refused(&rig, &attrs),
            (
                SfError::NotSupported,
                "Flavour other than pcisf is not supported".into()
            )
        );

        let mut attrs = PortNewAttrs::pci_sf(0, Some(1), MAC);
        attrs.controller = Some(1);
        assert_eq!(refused(&rig, &attrs).1, "Setting controller is not supported");

        let mut attrs = PortNewAttrs::pci_sf(0, Some(1), MAC);
        attrs.port_index = Some(9);
        assert_eq!(
            refused(&rig, &attrs).1,
            "Driver does not support user defined port index assignment"
        );

        let attrs = PortNewAttrs::pci_sf(1, Some(1), MAC);
        assert_eq!(refused(&rig, &attrs).1, "Incorrect pfnum supplied");

        let attrs = PortNewAttrs::pci_sf(0, Some(1), Mac([0x01, 0, 0x5e, 0, 0, 1]));
        assert_eq!(refused(&rig, &attrs).1, "Invalid MAC address");
        let mut attrs = PortNewAttrs::pci_sf(0, Some(1), MAC);
        attrs.hw_addr = None;
        assert_eq!(refused(&rig, &attrs).1, "Invalid MAC address");

        // nothing leaked: sfnum 1 is still free
        let mut extack = Extack::new();
        let index = rig
            .pf
            .port_new(&PortNewAttrs::pci_sf(0, Some(1), MAC), &mut extack)
            .unwrap();
        assert_eq!(rig.pf.ports().len(), 1);
        assert_eq!(rig.pf.ports()[0].port_index, index.as_u32());
    }

    #[test]
    fn static_msix_refuses_ports() {
        let mut config = config();
        config.dynamic_msix = false;
        let rig = rig_with(config);
        let (err, msg) = refused(&rig, &PortNewAttrs::pci_sf(0, None, MAC));
        assert_eq!(err, SfError::NotSupported);
        assert_eq!(msg, "Dynamic MSIX-X interrupt allocation is not supported");
    }

    #[test]
    fn sfnums_are_unique_and_reused() {
        let rig = rig();
        let mut extack = Extack::new();
        let first = rig
            .pf
            .port_new(&PortNewAttrs::pci_sf(0, Some(3), MAC), &mut extack)
            .unwrap();
        let (err, msg) = refused(&rig, &PortNewAttrs::pci_sf(0, Some(3), MAC));
        assert!(matches!(err, SfError::Busy(_)));
        assert_eq!(msg, "Subfunction with given sfnum already exists");

        let auto = rig
            .pf
            .port_new(&PortNewAttrs::pci_sf(0, None, MAC), &mut extack)
            .unwrap();
        let sfnums: Vec<u32> = rig.pf.ports().iter().map(|p| p.sfnum).collect();
        assert_eq!(sfnums, vec![3, 0]);
        assert_ne!(first, auto);

        rig.pf.port_del(first, &mut extack).unwrap();
        rig.pf
            .port_new(&PortNewAttrs::pci_sf(0, Some(3), MAC), &mut extack)
            .unwrap();
    }

    #[test]
    fn vsi_exhaustion_is_reported() {
        let rig = rig();
        let mut extack = Extack::new();
        // the PF VSI takes one of the four slots
        for sfnum in 0..3 {
            rig.pf
                .port_new(&PortNewAttrs::pci_sf(0, Some(sfnum), MAC), &mut extack)
                .unwrap();
        }
        let (err, msg) = refused(&rig, &PortNewAttrs::pci_sf(0, Some(3), MAC));
        assert!(matches!(err, SfError::VsiAllocFailed(_)));
        assert_eq!(msg, "Unable to allocate VSI");
        // sfnum 3 was given back
        rig.pf.port_del(PortIndex::from_raw(3), &mut extack).unwrap();
        rig.pf
            .port_new(&PortNewAttrs::pci_sf(0, Some(3), MAC), &mut extack)
            .unwrap();
    }

    #[test]
    fn failed_registration_and_representor_unwind() {
        let rig = rig();
        rig.pf.devlink().fail_next_port_registrations(1);
        let (_, msg) = refused(&rig, &PortNewAttrs::pci_sf(0, Some(5), MAC));
        assert_eq!(msg, "Port registration failed");

        rig.nic.fail_next_attach_repr(1);
        let (err, msg) = refused(&rig, &PortNewAttrs::pci_sf(0, Some(5), MAC));
        assert_eq!(msg, "Failed to attach SF to eswitch");
        assert_eq!(err.errno(), -12);
        assert_eq!(rig.pf.devlink().ports().len(), 1);
        assert!(rig.pf.ports().is_empty());
        assert!(rig.nic.representors().is_empty());

        let mut extack = Extack::new();
        rig.pf
            .port_new(&PortNewAttrs::pci_sf(0, Some(5), MAC), &mut extack)
            .unwrap();
        assert_eq!(rig.nic.representors().len(), 1);
    }

    #[test]
    fn port_functions_through_devlink() {
        let rig = rig();
        let devlink = Arc::clone(rig.pf.devlink());
        let mut extack = Extack::new();
        let index = devlink
            .port_new(&PortNewAttrs::pci_sf(0, Some(3), MAC), &mut extack)
            .unwrap();
        let port = devlink.port(index).unwrap();
        assert_eq!(port.flavour().pci_sf().map(|a| a.sf), Some(3));

        assert_eq!(
            devlink.port_fn_state_get(index, &mut extack),
            Ok((PortFnState::Inactive, PortFnOpState::Detached))
        );
        assert_eq!(devlink.port_fn_hw_addr_get(index, &mut extack), Ok(MAC));
        assert_eq!(
            devlink.port_fn_hw_addr_set(index, MAC, &mut extack),
            Err(Errno(-95))
        );
        assert_eq!(extack.msg(), Some("Setting hw_addr is not supported"));

        devlink
            .port_fn_state_set(index, PortFnState::Active, &mut extack)
            .unwrap();
        devlink
            .port_fn_state_set(index, PortFnState::Active, &mut extack)
            .unwrap();
        assert_eq!(
            devlink.port_fn_state_get(index, &mut extack),
            Ok((PortFnState::Active, PortFnOpState::Attached))
        );
        assert_eq!(rig.stack.len(), 1);

        devlink
            .port_fn_state_set(index, PortFnState::Inactive, &mut extack)
            .unwrap();
        devlink
            .port_fn_state_set(index, PortFnState::Inactive, &mut extack)
            .unwrap();
        assert_eq!(
            devlink.port_fn_state_get(index, &mut extack),
            Ok((PortFnState::Inactive, PortFnOpState::Detached))
        );
        assert!(rig.stack.is_empty());

        devlink.port_del(index, &mut extack).unwrap();
        assert_eq!(
            devlink.port_fn_state_get(index, &mut extack),
            Err(Errno(-19))
        );
        assert_eq!(extack.msg(), Some("Port does not exist"));
    }

    #[test]
    fn port_del_deactivates_first() {
        let rig = rig();
        let mut extack = Extack::new();
        let index = rig
            .pf
            .port_new(&PortNewAttrs::pci_sf(0, Some(2), MAC), &mut extack)
            .unwrap();
        rig.pf.activate(index, &mut extack).unwrap();
        let vsi = rig.pf.vsi(index).unwrap();
        rig.pf.port_del(index, &mut extack).unwrap();
        assert!(rig.stack.is_empty());
        assert!(vsi.lock().netdev().is_none());
        assert!(!vsi.lock().is_configured());
        assert!(rig.pf.ports().is_empty());
        assert!(rig.nic.representors().is_empty());
        assert_eq!(rig.pf.devlink().ports().len(), 1);
        let counters = rig.pf.counters().snapshot();
        assert_eq!(counters.releases, 1);
        assert_eq!(counters.live_blocks(), 0);
    }

    #[test]
    fn dropping_the_pf_tears_everything_down() {
        let Rig {
            nic,
            stack,
            registry,
            pf,
        } = rig();
        let mut extack = Extack::new();
        for sfnum in [1, 2] {
            let index = pf
                .port_new(&PortNewAttrs::pci_sf(0, Some(sfnum), MAC), &mut extack)
                .unwrap();
            pf.activate(index, &mut extack).unwrap();
        }
        assert_eq!(stack.len(), 2);
        assert_eq!(registry.instances().len(), 3);
        let counters = pf.counters();
        pf.shutdown();
        assert!(stack.is_empty());
        assert!(registry.instances().is_empty());
        assert!(nic.representors().is_empty());
        assert!(nic.filters().is_empty());
        assert_eq!(nic.free_queues(), (64, 64));
        let counters = counters.snapshot();
        assert_eq!(counters.sf_allocated, 2);
        assert_eq!(counters.releases, 2);
        assert_eq!(counters.ids_freed, 2);
    }
}
