// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Dynamic ports and the per-PF store holding them.

use crate::aux::SfDev;
use crate::error::SfError;
use crate::ids::SfNum;
use auxbus::AuxDevice;
use devlink::PortIndex;
use hardware::nic::ReprId;
use hardware::vsi::{Vsi, VsiIdx};
use net::eth::mac::Mac;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Flavour specific state of a dynamic port.
#[derive(Debug)]
pub enum FlavourData {
    /// An ethernet subfunction; holds the auxiliary device while the port is active.
    SfDev(Option<AuxDevice<SfDev>>),
}

/// A port created by `devlink port add`.
#[derive(Debug)]
pub struct DynamicPort {
    pub(crate) index: PortIndex,
    pub(crate) sfnum: SfNum,
    pub(crate) hw_addr: Mac,
    pub(crate) active: bool,
    pub(crate) vsi: Arc<Mutex<Vsi>>,
    pub(crate) vsi_idx: VsiIdx,
    pub(crate) repr_id: Option<ReprId>,
    pub(crate) flavour: FlavourData,
    seq: u64,
}

impl DynamicPort {
    pub(crate) fn new(
        index: PortIndex,
        sfnum: SfNum,
        hw_addr: Mac,
        vsi: Arc<Mutex<Vsi>>,
        vsi_idx: VsiIdx,
    ) -> Self {
        Self {
            index,
            sfnum,
            hw_addr,
            active: false,
            vsi,
            vsi_idx,
            repr_id: None,
            flavour: FlavourData::SfDev(None),
            seq: 0,
        }
    }

    /// Index of the port's admin port on the PF devlink instance.
    pub fn admin_port(&self) -> PortIndex {
        self.index
    }

    pub fn sfnum(&self) -> SfNum {
        self.sfnum
    }

    pub fn hw_addr(&self) -> Mac {
        self.hw_addr
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn vsi(&self) -> &Arc<Mutex<Vsi>> {
        &self.vsi
    }

    pub fn repr_id(&self) -> Option<ReprId> {
        self.repr_id
    }

    /// The auxiliary device of an active subfunction.
    pub fn sf_dev(&self) -> Option<&AuxDevice<SfDev>> {
        match &self.flavour {
            FlavourData::SfDev(adev) => adev.as_ref(),
        }
    }

    pub(crate) fn attach_sf_dev(&mut self, adev: AuxDevice<SfDev>) {
        self.flavour = FlavourData::SfDev(Some(adev));
    }

    pub(crate) fn take_sf_dev(&mut self) -> Option<AuxDevice<SfDev>> {
        match &mut self.flavour {
            FlavourData::SfDev(adev) => adev.take(),
        }
    }

    /// A printable summary.
    pub fn info(&self) -> DynamicPortInfo {
        let vsi = self.vsi.lock();
        DynamicPortInfo {
            port_index: self.index.as_u32(),
            sfnum: self.sfnum.as_u32(),
            hw_addr: self.hw_addr.to_string(),
            active: self.active,
            vsi: *self.vsi_idx.as_raw(),
            repr_id: self.repr_id.map(ReprId::as_u32),
            aux_dev: self
                .sf_dev()
                .and_then(|adev| adev.dev_name().map(str::to_string)),
            netdev: vsi
                .netdev()
                .and_then(|netdev| netdev.name().map(ToString::to_string)),
        }
    }
}

/// Summary of a [`DynamicPort`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DynamicPortInfo {
    pub port_index: u32,
    pub sfnum: u32,
    pub hw_addr: String,
    pub active: bool,
    pub vsi: u16,
    pub repr_id: Option<u32>,
    pub aux_dev: Option<String>,
    pub netdev: Option<String>,
}

/// The dynamic ports of a PF, by port index.
#[derive(Debug, Default)]
pub struct PortStore {
    ports: BTreeMap<PortIndex, DynamicPort>,
    next_seq: u64,
}

impl PortStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// Add `port` under its index.
    pub fn create(&mut self, mut port: DynamicPort) -> Result<PortIndex, SfError> {
        let index = port.index;
        if self.ports.contains_key(&index) {
            return Err(SfError::Busy(format!("port {index} exists")));
        }
        port.seq = self.next_seq;
        self.next_seq += 1;
        self.ports.insert(index, port);
        Ok(index)
    }

    pub fn lookup(&self, index: PortIndex) -> Option<&DynamicPort> {
        self.ports.get(&index)
    }

    pub fn lookup_mut(&mut self, index: PortIndex) -> Option<&mut DynamicPort> {
        self.ports.get_mut(&index)
    }

    /// Remove an inactive port.
    pub fn destroy(&mut self, index: PortIndex) -> Result<DynamicPort, SfError> {
        match self.ports.get(&index) {
            None => Err(SfError::NotFound(index.as_u32())),
            Some(port) if port.active || port.sf_dev().is_some() => {
                Err(SfError::PortActive(index.as_u32()))
            }
            Some(_) => self
                .ports
                .remove(&index)
                .ok_or(SfError::NotFound(index.as_u32())),
        }
    }

    /// Port indices, most recently created first.
    pub fn newest_first(&self) -> Vec<PortIndex> {
        let mut ports: Vec<_> = self.ports.values().map(|p| (p.seq, p.index)).collect();
        ports.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        ports.into_iter().map(|(_, index)| index).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DynamicPort> {
        self.ports.values()
    }
}
