// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The auxiliary device of an ethernet subfunction and the `sf` driver which binds to it.

use crate::counters::Counters;
use crate::error::SfError;
use crate::ids::{AuxId, AuxIdAllocator};
use crate::pf::PfInner;
use crate::probe;
use auxbus::{AuxDevice, AuxDriver, AuxiliaryBus, DeviceAttribute, DriverError};
use devlink::{Devlink, PortIndex};
use hardware::vsi::Vsi;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracectl::trace_target;
use tracing::{debug, warn};

trace_target!("sf-aux", LevelFilter::INFO, &["sf"]);

/// Name of the subfunction driver.
pub const SF_DRIVER_NAME: &str = "sf";
/// Name of subfunction auxiliary devices.
pub const SF_DEV_NAME: &str = "sf";
/// Devices the subfunction driver binds to.
pub const SF_ID_TABLE: &[&str] = &["ice.sf"];

/// The auxiliary bus subfunction devices live on.
pub type SfBus = AuxiliaryBus<SfDriver>;

/// What probe sets up for the subfunction and remove tears down.
#[derive(Debug)]
pub(crate) struct SfPriv {
    /// The devlink instance of the subfunction itself (`auxiliary/<device>`).
    pub(crate) devlink: Arc<Devlink>,
    /// Its virtual port, when it could be registered.
    pub(crate) dev_port: Option<PortIndex>,
    /// The configured VSI.
    pub(crate) vsi: Arc<Mutex<Vsi>>,
}

/// Payload of a subfunction auxiliary device.
///
/// Owned by the device from init on; the bus hands it back to [`sf_dev_release`] once the last
/// reference to the device is gone.
#[derive(Debug)]
pub struct SfDev {
    pub(crate) pf: Weak<PfInner>,
    pub(crate) admin: Arc<Devlink>,
    pub(crate) port: PortIndex,
    pub(crate) aux_id: AuxId,
    pub(crate) aux_ids: Arc<AuxIdAllocator>,
    pub(crate) counters: Arc<Counters>,
    pub(crate) sf_priv: Mutex<Option<SfPriv>>,
}

impl SfDev {
    pub(crate) fn new(pf: &Arc<PfInner>, port: PortIndex, aux_id: AuxId) -> Self {
        pf.counters.sf_allocated();
        Self {
            pf: Arc::downgrade(pf),
            admin: Arc::clone(&pf.devlink),
            port,
            aux_id,
            aux_ids: Arc::clone(&pf.aux_ids),
            counters: Arc::clone(&pf.counters),
            sf_priv: Mutex::new(None),
        }
    }

    /// The dynamic port this subfunction belongs to.
    pub fn port(&self) -> PortIndex {
        self.port
    }

    pub fn aux_id(&self) -> AuxId {
        self.aux_id
    }

    /// Handle of the subfunction's own devlink instance, while probed.
    pub fn devlink_handle(&self) -> Option<String> {
        self.sf_priv
            .lock()
            .as_ref()
            .map(|sf_priv| sf_priv.devlink.handle().to_string())
    }
}

impl Drop for SfDev {
    fn drop(&mut self) {
        self.counters.sf_freed();
    }
}

/// Release callback of subfunction devices: free the block, then the id.
pub(crate) fn sf_dev_release(sf_dev: SfDev, id: u32) {
    let aux_ids = Arc::clone(&sf_dev.aux_ids);
    let counters = Arc::clone(&sf_dev.counters);
    if sf_dev.aux_id.as_u32() != id {
        warn!(
            "subfunction device released as id {id} but allocated as {}",
            sf_dev.aux_id
        );
    }
    drop(sf_dev);
    counters.released();
    if aux_ids.free(AuxId::from_raw(id)) {
        counters.id_freed();
    } else {
        warn!("subfunction id {id} was not allocated");
    }
    debug!("released subfunction device {id}");
}

fn sfnum_show(adev: &AuxDevice<SfDev>) -> String {
    let sf_dev = adev.payload();
    sf_dev
        .admin
        .port(sf_dev.port)
        .and_then(|port| port.flavour().pci_sf().map(|attrs| attrs.sf))
        .map_or_else(String::new, |sfnum| format!("{sfnum}\n"))
}

static SF_DEVICE_ATTRS: &[DeviceAttribute<SfDev>] = &[DeviceAttribute {
    name: "sfnum",
    show: sfnum_show,
}];

/// Attribute groups of subfunction devices.
pub(crate) static SF_ATTR_GROUPS: &[&[DeviceAttribute<SfDev>]] = &[SF_DEVICE_ATTRS];

/// The subfunction driver.
#[derive(Debug, Default)]
pub struct SfDriver;

impl AuxDriver for SfDriver {
    type Payload = SfDev;
    type Error = SfError;

    fn name(&self) -> &str {
        SF_DRIVER_NAME
    }

    fn id_table(&self) -> &[&str] {
        SF_ID_TABLE
    }

    fn probe(&self, adev: &AuxDevice<SfDev>, _id: &str) -> Result<(), SfError> {
        probe::sf_dev_probe(adev)
    }

    fn remove(&self, adev: &AuxDevice<SfDev>) {
        probe::sf_dev_remove(adev);
    }
}

/// Register the subfunction driver on `bus`.
pub fn driver_register(bus: &SfBus) -> Result<(), DriverError> {
    bus.driver_register(Arc::new(SfDriver))
}

/// Unregister the subfunction driver, unbinding every subfunction device.
pub fn driver_unregister(bus: &SfBus) -> Result<(), DriverError> {
    bus.driver_unregister(SF_DRIVER_NAME)
}
