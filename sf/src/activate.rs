// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Activation and deactivation of a subfunction.
//!
//! Activation publishes an auxiliary device for the port; the `sf` driver probes it
//! synchronously, so once [`activate`] returns the subfunction's net device exists.  A device
//! no driver bound to is taken off the bus again and the activation fails.  The
//! auxiliary id and the [`SfDev`] block belong to the device from init on: after that point
//! only the device's release callback frees them.

use crate::aux::{SF_ATTR_GROUPS, SF_DEV_NAME, SfBus, SfDev, sf_dev_release};
use crate::error::SfError;
use crate::ids::AuxId;
use crate::pf::PfInner;
use auxbus::{AddError, AuxDevice, AuxDeviceConfig, InitError};
use devlink::{Extack, PortIndex};
use std::sync::Arc;
use tracectl::trace_target;
use tracing::{debug, error, info};

trace_target!("sf-activate", LevelFilter::INFO, &["sf"]);

fn free_unpublished_id(pf: &PfInner, id: AuxId) {
    if pf.aux_ids.free(id) {
        pf.counters.id_freed();
    }
}

/// Publish the auxiliary device of `port` and have it probed.
pub(crate) fn activate(
    pf: &Arc<PfInner>,
    port: PortIndex,
    extack: &mut Extack,
) -> Result<AuxDevice<SfDev>, SfError> {
    let Ok(aux_id) = pf.aux_ids.alloc() else {
        extack.set_msg("Could not allocate subfunction ID");
        return Err(SfError::OutOfIds);
    };
    debug!("allocated subfunction id {aux_id} for port {port}");

    let sf_dev = SfDev::new(pf, port, aux_id);
    let config = AuxDeviceConfig {
        name: SF_DEV_NAME,
        id: aux_id.as_u32(),
        parent: Some(pf.config.pci_address.to_string()),
        groups: SF_ATTR_GROUPS,
        release: sf_dev_release,
    };

    let adev = match pf.bus.device_init(config, sf_dev) {
        Ok(adev) => adev,
        Err(InitError { payload, reason }) => {
            extack.set_msg("Failed to initialize auxiliary device");
            error!("init of subfunction device {aux_id} failed: {reason}");
            drop(payload);
            free_unpublished_id(pf, aux_id);
            return Err(SfError::AuxInitFailed(reason.to_string()));
        }
    };

    if let Err(e) = pf.bus.add(&adev, &pf.config.module_name) {
        extack.set_msg("Auxiliary device failed to probe");
        error!("add of subfunction device {aux_id} failed: {e}");
        // the release callback frees the block and the id
        adev.uninit();
        return Err(match e {
            AddError::Probe { source, .. } => source,
            other => SfError::AuxAddFailed(other.to_string()),
        });
    }

    let dev_name = adev.dev_name().unwrap_or_default().to_string();
    if !pf.bus.is_bound(&dev_name) {
        extack.set_msg("No driver bound to the subfunction device");
        error!("subfunction device {dev_name} was added but no driver bound to it");
        pf.bus.delete(&adev);
        adev.uninit();
        return Err(SfError::AuxAddFailed(format!("{dev_name} is not bound")));
    }

    info!("activated port {port} as {dev_name}");
    Ok(adev)
}

/// Remove the auxiliary device of an active subfunction, tearing its net device down.
pub(crate) fn deactivate(bus: &SfBus, adev: AuxDevice<SfDev>) {
    let port = adev.payload().port();
    bus.delete(&adev);
    adev.uninit();
    info!("deactivated port {port}");
}
