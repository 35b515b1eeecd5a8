// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Probe and remove of subfunction auxiliary devices.

use crate::aux::{SfDev, SfPriv};
use crate::devlink_port::{create_sf_dev_port, destroy_sf_dev_port};
use crate::error::SfError;
use crate::netdev::{self, NetdevSpec};
use crate::pf::PfInner;
use crate::vsi;
use auxbus::AuxDevice;
use devlink::Devlink;
use hardware::nic::FwdAction;
use hardware::vsi::VsiState;
use net::interface::InterfaceName;
use std::sync::Arc;
use tracectl::trace_target;
use tracing::{debug, error, info, warn};

trace_target!("sf-probe", LevelFilter::INFO, &["sf"]);

/// Interface name of the subfunction net device, if the PF's name yields a legal one.
fn sf_netdev_name(pf: &PfInner, sfnum: u32) -> Option<InterfaceName> {
    let base = pf.config.netdev_name.as_ref()?;
    InterfaceName::try_from(format!("{base}_s{sfnum}"))
        .inspect_err(|e| debug!("falling back to a default interface name: {e}"))
        .ok()
}

fn unregister_devlink(pf: &PfInner, devlink: &Devlink) {
    pf.registry.unregister(devlink);
}

/// Bring up the subfunction behind `adev`: its devlink instance, VSI, admin port and net device.
pub(crate) fn sf_dev_probe(adev: &AuxDevice<SfDev>) -> Result<(), SfError> {
    let sf_dev = adev.payload();
    let Some(pf) = sf_dev.pf.upgrade() else {
        error!("subfunction {} outlived its PF", sf_dev.aux_id);
        return Err(SfError::NotFound(sf_dev.port.as_u32()));
    };
    let (vsi, hw_addr, sfnum) = {
        let state = pf.state.lock();
        let port = state
            .ports
            .lookup(sf_dev.port)
            .ok_or(SfError::NotFound(sf_dev.port.as_u32()))?;
        (Arc::clone(port.vsi()), port.hw_addr(), port.sfnum())
    };
    let dev_name = adev.dev_name().unwrap_or(adev.name()).to_string();

    let devlink = Arc::new(Devlink::alloc("auxiliary", &dev_name));
    if let Err(e) = pf.registry.register(&devlink) {
        error!("Subfunction devlink alloc failed: {e}");
        return Err(SfError::OutOfMemory);
    }

    let vsi_idx = {
        let mut vsi = vsi.lock();
        if let Err(e) = vsi::configure(pf.nic.as_ref(), &mut vsi) {
            error!("Subfunction vsi config failed: {e}");
            drop(vsi);
            unregister_devlink(&pf, &devlink);
            return Err(e);
        }
        vsi.set_sf(Some(sf_dev.port.as_u32()));
        vsi.idx()
    };

    let dev_port = create_sf_dev_port(&devlink, vsi_idx)
        .inspect_err(|e| debug!("Cannot add ice virtual devlink port for subfunction: {e}"))
        .ok();
    let port_ref = match dev_port {
        Some(index) => devlink.port_ref(index),
        None => sf_dev.admin.port_ref(sf_dev.port),
    };

    let spec = NetdevSpec {
        parent: dev_name.clone(),
        hw_addr,
        port: port_ref,
        name: sf_netdev_name(&pf, sfnum.as_u32()),
        double_vlan: pf.config.double_vlan_mode,
    };
    let netdev = match netdev::build(&vsi, spec, &pf.nic, pf.stack.as_ref()) {
        Ok(netdev) => netdev,
        Err(e) => {
            error!("subfunction netdev config failed: {e}");
            if let Some(index) = dev_port {
                destroy_sf_dev_port(&devlink, index);
            }
            {
                let mut vsi = vsi.lock();
                vsi::deconfigure(pf.nic.as_ref(), &mut vsi);
                vsi.set_sf(None);
            }
            unregister_devlink(&pf, &devlink);
            return Err(e);
        }
    };

    let paired = match dev_port {
        Some(index) => devlink.port_set_netdev(index, &netdev),
        None => sf_dev.admin.port_set_netdev(sf_dev.port, &netdev),
    };
    if let Err(e) = paired {
        warn!("could not pair the admin port with {dev_name}'s net device: {e}");
    }

    {
        let mut vsi = vsi.lock();
        match pf
            .nic
            .add_mac_and_broadcast(&vsi, hw_addr, FwdAction::ToVsi)
            .map_err(|e| SfError::FilterAddFailed(e.to_string()))
        {
            Ok(()) => debug!("MAC {hw_addr} filter added for vsi {vsi_idx}"),
            Err(e) => debug!("can't add MAC filters {hw_addr} for VSI {vsi_idx}: {e}"),
        }
        pf.nic.napi_add(&mut vsi);
    }

    *sf_dev.sf_priv.lock() = Some(SfPriv {
        devlink,
        dev_port,
        vsi,
    });
    info!("probed subfunction {dev_name} (sfnum {sfnum}, VSI {vsi_idx})");
    Ok(())
}

/// Undo [`sf_dev_probe`].  Never fails; problems are logged.
pub(crate) fn sf_dev_remove(adev: &AuxDevice<SfDev>) {
    let sf_dev = adev.payload();
    let dev_name = adev.dev_name().unwrap_or(adev.name());
    let Some(sf_priv) = sf_dev.sf_priv.lock().take() else {
        warn!("remove of subfunction {dev_name} which was not probed");
        return;
    };
    let Some(pf) = sf_dev.pf.upgrade() else {
        warn!("subfunction {dev_name} outlived its PF");
        return;
    };

    let netdev = {
        let mut vsi = sf_priv.vsi.lock();
        pf.nic.vsi_close(&mut vsi);
        vsi::deconfigure(pf.nic.as_ref(), &mut vsi);
        vsi.netdev().cloned()
    };
    match &netdev {
        Some(netdev) => pf.stack.unregister_netdev(netdev),
        None => warn!("subfunction {dev_name} has no net device"),
    }
    sf_priv.vsi.lock().clear_state(VsiState::NETDEV_REGISTERED);

    match sf_priv.dev_port {
        Some(index) => destroy_sf_dev_port(&sf_priv.devlink, index),
        None => sf_dev.admin.port_clear_netdev(sf_dev.port),
    }

    {
        let mut vsi = sf_priv.vsi.lock();
        vsi.take_netdev();
        vsi.clear_state(VsiState::NETDEV_ALLOCD);
        vsi.set_sf(None);
    }
    drop(netdev);

    unregister_devlink(&pf, &sf_priv.devlink);

    // a driver unbind leaves the device attached; the next activate or delete takes it
    if let Some(port) = pf.state.lock().ports.lookup_mut(sf_dev.port) {
        port.active = false;
    }
    info!("removed subfunction {dev_name}");
}
