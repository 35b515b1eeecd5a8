// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Admin ports of subfunctions.
//!
//! A subfunction has two: the `pcisf` port registered on the PF instance when the port is
//! created, and a virtual port on the subfunction's own instance registered while it is probed.

use crate::error::SfError;
use devlink::{Devlink, PciSfAttrs, PortFlavour, PortIndex};
use hardware::vsi::VsiIdx;
use tracectl::trace_target;
use tracing::debug;

trace_target!("sf-devlink", LevelFilter::INFO, &["sf"]);

/// Register the `pcisf` port `index` on the PF instance.
pub(crate) fn create_sf_port(
    pf_devlink: &Devlink,
    index: PortIndex,
    attrs: PciSfAttrs,
) -> Result<(), SfError> {
    pf_devlink
        .port_register(index, PortFlavour::PciSf(attrs))
        .map_err(|e| SfError::AdminPortCreateFailed(e.to_string()))
}

pub(crate) fn destroy_sf_port(pf_devlink: &Devlink, index: PortIndex) {
    pf_devlink.port_clear_netdev(index);
    if pf_devlink.port_unregister(index).is_none() {
        debug!("{}: no port {index} to destroy", pf_devlink.handle());
    }
}

/// Register the virtual port of a subfunction on its own instance.  The port index is the
/// index of the subfunction's VSI.
pub(crate) fn create_sf_dev_port(devlink: &Devlink, vsi: VsiIdx) -> Result<PortIndex, SfError> {
    let index = PortIndex::from_raw(u32::from(*vsi.as_raw()));
    devlink
        .port_register(index, PortFlavour::Virtual)
        .map_err(|e| SfError::AdminPortCreateFailed(e.to_string()))?;
    Ok(index)
}

pub(crate) fn destroy_sf_dev_port(devlink: &Devlink, index: PortIndex) {
    devlink.port_clear_netdev(index);
    devlink.port_unregister(index);
}

#[cfg(test)]
mod test {
    use super::{create_sf_dev_port, create_sf_port, destroy_sf_dev_port, destroy_sf_port};
    use crate::error::SfError;
    use devlink::{Devlink, PciSfAttrs, PortFlavour, PortIndex};
    use hardware::vsi::VsiIdx;

    #[test]
    fn pcisf_port_lifecycle() {
        let devlink = Devlink::alloc("pci", "0000:3b:00.0");
        let attrs = PciSfAttrs {
            controller: 0,
            pf: 0,
            sf: 3,
            external: false,
        };
        let index = PortIndex::from_raw(4);
        create_sf_port(&devlink, index, attrs).unwrap();
        assert!(matches!(
            create_sf_port(&devlink, index, attrs),
            Err(SfError::AdminPortCreateFailed(_))
        ));
        let port = devlink.port(index).unwrap();
        assert_eq!(port.flavour(), &PortFlavour::PciSf(attrs));
        destroy_sf_port(&devlink, index);
        assert!(devlink.port(index).is_none());
    }

    #[test]
    fn virtual_port_follows_vsi_index() {
        let devlink = Devlink::alloc("auxiliary", "ice.sf.1");
        let index = create_sf_dev_port(&devlink, VsiIdx::from_raw(5)).unwrap();
        assert_eq!(index.as_u32(), 5);
        assert_eq!(devlink.port(index).unwrap().flavour(), &PortFlavour::Virtual);
        devlink.fail_next_port_registrations(1);
        assert!(create_sf_dev_port(&devlink, VsiIdx::from_raw(6)).unwrap_err().is_soft());
        destroy_sf_dev_port(&devlink, index);
        assert!(devlink.ports().is_empty());
    }
}
