// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Configuration of subfunction VSIs.

use crate::error::SfError;
use hardware::nic::Nic;
use hardware::vsi::{Vsi, VsiCfgFlags, VsiCfgParams, VsiType};

/// Program `vsi` as a subfunction VSI on the PF's port.
pub(crate) fn configure(nic: &dyn Nic, vsi: &mut Vsi) -> Result<(), SfError> {
    let params = VsiCfgParams {
        vsi_type: VsiType::Sf,
        port_info: nic.port_info(),
        flags: VsiCfgFlags::INIT,
    };
    nic.vsi_cfg(vsi, &params)
        .map_err(|e| SfError::VsiConfigFailed(e.to_string()))
}

/// Undo [`configure`].
pub(crate) fn deconfigure(nic: &dyn Nic, vsi: &mut Vsi) {
    nic.vsi_decfg(vsi);
}

#[cfg(test)]
mod test {
    use super::{configure, deconfigure};
    use crate::error::SfError;
    use hardware::nic::SimNic;
    use hardware::vsi::{PortInfo, Vsi, VsiIdx, VsiType};
    use net::eth::mac::Mac;

    fn nic() -> SimNic {
        SimNic::new(
            PortInfo {
                lport: 1,
                mac: Mac([0x02, 0, 0, 0, 0, 0xaa]),
            },
            8,
            8,
        )
    }

    #[test]
    fn configure_then_deconfigure() {
        let nic = nic();
        let mut vsi = Vsi::new(VsiIdx::from_raw(3), VsiType::Sf, 2, 2);
        configure(&nic, &mut vsi).unwrap();
        assert!(vsi.is_configured());
        assert_eq!(vsi.port_info().map(|p| p.lport), Some(1));
        assert_eq!(nic.free_queues(), (6, 6));
        assert!(matches!(
            configure(&nic, &mut vsi),
            Err(SfError::VsiConfigFailed(_))
        ));
        deconfigure(&nic, &mut vsi);
        assert!(!vsi.is_configured());
        assert_eq!(nic.free_queues(), (8, 8));
    }

    #[test]
    fn injected_failure_leaves_vsi_unconfigured() {
        let nic = nic();
        nic.fail_next_vsi_cfg(1);
        let mut vsi = Vsi::new(VsiIdx::from_raw(1), VsiType::Sf, 1, 1);
        assert!(configure(&nic, &mut vsi).is_err());
        assert!(!vsi.is_configured());
        configure(&nic, &mut vsi).unwrap();
    }
}
