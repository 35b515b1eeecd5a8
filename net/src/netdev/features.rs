// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Offload and XDP capability flags of a net device.

use bitflags::bitflags;

bitflags! {
    /// Offload features a net device advertises to the stack.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
    pub struct NetdevFeatures: u64 {
        /// Scatter/gather IO.
        const SG = 1 << 0;
        /// IPv4 TCP/UDP checksum offload.
        const IP_CSUM = 1 << 1;
        /// IPv6 TCP/UDP checksum offload.
        const IPV6_CSUM = 1 << 2;
        /// Can DMA to high memory.
        const HIGHDMA = 1 << 3;
        /// TCP segmentation offload (IPv4).
        const TSO = 1 << 4;
        /// TCP segmentation offload (IPv6).
        const TSO6 = 1 << 5;
        /// TSO of packets with the ECN CWR flag.
        const TSO_ECN = 1 << 6;
        /// TSO with mangled IP ids.
        const TSO_MANGLEID = 1 << 7;
        /// UDP segmentation offload.
        const GSO_UDP_L4 = 1 << 8;
        /// Segmentation of GRE tunnels.
        const GSO_GRE = 1 << 9;
        /// Segmentation of GRE tunnels with outer checksum.
        const GSO_GRE_CSUM = 1 << 10;
        /// Segmentation of IP-in-IP tunnels.
        const GSO_IPXIP4 = 1 << 11;
        /// Segmentation of IPv6-in-IP tunnels.
        const GSO_IPXIP6 = 1 << 12;
        /// Segmentation of UDP tunnels.
        const GSO_UDP_TUNNEL = 1 << 13;
        /// Segmentation of UDP tunnels with outer checksum.
        const GSO_UDP_TUNNEL_CSUM = 1 << 14;
        /// Partial segmentation offload.
        const GSO_PARTIAL = 1 << 15;
        /// Receive hashing offload.
        const RXHASH = 1 << 16;
        /// Receive checksum offload.
        const RXCSUM = 1 << 17;
        /// SCTP checksum offload.
        const SCTP_CRC = 1 << 18;
        /// Hardware receive (802.1Q) VLAN stripping.
        const HW_VLAN_CTAG_RX = 1 << 19;
        /// Hardware transmit (802.1Q) VLAN insertion.
        const HW_VLAN_CTAG_TX = 1 << 20;
        /// Hardware receive (802.1Q) VLAN filtering.
        const HW_VLAN_CTAG_FILTER = 1 << 21;
        /// Hardware receive (802.1ad) VLAN stripping.
        const HW_VLAN_STAG_RX = 1 << 22;
        /// Hardware transmit (802.1ad) VLAN insertion.
        const HW_VLAN_STAG_TX = 1 << 23;
        /// Hardware receive (802.1ad) VLAN filtering.
        const HW_VLAN_STAG_FILTER = 1 << 24;
        /// Receive n-tuple filters.
        const NTUPLE = 1 << 25;
        /// Hardware traffic class offload.
        const HW_TC = 1 << 26;
        /// Loopback of transmitted frames.
        const LOOPBACK = 1 << 27;
        /// Hardware generic receive offload.
        const GRO_HW = 1 << 28;
        /// Receive FCS stripping is disabled.
        const RXFCS = 1 << 29;
    }
}

impl NetdevFeatures {
    /// Checksum offloads.
    pub const CSUM: NetdevFeatures = NetdevFeatures::IP_CSUM
        .union(NetdevFeatures::IPV6_CSUM)
        .union(NetdevFeatures::SCTP_CRC);

    /// Segmentation offloads of tunnelled traffic.
    pub const TUNNEL_GSO: NetdevFeatures = NetdevFeatures::GSO_GRE
        .union(NetdevFeatures::GSO_GRE_CSUM)
        .union(NetdevFeatures::GSO_IPXIP4)
        .union(NetdevFeatures::GSO_IPXIP6)
        .union(NetdevFeatures::GSO_UDP_TUNNEL)
        .union(NetdevFeatures::GSO_UDP_TUNNEL_CSUM)
        .union(NetdevFeatures::GSO_PARTIAL);

    /// 802.1Q VLAN offloads.
    pub const VLAN_CTAG: NetdevFeatures = NetdevFeatures::HW_VLAN_CTAG_RX
        .union(NetdevFeatures::HW_VLAN_CTAG_TX)
        .union(NetdevFeatures::HW_VLAN_CTAG_FILTER);

    /// 802.1ad VLAN offloads.
    pub const VLAN_STAG: NetdevFeatures = NetdevFeatures::HW_VLAN_STAG_RX
        .union(NetdevFeatures::HW_VLAN_STAG_TX)
        .union(NetdevFeatures::HW_VLAN_STAG_FILTER);
}

bitflags! {
    /// XDP capabilities a net device advertises.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
    pub struct XdpFeatures: u32 {
        /// XDP_PASS, XDP_DROP, XDP_ABORTED and XDP_TX.
        const BASIC = 1 << 0;
        /// XDP_REDIRECT out of this device.
        const REDIRECT = 1 << 1;
        /// Target of XDP_REDIRECT (ndo_xdp_xmit).
        const NDO_XMIT = 1 << 2;
        /// AF_XDP zero copy.
        const XSK_ZEROCOPY = 1 << 3;
        /// Multi-buffer frames on receive.
        const RX_SG = 1 << 5;
        /// Multi-buffer frames on ndo_xdp_xmit.
        const NDO_XMIT_SG = 1 << 6;
    }
}

#[cfg(test)]
mod test {
    use super::NetdevFeatures;

    #[test]
    fn composite_sets_do_not_overlap() {
        assert!(!NetdevFeatures::CSUM.intersects(NetdevFeatures::TUNNEL_GSO));
        assert!(!NetdevFeatures::VLAN_CTAG.intersects(NetdevFeatures::VLAN_STAG));
        assert!(NetdevFeatures::VLAN_CTAG.contains(NetdevFeatures::HW_VLAN_CTAG_FILTER));
    }
}
