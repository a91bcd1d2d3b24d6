use std::net::{Ipv4Addr, Ipv6Addr};

/// How to treat UDP datagrams without a checksum when translating towards
/// IPv6, where a zero checksum is not allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UdpCksumMode {
    /// Drop the datagram.
    #[default]
    Drop,
    /// Compute a fresh checksum.
    Calc,
    /// Forward with the zero checksum intact.
    Fwd,
}

/// Translator settings, fixed after startup. Every translation call
/// borrows this; nothing here changes while packets are in flight.
#[derive(Debug, Clone)]
pub struct Config {
    /// The translator's own IPv4 address. Terminates traffic addressed to
    /// it and sources ICMPv4 errors.
    pub local_addr4: Ipv4Addr,
    /// The translator's own IPv6 address.
    pub local_addr6: Ipv6Addr,
    /// MTU of the TUN device.
    pub mtu: u16,
    /// Assumed MTU of off-link IPv6 destinations, used to size emitted
    /// fragments.
    pub ipv6_offlink_mtu: u16,
    /// Refuse to embed or extract private IPv4 space under the Well-Known
    /// Prefix.
    pub wkpf_strict: bool,
    /// Generate IPv4 identifiers for destinations that proved to sit
    /// behind a path MTU below the IPv6 minimum.
    pub allow_ident_gen: bool,
    /// Omit the Fragment header when an unfragmented datagram fits the
    /// path anyway.
    pub lazy_frag_hdr: bool,
    pub udp_cksum_mode: UdpCksumMode,
}
