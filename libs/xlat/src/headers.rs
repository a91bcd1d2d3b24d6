//! Output header construction and in-place checksum edits.

use std::net::{Ipv4Addr, Ipv6Addr};

use etherparse::{
    IpFragOffset, IpNumber, Ipv4Dscp, Ipv4Ecn, Ipv4Header, Ipv4Options, Ipv6FlowLabel,
    Ipv6FragmentHeader, Ipv6Header,
};
use ip_packet::checksum;

pub(crate) fn ipv6_header(
    traffic_class: u8,
    payload_length: u16,
    next_header: u8,
    hop_limit: u8,
    source: Ipv6Addr,
    destination: Ipv6Addr,
) -> Ipv6Header {
    Ipv6Header {
        traffic_class,
        flow_label: Ipv6FlowLabel::ZERO,
        payload_length,
        next_header: IpNumber(next_header),
        hop_limit,
        source: source.octets(),
        destination: destination.octets(),
    }
}

pub(crate) struct Ipv4Fields {
    pub tos: u8,
    pub total_len: u16,
    pub identification: u16,
    pub dont_fragment: bool,
    pub more_fragments: bool,
    /// In 8-byte units.
    pub fragment_offset: u16,
    pub time_to_live: u8,
    pub protocol: u8,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
}

pub(crate) fn ipv4_header(fields: Ipv4Fields) -> Ipv4Header {
    Ipv4Header {
        dscp: Ipv4Dscp::try_new(fields.tos >> 2).unwrap_or(Ipv4Dscp::ZERO),
        ecn: Ipv4Ecn::try_new(fields.tos & 0b11).unwrap_or(Ipv4Ecn::ZERO),
        total_len: fields.total_len,
        identification: fields.identification,
        dont_fragment: fields.dont_fragment,
        more_fragments: fields.more_fragments,
        fragment_offset: IpFragOffset::try_new(fields.fragment_offset)
            .unwrap_or(IpFragOffset::ZERO),
        time_to_live: fields.time_to_live,
        protocol: IpNumber(fields.protocol),
        header_checksum: 0,
        options: Ipv4Options::default(),
        source: fields.source.octets(),
        destination: fields.destination.octets(),
    }
}

/// Serializes `header` with its checksum filled in.
pub(crate) fn ipv4_bytes(mut header: Ipv4Header) -> Vec<u8> {
    header.header_checksum = header.calc_header_checksum();

    header.to_bytes().to_vec()
}

pub(crate) fn fragment_header(
    next_header: u8,
    offset_bytes: u32,
    more_fragments: bool,
    identification: u32,
) -> [u8; 8] {
    Ipv6FragmentHeader {
        next_header: IpNumber(next_header),
        fragment_offset: IpFragOffset::try_new((offset_bytes / 8) as u16)
            .unwrap_or(IpFragOffset::ZERO),
        more_fragments,
        identification,
    }
    .to_bytes()
}

/// `ones_add`s `adjustment` into the big-endian 16-bit field at `at`.
pub(crate) fn adjust_checksum_field(buf: &mut [u8], at: usize, adjustment: u16) {
    let old = u16::from_be_bytes([buf[at], buf[at + 1]]);
    let new = checksum::ones_add(old, adjustment);

    buf[at..at + 2].copy_from_slice(&new.to_be_bytes());
}

/// Overwrites the big-endian 16-bit field at `at`.
pub(crate) fn set_checksum_field(buf: &mut [u8], at: usize, value: u16) {
    buf[at..at + 2].copy_from_slice(&value.to_be_bytes());
}
