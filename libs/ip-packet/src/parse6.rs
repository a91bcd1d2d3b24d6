use std::net::Ipv6Addr;
use std::ops::Range;

use etherparse::{IpNumber, Ipv6Header};

use crate::{IcmpHdr, ParseError, checksum};

const HOP_BY_HOP: u8 = 0;
const ROUTING: u8 = 43;
const FRAGMENT: u8 = 44;
const DEST_OPTS: u8 = 60;

/// The IPv6 Fragment extension header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    pub next_header: u8,
    /// Offset in 8-byte units.
    pub offset: u16,
    pub more: bool,
    pub ident: u32,
}

impl FragmentHeader {
    /// Offset in bytes.
    pub fn offset_bytes(&self) -> u32 {
        u32::from(self.offset) * 8
    }

    pub fn is_first(&self) -> bool {
        self.offset == 0
    }
}

/// One parsed IPv6 datagram, extension headers digested.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet6 {
    pub header: Ipv6Header,
    /// Extension header bytes consumed past the fixed 40-byte header.
    pub header_len: usize,
    /// Protocol after all extension headers.
    pub data_proto: u8,
    pub frag: Option<FragmentHeader>,
    /// L4 payload within the input buffer.
    pub payload: Range<usize>,
    /// Present when the payload is ICMPv6 and this is not a fragment tail.
    pub icmp: Option<IcmpHdr>,
    /// Byte offset of a non-zero segments-left field in a Routing header.
    /// The packet must not be forwarded; the host stack answers with a
    /// Parameter Problem pointing here.
    pub routing_segments_left: Option<u32>,
    /// The buffer held fewer bytes than the header declared.
    pub truncated: bool,
}

impl Packet6 {
    pub fn src(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.header.source)
    }

    pub fn dst(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.header.destination)
    }

    pub fn traffic_class(&self) -> u8 {
        self.header.traffic_class
    }

    pub fn data_len(&self) -> usize {
        self.payload.len()
    }

    pub fn icmp_checksum_valid(&self, buf: &[u8]) -> bool {
        let pseudo = checksum::ip6_pseudo_checksum(
            &self.src(),
            &self.dst(),
            self.data_len() as u32,
            IpNumber::IPV6_ICMP.0,
        );

        checksum::ones_add(checksum::checksum(&buf[self.payload.clone()]), pseudo) == 0
    }
}

/// Validates one IPv6 datagram, walks the extension header chain and
/// locates the L4 payload.
pub fn parse6(buf: &[u8]) -> Result<Packet6, ParseError> {
    if buf.len() < Ipv6Header::LEN {
        return Err(ParseError::Truncated);
    }

    if buf[0] >> 4 != 6 {
        return Err(ParseError::BadVersion);
    }

    let (header, _) = Ipv6Header::from_slice(buf).map_err(|_| ParseError::Truncated)?;

    if !addrmap::validate_ip6(Ipv6Addr::from(header.source))
        || !addrmap::validate_ip6(Ipv6Addr::from(header.destination))
    {
        return Err(ParseError::BogonAddress);
    }

    let declared_end = Ipv6Header::LEN + usize::from(header.payload_length);
    let data_end = declared_end.min(buf.len());

    let mut off = Ipv6Header::LEN;
    let mut proto = header.next_header.0;
    let mut routing_segments_left = None;

    // Hop-by-Hop, Routing and Destination Options carry no meaning on the
    // IPv4 side; skip over them. A Routing header with hops still to make
    // must not be translated, but the parse finishes so the host stack can
    // point an ICMP error at the offending byte.
    while matches!(proto, HOP_BY_HOP | ROUTING | DEST_OPTS) {
        if data_end - off < 2 {
            return Err(ParseError::TruncatedExtensionHeader);
        }

        let ext_len = (usize::from(buf[off + 1]) + 1) * 8;
        if data_end - off < ext_len {
            return Err(ParseError::TruncatedExtensionHeader);
        }

        if proto == ROUTING && routing_segments_left.is_none() && buf[off + 3] != 0 {
            routing_segments_left = Some(off as u32 + 3);
        }

        proto = buf[off];
        off += ext_len;
    }

    let mut frag = None;

    if proto == FRAGMENT {
        if data_end - off < 8 {
            return Err(ParseError::TruncatedExtensionHeader);
        }

        let offset_flags = u16::from_be_bytes([buf[off + 2], buf[off + 3]]);
        let parsed = FragmentHeader {
            next_header: buf[off],
            offset: offset_flags >> 3,
            more: offset_flags & 0x0001 != 0,
            ident: u32::from_be_bytes([buf[off + 4], buf[off + 5], buf[off + 6], buf[off + 7]]),
        };

        if parsed.next_header == FRAGMENT {
            return Err(ParseError::DuplicateFragmentHeader);
        }

        proto = parsed.next_header;
        off += 8;
        frag = Some(parsed);
    }

    let payload = off..data_end;
    let data_len = payload.len();

    if let Some(frag) = &frag {
        if frag.more && data_len % 8 != 0 {
            return Err(ParseError::UnalignedFragment);
        }

        if frag.offset_bytes() as usize + data_len > 65535 {
            return Err(ParseError::FragmentOverflow);
        }
    }

    let first_fragment = frag.map(|f| f.is_first()).unwrap_or(true);
    let mut icmp = None;

    if proto == IpNumber::IPV6_ICMP.0 {
        if frag.map(|f| f.offset != 0 || f.more).unwrap_or(false) {
            return Err(ParseError::FragmentedIcmp);
        }

        icmp = Some(IcmpHdr::from_bytes(&buf[payload.clone()]).ok_or(ParseError::TruncatedL4Header)?);
    } else if first_fragment {
        let min = match proto {
            p if p == IpNumber::UDP.0 => 8,
            p if p == IpNumber::TCP.0 => 20,
            _ => 0,
        };

        if data_len < min {
            return Err(ParseError::TruncatedL4Header);
        }
    }

    Ok(Packet6 {
        truncated: declared_end > buf.len(),
        header_len: off - Ipv6Header::LEN,
        header,
        data_proto: proto,
        frag,
        payload,
        icmp,
        routing_segments_left,
    })
}
