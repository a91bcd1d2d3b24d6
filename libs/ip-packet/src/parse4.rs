use std::net::Ipv4Addr;
use std::ops::Range;

use etherparse::{IpNumber, Ipv4Header};

use crate::{IcmpHdr, ParseError, checksum};

/// One parsed IPv4 datagram. Field copies of the header plus the location
/// of the L4 payload in the original buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet4 {
    pub header: Ipv4Header,
    /// IHL in bytes, including options.
    pub header_len: usize,
    /// L4 payload within the input buffer.
    pub payload: Range<usize>,
    /// Present when the payload is ICMP.
    pub icmp: Option<IcmpHdr>,
    /// The buffer held fewer bytes than the header declared. Tolerated for
    /// the truncated originals embedded in ICMP errors, fatal otherwise.
    pub truncated: bool,
}

impl Packet4 {
    pub fn src(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.header.source)
    }

    pub fn dst(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.header.destination)
    }

    pub fn tos(&self) -> u8 {
        self.header.dscp.value() << 2 | self.header.ecn.value()
    }

    pub fn proto(&self) -> IpNumber {
        self.header.protocol
    }

    pub fn data_len(&self) -> usize {
        self.payload.len()
    }

    /// Fragment offset in bytes.
    pub fn frag_offset(&self) -> u32 {
        u32::from(self.header.fragment_offset.value()) * 8
    }

    pub fn is_fragment(&self) -> bool {
        self.header.fragment_offset.value() != 0 || self.header.more_fragments
    }

    pub fn header_checksum_valid(&self, buf: &[u8]) -> bool {
        checksum::checksum(&buf[..self.header_len]) == 0
    }
}

/// Validates one IPv4 datagram and locates its L4 payload.
///
/// Anything that fails here falls on the ground without a response.
pub fn parse4(buf: &[u8]) -> Result<Packet4, ParseError> {
    if buf.len() < Ipv4Header::MIN_LEN {
        return Err(ParseError::Truncated);
    }

    if buf[0] >> 4 != 4 {
        return Err(ParseError::BadVersion);
    }

    let header_len = usize::from(buf[0] & 0x0f) * 4;
    if header_len < Ipv4Header::MIN_LEN {
        return Err(ParseError::BadHeaderLength);
    }
    if buf.len() < header_len {
        return Err(ParseError::Truncated);
    }

    let total_len = usize::from(u16::from_be_bytes([buf[2], buf[3]]));
    if total_len < header_len {
        return Err(ParseError::BadTotalLength);
    }

    let (header, _) =
        Ipv4Header::from_slice(&buf[..header_len]).map_err(|_| ParseError::BadHeaderLength)?;

    if !addrmap::validate_ip4(Ipv4Addr::from(header.source))
        || !addrmap::validate_ip4(Ipv4Addr::from(header.destination))
    {
        return Err(ParseError::BogonAddress);
    }

    // A buffer longer than the declared length carries link padding; a
    // shorter one is a truncated original inside an ICMP error.
    let data_end = total_len.min(buf.len());
    let payload = header_len..data_end;
    let data_len = payload.len();

    let offset = header.fragment_offset.value();
    let more_fragments = header.more_fragments;

    let mut icmp = None;

    if header.protocol == IpNumber::ICMP {
        if offset != 0 || more_fragments {
            return Err(ParseError::FragmentedIcmp);
        }

        icmp = Some(IcmpHdr::from_bytes(&buf[payload.clone()]).ok_or(ParseError::TruncatedL4Header)?);
    } else {
        if more_fragments && data_len % 8 != 0 {
            return Err(ParseError::UnalignedFragment);
        }

        if usize::from(offset) * 8 + data_len > 65535 {
            return Err(ParseError::FragmentOverflow);
        }

        if offset == 0 {
            let min = match header.protocol {
                IpNumber::UDP => 8,
                IpNumber::TCP => 20,
                _ => 0,
            };

            if data_len < min {
                return Err(ParseError::TruncatedL4Header);
            }
        }
    }

    Ok(Packet4 {
        truncated: total_len > buf.len(),
        header,
        header_len,
        payload,
        icmp,
    })
}
