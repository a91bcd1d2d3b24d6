//! The translator's own protocol presence: echo responses and locally
//! sourced ICMP errors.

use ip_packet::{IPV6_MIN_MTU, IcmpHdr, Packet4, Packet6, checksum};
use smallvec::smallvec;

use crate::headers;
use crate::{AddressFamily, Config, Frame, Frames};

/// Longest IPv4 datagram we send on our own behalf.
const MAX_ICMP4_LEN: usize = 576;

const ICMP_ECHO_REQUEST4: u8 = 8;
const ICMP_ECHO_REQUEST6: u8 = 128;

/// A packet addressed to `local_addr4`. Echo requests are answered,
/// other ICMP is ignored, anything else is unreachable.
pub(crate) fn handle4<'p>(config: &Config, buf: &'p [u8], pkt: &Packet4) -> Frames<'p> {
    match pkt.icmp {
        Some(icmp) if icmp.icmp_type == ICMP_ECHO_REQUEST4 => echo_reply4(buf, pkt, icmp),
        Some(_) => smallvec![],
        // Protocol Unreachable: we terminate nothing but ping.
        None => icmp4_error(config, buf, pkt, IcmpHdr {
            icmp_type: 3,
            code: 2,
            checksum: 0,
            word: 0,
        }),
    }
}

/// A packet addressed to `local_addr6`.
pub(crate) fn handle6<'p>(config: &Config, buf: &'p [u8], pkt: &Packet6) -> Frames<'p> {
    match pkt.icmp {
        Some(icmp) if icmp.icmp_type == ICMP_ECHO_REQUEST6 => echo_reply6(buf, pkt, icmp),
        Some(_) => smallvec![],
        // Parameter Problem, unrecognized next header, pointing at the
        // next-header byte.
        None => icmp6_error(config, buf, pkt, IcmpHdr {
            icmp_type: 4,
            code: 1,
            checksum: 0,
            word: 6,
        }),
    }
}

fn echo_reply4<'p>(buf: &'p [u8], pkt: &Packet4, request: IcmpHdr) -> Frames<'p> {
    let data = &buf[pkt.payload.start + IcmpHdr::LEN..pkt.payload.end];

    let mut reply = IcmpHdr {
        icmp_type: 0,
        code: request.code,
        checksum: 0,
        word: request.word,
    };
    reply.checksum = checksum::ones_add(
        checksum::checksum(data),
        checksum::checksum(&reply.to_bytes()),
    );

    let ip = headers::ipv4_header(headers::Ipv4Fields {
        tos: pkt.tos(),
        total_len: (20 + IcmpHdr::LEN + data.len()) as u16,
        identification: 0,
        dont_fragment: false,
        more_fragments: false,
        fragment_offset: 0,
        time_to_live: 64,
        protocol: 1,
        source: pkt.dst(),
        destination: pkt.src(),
    });

    let mut header = headers::ipv4_bytes(ip);
    header.extend_from_slice(&reply.to_bytes());

    smallvec![Frame {
        af: AddressFamily::V4,
        header,
        payload: data,
    }]
}

fn echo_reply6<'p>(buf: &'p [u8], pkt: &Packet6, request: IcmpHdr) -> Frames<'p> {
    let data = &buf[pkt.payload.start + IcmpHdr::LEN..pkt.payload.end];

    let mut reply = IcmpHdr {
        icmp_type: 129,
        code: request.code,
        checksum: 0,
        word: request.word,
    };
    let pseudo = checksum::ip6_pseudo_checksum(
        &pkt.dst(),
        &pkt.src(),
        (IcmpHdr::LEN + data.len()) as u32,
        58,
    );
    reply.checksum = checksum::ones_add(
        checksum::ones_add(
            checksum::checksum(data),
            checksum::checksum(&reply.to_bytes()),
        ),
        pseudo,
    );

    let ip = headers::ipv6_header(
        pkt.traffic_class(),
        (IcmpHdr::LEN + data.len()) as u16,
        58,
        64,
        pkt.dst(),
        pkt.src(),
    );

    let mut header = ip.to_bytes().to_vec();
    header.extend_from_slice(&reply.to_bytes());

    smallvec![Frame {
        af: AddressFamily::V6,
        header,
        payload: data,
    }]
}

/// Emits an ICMPv4 error about `orig`, sourced from the translator and
/// quoting as much of the original as fits in 576 bytes. Never answers an
/// ICMP message other than an echo request.
pub(crate) fn icmp4_error<'p>(
    config: &Config,
    buf: &'p [u8],
    orig: &Packet4,
    mut error: IcmpHdr,
) -> Frames<'p> {
    if let Some(icmp) = orig.icmp
        && icmp.icmp_type != ICMP_ECHO_REQUEST4
    {
        return smallvec![];
    }

    let quote_len = (orig.header_len + orig.data_len()).min(MAX_ICMP4_LEN - 20 - IcmpHdr::LEN);
    let quote = &buf[..quote_len];

    error.checksum = 0;
    error.checksum = checksum::ones_add(
        checksum::checksum(quote),
        checksum::checksum(&error.to_bytes()),
    );

    let ip = headers::ipv4_header(headers::Ipv4Fields {
        tos: 0,
        total_len: (20 + IcmpHdr::LEN + quote_len) as u16,
        identification: 0,
        dont_fragment: false,
        more_fragments: false,
        fragment_offset: 0,
        time_to_live: 64,
        protocol: 1,
        source: config.local_addr4,
        destination: orig.src(),
    });

    let mut header = headers::ipv4_bytes(ip);
    header.extend_from_slice(&error.to_bytes());

    smallvec![Frame {
        af: AddressFamily::V4,
        header,
        payload: quote,
    }]
}

/// Emits an ICMPv6 error about `orig`, capped at the IPv6 minimum MTU.
pub(crate) fn icmp6_error<'p>(
    config: &Config,
    buf: &'p [u8],
    orig: &Packet6,
    mut error: IcmpHdr,
) -> Frames<'p> {
    if orig.data_proto == 58
        && orig
            .icmp
            .map(|icmp| icmp.icmp_type != ICMP_ECHO_REQUEST6)
            .unwrap_or(true)
    {
        return smallvec![];
    }

    let quote_len = (40 + orig.header_len + orig.data_len())
        .min(usize::from(IPV6_MIN_MTU) - 40 - IcmpHdr::LEN);
    let quote = &buf[..quote_len];

    let pseudo = checksum::ip6_pseudo_checksum(
        &config.local_addr6,
        &orig.src(),
        (IcmpHdr::LEN + quote_len) as u32,
        58,
    );

    error.checksum = 0;
    error.checksum = checksum::ones_add(
        checksum::ones_add(
            checksum::checksum(quote),
            checksum::checksum(&error.to_bytes()),
        ),
        pseudo,
    );

    let ip = headers::ipv6_header(
        0,
        (IcmpHdr::LEN + quote_len) as u16,
        58,
        64,
        config.local_addr6,
        orig.src(),
    );

    let mut header = ip.to_bytes().to_vec();
    header.extend_from_slice(&error.to_bytes());

    smallvec![Frame {
        af: AddressFamily::V6,
        header,
        payload: quote,
    }]
}
