//! ICMPv4 <-> ICMPv6 type and code translation (RFC 7915 §4.2 / §5.2).
//!
//! The outer header of an ICMP error is rewritten through the tables here;
//! the embedded packet is translated separately by the caller.

use addrmap::MapEntry;
use ip_packet::{IPV6_MIN_MTU, IcmpHdr};

use crate::Config;

/// Checksum adjustment for rewriting the ICMP type byte, in the sum
/// domain: the type is the high byte of the first 16-bit word.
pub(crate) const ECHO_REQUEST_DELTA: u16 = (128 - 8) << 8;
pub(crate) const ECHO_REPLY_DELTA: u16 = (129 - 0) << 8;

/// RFC 1191 plateau table: the best guess for the MTU of a link that a
/// datagram of `too_big` bytes did not fit through, for routers too old to
/// report it.
pub(crate) fn est_mtu(too_big: u16) -> u16 {
    const PLATEAUS: [u16; 10] = [
        65535, 32000, 17914, 8166, 4352, 2002, 1492, 1006, 508, 296,
    ];

    PLATEAUS
        .into_iter()
        .find(|plateau| too_big > *plateau)
        .unwrap_or(68)
}

/// IPv4 header byte offsets -> IPv6 header byte offsets for Parameter
/// Problem pointers. `-1` has no equivalent and drops the message.
const PTR_4TO6: [i8; 20] = [
    0, 1, 4, 4, -1, -1, -1, -1, 7, 6, -1, -1, 8, 8, 8, 8, 24, 24, 24, 24,
];

fn translate_pointer_4to6(old: u32) -> Option<u32> {
    let new = *PTR_4TO6.get(old as usize)?;

    u32::try_from(new).ok()
}

/// The inverse direction. Offsets 8..=23 are the IPv6 source address
/// (maps to 12), 24..=39 the destination (maps to 16); everything past the
/// fixed header has no IPv4 equivalent.
const PTR_6TO4: [i8; 8] = [0, 1, -1, -1, 2, 2, 9, 8];

fn translate_pointer_6to4(old: u32) -> Option<u32> {
    match old {
        0..=7 => u32::try_from(PTR_6TO4[old as usize]).ok(),
        8..=23 => Some(12),
        24..=39 => Some(16),
        _ => None,
    }
}

/// Rewrites the header of an ICMPv4 error into its ICMPv6 form, or `None`
/// if the message has no translation and must be dropped.
///
/// `em_total_len` is the declared total length of the embedded datagram
/// (the Fragmentation Needed case estimates the broken link's MTU from
/// it). A Packet Too Big below the IPv6 minimum marks `em_dest` so future
/// 6->4 translations towards it generate identifiers.
pub(crate) fn error_4to6(
    hdr: &IcmpHdr,
    em_total_len: u16,
    em_dest: Option<&MapEntry>,
    config: &Config,
) -> Option<IcmpHdr> {
    let (icmp_type, code, word) = match (hdr.icmp_type, hdr.code) {
        // Destination Unreachable.
        (3, 0 | 1 | 5 | 6 | 7 | 8 | 11 | 12) => (1, 0, 0), // No route
        (3, 2) => (4, 1, 6),                               // Protocol Unreachable -> Parameter Problem
        (3, 3) => (1, 4, 0),                               // Port Unreachable
        (3, 4) => {
            // Fragmentation Needed -> Packet Too Big.
            let advertised = (hdr.word & 0xffff) as u16;
            let mut mtu = u32::from(advertised.max(est_mtu(em_total_len))) + 20;

            mtu = mtu.min(u32::from(config.mtu));

            if mtu < u32::from(IPV6_MIN_MTU)
                && config.allow_ident_gen
                && let Some(dest) = em_dest
            {
                dest.set_gen_ident();
                mtu = u32::from(IPV6_MIN_MTU);
            }

            (2, 0, mtu)
        }
        (3, 9 | 10 | 13 | 15) => (1, 1, 0), // Administratively prohibited
        (3, _) => return None,

        // Time Exceeded keeps its code.
        (11, code) => (3, code, 0),

        // Parameter Problem: translate the pointer.
        (12, 0 | 2) => {
            let new_ptr = translate_pointer_4to6(hdr.word >> 24)?;

            (4, 0, new_ptr)
        }

        _ => return None,
    };

    Some(IcmpHdr {
        icmp_type,
        code,
        checksum: 0,
        word,
    })
}

/// Rewrites the header of an ICMPv6 error into its ICMPv4 form, or `None`
/// if the message has no translation and must be dropped.
pub(crate) fn error_6to4(hdr: &IcmpHdr, config: &Config) -> Option<IcmpHdr> {
    let (icmp_type, code, word) = match (hdr.icmp_type, hdr.code) {
        // Destination Unreachable.
        (1, 0 | 2 | 3) => (3, 1, 0), // Host Unreachable
        (1, 1) => (3, 10, 0),        // Administratively prohibited
        (1, 4) => (3, 3, 0),         // Port Unreachable
        (1, _) => return None,

        // Packet Too Big -> Fragmentation Needed. A PTB without a usable
        // MTU cannot drive IPv4 path MTU discovery.
        (2, _) => {
            let mut mtu = hdr.word;
            if mtu < 68 {
                return None;
            }

            mtu = mtu.min(u32::from(config.mtu)) - 20;

            (3, 4, mtu)
        }

        // Time Exceeded keeps its code.
        (3, code) => (11, code, 0),

        // Parameter Problem.
        (4, 0) => {
            let new_ptr = translate_pointer_6to4(hdr.word)?;

            (12, 0, new_ptr << 24)
        }
        (4, 1) => (3, 2, 0), // Unknown Next Header -> Protocol Unreachable

        _ => return None,
    };

    Some(IcmpHdr {
        icmp_type,
        code,
        checksum: 0,
        word,
    })
}
