//! Internet checksum arithmetic (RFC 1071).
//!
//! All functions work on network-order data: 16-bit words are read
//! big-endian and results are meant to be stored big-endian. Incremental
//! adjustments are specified to produce bit-identical results to a full
//! recomputation; the property tests at the bottom pin that down.

use std::net::{Ipv4Addr, Ipv6Addr};

/// Ones-complement checksum of `buf` (the inverted, folded sum). An odd
/// trailing byte counts as the high byte of a final word.
pub fn checksum(buf: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    let mut chunks = buf.chunks_exact(2);
    for word in &mut chunks {
        sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
    }

    if let [tail] = chunks.remainder() {
        sum += u32::from(u16::from_be_bytes([*tail, 0]));
    }

    !fold(sum)
}

/// Adds two checksum-domain values with end-around carry.
///
/// Because both operands are inverted sums, the combination inverts back:
/// `ones_add(checksum(a), checksum(b))` equals the checksum of `a ‖ b` for
/// even-length `a`.
pub fn ones_add(a: u16, b: u16) -> u16 {
    let sum = u32::from(!a) + u32::from(!b);

    !fold(sum)
}

/// Checksum of the IPv6 pseudo-header (RFC 2460 §8.1) for `payload_len`
/// bytes of `proto`.
pub fn ip6_pseudo_checksum(src: &Ipv6Addr, dst: &Ipv6Addr, payload_len: u32, proto: u8) -> u16 {
    let mut sum: u32 = 0;

    for word in src.octets().chunks_exact(2) {
        sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
    }
    for word in dst.octets().chunks_exact(2) {
        sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
    }

    sum += payload_len >> 16;
    sum += payload_len & 0xffff;
    sum += u32::from(proto);

    !fold(sum)
}

/// Checksum of the IPv4 pseudo-header for `payload_len` bytes of `proto`.
pub fn ip4_pseudo_checksum(src: Ipv4Addr, dst: Ipv4Addr, payload_len: u32, proto: u8) -> u16 {
    let mut sum: u32 = 0;

    for word in src.octets().chunks_exact(2) {
        sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
    }
    for word in dst.octets().chunks_exact(2) {
        sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
    }

    sum += payload_len >> 16;
    sum += payload_len & 0xffff;
    sum += u32::from(proto);

    !fold(sum)
}

/// Sum-domain difference between the IPv4 and IPv6 pseudo-headers for the
/// same payload: the v4 addresses leave the sum, the v6 addresses enter it.
///
/// To move an L4 checksum from v4 to v6, `ones_add(cksum, !delta)`; to move
/// it back from v6 to v4, `ones_add(cksum, delta)`. Payload length and
/// protocol contribute equally on both sides and cancel out.
pub fn pseudo_delta(
    v4_src: Ipv4Addr,
    v4_dst: Ipv4Addr,
    v6_src: &Ipv6Addr,
    v6_dst: &Ipv6Addr,
) -> u16 {
    let mut sum: u32 = 0;

    for word in v4_src.octets().chunks_exact(2) {
        sum += u32::from(!u16::from_be_bytes([word[0], word[1]]));
    }
    for word in v4_dst.octets().chunks_exact(2) {
        sum += u32::from(!u16::from_be_bytes([word[0], word[1]]));
    }
    for word in v6_src.octets().chunks_exact(2) {
        sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
    }
    for word in v6_dst.octets().chunks_exact(2) {
        sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
    }

    fold(sum)
}

/// Sum-domain adjustment for replacing one IPv6 address pair with another
/// (hairpinned packets keep their payload but change both addresses).
/// Apply with `ones_add(cksum, !delta)`.
pub fn addr6_delta(old: (&Ipv6Addr, &Ipv6Addr), new: (&Ipv6Addr, &Ipv6Addr)) -> u16 {
    let mut sum: u32 = 0;

    for addr in [old.0, old.1] {
        for word in addr.octets().chunks_exact(2) {
            sum += u32::from(!u16::from_be_bytes([word[0], word[1]]));
        }
    }
    for addr in [new.0, new.1] {
        for word in addr.octets().chunks_exact(2) {
            sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
        }
    }

    fold(sum)
}

fn fold(mut sum: u32) -> u16 {
    while sum > 0xffff {
        sum = (sum & 0xffff) + (sum >> 16);
    }

    sum as u16
}
