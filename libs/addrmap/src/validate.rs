use std::net::{Ipv4Addr, Ipv6Addr};

/// Returns `false` for IPv4 addresses that must never appear on either side
/// of a translation: `0.0.0.0/8`, loopback, link-local, multicast and the
/// all-ones broadcast. Class E is accepted.
pub fn validate_ip4(addr: Ipv4Addr) -> bool {
    let octets = addr.octets();

    if octets[0] == 0 || octets[0] == 127 {
        return false;
    }

    // Link-local block 169.254.0.0/16.
    if octets[0] == 169 && octets[1] == 254 {
        return false;
    }

    // Class D (multicast).
    if octets[0] & 0xf0 == 0xe0 {
        return false;
    }

    if addr == Ipv4Addr::BROADCAST {
        return false;
    }

    true
}

/// Returns `false` for IPv6 addresses that must never appear on either side
/// of a translation: multicast, link-local unicast and the reserved
/// `0000::/8` region. Addresses under the Well-Known Prefix are accepted
/// even though their high byte is zero.
pub fn validate_ip6(addr: Ipv6Addr) -> bool {
    let octets = addr.octets();

    if octets[..4] == super::WELL_KNOWN_PREFIX.octets()[..4] {
        return true;
    }

    // Reserved per RFC 2373.
    if octets[0] == 0 {
        return false;
    }

    // Multicast.
    if octets[0] == 0xff {
        return false;
    }

    // Link-local unicast fe80::/10.
    if octets[0] == 0xfe && octets[1] & 0xc0 == 0x80 {
        return false;
    }

    true
}

/// IPv4 space that IANA forbids behind the Well-Known Prefix: the RFC 1918
/// blocks, shared address space, benchmarking and the documentation nets.
pub fn is_private_ip4(addr: Ipv4Addr) -> bool {
    let [a, b, c, _] = addr.octets();

    match (a, b, c) {
        // 10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16 (RFC 1918)
        (10, ..) => true,
        (172, 16..=31, _) => true,
        (192, 168, _) => true,
        // 100.64.0.0/10 (RFC 6598)
        (100, 64..=127, _) => true,
        // 192.0.2.0/24, 198.51.100.0/24, 203.0.113.0/24 (RFC 5737)
        (192, 0, 2) => true,
        (198, 51, 100) => true,
        (203, 0, 113) => true,
        // 198.18.0.0/15 (RFC 2544)
        (198, 18..=19, _) => true,
        _ => false,
    }
}
