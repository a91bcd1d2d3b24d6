//! RFC 6052 address embedding.
//!
//! An IPv4 address is placed into an IPv6 translation prefix of length 32,
//! 40, 48, 56, 64 or 96 bits, skipping octet 8 which is reserved and must
//! be zero on the wire.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::MapError;

/// `64:ff9b::/96`, reserved by RFC 6052 for NAT64 on the public Internet.
pub const WELL_KNOWN_PREFIX: Ipv6Addr = Ipv6Addr::new(0x64, 0xff9b, 0, 0, 0, 0, 0, 0);

pub fn is_well_known_prefix(prefix: Ipv6Addr, prefix_len: u8) -> bool {
    prefix_len == 96 && prefix == WELL_KNOWN_PREFIX
}

/// Appends `addr4` to `prefix` at bit position `prefix_len`.
///
/// Fails with [`MapError::Drop`] for prefix lengths RFC 6052 does not
/// define.
pub fn embed(prefix: Ipv6Addr, prefix_len: u8, addr4: Ipv4Addr) -> Result<Ipv6Addr, MapError> {
    let mut out = prefix.octets();
    let v4 = addr4.octets();

    match prefix_len {
        32 => out[4..8].copy_from_slice(&v4),
        40 => {
            out[5..8].copy_from_slice(&v4[..3]);
            out[9] = v4[3];
        }
        48 => {
            out[6..8].copy_from_slice(&v4[..2]);
            out[9..11].copy_from_slice(&v4[2..]);
        }
        56 => {
            out[7] = v4[0];
            out[9..12].copy_from_slice(&v4[1..]);
        }
        64 => out[9..13].copy_from_slice(&v4),
        96 => out[12..16].copy_from_slice(&v4),
        _ => return Err(MapError::Drop),
    }

    Ok(Ipv6Addr::from(out))
}

/// Recovers the IPv4 address embedded at bit position `prefix_len`.
///
/// The reserved octet 8 and every suffix bit beyond the embedded address
/// must be zero, and the recovered address must be one we are willing to
/// translate; anything else is a [`MapError::Drop`].
pub fn extract(prefix_len: u8, addr6: Ipv6Addr) -> Result<Ipv4Addr, MapError> {
    let o = addr6.octets();

    let (v4, suffix_zero): ([u8; 4], bool) = match prefix_len {
        32 => ([o[4], o[5], o[6], o[7]], o[8..].iter().all(|b| *b == 0)),
        40 => (
            [o[5], o[6], o[7], o[9]],
            o[8] == 0 && o[10..].iter().all(|b| *b == 0),
        ),
        48 => (
            [o[6], o[7], o[9], o[10]],
            o[8] == 0 && o[11..].iter().all(|b| *b == 0),
        ),
        56 => (
            [o[7], o[9], o[10], o[11]],
            o[8] == 0 && o[12..].iter().all(|b| *b == 0),
        ),
        64 => (
            [o[9], o[10], o[11], o[12]],
            o[8] == 0 && o[13..].iter().all(|b| *b == 0),
        ),
        96 => ([o[12], o[13], o[14], o[15]], true),
        _ => return Err(MapError::Drop),
    };

    if !suffix_zero {
        return Err(MapError::Drop);
    }

    let addr4 = Ipv4Addr::from(v4);

    if !crate::validate_ip4(addr4) {
        return Err(MapError::Drop);
    }

    Ok(addr4)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LENGTHS: [u8; 6] = [32, 40, 48, 56, 64, 96];

    #[test]
    fn wkp_96_example() {
        // The canonical example from RFC 6052: 192.0.2.33 under 64:ff9b::/96.
        let addr6 = embed(WELL_KNOWN_PREFIX, 96, "192.0.2.33".parse().unwrap()).unwrap();

        assert_eq!(addr6, "64:ff9b::c000:221".parse::<Ipv6Addr>().unwrap());
    }

    #[test]
    fn rfc6052_vectors() {
        // Figure 1 of RFC 6052, prefix 2001:db8::/L, address 192.0.2.33.
        let prefix: Ipv6Addr = "2001:db8::".parse().unwrap();
        let v4: Ipv4Addr = "192.0.2.33".parse().unwrap();

        let expect: [(u8, &str); 6] = [
            (32, "2001:db8:c000:221::"),
            (40, "2001:db8:1c0:2:21::"),
            (48, "2001:db8:122:c000:2:2100::"),
            (56, "2001:db8:122:3c0:0:221::"),
            (64, "2001:db8:122:344:c0:2:2100::"),
            (96, "2001:db8:122:344::192.0.2.33"),
        ];

        for (len, want) in expect {
            let base = mask_prefix("2001:db8:122:344::", len);
            let want: Ipv6Addr = want.parse().unwrap();

            assert_eq!(embed(base, len, v4).unwrap(), want, "length {len}");
            assert_eq!(extract(len, want).unwrap(), v4, "length {len}");
        }
    }

    fn mask_prefix(addr: &str, len: u8) -> Ipv6Addr {
        let bits = u128::from(addr.parse::<Ipv6Addr>().unwrap());
        let mask = u128::MAX << (128 - u32::from(len));

        Ipv6Addr::from(bits & mask)
    }

    #[test]
    fn undefined_length_fails() {
        let v4: Ipv4Addr = "192.0.2.1".parse().unwrap();

        for len in [0, 24, 33, 72, 95, 128] {
            assert_eq!(embed(WELL_KNOWN_PREFIX, len, v4), Err(MapError::Drop));
            assert_eq!(extract(len, WELL_KNOWN_PREFIX), Err(MapError::Drop));
        }
    }

    #[test]
    fn nonzero_reserved_octet_fails() {
        for len in [40, 48, 56, 64] {
            let mut o = embed("2001:db8::".parse().unwrap(), len, "192.0.2.33".parse().unwrap())
                .unwrap()
                .octets();
            o[8] = 0xaa;

            assert_eq!(extract(len, Ipv6Addr::from(o)), Err(MapError::Drop));
        }
    }

    #[test]
    fn nonzero_suffix_fails() {
        let addr6: Ipv6Addr = "64:ff9b::c000:221".parse().unwrap();

        // Valid at /96 but the same bytes carry trailing garbage at /32.
        assert!(extract(96, addr6).is_ok());
        assert_eq!(extract(32, addr6), Err(MapError::Drop));
    }

    #[test]
    fn extracted_address_is_validated() {
        let looped = embed(WELL_KNOWN_PREFIX, 96, Ipv4Addr::new(127, 0, 0, 1)).unwrap();

        assert_eq!(extract(96, looped), Err(MapError::Drop));
    }

    proptest::proptest! {
        #[test]
        fn round_trip(v4: u32, len_idx in 0usize..6) {
            let len = LENGTHS[len_idx];
            let v4 = Ipv4Addr::from(v4);
            proptest::prop_assume!(crate::validate_ip4(v4));

            let encoded = embed("2001:db8::".parse().unwrap(), len, v4).unwrap();

            proptest::prop_assert_eq!(encoded.octets()[8], 0);
            proptest::prop_assert_eq!(extract(len, encoded).unwrap(), v4);
        }
    }
}
