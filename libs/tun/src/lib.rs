//! The TUN device: packet-information framing, device setup and vectored
//! I/O.
//!
//! Every datagram crossing the device carries a 4-byte packet-information
//! header naming its address family; both families share one interface.
//! Emission always uses a single `writev` per datagram so a packet either
//! leaves whole or not at all.

#![cfg_attr(test, allow(clippy::unwrap_used))]

#[cfg(target_family = "unix")]
mod ioctl;
#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "linux")]
pub use linux::{Tun, interface_mtu};

pub use ip_packet::AddressFamily;

/// Length of the packet-information header.
pub const PI_LEN: usize = 4;

#[cfg(target_os = "linux")]
const ETH_P_IP: u16 = 0x0800;
#[cfg(target_os = "linux")]
const ETH_P_IPV6: u16 = 0x86dd;

/// Encodes the packet-information header for `af`.
///
/// Linux: `{flags: u16, proto: u16be}` with EtherType values. BSD
/// multi-AF mode: a single big-endian `u32` carrying the address family.
pub fn encode_pi(af: AddressFamily) -> [u8; PI_LEN] {
    #[cfg(target_os = "linux")]
    {
        let proto = match af {
            AddressFamily::V4 => ETH_P_IP,
            AddressFamily::V6 => ETH_P_IPV6,
        };

        let mut pi = [0u8; PI_LEN];
        pi[2..4].copy_from_slice(&proto.to_be_bytes());

        pi
    }

    #[cfg(not(target_os = "linux"))]
    {
        let family = match af {
            AddressFamily::V4 => libc::AF_INET as u32,
            AddressFamily::V6 => libc::AF_INET6 as u32,
        };

        family.to_be_bytes()
    }
}

/// Decodes the packet-information header, `None` for any protocol we do
/// not carry.
pub fn decode_pi(pi: &[u8; PI_LEN]) -> Option<AddressFamily> {
    #[cfg(target_os = "linux")]
    {
        match u16::from_be_bytes([pi[2], pi[3]]) {
            ETH_P_IP => Some(AddressFamily::V4),
            ETH_P_IPV6 => Some(AddressFamily::V6),
            _ => None,
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        match u32::from_be_bytes(*pi) {
            family if family == libc::AF_INET as u32 => Some(AddressFamily::V4),
            family if family == libc::AF_INET6 as u32 => Some(AddressFamily::V6),
            _ => None,
        }
    }
}
