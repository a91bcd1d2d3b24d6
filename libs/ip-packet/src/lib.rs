//! Per-packet parsing and checksum arithmetic.
//!
//! A [`Packet4`] or [`Packet6`] is a transient record over one datagram read
//! from the TUN device: the fixed header, the fragment header if any, where
//! the L4 payload sits in the buffer, and the protocol that follows all
//! extension headers. It is created per read and never outlives the buffer.
//!
//! [`checksum`] holds the ones-complement primitives the translator uses to
//! fix L4 checksums incrementally instead of recomputing them from scratch.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod checksum;

mod parse4;
mod parse6;

pub use parse4::{Packet4, parse4};
pub use parse6::{FragmentHeader, Packet6, parse6};

/// The minimum MTU IPv6 guarantees end to end.
pub const IPV6_MIN_MTU: u16 = 1280;

/// Which IP family a datagram belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    V4,
    V6,
}

/// Why a datagram could not be parsed. All of these are silent drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("buffer too short for the fixed header")]
    Truncated,
    #[error("wrong IP version field")]
    BadVersion,
    #[error("IPv4 header length below 20 bytes")]
    BadHeaderLength,
    #[error("declared length shorter than the header")]
    BadTotalLength,
    #[error("source or destination address is not translatable")]
    BogonAddress,
    #[error("fragmented ICMP is unsupported")]
    FragmentedIcmp,
    #[error("L4 header truncated")]
    TruncatedL4Header,
    #[error("non-final fragment length is not a multiple of 8")]
    UnalignedFragment,
    #[error("fragment would exceed 65535 bytes after reassembly")]
    FragmentOverflow,
    #[error("extension header truncated")]
    TruncatedExtensionHeader,
    #[error("more than one fragment header")]
    DuplicateFragmentHeader,
}

/// The first eight bytes every ICMP message shares: type, code, checksum
/// and the type-specific word (identifier/sequence, MTU, pointer, unused).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpHdr {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
    pub word: u32,
}

impl IcmpHdr {
    pub const LEN: usize = 8;

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        let chunk: &[u8; 8] = buf.first_chunk()?;

        Some(Self {
            icmp_type: chunk[0],
            code: chunk[1],
            checksum: u16::from_be_bytes([chunk[2], chunk[3]]),
            word: u32::from_be_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]),
        })
    }

    pub fn to_bytes(self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[0] = self.icmp_type;
        out[1] = self.code;
        out[2..4].copy_from_slice(&self.checksum.to_be_bytes());
        out[4..8].copy_from_slice(&self.word.to_be_bytes());

        out
    }
}
