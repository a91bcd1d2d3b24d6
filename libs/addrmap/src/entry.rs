use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::atomic::{AtomicU8, AtomicU16, Ordering};

/// What kind of translation policy a [`MapEntry`] expresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapKind {
    /// Explicit address mapping (RFC 7757): a 1:1 relation between a v4
    /// prefix and a v6 prefix, host bits copied across.
    Static,
    /// An RFC 6052 translation prefix; the v4 side is embedded in the
    /// address itself.
    Rfc6052,
    /// A v6 prefix backed by a pool of v4 addresses.
    Dynamic,
}

const SEEN_4TO6: u8 = 1 << 0;
const SEEN_6TO4: u8 = 1 << 1;
const GEN_IDENT: u8 = 1 << 2;

/// One configured mapping.
///
/// The address fields and kind are fixed at configuration load. The flag
/// bits and the IPv4 identifier counter are observational state written by
/// the data path, so they are atomic: any number of workers may translate
/// packets against the same entry concurrently.
#[derive(Debug)]
pub struct MapEntry {
    pub addr4: Ipv4Addr,
    pub prefix_len4: u8,
    pub addr6: Ipv6Addr,
    pub prefix_len6: u8,
    pub kind: MapKind,
    /// Configuration line this entry came from, for diagnostics.
    pub line: u32,

    flags: AtomicU8,
    ident: AtomicU16,
}

impl MapEntry {
    pub fn new(
        addr4: Ipv4Addr,
        prefix_len4: u8,
        addr6: Ipv6Addr,
        prefix_len6: u8,
        kind: MapKind,
        line: u32,
    ) -> Self {
        Self {
            addr4,
            prefix_len4,
            addr6,
            prefix_len6,
            kind,
            line,
            flags: AtomicU8::new(0),
            ident: AtomicU16::new(1),
        }
    }

    pub fn mark_seen_4to6(&self) {
        self.flags.fetch_or(SEEN_4TO6, Ordering::Relaxed);
    }

    pub fn mark_seen_6to4(&self) {
        self.flags.fetch_or(SEEN_6TO4, Ordering::Relaxed);
    }

    pub fn seen_4to6(&self) -> bool {
        self.flags.load(Ordering::Relaxed) & SEEN_4TO6 != 0
    }

    pub fn seen_6to4(&self) -> bool {
        self.flags.load(Ordering::Relaxed) & SEEN_6TO4 != 0
    }

    /// Requests IPv4 identifier generation for packets translated towards
    /// this entry. Set when a Packet Too Big below the IPv6 minimum MTU
    /// proves the v4 path needs fragmentation identifiers.
    pub fn set_gen_ident(&self) {
        self.flags.fetch_or(GEN_IDENT, Ordering::Relaxed);
    }

    pub fn gen_ident(&self) -> bool {
        self.flags.load(Ordering::Relaxed) & GEN_IDENT != 0
    }

    /// Next IPv4 identifier for this destination. Wraps around skipping
    /// zero; uniqueness matters only within a reassembly window, so a
    /// relaxed fetch-add is enough.
    pub fn next_ident(&self) -> u16 {
        let id = self.ident.fetch_add(1, Ordering::Relaxed);
        if id != 0 {
            return id;
        }

        self.ident.fetch_add(1, Ordering::Relaxed)
    }
}
