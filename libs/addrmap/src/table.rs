use std::net::{Ipv4Addr, Ipv6Addr};

use ip_network::{Ipv4Network, Ipv6Network};

use crate::{MapEntry, MapError, MapKind, rfc6052};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum InsertError {
    #[error("IPv4 prefix length {0} is out of range")]
    PrefixLen4(u8),
    #[error("IPv6 prefix length {0} is out of range")]
    PrefixLen6(u8),
    #[error("host bits of {0}/{1} are not zero")]
    HostBits4(Ipv4Addr, u8),
    #[error("host bits of {0}/{1} are not zero")]
    HostBits6(Ipv6Addr, u8),
    #[error("{0}/{1} is not a usable RFC 6052 prefix")]
    InvalidRfc6052Prefix(Ipv6Addr, u8),
    #[error("IPv4 /{0} and IPv6 /{1} do not cover the same number of hosts")]
    IncompatibleLengths(u8, u8),
    #[error("prefix already mapped by the entry from line {0}")]
    Duplicate(u32),
}

/// Longest-prefix-match table over the configured mappings.
///
/// Two bit-indexed binary tries, one per address family. Each node owns its
/// children; a node carries an entry index when a configured prefix ends
/// there. Lookup walks the key bits and keeps the deepest entry passed,
/// which is the longest matching prefix. Built once at configuration load
/// and read-only afterwards.
pub struct MapTable {
    entries: Vec<MapEntry>,
    root4: Node,
    root6: Node,
    wkpf_strict: bool,
}

#[derive(Default)]
struct Node {
    entry: Option<usize>,
    child: [Option<Box<Node>>; 2],
}

impl MapTable {
    pub fn new(wkpf_strict: bool) -> Self {
        Self {
            entries: Vec::new(),
            root4: Node::default(),
            root6: Node::default(),
            wkpf_strict,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &MapEntry> {
        self.entries.iter()
    }

    pub fn insert(&mut self, entry: MapEntry) -> Result<(), InsertError> {
        validate_entry(&entry)?;

        // Every entry occupies both tries. Static and dynamic entries name
        // their v4 prefix; an RFC 6052 prefix is the v4 default route
        // (0.0.0.0/0), so a second one collides here and only a single
        // default route can exist.
        let key4 = u128::from(u32::from(entry.addr4)) << 96;
        let key6 = u128::from(entry.addr6);

        if let Some(idx) = lookup_exact(&self.root6, key6, entry.prefix_len6) {
            return Err(InsertError::Duplicate(self.entries[idx].line));
        }

        if let Some(idx) = lookup_exact(&self.root4, key4, entry.prefix_len4) {
            return Err(InsertError::Duplicate(self.entries[idx].line));
        }

        let idx = self.entries.len();

        insert_into(&mut self.root6, key6, entry.prefix_len6, idx);
        insert_into(&mut self.root4, key4, entry.prefix_len4, idx);

        self.entries.push(entry);

        Ok(())
    }

    /// Longest-prefix match on the IPv4 side.
    pub fn lookup4(&self, addr: Ipv4Addr) -> Option<&MapEntry> {
        lookup(&self.root4, u128::from(u32::from(addr)) << 96, 32).map(|idx| &self.entries[idx])
    }

    /// Longest-prefix match on the IPv6 side.
    pub fn lookup6(&self, addr: Ipv6Addr) -> Option<&MapEntry> {
        lookup(&self.root6, u128::from(addr), 128).map(|idx| &self.entries[idx])
    }

    /// Resolves the IPv6 form of `addr4` under the configured mappings.
    pub fn map4_to_6(&self, addr4: Ipv4Addr) -> Result<(Ipv6Addr, &MapEntry), MapError> {
        let entry = self.lookup4(addr4).ok_or(MapError::Reject)?;

        let addr6 = match entry.kind {
            MapKind::Static => {
                let host = u32::from(addr4) & host_mask4(entry.prefix_len4);

                Ipv6Addr::from(u128::from(entry.addr6) | u128::from(host))
            }
            MapKind::Rfc6052 => {
                if self.wkpf_strict
                    && rfc6052::is_well_known_prefix(entry.addr6, entry.prefix_len6)
                    && crate::is_private_ip4(addr4)
                {
                    tracing::debug!(%addr4, "refusing to embed private address in the well-known prefix");
                    return Err(MapError::Reject);
                }

                rfc6052::embed(entry.addr6, entry.prefix_len6, addr4)?
            }
            // Pool slots are never handed out towards v6; the v4 host
            // has to be reached through an existing lease.
            MapKind::Dynamic => return Err(MapError::Reject),
        };

        Ok((addr6, entry))
    }

    /// Resolves the IPv4 form of `addr6` under the configured mappings.
    pub fn map6_to_4(&self, addr6: Ipv6Addr) -> Result<(Ipv4Addr, &MapEntry), MapError> {
        let entry = self.lookup6(addr6).ok_or(MapError::Reject)?;

        let addr4 = match entry.kind {
            MapKind::Static => {
                let host = (u128::from(addr6) & host_mask6(entry.prefix_len6)) as u32;

                Ipv4Addr::from(u32::from(entry.addr4) | host)
            }
            MapKind::Rfc6052 => {
                let addr4 = rfc6052::extract(entry.prefix_len6, addr6)?;

                if self.wkpf_strict
                    && rfc6052::is_well_known_prefix(entry.addr6, entry.prefix_len6)
                    && crate::is_private_ip4(addr4)
                {
                    tracing::debug!(%addr6, "refusing to extract private address from the well-known prefix");
                    return Err(MapError::Reject);
                }

                addr4
            }
            // Without lease state there is no slot to allocate.
            MapKind::Dynamic => return Err(MapError::Reject),
        };

        Ok((addr4, entry))
    }
}

impl MapEntry {
    /// An explicit 1:1 mapping between a v4 and a v6 prefix.
    pub fn static_map(v4: Ipv4Network, v6: Ipv6Network, line: u32) -> Self {
        Self::new(
            v4.network_address(),
            v4.netmask(),
            v6.network_address(),
            v6.netmask(),
            MapKind::Static,
            line,
        )
    }

    /// An RFC 6052 translation prefix.
    pub fn rfc6052(prefix: Ipv6Network, line: u32) -> Self {
        Self::new(
            Ipv4Addr::UNSPECIFIED,
            0,
            prefix.network_address(),
            prefix.netmask(),
            MapKind::Rfc6052,
            line,
        )
    }

    /// A v6 prefix backed by a v4 pool.
    pub fn dynamic(pool: Ipv4Network, prefix: Ipv6Network, line: u32) -> Self {
        Self::new(
            pool.network_address(),
            pool.netmask(),
            prefix.network_address(),
            prefix.netmask(),
            MapKind::Dynamic,
            line,
        )
    }
}

fn validate_entry(entry: &MapEntry) -> Result<(), InsertError> {
    if entry.prefix_len6 > 128 {
        return Err(InsertError::PrefixLen6(entry.prefix_len6));
    }

    if u128::from(entry.addr6) & host_mask6(entry.prefix_len6) != 0 {
        return Err(InsertError::HostBits6(entry.addr6, entry.prefix_len6));
    }

    if entry.prefix_len4 > 32 {
        return Err(InsertError::PrefixLen4(entry.prefix_len4));
    }

    if u32::from(entry.addr4) & host_mask4(entry.prefix_len4) != 0 {
        return Err(InsertError::HostBits4(entry.addr4, entry.prefix_len4));
    }

    match entry.kind {
        MapKind::Static => {
            // Both sides must describe the same number of hosts for the
            // low-bit copy to be a bijection.
            if 32 - entry.prefix_len4 != 128 - entry.prefix_len6 {
                return Err(InsertError::IncompatibleLengths(
                    entry.prefix_len4,
                    entry.prefix_len6,
                ));
            }
        }
        MapKind::Rfc6052 => {
            let defined = matches!(entry.prefix_len6, 32 | 40 | 48 | 56 | 64 | 96);
            // Octet 8 is reserved and must be zero whenever the prefix
            // covers it.
            let reserved_ok = entry.prefix_len6 <= 64 || entry.addr6.octets()[8] == 0;

            if !defined || !reserved_ok {
                return Err(InsertError::InvalidRfc6052Prefix(
                    entry.addr6,
                    entry.prefix_len6,
                ));
            }
        }
        MapKind::Dynamic => {}
    }

    Ok(())
}

// Keys are left-aligned into a u128 so one trie walk serves both families.

fn insert_into(root: &mut Node, key: u128, len: u8, idx: usize) {
    let mut node = root;

    for i in 0..len {
        let bit = (key >> (127 - i)) & 1;
        node = node.child[bit as usize].get_or_insert_default().as_mut();
    }

    node.entry = Some(idx);
}

fn lookup(root: &Node, key: u128, width: u8) -> Option<usize> {
    let mut node = root;
    let mut best = node.entry;

    for i in 0..width {
        let bit = (key >> (127 - i)) & 1;

        match node.child[bit as usize].as_deref() {
            Some(child) => {
                node = child;
                if child.entry.is_some() {
                    best = child.entry;
                }
            }
            None => break,
        }
    }

    best
}

fn lookup_exact(root: &Node, key: u128, len: u8) -> Option<usize> {
    let mut node = root;

    for i in 0..len {
        let bit = (key >> (127 - i)) & 1;
        node = node.child[bit as usize].as_deref()?;
    }

    node.entry
}

fn host_mask4(len: u8) -> u32 {
    match len {
        32 => 0,
        _ => u32::MAX >> len,
    }
}

fn host_mask6(len: u8) -> u128 {
    match len {
        128 => 0,
        _ => u128::MAX >> len,
    }
}
