//! The translation state machine: takes one datagram off the TUN device
//! and produces the frames to write back, if any.
//!
//! Every packet ends one of four ways: forwarded to the other family,
//! dropped silently, rejected with an ICMP error from the translator, or
//! hairpinned back onto the IPv6 side. Callers observe only the returned
//! frames plus the [`Stats`] counters; all decisions, including whether an
//! ICMP error is due, are made in here.

#![cfg_attr(test, allow(clippy::unwrap_used))]

mod config;
mod frame;
mod hairpin;
mod headers;
mod host;
mod icmp;
mod stats;
mod v4to6;
mod v6to4;

pub use config::{Config, UdpCksumMode};
pub use frame::{AddressFamily, Frame, Frames};
pub use stats::{Stats, StatsSnapshot};

use addrmap::{MapError, MapTable};
use ip_packet::{IcmpHdr, checksum, parse4, parse6};
use smallvec::smallvec;

/// A stateless NAT64 translator instance.
///
/// Holds the immutable configuration and mapping table plus the atomic
/// counters, so any number of workers can call [`Translator::handle_ipv4`]
/// and [`Translator::handle_ipv6`] concurrently on their own buffers.
pub struct Translator {
    config: Config,
    table: MapTable,
    stats: Stats,
}

impl Translator {
    pub fn new(config: Config, table: MapTable) -> Self {
        Self {
            config,
            table,
            stats: Stats::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn table(&self) -> &MapTable {
        &self.table
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Processes one IPv4 datagram read from the TUN device. The returned
    /// frames borrow `buf`, which may have been rewritten in place.
    pub fn handle_ipv4<'p>(&self, buf: &'p mut [u8]) -> Frames<'p> {
        let pkt = match parse4(buf) {
            Ok(pkt) => pkt,
            Err(e) => return self.dropped(e),
        };

        if pkt.truncated {
            return self.dropped("datagram shorter than its declared length");
        }

        if pkt.header.time_to_live == 0 {
            return self.dropped("TTL already zero");
        }

        if !pkt.header_checksum_valid(buf) {
            return self.dropped("bad IPv4 header checksum");
        }

        if pkt.icmp.is_some() && checksum::checksum(&buf[pkt.payload.clone()]) != 0 {
            return self.dropped("bad ICMP checksum");
        }

        if pkt.dst() == self.config.local_addr4 {
            self.stats.count(&self.stats.host);
            return host::handle4(&self.config, buf, &pkt);
        }

        if pkt.header.time_to_live == 1 {
            // Time Exceeded.
            return self.reject(host::icmp4_error(&self.config, buf, &pkt, IcmpHdr {
                icmp_type: 11,
                code: 0,
                checksum: 0,
                word: 0,
            }));
        }

        match pkt.icmp {
            Some(icmp) if icmp.icmp_type != 8 && icmp.icmp_type != 0 => {
                self.xlate_4to6_icmp_error(buf, &pkt)
            }
            _ => self.xlate_4to6_data(buf, &pkt),
        }
    }

    /// Processes one IPv6 datagram read from the TUN device.
    pub fn handle_ipv6<'p>(&self, buf: &'p mut [u8]) -> Frames<'p> {
        let pkt = match parse6(buf) {
            Ok(pkt) => pkt,
            Err(e) => return self.dropped(e),
        };

        // A Routing header with hops left must not be translated; point a
        // Parameter Problem at the segments-left byte instead.
        if let Some(pointer) = pkt.routing_segments_left {
            return self.reject(host::icmp6_error(&self.config, buf, &pkt, IcmpHdr {
                icmp_type: 4,
                code: 0,
                checksum: 0,
                word: pointer,
            }));
        }

        if pkt.truncated {
            return self.dropped("datagram shorter than its declared length");
        }

        if pkt.header.hop_limit == 0 {
            return self.dropped("hop limit already zero");
        }

        if pkt.icmp.is_some() && !pkt.icmp_checksum_valid(buf) {
            return self.dropped("bad ICMPv6 checksum");
        }

        if pkt.dst() == self.config.local_addr6 {
            self.stats.count(&self.stats.host);
            return host::handle6(&self.config, buf, &pkt);
        }

        if pkt.header.hop_limit == 1 {
            // Time Exceeded.
            return self.reject(host::icmp6_error(&self.config, buf, &pkt, IcmpHdr {
                icmp_type: 3,
                code: 0,
                checksum: 0,
                word: 0,
            }));
        }

        // Map both addresses up front; the data, ICMP-error and hairpin
        // paths all work from the same resolution.
        let (src4, src_entry) = match self.table.map6_to_4(pkt.src()) {
            Ok((addr, entry)) => (addr, Some(entry)),
            // An unmapped source must not stop traffic that can still be
            // delivered; the translator lends its own address, which at
            // least keeps ICMP errors flowing towards the v4 origin.
            Err(MapError::Reject) => (self.config.local_addr4, None),
            Err(MapError::Drop) => return self.dropped("no v4 form for source"),
        };

        let (dst4, dst_entry) = match self.table.map6_to_4(pkt.dst()) {
            Ok(mapped) => mapped,
            Err(MapError::Reject) => {
                // Destination Unreachable, no route.
                return self.reject(host::icmp6_error(&self.config, buf, &pkt, IcmpHdr {
                    icmp_type: 1,
                    code: 0,
                    checksum: 0,
                    word: 0,
                }));
            }
            Err(MapError::Drop) => return self.dropped("no v4 form for destination"),
        };

        if let Some((new_src6, new_dst6)) = self.hairpin_target(src4, dst4, dst_entry) {
            return self.hairpin_emit(buf, &pkt, new_src6, new_dst6);
        }

        match pkt.icmp {
            Some(icmp) if icmp.icmp_type != 128 && icmp.icmp_type != 129 => {
                self.xlate_6to4_icmp_error(buf, &pkt, src4, dst4, dst_entry)
            }
            _ => self.xlate_6to4_data(buf, &pkt, src4, dst4, src_entry, dst_entry),
        }
    }

    fn dropped<'p>(&self, reason: impl std::fmt::Display) -> Frames<'p> {
        tracing::debug!(%reason, "dropping packet");
        self.stats.count(&self.stats.dropped);

        smallvec![]
    }

    fn reject<'p>(&self, frames: Frames<'p>) -> Frames<'p> {
        self.stats.count(&self.stats.rejected);

        frames
    }

    fn count_forwarded_4to6(&self) {
        self.stats.count(&self.stats.forwarded_4to6);
    }

    fn count_forwarded_6to4(&self) {
        self.stats.count(&self.stats.forwarded_6to4);
    }

    fn count_hairpinned(&self) {
        self.stats.count(&self.stats.hairpinned);
    }
}
