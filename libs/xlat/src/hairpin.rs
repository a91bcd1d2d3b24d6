//! RFC 7757 hairpinning.
//!
//! A v6 client reaches an EAM-mapped host through its RFC 6052 form: the
//! 6->4 translation yields a v4 destination that is itself the v4 side of
//! an explicit mapping. Sending that packet out the v4 leg would strand
//! the return traffic, so it loops back onto the v6 side instead, with the
//! source re-encoded under the translation prefix.

use std::net::{Ipv4Addr, Ipv6Addr};

use addrmap::{MapEntry, MapKind};
use ip_packet::{Packet6, checksum};
use smallvec::smallvec;

use crate::{AddressFamily, Frame, Frames, Translator, UdpCksumMode, headers};

impl Translator {
    /// Decides whether a translated packet must hairpin. Returns the new
    /// v6 address pair if so; `None` lets the normal 6->4 path continue.
    pub(crate) fn hairpin_target(
        &self,
        src4: Ipv4Addr,
        dst4: Ipv4Addr,
        dst_entry: &MapEntry,
    ) -> Option<(Ipv6Addr, Ipv6Addr)> {
        // Only destinations resolved through an RFC 6052 prefix can point
        // back at an EAM host.
        if dst_entry.kind != MapKind::Rfc6052 {
            return None;
        }

        let (new_dst6, eam) = self.table().map4_to_6(dst4).ok()?;
        if eam.kind != MapKind::Static {
            return None;
        }

        // The source goes back under the same translation prefix the
        // destination came in through, never its EAM form: replies must
        // route through this translator again.
        if self.config().wkpf_strict
            && addrmap::is_well_known_prefix(dst_entry.addr6, dst_entry.prefix_len6)
            && addrmap::is_private_ip4(src4)
        {
            return None;
        }

        let new_src6 = addrmap::embed(dst_entry.addr6, dst_entry.prefix_len6, src4).ok()?;

        Some((new_src6, new_dst6))
    }

    /// Re-emits the packet on the v6 side under the new address pair. The
    /// reinjected packet is not examined for further hairpins.
    pub(crate) fn hairpin_emit<'p>(
        &self,
        buf: &'p mut [u8],
        pkt: &Packet6,
        new_src6: Ipv6Addr,
        new_dst6: Ipv6Addr,
    ) -> Frames<'p> {
        let delta =
            checksum::addr6_delta((&pkt.src(), &pkt.dst()), (&new_src6, &new_dst6));

        if let Err(reason) = fix_l4_for_new_addrs(buf, pkt, delta, self.config().udp_cksum_mode) {
            return self.dropped(reason);
        }

        // The reinjected packet keeps traffic class and flow label but
        // loses any extension headers other than Fragment.
        let mut header6 = pkt.header.clone();
        header6.source = new_src6.octets();
        header6.destination = new_dst6.octets();
        header6.hop_limit -= 1;

        let mut header = Vec::with_capacity(48);

        if let Some(frag) = pkt.frag {
            header6.next_header = etherparse::IpNumber(44);
            header6.payload_length = (8 + pkt.data_len()) as u16;
            header.extend_from_slice(&header6.to_bytes());
            header.extend_from_slice(&headers::fragment_header(
                pkt.data_proto,
                frag.offset_bytes(),
                frag.more,
                frag.ident,
            ));
        } else {
            header6.next_header = etherparse::IpNumber(pkt.data_proto);
            header6.payload_length = pkt.data_len() as u16;
            header.extend_from_slice(&header6.to_bytes());
        }

        self.count_hairpinned();

        let buf: &'p [u8] = buf;

        smallvec![Frame {
            af: AddressFamily::V6,
            header,
            payload: &buf[pkt.payload.clone()],
        }]
    }
}

/// The packet stays IPv6 but both addresses change, so every checksum that
/// covers the pseudo-header shifts by the same delta.
fn fix_l4_for_new_addrs(
    buf: &mut [u8],
    pkt: &Packet6,
    delta: u16,
    udp_mode: UdpCksumMode,
) -> Result<(), &'static str> {
    if pkt.frag.map(|f| f.offset != 0).unwrap_or(false) {
        return Ok(());
    }

    let l4 = pkt.payload.clone();

    let at = match pkt.data_proto {
        // UDP; a missing checksum stays missing under Fwd, is illegal
        // otherwise.
        17 => {
            if buf[l4.start + 6] == 0 && buf[l4.start + 7] == 0 {
                return match udp_mode {
                    UdpCksumMode::Fwd => Ok(()),
                    UdpCksumMode::Drop | UdpCksumMode::Calc => {
                        Err("UDP datagram without checksum")
                    }
                };
            }

            l4.start + 6
        }
        6 => l4.start + 16,
        58 => l4.start + 2,
        _ => return Ok(()),
    };

    headers::adjust_checksum_field(buf, at, !delta);

    Ok(())
}
