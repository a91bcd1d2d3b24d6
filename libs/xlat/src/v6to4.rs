//! IPv6 -> IPv4 header rewriting.

use std::net::Ipv4Addr;

use addrmap::MapEntry;
use ip_packet::{IPV6_MIN_MTU, IcmpHdr, Packet6, checksum, parse6};
use smallvec::smallvec;

use crate::icmp::{ECHO_REPLY_DELTA, ECHO_REQUEST_DELTA};
use crate::{AddressFamily, Frame, Frames, Translator, UdpCksumMode, headers, host, icmp};

impl Translator {
    /// Translates a plain datagram (anything but an ICMP error) towards
    /// the IPv4 side.
    pub(crate) fn xlate_6to4_data<'p>(
        &self,
        buf: &'p mut [u8],
        pkt: &Packet6,
        src4: Ipv4Addr,
        dst4: Ipv4Addr,
        src_entry: Option<&MapEntry>,
        dst_entry: &MapEntry,
    ) -> Frames<'p> {
        // The v6 side must not hand us more than the device can emit; the
        // sender's path MTU discovery needs to hear about it.
        if 40 + pkt.header_len + pkt.data_len() > usize::from(self.config().mtu) {
            return self.reject(host::icmp6_error(self.config(), buf, pkt, IcmpHdr {
                icmp_type: 2,
                code: 0,
                checksum: 0,
                word: u32::from(self.config().mtu),
            }));
        }

        if let Err(reason) =
            xlate_payload_6to4(buf, pkt, src4, dst4, self.config().udp_cksum_mode)
        {
            return self.dropped(reason);
        }

        if let Some(entry) = src_entry {
            entry.mark_seen_6to4();
        }
        dst_entry.mark_seen_6to4();

        let (identification, dont_fragment, more_fragments, fragment_offset) =
            ident_policy(pkt, Some(dst_entry));

        let ip4 = headers::ipv4_header(headers::Ipv4Fields {
            tos: pkt.traffic_class(),
            total_len: (20 + pkt.data_len()) as u16,
            identification,
            dont_fragment,
            more_fragments,
            fragment_offset,
            time_to_live: pkt.header.hop_limit - 1,
            protocol: translate_proto(pkt.data_proto),
            source: src4,
            destination: dst4,
        });

        self.count_forwarded_6to4();

        let buf: &'p [u8] = buf;

        smallvec![Frame {
            af: AddressFamily::V4,
            header: headers::ipv4_bytes(ip4),
            payload: &buf[pkt.payload.clone()],
        }]
    }

    /// Translates an ICMPv6 error, including the quoted original.
    pub(crate) fn xlate_6to4_icmp_error<'p>(
        &self,
        buf: &'p mut [u8],
        pkt: &Packet6,
        src4: Ipv4Addr,
        dst4: Ipv4Addr,
        dst_entry: &MapEntry,
    ) -> Frames<'p> {
        let Some(outer_icmp) = pkt.icmp else {
            return self.dropped("not an ICMP packet");
        };

        let em_off = pkt.payload.start + IcmpHdr::LEN;
        let mut em_end = pkt.payload.end;

        // RFC 4884 length, in 8-byte units on the ICMPv6 side.
        if matches!(outer_icmp.icmp_type, 1 | 3) {
            let em_len = ((outer_icmp.word >> 24) & 0xff) as usize * 8;

            if em_len != 0 {
                if em_end - em_off < em_len {
                    return self.dropped("quoted original shorter than declared");
                }

                em_end = em_off + em_len;
            }
        }

        let em = match parse6(&buf[em_off..em_end]) {
            Ok(em) => em,
            Err(e) => return self.dropped(e),
        };

        if em.data_proto == 58
            && em.icmp.map(|i| i.icmp_type != 128).unwrap_or(true)
        {
            return self.dropped("quoted original is not an echo request");
        }

        let mut em_data_len = em.data_len();
        if 20 * 2 + IcmpHdr::LEN + em_data_len > 576 {
            em_data_len = 576 - 20 * 2 - IcmpHdr::LEN;
        }

        let Some(mut new_icmp) = icmp::error_6to4(&outer_icmp, self.config()) else {
            return self.dropped("ICMP message has no translation");
        };

        // Inner mapping failures drop silently; never answer an error
        // with another error.
        let Ok((em_src4, _)) = self.table().map6_to_4(em.src()) else {
            return self.dropped("no v4 form for quoted source");
        };
        let Ok((em_dst4, _)) = self.table().map6_to_4(em.dst()) else {
            return self.dropped("no v4 form for quoted destination");
        };

        if let Err(reason) = xlate_payload_6to4(
            &mut buf[em_off..em_end],
            &em,
            em_src4,
            em_dst4,
            UdpCksumMode::Drop,
        ) {
            return self.dropped(reason);
        }

        let (em_ident, em_df, em_mf, em_frag_offset) = ident_policy(&em, None);

        let em_ip4 = headers::ipv4_header(headers::Ipv4Fields {
            tos: em.traffic_class(),
            total_len: 20 + em.header.payload_length - em.header_len as u16,
            identification: em_ident,
            dont_fragment: em_df,
            more_fragments: em_mf,
            fragment_offset: em_frag_offset,
            time_to_live: em.header.hop_limit,
            protocol: translate_proto(em.data_proto),
            source: em_src4,
            destination: em_dst4,
        });

        let (identification, dont_fragment, more_fragments, fragment_offset) =
            ident_policy(pkt, Some(dst_entry));

        // The quoted v6 header shrinks to a v4 one, so the outer length is
        // built from parts rather than adjusted.
        let outer_ip4 = headers::ipv4_header(headers::Ipv4Fields {
            tos: pkt.traffic_class(),
            total_len: (20 + IcmpHdr::LEN + 20 + em_data_len) as u16,
            identification,
            dont_fragment,
            more_fragments,
            fragment_offset,
            time_to_live: pkt.header.hop_limit - 1,
            protocol: 1,
            source: src4,
            destination: dst4,
        });

        self.count_forwarded_6to4();

        let buf: &'p [u8] = buf;
        let em_payload_start = em_off + em.payload.start;
        let em_payload = &buf[em_payload_start..em_payload_start + em_data_len];

        let em_ip4_bytes = headers::ipv4_bytes(em_ip4);

        new_icmp.checksum = checksum::ones_add(
            checksum::ones_add(
                checksum::checksum(&new_icmp.to_bytes()),
                checksum::checksum(&em_ip4_bytes),
            ),
            checksum::checksum(em_payload),
        );

        let mut header = headers::ipv4_bytes(outer_ip4);
        header.extend_from_slice(&new_icmp.to_bytes());
        header.extend_from_slice(&em_ip4_bytes);

        smallvec![Frame {
            af: AddressFamily::V4,
            header,
            payload: em_payload,
        }]
    }
}

fn translate_proto(proto: u8) -> u8 {
    if proto == 58 { 1 } else { proto }
}

/// IPv4 identification, DF, MF and fragment offset (in 8-byte units) for a
/// translated v6 packet.
///
/// A Fragment header wins outright. Otherwise destinations known to sit
/// behind a sub-1280 IPv4 path get generated identifiers so their routers
/// can fragment; everyone else keeps DF set for anything that could not
/// have fit a minimal IPv6 link anyway.
fn ident_policy(pkt: &Packet6, dst_entry: Option<&MapEntry>) -> (u16, bool, bool, u16) {
    if let Some(frag) = pkt.frag {
        return ((frag.ident & 0xffff) as u16, false, frag.more, frag.offset);
    }

    if let Some(entry) = dst_entry
        && entry.gen_ident()
        && pkt.header_len + pkt.data_len() <= usize::from(IPV6_MIN_MTU)
    {
        return (entry.next_ident(), false, false, 0);
    }

    let dont_fragment = 20 + pkt.data_len() > 1260;

    (0, dont_fragment, false, 0)
}

/// Moves the L4 checksum in `buf` off the IPv6 pseudo-header and rewrites
/// echo types. `buf` is the slice `pkt`'s ranges refer to.
fn xlate_payload_6to4(
    buf: &mut [u8],
    pkt: &Packet6,
    src4: Ipv4Addr,
    dst4: Ipv4Addr,
    udp_mode: UdpCksumMode,
) -> Result<(), &'static str> {
    if pkt.frag.map(|f| f.offset != 0).unwrap_or(false) {
        return Ok(());
    }

    let l4 = pkt.payload.clone();

    match pkt.data_proto {
        // UDP
        17 => {
            let at = l4.start + 6;

            if buf[at] == 0 && buf[at + 1] == 0 {
                match udp_mode {
                    UdpCksumMode::Drop => return Err("UDP datagram without checksum"),
                    UdpCksumMode::Fwd => {}
                    UdpCksumMode::Calc if pkt.truncated => {
                        return Err("cannot checksum a truncated datagram");
                    }
                    UdpCksumMode::Calc => {
                        let datagram = &buf[l4.clone()];
                        let pseudo = checksum::ip4_pseudo_checksum(
                            src4,
                            dst4,
                            datagram.len() as u32,
                            17,
                        );

                        let mut sum =
                            checksum::ones_add(checksum::checksum(datagram), pseudo);
                        if sum == 0 {
                            sum = 0xffff;
                        }

                        headers::set_checksum_field(buf, at, sum);
                    }
                }
            } else {
                let delta = checksum::pseudo_delta(src4, dst4, &pkt.src(), &pkt.dst());
                headers::adjust_checksum_field(buf, at, delta);
            }
        }
        // TCP
        6 => {
            let delta = checksum::pseudo_delta(src4, dst4, &pkt.src(), &pkt.dst());
            headers::adjust_checksum_field(buf, l4.start + 16, delta);
        }
        // ICMPv6: drop the pseudo-header from the sum and rewrite the
        // echo type.
        58 => {
            let Some(icmp) = pkt.icmp else {
                return Err("ICMP header missing");
            };

            let icmp_len = u32::from(pkt.header.payload_length) - pkt.header_len as u32;
            let pseudo = checksum::ip6_pseudo_checksum(&pkt.src(), &pkt.dst(), icmp_len, 58);
            let combined = checksum::ones_add(icmp.checksum, !pseudo);

            let (new_type, type_delta) = match icmp.icmp_type {
                128 => (8u8, ECHO_REQUEST_DELTA),
                _ => (0, ECHO_REPLY_DELTA),
            };

            buf[l4.start] = new_type;
            headers::set_checksum_field(buf, l4.start + 2, checksum::ones_add(combined, type_delta));
        }
        _ => {}
    }

    Ok(())
}
