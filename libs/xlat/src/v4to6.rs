//! IPv4 -> IPv6 header rewriting.

use std::net::Ipv6Addr;

use addrmap::MapError;
use etherparse::IpNumber;
use ip_packet::{IPV6_MIN_MTU, IcmpHdr, Packet4, checksum, parse4};
use smallvec::smallvec;

use crate::icmp::{ECHO_REPLY_DELTA, ECHO_REQUEST_DELTA};
use crate::{AddressFamily, Frame, Frames, Translator, UdpCksumMode, headers, host, icmp};

impl Translator {
    /// Translates a plain datagram (anything but an ICMP error) towards
    /// the IPv6 side.
    pub(crate) fn xlate_4to6_data<'p>(&self, buf: &'p mut [u8], pkt: &Packet4) -> Frames<'p> {
        let (dst6, dst_entry) = match self.table().map4_to_6(pkt.dst()) {
            Ok(mapped) => mapped,
            Err(MapError::Reject) => {
                // Host Unreachable.
                return self.reject(host::icmp4_error(self.config(), buf, pkt, IcmpHdr {
                    icmp_type: 3,
                    code: 1,
                    checksum: 0,
                    word: 0,
                }));
            }
            Err(MapError::Drop) => return self.dropped("no v6 form for destination"),
        };

        let (src6, src_entry) = match self.table().map4_to_6(pkt.src()) {
            Ok(mapped) => mapped,
            Err(MapError::Reject) => {
                // Administratively prohibited; also answers sources inside
                // a dynamic pool with no lease.
                return self.reject(host::icmp4_error(self.config(), buf, pkt, IcmpHdr {
                    icmp_type: 3,
                    code: 10,
                    checksum: 0,
                    word: 0,
                }));
            }
            Err(MapError::Drop) => return self.dropped("no v6 form for source"),
        };

        // Room for one fragment's worth of payload: both MTUs, minus the
        // IPv6 header and the Fragment header, rounded down to the 8-byte
        // granularity of fragment offsets.
        let frag_size =
            (usize::from(self.config().mtu.min(self.config().ipv6_offlink_mtu)) - 40 - 8) & !7;

        let mut no_frag_hdr = false;

        if !pkt.is_fragment() {
            if pkt.header.dont_fragment {
                // The sender handles path MTU discovery; it only needs to
                // know our side is 20 bytes narrower than it thinks.
                if usize::from(self.config().mtu) - 20 < pkt.header_len + pkt.data_len() {
                    return self.reject(host::icmp4_error(self.config(), buf, pkt, IcmpHdr {
                        icmp_type: 3,
                        code: 4,
                        checksum: 0,
                        word: u32::from(self.config().mtu) - 20,
                    }));
                }

                no_frag_hdr = true;
            } else if self.config().lazy_frag_hdr && pkt.data_len() <= frag_size {
                no_frag_hdr = true;
            }
        }

        if let Err(reason) =
            xlate_payload_4to6(buf, pkt, &src6, &dst6, self.config().udp_cksum_mode)
        {
            return self.dropped(reason);
        }

        src_entry.mark_seen_4to6();
        dst_entry.mark_seen_4to6();

        let tos = pkt.tos();
        let hop_limit = pkt.header.time_to_live - 1;
        let next_header = translate_proto(pkt.proto());

        self.count_forwarded_4to6();

        let buf: &'p [u8] = buf;
        let payload = &buf[pkt.payload.clone()];

        if no_frag_hdr {
            let ip6 =
                headers::ipv6_header(tos, payload.len() as u16, next_header, hop_limit, src6, dst6);

            return smallvec![Frame {
                af: AddressFamily::V6,
                header: ip6.to_bytes().to_vec(),
                payload,
            }];
        }

        // Carry the IPv4 identifier into the (wider) IPv6 one so the far
        // end can correlate fragments of the same original datagram.
        let ident = u32::from(pkt.header.identification);
        let mut frames = Frames::new();
        let mut offset = pkt.frag_offset();
        let mut remaining = payload;

        while !remaining.is_empty() {
            let take = remaining.len().min(frag_size);
            let (chunk, rest) = remaining.split_at(take);
            let more = !rest.is_empty() || pkt.header.more_fragments;

            let ip6 = headers::ipv6_header(
                tos,
                (8 + take) as u16,
                44,
                hop_limit,
                src6,
                dst6,
            );
            let mut header = ip6.to_bytes().to_vec();
            header.extend_from_slice(&headers::fragment_header(next_header, offset, more, ident));

            frames.push(Frame {
                af: AddressFamily::V6,
                header,
                payload: chunk,
            });

            offset += take as u32;
            remaining = rest;
        }

        frames
    }

    /// Translates an ICMPv4 error: the outer header through the type/code
    /// tables, the quoted original as a second, stricter translation.
    pub(crate) fn xlate_4to6_icmp_error<'p>(&self, buf: &'p mut [u8], pkt: &Packet4) -> Frames<'p> {
        let Some(outer_icmp) = pkt.icmp else {
            return self.dropped("not an ICMP packet");
        };

        let em_off = pkt.payload.start + IcmpHdr::LEN;
        let mut em_end = pkt.payload.end;

        // RFC 4884: some messages declare the length of the quoted
        // original, with extensions behind it that do not survive
        // translation.
        if matches!(outer_icmp.icmp_type, 3 | 11 | 12) {
            let em_len = ((outer_icmp.word >> 16) & 0xff) as usize * 4;

            if em_len != 0 {
                if em_end - em_off < em_len {
                    return self.dropped("quoted original shorter than declared");
                }

                em_end = em_off + em_len;
            }
        }

        let em = match parse4(&buf[em_off..em_end]) {
            Ok(em) => em,
            Err(e) => return self.dropped(e),
        };

        // Never translate an error about an error.
        if em.icmp.map(|i| i.icmp_type != 8).unwrap_or(false) {
            return self.dropped("quoted original is not an echo request");
        }

        let mut em_data_len = em.data_len();
        if 40 * 2 + IcmpHdr::LEN + em_data_len > usize::from(IPV6_MIN_MTU) {
            em_data_len = usize::from(IPV6_MIN_MTU) - 40 * 2 - IcmpHdr::LEN;
        }

        // Inner mapping failures drop; the quoted addresses are seen from
        // the far side, so no ICMP answer would reach anyone useful.
        let Ok((em_src6, _)) = self.table().map4_to_6(em.src()) else {
            return self.dropped("no v6 form for quoted source");
        };
        let Ok((em_dst6, em_dst_entry)) = self.table().map4_to_6(em.dst()) else {
            return self.dropped("no v6 form for quoted destination");
        };

        let Some(mut new_icmp) = icmp::error_4to6(
            &outer_icmp,
            em.header.total_len,
            Some(em_dst_entry),
            self.config(),
        ) else {
            return self.dropped("ICMP message has no translation");
        };

        if let Err(reason) = xlate_payload_4to6(
            &mut buf[em_off..em_end],
            &em,
            &em_src6,
            &em_dst6,
            UdpCksumMode::Drop,
        ) {
            return self.dropped(reason);
        }

        // An unmapped outer source must not kill the error; fall back to
        // speaking for ourselves so it still reaches the v6 host.
        let src6 = match self.table().map4_to_6(pkt.src()) {
            Ok((addr, _)) => addr,
            Err(_) => self.config().local_addr6,
        };
        let Ok((dst6, _)) = self.table().map4_to_6(pkt.dst()) else {
            return self.dropped("no v6 form for destination");
        };

        let em_ip6 = headers::ipv6_header(
            em.tos(),
            em.header.total_len - em.header_len as u16,
            translate_proto(em.proto()),
            em.header.time_to_live,
            em_src6,
            em_dst6,
        );

        let payload_length = (IcmpHdr::LEN + 40 + em_data_len) as u16;
        let outer_ip6 = headers::ipv6_header(
            pkt.tos(),
            payload_length,
            58,
            pkt.header.time_to_live - 1,
            src6,
            dst6,
        );

        self.count_forwarded_4to6();

        let buf: &'p [u8] = buf;
        let em_payload_start = em_off + em.payload.start;
        let em_payload = &buf[em_payload_start..em_payload_start + em_data_len];

        new_icmp.checksum = checksum::ones_add(
            checksum::ip6_pseudo_checksum(&src6, &dst6, u32::from(payload_length), 58),
            checksum::ones_add(
                checksum::ones_add(
                    checksum::checksum(&new_icmp.to_bytes()),
                    checksum::checksum(&em_ip6.to_bytes()),
                ),
                checksum::checksum(em_payload),
            ),
        );

        let mut header = outer_ip6.to_bytes().to_vec();
        header.extend_from_slice(&new_icmp.to_bytes());
        header.extend_from_slice(&em_ip6.to_bytes());

        smallvec![Frame {
            af: AddressFamily::V6,
            header,
            payload: em_payload,
        }]
    }
}

fn translate_proto(proto: IpNumber) -> u8 {
    if proto == IpNumber::ICMP { 58 } else { proto.0 }
}

/// Moves the L4 checksum in `buf` onto the IPv6 pseudo-header and rewrites
/// echo types. `buf` is the slice `pkt`'s ranges refer to. An error means
/// the packet cannot be translated and must be dropped.
fn xlate_payload_4to6(
    buf: &mut [u8],
    pkt: &Packet4,
    src6: &Ipv6Addr,
    dst6: &Ipv6Addr,
    udp_mode: UdpCksumMode,
) -> Result<(), &'static str> {
    // Fragments past the first carry no L4 header to fix.
    if pkt.frag_offset() != 0 {
        return Ok(());
    }

    let l4 = pkt.payload.clone();

    match pkt.proto() {
        IpNumber::ICMP => {
            let Some(icmp) = pkt.icmp else {
                return Err("ICMP header missing");
            };

            // ICMPv6 includes the pseudo-header in its checksum; the
            // length is the one the original datagram declared, which for
            // a quoted original may exceed what was carried.
            let icmp_len = u32::from(pkt.header.total_len) - pkt.header_len as u32;
            let pseudo = checksum::ip6_pseudo_checksum(src6, dst6, icmp_len, 58);
            let combined = checksum::ones_add(icmp.checksum, pseudo);

            let (new_type, type_delta) = match icmp.icmp_type {
                8 => (128u8, ECHO_REQUEST_DELTA),
                _ => (129, ECHO_REPLY_DELTA),
            };

            buf[l4.start] = new_type;
            headers::set_checksum_field(
                buf,
                l4.start + 2,
                checksum::ones_add(combined, !type_delta),
            );
        }
        IpNumber::UDP => {
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
                        let pseudo = checksum::ip6_pseudo_checksum(
                            src6,
                            dst6,
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
                let delta = checksum::pseudo_delta(pkt.src(), pkt.dst(), src6, dst6);
                headers::adjust_checksum_field(buf, at, !delta);
            }
        }
        IpNumber::TCP => {
            let delta = checksum::pseudo_delta(pkt.src(), pkt.dst(), src6, dst6);
            headers::adjust_checksum_field(buf, l4.start + 16, !delta);
        }
        _ => {}
    }

    Ok(())
}
