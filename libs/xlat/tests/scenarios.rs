//! End-to-end translation scenarios: one datagram in, asserted frames out.

#![allow(clippy::unwrap_used)]

use std::net::{Ipv4Addr, Ipv6Addr};

use addrmap::{MapEntry, MapTable};
use etherparse::{Icmpv6Type, Ipv4Header, PacketBuilder, UdpHeader};
use ip_packet::{checksum, parse4, parse6};
use xlat::{AddressFamily, Config, Translator, UdpCksumMode};

const LOCAL4: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 1);

fn local6() -> Ipv6Addr {
    "2001:db8:1::2".parse().unwrap()
}

fn config() -> Config {
    Config {
        local_addr4: LOCAL4,
        local_addr6: local6(),
        mtu: 1500,
        ipv6_offlink_mtu: 1500,
        wkpf_strict: false,
        allow_ident_gen: false,
        lazy_frag_hdr: true,
        udp_cksum_mode: UdpCksumMode::Drop,
    }
}

/// The well-known prefix as default route plus two explicitly mapped
/// hosts.
fn table(strict: bool) -> MapTable {
    let mut table = MapTable::new(strict);

    table
        .insert(MapEntry::rfc6052("64:ff9b::/96".parse().unwrap(), 1))
        .unwrap();
    table
        .insert(MapEntry::static_map(
            "198.51.100.77/32".parse().unwrap(),
            "2001:db8::77/128".parse().unwrap(),
            2,
        ))
        .unwrap();
    table
        .insert(MapEntry::static_map(
            "198.51.100.88/32".parse().unwrap(),
            "2001:db8::88/128".parse().unwrap(),
            3,
        ))
        .unwrap();

    table
}

fn translator() -> Translator {
    Translator::new(config(), table(false))
}

fn udp4(src: [u8; 4], dst: [u8; 4], ttl: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    PacketBuilder::ipv4(src, dst, ttl)
        .udp(5353, 53)
        .write(&mut buf, payload)
        .unwrap();

    buf
}

fn udp6(src: &str, dst: &str, hop: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    PacketBuilder::ipv6(
        src.parse::<Ipv6Addr>().unwrap().octets(),
        dst.parse::<Ipv6Addr>().unwrap().octets(),
        hop,
    )
    .udp(5353, 53)
    .write(&mut buf, payload)
    .unwrap();

    buf
}

#[test]
fn plain_udp_4to6_over_wkp() {
    let xlat = translator();
    let mut buf = udp4([192, 0, 2, 10], [198, 51, 100, 5], 64, b"query");

    let frames = xlat.handle_ipv4(&mut buf);

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].af, AddressFamily::V6);

    let out = frames[0].to_vec();
    let pkt = parse6(&out).unwrap();

    assert_eq!(pkt.src(), "64:ff9b::c000:20a".parse::<Ipv6Addr>().unwrap());
    assert_eq!(pkt.dst(), "64:ff9b::c633:6405".parse::<Ipv6Addr>().unwrap());
    assert_eq!(pkt.header.hop_limit, 63);
    assert_eq!(pkt.data_proto, 17);
    assert!(pkt.frag.is_none(), "small datagram needs no fragment header");

    // The adjusted UDP checksum must equal a fresh computation over the
    // IPv6 pseudo-header.
    let udp = &out[40..];
    let want = UdpHeader::with_ipv6_checksum(
        5353,
        53,
        &pkt.header,
        b"query",
    )
    .unwrap()
    .checksum;
    assert_eq!(u16::from_be_bytes([udp[6], udp[7]]), want);

    assert_eq!(&udp[8..], b"query");
    assert_eq!(xlat.stats().snapshot().forwarded_4to6, 1);
}

#[test]
fn strict_wkp_rejects_private_source() {
    let xlat = Translator::new(
        Config {
            wkpf_strict: true,
            ..config()
        },
        table(true),
    );
    let mut buf = udp4([10, 0, 0, 1], [8, 8, 8, 8], 64, b"x");

    let frames = xlat.handle_ipv4(&mut buf);

    // No translated packet; an ICMP error instead.
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].af, AddressFamily::V4);

    let out = frames[0].to_vec();
    let pkt = parse4(&out).unwrap();
    let icmp = pkt.icmp.unwrap();

    assert_eq!(pkt.src(), LOCAL4);
    assert_eq!(pkt.dst(), Ipv4Addr::new(10, 0, 0, 1));
    assert_eq!((icmp.icmp_type, icmp.code), (3, 10));
    assert_eq!(xlat.stats().snapshot().rejected, 1);
    assert_eq!(xlat.stats().snapshot().forwarded_4to6, 0);
}

#[test]
fn echo_request_4to6() {
    let xlat = translator();
    let data = [0x42u8; 32];
    let mut buf = Vec::new();
    PacketBuilder::ipv4([192, 0, 2, 10], [198, 51, 100, 5], 64)
        .icmpv4_echo_request(0x1234, 1)
        .write(&mut buf, &data)
        .unwrap();

    let frames = xlat.handle_ipv4(&mut buf);

    assert_eq!(frames.len(), 1);
    let out = frames[0].to_vec();
    let pkt = parse6(&out).unwrap();
    let icmp = pkt.icmp.unwrap();

    assert_eq!(pkt.data_proto, 58);
    assert_eq!(icmp.icmp_type, 128);
    assert_eq!(icmp.code, 0);
    assert_eq!(icmp.word, 0x1234_0001, "identifier and sequence survive");
    assert_eq!(&out[48..], &data, "echo data survives");
    assert!(
        pkt.icmp_checksum_valid(&out),
        "checksum is correct over the v6 pseudo-header"
    );
}

#[test]
fn packet_too_big_becomes_fragmentation_needed() {
    let xlat = translator();

    // The original, too-big datagram: v4 host 192.0.2.10 (as seen through
    // the prefix) towards the EAM host.
    let quoted = udp6("64:ff9b::c000:20a", "2001:db8::77", 63, &[0u8; 64]);

    let mut buf = Vec::new();
    PacketBuilder::ipv6(
        "2001:db8::77".parse::<Ipv6Addr>().unwrap().octets(),
        "64:ff9b::c000:20a".parse::<Ipv6Addr>().unwrap().octets(),
        64,
    )
    .icmpv6(Icmpv6Type::PacketTooBig { mtu: 1400 })
    .write(&mut buf, &quoted)
    .unwrap();

    let frames = xlat.handle_ipv6(&mut buf);

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].af, AddressFamily::V4);

    let out = frames[0].to_vec();
    let pkt = parse4(&out).unwrap();
    let icmp = pkt.icmp.unwrap();

    assert_eq!(pkt.src(), Ipv4Addr::new(198, 51, 100, 77));
    assert_eq!(pkt.dst(), Ipv4Addr::new(192, 0, 2, 10));
    assert_eq!((icmp.icmp_type, icmp.code), (3, 4));
    assert_eq!(icmp.word, 1400 - 20, "MTU adjusted for the smaller header");

    // The quoted original is now an IPv4 header.
    let em = parse4(&out[28..]).unwrap();
    assert_eq!(em.src(), Ipv4Addr::new(192, 0, 2, 10));
    assert_eq!(em.dst(), Ipv4Addr::new(198, 51, 100, 77));
    assert_eq!(em.proto().0, 17);
    assert!(em.header_checksum_valid(&out[28..]));

    // The outer ICMP checksum covers header and quote.
    assert_eq!(checksum::checksum(&out[20..]), 0);
}

#[test]
fn oversized_udp_4to6_is_fragmented() {
    let xlat = Translator::new(
        Config {
            mtu: 1280,
            ipv6_offlink_mtu: 1280,
            lazy_frag_hdr: false,
            ..config()
        },
        table(false),
    );

    // 1392 payload bytes + 8 UDP header = 1400 bytes of L4 data.
    let payload = vec![0x5a; 1392];
    let mut buf = udp4([192, 0, 2, 10], [198, 51, 100, 5], 64, &payload);
    buf[4..6].copy_from_slice(&0xaabbu16.to_be_bytes()); // identification
    fix_ipv4_checksum(&mut buf);

    let frames = xlat.handle_ipv4(&mut buf);

    assert_eq!(frames.len(), 2);

    let first = frames[0].to_vec();
    let second = frames[1].to_vec();

    let first = parse6(&first).unwrap();
    let frag = first.frag.unwrap();
    assert_eq!(frag.offset_bytes(), 0);
    assert!(frag.more);
    assert_eq!(frag.ident, 0xaabb);
    assert_eq!(first.data_len(), 1232);

    let second = parse6(&second).unwrap();
    let frag = second.frag.unwrap();
    assert_eq!(frag.offset_bytes(), 1232);
    assert!(!frag.more);
    assert_eq!(frag.ident, 0xaabb);
    assert_eq!(second.data_len(), 1400 - 1232);

    // Stitching the fragments back together yields the translated
    // datagram.
    let mut reassembled = frames[0].payload.to_vec();
    reassembled.extend_from_slice(frames[1].payload);
    assert_eq!(reassembled.len(), 1400);
    assert_eq!(&reassembled[8..], &payload[..]);
}

#[test]
fn unfragmented_with_lazy_header_disabled_gets_fragment_header() {
    let xlat = Translator::new(
        Config {
            lazy_frag_hdr: false,
            ..config()
        },
        table(false),
    );
    let mut buf = udp4([192, 0, 2, 10], [198, 51, 100, 5], 64, b"small");

    let frames = xlat.handle_ipv4(&mut buf);

    assert_eq!(frames.len(), 1);
    let out = frames[0].to_vec();
    let pkt = parse6(&out).unwrap();
    let frag = pkt.frag.unwrap();

    assert_eq!(frag.offset, 0);
    assert!(!frag.more);
    assert_eq!(pkt.data_proto, 17);
}

#[test]
fn hop_limit_exhaustion_rejects_with_time_exceeded() {
    let xlat = translator();
    let mut buf = udp6("2001:db8::77", "64:ff9b::c633:6405", 1, b"x");

    let frames = xlat.handle_ipv6(&mut buf);

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].af, AddressFamily::V6);

    let out = frames[0].to_vec();
    let pkt = parse6(&out).unwrap();
    let icmp = pkt.icmp.unwrap();

    assert_eq!(pkt.src(), local6());
    assert_eq!(pkt.dst(), "2001:db8::77".parse::<Ipv6Addr>().unwrap());
    assert_eq!((icmp.icmp_type, icmp.code), (3, 0));
    assert!(pkt.icmp_checksum_valid(&out));
    assert_eq!(xlat.stats().snapshot().rejected, 1);
}

#[test]
fn udp_6to4_round_trip_recovers_the_original() {
    let xlat = translator();
    let original = udp4([192, 0, 2, 10], [198, 51, 100, 5], 64, b"returning");

    let mut outbound = original.clone();
    let v6 = xlat.handle_ipv4(&mut outbound);
    assert_eq!(v6.len(), 1);

    let mut inbound = v6[0].to_vec();
    let v4 = xlat.handle_ipv6(&mut inbound);
    assert_eq!(v4.len(), 1);
    assert_eq!(v4[0].af, AddressFamily::V4);

    let out = v4[0].to_vec();
    let pkt = parse4(&out).unwrap();
    let orig = parse4(&original).unwrap();

    assert_eq!(pkt.src(), orig.src());
    assert_eq!(pkt.dst(), orig.dst());
    assert_eq!(pkt.header.time_to_live, 62, "decremented once per leg");
    assert_eq!(pkt.header.identification, 0);
    assert!(!pkt.header.dont_fragment, "small packet keeps DF clear");
    assert!(pkt.header_checksum_valid(&out));

    // Payload and a validly adjusted checksum.
    assert_eq!(&out[28..], b"returning");
    let ip = Ipv4Header::new(
        (8 + 9) as u16,
        62,
        etherparse::IpNumber::UDP,
        pkt.src().octets(),
        pkt.dst().octets(),
    )
    .unwrap();
    let want = UdpHeader::with_ipv4_checksum(5353, 53, &ip, b"returning")
        .unwrap()
        .checksum;
    assert_eq!(u16::from_be_bytes([out[26], out[27]]), want);
}

#[test]
fn udp_zero_checksum_is_dropped_by_default() {
    let xlat = translator();
    let mut buf = udp4([192, 0, 2, 10], [198, 51, 100, 5], 64, b"x");
    buf[26] = 0;
    buf[27] = 0;

    let frames = xlat.handle_ipv4(&mut buf);

    assert!(frames.is_empty());
    assert_eq!(xlat.stats().snapshot().dropped, 1);
}

#[test]
fn udp_zero_checksum_calc_mode_computes_one() {
    let xlat = Translator::new(
        Config {
            udp_cksum_mode: UdpCksumMode::Calc,
            ..config()
        },
        table(false),
    );
    let mut buf = udp4([192, 0, 2, 10], [198, 51, 100, 5], 64, b"x");
    buf[26] = 0;
    buf[27] = 0;

    let frames = xlat.handle_ipv4(&mut buf);

    assert_eq!(frames.len(), 1);
    let out = frames[0].to_vec();
    let pkt = parse6(&out).unwrap();

    let got = u16::from_be_bytes([out[46], out[47]]);
    assert_ne!(got, 0);

    let want = UdpHeader::with_ipv6_checksum(5353, 53, &pkt.header, b"x")
        .unwrap()
        .checksum;
    assert_eq!(got, want);
}

#[test]
fn udp_zero_checksum_fwd_mode_forwards_it() {
    let xlat = Translator::new(
        Config {
            udp_cksum_mode: UdpCksumMode::Fwd,
            ..config()
        },
        table(false),
    );
    let mut buf = udp4([192, 0, 2, 10], [198, 51, 100, 5], 64, b"x");
    buf[26] = 0;
    buf[27] = 0;

    let frames = xlat.handle_ipv4(&mut buf);

    assert_eq!(frames.len(), 1);
    let out = frames[0].to_vec();
    assert_eq!(u16::from_be_bytes([out[46], out[47]]), 0);
}

#[test]
fn echo_to_translator_v4_is_answered() {
    let xlat = translator();
    let mut buf = Vec::new();
    PacketBuilder::ipv4([192, 0, 2, 10], LOCAL4.octets(), 64)
        .icmpv4_echo_request(7, 3)
        .write(&mut buf, b"are you there")
        .unwrap();

    let frames = xlat.handle_ipv4(&mut buf);

    assert_eq!(frames.len(), 1);
    let out = frames[0].to_vec();
    let pkt = parse4(&out).unwrap();
    let icmp = pkt.icmp.unwrap();

    assert_eq!(pkt.src(), LOCAL4);
    assert_eq!(pkt.dst(), Ipv4Addr::new(192, 0, 2, 10));
    assert_eq!((icmp.icmp_type, icmp.code), (0, 0));
    assert_eq!(icmp.word, 7 << 16 | 3);
    assert_eq!(&out[28..], b"are you there");
    assert_eq!(checksum::checksum(&out[20..]), 0, "ICMP checksum is valid");
}

#[test]
fn echo_to_translator_v6_is_answered() {
    let xlat = translator();
    let mut buf = Vec::new();
    PacketBuilder::ipv6(
        "2001:db8::77".parse::<Ipv6Addr>().unwrap().octets(),
        local6().octets(),
        64,
    )
    .icmpv6_echo_request(9, 4)
    .write(&mut buf, b"ping6")
    .unwrap();

    let frames = xlat.handle_ipv6(&mut buf);

    assert_eq!(frames.len(), 1);
    let out = frames[0].to_vec();
    let pkt = parse6(&out).unwrap();
    let icmp = pkt.icmp.unwrap();

    assert_eq!(pkt.src(), local6());
    assert_eq!((icmp.icmp_type, icmp.code), (129, 0));
    assert!(pkt.icmp_checksum_valid(&out));
    assert_eq!(&out[48..], b"ping6");
}

#[test]
fn non_icmp_to_translator_v4_is_protocol_unreachable() {
    let xlat = translator();
    let mut buf = udp4([192, 0, 2, 10], LOCAL4.octets(), 64, b"x");

    let frames = xlat.handle_ipv4(&mut buf);

    assert_eq!(frames.len(), 1);
    let pkt = parse4(&frames[0].to_vec()).unwrap();
    let icmp = pkt.icmp.unwrap();

    assert_eq!((icmp.icmp_type, icmp.code), (3, 2));
}

#[test]
fn routing_header_with_segments_left_gets_parameter_problem() {
    let xlat = translator();

    let inner = udp6("2001:db8::77", "64:ff9b::c633:6405", 64, b"x");
    let mut buf = inner[..40].to_vec();
    buf[6] = 43; // Routing header next
    buf[4..6].copy_from_slice(&((inner.len() - 40 + 8) as u16).to_be_bytes());
    buf.extend_from_slice(&[17, 0, 0, 1, 0, 0, 0, 0]); // segments left = 1
    buf.extend_from_slice(&inner[40..]);

    let frames = xlat.handle_ipv6(&mut buf);

    assert_eq!(frames.len(), 1);
    let pkt = parse6(&frames[0].to_vec()).unwrap();
    let icmp = pkt.icmp.unwrap();

    assert_eq!((icmp.icmp_type, icmp.code), (4, 0));
    assert_eq!(icmp.word, 43, "points at the segments-left byte");
}

#[test]
fn unmapped_v6_destination_is_unreachable() {
    let xlat = translator();
    let mut buf = udp6("2001:db8::77", "2001:db8:ffff::1", 64, b"x");

    let frames = xlat.handle_ipv6(&mut buf);

    assert_eq!(frames.len(), 1);
    let pkt = parse6(&frames[0].to_vec()).unwrap();
    let icmp = pkt.icmp.unwrap();

    assert_eq!((icmp.icmp_type, icmp.code), (1, 0));
    assert_eq!(xlat.stats().snapshot().rejected, 1);
}

#[test]
fn eam_host_reached_through_prefix_hairpins() {
    let xlat = translator();

    // 2001:db8::77 (EAM for 198.51.100.77) talks to its neighbour's
    // RFC 6052 form instead of its EAM form.
    let mut buf = udp6("2001:db8::77", "64:ff9b::c633:6458", 64, b"loop");

    let frames = xlat.handle_ipv6(&mut buf);

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].af, AddressFamily::V6, "stays on the v6 side");

    let out = frames[0].to_vec();
    let pkt = parse6(&out).unwrap();

    assert_eq!(pkt.dst(), "2001:db8::88".parse::<Ipv6Addr>().unwrap());
    assert_eq!(
        pkt.src(),
        "64:ff9b::c633:644d".parse::<Ipv6Addr>().unwrap(),
        "source is re-encoded under the prefix, not its EAM form"
    );
    assert_eq!(pkt.header.hop_limit, 63);

    // The shifted UDP checksum still verifies against the new pair.
    let want = UdpHeader::with_ipv6_checksum(5353, 53, &pkt.header, b"loop")
        .unwrap()
        .checksum;
    assert_eq!(u16::from_be_bytes([out[46], out[47]]), want);
    assert_eq!(xlat.stats().snapshot().hairpinned, 1);
}

#[test]
fn eam_to_eam_does_not_hairpin() {
    let xlat = translator();
    let mut buf = udp6("2001:db8::77", "2001:db8::88", 64, b"direct");

    let frames = xlat.handle_ipv6(&mut buf);

    // Destination resolved through the EAM itself, so this is a plain
    // 6->4 translation.
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].af, AddressFamily::V4);
    assert_eq!(xlat.stats().snapshot().hairpinned, 0);
}

#[test]
fn df_packet_exceeding_mtu_gets_fragmentation_needed() {
    let xlat = Translator::new(
        Config {
            mtu: 1280,
            ipv6_offlink_mtu: 1280,
            ..config()
        },
        table(false),
    );

    let payload = vec![0u8; 1300];
    let mut buf = udp4([192, 0, 2, 10], [198, 51, 100, 5], 64, &payload);
    buf[6] |= 0x40; // DF
    fix_ipv4_checksum(&mut buf);

    let frames = xlat.handle_ipv4(&mut buf);

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].af, AddressFamily::V4);

    let pkt = parse4(&frames[0].to_vec()).unwrap();
    let icmp = pkt.icmp.unwrap();

    assert_eq!((icmp.icmp_type, icmp.code), (3, 4));
    assert_eq!(icmp.word, 1280 - 20);
}

#[test]
fn nested_icmp_error_is_never_translated() {
    let xlat = translator();

    // A Destination Unreachable quoting another Destination Unreachable.
    let inner_quote = udp4([192, 0, 2, 10], [198, 51, 100, 5], 64, b"x");
    let mut inner = Vec::new();
    PacketBuilder::ipv4([192, 0, 2, 99], [192, 0, 2, 10], 64)
        .icmpv4(etherparse::Icmpv4Type::DestinationUnreachable(
            etherparse::icmpv4::DestUnreachableHeader::Host,
        ))
        .write(&mut inner, &inner_quote)
        .unwrap();

    let mut buf = Vec::new();
    PacketBuilder::ipv4([192, 0, 2, 98], [192, 0, 2, 10], 64)
        .icmpv4(etherparse::Icmpv4Type::DestinationUnreachable(
            etherparse::icmpv4::DestUnreachableHeader::Host,
        ))
        .write(&mut buf, &inner)
        .unwrap();

    let frames = xlat.handle_ipv4(&mut buf);

    assert!(frames.is_empty());
    assert_eq!(xlat.stats().snapshot().dropped, 1);
}

#[test]
fn ttl_exceeded_4to6_error_translation() {
    let xlat = translator();

    // A v4 router reports TTL exceeded for a datagram that was heading to
    // the v6 side.
    let quoted = udp4([192, 0, 2, 10], [198, 51, 100, 77], 1, b"expired");
    let mut buf = Vec::new();
    PacketBuilder::ipv4([192, 0, 2, 99], [192, 0, 2, 10], 64)
        .icmpv4(etherparse::Icmpv4Type::TimeExceeded(
            etherparse::icmpv4::TimeExceededCode::TtlExceededInTransit,
        ))
        .write(&mut buf, &quoted)
        .unwrap();

    let frames = xlat.handle_ipv4(&mut buf);

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].af, AddressFamily::V6);

    let out = frames[0].to_vec();
    let pkt = parse6(&out).unwrap();
    let icmp = pkt.icmp.unwrap();

    assert_eq!((icmp.icmp_type, icmp.code), (3, 0));
    assert!(pkt.icmp_checksum_valid(&out));

    // Embedded header: the quoted flow re-expressed in v6.
    let em = parse6(&out[48..]).unwrap();
    assert_eq!(em.src(), "64:ff9b::c000:20a".parse::<Ipv6Addr>().unwrap());
    assert_eq!(em.dst(), "2001:db8::77".parse::<Ipv6Addr>().unwrap());
}

fn fix_ipv4_checksum(buf: &mut [u8]) {
    buf[10] = 0;
    buf[11] = 0;
    let sum = checksum::checksum(&buf[..20]);
    buf[10..12].copy_from_slice(&sum.to_be_bytes());
}
