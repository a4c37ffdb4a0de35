//! Ethernet-frame decapsulation state machine.
//!
//! Walks Ethernet → (stacked) VLAN tags → IPv4 → transport header, producing
//! a [`FlowKey`] plus any TCP flags seen, or a [`DropReason`] explaining why
//! the packet was not accounted for. Generalized from `pna_main.c`'s
//! `pna_hook`/`ether_hook`/`ip_hook`, keeping the same protocol coverage and
//! the same depth bound against pathological VLAN/GRE stacking.

use crate::config::MAX_ENCAP_DEPTH;
use crate::flow::{FlowKey, Timestamp};
use crate::fragments::FragmentCache;

const ETHERTYPE_IP: u16 = 0x0800;
const ETHERTYPE_VLAN: u16 = 0x8100;
const ETH_HEADER_LEN: usize = 14;
const VLAN_TAG_LEN: usize = 4;
const IPV4_MIN_HEADER_LEN: usize = 20;

const PROTO_ICMP: u8 = 1;
const PROTO_IGRP: u8 = 88;
const PROTO_TCP: u8 = 6;
const PROTO_UDP: u8 = 17;
const PROTO_GRE: u8 = 47;
const PROTO_OSPF: u8 = 89;
const PROTO_PIM: u8 = 103;
const PROTO_SCTP: u8 = 132;

const IP_FLAG_MORE_FRAGMENTS: u16 = 0x2000;
const IP_FRAG_OFFSET_MASK: u16 = 0x1FFF;

/// Why a packet did not end up attributed to a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Frame too short to contain the header it claimed to have.
    Truncated,
    /// Ethertype is not IPv4 after unwrapping any VLAN tags.
    NotIpv4,
    /// More than [`MAX_ENCAP_DEPTH`] VLAN tags or GRE layers were stacked.
    EncapTooDeep,
    /// A protocol this accounting engine does not track (OSPF, IGRP, PIM,
    /// or GRE carrying routing information).
    UninterestingProtocol,
    /// A non-initial UDP fragment whose first fragment was never seen.
    FragmentCacheMiss,
    /// A non-initial TCP or SCTP fragment; these carry no transport header
    /// and are never reassembled.
    NonInitialFragment,
}

/// Outcome of decoding one captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    Accepted { key: FlowKey, flags: u16 },
    Dropped(DropReason),
}

/// Decode one Ethernet frame into a flow key, tracking IPv4 fragments
/// across calls via `fragments`.
pub fn decode(
    _frame_len: u32,
    _timestamp: Timestamp,
    bytes: &[u8],
    fragments: &mut FragmentCache,
) -> DecodeOutcome {
    if bytes.len() < ETH_HEADER_LEN {
        return DecodeOutcome::Dropped(DropReason::Truncated);
    }

    let mut offset = 12; // skip dst/src MAC, point at ethertype
    let mut ethertype = u16::from_be_bytes([bytes[offset], bytes[offset + 1]]);
    offset += 2;

    let mut depth = 0u32;
    while ethertype == ETHERTYPE_VLAN {
        if depth >= MAX_ENCAP_DEPTH {
            return DecodeOutcome::Dropped(DropReason::EncapTooDeep);
        }
        if bytes.len() < offset + VLAN_TAG_LEN {
            return DecodeOutcome::Dropped(DropReason::Truncated);
        }
        // Skip the 2-byte tag control field, ethertype follows.
        ethertype = u16::from_be_bytes([bytes[offset + 2], bytes[offset + 3]]);
        offset += VLAN_TAG_LEN;
        depth += 1;
    }

    if ethertype != ETHERTYPE_IP {
        return DecodeOutcome::Dropped(DropReason::NotIpv4);
    }

    decode_ipv4(bytes, offset, fragments, 0)
}

fn decode_ipv4(
    bytes: &[u8],
    offset: usize,
    fragments: &mut FragmentCache,
    depth: u32,
) -> DecodeOutcome {
    if depth >= MAX_ENCAP_DEPTH {
        return DecodeOutcome::Dropped(DropReason::EncapTooDeep);
    }
    if bytes.len() < offset + IPV4_MIN_HEADER_LEN {
        return DecodeOutcome::Dropped(DropReason::Truncated);
    }

    let l4_protocol = bytes[offset + 9];
    let src_ip = u32::from_be_bytes(bytes[offset + 12..offset + 16].try_into().unwrap());
    let dst_ip = u32::from_be_bytes(bytes[offset + 16..offset + 20].try_into().unwrap());
    let ip_id = u16::from_be_bytes([bytes[offset + 4], bytes[offset + 5]]);
    let flags_and_frag = u16::from_be_bytes([bytes[offset + 6], bytes[offset + 7]]);
    let frag_offset = flags_and_frag & IP_FRAG_OFFSET_MASK;
    let more_fragments = flags_and_frag & IP_FLAG_MORE_FRAGMENTS != 0;

    // Always advance a fixed 20 bytes regardless of IHL: IP options are
    // ignored by design, matching the original's fixed `sizeof(struct ip)`
    // advance rather than honoring a larger IHL.
    let payload = offset + IPV4_MIN_HEADER_LEN;

    let mut key = FlowKey {
        l3_protocol: ETHERTYPE_IP,
        l4_protocol,
        local_ip: src_ip,
        remote_ip: dst_ip,
        ..Default::default()
    };

    let (ports, flags) = match l4_protocol {
        PROTO_TCP => {
            if frag_offset != 0 {
                return DecodeOutcome::Dropped(DropReason::NonInitialFragment);
            }
            match decode_tcp_or_sctp_ports(bytes, payload, true) {
                Some(v) => v,
                None => return DecodeOutcome::Dropped(DropReason::Truncated),
            }
        }
        PROTO_SCTP => {
            if frag_offset != 0 {
                return DecodeOutcome::Dropped(DropReason::NonInitialFragment);
            }
            match decode_tcp_or_sctp_ports(bytes, payload, false) {
                Some(v) => v,
                None => return DecodeOutcome::Dropped(DropReason::Truncated),
            }
        }
        PROTO_UDP => {
            if frag_offset != 0 {
                match fragments.lookup(src_ip, dst_ip, l4_protocol, ip_id) {
                    Some((src_port, dst_port)) => ((src_port, dst_port), 0u16),
                    None => return DecodeOutcome::Dropped(DropReason::FragmentCacheMiss),
                }
            } else {
                if bytes.len() < payload + 4 {
                    return DecodeOutcome::Dropped(DropReason::Truncated);
                }
                let src_port = u16::from_be_bytes([bytes[payload], bytes[payload + 1]]);
                let dst_port = u16::from_be_bytes([bytes[payload + 2], bytes[payload + 3]]);
                if more_fragments {
                    fragments.insert(src_ip, dst_ip, l4_protocol, ip_id, src_port, dst_port);
                }
                ((src_port, dst_port), 0u16)
            }
        }
        PROTO_ICMP => {
            if bytes.len() < payload + 2 {
                return DecodeOutcome::Dropped(DropReason::Truncated);
            }
            let icmp_type = bytes[payload];
            let icmp_code = bytes[payload + 1];
            let dst_port = ((icmp_type as u16) << 8) | icmp_code as u16;
            ((0u16, dst_port), 0u16)
        }
        PROTO_GRE => return decode_gre(bytes, payload, fragments, depth),
        PROTO_OSPF | PROTO_IGRP | PROTO_PIM => {
            return DecodeOutcome::Dropped(DropReason::UninterestingProtocol)
        }
        _ => return DecodeOutcome::Dropped(DropReason::UninterestingProtocol),
    };

    key.local_port = ports.0;
    key.remote_port = ports.1;
    DecodeOutcome::Accepted { key, flags }
}

/// TCP and SCTP share a 4-byte port layout; only TCP also carries a flags
/// byte at offset 13, matching the original reading `tcphdr->th_flags`.
fn decode_tcp_or_sctp_ports(
    bytes: &[u8],
    payload: usize,
    has_flags: bool,
) -> Option<((u16, u16), u16)> {
    let min_len = if has_flags { 14 } else { 4 };
    if bytes.len() < payload + min_len {
        return None;
    }
    let src_port = u16::from_be_bytes([bytes[payload], bytes[payload + 1]]);
    let dst_port = u16::from_be_bytes([bytes[payload + 2], bytes[payload + 3]]);
    let flags = if has_flags {
        bytes[payload + 13] as u16
    } else {
        0
    };
    Some(((src_port, dst_port), flags))
}

/// GRE carries another layer 3 protocol; we only support an IPv4 payload
/// with no routing information present, recursing back into IPv4 decode
/// exactly as `ether_hook`'s GRE branch does.
fn decode_gre(
    bytes: &[u8],
    offset: usize,
    fragments: &mut FragmentCache,
    depth: u32,
) -> DecodeOutcome {
    if bytes.len() < offset + 4 {
        return DecodeOutcome::Dropped(DropReason::Truncated);
    }
    let flags = u16::from_be_bytes([bytes[offset], bytes[offset + 1]]);
    let protocol = u16::from_be_bytes([bytes[offset + 2], bytes[offset + 3]]);

    const GRE_ROUTING_PRESENT: u16 = 0x4000;
    const GRE_CHECKSUM_PRESENT: u16 = 0x8000;
    const GRE_KEY_PRESENT: u16 = 0x2000;
    const GRE_SEQUENCE_PRESENT: u16 = 0x1000;

    if flags & GRE_ROUTING_PRESENT != 0 {
        return DecodeOutcome::Dropped(DropReason::UninterestingProtocol);
    }

    let mut pad = 0usize;
    if flags & GRE_CHECKSUM_PRESENT != 0 {
        pad += 4;
    }
    if flags & GRE_KEY_PRESENT != 0 {
        pad += 4;
    }
    if flags & GRE_SEQUENCE_PRESENT != 0 {
        pad += 4;
    }

    let inner_offset = offset + 4 + pad;
    if protocol != ETHERTYPE_IP {
        return DecodeOutcome::Dropped(DropReason::NotIpv4);
    }
    decode_ipv4(bytes, inner_offset, fragments, depth + 1)
}
