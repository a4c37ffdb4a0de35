//! Canonicalizes which side of a flow key is "local", so that traffic in
//! both directions of a conversation accumulates into the same table slot.
//!
//! Direct generalization of `pna_localize`: compare the two sides'
//! administrative domain labels, preferring the numerically smaller one as
//! local; fall back to comparing IP addresses when both sides carry the
//! same label, and drop the packet entirely when neither side has a known
//! domain.

use crate::config::UNKNOWN_DOMAIN;
use crate::domain::DomainTrie;
use crate::flow::{Direction, FlowKey};

/// Look up both endpoints' domains and canonicalize `key` in place.
///
/// Returns the direction the *original* packet traveled relative to the
/// canonicalized key, or `None` if the packet should be dropped (neither
/// side belongs to a known administrative domain).
pub fn localize(key: &mut FlowKey, trie: &DomainTrie) -> Option<Direction> {
    key.local_domain = trie.lookup(key.local_ip);
    key.remote_domain = trie.lookup(key.remote_ip);

    if key.local_domain == key.remote_domain {
        if key.local_domain == UNKNOWN_DOMAIN {
            return None;
        }
        // Tie-break by IP address when both sides share a domain label.
        if key.local_ip < key.remote_ip {
            return Some(Direction::Outbound);
        }
        key.swap_sides();
        return Some(Direction::Inbound);
    }

    if key.local_domain < key.remote_domain {
        Some(Direction::Outbound)
    } else {
        key.swap_sides();
        Some(Direction::Inbound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(local_ip: u32, remote_ip: u32) -> FlowKey {
        FlowKey {
            l3_protocol: 0x0800,
            l4_protocol: 6,
            local_ip,
            remote_ip,
            local_port: 1,
            remote_port: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_smaller_domain_is_local_outbound() {
        let mut trie = DomainTrie::new();
        trie.add(10, 32, 1).unwrap();
        trie.add(20, 32, 5).unwrap();
        let mut k = key(10, 20);
        let dir = localize(&mut k, &trie);
        assert_eq!(dir, Some(Direction::Outbound));
        assert_eq!(k.local_ip, 10);
        assert_eq!(k.remote_ip, 20);
    }

    #[test]
    fn test_larger_local_domain_swaps_and_is_inbound() {
        let mut trie = DomainTrie::new();
        trie.add(10, 32, 5).unwrap();
        trie.add(20, 32, 1).unwrap();
        let mut k = key(10, 20);
        let dir = localize(&mut k, &trie);
        assert_eq!(dir, Some(Direction::Inbound));
        assert_eq!(k.local_ip, 20);
        assert_eq!(k.remote_ip, 10);
    }

    #[test]
    fn test_both_unknown_is_dropped() {
        let trie = DomainTrie::new();
        let mut k = key(10, 20);
        assert_eq!(localize(&mut k, &trie), None);
    }

    #[test]
    fn test_tie_breaks_by_ip_address() {
        let mut trie = DomainTrie::new();
        trie.add(0, 1, 1).unwrap(); // 0.0.0.0/1 covers everything with top bit 0
        let mut k = key(10, 20);
        let dir = localize(&mut k, &trie);
        assert_eq!(dir, Some(Direction::Outbound));
        assert_eq!(k.local_ip, 10);

        let mut k2 = key(20, 10);
        let dir2 = localize(&mut k2, &trie);
        assert_eq!(dir2, Some(Direction::Inbound));
        assert_eq!(k2.local_ip, 10);
    }

    #[test]
    fn test_domains_are_recorded_on_key() {
        let mut trie = DomainTrie::new();
        trie.add(10, 32, 3).unwrap();
        let mut k = key(10, 20);
        localize(&mut k, &trie);
        assert_eq!(k.local_domain, 3);
        assert_eq!(k.remote_domain, UNKNOWN_DOMAIN);
    }
}
