//! Binary radix trie mapping IPv4 addresses to administrative domain ids.
//!
//! A direct generalization of the original `pna_domain_trie.c`: a bit-at-a-
//! time walk from the MSB, recording the deepest node flagged as a prefix
//! boundary as the best match found so far.

use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

use crate::config::UNKNOWN_DOMAIN;
use crate::error::FlowError;

struct TrieNode {
    domain_id: u16,
    is_prefix: bool,
    children: [Option<Box<TrieNode>>; 2],
}

impl TrieNode {
    fn new() -> Self {
        Self {
            domain_id: UNKNOWN_DOMAIN,
            is_prefix: false,
            children: [None, None],
        }
    }
}

/// Longest-prefix-match trie from IPv4 network prefix to domain id.
pub struct DomainTrie {
    root: Box<TrieNode>,
}

impl Default for DomainTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl DomainTrie {
    pub fn new() -> Self {
        Self {
            root: Box::new(TrieNode::new()),
        }
    }

    /// Insert one `prefix/max_bit_pos -> domain_id` mapping. `max_bit_pos`
    /// counts from 1 (a `/1` covers half of address space) through 32 (a
    /// host route); any low-order bits of `prefix` beyond `max_bit_pos` are
    /// masked off silently, exactly as the original does rather than
    /// rejecting the input. `domain_id` must be non-zero: domain 0 would be
    /// indistinguishable from an unset `FlowKey::local_domain`/
    /// `remote_domain` field, colliding with the all-zero empty-slot
    /// sentinel in `flow/table.rs`.
    pub fn add(&mut self, prefix: u32, max_bit_pos: u8, domain_id: u16) -> Result<(), FlowError> {
        if max_bit_pos == 0 || max_bit_pos > 32 {
            return Err(FlowError::Config(format!(
                "prefix length {max_bit_pos} out of range 1..=32"
            )));
        }
        if domain_id == 0 {
            return Err(FlowError::Config("netid must be non-zero".to_string()));
        }

        let mask: u32 = if max_bit_pos == 32 {
            u32::MAX
        } else {
            !((1u32 << (32 - max_bit_pos)) - 1)
        };
        let masked = prefix & mask;

        let mut node = &mut self.root;
        for bit_pos in 0..max_bit_pos {
            let bit = ((masked >> (31 - bit_pos)) & 1) as usize;
            node = node.children[bit].get_or_insert_with(|| Box::new(TrieNode::new()));
        }
        node.is_prefix = true;
        node.domain_id = domain_id;
        Ok(())
    }

    /// Parse one line of the form `ip/prefix_len` or `ip/prefix_len/netid`,
    /// exactly as `pna_dtrie_parse` tokenizes on `/` and whitespace.
    /// `explicit_netid` is required when the line carries only two tokens.
    pub fn parse(&mut self, line: &str, explicit_netid: Option<u16>) -> Result<(), FlowError> {
        let tokens: Vec<&str> = line.split(['/', '\n']).map(str::trim).filter(|t| !t.is_empty()).collect();

        if tokens.len() < 2 {
            return Err(FlowError::Config(format!(
                "malformed network line: {line:?}"
            )));
        }

        let ip: Ipv4Addr = tokens[0]
            .parse()
            .map_err(|_| FlowError::Config(format!("bad IPv4 address: {:?}", tokens[0])))?;
        let prefix_len: u8 = tokens[1]
            .parse()
            .map_err(|_| FlowError::Config(format!("bad prefix length: {:?}", tokens[1])))?;

        let netid = if tokens.len() >= 3 {
            tokens[2]
                .parse()
                .map_err(|_| FlowError::Config(format!("bad netid: {:?}", tokens[2])))?
        } else {
            explicit_netid.ok_or_else(|| {
                FlowError::Config(format!("line {line:?} has no netid and none was supplied"))
            })?
        };

        self.add(u32::from(ip), prefix_len, netid)
    }

    /// Parse a bare CIDR or space-separated CIDR list, assigning sequential
    /// netids starting at `starting_id`, mirroring `add_networks`'
    /// `strtok_r`-on-spaces loop over `-N` arguments. Returns the next free
    /// netid after the ones consumed.
    pub fn parse_sequential(&mut self, networks: &str, starting_id: u16) -> Result<u16, FlowError> {
        let mut next_id = starting_id;
        for cidr in networks.split_whitespace() {
            let (addr, len) = cidr
                .split_once('/')
                .ok_or_else(|| FlowError::Config(format!("expected CIDR, got {cidr:?}")))?;
            let ip: Ipv4Addr = addr
                .parse()
                .map_err(|_| FlowError::Config(format!("bad IPv4 address: {addr:?}")))?;
            let prefix_len: u8 = len
                .parse()
                .map_err(|_| FlowError::Config(format!("bad prefix length: {len:?}")))?;
            self.add(u32::from(ip), prefix_len, next_id)?;
            next_id += 1;
        }
        Ok(next_id)
    }

    /// Load and parse an entire networks file, skipping comment (`#`) and
    /// blank lines exactly as `pna_dtrie_build` does.
    pub fn build(&mut self, path: &Path) -> Result<(), FlowError> {
        let contents = fs::read_to_string(path)?;
        for line in contents.lines() {
            if line.is_empty() || line.starts_with('#') || line.starts_with(' ') {
                continue;
            }
            self.parse(line, None)?;
        }
        Ok(())
    }

    /// Longest-prefix-match lookup. Returns [`UNKNOWN_DOMAIN`] if no prefix
    /// in the trie covers `ip`.
    pub fn lookup(&self, ip: u32) -> u16 {
        let mut node = self.root.as_ref();
        let mut best = UNKNOWN_DOMAIN;
        if node.is_prefix {
            best = node.domain_id;
        }

        for bit_pos in 0..32u8 {
            let bit = ((ip >> (31 - bit_pos)) & 1) as usize;
            match &node.children[bit] {
                Some(child) => {
                    node = child;
                    if node.is_prefix {
                        best = node.domain_id;
                    }
                }
                None => break,
            }
        }

        best
    }
}
