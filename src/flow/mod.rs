//! Flow key/entry types and the rotating table pool.
//!
//! A flow is identified by a 5-tuple plus the administrative domain labels
//! assigned to each side by the [`crate::domain::DomainTrie`]. Two packets
//! belong to the same flow regardless of direction once
//! [`crate::localize::localize`] has canonicalized which side is "local".

pub mod pool;
pub mod table;

pub use pool::FlowTablePool;
pub use table::{FlowTable, HookOutcome};

/// Wall-clock seconds since the Unix epoch. Matches the original's use of
/// `time_t`/`gettimeofday().tv_sec` truncated to whole seconds.
pub type Timestamp = u32;

/// Direction a packet travels relative to the localized flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outbound = 0,
    Inbound = 1,
}

impl Direction {
    pub const COUNT: usize = 2;

    pub fn index(self) -> usize {
        self as usize
    }
}

/// 16-byte flow identity: protocol, endpoints, and domain labels.
///
/// Field order and widths are chosen so the struct is exactly 16 bytes with
/// no padding (2 + 1 + 1 + 4 + 4 + 2 + 2 = 16), mirroring the C
/// `pna_flowkey` layout closely enough that an all-zero `FlowKey` is a safe
/// "no flow" sentinel, matching the original's `null_key` comparison.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlowKey {
    pub l3_protocol: u16,
    pub l4_protocol: u8,
    pub _pad: u8,
    pub local_ip: u32,
    pub remote_ip: u32,
    pub local_port: u16,
    pub remote_port: u16,
    pub local_domain: u16,
    pub remote_domain: u16,
}

const _: () = assert!(std::mem::size_of::<FlowKey>() == 16);

impl FlowKey {
    /// True if this is the all-zero sentinel meaning "empty slot".
    pub fn is_null(&self) -> bool {
        *self == FlowKey::default()
    }

    /// Swap local/remote endpoints and domains in place, used when
    /// localization decides the packet's "local" side was on the wrong
    /// side of the key.
    pub fn swap_sides(&mut self) {
        std::mem::swap(&mut self.local_ip, &mut self.remote_ip);
        std::mem::swap(&mut self.local_port, &mut self.remote_port);
        std::mem::swap(&mut self.local_domain, &mut self.remote_domain);
    }
}

/// Per-direction counters and timestamps accumulated for one flow.
///
/// Counters are 32 bits, matching the wire record layout in `dump.rs`
/// exactly (6 key-ish fields + 2×packets + 2×bytes + 2×flags + 2
/// timestamps + protocol + dir + padding == 48 bytes).
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowData {
    pub packets: [u32; Direction::COUNT],
    pub bytes: [u32; Direction::COUNT],
    pub flags: [u16; Direction::COUNT],
    pub first_tstamp: Timestamp,
    pub last_tstamp: Timestamp,
    pub first_dir: u8,
}

/// One slot in a flow table: a key plus its accumulated data.
///
/// `FlowEntry::default()` — a null key and zeroed data — is the sentinel
/// for an empty slot, exactly as the original treats an all-zero
/// `flow_entry` as unused.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowEntry {
    pub key: FlowKey,
    pub data: FlowData,
}

impl FlowEntry {
    pub fn is_empty(&self) -> bool {
        self.key.is_null()
    }
}

/// Golden-ratio-prime multiplicative hash, folding a 32-bit value down to
/// `bits` bits. Used both for frame fragment fingerprints and for the
/// initial flow-table bucket index.
pub const GOLDEN_RATIO_PRIME_32: u32 = 0x9e37_0001;

pub fn hash_32(val: u32, bits: u32) -> u32 {
    debug_assert!(bits <= 32);
    if bits == 0 {
        return 0;
    }
    (val.wrapping_mul(GOLDEN_RATIO_PRIME_32)) >> (32 - bits)
}

/// Initial hash seed for a flow key, combining both endpoints and ports,
/// exactly as `flowmon_hook` computes `hash` before folding it with
/// `hash_32`.
pub fn seed_hash(key: &FlowKey) -> u32 {
    let mut hash = key.local_ip ^ key.remote_ip;
    hash ^= ((key.remote_port as u32) << 16) | key.local_port as u32;
    hash
}
