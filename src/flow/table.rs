//! A single flow table: fixed-size open-addressed storage with quadratic
//! probing, guarded by one `Mutex` per table.
//!
//! Grounded in the Mutex-guarded shared-state pattern used for per-process
//! limiter state elsewhere in this codebase, generalized from a hash map to
//! a fixed-capacity probe table sized by a bit count instead of growing
//! dynamically — the original never resizes a flow table at runtime.

use std::sync::Mutex;

use crate::config::PROBE_BUDGET;
use crate::flow::{seed_hash, hash_32, Direction, FlowEntry, FlowKey, Timestamp};

/// Result of attempting to record a packet against a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    /// A new flow was created.
    Inserted,
    /// An existing flow's counters were updated.
    Updated,
    /// The probe budget was exhausted without finding a match or a free
    /// slot; the packet's counters are lost (counted in `nflows_missed`).
    Dropped,
}

/// Mutable state guarded by the table's mutex: entries plus the metadata
/// needed to decide when the table is due for rotation.
struct TableState {
    entries: Box<[FlowEntry]>,
    dirty: bool,
    first_sec: Timestamp,
    nflows: u64,
    nflows_missed: u64,
    /// `probes[i]` counts how many `hook()` calls needed exactly `i+1`
    /// probes to find a match or a free slot, mirroring the original's
    /// `info->probes[i]++` observability counter.
    probes: [u64; PROBE_BUDGET],
}

/// One fixed-capacity flow table of `2^bits` slots.
pub struct FlowTable {
    bits: u32,
    state: Mutex<TableState>,
}

impl FlowTable {
    pub fn new(bits: u32) -> Self {
        let capacity = 1usize << bits;
        Self {
            bits,
            state: Mutex::new(TableState {
                entries: vec![FlowEntry::default(); capacity].into_boxed_slice(),
                dirty: false,
                first_sec: 0,
                nflows: 0,
                nflows_missed: 0,
                probes: [0u64; PROBE_BUDGET],
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        1usize << self.bits
    }

    /// Record one packet's worth of data for `key`, creating a new flow if
    /// none matches, following the original `flowmon_hook` quadratic-probe
    /// sequence: `hash_0 + ((i + i*i) / 2)`, masked to the table size.
    pub fn hook(
        &self,
        key: FlowKey,
        dir: Direction,
        flags: u16,
        pkt_len_with_overhead: u32,
        ts: Timestamp,
    ) -> HookOutcome {
        let mask = self.capacity() as u32 - 1;
        let hash_0 = hash_32(seed_hash(&key), self.bits);

        let mut state = self.state.lock().unwrap();
        if !state.dirty {
            state.first_sec = ts;
            state.dirty = true;
        }

        for i in 0u32..PROBE_BUDGET as u32 {
            let slot = ((hash_0.wrapping_add((i + i * i) / 2)) & mask) as usize;
            let entry = &mut state.entries[slot];

            if entry.key == key {
                let d = dir.index();
                entry.data.bytes[d] = entry.data.bytes[d].wrapping_add(pkt_len_with_overhead);
                entry.data.packets[d] = entry.data.packets[d].wrapping_add(1);
                entry.data.flags[d] |= flags;
                entry.data.last_tstamp = ts;
                state.probes[i as usize] += 1;
                return HookOutcome::Updated;
            }

            if entry.key.is_null() {
                entry.key = key;
                let d = dir.index();
                entry.data.bytes[d] = entry.data.bytes[d].wrapping_add(pkt_len_with_overhead);
                entry.data.packets[d] = entry.data.packets[d].wrapping_add(1);
                entry.data.flags[d] |= flags;
                entry.data.first_tstamp = ts;
                entry.data.last_tstamp = ts;
                entry.data.first_dir = dir.index() as u8;
                state.nflows += 1;
                state.probes[i as usize] += 1;
                return HookOutcome::Inserted;
            }
        }

        state.nflows_missed += 1;
        HookOutcome::Dropped
    }

    /// True if the table has recorded at least one flow since its last
    /// clear.
    pub fn is_dirty(&self) -> bool {
        self.state.lock().unwrap().dirty
    }

    /// Timestamp the table first became dirty, or 0 if clean.
    pub fn first_sec(&self) -> Timestamp {
        self.state.lock().unwrap().first_sec
    }

    /// Try to lock and, if dirty, extract a snapshot of all non-empty
    /// entries and reset the table to a clean state. Returns `None` if
    /// another thread currently holds the lock (used by the pool to skip a
    /// table rather than block).
    pub fn try_take_snapshot(&self) -> Option<Vec<FlowEntry>> {
        let mut state = self.state.try_lock().ok()?;
        if !state.dirty {
            return None;
        }
        let snapshot: Vec<FlowEntry> = state
            .entries
            .iter()
            .copied()
            .filter(|e| !e.is_empty())
            .collect();
        for entry in state.entries.iter_mut() {
            *entry = FlowEntry::default();
        }
        state.dirty = false;
        state.first_sec = 0;
        state.nflows = 0;
        state.nflows_missed = 0;
        state.probes = [0u64; PROBE_BUDGET];
        Some(snapshot)
    }

    pub fn nflows(&self) -> u64 {
        self.state.lock().unwrap().nflows
    }

    pub fn nflows_missed(&self) -> u64 {
        self.state.lock().unwrap().nflows_missed
    }

    /// Per-probe-depth histogram: `probe_histogram()[i]` counts how many
    /// `hook()` calls resolved after exactly `i+1` probes.
    pub fn probe_histogram(&self) -> [u64; PROBE_BUDGET] {
        self.state.lock().unwrap().probes
    }
}
