//! Rotating pool of flow tables.
//!
//! Generalizes the original `flowtab_get`/`flowmon_hook` pairing: pick a
//! table to write into, rotating past ones that are due for a dump, and
//! skipping ones currently held by a concurrent dumper rather than
//! blocking on them.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::TABLE_ROLLOVER_SECS;
use crate::flow::table::{FlowTable, HookOutcome};
use crate::flow::{Direction, FlowEntry, FlowKey, Timestamp};

/// A fixed set of flow tables rotated through as each fills or ages out.
///
/// The original additionally retries a `pthread_mutex_trylock` across every
/// table before giving up and counts "lock misses" when all are busy. This
/// crate has a single packet-processing thread hooking into the pool (see
/// spec §5), so that contention can never actually occur here; the pool
/// still exposes the same rotate-or-use-current shape without the trylock
/// fan-out, documented as a deliberate simplification rather than a
/// behavior change visible to any flow accounting outcome.
pub struct FlowTablePool {
    tables: Vec<FlowTable>,
    current: AtomicUsize,
}

impl FlowTablePool {
    pub fn new(num_tables: usize, bits: u32) -> Self {
        assert!(num_tables > 0, "a flow table pool needs at least one table");
        Self {
            tables: (0..num_tables).map(|_| FlowTable::new(bits)).collect(),
            current: AtomicUsize::new(0),
        }
    }

    pub fn num_tables(&self) -> usize {
        self.tables.len()
    }

    /// Decide whether the table at `idx` is due for rotation at time `ts`,
    /// mirroring the original's `ten_bound || too_old` condition exactly.
    fn due_for_rotation(table: &FlowTable, ts: Timestamp) -> bool {
        if !table.is_dirty() {
            return false;
        }
        let first_sec = table.first_sec();
        let ten_bound = ts % 10 == 0 && ts != first_sec;
        let too_old = ts.saturating_sub(first_sec) >= TABLE_ROLLOVER_SECS;
        ten_bound || too_old
    }

    /// Record one packet against whichever table is currently live,
    /// rotating to the next table first if the live one is due for a dump.
    /// `on_rotate` is called with the table index and its snapshot when a
    /// rotation occurs, so the caller can hand the data to the dumper.
    pub fn hook(
        &self,
        key: FlowKey,
        dir: Direction,
        flags: u16,
        pkt_len_with_overhead: u32,
        ts: Timestamp,
        mut on_rotate: impl FnMut(usize, Vec<FlowEntry>),
    ) -> HookOutcome {
        let n = self.tables.len();
        let mut idx = self.current.load(Ordering::Acquire) % n;

        if Self::due_for_rotation(&self.tables[idx], ts) {
            if let Some(snapshot) = self.tables[idx].try_take_snapshot() {
                on_rotate(idx, snapshot);
            }
            idx = (idx + 1) % n;
            self.current.store(idx, Ordering::Release);
        }

        self.tables[idx].hook(key, dir, flags, pkt_len_with_overhead, ts)
    }

    /// Flush every table unconditionally, regardless of rotation timing —
    /// used at shutdown so no in-flight data is lost.
    pub fn flush_all(&self, mut dumper: impl FnMut(usize, Vec<FlowEntry>)) {
        for (idx, table) in self.tables.iter().enumerate() {
            if let Some(snapshot) = table.try_take_snapshot() {
                dumper(idx, snapshot);
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(local_port: u16) -> FlowKey {
        FlowKey {
            l3_protocol: 0x0800,
            l4_protocol: 6,
            local_ip: 1,
            remote_ip: 2,
            local_port,
            remote_port: 9,
            local_domain: 1,
            remote_domain: 0xFFFF,
            ..Default::default()
        }
    }

    #[test]
    fn test_new_pool_starts_on_table_zero() {
        let pool = FlowTablePool::new(2, 8);
        assert_eq!(pool.num_tables(), 2);
    }

    #[test]
    fn test_hook_inserts_into_current_table() {
        let pool = FlowTablePool::new(2, 8);
        let outcome = pool.hook(key(1), Direction::Outbound, 0, 100, 5, |_, _| {});
        assert_eq!(outcome, HookOutcome::Inserted);
    }

    #[test]
    fn test_rotation_on_too_old_dumps_and_advances() {
        let pool = FlowTablePool::new(2, 8);
        pool.hook(key(1), Direction::Outbound, 0, 100, 1, |_, _| {});

        let mut dumped = Vec::new();
        pool.hook(key(2), Direction::Outbound, 0, 100, 12, |idx, snap| {
            dumped.push((idx, snap.len()));
        });

        assert_eq!(dumped, vec![(0, 1)]);
    }

    #[test]
    fn test_no_rotation_when_not_dirty() {
        let pool = FlowTablePool::new(2, 8);
        let mut rotated = false;
        pool.hook(key(1), Direction::Outbound, 0, 100, 100, |_, _| {
            rotated = true;
        });
        assert!(!rotated);
    }

    #[test]
    fn test_flush_all_drains_dirty_tables() {
        let pool = FlowTablePool::new(2, 8);
        pool.hook(key(1), Direction::Outbound, 0, 100, 1, |_, _| {});

        let mut flushed = Vec::new();
        pool.flush_all(|idx, snap| flushed.push((idx, snap.len())));
        assert_eq!(flushed, vec![(0, 1)]);

        // A second flush finds nothing left dirty.
        let mut flushed_again = Vec::new();
        pool.flush_all(|idx, snap| flushed_again.push((idx, snap.len())));
        assert!(flushed_again.is_empty());
    }

    #[test]
    fn test_ten_bound_rotation_triggers_at_exact_multiple_of_ten() {
        let pool = FlowTablePool::new(2, 8);
        pool.hook(key(1), Direction::Outbound, 0, 100, 3, |_, _| {});

        let mut dumped = false;
        pool.hook(key(2), Direction::Outbound, 0, 100, 10, |_, _| {
            dumped = true;
        });
        assert!(dumped, "ts % 10 == 0 and ts != first_sec should force rotation");
    }
}
