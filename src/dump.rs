//! Binary flow-log writer.
//!
//! Produces the same fixed-width wire format as the original `dump_table.c`:
//! a 16-byte header followed by one 48-byte record per accounted flow, host
//! byte order, no endian marker. Grounded in the header/record layout from
//! `pna.h` (`pna_log_hdr`, `pna_log_entry`).

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::flow::{Direction, FlowEntry, Timestamp};

const LOG_MAGIC: [u8; 3] = *b"PNA";
const LOG_VERSION: u8 = 2;

/// On-disk header preceding a table's flow records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogHeader {
    pub magic: [u8; 3],
    pub version: u8,
    pub start_time: u32,
    pub end_time: u32,
    pub size: u32,
}

const HEADER_LEN: usize = 16;
const RECORD_LEN: usize = 48;

impl LogHeader {
    fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..3].copy_from_slice(&self.magic);
        buf[3] = self.version;
        buf[4..8].copy_from_slice(&self.start_time.to_ne_bytes());
        buf[8..12].copy_from_slice(&self.end_time.to_ne_bytes());
        buf[12..16].copy_from_slice(&self.size.to_ne_bytes());
        buf
    }
}

/// Counts returned after a successful dump, for logging/metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpStats {
    pub flows_written: usize,
    pub bytes_written: u64,
}

fn entry_to_bytes(entry: &FlowEntry) -> [u8; RECORD_LEN] {
    let mut buf = [0u8; RECORD_LEN];
    let mut w = 0;
    macro_rules! put {
        ($bytes:expr) => {{
            let b = $bytes;
            buf[w..w + b.len()].copy_from_slice(&b);
            w += b.len();
        }};
    }
    put!(entry.key.local_ip.to_ne_bytes());
    put!(entry.key.remote_ip.to_ne_bytes());
    put!(entry.key.local_port.to_ne_bytes());
    put!(entry.key.remote_port.to_ne_bytes());
    put!(entry.key.local_domain.to_ne_bytes());
    put!(entry.key.remote_domain.to_ne_bytes());
    put!(entry.data.packets[Direction::Outbound.index()].to_ne_bytes());
    put!(entry.data.packets[Direction::Inbound.index()].to_ne_bytes());
    put!(entry.data.bytes[Direction::Outbound.index()].to_ne_bytes());
    put!(entry.data.bytes[Direction::Inbound.index()].to_ne_bytes());
    put!(entry.data.flags[Direction::Outbound.index()].to_ne_bytes());
    put!(entry.data.flags[Direction::Inbound.index()].to_ne_bytes());
    put!(entry.data.first_tstamp.to_ne_bytes());
    put!(entry.data.last_tstamp.to_ne_bytes());
    buf[w] = entry.key.l4_protocol;
    w += 1;
    buf[w] = entry.data.first_dir;
    w += 1;
    // remaining 2 bytes are padding, already zeroed.
    debug_assert!(w + 2 == RECORD_LEN);
    buf
}

/// Write `entries` to `path` in the fixed binary log format, skipping empty
/// slots. `start_time`/`end_time` bracket the dump itself, not the table's
/// accounting window, matching the original's `time(NULL)` calls around
/// the write loop.
///
/// Unlike the original (which opens with `O_CREAT | O_RDWR` and never
/// truncates, so a filename collision corrupts the file with a stale
/// tail), this truncates on create — a deliberate fix, not a format change.
pub fn dump_table(
    entries: &[FlowEntry],
    path: &Path,
    start_time: Timestamp,
    end_time: Timestamp,
) -> std::io::Result<DumpStats> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    let mut writer = BufWriter::with_capacity(1 << 20, file);

    let live: Vec<&FlowEntry> = entries.iter().filter(|e| !e.is_empty()).collect();
    let size = (live.len() * RECORD_LEN) as u32;

    let header = LogHeader {
        magic: LOG_MAGIC,
        version: LOG_VERSION,
        start_time,
        end_time,
        size,
    };
    writer.write_all(&header.to_bytes())?;

    for entry in &live {
        writer.write_all(&entry_to_bytes(entry))?;
    }
    writer.flush()?;

    Ok(DumpStats {
        flows_written: live.len(),
        bytes_written: (HEADER_LEN as u64) + size as u64,
    })
}

/// Build the log file path for one table's dump, following the original's
/// `pna-%Y%m%d%H%M%S-<source>.t<table_id>.log` naming, with the dump-start
/// timestamp reported one second earlier — the original computes the
/// filename timestamp as `gettimeofday()` minus one second, and this is
/// kept as specified rather than switched to the table's `first_sec`.
pub fn log_file_path(
    log_dir: &Path,
    dump_started_at: Timestamp,
    source: &str,
    table_id: usize,
) -> PathBuf {
    let filename_time = dump_started_at.saturating_sub(1);
    let formatted = format_utc_compact(filename_time);
    log_dir.join(format!("pna-{formatted}-{source}.t{table_id}.log"))
}

/// Minimal `%Y%m%d%H%M%S` UTC formatter over seconds-since-epoch, avoiding a
/// chrono/time dependency the rest of this crate has no other use for.
fn format_utc_compact(epoch_secs: Timestamp) -> String {
    const SECS_PER_DAY: i64 = 86_400;
    let secs = epoch_secs as i64;
    let days = secs.div_euclid(SECS_PER_DAY);
    let time_of_day = secs.rem_euclid(SECS_PER_DAY);

    let (year, month, day) = civil_from_days(days);
    let hour = time_of_day / 3600;
    let minute = (time_of_day % 3600) / 60;
    let second = time_of_day % 60;

    format!("{year:04}{month:02}{day:02}{hour:02}{minute:02}{second:02}")
}

/// Howard Hinnant's days-from-civil algorithm, inverted: days since the
/// Unix epoch to a proleptic-Gregorian (year, month, day).
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = if m <= 2 { y + 1 } else { y };
    (year, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowKey;

    fn entry(local_ip: u32, local_port: u16) -> FlowEntry {
        let mut e = FlowEntry {
            key: FlowKey {
                local_ip,
                remote_ip: 99,
                local_port,
                remote_port: 443,
                local_domain: 1,
                remote_domain: 2,
                l4_protocol: 6,
                ..Default::default()
            },
            ..Default::default()
        };
        e.data.packets[0] = 10;
        e.data.bytes[0] = 1500;
        e.data.first_tstamp = 100;
        e.data.last_tstamp = 200;
        e
    }

    #[test]
    fn test_record_is_48_bytes() {
        assert_eq!(entry_to_bytes(&entry(1, 1)).len(), RECORD_LEN);
    }

    #[test]
    fn test_dump_empty_slice_writes_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.log");
        let stats = dump_table(&[], &path, 1000, 1001).unwrap();
        assert_eq!(stats.flows_written, 0);
        assert_eq!(stats.bytes_written, HEADER_LEN as u64);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), HEADER_LEN as u64);
    }

    #[test]
    fn test_dump_skips_empty_slots_and_writes_header_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flows.log");
        let entries = vec![FlowEntry::default(), entry(1, 1), FlowEntry::default(), entry(2, 2)];
        let stats = dump_table(&entries, &path, 5000, 5010).unwrap();
        assert_eq!(stats.flows_written, 2);

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + 2 * RECORD_LEN);
        assert_eq!(&bytes[0..3], b"PNA");
        assert_eq!(bytes[3], LOG_VERSION);
        assert_eq!(u32::from_ne_bytes(bytes[4..8].try_into().unwrap()), 5000);
        assert_eq!(u32::from_ne_bytes(bytes[8..12].try_into().unwrap()), 5010);
        assert_eq!(
            u32::from_ne_bytes(bytes[12..16].try_into().unwrap()),
            (2 * RECORD_LEN) as u32
        );
    }

    #[test]
    fn test_dump_truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reused.log");
        dump_table(&[entry(1, 1), entry(2, 2), entry(3, 3)], &path, 1, 2).unwrap();
        let stats = dump_table(&[entry(1, 1)], &path, 3, 4).unwrap();
        assert_eq!(stats.flows_written, 1);
        assert_eq!(
            std::fs::metadata(&path).unwrap().len(),
            (HEADER_LEN + RECORD_LEN) as u64
        );
    }

    #[test]
    fn test_log_file_path_subtracts_one_second_and_uses_table_id() {
        let dir = Path::new("/var/log/pna");
        // 2024-01-02T03:04:06Z in epoch seconds, minus one second => :05
        let ts: Timestamp = 1_704_164_646;
        let path = log_file_path(dir, ts, "eth0", 1);
        assert_eq!(
            path,
            dir.join("pna-20240102030405-eth0.t1.log")
        );
    }

    #[test]
    fn test_civil_from_days_epoch() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
    }
}
