//! Real-time monitor hook.
//!
//! The original ships a pluggable monitor framework (`pna_rtmon.c`) whose
//! static table has always held exactly one sentinel entry with a null
//! hook, so the iteration loop never actually calls anything. We keep the
//! seam — a driver can register monitors that see every accepted packet —
//! but ship it empty, matching the original's observed behavior exactly
//! rather than inventing monitors nobody asked for.

use crate::flow::{Direction, FlowKey, Timestamp};

/// A monitor observes accepted packets after localization, alongside the
/// flow table hook. Mirrors the original's `struct pna_rtmon` callback
/// shape (`init`/`hook`/`clean`/`release`) collapsed into trait methods.
pub trait RealTimeMonitor: Send + Sync {
    fn hook(&self, key: &FlowKey, dir: Direction, flags: u16, ts: Timestamp);
}

/// Ordered list of registered monitors, empty by default.
#[derive(Default)]
pub struct MonitorRegistry {
    monitors: Vec<Box<dyn RealTimeMonitor>>,
}

impl MonitorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, monitor: Box<dyn RealTimeMonitor>) {
        self.monitors.push(monitor);
    }

    /// Call every registered monitor's hook. A no-op when the registry is
    /// empty, exactly as the original's loop body is never reached.
    pub fn hook(&self, key: &FlowKey, dir: Direction, flags: u16, ts: Timestamp) {
        for monitor in &self.monitors {
            monitor.hook(key, dir, flags, ts);
        }
    }
}
