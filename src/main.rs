//! Minimal process entry point: build a [`flowtap::Driver`] from
//! environment-driven configuration and run it to completion against
//! whatever [`flowtap::PacketSource`] the caller's capture backend
//! provides.
//!
//! No live capture backend ships with this crate (out of scope, see
//! `SPEC_FULL.md`); this binary exists so the pipeline can be exercised and
//! so `cleanup()` runs on exit.

use flowtap::{CapturedPacket, Config, Driver, PacketSource};

/// A source with no packets, useful only to demonstrate that a driver
/// built from `Config::from_env` starts up, runs to completion, and
/// flushes cleanly with nothing captured.
struct EmptySource;

impl PacketSource for EmptySource {
    fn next_packet(&mut self) -> Option<CapturedPacket> {
        None
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "flowtap=info".into()),
        )
        .init();

    let config = Config::from_env("eth0");
    let mut driver = match Driver::new(&config) {
        Ok(driver) => driver,
        Err(err) => {
            tracing::error!(%err, "failed to start flowtap");
            std::process::exit(1);
        }
    };

    let mut source = EmptySource;
    driver.run(&mut source);
}
