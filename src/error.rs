//! Crate-wide error type.
//!
//! `FlowError` covers the startup-fatal failure domains: bad configuration
//! (an unparseable network prefix, an unreadable networks file, an invalid
//! bit count) and I/O failure building the pipeline. Per-packet drops are
//! never represented here — the hot path returns a small tagged result
//! instead (see [`crate::decode::DecodeOutcome`] and
//! [`crate::flow::HookOutcome`]); a startup error and "this packet didn't
//! parse" are different failure domains with different handling.

/// Fatal error raised while assembling the pipeline (trie, config, tables).
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// A malformed network prefix line, missing netid, or unreadable
    /// networks file.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O failure opening a networks file or a log directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
