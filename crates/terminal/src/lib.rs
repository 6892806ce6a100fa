//! Process sessions: one interactive shell per channel, running on a PTY.
//!
//! A session exposes line writes, a best-effort interrupt, a stream of
//! decoded output chunks, and a bounded ring buffer of recent output.

pub mod error;
pub mod pty;
pub mod ring;

pub use {
    error::{Error, Result},
    pty::{OutputEvent, ProcessHandle, ProcessSpawner, PtySpawner, SpawnOptions, SpawnedProcess},
    ring::OutputRing,
};
