//! Channel sessions: one agent process per chat channel.
//!
//! The [`ChannelRegistry`] keeps at most one command in flight per channel,
//! queues the rest in order, and turns what the stream parser finds in the
//! process output into state changes and [`SessionEvent`]s.

pub mod command;
pub mod error;
pub mod event;
pub mod registry;
pub mod session;

pub use {
    command::{CommandLine, build_command, escape_payload, is_plain_word},
    error::{Error, Result},
    event::{EventSink, SessionEvent, SinkApprovalNotifier},
    registry::{ChannelRegistry, RegistryOptions},
    session::{DispatchTicket, PendingPrompt, QueuedCommand, SessionSnapshot},
};
