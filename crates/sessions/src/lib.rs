//! Durable resume-id storage.
//!
//! Each channel's conversation continuation token is kept in a single JSON
//! file (`channel id -> entry`) that is loaded at startup and rewritten in
//! full whenever an id is captured or cleared.

pub mod error;
pub mod resume;

pub use {
    error::{Error, Result},
    resume::{ResumeEntry, ResumeStore},
};
