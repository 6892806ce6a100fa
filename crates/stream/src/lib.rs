//! Signal extraction from raw agent terminal output.
//!
//! Output arrives in chunks that ignore line and object boundaries. Each
//! chunk is appended to a per-command [`ScanWindow`]; the extractors then
//! look for, in order: a resume id (only while one is awaited), a complete
//! structured result object, the completion sentinel line, and an
//! interactive prompt.

pub mod prompt;
pub mod resume;
pub mod result;
pub mod scanner;
pub mod sentinel;
pub mod window;

pub use {
    prompt::{DetectedPrompt, PromptKind, detect_prompt},
    resume::capture_resume_id,
    result::{ExtractedResult, ResultScan, TurnResult, Usage, scan_result},
    scanner::{ScanContext, StreamScanner, StreamSignal},
    sentinel::find_sentinel,
    window::ScanWindow,
};
