use tracing::{debug, trace};

use crate::{
    prompt::{DetectedPrompt, detect_prompt},
    resume::capture_resume_id,
    result::{ResultScan, TurnResult, scan_result},
    sentinel::find_sentinel,
    window::ScanWindow,
};

/// Channel state the scanner needs to decide which extractors apply.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanContext {
    pub awaiting_resume_id: bool,
    pub busy: bool,
    pub prompt_pending: bool,
}

/// Something worth acting on, found in the output.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamSignal {
    ResumeId(String),
    Result(TurnResult),
    TurnComplete,
    Prompt(DetectedPrompt),
}

/// Incremental scanner over one channel's output.
#[derive(Debug, Clone)]
pub struct StreamScanner {
    window: ScanWindow,
    sentinel: String,
}

impl StreamScanner {
    pub fn new(sentinel: impl Into<String>, max_window_bytes: usize) -> Self {
        Self {
            window: ScanWindow::new(max_window_bytes),
            sentinel: sentinel.into(),
        }
    }

    /// Forget everything accumulated; called when a new command is dispatched.
    pub fn reset(&mut self) {
        self.window.clear();
    }

    pub fn buffered(&self) -> &str {
        self.window.as_str()
    }

    /// Append `chunk` and report the signals it completes, in the order the
    /// channel should apply them.
    pub fn feed(&mut self, chunk: &str, ctx: ScanContext) -> Vec<StreamSignal> {
        self.window.push(chunk);
        let mut signals = Vec::new();

        if ctx.awaiting_resume_id
            && let Some(id) = capture_resume_id(self.window.as_str())
        {
            debug!(resume_id = %id, "captured resume id");
            signals.push(StreamSignal::ResumeId(id));
        }

        let mut partial_start = None;
        match scan_result(self.window.as_str()) {
            ResultScan::Complete(extracted) => {
                self.window.consume(extracted.end);
                signals.push(StreamSignal::Result(extracted.result));
            },
            ResultScan::Partial { start } => partial_start = Some(start),
            ResultScan::Absent => {},
        }

        if ctx.busy && find_sentinel(self.window.as_str(), &self.sentinel).is_some() {
            self.window.clear();
            signals.push(StreamSignal::TurnComplete);
            return signals;
        }

        if !ctx.prompt_pending {
            let text = self.window.as_str();
            // Never look for prompts inside a result object still being written.
            let searchable = partial_start.map_or(text, |start| &text[..start]);
            if let Some(prompt) = detect_prompt(searchable) {
                trace!(title = %prompt.title, "prompt detected");
                self.window.consume(prompt.end);
                signals.push(StreamSignal::Prompt(prompt));
            }
        }

        signals
    }
}
