/// Accumulated, cleaned output for the command currently in flight.
///
/// ANSI escape sequences and carriage returns are removed on the way in.
/// When the window grows past its bound the oldest text is dropped.
#[derive(Debug, Clone)]
pub struct ScanWindow {
    text: String,
    max_bytes: usize,
}

impl ScanWindow {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            text: String::new(),
            max_bytes: max_bytes.max(1024),
        }
    }

    pub fn push(&mut self, chunk: &str) {
        let cleaned = strip_ansi_escapes::strip_str(chunk);
        self.text.extend(cleaned.chars().filter(|c| *c != '\r'));
        if self.text.len() > self.max_bytes {
            let mut cut = self.text.len() - self.max_bytes;
            while !self.text.is_char_boundary(cut) {
                cut += 1;
            }
            self.text.drain(..cut);
        }
    }

    /// Discard everything before byte offset `end`.
    pub fn consume(&mut self, end: usize) {
        let mut end = end.min(self.text.len());
        while !self.text.is_char_boundary(end) {
            end += 1;
        }
        self.text.drain(..end);
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_ansi_and_carriage_returns() {
        let mut window = ScanWindow::new(4096);
        window.push("\u{1b}[32mgreen\u{1b}[0m\r\nnext");
        assert_eq!(window.as_str(), "green\nnext");
    }

    #[test]
    fn consume_drops_prefix() {
        let mut window = ScanWindow::new(4096);
        window.push("abc\ndef");
        window.consume(4);
        assert_eq!(window.as_str(), "def");
        window.consume(100);
        assert!(window.is_empty());
    }

    #[test]
    fn bounded_on_char_boundary() {
        let mut window = ScanWindow::new(1024);
        window.push(&"é".repeat(600));
        assert!(window.len() <= 1024);
        assert!(window.as_str().chars().all(|c| c == 'é'));
    }
}
