/// Byte offset just past the first line that is exactly `sentinel`.
///
/// Surrounding whitespace on the line is ignored. The echoed command line
/// (`...; echo "<sentinel>"`) contains the sentinel but is not a match.
pub fn find_sentinel(text: &str, sentinel: &str) -> Option<usize> {
    if sentinel.is_empty() {
        return None;
    }
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        offset += line.len();
        if line.trim() == sentinel {
            return Some(offset);
        }
    }
    None
}
