// /src/custom_strings.rs
//! Byte-slice search helpers for raw modem text.

/// Returns the index of the first occurrence of `needle` in `haystack`.
pub fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Returns the index of the first `byte` at or after `from`.
pub fn find_byte_from(haystack: &[u8], from: usize, byte: u8) -> Option<usize> {
    haystack
        .get(from..)?
        .iter()
        .position(|&b| b == byte)
        .map(|i| from + i)
}

/// Returns the number of bytes up to and including the last `\n`,
/// i.e. the prefix made only of complete lines.
pub fn complete_lines_len(haystack: &[u8]) -> usize {
    haystack
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |i| i + 1)
}

/// Returns the substring after `delimiter`, if present.
pub fn extract_after_delimiter<'a>(input: &'a str, delimiter: &str) -> Option<&'a str> {
    input.split_once(delimiter).map(|(_, suffix)| suffix)
}
