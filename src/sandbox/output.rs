//! Rendering captured process output into tool-result text

/// Returned when a run printed nothing and wrote nothing to stderr
pub const NO_OUTPUT: &str = "(no output)";

/// Separates standard output from the error section
pub const STDERR_MARKER: &str = "\n[stderr]: ";

const MAX_OUTPUT_LENGTH: usize = 128 * 1024; // 128KB
const SNIP_SIZE: usize = 4 * 1024; // 4KB each end

/// Standard output, then an error section only when stderr has content.
///
/// Stderr is not filtered line by line; the preamble silences Python
/// warnings at the source.
pub fn format_output(stdout: &str, stderr: &str) -> String {
    let mut text = String::with_capacity(stdout.len() + stderr.len() + STDERR_MARKER.len());
    text.push_str(stdout);
    if !stderr.trim().is_empty() {
        text.push_str(STDERR_MARKER);
        text.push_str(stderr);
    }

    if text.trim().is_empty() {
        return NO_OUTPUT.to_string();
    }
    truncate_output(&text)
}

/// Keep the head and tail of oversized output, cutting on char boundaries.
pub fn truncate_output(output: &str) -> String {
    if output.len() <= MAX_OUTPUT_LENGTH {
        return output.to_string();
    }

    let head_end = floor_char_boundary(output, SNIP_SIZE);
    let tail_start = ceil_char_boundary(output, output.len() - SNIP_SIZE);
    let head = output.get(..head_end).unwrap_or_default();
    let tail = output.get(tail_start..).unwrap_or_default();

    format!(
        "[output truncated in middle: got {} bytes, max is {} bytes]\n{head}\n\n[snip]\n\n{tail}",
        output.len(),
        MAX_OUTPUT_LENGTH,
    )
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(s: &str, mut index: usize) -> usize {
    while !s.is_char_boundary(index) {
        index += 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stdout_passes_through_exactly() {
        assert_eq!(format_output("100\n", ""), "100\n");
    }

    #[test]
    fn test_error_section_follows_partial_stdout() {
        let text = format_output(
            "partial\n",
            "Traceback (most recent call last):\nZeroDivisionError: division by zero\n",
        );
        assert_eq!(
            text,
            "partial\n\n[stderr]: Traceback (most recent call last):\nZeroDivisionError: division by zero\n"
        );
    }

    #[test]
    fn test_blank_output_is_sentinel() {
        assert_eq!(format_output("", ""), NO_OUTPUT);
        assert_eq!(format_output("\n  \n", "\n"), NO_OUTPUT);
    }

    #[test]
    fn test_stderr_only() {
        let text = format_output("", "boom\n");
        assert_eq!(text, "\n[stderr]: boom\n");
    }

    #[test]
    fn test_output_truncation() {
        let long_output = "x".repeat(200_000);
        let truncated = truncate_output(&long_output);
        assert!(truncated.len() < 20_000);
        assert!(truncated.contains("[snip]"));
        assert!(truncated.starts_with("[output truncated in middle: got 200000 bytes"));
    }

    #[test]
    fn test_truncation_respects_multibyte_chars() {
        let long_output = "é".repeat(100_000);
        let truncated = truncate_output(&long_output);
        assert!(truncated.contains("[snip]"));
        assert!(truncated.chars().filter(|c| *c == 'é').count() > 1000);
    }
}
