//! Property-based tests for sandbox output rendering

use super::output::{format_output, truncate_output, NO_OUTPUT, STDERR_MARKER};
use proptest::prelude::*;

/// Output that is visibly non-empty
fn arb_visible_text() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_.,:()]{1,40}(\n[a-zA-Z0-9 _.,:()]{0,40}){0,5}\n?"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn stdout_without_errors_is_returned_verbatim(stdout in arb_visible_text()) {
        prop_assert_eq!(format_output(&stdout, ""), stdout);
    }

    #[test]
    fn error_section_appended_after_stdout(
        stdout in "[a-z0-9 \n]{0,80}",
        stderr in arb_visible_text(),
    ) {
        let text = format_output(&stdout, &stderr);
        prop_assert!(text.starts_with(stdout.as_str()));
        let expected_tail = format!("{STDERR_MARKER}{stderr}");
        prop_assert!(text.ends_with(&expected_tail));
    }

    #[test]
    fn whitespace_only_stderr_never_adds_section(
        stdout in arb_visible_text(),
        stderr in "[ \t\n]{0,10}",
    ) {
        let text = format_output(&stdout, &stderr);
        prop_assert!(!text.contains(STDERR_MARKER));
        prop_assert_ne!(text, NO_OUTPUT.to_string());
    }

    #[test]
    fn truncation_never_splits_chars(unit in "[a-zé日🦀]{1,6}", repeats in 30_000usize..40_000) {
        let output = unit.repeat(repeats);
        let truncated = truncate_output(&output);
        prop_assert!(truncated.len() <= output.len().max(200 * 1024));
        if output.len() > 128 * 1024 {
            prop_assert!(truncated.contains("[snip]"));
        } else {
            prop_assert_eq!(truncated, output);
        }
    }
}
