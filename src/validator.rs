//! Defense-in-depth output validation.
//!
//! A sub-workflow that reports success can still have produced an apology
//! instead of a result. This module holds the single, versioned vocabulary
//! of failure-indicator phrases and the matching algorithm: normalize
//! typographic quotes, lowercase, then substring-match.

/// Phrases whose presence downgrades a reported success to a failure.
pub const FAILURE_INDICATORS: &[&str] = &[
    "couldn't find",
    "could not find",
    "cannot find",
    "can't find",
    "unable to",
    "not found",
    "file not found",
    "does not exist",
    "doesn't exist",
    "no such file",
    "nothing to commit",
    "requires setup",
    "placeholder",
    "stub",
    "todo:",
    "not implemented",
    "reference doesn't have a corresponding file",
    "i cannot",
    "i can't",
    "no changes were made",
    "failed to",
];

/// Minimum trimmed length for a success output to count as useful.
pub const MIN_USEFUL_OUTPUT_CHARS: usize = 100;

/// Replaces typographic single and double quotes with ASCII equivalents.
pub fn normalize_quotes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => '\'',
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => '"',
            other => other,
        })
        .collect()
}

/// The first failure indicator found in the output, if any.
pub fn find_failure_indicator(output: &str) -> Option<&'static str> {
    let normalized = normalize_quotes(output).to_lowercase();
    FAILURE_INDICATORS
        .iter()
        .find(|indicator| normalized.contains(*indicator))
        .copied()
}

/// Validates the output of a sub-workflow that reported success.
///
/// Returns the error message to downgrade with, or `None` when the output
/// passes. Outputs shorter than [`MIN_USEFUL_OUTPUT_CHARS`] are downgraded
/// with the output inlined; indicator matches use the fixed policy message.
pub fn validate_success_output(output: &str) -> Option<String> {
    let trimmed = output.trim();
    if trimmed.chars().count() < MIN_USEFUL_OUTPUT_CHARS {
        return Some(format!(
            "Output too short to be useful ({} chars): {trimmed}",
            trimmed.chars().count()
        ));
    }
    if find_failure_indicator(trimmed).is_some() {
        return Some("Response indicates task was not completed".to_string());
    }
    None
}
