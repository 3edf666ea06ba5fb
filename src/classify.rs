//! Failed-hook detection from the tool's human-readable report.
//!
//! pre-commit prints one line per hook, padded with dots up to a status word:
//! `flake8...................................Failed`. Matching that shape is the only
//! contract we have with the tool, so the rule sits behind [`FailureClassifier`].

use regex::Regex;
use tracing::warn;

/// Hook id, a run of filler dots, then `Failed` at end of line.
pub const DEFAULT_FAILURE_PATTERN: &str = r"^([A-Za-z0-9_-]+)\.+Failed$";

/// Extracts the hooks a finished run reported as failed.
pub trait FailureClassifier: Send {
    /// Returns failed hook ids in report order, duplicates preserved.
    fn failed_hooks(&self, plain_text: &str) -> Vec<String>;
}

/// Line-based regex matcher over the plain-text report.
#[derive(Debug, Clone)]
pub struct ReportClassifier {
    pattern: Option<Regex>,
}

impl Default for ReportClassifier {
    fn default() -> Self {
        Self::with_pattern(DEFAULT_FAILURE_PATTERN)
    }
}

impl ReportClassifier {
    /// Builds a classifier from a custom pattern. Capture group 1 is the hook id; without
    /// one the whole match is used. An invalid pattern yields a classifier that never matches.
    pub fn with_pattern(pattern: &str) -> Self {
        match Regex::new(pattern) {
            Ok(regex) => Self {
                pattern: Some(regex),
            },
            Err(err) => {
                warn!(%pattern, error = %err, "invalid failure pattern, failed hooks will not be detected");
                Self { pattern: None }
            }
        }
    }
}

impl FailureClassifier for ReportClassifier {
    fn failed_hooks(&self, plain_text: &str) -> Vec<String> {
        let Some(regex) = &self.pattern else {
            return Vec::new();
        };
        plain_text
            .lines()
            .map(str::trim_end)
            .filter_map(|line| {
                let caps = regex.captures(line)?;
                caps.get(1)
                    .or_else(|| caps.get(0))
                    .map(|m| m.as_str().to_string())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputBuffer;

    fn classify(text: &str) -> Vec<String> {
        ReportClassifier::default().failed_hooks(text)
    }

    #[test]
    fn detects_failed_line() {
        let failed = classify("check-yaml.......................Failed\n");
        assert_eq!(failed, vec!["check-yaml"]);
    }

    #[test]
    fn ignores_passed_and_skipped_lines() {
        let text = "check-yaml.......................Passed\n\
                    mypy.........(no files to check)Skipped\n";
        assert!(classify(text).is_empty());
    }

    #[test]
    fn keeps_report_order_and_duplicates() {
        let text = "black....................Failed\n\
                    - hook id: black\n\
                    - files were modified by this hook\n\
                    isort....................Passed\n\
                    flake8...................Failed\n\
                    black....................Failed\n";
        assert_eq!(classify(text), vec!["black", "flake8", "black"]);
    }

    #[test]
    fn tolerates_crlf_and_trailing_spaces() {
        assert_eq!(classify("ruff_format....Failed  \r\n"), vec!["ruff_format"]);
    }

    #[test]
    fn overwritten_progress_lines_are_classified() {
        let mut buffer = OutputBuffer::new();
        buffer.append("[INFO] Initializing environment...\rblack....Failed\n");
        assert_eq!(classify(&buffer.plain_text()), vec!["black"]);
    }

    #[test]
    fn rejects_ids_with_other_characters() {
        assert!(classify("check yaml.......Failed\n").is_empty());
        assert!(classify("black....Failed (exit 1)\n").is_empty());
    }

    #[test]
    fn custom_patterns_degrade_or_use_whole_match() {
        let classifier = ReportClassifier::with_pattern(r"^[a-z]+(?=:\s*FAIL)");
        // look-around is unsupported by the regex crate, so this degrades to no matches
        assert!(classifier.failed_hooks("lint: FAIL\n").is_empty());

        let classifier = ReportClassifier::with_pattern(r"^[a-z]+-FAIL$");
        assert_eq!(classifier.failed_hooks("lint-FAIL\n"), vec!["lint-FAIL"]);
    }
}
