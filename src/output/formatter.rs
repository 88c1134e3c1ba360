//! Output formatters for suite results
//!
//! Provides JSON, Table, and summary output formats.

use std::io::Write;

use crate::harness::SuiteOutcome;
use crate::models::{NodeReport, Outcome, SuiteSummary};
use crate::utils::fmt_duration;

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Summary,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }
}

/// Result formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    /// Format a single node result
    pub fn format_result(&self, result: &NodeReport) -> String {
        match self.format {
            OutputFormat::Table => self.format_result_table(result),
            OutputFormat::Json => serde_json::to_string(result).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(result).unwrap_or_default(),
            OutputFormat::Summary => result.to_string(),
        }
    }

    fn format_result_table(&self, result: &NodeReport) -> String {
        let status_str = if self.colorize {
            match result.outcome {
                Outcome::Pass => "\x1b[32m✓ PASS\x1b[0m",
                Outcome::Fail => "\x1b[31m✗ FAIL\x1b[0m",
                Outcome::Skip => "\x1b[33m○ SKIP\x1b[0m",
            }
        } else {
            match result.outcome {
                Outcome::Pass => "✓ PASS",
                Outcome::Fail => "✗ FAIL",
                Outcome::Skip => "○ SKIP",
            }
        };

        // Subtests are indented under their parent.
        let indent = "  ".repeat(result.depth());
        let leaf = result.name.rsplit('/').next().unwrap_or(&result.name);
        format!(
            "{}{:<width$} {} [{:>8}]",
            indent,
            leaf,
            status_str,
            fmt_duration(result.duration),
            width = 40usize.saturating_sub(indent.len()),
        )
    }

    /// Format a suite summary
    pub fn format_summary(&self, summary: &SuiteSummary, outcome: SuiteOutcome) -> String {
        match self.format {
            OutputFormat::Table => self.format_summary_table(summary, outcome),
            OutputFormat::Json => serde_json::to_string(summary).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(summary).unwrap_or_default(),
            OutputFormat::Summary => self.format_summary_brief(summary, outcome),
        }
    }

    fn format_summary_table(&self, summary: &SuiteSummary, outcome: SuiteOutcome) -> String {
        let mut output = String::new();

        output.push_str("\n╔══════════════════════════════════════════════════════════════╗\n");
        output.push_str(&format!("║  Suite: {:52} ║\n", outcome.to_string()));
        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");

        for result in &summary.results {
            output.push_str(&boxed_row(&self.format_result_table(result)));
        }

        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");

        let pass_str = if self.colorize {
            format!("\x1b[32m{}\x1b[0m", summary.passed)
        } else {
            summary.passed.to_string()
        };
        let fail_str = if self.colorize && summary.failed > 0 {
            format!("\x1b[31m{}\x1b[0m", summary.failed)
        } else {
            summary.failed.to_string()
        };

        output.push_str(&boxed_row(&format!(
            "Total: {:3} | Pass: {} | Fail: {} | Skip: {:3}",
            summary.total, pass_str, fail_str, summary.skipped
        )));
        output.push_str(&boxed_row(&format!(
            "Pass Rate: {:5.1}% | Duration: {}",
            summary.pass_rate(),
            fmt_duration(summary.total_duration)
        )));
        output.push_str("╚══════════════════════════════════════════════════════════════╝\n");

        output
    }

    fn format_summary_brief(&self, summary: &SuiteSummary, outcome: SuiteOutcome) -> String {
        let mut output = format!(
            "{}: {}/{} passed, {} failed, {} skipped ({:.1}%) in {}",
            outcome,
            summary.passed,
            summary.total,
            summary.failed,
            summary.skipped,
            summary.pass_rate(),
            fmt_duration(summary.total_duration)
        );
        for failure in summary.failures() {
            output.push_str(&format!("\n  {failure}"));
        }
        output
    }
}

/// Visible columns between `║  ` and ` ║`.
const ROW_WIDTH: usize = 59;

/// Pads `content` to the table width and closes the row.
fn boxed_row(content: &str) -> String {
    let pad = ROW_WIDTH.saturating_sub(visible_width(content));
    format!("║  {}{} ║\n", content, " ".repeat(pad))
}

/// Width of `text` without ANSI color sequences.
fn visible_width(text: &str) -> usize {
    let mut width = 0;
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            for c in chars.by_ref() {
                if c == 'm' {
                    break;
                }
            }
        } else {
            width += 1;
        }
    }
    width
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}

/// Write a summary to a file
pub fn write_summary_to_file(
    path: &std::path::Path,
    summary: &SuiteSummary,
    outcome: SuiteOutcome,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let formatter = ResultFormatter::new(format).no_color();
    let content = formatter.format_summary(summary, outcome);

    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    fn report(name: &str, outcome: Outcome) -> NodeReport {
        NodeReport {
            name: name.to_string(),
            outcome,
            duration: Duration::from_millis(1500),
            started_at: Utc::now(),
            output: String::new(),
        }
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::from_str("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_str("TABLE"), Some(OutputFormat::Table));
        assert_eq!(OutputFormat::from_str("unknown"), None);
    }

    #[test]
    fn test_formatter_creation() {
        let formatter = ResultFormatter::new(OutputFormat::Json).no_color();
        assert_eq!(formatter.format, OutputFormat::Json);
        assert!(!formatter.colorize);
    }

    #[test]
    fn test_table_indents_subtests() {
        let formatter = ResultFormatter::new(OutputFormat::Table).no_color();
        let line = formatter.format_result(&report("boot/network", Outcome::Fail));
        assert!(line.starts_with("  network"));
        assert!(line.contains("✗ FAIL"));
        assert!(line.contains("1.50s"));
    }

    #[test]
    fn test_brief_summary_lists_failures() {
        let summary = SuiteSummary::new(vec![
            report("boot", Outcome::Fail),
            report("boot/network", Outcome::Fail),
            report("upgrade", Outcome::Pass),
        ]);
        let formatter = ResultFormatter::new(OutputFormat::Summary);
        let text = formatter.format_summary(&summary, SuiteOutcome::Failed);
        assert!(text.starts_with("FAIL: 1/3 passed, 2 failed, 0 skipped"));
        assert!(text.contains("✗ boot/network (1.50s)"));
    }

    #[test]
    fn test_table_rows_are_closed() {
        let summary = SuiteSummary::new(vec![
            report("boot", Outcome::Pass),
            report("boot/network", Outcome::Fail),
        ]);
        for formatter in [
            ResultFormatter::new(OutputFormat::Table),
            ResultFormatter::new(OutputFormat::Table).no_color(),
        ] {
            let table = formatter.format_summary(&summary, SuiteOutcome::Failed);
            let lines: Vec<_> = table.trim().lines().collect();
            assert_eq!(lines.len(), 9);
            for line in lines {
                assert_eq!(visible_width(line), 64, "ragged row: {line:?}");
                assert!(line.ends_with(['║', '╗', '╣', '╝']));
            }
        }
    }

    #[test]
    fn test_visible_width_skips_color() {
        assert_eq!(visible_width("\x1b[32m✓ PASS\x1b[0m"), 6);
        assert_eq!(visible_width("plain"), 5);
    }

    #[test]
    fn test_json_summary() {
        let summary = SuiteSummary::new(vec![report("boot", Outcome::Skip)]);
        let formatter = ResultFormatter::new(OutputFormat::Json);
        let json: serde_json::Value =
            serde_json::from_str(&formatter.format_summary(&summary, SuiteOutcome::Success))
                .unwrap();
        assert_eq!(json["skipped"], 1);
        assert_eq!(json["results"][0]["outcome"], "skip");
    }
}
