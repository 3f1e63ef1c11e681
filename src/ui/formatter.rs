//! Pure formatting functions for UI output.
//!
//! This module contains all display/formatting logic. Report lines are built
//! as plain strings first so they can be tested, then styled on output.

use console::style;

use crate::analyzer::CheckReport;
use crate::boundary::BoundaryWarning;
use crate::cli::{LineOutcome, LineReport, RunReport};

pub fn format_error(message: &str) -> String {
    format!("{} {}", style("ERROR:").red().bold(), message)
}

pub fn format_success(message: &str) -> String {
    format!("{} {}", style("✓").green(), message)
}

pub fn format_status(message: &str) -> String {
    format!("{} {}", style("→").yellow(), message)
}

pub fn format_boundary_warning(warning: &BoundaryWarning) -> String {
    format!("{} {}", style("⚠ WARNING:").yellow(), warning)
}

/// Format and print an error message in red.
pub fn display_error(message: &str) {
    eprintln!("{}", format_error(message));
}

/// Format and print a success message with green checkmark.
pub fn display_success(message: &str) {
    println!("{}", format_success(message));
}

/// Format and print a status message with yellow arrow.
pub fn display_status(message: &str) {
    println!("{}", format_status(message));
}

/// Display a boundary warning to the user.
pub fn display_boundary_warning(warning: &BoundaryWarning) {
    eprintln!("{}", format_boundary_warning(warning));
}

/// Print one line of a release run, colored by outcome.
pub fn display_line_report(report: &LineReport) {
    if let Some(attempt) = &report.attempt {
        for warning in &attempt.warnings {
            display_boundary_warning(warning);
        }
    }

    let summary = report.summary();
    match &report.result {
        Ok(LineOutcome::Released { resumed: true, tag, .. }) => {
            println!("{} {}", style(summary).green(), style(format!("(resumed, {})", tag)).dim())
        }
        Ok(LineOutcome::Released { tag, .. }) => {
            println!("{} {}", style(summary).green(), style(format!("({})", tag)).dim())
        }
        Ok(LineOutcome::Noop { reason }) => {
            println!("{} {}", summary, style(format!("({})", reason)).dim())
        }
        Ok(LineOutcome::DryRun { tag, .. }) => {
            println!("{} {}", style(summary).cyan(), style(format!("({})", tag)).dim())
        }
        Err(_) => println!("{}", style(summary).red()),
    }
}

/// Print every line of a release run.
pub fn display_run_report(report: &RunReport) {
    for line in &report.lines {
        display_line_report(line);
    }
}

/// Print the result of linting a commit range.
pub fn display_check_report(report: &CheckReport, from: &str, to: &str) {
    for warning in &report.warnings {
        display_boundary_warning(warning);
    }

    let summary = format_check_summary(report, from, to);
    if report.is_clean() {
        display_success(&summary);
    } else {
        display_error(&summary);
    }
}

pub fn format_check_summary(report: &CheckReport, from: &str, to: &str) -> String {
    if report.is_clean() {
        format!(
            "All {} commit(s) in {}..{} follow the conventional commit format",
            report.checked, from, to
        )
    } else {
        format!(
            "{} of {} commit(s) in {}..{} do not follow the conventional commit format",
            report.warnings.len(),
            report.checked,
            from,
            to
        )
    }
}
