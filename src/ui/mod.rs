//! User interface module - report and status output.
//!
//! All styling lives in [formatter].

pub mod formatter;

pub use formatter::{
    display_boundary_warning, display_check_report, display_error, display_line_report,
    display_run_report, display_status, display_success, format_boundary_warning,
    format_check_summary, format_error, format_status, format_success,
};
