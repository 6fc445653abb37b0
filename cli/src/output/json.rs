//! JSON output helpers.
//!
//! Records print as one pretty array on stdout; run-level failures print
//! the error object on stderr.

use anyhow::{Context, Result};

use crate::domain::result::ResultRecord;

/// Renders result records as a JSON array.
pub struct JsonRenderer;

impl JsonRenderer {
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_records(&self, records: &[ResultRecord]) -> Result<()> {
        println!("{}", format_records(records)?);
        Ok(())
    }
}

/// `[{context, success, output, error}, ...]`, errors as message strings.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_records(records: &[ResultRecord]) -> Result<String> {
    serde_json::to_string_pretty(records).context("JSON serialization failed")
}

/// Format a JSON error object.
///
/// Output (pretty-printed):
/// ```json
/// {
///   "error": true,
///   "message": "...",
///   "code": "..."
/// }
/// ```
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_error(message: &str, code: &str) -> Result<String> {
    let obj = serde_json::json!({
        "error": true,
        "message": message,
        "code": code,
    });
    serde_json::to_string_pretty(&obj).context("JSON serialization failed")
}
