//! Human-readable terminal renderer.

use anyhow::{Context, Result};
use owo_colors::OwoColorize as _;
use serde_json::Value;

use crate::domain::result::ResultRecord;
use crate::output::OutputContext;

/// Renders result records as an indented block per controller.
pub struct HumanRenderer<'a> {
    ctx: &'a OutputContext,
}

impl<'a> HumanRenderer<'a> {
    /// Create a new `HumanRenderer` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    /// Print every record, then a one-line summary.
    ///
    /// Failed records are always printed; `quiet` hides successful ones.
    ///
    /// # Errors
    ///
    /// Returns an error if an output document cannot be rendered as YAML.
    pub fn render_records(&self, records: &[ResultRecord]) -> Result<()> {
        for record in records {
            if self.ctx.quiet && record.success {
                continue;
            }
            println!("{}", self.record_header(record));
            if let Some(error) = &record.error {
                println!("    {}", error.to_string().style(self.ctx.styles.error));
            }
            if let Some(output) = &record.output {
                for line in format_output(output)?.lines() {
                    println!("    {line}");
                }
            }
        }

        let failed = records.iter().filter(|r| !r.success).count();
        if failed == 0 {
            self.ctx
                .info(&format!("{} controller(s) succeeded", records.len()));
        } else {
            self.ctx.error(&format!(
                "{failed} of {} controller(s) failed",
                records.len()
            ));
        }
        Ok(())
    }

    fn record_header(&self, record: &ResultRecord) -> String {
        let styles = &self.ctx.styles;
        let marker = if record.success { "✓" } else { "✗" };
        let mut header = format!(
            "  {} {} {}",
            marker.style(styles.outcome(record.success)),
            record.context.name.style(styles.target),
            format!("({})", record.context.uuid).style(styles.dim),
        );
        if !record.context.customer.is_empty() {
            header.push_str(&format!(" {}", record.context.customer.style(styles.dim)));
        }
        header
    }
}

/// Scalars print as-is; documents print as YAML.
fn format_output(output: &Value) -> Result<String> {
    match output {
        Value::String(s) => Ok(s.clone()),
        Value::Bool(_) | Value::Number(_) | Value::Null => Ok(output.to_string()),
        _ => serde_yaml::to_string(output)
            .map(|yaml| yaml.trim_end().to_string())
            .context("cannot render output"),
    }
}
