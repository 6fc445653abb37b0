//! Output styles using owo-colors stylesheet pattern

use owo_colors::Style;

/// Centralized stylesheet for CLI output colors.
#[derive(Default, Clone)]
pub struct Styles {
    /// Successful records (green)
    pub success: Style,
    /// Warning messages (yellow)
    pub warning: Style,
    /// Failed records and errors (red)
    pub error: Style,
    /// Info messages (blue)
    pub info: Style,
    /// Dimmed/secondary text, e.g. uuids
    pub dim: Style,
    /// Controller names
    pub target: Style,
}

impl Styles {
    /// Apply colors to the stylesheet.
    pub fn colorize(&mut self) {
        self.success = Style::new().green();
        self.warning = Style::new().yellow();
        self.error = Style::new().red();
        self.info = Style::new().blue();
        self.dim = Style::new().dimmed();
        self.target = Style::new().bold();
    }

    /// Style of a record's status marker.
    #[must_use]
    pub fn outcome(&self, success: bool) -> Style {
        if success { self.success } else { self.error }
    }
}
