//! Output formatting for Strata CLI results.
//!
//! Every command renders one summary value, either as a human-readable table
//! or as JSON for machine consumption.

use clap::ValueEnum;
use serde::Serialize;
use std::io::IsTerminal;
use std::str::FromStr;

mod json;
mod table;

pub use self::json::JsonOutput;
pub use self::table::TableOutput;

/// Output format for CLI results
#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format (default)
    #[default]
    Table,
    /// JSON format for machine consumption
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: '{}'", s)),
        }
    }
}

/// Types that can be displayed as a table.
///
/// JSON rendering comes from `Serialize`.
pub trait TableDisplay: Serialize {
    fn to_table(&self) -> String;
}

/// Result wrapper that renders in the selected format.
pub struct Output<T> {
    data: T,
    format: OutputFormat,
}

impl<T: TableDisplay> Output<T> {
    pub fn new(data: T, format: OutputFormat) -> Self {
        Self { data, format }
    }

    /// Get the rendered string without printing
    pub fn render_to_string(&self) -> String {
        match self.format {
            OutputFormat::Table => self.data.to_table(),
            OutputFormat::Json => JsonOutput::format(&self.data),
        }
    }

    /// Render the output to stdout
    pub fn render(&self) -> anyhow::Result<()> {
        println!("{}", self.render_to_string());
        Ok(())
    }
}

/// Detect if stderr is a TTY. Progress spinners only draw there.
pub fn is_tty() -> bool {
    std::io::stderr().is_terminal()
}
