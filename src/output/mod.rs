mod csv;
mod json;
mod text;

use chrono::Utc;

use crate::clock::TickReport;
use crate::estimators::Variant;
use crate::registry::SourceUpdate;

pub use self::csv::CsvFormatter;
pub use self::json::JsonFormatter;
pub use self::text::TextFormatter;

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Csv,
}

/// Renders tick reports, one call per tick
pub trait Formatter: Send {
    fn format(&self, report: &TickReport) -> String;

    fn header(&self) -> Option<String> {
        None
    }
}

pub fn create_formatter(format: OutputFormat, verbose: bool) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter::new(verbose)),
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Csv => Box::new(CsvFormatter),
    }
}

pub fn iso8601_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Derived value of `variant` in an update, if that variant ran
fn derived_value(update: &SourceUpdate, variant: Variant) -> Option<f64> {
    update.derived.get(variant).map(|s| s.value)
}
