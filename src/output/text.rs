use super::{Formatter, derived_value};
use crate::clock::TickReport;
use crate::estimators::Variant;

pub struct TextFormatter {
    verbose: bool,
}

impl TextFormatter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl Formatter for TextFormatter {
    fn format(&self, report: &TickReport) -> String {
        let mut lines = Vec::with_capacity(report.updates.len());
        for update in &report.updates {
            let Some(raw) = update.value.filter(|v| v.is_finite()) else {
                lines.push(format!(
                    "[{:>5}] t={:>9.3}s {}: no data",
                    report.tick, report.timestamp, update.name
                ));
                continue;
            };

            let mut line = format!(
                "[{:>5}] t={:>9.3}s {}: {:>10.4}",
                report.tick, report.timestamp, update.name, raw
            );
            for variant in Variant::ALL {
                if variant == Variant::Original && !self.verbose {
                    continue;
                }
                if let Some(value) = derived_value(update, variant) {
                    line.push_str(&format!("  {}: {:>10.4}", variant.key(), value));
                }
            }
            lines.push(line);
        }
        lines.join("\n")
    }
}
