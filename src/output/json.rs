use serde_json::{Map, Value, json};

use super::{Formatter, derived_value, iso8601_timestamp};
use crate::clock::TickReport;
use crate::estimators::Variant;

/// One JSON object per tick, one line each
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format(&self, report: &TickReport) -> String {
        let sources: Vec<Value> = report
            .updates
            .iter()
            .map(|update| {
                let mut derived = Map::new();
                for variant in Variant::ALL {
                    if let Some(value) = derived_value(update, variant) {
                        derived.insert(variant.key().to_string(), json!(value));
                    }
                }
                json!({
                    "name": update.name,
                    "value": update.value.filter(|v| v.is_finite()),
                    "derived": derived,
                })
            })
            .collect();

        json!({
            "ts": iso8601_timestamp(),
            "tick": report.tick,
            "t": report.timestamp,
            "sources": sources,
        })
        .to_string()
    }
}
