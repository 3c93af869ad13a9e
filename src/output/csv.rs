use super::{Formatter, derived_value, iso8601_timestamp};
use crate::clock::TickReport;
use crate::estimators::Variant;

/// One row per source and tick; missing values are empty fields
pub struct CsvFormatter;

fn field(value: Option<f64>) -> String {
    value
        .filter(|v| v.is_finite())
        .map_or(String::new(), |v| format!("{:.6}", v))
}

impl Formatter for CsvFormatter {
    fn format(&self, report: &TickReport) -> String {
        let ts = iso8601_timestamp();
        report
            .updates
            .iter()
            .map(|update| {
                let mut row = format!(
                    "{},{},{:.3},{},{}",
                    ts,
                    report.tick,
                    report.timestamp,
                    update.name,
                    field(update.value)
                );
                for variant in Variant::ALL {
                    row.push(',');
                    row.push_str(&field(derived_value(update, variant)));
                }
                row
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn header(&self) -> Option<String> {
        let mut header = String::from("ts,tick,t,source,raw");
        for variant in Variant::ALL {
            header.push(',');
            header.push_str(variant.key());
        }
        Some(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::DerivedSamples;
    use crate::registry::SourceUpdate;
    use crate::sample::Sample;

    #[test]
    fn test_csv_row_matches_header() {
        let mut derived = DerivedSamples::default();
        derived.set(Variant::Original, Some(Sample::new(0.5, 4.0)));
        derived.set(Variant::AdaptiveAverage, Some(Sample::new(0.5, 3.5)));
        let report = TickReport {
            tick: 1,
            timestamp: 0.5,
            updates: vec![SourceUpdate {
                name: "pv".into(),
                value: Some(4.0),
                derived,
            }],
        };

        let header = CsvFormatter.header().unwrap();
        assert_eq!(header, "ts,tick,t,source,raw,original,rolling_window,ewm,adaptive");

        let row = CsvFormatter.format(&report);
        let fields: Vec<&str> = row.split(',').collect();
        assert_eq!(fields.len(), header.split(',').count());
        assert_eq!(
            &fields[1..],
            &["1", "0.500", "pv", "4.000000", "4.000000", "", "", "3.500000"]
        );
    }
}
