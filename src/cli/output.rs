use std::path::Path;

use crate::sequencer::DiscrepancyRecord;

/// Render one discrepancy in the original's wire format, misspelling and
/// all: `<trade_id>, discrepencies [<tag>,<tag>,...]`, optionally followed
/// by one indented detail line per source.
pub fn format_discrepancy(
    discrepancy: &DiscrepancyRecord,
    logdirs: &[&Path],
    reconcile_fields: &[String],
    include_details: bool,
) -> String {
    let header = format!(
        "{}, discrepencies [{}]",
        discrepancy.trade_id,
        discrepancy.tags.join(",")
    );

    if !include_details {
        return header;
    }

    let mut lines = Vec::with_capacity(logdirs.len());
    for (logdir, record) in logdirs.iter().zip(discrepancy.records.iter()) {
        let mut parts = vec![format!("[{}]", logdir.display())];
        match record {
            Some(record) => {
                parts.push(format!(
                    "timestamp={}",
                    record.get("timestamp").unwrap_or_default()
                ));
                for field in reconcile_fields {
                    parts.push(format!("{}={}", field, record.get(field).unwrap_or_default()));
                }
            }
            None => parts.push("[missing]".to_string()),
        }
        lines.push(parts.join(" "));
    }

    format!("{}\n  {}", header, lines.join("\n  "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn record(pairs: &[(&str, &str)]) -> Record {
        let fields: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Record::from_fields(fields)
    }

    #[test]
    fn header_only_without_details() {
        let discrepancy = DiscrepancyRecord {
            trade_id: "T1".to_string(),
            tags: vec!["price".to_string(), "timestamp".to_string()],
            records: vec![None, None],
        };
        let logdirs: Vec<PathBuf> = vec![PathBuf::from("a"), PathBuf::from("b")];
        let refs: Vec<&Path> = logdirs.iter().map(|p| p.as_path()).collect();

        let out = format_discrepancy(&discrepancy, &refs, &[], false);
        assert_eq!(out, "T1, discrepencies [price,timestamp]");
    }

    #[test]
    fn details_include_missing_marker_and_fields() {
        let discrepancy = DiscrepancyRecord {
            trade_id: "T1".to_string(),
            tags: vec!["_missing".to_string()],
            records: vec![
                Some(record(&[
                    ("timestamp", "2026-01-01T10:00:00"),
                    ("symbol", "AAPL"),
                ])),
                None,
            ],
        };
        let logdirs: Vec<PathBuf> = vec![PathBuf::from("a"), PathBuf::from("b")];
        let refs: Vec<&Path> = logdirs.iter().map(|p| p.as_path()).collect();

        let out = format_discrepancy(
            &discrepancy,
            &refs,
            &["symbol".to_string()],
            true,
        );
        assert!(out.contains("[a] timestamp=2026-01-01T10:00:00 symbol=AAPL"));
        assert!(out.contains("[b] [missing]"));
    }
}
