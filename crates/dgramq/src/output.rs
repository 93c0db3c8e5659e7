use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Outcome of one `simulate` run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationReport {
    pub senders: usize,
    pub receivers: usize,
    pub capacity: usize,
    /// Datagrams handed to `submit`.
    pub submitted: u64,
    /// Submits resolved with `Ok`.
    pub acknowledged: u64,
    /// Submits resolved with `Expired`.
    pub expired: u64,
    /// Submits that failed for any other reason (close, oversize).
    pub failed: u64,
    /// Datagrams the assembler moved into the receiving queue.
    pub transmitted: u64,
    /// Datagrams the receiving queue discarded because it was full.
    pub dropped: u64,
    pub received: u64,
    pub per_receiver: Vec<u64>,
    /// Datagrams seen out of per-sender order by a receiver. Always 0 unless broken.
    pub reordered: u64,
    pub elapsed_ms: u64,
    pub interrupted: bool,
}

const REPORT_SCHEMA_ID: &str =
    "https://schemas.3leaps.dev/dgramq/cli/v1/simulation-report.schema.json";

#[derive(Serialize)]
struct ReportOutput<'a> {
    schema_id: &'a str,
    #[serde(flatten)]
    report: &'a SimulationReport,
}

pub fn print_report(report: &SimulationReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ReportOutput {
                schema_id: REPORT_SCHEMA_ID,
                report,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["METRIC", "VALUE"]);
            for (metric, value) in report_rows(report) {
                table.add_row(vec![metric.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let line = report_rows(report)
                .into_iter()
                .map(|(metric, value)| format!("{metric}={value}"))
                .collect::<Vec<_>>()
                .join(" ");
            println!("{line}");
        }
    }
}

fn report_rows(report: &SimulationReport) -> Vec<(&'static str, String)> {
    let per_receiver = report
        .per_receiver
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(",");
    vec![
        ("senders", report.senders.to_string()),
        ("receivers", report.receivers.to_string()),
        ("capacity", report.capacity.to_string()),
        ("submitted", report.submitted.to_string()),
        ("acknowledged", report.acknowledged.to_string()),
        ("expired", report.expired.to_string()),
        ("failed", report.failed.to_string()),
        ("transmitted", report.transmitted.to_string()),
        ("dropped", report.dropped.to_string()),
        ("received", report.received.to_string()),
        ("per_receiver", per_receiver),
        ("reordered", report.reordered.to_string()),
        ("elapsed_ms", report.elapsed_ms.to_string()),
        ("interrupted", report.interrupted.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_output_is_flat() {
        let report = SimulationReport {
            submitted: 3,
            per_receiver: vec![1, 2],
            ..SimulationReport::default()
        };
        let out = ReportOutput {
            schema_id: REPORT_SCHEMA_ID,
            report: &report,
        };
        let value = serde_json::to_value(&out).unwrap();
        assert_eq!(value["submitted"], 3);
        assert_eq!(value["per_receiver"][1], 2);
        assert_eq!(value["schema_id"], REPORT_SCHEMA_ID);
    }

    #[test]
    fn rows_cover_every_counter() {
        let rows = report_rows(&SimulationReport::default());
        assert_eq!(rows.len(), 14);
        assert!(rows.iter().any(|(name, _)| *name == "dropped"));
    }
}
