use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::IsTerminal;

use busplot_frame::{ApplyArgument, PidArgument};
use busplot_rpc::{ScanReport, Series};
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
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// A decoded message as printed by `listen` and `decode`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "message", rename_all = "kebab-case")]
pub enum MessageRecord {
    VariableAlias {
        variable_id: u16,
        alias: String,
    },
    UpdateVariable {
        variable_id: u16,
        value: f32,
        timestamp_us: u64,
    },
    RemoveVariable {
        variable_id: u16,
    },
    ApplyArgument {
        p: PidTerm,
        i: PidTerm,
        d: PidTerm,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PidTerm {
    pub scale: f32,
    pub out_max: f32,
    pub value: f32,
}

impl From<PidArgument> for PidTerm {
    fn from(arg: PidArgument) -> Self {
        Self {
            scale: arg.scale,
            out_max: arg.out_max,
            value: arg.value,
        }
    }
}

impl From<ApplyArgument> for MessageRecord {
    fn from(msg: ApplyArgument) -> Self {
        MessageRecord::ApplyArgument {
            p: msg.p.into(),
            i: msg.i.into(),
            d: msg.d.into(),
        }
    }
}

impl MessageRecord {
    fn name(&self) -> &'static str {
        match self {
            MessageRecord::VariableAlias { .. } => "alias",
            MessageRecord::UpdateVariable { .. } => "update",
            MessageRecord::RemoveVariable { .. } => "remove",
            MessageRecord::ApplyArgument { .. } => "apply",
        }
    }

    fn variable(&self) -> String {
        match self {
            MessageRecord::VariableAlias { variable_id, .. }
            | MessageRecord::UpdateVariable { variable_id, .. }
            | MessageRecord::RemoveVariable { variable_id } => variable_id.to_string(),
            MessageRecord::ApplyArgument { .. } => "-".to_string(),
        }
    }

    fn detail(&self) -> String {
        match self {
            MessageRecord::VariableAlias { alias, .. } => format!("alias={alias}"),
            MessageRecord::UpdateVariable {
                value,
                timestamp_us,
                ..
            } => format!("value={value} t={timestamp_us}us"),
            MessageRecord::RemoveVariable { .. } => String::new(),
            MessageRecord::ApplyArgument { p, i, d } => {
                format!("p={} i={} d={}", pid_text(p), pid_text(i), pid_text(d))
            }
        }
    }
}

fn pid_text(term: &PidTerm) -> String {
    format!("{}/{}/{}", term.scale, term.out_max, term.value)
}

pub fn print_record(record: &MessageRecord, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(record),
        OutputFormat::Table => {
            let mut table = new_table(vec!["MESSAGE", "VARIABLE", "DETAIL"]);
            table.add_row(vec![
                record.name().to_string(),
                record.variable(),
                record.detail(),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let detail = record.detail();
            if detail.is_empty() {
                println!("{} id={}", record.name(), record.variable());
            } else {
                println!("{} id={} {detail}", record.name(), record.variable());
            }
        }
    }
}

#[derive(Serialize)]
struct ReportOutput<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    source: &'a str,
    #[serde(flatten)]
    report: &'a ScanReport,
}

pub fn print_report(report: &ScanReport, source: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ReportOutput {
            kind: "scan-report",
            source,
            report,
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["FIELD", "VALUE"]);
            for (field, value) in [
                ("source", source.to_string()),
                ("frames", report.frames.to_string()),
                ("unknown command", report.unknown_command.to_string()),
                ("size mismatch", report.size_mismatch.to_string()),
                ("checksum mismatch", report.checksum_mismatch.to_string()),
                ("read failures", report.read_failures.to_string()),
                ("bytes skipped", report.bytes_skipped.to_string()),
                ("handler failures", report.handler_failures.to_string()),
                ("exit", report.exit.to_string()),
            ] {
                table.add_row(vec![field.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{source}: frames={} discarded={} skipped={} handler_failures={} exit={}",
                report.frames,
                report.discarded(),
                report.bytes_skipped,
                report.handler_failures,
                report.exit
            );
        }
    }
}

#[derive(Serialize)]
struct SeriesSummary {
    variable_id: u16,
    alias: Option<String>,
    samples: usize,
    last: Option<f32>,
    min: Option<f32>,
    max: Option<f32>,
}

impl SeriesSummary {
    fn new(variable_id: u16, series: &Series) -> Self {
        let range = series.range();
        Self {
            variable_id,
            alias: series.alias.clone(),
            samples: series.samples.len(),
            last: series.last().map(|s| s.value),
            min: range.map(|(lo, _)| lo),
            max: range.map(|(_, hi)| hi),
        }
    }
}

fn opt_text(value: Option<f32>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

pub fn print_series(series: &BTreeMap<u16, Series>, format: OutputFormat) {
    let summaries: Vec<SeriesSummary> = series
        .iter()
        .map(|(id, s)| SeriesSummary::new(*id, s))
        .collect();

    match format {
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct SeriesOutput<'a> {
                #[serde(rename = "type")]
                kind: &'static str,
                series: &'a [SeriesSummary],
            }
            print_json(&SeriesOutput {
                kind: "series-summary",
                series: &summaries,
            });
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["VARIABLE", "ALIAS", "SAMPLES", "LAST", "MIN", "MAX"]);
            for s in &summaries {
                table.add_row(vec![
                    s.variable_id.to_string(),
                    s.alias.clone().unwrap_or_default(),
                    s.samples.to_string(),
                    opt_text(s.last),
                    opt_text(s.min),
                    opt_text(s.max),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for s in &summaries {
                println!(
                    "series id={} alias={} samples={} last={} min={} max={}",
                    s.variable_id,
                    s.alias.as_deref().unwrap_or("-"),
                    s.samples,
                    opt_text(s.last),
                    opt_text(s.min),
                    opt_text(s.max)
                );
            }
        }
    }
}

#[derive(Serialize)]
struct EncodedOutput<'a> {
    message: &'a str,
    command: String,
    size: usize,
    hex: String,
}

pub fn print_encoded(name: &str, command: u16, wire: &[u8], format: OutputFormat) {
    let hex = to_hex(wire);
    match format {
        OutputFormat::Json => print_json(&EncodedOutput {
            message: name,
            command: format!("0x{command:04X}"),
            size: wire.len(),
            hex,
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["MESSAGE", "COMMAND", "SIZE", "HEX"]);
            table.add_row(vec![
                name.to_string(),
                format!("0x{command:04X}"),
                wire.len().to_string(),
                hex,
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{hex}"),
    }
}

/// Lower-case hex with no separators.
pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn print_json(value: &impl Serialize) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_is_lower_case_and_padded() {
        assert_eq!(to_hex(&[0xA5, 0x02, 0x00]), "a50200");
        assert_eq!(to_hex(&[]), "");
    }

    #[test]
    fn records_serialize_with_message_tag() {
        let record = MessageRecord::VariableAlias {
            variable_id: 1,
            alias: "Foo".into(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["message"], "variable-alias");
        assert_eq!(json["variable_id"], 1);
        assert_eq!(json["alias"], "Foo");

        let record = MessageRecord::UpdateVariable {
            variable_id: 2,
            value: 0.5,
            timestamp_us: 1_000,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["message"], "update-variable");
        assert_eq!(json["timestamp_us"], 1_000);
    }

    #[test]
    fn apply_detail_lists_every_term() {
        let record = MessageRecord::from(ApplyArgument {
            p: PidArgument::new(1.0, 2.0, 3.0),
            i: PidArgument::default(),
            d: PidArgument::new(0.5, 0.0, 0.0),
        });
        assert_eq!(record.detail(), "p=1/2/3 i=0/0/0 d=0.5/0/0");
        assert_eq!(record.variable(), "-");
    }

    #[test]
    fn series_summary_reports_range() {
        let mut series = Series {
            alias: Some("Foo".into()),
            ..Series::default()
        };
        for (t, v) in [(1, 3.0), (2, -1.0), (3, 2.0)] {
            series.samples.push(busplot_rpc::Sample {
                timestamp_us: t,
                value: v,
            });
        }
        let summary = SeriesSummary::new(4, &series);
        assert_eq!(summary.samples, 3);
        assert_eq!(summary.last, Some(2.0));
        assert_eq!(summary.min, Some(-1.0));
        assert_eq!(summary.max, Some(3.0));
    }
}
