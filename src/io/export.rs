//! CSV and JSON export of current traces and battery histories.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::battery::BatterySim;
use crate::sim::listener::{CurrentTraceListener, TracePoint};

/// Column header of the current trace CSV.
const TRACE_HEADER: &str = "step;current;currentPlanLimit";

/// Column header of the battery history CSV.
const BATTERY_HEADER: &str = "step;soc;current;terminalVoltage;openCircuitVoltage;power;r0";

fn semicolon_writer(writer: impl Write) -> csv::Writer<impl Write> {
    csv::WriterBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .from_writer(writer)
}

/// Exports a current trace to a CSV file at the given path.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_trace_csv(points: &[TracePoint], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_trace_csv(points, BufWriter::new(file))
}

/// Writes one `;`-separated row per recorded second.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_trace_csv(points: &[TracePoint], writer: impl Write) -> io::Result<()> {
    let mut wtr = semicolon_writer(writer);
    wtr.write_record(TRACE_HEADER.split(';'))?;
    for p in points {
        wtr.write_record(&[
            p.step.to_string(),
            p.current.to_string(),
            p.current_plan_limit.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// One entry of [`TraceDocument::calculated_data`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TraceValue {
    pub step: u32,
    pub current: f64,
}

/// Change-compressed current trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceDocument {
    pub current_unit: &'static str,
    pub start_time: String,
    pub end_time: String,
    pub step_unit: &'static str,
    pub info: &'static str,
    pub start_step: u32,
    pub end_step: u32,
    pub calculated_data: Vec<TraceValue>,
}

impl TraceDocument {
    /// Builds the document for the seconds `start_step..end_step`, keeping
    /// only the seconds whose current differs from the previous one.
    pub fn from_trace(trace: &CurrentTraceListener, start_step: u32, end_step: u32) -> Self {
        Self {
            current_unit: "ampere",
            start_time: clock_time(start_step),
            end_time: clock_time(end_step.saturating_sub(1)),
            step_unit: "seconds",
            info: "Steps that are not displayed have the value of their predecessor",
            start_step,
            end_step,
            calculated_data: trace
                .changes()
                .map(|p| TraceValue {
                    step: p.step,
                    current: p.current,
                })
                .collect(),
        }
    }
}

/// Formats a second of day as `hh:mm:ss`.
fn clock_time(seconds: u32) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        seconds / 60 % 60,
        seconds % 60
    )
}

/// Writes a trace document as pretty JSON.
///
/// # Errors
///
/// Returns an `io::Error` if serialization or writing fails.
pub fn write_trace_json(document: &TraceDocument, mut writer: impl Write) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut writer, document)?;
    writer.flush()
}

/// Exports a trace document to a JSON file at the given path.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_trace_json(document: &TraceDocument, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_trace_json(document, BufWriter::new(file))
}

/// Writes the recorded samples of a battery simulator.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_battery_history_csv(sim: &BatterySim, writer: impl Write) -> io::Result<()> {
    let mut wtr = semicolon_writer(writer);
    wtr.write_record(BATTERY_HEADER.split(';'))?;
    for s in sim.history() {
        wtr.write_record(&[
            s.step.to_string(),
            s.soc.to_string(),
            s.current.to_string(),
            s.terminal_voltage.to_string(),
            s.open_circuit_voltage.to_string(),
            s.power.to_string(),
            s.r0.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Exports a battery history to a CSV file at the given path.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_battery_history_csv(sim: &BatterySim, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_battery_history_csv(sim, BufWriter::new(file))
}
