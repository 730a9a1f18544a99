//! Command-line options of the `ev-charge-sim` binary.

use std::env;
use std::path::PathBuf;

/// Parsed command-line options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOptions {
    pub scenario: Option<PathBuf>,
    pub preset: Option<String>,
    pub seed: Option<u64>,
    /// Interchange document of the run.
    pub result_out: Option<PathBuf>,
    /// Per-second current trace as CSV.
    pub trace_out: Option<PathBuf>,
    /// Change-compressed current trace as JSON.
    pub trace_json_out: Option<PathBuf>,
    pub help: bool,
}

/// Parses the process arguments.
///
/// # Errors
///
/// Returns a message for unknown, repeated or incomplete arguments.
pub fn parse_args() -> Result<CliOptions, String> {
    parse_args_from(env::args().skip(1))
}

/// Parses `args` (without the program name). Falls back to the `baseline`
/// preset when neither `--scenario` nor `--preset` is given.
///
/// # Errors
///
/// Returns a message for unknown, repeated or incomplete arguments.
pub fn parse_args_from(args: impl IntoIterator<Item = String>) -> Result<CliOptions, String> {
    let mut args = args.into_iter();
    let mut opts = CliOptions::default();

    while let Some(arg) = args.next() {
        let mut value = |what: &str| {
            args.next()
                .ok_or_else(|| format!("missing value for {arg} (expected {what})"))
        };
        match arg.as_str() {
            "--scenario" => {
                let path = value("a TOML file path")?;
                set_once(&mut opts.scenario, PathBuf::from(path), &arg)?;
            }
            "--preset" => {
                let name = value("a preset name")?;
                set_once(&mut opts.preset, name, &arg)?;
            }
            "--seed" => {
                let raw = value("a u64")?;
                let seed = raw
                    .parse::<u64>()
                    .map_err(|_| format!("--seed value \"{raw}\" is not a valid u64"))?;
                set_once(&mut opts.seed, seed, &arg)?;
            }
            "--result-out" => {
                let path = value("a JSON file path")?;
                set_once(&mut opts.result_out, PathBuf::from(path), &arg)?;
            }
            "--trace-out" => {
                let path = value("a CSV file path")?;
                set_once(&mut opts.trace_out, PathBuf::from(path), &arg)?;
            }
            "--trace-json-out" => {
                let path = value("a JSON file path")?;
                set_once(&mut opts.trace_json_out, PathBuf::from(path), &arg)?;
            }
            "--help" | "-h" => opts.help = true,
            other => return Err(format!("unknown argument: {other}")),
        }
    }

    if opts.scenario.is_some() && opts.preset.is_some() {
        return Err(
            "arguments `--scenario` and `--preset` are mutually exclusive; choose one source"
                .to_string(),
        );
    }
    if opts.scenario.is_none() && opts.preset.is_none() {
        opts.preset = Some("baseline".to_string());
    }
    Ok(opts)
}

fn set_once<T>(slot: &mut Option<T>, value: T, flag: &str) -> Result<(), String> {
    if slot.replace(value).is_some() {
        return Err(format!("{flag} provided more than once"));
    }
    Ok(())
}

pub fn print_usage() {
    eprintln!("ev-charge-sim: second-by-second EV charging simulator");
    eprintln!();
    eprintln!("Usage: ev-charge-sim [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --scenario <path>         Load scenario from TOML config file");
    eprintln!("  --preset <name>           Use a built-in preset (baseline, nonlinear, tight_fuses)");
    eprintln!("  --seed <u64>              Override random seed");
    eprintln!("  --result-out <path>       Write the interchange document (JSON)");
    eprintln!("  --trace-out <path>        Write the per-second current trace (CSV)");
    eprintln!("  --trace-json-out <path>   Write the compressed current trace (JSON)");
    eprintln!("  --help                    Show this help message");
    eprintln!();
    eprintln!("If no --scenario or --preset is given, the baseline preset is used.");
}
