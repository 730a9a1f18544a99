//! EV charging simulator entry point: CLI wiring and config-driven runs.

use std::process;

use anyhow::Context;

use ev_charge_sim::cli::{self, CliOptions};
use ev_charge_sim::config::ScenarioConfig;
use ev_charge_sim::io::export::{export_trace_csv, export_trace_json};
use ev_charge_sim::runner::run_scenario;
use ev_charge_sim::telemetry;

fn load_scenario(cli: &CliOptions) -> anyhow::Result<ScenarioConfig> {
    let mut scenario = match (&cli.scenario, &cli.preset) {
        (Some(path), _) => ScenarioConfig::from_toml_file(path)?,
        (None, Some(name)) => ScenarioConfig::from_preset(name)?,
        (None, None) => ScenarioConfig::baseline(),
    };
    if let Some(seed) = cli.seed {
        scenario.simulation.seed = seed;
    }
    Ok(scenario)
}

fn run(cli: &CliOptions, scenario: &ScenarioConfig) -> anyhow::Result<()> {
    let outcome = run_scenario(scenario).context("simulation failed")?;
    println!("{}", outcome.report);

    if let Some(path) = &cli.result_out {
        outcome
            .document
            .write_json_file(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        eprintln!("Result written to {}", path.display());
    }
    if let Some(path) = &cli.trace_out {
        export_trace_csv(outcome.trace.points(), path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        eprintln!("Trace written to {}", path.display());
    }
    if let Some(path) = &cli.trace_json_out {
        export_trace_json(&outcome.trace_document(), path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        eprintln!("Trace written to {}", path.display());
    }
    Ok(())
}

fn main() {
    let cli = match cli::parse_args() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("error: {e}");
            cli::print_usage();
            process::exit(2);
        }
    };
    if cli.help {
        cli::print_usage();
        return;
    }

    telemetry::init_tracing();

    let scenario = match load_scenario(&cli) {
        Ok(scenario) => scenario,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };
    let errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    if let Err(e) = run(&cli, &scenario) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}
