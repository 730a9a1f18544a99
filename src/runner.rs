//! Runs a configured scenario end to end.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::config::ScenarioConfig;
use crate::data::RandomDataGenerator;
use crate::error::SimError;
use crate::io::export::TraceDocument;
use crate::io::interchange::InterchangeDocument;
use crate::sim::policy::policy_from_name;
use crate::sim::{CurrentTraceListener, RunReport, Simulation};

/// Everything a finished scenario run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: RunReport,
    pub trace: CurrentTraceListener,
    pub document: InterchangeDocument,
    /// First simulated second.
    pub start_step: u32,
    /// First second after the horizon.
    pub end_step: u32,
}

impl RunOutcome {
    /// Change-compressed JSON view of the current trace.
    pub fn trace_document(&self) -> TraceDocument {
        TraceDocument::from_trace(&self.trace, self.start_step, self.end_step)
    }
}

/// Generates a random instance for `config`, simulates the horizon with a
/// current trace attached and summarizes the run.
///
/// # Errors
///
/// * [`SimError::Policy`] if the configured policy is unknown
/// * any error raised while generating the instance or simulating
pub fn run_scenario(config: &ScenarioConfig) -> Result<RunOutcome, SimError> {
    let sim_config = config.sim_config();
    let policy = policy_from_name(&config.simulation.policy, sim_config.tolerance).ok_or_else(
        || SimError::Policy(format!("unknown policy \"{}\"", config.simulation.policy)),
    )?;
    let provider = RandomDataGenerator::from_config(config)?;

    let mut simulation = Simulation::from_provider(sim_config, &provider, policy)?;
    let trace = Arc::new(Mutex::new(CurrentTraceListener::new()));
    simulation.add_listener(Arc::clone(&trace));
    simulation.simulate()?;

    let trace = trace.lock().clone();
    let report = RunReport::from_run(
        simulation.method(),
        trace.points(),
        simulation.result(),
        simulation.state(),
    );
    info!(
        charged_ah = report.total_charged_ah,
        peak_current = report.peak_current,
        "scenario finished"
    );

    Ok(RunOutcome {
        report,
        document: simulation.to_document(),
        start_step: simulation.config().start_seconds(),
        end_step: simulation.config().end_seconds(),
        trace,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short(mut config: ScenarioConfig) -> ScenarioConfig {
        config.simulation.start_timeslot = 32;
        config.simulation.timeslots = 8;
        config
    }

    #[test]
    fn baseline_run_produces_report_and_document() {
        let outcome = run_scenario(&short(ScenarioConfig::baseline())).expect("valid run");
        assert_eq!(outcome.report.steps, 8 * 900);
        assert_eq!(outcome.report.method, "realTimeGreedy");
        assert_eq!(outcome.document.problem_instance.cars.len(), 20);
        assert_eq!(outcome.trace_document().start_time, "08:00:00");
        assert!(outcome.report.total_charged_ah >= 0.0);
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let mut config = short(ScenarioConfig::baseline());
        config.simulation.policy = "oracle".into();
        assert!(matches!(run_scenario(&config), Err(SimError::Policy(_))));
    }

    #[test]
    fn same_seed_same_outcome() {
        let config = short(ScenarioConfig::baseline());
        let a = run_scenario(&config).expect("valid run");
        let b = run_scenario(&config).expect("valid run");
        assert_eq!(a.report, b.report);
        assert_eq!(a.trace.points(), b.trace.points());
    }
}
