use anyhow::{bail, ensure, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Instrument;

use redwing::config::RedwingConfig;
use redwing::telemetry::{create_session_span, generate_session_id, init_telemetry};
use redwing::variants::VariantProfile;
use redwing::workflow::{
    FlightPlanField, FlightWorkflow, Intent, IntentOutcome, Stage, WorkflowHandle, WorkflowSnapshot,
};

#[derive(Parser)]
#[command(name = "redwing")]
#[command(about = "Guided pre-flight and launch workflow for unmanned aircraft")]
#[command(long_about = "Redwing walks an operator from connecting to the aircraft through pre-flight \
                       checks, flight plan selection, mission upload and the launch countdown. \
                       All device interaction is simulated.")]
struct Cli {
    /// Configuration file (defaults to ./redwing.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted operator through the whole workflow
    Run {
        /// Aircraft variant to fly
        #[arg(long, help = "Variant name, see `redwing variants`")]
        variant: Option<String>,
        /// Probability that a simulated task fails
        #[arg(long, help = "Override simulation.failure_rate (0.0-1.0)")]
        failure_rate: Option<f64>,
        /// Seed for failure injection
        #[arg(long)]
        seed: Option<u64>,
        /// Clock speed multiplier
        #[arg(long, default_value = "1.0", help = "Run every delay this many times faster")]
        speed: f64,
        /// Retries across the whole run before giving up
        #[arg(long, default_value = "3")]
        max_retries: u32,
        /// Print snapshots as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// List the configured aircraft variants
    Variants,
    /// Print the effective configuration, or write it to a file
    Config {
        #[arg(long, help = "Write the configuration as TOML to this path")]
        write: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _ = RedwingConfig::load_env_file();
    let mut config = match &cli.config {
        Some(path) => RedwingConfig::load_from(Some(path))
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => RedwingConfig::load()?,
    };

    match cli.command {
        Commands::Run {
            variant,
            failure_rate,
            seed,
            speed,
            max_retries,
            json,
        } => {
            if let Some(rate) = failure_rate {
                config.simulation.failure_rate = rate;
            }
            if seed.is_some() {
                config.simulation.seed = seed;
            }
            ensure!(
                speed.is_finite() && speed > 0.0,
                "--speed must be a positive finite number, got {speed}"
            );
            config.validate()?;
            init_telemetry(&config.observability)?;

            tokio::runtime::Runtime::new()?.block_on(async {
                run_command(&config, variant.as_deref(), speed, max_retries, json).await
            })
        }
        Commands::Variants => {
            variants_command(&config);
            Ok(())
        }
        Commands::Config { write } => config_command(&config, write),
    }
}

async fn run_command(
    config: &RedwingConfig,
    variant: Option<&str>,
    speed: f64,
    max_retries: u32,
    json: bool,
) -> Result<()> {
    let workflow = FlightWorkflow::from_config(config, variant)?;
    let (variant_name, profile) = config.variant(variant)?;
    let session_id = generate_session_id();
    let span = create_session_span(&variant_name, &session_id);

    async move {
        let handle = WorkflowHandle::spawn(workflow, speed);
        let mut updates = handle.subscribe();
        let mut retries = 0;
        let mut last_reported: Option<WorkflowSnapshot> = None;

        loop {
            let snapshot = updates.borrow_and_update().clone();
            if last_reported.as_ref() != Some(&snapshot) {
                report(&snapshot, json)?;
                last_reported = Some(snapshot.clone());
            }
            if snapshot.is_terminal() {
                break;
            }

            if let Some(intent) = next_intent(&snapshot, &profile) {
                if intent == Intent::Retry {
                    retries += 1;
                    if retries > max_retries {
                        let failure = snapshot
                            .last_failure
                            .map(|e| e.to_string())
                            .unwrap_or_default();
                        bail!("Giving up after {max_retries} retries: {failure}");
                    }
                }
                if let IntentOutcome::Rejected(error) = handle.send(intent).await? {
                    bail!("Operator intent rejected: {error}");
                }
                continue;
            }

            updates
                .changed()
                .await
                .context("Workflow stopped unexpectedly")?;
        }

        let workflow = handle.shutdown().await?;
        if !json {
            println!();
            println!("✅ {} reached {} in {} ms", variant_name, workflow.stage(), workflow.now_ms());
            for record in workflow.history() {
                println!("   {:>6} ms  {} → {}  ({})", record.clock_ms, record.from, record.to, record.trigger);
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .instrument(span)
    .await
}

/// What a diligent operator presses next, given what the screen shows.
/// `None` means there is nothing to do but wait.
fn next_intent(snapshot: &WorkflowSnapshot, profile: &VariantProfile) -> Option<Intent> {
    if snapshot.last_failure.is_some() {
        return Some(Intent::Retry);
    }
    match snapshot.stage {
        Stage::Idle => Some(Intent::Connect),
        Stage::Connected => Some(Intent::ProceedToChecks),
        Stage::ChecksComplete if !snapshot.is_terminal() => Some(Intent::ProceedToDestination),
        Stage::DestinationSelection => snapshot
            .flight_plan
            .missing_fields()
            .first()
            .and_then(|field| {
                profile
                    .options
                    .candidates(*field)
                    .first()
                    .map(|value| Intent::SetFlightPlanField {
                        field: *field,
                        value: value.clone(),
                    })
            })
            .or(Some(Intent::ProceedToUpload)),
        Stage::MissionReview => Some(Intent::UploadMission),
        Stage::TakeoffReady => Some(Intent::InitiateTakeoff),
        _ => None,
    }
}

fn report(snapshot: &WorkflowSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(snapshot)?);
        return Ok(());
    }

    let mut detail = String::new();
    if let Some(pending) = snapshot.pending {
        detail.push_str(&format!("⏳ {} due at {} ms", pending.kind, pending.due_at_ms));
    }
    if let Some(countdown) = snapshot.countdown {
        detail.push_str(&format!("  T-{}", countdown.seconds_remaining));
        if countdown.launched {
            detail.push_str(" 🚀");
        }
    }
    if snapshot.stage == Stage::ChecksRunning || snapshot.stage == Stage::ChecksComplete {
        let done = snapshot.all_checks_completed();
        detail.push_str(&format!(
            "  checks: {} {}",
            snapshot.checks.len(),
            if done { "completed" } else { "pending" }
        ));
    }
    if snapshot.stage == Stage::MissionReview {
        let plan: Vec<String> = FlightPlanField::ALL
            .into_iter()
            .filter_map(|field| snapshot.flight_plan.get(field).map(|value| format!("{field}={value}")))
            .collect();
        detail.push_str(&format!("  plan: {}", plan.join(", ")));
    }
    if let Some(failure) = &snapshot.last_failure {
        detail.push_str(&format!("  ❌ {failure}"));
    }

    println!("[{:>6} ms] {:<22} {}", snapshot.clock_ms, snapshot.stage, detail.trim_start());
    Ok(())
}

fn variants_command(config: &RedwingConfig) {
    println!("✈️  Configured variants:");
    for (name, profile) in &config.variants {
        let default_marker = if *name == config.default_variant { " (default)" } else { "" };
        println!(
            "   {name}{default_marker}: {} [system {}], {} checks, ends at {}",
            profile.aircraft,
            profile.system_id,
            profile.checks.len(),
            profile.final_stage
        );
    }
}

fn config_command(config: &RedwingConfig, write: Option<PathBuf>) -> Result<()> {
    match write {
        Some(path) => {
            config.save_to_file(&path)?;
            println!("📝 Configuration written to {}", path.display());
        }
        None => print!("{}", toml::to_string_pretty(config)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use redwing::variants::{builtin_variants, FIGHTER_UAV_G};

    fn fighter() -> VariantProfile {
        builtin_variants()[FIGHTER_UAV_G].clone()
    }

    #[test]
    fn test_operator_fills_plan_before_uploading() {
        let profile = fighter();
        let mut workflow = FlightWorkflow::new(FIGHTER_UAV_G, profile.clone(), Default::default());
        workflow.connect();
        workflow.advance_to_next();
        workflow.proceed_to_checks();
        workflow.advance_to_next();
        workflow.proceed_to_destination();

        // Four selections, then continue
        for _ in 0..4 {
            let intent = next_intent(&workflow.snapshot(), &profile).unwrap();
            assert!(matches!(intent, Intent::SetFlightPlanField { .. }));
            assert!(workflow.dispatch(intent).is_accepted());
        }
        assert_eq!(next_intent(&workflow.snapshot(), &profile), Some(Intent::ProceedToUpload));
    }

    #[test]
    fn test_operator_waits_on_pending_tasks() {
        let profile = fighter();
        let mut workflow = FlightWorkflow::new(FIGHTER_UAV_G, profile.clone(), Default::default());
        assert_eq!(next_intent(&workflow.snapshot(), &profile), Some(Intent::Connect));
        workflow.connect();
        assert_eq!(next_intent(&workflow.snapshot(), &profile), None);
    }
}
