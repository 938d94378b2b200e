use anyhow::{Context, Result};
use clap::Parser;
use rp_harness::config::HarnessConfig;
use rp_harness::fixtures::FixtureStore;
use rp_harness::scenario::{verify_protocol_convergence, ScenarioRunner};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the harness configuration file (JSON5)
    #[arg(long)]
    config: PathBuf,

    /// Run only the test case with this id
    #[arg(long)]
    case: Option<u32>,

    /// Skip the protocol convergence prechecks
    #[arg(long)]
    skip_prechecks: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = HarnessConfig::load_from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    config.validate()?;

    let topo = config.build_topology();
    let fixtures = FixtureStore::new(&config.fixture_dir);
    let spec = config.poll_spec();

    // Prechecks failing means the control plane never settled; scenario
    // results would be meaningless noise on top of that.
    if !args.skip_prechecks {
        for check in &config.prechecks {
            verify_protocol_convergence(
                &topo,
                &fixtures,
                &spec,
                &check.router,
                &check.command,
                &check.fixture,
            )
            .await
            .context("protocol convergence precheck failed")?;
        }
    }

    let mut runner = ScenarioRunner::new(&topo, &fixtures, config.scenario_config());
    let mut failures = 0usize;
    let selected = config
        .cases
        .iter()
        .filter(|c| args.case.map_or(true, |id| c.id == id));

    for case in selected {
        match runner.run(case).await {
            Ok(report) => info!(
                case = case.id,
                ingress_attempts = report.ingress_attempts,
                rp_attempts = report.rp_attempts,
                "scenario passed"
            ),
            Err(e) if e.is_infrastructure() => {
                error!(case = case.id, error = %e, "infrastructure failure, aborting remaining scenarios");
                return Ok(ExitCode::FAILURE);
            }
            Err(e) => {
                failures += 1;
                error!(case = case.id, error = %e, "scenario failed");
                if let Some(expected) = e.expected() {
                    error!("expected:\n{}", serde_json::to_string_pretty(expected)?);
                }
                if let Some(observed) = e.observed() {
                    error!("observed:\n{}", serde_json::to_string_pretty(observed)?);
                }
            }
        }
    }

    if failures > 0 {
        error!(failures, "run finished with failing scenarios");
        Ok(ExitCode::FAILURE)
    } else {
        info!("all scenarios passed");
        Ok(ExitCode::SUCCESS)
    }
}
