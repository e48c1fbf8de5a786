use std::process::ExitCode;

use anyhow::{Result, anyhow};
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use shopflow_e2e::{Harness, Scenario, load_config};

#[derive(Parser, Debug)]
#[command(
    name = "shopflow-e2e",
    version,
    about = "End-to-end checks for the product and order services"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Wait for the services, then run every scenario
    Run(RunArgs),
    /// Only run the readiness gate
    Probe(ConfigArgs),
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// Path to a TOML config file (defaults to config/e2e.toml when present)
    #[arg(long, value_name = "PATH")]
    config: Option<Utf8PathBuf>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    config: ConfigArgs,
    /// Print the run report as JSON instead of the text summary
    #[arg(long)]
    json: bool,
    /// Run only the named scenario(s); repeatable
    #[arg(long = "only", value_name = "SCENARIO")]
    only: Vec<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Probe(args) => probe(args).await,
    }
}

async fn run(args: RunArgs) -> Result<ExitCode> {
    let config = load_config(args.config.config.as_deref())?;
    let scenarios = select_scenarios(&args.only)?;
    let harness = Harness::new(config)?;

    let report = harness.run(&scenarios).await;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render_summary());
    }

    Ok(if report.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn probe(args: ConfigArgs) -> Result<ExitCode> {
    let config = load_config(args.config.as_deref())?;
    let harness = Harness::new(config)?;
    match harness.ensure_services_ready().await {
        Ok(probes) => {
            for probe in probes {
                println!("{} ready after {} attempt(s)", probe.service, probe.attempts);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("{err}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn select_scenarios(only: &[String]) -> Result<Vec<Scenario>> {
    if only.is_empty() {
        return Ok(Scenario::all());
    }
    only.iter()
        .map(|name| {
            Scenario::from_name(name).ok_or_else(|| {
                let known: Vec<String> = Scenario::all().iter().map(Scenario::name).collect();
                anyhow!("unknown scenario {name:?}; known: {}", known.join(", "))
            })
        })
        .collect()
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_run_with_filters() {
        let cli = Cli::try_parse_from([
            "shopflow-e2e",
            "run",
            "--json",
            "--only",
            "product-lifecycle",
            "--only",
            "order-deducts-stock",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert!(args.json);
        let selected = select_scenarios(&args.only).unwrap();
        assert_eq!(
            selected,
            vec![Scenario::ProductLifecycle, Scenario::OrderDeductsStock]
        );
    }

    #[test]
    fn unknown_scenario_is_rejected() {
        let err = select_scenarios(&["checkout".to_string()]).unwrap_err();
        assert!(err.to_string().contains("unknown scenario \"checkout\""));
    }

    #[test]
    fn empty_filter_selects_everything() {
        assert_eq!(select_scenarios(&[]).unwrap(), Scenario::all());
    }
}
