use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use schema_promote::config::LoggingConfig;
use schema_promote::schema::difference::RiskSummary;
use schema_promote::utils::logging::init_logging;
use schema_promote::{
    Comparison, DiffEngine, FileSnapshotSource, RiskLevel, ScriptGenerator, ScriptOptions,
    SnapshotSource, SyncAction,
};

/// Exit status when `compare --fail-on-drift` finds differences
const DRIFT_EXIT_CODE: i32 = 3;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "schema_promote.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare the baseline against every configured environment
    Compare {
        /// Print comparisons as JSON
        #[arg(long)]
        json: bool,
        /// Exit with status 3 when any environment differs from the baseline
        #[arg(long)]
        fail_on_drift: bool,
    },
    /// Generate and write apply/rollback scripts
    Script {
        /// Only script Low and Medium risk differences
        #[arg(long)]
        executable_only: bool,
    },
    /// Compare two snapshot files without a configuration file
    Diff {
        baseline: PathBuf,
        target: PathBuf,
        #[arg(long)]
        json: bool,
        /// Print the apply script for the executable differences
        #[arg(long)]
        script: bool,
    },
}

fn print_summary(comparison: &Comparison) {
    let summary = RiskSummary::from_differences(&comparison.differences);
    println!(
        "{} -> {}: {} difference(s) (low {}, medium {}, high {}, forbidden {})",
        comparison.baseline,
        comparison.target,
        summary.total(),
        summary.low,
        summary.medium,
        summary.high,
        summary.forbidden
    );

    for difference in comparison.sorted_by_risk() {
        println!("  [{:>9}] {}", difference.risk_level.to_string(), difference.description);
    }
}

fn print_comparisons(comparisons: &[Comparison], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(comparisons)?);
    } else {
        for comparison in comparisons {
            print_summary(comparison);
        }
    }
    Ok(())
}

async fn diff_files(baseline: PathBuf, target: PathBuf, json: bool, script: bool) -> Result<()> {
    init_logging(&Some(LoggingConfig {
        level: "warn".to_string(),
        file: None,
        format: "text".to_string(),
        stdout: true,
    }))?;

    let mut source = FileSnapshotSource::default();
    source.insert("baseline", baseline.clone());
    source.insert("target", target.clone());

    let baseline_snapshot = source
        .load("baseline")
        .await
        .with_context(|| format!("Failed to load {}", baseline.display()))?;
    let target_snapshot = source
        .load("target")
        .await
        .with_context(|| format!("Failed to load {}", target.display()))?;

    let mut comparison = DiffEngine::default().compare(&baseline_snapshot, &target_snapshot);
    print_comparisons(std::slice::from_ref(&comparison), json)?;

    if script && comparison.has_differences() {
        comparison.approve_executable();
        for difference in comparison.differences_mut() {
            if difference.risk_level > RiskLevel::Medium {
                difference.sync_action = SyncAction::Skip;
            }
        }

        let options = ScriptOptions::default();
        let sync_script = ScriptGenerator::new(&options).generate_for_comparison(
            &comparison,
            &baseline_snapshot,
            &target_snapshot,
        )?;
        println!("{}", sync_script.apply_script());
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Compare { json, fail_on_drift } => {
            let client = schema_promote::init(&cli.config)
                .await
                .with_context(|| format!("Failed to initialize from {}", cli.config))?;
            let plan = client.compare_environments().await?;

            print_comparisons(&plan.comparisons, json)?;

            if fail_on_drift && plan.has_drift() {
                std::process::exit(DRIFT_EXIT_CODE);
            }
        }
        Commands::Script { executable_only } => {
            let client = schema_promote::init(&cli.config)
                .await
                .with_context(|| format!("Failed to initialize from {}", cli.config))?;
            let scripts = client.promote(executable_only).await?;

            if scripts.is_empty() {
                println!("No scripts generated");
            }
            for script in scripts {
                println!(
                    "{}: {} difference(s), max risk {}, {}",
                    script.target,
                    script.differences.len(),
                    script.max_risk_level(),
                    if script.can_execute() {
                        "can execute"
                    } else {
                        "manual review required"
                    }
                );
            }
            println!("Scripts written to {}", client.config().scripts.output_directory);
        }
        Commands::Diff {
            baseline,
            target,
            json,
            script,
        } => diff_files(baseline, target, json, script).await?,
    }

    Ok(())
}
