use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use pv_modules::Status;
use pv_scenario::{ScenarioResult, ScenarioRunner, StepReport};
use tracing::Level;

#[derive(Parser)]
#[command(name = "pv-cli")]
#[command(about = "Status aggregation scenarios for process-variable applications", long_about = None)]
struct Cli {
    /// Log wiring and every published status
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate scenario file syntax and structure
    Validate {
        /// Path to the scenario YAML file
        scenario_path: PathBuf,
    },
    /// Print the module tree of a scenario
    Tree {
        /// Path to the scenario YAML file
        scenario_path: PathBuf,
    },
    /// Run all steps of a scenario and print the aggregated statuses
    Run {
        /// Path to the scenario YAML file
        scenario_path: PathBuf,
        /// Print the reports as YAML
        #[arg(long)]
        yaml: bool,
        /// Dump the state of every aggregator after the last step
        #[arg(long)]
        dump: bool,
    },
}

fn main() -> ScenarioResult<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    match cli.command {
        Commands::Validate { scenario_path } => cmd_validate(&scenario_path),
        Commands::Tree { scenario_path } => cmd_tree(&scenario_path),
        Commands::Run {
            scenario_path,
            yaml,
            dump,
        } => cmd_run(&scenario_path, yaml, dump),
    }
}

fn cmd_validate(scenario_path: &Path) -> ScenarioResult<()> {
    println!("Validating scenario: {}", scenario_path.display());
    let scenario = pv_scenario::load_yaml(scenario_path)?;
    println!(
        "✓ Scenario is valid ({} sources, {} aggregators, {} steps)",
        scenario.sources.len(),
        scenario.aggregators.len(),
        scenario.steps.len()
    );
    Ok(())
}

fn cmd_tree(scenario_path: &Path) -> ScenarioResult<()> {
    let scenario = pv_scenario::load_yaml(scenario_path)?;
    let runner = ScenarioRunner::new(&scenario)?;
    println!("{}", runner.tree());
    for aggregator in runner.aggregators() {
        println!(
            "{} ({:?}) <- {} inputs",
            aggregator.output().name(),
            aggregator.mode(),
            aggregator.inputs().len()
        );
        for input in aggregator.inputs() {
            match input.message_path() {
                Some(message) => println!("    {} + {}", input.name(), message),
                None => println!("    {}", input.name()),
            }
        }
    }
    runner.shutdown();
    Ok(())
}

fn cmd_run(scenario_path: &Path, yaml: bool, dump: bool) -> ScenarioResult<()> {
    let scenario = pv_scenario::load_yaml(scenario_path)?;
    println!("Running scenario: {}", scenario.name);
    let mut runner = ScenarioRunner::new(&scenario)?;
    let reports = runner.run()?;

    if yaml {
        print!("{}", serde_yaml::to_string(&reports)?);
    } else {
        for (index, report) in reports.iter().enumerate() {
            print_report(index, report);
        }
    }

    if dump {
        for aggregator in runner.aggregators() {
            print!("{}", aggregator.debug_dump());
        }
    }
    runner.shutdown();
    Ok(())
}

fn print_report(index: usize, report: &StepReport) {
    if report.description.is_empty() {
        println!("[{index}]");
    } else {
        println!("[{index}] {}", report.description);
    }
    let width = report
        .aggregates
        .iter()
        .map(|a| a.path.len())
        .max()
        .unwrap_or(0);
    for aggregate in &report.aggregates {
        let marker = match aggregate.status {
            Status::Ok => ' ',
            Status::Off => '-',
            Status::Warning => '!',
            Status::Fault => '✗',
        };
        if aggregate.message.is_empty() {
            println!("  {marker} {:<width$}  {}", aggregate.path, aggregate.status);
        } else {
            println!(
                "  {marker} {:<width$}  {:<7}  {}",
                aggregate.path,
                aggregate.status.as_str(),
                aggregate.message
            );
        }
    }
}
