#![doc(issue_tracker_base_url = "https://github.com/strebacom/strebacom/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

//! strebacom - stream consensus and N2N routing experiments.

mod cli;

use clap::Parser;
use cli::{Cli, Command, OutputFormat};
use eyre::Result;
use strebacom_experiments::{Experiment, print_report_json, print_report_text, run_experiment};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignores errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    cli::init_tracing(cli.verbose, cli.log_format);

    let args = match cli.command {
        Command::List => {
            list_experiments();
            return Ok(());
        }
        Command::Run(args) => args,
    };

    let experiment = Experiment::from(args.experiment);
    let report = run_experiment(experiment, &args.options()).await?;
    if let Some(path) = &report.results_file {
        tracing::info!(path = %path.display(), "Results written");
    }

    match args.format {
        OutputFormat::Text => print_report_text(&report),
        OutputFormat::Json => print_report_json(&report)?,
    }

    // Exit with error code if any phase failed
    if !report.success() {
        std::process::exit(1);
    }

    Ok(())
}

fn list_experiments() {
    for experiment in Experiment::ALL {
        let chain = if experiment.requires_chain() { " [chain]" } else { "" };
        println!("{experiment}{chain}");
        println!("    {}", experiment.description());
        for phase in experiment.phase_names() {
            println!("    - {phase}");
        }
        println!();
    }
}
