use clap::Parser;
use labelcut::config::RunConfig;
use labelcut::logging::init_logging;
use labelcut::run_problem;
use labelcut::schema::ProblemInstance;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Multi-label graph-cut optimization CLI")]
struct Cli {
    /// Path to run configuration file (JSON)
    #[arg(long, default_value = "run_config.json")]
    config: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_text = std::fs::read_to_string(&cli.config)?;
    let config: RunConfig = serde_json::from_str(&config_text)?;
    init_logging(&config.logging)?;
    let problem_text = std::fs::read_to_string(&config.problem_file)?;
    let problem: ProblemInstance = serde_json::from_str(&problem_text)?;
    let (optimizer, report) = run_problem(&problem, &config)?;
    println!(
        "Final energy: {} ({:?} after {} passes)",
        report.final_energy, report.status, report.passes
    );
    if let Some(path) = &config.output.output_path {
        let payload = if config.output.save_labeling {
            serde_json::json!({ "report": report, "labeling": optimizer.labeling() })
        } else {
            serde_json::json!({ "report": report })
        };
        std::fs::write(path, serde_json::to_string_pretty(&payload)?)?;
    }
    info!(
        target: "labelcut::cli",
        final_energy = report.final_energy,
        passes = report.passes,
        moves_applied = report.diagnostics.moves_applied,
        "run completed"
    );
    Ok(())
}
