use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use t1_volume_counter::app::{App, RunSummary};
use t1_volume_counter::config::{ConfigLoader, RunConfig};
use t1_volume_counter::domain::AnalysisLevel;
use t1_volume_counter::error::VolumeCounterError;
use t1_volume_counter::output::{JsonOutput, OutputMode, TracingSink, version_banner};
use t1_volume_counter::volume::NiftiHeaderReader;

#[derive(Parser)]
#[command(name = "t1-volume-counter")]
#[command(about = "BIDS App: T1 Volume Counter - Counts volumes in T1w images")]
#[command(author, disable_version_flag = true)]
struct Cli {
    /// The directory with the input dataset formatted according to the BIDS standard.
    #[arg(required_unless_present = "version")]
    bids_dir: Option<PathBuf>,

    /// The directory where the output files should be stored.
    #[arg(required_unless_present = "version")]
    output_dir: Option<PathBuf>,

    /// Level of the analysis that will be performed. Multiple participant level
    /// analyses can be run independently using the same output_dir.
    #[arg(required_unless_present = "version")]
    analysis_level: Option<AnalysisLevel>,

    /// The label(s) of the participant(s) that should be analyzed, with or
    /// without the "sub-" prefix. All subjects are analyzed when omitted.
    #[arg(long = "participant-label", alias = "participant_label", num_args = 1..)]
    participant_label: Vec<String>,

    /// Print version information and exit.
    #[arg(short = 'v', long = "version")]
    version: bool,

    /// Enable verbose logging.
    #[arg(long)]
    verbose: bool,

    /// Print a JSON run summary to stdout.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<VolumeCounterError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &VolumeCounterError) -> u8 {
    match error {
        VolumeCounterError::MissingInputDir(_) => 1,
        VolumeCounterError::InvalidParticipantLabel(_) => 1,
        VolumeCounterError::ImageRead { .. }
        | VolumeCounterError::Serialize(_)
        | VolumeCounterError::Filesystem(_) => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    if cli.version {
        println!("{}", version_banner());
        return Ok(());
    }

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };
    let config = resolve_config(cli)?;

    let app = App::new(NiftiHeaderReader::new());
    let summary = app.run(&config, &TracingSink)?;

    match output_mode {
        OutputMode::Json => JsonOutput::print_summary(&summary).into_diagnostic()?,
        OutputMode::Human => print_run_summary(&summary),
    }
    Ok(())
}

fn resolve_config(cli: Cli) -> miette::Result<RunConfig> {
    let (Some(bids_dir), Some(output_dir), Some(analysis_level)) =
        (cli.bids_dir, cli.output_dir, cli.analysis_level)
    else {
        return Err(miette::Report::msg(
            "bids_dir, output_dir and analysis_level are required",
        ));
    };
    let config = ConfigLoader::resolve(
        bids_dir,
        output_dir,
        analysis_level,
        &cli.participant_label,
    )?;
    Ok(config)
}

fn print_run_summary(summary: &RunSummary) {
    println!("T1 volume counter ({} level)", summary.analysis_level);
    for run in &summary.runs {
        let scope = run.participant.as_deref().unwrap_or("all participants");
        println!(
            "  {scope}: {} image(s) counted, {} file(s) written",
            run.records,
            run.written.len()
        );
    }
    if let Some(found) = summary.participants_table_found {
        let state = if found { "present" } else { "missing" };
        println!("  participants.tsv: {state}");
    }
}
