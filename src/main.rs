use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};

use labreport::{AssetPaths, Error, PatientData, RenderOptions, ReportConfig, ReportType};

#[derive(Parser)]
#[command(name = "labreport", version, about = "Render a clinic lab report to PDF")]
struct Cli {
    /// Patient record with its test results (JSON).
    #[arg(long, value_name = "FILE")]
    patient: PathBuf,

    /// Render options: selected tests, groups, comparison data, display options (JSON).
    #[arg(long, value_name = "FILE")]
    options: Option<PathBuf>,

    /// Partial report config overriding the defaults (JSON).
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding letterhead, cover, stamp and illustration images.
    #[arg(long = "assets-dir", value_name = "DIR")]
    assets_dir: Option<PathBuf>,

    /// normal, combined or comparison.
    #[arg(long = "report-type", value_name = "TYPE")]
    report_type: Option<ReportType>,

    /// Draw the letterhead image on every data page.
    #[arg(long)]
    letterhead: bool,

    /// Leave out the cover page.
    #[arg(long = "skip-cover")]
    skip_cover: bool,

    /// More log output (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Where to write the PDF.
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn run(cli: Cli) -> Result<(), Error> {
    let mut options: RenderOptions = match &cli.options {
        Some(path) => serde_json::from_slice(&std::fs::read(path)?)?,
        None => RenderOptions::default(),
    };
    if let Some(path) = &cli.config {
        options.config = ReportConfig::from_json(&std::fs::read_to_string(path)?)?;
    }
    if let Some(report_type) = cli.report_type {
        options.report_type = report_type;
    }
    options.include_letterhead |= cli.letterhead;
    options.skip_cover |= cli.skip_cover;

    if options.selected_tests.is_empty() {
        let patient: PatientData = serde_json::from_slice(&std::fs::read(&cli.patient)?)?;
        options.selected_tests = patient.bloodtest.keys().cloned().collect();
        log::info!("no tests selected, printing all {}", options.selected_tests.len());
    }

    let assets = cli
        .assets_dir
        .as_deref()
        .map(AssetPaths::from_dir)
        .unwrap_or_default();
    labreport::render_report_to_file(&cli.patient, &options, &assets, &cli.output)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
