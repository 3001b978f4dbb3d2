use std::path::Path;
use std::process::ExitCode;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use bigscript::app::{App, CompositionRequest, ExtractRequest, Selection};
use bigscript::composition::{count_file, results_line};
use bigscript::config::{ConfigLoader, Settings, SettingsOverrides};
use bigscript::domain::SpeciesName;
use bigscript::error::BigscriptError;
use bigscript::extract::{Extractor, TarExtractor};
use bigscript::fetch::{ArchiveFetcher, HttpArchiveFetcher};
use bigscript::manifest::ManifestRow;
use bigscript::output::{JsonOutput, OutputMode, TextOutput};
use bigscript::scheduler::{JobAccounting, JobId, SchedulerClient, SlurmClient};

#[derive(Parser)]
#[command(name = "bigscript")]
#[command(about = "Extract assemblies from AllTheBacteria tarballs and run them as SLURM jobs")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true, help = "JSON settings file (default: ./bigscript.json when present)")]
    config: Option<String>,

    #[command(flatten)]
    paths: PathArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct PathArgs {
    #[arg(long, global = true, help = "Compressed file list (TSV) to read instead of the configured one")]
    tsv_gz_path: Option<Utf8PathBuf>,

    #[arg(long, global = true)]
    archive_dir: Option<Utf8PathBuf>,

    #[arg(long, global = true)]
    cache_path: Option<Utf8PathBuf>,

    #[arg(long, global = true, help = "Refuse to submit more jobs than this")]
    max_jobs: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download every tarball referenced by the file list")]
    FetchAtb,
    #[command(about = "Extract all assemblies of a species")]
    GetSpecies(SpeciesArgs),
    #[command(about = "Extract assemblies by accession code")]
    GetAccessions(AccessionArgs),
    #[command(about = "Cancel every SLURM job owned by the current user")]
    KillSlurmJobs,
    #[command(about = "Refresh and show the status of submitted jobs")]
    JobStatus(JobStatusArgs),
    #[command(about = "Plan GC composition jobs for a species and/or accessions")]
    RunGc(RunGcArgs),
    #[command(about = "Plan GC composition jobs for every species in a CSV")]
    RunGcBatch(RunGcBatchArgs),
    #[command(about = "Count bases of a FASTA file (used by composition jobs)")]
    CountBases(CountBasesArgs),
}

#[derive(Args, Clone)]
struct ExtractArgs {
    #[arg(short, long)]
    output_dir: Utf8PathBuf,

    #[arg(long, help = "Write one SLURM script per tarball instead of extracting here")]
    batch: bool,

    #[arg(long, help = "Submit the generated scripts (implies --batch)")]
    submit: bool,
}

#[derive(Args)]
struct SpeciesArgs {
    #[arg(required = true, num_args = 1.., help = "Genus and epithet, e.g. Escherichia coli")]
    species: Vec<String>,

    #[arg(long, help = "Match the species label exactly instead of allowing lineage suffixes")]
    exact: bool,

    #[command(flatten)]
    extract: ExtractArgs,
}

#[derive(Args)]
struct AccessionArgs {
    #[arg(required = true, num_args = 1.., help = "Accession codes, separated by spaces or commas")]
    accessions: Vec<String>,

    #[command(flatten)]
    extract: ExtractArgs,
}

#[derive(Args)]
struct JobStatusArgs {
    ledger: Utf8PathBuf,
}

#[derive(Args)]
struct RunGcArgs {
    #[arg(long, num_args = 1..)]
    species: Option<Vec<String>>,

    #[arg(long, num_args = 1..)]
    accessions: Vec<String>,

    #[arg(short, long)]
    output_dir: Utf8PathBuf,

    #[arg(long)]
    submit: bool,
}

#[derive(Args)]
struct RunGcBatchArgs {
    #[arg(help = "CSV file with a species column")]
    species_file: Utf8PathBuf,

    #[arg(short, long)]
    output_base: Utf8PathBuf,

    #[arg(long)]
    submit: bool,
}

#[derive(Args)]
struct CountBasesArgs {
    file: Utf8PathBuf,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<BigscriptError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &BigscriptError) -> u8 {
    match error {
        BigscriptError::InvalidSpecies(_)
        | BigscriptError::NoSpeciesMatch(_)
        | BigscriptError::EmptyAccessionList
        | BigscriptError::NoSelection
        | BigscriptError::NoAccessionMatch(_)
        | BigscriptError::AccessionTooShort(_)
        | BigscriptError::NonAsciiAccession(_)
        | BigscriptError::MixedStripDepth { .. }
        | BigscriptError::ManifestMissing(_)
        | BigscriptError::MissingArchive(_)
        | BigscriptError::SpeciesList(_) => 2,
        BigscriptError::ExtractionFailed(_)
        | BigscriptError::MissingTool(_)
        | BigscriptError::Scheduler(_)
        | BigscriptError::UnknownUser
        | BigscriptError::DownloadHttp(_)
        | BigscriptError::DownloadStatus { .. } => 3,
        BigscriptError::QuotaExceeded { .. } => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    if let Commands::CountBases(args) = &cli.command {
        return run_count_bases(&args.file, output_mode);
    }

    let settings = resolve_settings(cli.config.as_deref(), cli.paths)?;

    match cli.command {
        Commands::FetchAtb => {
            let fetcher = HttpArchiveFetcher::new()?;
            let app = App::new(settings, NopScheduler, NopExtractor, fetcher);
            let result = app.fetch_archives()?;
            let printed = match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_fetch(&result),
                OutputMode::Interactive => TextOutput::print_fetch(&result),
            };
            printed.into_diagnostic()
        }
        Commands::GetSpecies(args) => {
            let species = args.species.join(" ").parse::<SpeciesName>()?;
            let selection = Selection::Species {
                species,
                exact: args.exact,
            };
            run_extract(settings, selection, args.extract, output_mode)
        }
        Commands::GetAccessions(args) => {
            let selection = Selection::Accessions(args.accessions);
            run_extract(settings, selection, args.extract, output_mode)
        }
        Commands::KillSlurmJobs => {
            let app = App::new(settings, SlurmClient::new()?, NopExtractor, NopFetcher);
            let result = app.kill_jobs()?;
            let printed = match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_kill(&result),
                OutputMode::Interactive => TextOutput::print_kill(&result),
            };
            printed.into_diagnostic()
        }
        Commands::JobStatus(args) => {
            let app = App::new(settings, SlurmClient::new()?, NopExtractor, NopFetcher);
            let result = app.job_status(&args.ledger)?;
            let printed = match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_status(&result),
                OutputMode::Interactive => TextOutput::print_status(&result),
            };
            printed.into_diagnostic()
        }
        Commands::RunGc(args) => {
            let species = args
                .species
                .map(|words| words.join(" ").parse::<SpeciesName>())
                .transpose()?;
            let app = App::new(settings, scheduler_for(args.submit)?, NopExtractor, NopFetcher);
            let result = app.composition(CompositionRequest {
                species,
                accessions: args.accessions,
                output_dir: args.output_dir,
                submit: args.submit,
            })?;
            let printed = match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_extract(&result),
                OutputMode::Interactive => TextOutput::print_extract(&result),
            };
            printed.into_diagnostic()
        }
        Commands::RunGcBatch(args) => {
            let app = App::new(settings, scheduler_for(args.submit)?, NopExtractor, NopFetcher);
            let result =
                app.composition_batch(&args.species_file, &args.output_base, args.submit)?;
            let printed = match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_batch(&result),
                OutputMode::Interactive => TextOutput::print_batch(&result),
            };
            printed.into_diagnostic()
        }
        Commands::CountBases(args) => run_count_bases(&args.file, output_mode),
    }
}

fn resolve_settings(config: Option<&str>, paths: PathArgs) -> miette::Result<Settings> {
    let settings = ConfigLoader::resolve(config)?;
    let overrides = SettingsOverrides {
        manifest_path: paths.tsv_gz_path,
        archive_dir: paths.archive_dir,
        cache_path: paths.cache_path,
        max_jobs: paths.max_jobs,
    };
    Ok(overrides.apply(settings))
}

fn run_extract(
    settings: Settings,
    selection: Selection,
    args: ExtractArgs,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let app = App::new(
        settings,
        scheduler_for(args.submit)?,
        TarExtractor::new(),
        NopFetcher,
    );
    let result = app.extract(ExtractRequest {
        selection,
        output_dir: args.output_dir,
        batch: args.batch || args.submit,
        submit: args.submit,
    })?;
    let printed = match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_extract(&result),
        OutputMode::Interactive => TextOutput::print_extract(&result),
    };
    printed.into_diagnostic()
}

fn run_count_bases(file: &Utf8Path, output_mode: OutputMode) -> miette::Result<()> {
    let counts = count_file(file)?;
    match output_mode {
        OutputMode::NonInteractive => {
            let name = file.file_name().unwrap_or(file.as_str());
            JsonOutput::print_counts(name, &counts).into_diagnostic()
        }
        OutputMode::Interactive => {
            println!("{}", results_line(file, &counts));
            Ok(())
        }
    }
}

fn scheduler_for(submit: bool) -> Result<Box<dyn SchedulerClient>, BigscriptError> {
    if submit {
        Ok(Box::new(SlurmClient::new()?))
    } else {
        Ok(Box::new(NopScheduler))
    }
}

struct NopScheduler;
struct NopExtractor;
struct NopFetcher;

impl SchedulerClient for NopScheduler {
    fn submit(&self, _script: &Path) -> Result<String, BigscriptError> {
        Err(BigscriptError::Scheduler(
            "scheduler not configured".to_string(),
        ))
    }

    fn query_status(&self, _job_id: &JobId) -> Result<JobAccounting, BigscriptError> {
        Err(BigscriptError::Scheduler(
            "scheduler not configured".to_string(),
        ))
    }

    fn list_owned_jobs(&self) -> Result<Vec<JobId>, BigscriptError> {
        Err(BigscriptError::Scheduler(
            "scheduler not configured".to_string(),
        ))
    }

    fn cancel(&self, _job_ids: &[JobId]) -> Result<(), BigscriptError> {
        Err(BigscriptError::Scheduler(
            "scheduler not configured".to_string(),
        ))
    }

    fn user(&self) -> &str {
        ""
    }
}

impl Extractor for NopExtractor {
    fn extract(
        &self,
        _row: &ManifestRow,
        _archive_dir: &Utf8Path,
        _output_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf, BigscriptError> {
        Err(BigscriptError::MissingTool(
            "extractor not configured".to_string(),
        ))
    }
}

impl ArchiveFetcher for NopFetcher {
    fn download(&self, _url: &str, _destination: &Path) -> Result<(), BigscriptError> {
        Err(BigscriptError::DownloadHttp(
            "downloader not configured".to_string(),
        ))
    }
}
