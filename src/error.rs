use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum BigscriptError {
    #[error("invalid species name (expected `<genus> <epithet>`): {0}")]
    InvalidSpecies(String),

    #[error("no files found for species: {0}")]
    NoSpeciesMatch(String),

    #[error("no accession codes given")]
    EmptyAccessionList,

    #[error("either a species or a list of accession codes must be given")]
    NoSelection,

    #[error("none of the {0} requested accessions are present in the file list")]
    NoAccessionMatch(usize),

    #[error("accession code must be at least 8 characters long for folder structure: {0}")]
    AccessionTooShort(String),

    #[error("accession code must be plain ASCII: {0}")]
    NonAsciiAccession(String),

    #[error(
        "files in tarball {tarball} do not share one nesting depth ({first} has depth {expected}, {path} has depth {found})"
    )]
    MixedStripDepth {
        tarball: String,
        first: String,
        path: String,
        expected: usize,
        found: usize,
    },

    #[error(
        "{planned} jobs planned but at most {max_jobs} may be submitted at once; reduce the accessions or raise --max-jobs"
    )]
    QuotaExceeded { planned: usize, max_jobs: usize },

    #[error("no job scripts to submit")]
    NothingToSubmit,

    #[error("file list not found at {0} and no cache exists")]
    ManifestMissing(PathBuf),

    #[error("failed to parse file list: {0}")]
    ManifestParse(String),

    #[error("failed to read or write file list cache: {0}")]
    ManifestCache(String),

    #[error("failed to read or write job table: {0}")]
    Ledger(String),

    #[error("tarball {0} does not exist; download it first with `bigscript fetch-atb`")]
    MissingArchive(PathBuf),

    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("scheduler command failed: {0}")]
    Scheduler(String),

    #[error("unable to determine the current user")]
    UnknownUser,

    #[error("download failed: {0}")]
    DownloadHttp(String),

    #[error("download returned status {status}: {message}")]
    DownloadStatus { status: u16, message: String },

    #[error("failed to read species list: {0}")]
    SpeciesList(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
