use std::io::Read;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::Settings;
use crate::domain::{AccessionSet, ExtractMode, SpeciesName};
use crate::error::BigscriptError;
use crate::extract::{Extractor, extract_rows};
use crate::fetch::{ArchiveFetcher, FetchReport, fetch_archives};
use crate::ledger::JobLedger;
use crate::manifest::{Manifest, ManifestRow};
use crate::plan::plan;
use crate::reconcile::{KillReport, kill_all, reconcile};
use crate::resolve::{resolve_by_accessions, resolve_by_species, resolve_by_species_exact};
use crate::scheduler::SchedulerClient;
use crate::script::write_scripts;
use crate::store::{Store, ensure_dir};
use crate::submit::{Submission, submit};

#[derive(Debug, Clone)]
pub enum Selection {
    Species { species: SpeciesName, exact: bool },
    Accessions(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct ExtractRequest {
    pub selection: Selection,
    pub output_dir: Utf8PathBuf,
    pub batch: bool,
    pub submit: bool,
}

#[derive(Debug, Clone)]
pub struct CompositionRequest {
    pub species: Option<SpeciesName>,
    pub accessions: Vec<String>,
    pub output_dir: Utf8PathBuf,
    pub submit: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractResult {
    pub generated_at: DateTime<Utc>,
    pub mode: String,
    pub accessions: usize,
    pub files: usize,
    pub output_dir: Utf8PathBuf,
    pub extracted: Vec<Utf8PathBuf>,
    pub scripts: Vec<Utf8PathBuf>,
    pub submission: Option<Submission>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatusResult {
    pub generated_at: DateTime<Utc>,
    pub ledger_path: Utf8PathBuf,
    pub ledger: JobLedger,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    Planned,
    Skipped,
    NotFound,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub species: String,
    pub output_dir: Utf8PathBuf,
    pub outcome: BatchOutcome,
    pub result: Option<ExtractResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub generated_at: DateTime<Utc>,
    pub items: Vec<BatchItem>,
}

#[derive(Clone)]
pub struct App<S: SchedulerClient, E: Extractor, F: ArchiveFetcher> {
    settings: Settings,
    scheduler: S,
    extractor: E,
    fetcher: F,
}

impl<S: SchedulerClient, E: Extractor, F: ArchiveFetcher> App<S, E, F> {
    pub fn new(settings: Settings, scheduler: S, extractor: E, fetcher: F) -> Self {
        Self {
            settings,
            scheduler,
            extractor,
            fetcher,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn load_manifest(&self) -> Result<Manifest, BigscriptError> {
        Manifest::load(&self.settings.manifest_path, &self.settings.cache_path)
    }

    pub fn fetch_archives(&self) -> Result<FetchReport, BigscriptError> {
        let manifest = self.load_manifest()?;
        let tarballs = manifest.tarballs();
        info!(
            "{} distinct tarballs referenced by the file list",
            tarballs.len()
        );
        fetch_archives(&self.fetcher, &tarballs, &self.settings.archive_dir)
    }

    pub fn extract(&self, request: ExtractRequest) -> Result<ExtractResult, BigscriptError> {
        let manifest = self.load_manifest()?;
        let accessions = match &request.selection {
            Selection::Species { species, exact } if *exact => {
                resolve_by_species_exact(&manifest, species)?
            }
            Selection::Species { species, .. } => resolve_by_species(&manifest, species)?,
            Selection::Accessions(ids) => resolve_by_accessions(ids)?,
        };
        let rows = matched_rows(&manifest, &accessions)?;

        if !request.batch {
            ensure_dir(&request.output_dir)?;
            let extracted = extract_rows(
                &self.extractor,
                &rows,
                &self.settings.archive_dir,
                &request.output_dir,
            )?;
            info!("extracted {} files to {}", extracted.len(), request.output_dir);
            return Ok(ExtractResult {
                generated_at: Utc::now(),
                mode: ExtractMode::Assembly.to_string(),
                accessions: accessions.len(),
                files: rows.len(),
                output_dir: request.output_dir,
                extracted,
                scripts: Vec::new(),
                submission: None,
            });
        }

        self.run_batch(
            &rows,
            accessions.len(),
            &request.output_dir,
            ExtractMode::Assembly,
            request.submit,
        )
    }

    pub fn composition(
        &self,
        request: CompositionRequest,
    ) -> Result<ExtractResult, BigscriptError> {
        let manifest = self.load_manifest()?;
        self.composition_with(&manifest, request)
    }

    fn composition_with(
        &self,
        manifest: &Manifest,
        request: CompositionRequest,
    ) -> Result<ExtractResult, BigscriptError> {
        let by_species = request
            .species
            .as_ref()
            .map(|species| resolve_by_species(manifest, species))
            .transpose()?;
        let by_accession = if request.accessions.is_empty() {
            None
        } else {
            Some(resolve_by_accessions(&request.accessions)?)
        };
        let accessions = match (by_species, by_accession) {
            (Some(species), Some(listed)) => species.union(&listed),
            (Some(set), None) | (None, Some(set)) => set,
            (None, None) => return Err(BigscriptError::NoSelection),
        };
        let rows = matched_rows(manifest, &accessions)?;
        self.run_batch(
            &rows,
            accessions.len(),
            &request.output_dir,
            ExtractMode::Composition,
            request.submit,
        )
    }

    fn run_batch(
        &self,
        rows: &[&ManifestRow],
        accessions: usize,
        output_dir: &Utf8Path,
        mode: ExtractMode,
        submit_jobs: bool,
    ) -> Result<ExtractResult, BigscriptError> {
        let store = Store::new(output_dir.to_path_buf(), self.settings.scratch_dir.clone());
        let specs = plan(
            rows.iter().copied(),
            &store,
            &self.settings.archive_dir,
            mode,
        )?;
        // Over-quota plans are refused before anything lands on disk.
        if submit_jobs && specs.len() > self.settings.max_jobs {
            return Err(BigscriptError::QuotaExceeded {
                planned: specs.len(),
                max_jobs: self.settings.max_jobs,
            });
        }
        let scripts = write_scripts(&specs, &store, &self.settings.tool_path)?;
        info!("{} {mode} scripts written under {}", scripts.len(), store.jobs_dir());

        let submission = if submit_jobs {
            Some(submit(
                &self.scheduler,
                &scripts,
                self.settings.max_jobs,
                &store.ledger_path(),
            )?)
        } else {
            None
        };

        Ok(ExtractResult {
            generated_at: Utc::now(),
            mode: mode.to_string(),
            accessions,
            files: rows.len(),
            output_dir: output_dir.to_path_buf(),
            extracted: Vec::new(),
            scripts,
            submission,
        })
    }

    pub fn composition_batch(
        &self,
        species_file: &Utf8Path,
        output_base: &Utf8Path,
        submit_jobs: bool,
    ) -> Result<BatchResult, BigscriptError> {
        let file = std::fs::File::open(species_file.as_std_path())
            .map_err(|err| BigscriptError::SpeciesList(format!("{species_file}: {err}")))?;
        let species_list = read_species_list(file)?;
        let manifest = self.load_manifest()?;

        let mut items = Vec::with_capacity(species_list.len());
        for name in species_list {
            let output_dir = output_base.join(name.replace(' ', "_"));
            if output_dir.as_std_path().exists() {
                info!("skipping {name}: {output_dir} already exists");
                items.push(BatchItem {
                    species: name,
                    output_dir,
                    outcome: BatchOutcome::Skipped,
                    result: None,
                });
                continue;
            }

            let species: SpeciesName = name.parse()?;
            let request = CompositionRequest {
                species: Some(species),
                accessions: Vec::new(),
                output_dir: output_dir.clone(),
                submit: submit_jobs,
            };
            match self.composition_with(&manifest, request) {
                Ok(result) => items.push(BatchItem {
                    species: name,
                    output_dir,
                    outcome: BatchOutcome::Planned,
                    result: Some(result),
                }),
                Err(BigscriptError::NoSpeciesMatch(_)) => {
                    warn!("no files found for species {name}, skipping");
                    items.push(BatchItem {
                        species: name,
                        output_dir,
                        outcome: BatchOutcome::NotFound,
                        result: None,
                    });
                }
                Err(err) => return Err(err),
            }
        }

        Ok(BatchResult {
            generated_at: Utc::now(),
            items,
        })
    }

    pub fn job_status(&self, ledger_path: &Utf8Path) -> Result<JobStatusResult, BigscriptError> {
        let ledger = reconcile(&self.scheduler, ledger_path)?;
        Ok(JobStatusResult {
            generated_at: Utc::now(),
            ledger_path: ledger_path.to_path_buf(),
            ledger,
        })
    }

    pub fn kill_jobs(&self) -> Result<KillReport, BigscriptError> {
        kill_all(&self.scheduler)
    }
}

fn matched_rows<'a>(
    manifest: &'a Manifest,
    accessions: &AccessionSet,
) -> Result<Vec<&'a ManifestRow>, BigscriptError> {
    let rows = manifest.rows_for(accessions);
    if rows.is_empty() {
        return Err(BigscriptError::NoAccessionMatch(accessions.len()));
    }
    info!(
        "{} files matched for {} accessions",
        rows.len(),
        accessions.len()
    );
    Ok(rows)
}

pub fn read_species_list<R: Read>(reader: R) -> Result<Vec<String>, BigscriptError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(reader);
    let column = reader
        .headers()
        .map_err(|err| BigscriptError::SpeciesList(err.to_string()))?
        .iter()
        .position(|header| header.trim() == "species")
        .ok_or_else(|| BigscriptError::SpeciesList("missing `species` column".to_string()))?;

    let mut species = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| BigscriptError::SpeciesList(err.to_string()))?;
        if let Some(name) = record.get(column).map(str::trim).filter(|name| !name.is_empty()) {
            species.push(name.to_string());
        }
    }
    Ok(species)
}
