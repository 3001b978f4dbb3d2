use std::path::Path;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use bigscript::app::{App, BatchOutcome, CompositionRequest, ExtractRequest, Selection};
use bigscript::config::Settings;
use bigscript::error::BigscriptError;
use bigscript::extract::Extractor;
use bigscript::fetch::{ArchiveFetcher, FetchAction};
use bigscript::ledger::JobLedger;
use bigscript::manifest::ManifestRow;
use bigscript::scheduler::{JobAccounting, JobId, SchedulerClient};

const TSV: &str = "sample\tspecies_sylph\ttar_xz\ttar_xz_url\ttar_xz_md5\tfilename_in_tar_xz\n\
SAMN00000001\tEscherichia coli\tecoli.1.tar.xz\thttps://x/ecoli.1.tar.xz\t\tecoli.1/SAMN00000001.fa\n\
SAMN00000002\tEscherichia coli\tecoli.2.tar.xz\thttps://x/ecoli.2.tar.xz\t\tecoli.2/SAMN00000002.fa\n\
SAMN00000003\tSalmonella enterica\tsalm.1.tar.xz\thttps://x/salm.1.tar.xz\t\tsalm.1/SAMN00000003.fa\n\
SAMN00000004\tEscherichia coli\tecoli.1.tar.xz\thttps://x/ecoli.1.tar.xz\t\tecoli.1/SAMN00000004.fa\n";

#[derive(Default)]
struct MockScheduler {
    submitted: Mutex<Vec<String>>,
}

impl SchedulerClient for MockScheduler {
    fn submit(&self, script: &Path) -> Result<String, BigscriptError> {
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(script.to_string_lossy().to_string());
        Ok(format!("Submitted batch job {}", 500 + submitted.len()))
    }

    fn query_status(&self, _job_id: &JobId) -> Result<JobAccounting, BigscriptError> {
        Ok(JobAccounting {
            state: Some("COMPLETED".to_string()),
            ..JobAccounting::default()
        })
    }

    fn list_owned_jobs(&self) -> Result<Vec<JobId>, BigscriptError> {
        Ok(Vec::new())
    }

    fn cancel(&self, _job_ids: &[JobId]) -> Result<(), BigscriptError> {
        Ok(())
    }

    fn user(&self) -> &str {
        "tester"
    }
}

#[derive(Default)]
struct MockExtractor {
    calls: Mutex<Vec<String>>,
}

impl Extractor for MockExtractor {
    fn extract(
        &self,
        row: &ManifestRow,
        _archive_dir: &Utf8Path,
        output_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf, BigscriptError> {
        self.calls.lock().unwrap().push(row.sample_id.clone());
        Ok(output_dir.join(format!("{}.fa", row.sample_id)))
    }
}

#[derive(Default)]
struct MockFetcher;

impl ArchiveFetcher for MockFetcher {
    fn download(&self, _url: &str, destination: &Path) -> Result<(), BigscriptError> {
        std::fs::write(destination, b"archive").unwrap();
        Ok(())
    }
}

struct Fixture {
    _temp: tempfile::TempDir,
    root: Utf8PathBuf,
    app: App<MockScheduler, MockExtractor, MockFetcher>,
}

fn fixture(max_jobs: usize) -> Fixture {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let manifest_path = root.join("atb/metadata/file_list.tsv");
    std::fs::create_dir_all(manifest_path.parent().unwrap()).unwrap();
    std::fs::write(&manifest_path, TSV).unwrap();

    let mut settings = Settings::with_root(root.join("atb"));
    settings.manifest_path = manifest_path;
    settings.max_jobs = max_jobs;
    settings.tool_path = Utf8PathBuf::from("/opt/bigscript");

    let app = App::new(
        settings,
        MockScheduler::default(),
        MockExtractor::default(),
        MockFetcher,
    );
    Fixture {
        _temp: temp,
        root,
        app,
    }
}

fn species(name: &str) -> Selection {
    Selection::Species {
        species: name.parse().unwrap(),
        exact: false,
    }
}

#[test]
fn single_mode_extracts_each_row_in_process() {
    let fx = fixture(10);
    let output_dir = fx.root.join("flat");
    let result = fx
        .app
        .extract(ExtractRequest {
            selection: Selection::Accessions(vec!["SAMN00000003,SAMN00000001".to_string()]),
            output_dir: output_dir.clone(),
            batch: false,
            submit: false,
        })
        .unwrap();

    assert_eq!(result.files, 2);
    assert!(result.scripts.is_empty());
    assert_eq!(result.extracted[0], output_dir.join("SAMN00000001.fa"));
    assert!(output_dir.as_std_path().is_dir());
}

#[test]
fn batch_submission_writes_ledger_under_jobs() {
    let fx = fixture(10);
    let output_dir = fx.root.join("ecoli");
    let result = fx
        .app
        .extract(ExtractRequest {
            selection: species("Escherichia coli"),
            output_dir: output_dir.clone(),
            batch: true,
            submit: true,
        })
        .unwrap();

    assert_eq!(result.accessions, 3);
    assert_eq!(result.scripts.len(), 2);
    let submission = result.submission.unwrap();
    assert_eq!(submission.ledger_path, output_dir.join("jobs/submitted_jobs.csv"));

    let ledger = JobLedger::read(&submission.ledger_path).unwrap();
    assert_eq!(ledger.len(), 2);
    assert_eq!(ledger.entries[0].job_id.as_str(), "501");

    let status = fx.app.job_status(&submission.ledger_path).unwrap();
    assert!(status.ledger.entries.iter().all(|entry| entry.status == "COMPLETED"));
}

#[test]
fn over_quota_plan_writes_nothing() {
    let fx = fixture(1);
    let output_dir = fx.root.join("ecoli");
    let err = fx
        .app
        .extract(ExtractRequest {
            selection: species("Escherichia coli"),
            output_dir: output_dir.clone(),
            batch: true,
            submit: true,
        })
        .unwrap_err();

    assert_matches!(err, BigscriptError::QuotaExceeded { planned: 2, max_jobs: 1 });
    assert!(!output_dir.join("jobs").as_std_path().exists());
}

#[test]
fn unknown_accessions_fail_resolution() {
    let fx = fixture(10);
    let err = fx
        .app
        .extract(ExtractRequest {
            selection: Selection::Accessions(vec!["SAMN99999999".to_string()]),
            output_dir: fx.root.join("out"),
            batch: true,
            submit: false,
        })
        .unwrap_err();
    assert_matches!(err, BigscriptError::NoAccessionMatch(1));
}

#[test]
fn composition_plans_union_of_species_and_accessions() {
    let fx = fixture(10);
    let result = fx
        .app
        .composition(CompositionRequest {
            species: Some("Salmonella enterica".parse().unwrap()),
            accessions: vec!["SAMN00000001".to_string(), "SAMN00000003".to_string()],
            output_dir: fx.root.join("gc"),
            submit: false,
        })
        .unwrap();

    assert_eq!(result.accessions, 2);
    assert_eq!(result.mode, "composition");
    assert_eq!(result.scripts.len(), 2);
    assert!(result.submission.is_none());
}

#[test]
fn composition_needs_a_selection() {
    let fx = fixture(10);
    let err = fx
        .app
        .composition(CompositionRequest {
            species: None,
            accessions: Vec::new(),
            output_dir: fx.root.join("gc"),
            submit: false,
        })
        .unwrap_err();
    assert_matches!(err, BigscriptError::NoSelection);
}

#[test]
fn composition_batch_skips_existing_and_unknown_species() {
    let fx = fixture(10);
    let base = fx.root.join("gc");
    std::fs::create_dir_all(base.join("Salmonella_enterica")).unwrap();
    let species_file = fx.root.join("species.csv");
    std::fs::write(
        &species_file,
        "species\nEscherichia coli\nSalmonella enterica\nListeria monocytogenes\n",
    )
    .unwrap();

    let result = fx.app.composition_batch(&species_file, &base, false).unwrap();
    let outcomes = result
        .items
        .iter()
        .map(|item| item.outcome.clone())
        .collect::<Vec<_>>();
    assert_matches!(
        outcomes.as_slice(),
        [BatchOutcome::Planned, BatchOutcome::Skipped, BatchOutcome::NotFound]
    );
    assert!(base.join("Escherichia_coli/jobs/extract_0.slurm").as_std_path().exists());
}

#[test]
fn fetch_downloads_each_distinct_tarball() {
    let fx = fixture(10);
    let report = fx.app.fetch_archives().unwrap();
    assert_eq!(report.items.len(), 3);
    assert_eq!(report.count(FetchAction::Downloaded), 3);
    assert!(
        fx.app
            .settings()
            .archive_dir
            .join("salm.1.tar.xz")
            .as_std_path()
            .exists()
    );
}
