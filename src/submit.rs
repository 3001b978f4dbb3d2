use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::BigscriptError;
use crate::ledger::{JobLedger, JobLedgerEntry};
use crate::scheduler::{SchedulerClient, parse_job_id};

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionFailure {
    pub script: Utf8PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub ledger_path: Utf8PathBuf,
    pub ledger: JobLedger,
    pub failures: Vec<SubmissionFailure>,
}

// The cap is checked before the scheduler is touched.
pub fn submit<S: SchedulerClient + ?Sized>(
    scheduler: &S,
    scripts: &[Utf8PathBuf],
    max_jobs: usize,
    ledger_path: &Utf8Path,
) -> Result<Submission, BigscriptError> {
    if scripts.is_empty() {
        return Err(BigscriptError::NothingToSubmit);
    }
    if scripts.len() > max_jobs {
        warn!("more than {max_jobs} jobs to submit");
        return Err(BigscriptError::QuotaExceeded {
            planned: scripts.len(),
            max_jobs,
        });
    }

    info!("submitting {} SLURM jobs", scripts.len());
    let mut entries = Vec::with_capacity(scripts.len());
    let mut failures = Vec::new();
    for script in scripts {
        match scheduler.submit(script.as_std_path()) {
            Ok(stdout) => match parse_job_id(&stdout) {
                Some(job_id) => {
                    info!("submitted SLURM job for {script}: {}", stdout.trim());
                    entries.push(JobLedgerEntry::new(job_id, script.as_str()));
                }
                None => {
                    error!("no job id in sbatch output for {script}: {}", stdout.trim());
                    failures.push(SubmissionFailure {
                        script: script.clone(),
                        message: format!("no job id in output: {}", stdout.trim()),
                    });
                }
            },
            Err(err) => {
                error!("failed to submit SLURM job for {script}: {err}");
                failures.push(SubmissionFailure {
                    script: script.clone(),
                    message: err.to_string(),
                });
            }
        }
    }

    let ledger = JobLedger::new(entries);
    ledger.write(ledger_path)?;
    info!("submitted jobs written to {ledger_path}");
    info!("review their status with: bigscript job-status {ledger_path}");

    Ok(Submission {
        ledger_path: ledger_path.to_path_buf(),
        ledger,
        failures,
    })
}
