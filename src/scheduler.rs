use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;
use tracing::debug;

use crate::error::BigscriptError;

pub const ACCOUNTING_FIELDS: &str = "JobID,State,Elapsed,NodeList,Start,End,Reason";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub fn parse_job_id(submit_output: &str) -> Option<JobId> {
    submit_output
        .split_whitespace()
        .find(|token| token.chars().all(|ch| ch.is_ascii_digit()))
        .map(JobId::new)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobAccounting {
    pub state: Option<String>,
    pub elapsed: Option<String>,
    pub node_list: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub reason: Option<String>,
}

impl JobAccounting {
    pub fn from_fields(fields: &BTreeMap<String, String>) -> Self {
        let get = |key: &str| {
            fields
                .get(key)
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        Self {
            state: get("State"),
            elapsed: get("Elapsed"),
            node_list: get("NodeList"),
            start: get("Start"),
            end: get("End"),
            reason: get("Reason"),
        }
    }
}

// `.batch`/`.extern` step rows are skipped.
pub fn parse_sacct(output: &str, job_id: &JobId) -> JobAccounting {
    let mut lines = output.lines().filter(|line| !line.trim().is_empty());
    let Some(header) = lines.next() else {
        return JobAccounting::default();
    };
    let headers = header.split('|').map(str::trim).collect::<Vec<_>>();
    for line in lines {
        let fields = headers
            .iter()
            .zip(line.split('|'))
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<BTreeMap<_, _>>();
        if fields.get("JobID").map(|id| id.trim()) == Some(job_id.as_str()) {
            return JobAccounting::from_fields(&fields);
        }
    }
    JobAccounting::default()
}

pub trait SchedulerClient {
    fn submit(&self, script: &Path) -> Result<String, BigscriptError>;
    fn query_status(&self, job_id: &JobId) -> Result<JobAccounting, BigscriptError>;
    fn list_owned_jobs(&self) -> Result<Vec<JobId>, BigscriptError>;
    fn cancel(&self, job_ids: &[JobId]) -> Result<(), BigscriptError>;
    fn user(&self) -> &str;
}

impl<T: SchedulerClient + ?Sized> SchedulerClient for Box<T> {
    fn submit(&self, script: &Path) -> Result<String, BigscriptError> {
        (**self).submit(script)
    }

    fn query_status(&self, job_id: &JobId) -> Result<JobAccounting, BigscriptError> {
        (**self).query_status(job_id)
    }

    fn list_owned_jobs(&self) -> Result<Vec<JobId>, BigscriptError> {
        (**self).list_owned_jobs()
    }

    fn cancel(&self, job_ids: &[JobId]) -> Result<(), BigscriptError> {
        (**self).cancel(job_ids)
    }

    fn user(&self) -> &str {
        (**self).user()
    }
}

#[derive(Debug, Clone)]
pub struct SlurmClient {
    user: String,
    sbatch: Option<PathBuf>,
    sacct: Option<PathBuf>,
    squeue: Option<PathBuf>,
    scancel: Option<PathBuf>,
}

impl SlurmClient {
    pub fn new() -> Result<Self, BigscriptError> {
        let user = ["USER", "LOGNAME"]
            .iter()
            .filter_map(|key| std::env::var(key).ok())
            .find(|value| !value.trim().is_empty())
            .ok_or(BigscriptError::UnknownUser)?;
        Ok(Self {
            user,
            sbatch: find_in_path("sbatch"),
            sacct: find_in_path("sacct"),
            squeue: find_in_path("squeue"),
            scancel: find_in_path("scancel"),
        })
    }

    fn require<'a>(tool: &'a Option<PathBuf>, name: &str) -> Result<&'a PathBuf, BigscriptError> {
        tool.as_ref()
            .ok_or_else(|| BigscriptError::MissingTool(name.to_string()))
    }

    fn run_cmd(&self, program: &Path, args: &[String]) -> Result<String, BigscriptError> {
        debug!("running {} {}", program.display(), args.join(" "));
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| BigscriptError::Scheduler(err.to_string()))?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).to_string());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("command failed: {} ({})", program.display(), output.status)
        } else {
            stderr
        };
        Err(BigscriptError::Scheduler(message))
    }
}

impl SchedulerClient for SlurmClient {
    fn submit(&self, script: &Path) -> Result<String, BigscriptError> {
        let sbatch = Self::require(&self.sbatch, "sbatch")?;
        self.run_cmd(sbatch, &[script.to_string_lossy().to_string()])
    }

    fn query_status(&self, job_id: &JobId) -> Result<JobAccounting, BigscriptError> {
        let sacct = Self::require(&self.sacct, "sacct")?;
        let args = vec![
            "-j".to_string(),
            job_id.to_string(),
            "--parsable2".to_string(),
            "--format".to_string(),
            ACCOUNTING_FIELDS.to_string(),
        ];
        let output = self.run_cmd(sacct, &args)?;
        Ok(parse_sacct(&output, job_id))
    }

    fn list_owned_jobs(&self) -> Result<Vec<JobId>, BigscriptError> {
        let squeue = Self::require(&self.squeue, "squeue")?;
        let args = vec![
            "-u".to_string(),
            self.user.clone(),
            "-h".to_string(),
            "-o".to_string(),
            "%A".to_string(),
        ];
        let output = self.run_cmd(squeue, &args)?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(JobId::new)
            .collect())
    }

    fn cancel(&self, job_ids: &[JobId]) -> Result<(), BigscriptError> {
        let scancel = Self::require(&self.scancel, "scancel")?;
        let args = job_ids.iter().map(JobId::to_string).collect::<Vec<_>>();
        self.run_cmd(scancel, &args).map(|_| ())
    }

    fn user(&self) -> &str {
        &self.user
    }
}

pub(crate) fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_from_sbatch_output() {
        assert_eq!(
            parse_job_id("Submitted batch job 4242\n"),
            Some(JobId::new("4242"))
        );
        assert_eq!(parse_job_id("Submitted batch job"), None);
        assert_eq!(parse_job_id("job 12a 77 on cluster"), Some(JobId::new("77")));
    }

    #[test]
    fn sacct_row_for_job_only() {
        let output = "JobID|State|Elapsed|NodeList|Start|End|Reason\n\
77|COMPLETED|00:01:02|node1|2025-01-01T10:00:00|2025-01-01T10:01:02|None\n\
77.batch|COMPLETED|00:01:02|node1|2025-01-01T10:00:00|2025-01-01T10:01:02|\n";
        let accounting = parse_sacct(output, &JobId::new("77"));
        assert_eq!(accounting.state.as_deref(), Some("COMPLETED"));
        assert_eq!(accounting.elapsed.as_deref(), Some("00:01:02"));
        assert_eq!(accounting.node_list.as_deref(), Some("node1"));
        assert_eq!(accounting.reason.as_deref(), Some("None"));
    }

    #[test]
    fn sacct_without_matching_row() {
        let output = "JobID|State\n78|RUNNING\n";
        assert_eq!(parse_sacct(output, &JobId::new("77")), JobAccounting::default());
        assert_eq!(parse_sacct("", &JobId::new("77")), JobAccounting::default());
    }
}
