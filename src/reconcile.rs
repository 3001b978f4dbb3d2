use std::fs;
use std::io::{self, Write};

use camino::Utf8Path;
use crossterm::style::Stylize;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::BigscriptError;
use crate::ledger::{JobLedger, JobLedgerEntry};
use crate::scheduler::SchedulerClient;
use crate::script::declared_error_log;

pub const QUERY_ERROR_PREFIX: &str = "ERROR: ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
    NodeFail,
    OutOfMemory,
    Preempted,
    BootFail,
    Deadline,
    Error,
    SpecialExit,
    Revoked,
    Suspended,
    Stopped,
    Unknown,
    QueryFailed(String),
    Other(String),
}

impl JobState {
    // `CANCELLED by 1234` reads as `CANCELLED`.
    pub fn parse(status: &str) -> Self {
        if let Some(message) = status.strip_prefix(QUERY_ERROR_PREFIX) {
            return JobState::QueryFailed(message.to_string());
        }
        let token = status.split_whitespace().next().unwrap_or_default();
        match token {
            "PENDING" => JobState::Pending,
            "RUNNING" => JobState::Running,
            "COMPLETED" => JobState::Completed,
            "FAILED" => JobState::Failed,
            "CANCELLED" => JobState::Cancelled,
            "TIMEOUT" => JobState::Timeout,
            "NODE_FAIL" => JobState::NodeFail,
            "OUT_OF_MEMORY" => JobState::OutOfMemory,
            "PREEMPTED" => JobState::Preempted,
            "BOOT_FAIL" => JobState::BootFail,
            "DEADLINE" => JobState::Deadline,
            "ERROR" => JobState::Error,
            "SPECIAL_EXIT" => JobState::SpecialExit,
            "REVOKED" => JobState::Revoked,
            "SUSPENDED" => JobState::Suspended,
            "STOPPED" => JobState::Stopped,
            "UNKNOWN" => JobState::Unknown,
            _ => JobState::Other(status.to_string()),
        }
    }

    pub fn inspects_error_log(&self) -> bool {
        !matches!(
            self,
            JobState::Pending | JobState::Running | JobState::QueryFailed(_) | JobState::Other(_)
        )
    }

    pub fn category(&self) -> StatusCategory {
        match self {
            JobState::Completed => StatusCategory::Success,
            JobState::Failed
            | JobState::Cancelled
            | JobState::Timeout
            | JobState::NodeFail
            | JobState::OutOfMemory
            | JobState::Error
            | JobState::Unknown
            | JobState::QueryFailed(_) => StatusCategory::Failure,
            JobState::Running => StatusCategory::Running,
            _ => StatusCategory::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusCategory {
    Success,
    Failure,
    Running,
    Other,
}

pub fn error_log_summary(script_path: &Utf8Path) -> String {
    let script = match fs::read(script_path.as_std_path()) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).to_string(),
        Err(err) => {
            warn!("error reading script {script_path}: {err}");
            return String::new();
        }
    };
    let Some(err_path) = declared_error_log(&script) else {
        return String::new();
    };
    match fs::read(err_path.as_std_path()) {
        Ok(bytes) if !bytes.is_empty() => {
            let lines = String::from_utf8_lossy(&bytes).lines().count();
            format!("{lines} lines in error log: {err_path}")
        }
        _ => String::new(),
    }
}

fn refresh_entry<S: SchedulerClient + ?Sized>(scheduler: &S, entry: &mut JobLedgerEntry) {
    match scheduler.query_status(&entry.job_id) {
        Ok(accounting) => {
            entry.status = accounting.state.unwrap_or_else(|| "UNKNOWN".to_string());
            entry.elapsed = accounting.elapsed.unwrap_or_default();
            entry.node_list = accounting.node_list.unwrap_or_default();
            entry.start_time = accounting.start.unwrap_or_default();
            entry.end_time = accounting.end.unwrap_or_default();
            entry.reason = accounting
                .reason
                .filter(|reason| reason != "None")
                .unwrap_or_default();
        }
        Err(err) => {
            warn!("error getting job status for {}: {err}", entry.job_id);
            entry.status = format!("{QUERY_ERROR_PREFIX}{err}");
        }
    }

    entry.error = if JobState::parse(&entry.status).inspects_error_log() {
        error_log_summary(Utf8Path::new(&entry.script_path))
    } else {
        String::new()
    };
}

pub fn reconcile<S: SchedulerClient + ?Sized>(
    scheduler: &S,
    ledger_path: &Utf8Path,
) -> Result<JobLedger, BigscriptError> {
    let mut ledger = JobLedger::read(ledger_path)?;
    for entry in &mut ledger.entries {
        refresh_entry(scheduler, entry);
    }
    ledger.write(ledger_path)?;
    info!("refreshed {} jobs in {ledger_path}", ledger.len());
    Ok(ledger)
}

const TABLE_COLUMNS: [&str; 9] = [
    "job_id",
    "NodeList",
    "StartTime",
    "EndTime",
    "runTime",
    "script",
    "status",
    "reason",
    "error",
];

pub fn render_table<W: Write>(ledger: &JobLedger, out: &mut W) -> io::Result<()> {
    let header = TABLE_COLUMNS
        .iter()
        .map(|column| column.cyan().to_string())
        .collect::<Vec<_>>();
    writeln!(out, "{}", header.join("\t"))?;
    for entry in &ledger.entries {
        let status = color_status(&entry.status);
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            entry.job_id,
            entry.node_list,
            entry.start_time,
            entry.end_time,
            entry.elapsed,
            entry.script_path,
            status,
            entry.reason,
            entry.error
        )?;
    }
    Ok(())
}

pub fn color_status(status: &str) -> String {
    match JobState::parse(status).category() {
        StatusCategory::Success => status.green().to_string(),
        StatusCategory::Failure => status.red().to_string(),
        StatusCategory::Running => status.yellow().to_string(),
        StatusCategory::Other => status.to_string(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct KillReport {
    pub user: String,
    pub cancelled: usize,
}

pub fn kill_all<S: SchedulerClient + ?Sized>(scheduler: &S) -> Result<KillReport, BigscriptError> {
    let user = scheduler.user().to_string();
    let jobs = scheduler.list_owned_jobs()?;
    if jobs.is_empty() {
        info!("no SLURM jobs found for user: {user}");
        return Ok(KillReport { user, cancelled: 0 });
    }
    scheduler.cancel(&jobs)?;
    info!("cancelled {} SLURM jobs for user: {user}", jobs.len());
    Ok(KillReport {
        user,
        cancelled: jobs.len(),
    })
}
