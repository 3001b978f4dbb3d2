use camino::Utf8Path;
use serde::Serialize;

use crate::error::BigscriptError;
use crate::scheduler::JobId;
use crate::store::Store;

const KNOWN_COLUMNS: &[&str] = &[
    "status",
    "error",
    "NodeList",
    "StartTime",
    "EndTime",
    "runTime",
    "Reason",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobLedgerEntry {
    pub job_id: JobId,
    pub script_path: String,
    pub status: String,
    pub error: String,
    pub node_list: String,
    pub start_time: String,
    pub end_time: String,
    pub elapsed: String,
    pub reason: String,
    #[serde(skip)]
    extra: Vec<String>,
}

impl JobLedgerEntry {
    pub fn new(job_id: JobId, script_path: impl Into<String>) -> Self {
        Self {
            job_id,
            script_path: script_path.into(),
            status: String::new(),
            error: String::new(),
            node_list: String::new(),
            start_time: String::new(),
            end_time: String::new(),
            elapsed: String::new(),
            reason: String::new(),
            extra: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobLedger {
    pub entries: Vec<JobLedgerEntry>,
    #[serde(skip)]
    id_column: Option<String>,
    #[serde(skip)]
    script_column: Option<String>,
    #[serde(skip)]
    extra_columns: Vec<String>,
}

impl JobLedger {
    pub fn new(entries: Vec<JobLedgerEntry>) -> Self {
        Self {
            entries,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn read(path: &Utf8Path) -> Result<Self, BigscriptError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path.as_std_path())
            .map_err(|err| BigscriptError::Ledger(format!("{path}: {err}")))?;
        let headers = reader
            .headers()
            .map_err(|err| BigscriptError::Ledger(format!("{path}: {err}")))?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        if headers.len() < 2 {
            return Err(BigscriptError::Ledger(format!(
                "{path}: expected job id and script columns"
            )));
        }
        let column = |name: &str| headers.iter().skip(2).position(|h| h == name).map(|i| i + 2);
        let known = KNOWN_COLUMNS
            .iter()
            .map(|&name| column(name))
            .collect::<Vec<_>>();
        let extra_indices = (2..headers.len())
            .filter(|i| !KNOWN_COLUMNS.contains(&headers[*i].as_str()))
            .collect::<Vec<_>>();

        let mut entries = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|err| BigscriptError::Ledger(format!("{path}: {err}")))?;
            let field = |index: Option<usize>| {
                index
                    .and_then(|i| record.get(i))
                    .unwrap_or_default()
                    .to_string()
            };
            let job_id = field(Some(0));
            if job_id.trim().is_empty() {
                continue;
            }
            let mut entry = JobLedgerEntry::new(JobId::new(job_id.trim()), field(Some(1)));
            entry.status = field(known[0]);
            entry.error = field(known[1]);
            entry.node_list = field(known[2]);
            entry.start_time = field(known[3]);
            entry.end_time = field(known[4]);
            entry.elapsed = field(known[5]);
            entry.reason = field(known[6]);
            entry.extra = extra_indices.iter().map(|i| field(Some(*i))).collect();
            entries.push(entry);
        }

        Ok(Self {
            entries,
            id_column: Some(headers[0].clone()),
            script_column: Some(headers[1].clone()),
            extra_columns: extra_indices.iter().map(|i| headers[*i].clone()).collect(),
        })
    }

    pub fn to_csv(&self) -> Result<Vec<u8>, BigscriptError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        let mut header = vec![
            self.id_column.as_deref().unwrap_or("job_id"),
            self.script_column.as_deref().unwrap_or("script"),
        ];
        header.extend(KNOWN_COLUMNS.iter().copied());
        header.extend(self.extra_columns.iter().map(String::as_str));
        writer
            .write_record(&header)
            .map_err(|err| BigscriptError::Ledger(err.to_string()))?;

        for entry in &self.entries {
            let mut row = vec![
                entry.job_id.as_str(),
                entry.script_path.as_str(),
                entry.status.as_str(),
                entry.error.as_str(),
                entry.node_list.as_str(),
                entry.start_time.as_str(),
                entry.end_time.as_str(),
                entry.elapsed.as_str(),
                entry.reason.as_str(),
            ];
            row.extend(
                (0..self.extra_columns.len())
                    .map(|i| entry.extra.get(i).map(String::as_str).unwrap_or_default()),
            );
            writer
                .write_record(&row)
                .map_err(|err| BigscriptError::Ledger(err.to_string()))?;
        }
        writer
            .into_inner()
            .map_err(|err| BigscriptError::Ledger(err.to_string()))
    }

    pub fn write(&self, path: &Utf8Path) -> Result<(), BigscriptError> {
        let bytes = self.to_csv()?;
        Store::write_bytes_atomic(path, &bytes)
    }
}
