use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::Builder;

use crate::error::BigscriptError;

pub const LEDGER_FILE: &str = "submitted_jobs.csv";

#[derive(Debug, Clone)]
pub struct Store {
    output_root: Utf8PathBuf,
    scratch_dir: Utf8PathBuf,
}

impl Store {
    pub fn new(output_root: Utf8PathBuf, scratch_dir: Utf8PathBuf) -> Self {
        Self {
            output_root,
            scratch_dir,
        }
    }

    pub fn output_root(&self) -> &Utf8Path {
        &self.output_root
    }

    pub fn scratch_dir(&self) -> &Utf8Path {
        &self.scratch_dir
    }

    pub fn jobs_dir(&self) -> Utf8PathBuf {
        self.output_root.join("jobs")
    }

    pub fn logs_dir(&self) -> Utf8PathBuf {
        self.output_root.join("logs")
    }

    pub fn results_dir(&self) -> Utf8PathBuf {
        self.output_root.join("gc_chunks")
    }

    pub fn script_path(&self, name: &str) -> Utf8PathBuf {
        self.jobs_dir().join(format!("{name}.slurm"))
    }

    pub fn stdout_log(&self, name: &str) -> Utf8PathBuf {
        self.logs_dir().join(format!("{name}.out"))
    }

    pub fn stderr_log(&self, name: &str) -> Utf8PathBuf {
        self.logs_dir().join(format!("{name}.err"))
    }

    pub fn results_path(&self, index: usize) -> Utf8PathBuf {
        self.results_dir().join(format!("gc_results_{index}.txt"))
    }

    pub fn ledger_path(&self) -> Utf8PathBuf {
        self.jobs_dir().join(LEDGER_FILE)
    }

    pub fn ensure_batch_dirs(&self) -> Result<(), BigscriptError> {
        for dir in [
            self.output_root.clone(),
            self.jobs_dir(),
            self.logs_dir(),
            self.scratch_dir.clone(),
        ] {
            ensure_dir(&dir)?;
        }
        Ok(())
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), BigscriptError> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent,
            _ => Utf8Path::new("."),
        };
        ensure_dir(parent)?;
        let mut temp = Builder::new()
            .prefix(".bigscript")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| BigscriptError::Filesystem(err.to_string()))?;
        std::io::Write::write_all(&mut temp, content)
            .map_err(|err| BigscriptError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| BigscriptError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn remove_file_if_exists(path: &Utf8Path) -> Result<(), BigscriptError> {
        if path.as_std_path().exists() {
            fs::remove_file(path.as_std_path())
                .map_err(|err| BigscriptError::Filesystem(format!("remove {path}: {err}")))?;
        }
        Ok(())
    }

    #[cfg(unix)]
    pub fn make_executable(path: &Utf8Path) -> Result<(), BigscriptError> {
        use std::os::unix::fs::PermissionsExt;

        fs::set_permissions(path.as_std_path(), fs::Permissions::from_mode(0o755))
            .map_err(|err| BigscriptError::Filesystem(format!("chmod {path}: {err}")))
    }

    #[cfg(not(unix))]
    pub fn make_executable(_path: &Utf8Path) -> Result<(), BigscriptError> {
        Ok(())
    }
}

pub fn ensure_dir(path: &Utf8Path) -> Result<(), BigscriptError> {
    fs::create_dir_all(path.as_std_path())
        .map_err(|err| BigscriptError::Filesystem(format!("create {path}: {err}")))
}
