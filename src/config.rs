use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::BigscriptError;

pub const DEFAULT_CONFIG_FILE: &str = "bigscript.json";
pub const DEFAULT_MAX_JOBS: usize = 1000;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub atb_root: Option<Utf8PathBuf>,
    #[serde(default)]
    pub archive_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub manifest_path: Option<Utf8PathBuf>,
    #[serde(default)]
    pub cache_path: Option<Utf8PathBuf>,
    #[serde(default)]
    pub scratch_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub max_jobs: Option<usize>,
    #[serde(default)]
    pub tool_path: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub atb_root: Utf8PathBuf,
    pub archive_dir: Utf8PathBuf,
    pub manifest_path: Utf8PathBuf,
    pub cache_path: Utf8PathBuf,
    pub scratch_dir: Utf8PathBuf,
    pub max_jobs: usize,
    pub tool_path: Utf8PathBuf,
}

impl Settings {
    pub fn with_root(atb_root: Utf8PathBuf) -> Self {
        let metadata = atb_root.join("metadata");
        Self {
            archive_dir: atb_root.join("arc"),
            manifest_path: metadata.join("file_list.all.latest.tsv.gz"),
            cache_path: metadata.join("file_list.all.latest.bin"),
            scratch_dir: atb_root.join("tmp"),
            max_jobs: DEFAULT_MAX_JOBS,
            tool_path: current_tool_path(),
            atb_root,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub manifest_path: Option<Utf8PathBuf>,
    pub archive_dir: Option<Utf8PathBuf>,
    pub cache_path: Option<Utf8PathBuf>,
    pub max_jobs: Option<usize>,
}

impl SettingsOverrides {
    pub fn apply(self, mut settings: Settings) -> Settings {
        if let Some(path) = self.manifest_path {
            settings.manifest_path = path;
        }
        if let Some(path) = self.archive_dir {
            settings.archive_dir = path;
        }
        if let Some(path) = self.cache_path {
            settings.cache_path = path;
        }
        if let Some(max_jobs) = self.max_jobs {
            settings.max_jobs = max_jobs;
        }
        settings
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<Settings, BigscriptError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| BigscriptError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| BigscriptError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<Settings, BigscriptError> {
        let atb_root = match config.atb_root {
            Some(root) => root,
            None => default_atb_root()?,
        };
        let mut settings = Settings::with_root(atb_root);

        if let Some(path) = config.archive_dir {
            settings.archive_dir = path;
        }
        if let Some(path) = config.manifest_path {
            settings.manifest_path = path;
        }
        if let Some(path) = config.cache_path {
            settings.cache_path = path;
        }
        if let Some(path) = config.scratch_dir {
            settings.scratch_dir = path;
        }
        if let Some(max_jobs) = config.max_jobs {
            settings.max_jobs = max_jobs;
        }
        if let Some(path) = config.tool_path {
            settings.tool_path = path;
        }
        Ok(settings)
    }
}

pub fn default_atb_root() -> Result<Utf8PathBuf, BigscriptError> {
    if let Ok(root) = std::env::var("ATB_ROOT") {
        if !root.trim().is_empty() {
            return Ok(Utf8PathBuf::from(root.trim()));
        }
    }
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(dirs.data_local_dir().join("bigscript").join("atb")).ok()
        })
        .ok_or_else(|| BigscriptError::Filesystem("unable to resolve data directory".to_string()))
}

fn current_tool_path() -> Utf8PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .unwrap_or_else(|| Utf8PathBuf::from("bigscript"))
}
