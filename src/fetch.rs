use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Duration;

use camino::Utf8Path;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::BigscriptError;
use crate::manifest::TarballRef;
use crate::store::ensure_dir;

pub trait ArchiveFetcher {
    fn download(&self, url: &str, destination: &Path) -> Result<(), BigscriptError>;
}

#[derive(Clone)]
pub struct HttpArchiveFetcher {
    client: Client,
}

impl HttpArchiveFetcher {
    pub fn new() -> Result<Self, BigscriptError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("bigscript/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| BigscriptError::DownloadHttp(err.to_string()))?,
        );
        // Tarballs run to tens of gigabytes; only the connection gets a timeout.
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(60))
            .timeout(None)
            .build()
            .map_err(|err| BigscriptError::DownloadHttp(err.to_string()))?;
        Ok(Self { client })
    }
}

impl ArchiveFetcher for HttpArchiveFetcher {
    fn download(&self, url: &str, destination: &Path) -> Result<(), BigscriptError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|err| BigscriptError::DownloadHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "download failed".to_string());
            return Err(BigscriptError::DownloadStatus { status, message });
        }
        let mut file =
            File::create(destination).map_err(|err| BigscriptError::Filesystem(err.to_string()))?;
        response
            .copy_to(&mut file)
            .map_err(|err| BigscriptError::DownloadHttp(err.to_string()))?;
        Ok(())
    }
}

pub fn file_md5(path: &Path) -> Result<String, BigscriptError> {
    let file = File::open(path)
        .map_err(|err| BigscriptError::Filesystem(format!("open {}: {err}", path.display())))?;
    let mut reader = BufReader::new(file);
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; 1 << 20];
    loop {
        let read = reader
            .read(&mut buffer)
            .map_err(|err| BigscriptError::Filesystem(err.to_string()))?;
        if read == 0 {
            break;
        }
        context.consume(&buffer[..read]);
    }
    Ok(format!("{:x}", context.compute()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchAction {
    Present,
    Downloaded,
    ChecksumMismatch,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchItem {
    pub tarball: String,
    pub action: FetchAction,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchReport {
    pub items: Vec<FetchItem>,
}

impl FetchReport {
    pub fn count(&self, action: FetchAction) -> usize {
        self.items.iter().filter(|item| item.action == action).count()
    }
}

fn checksum_matches(path: &Path, expected: &str) -> Result<bool, BigscriptError> {
    Ok(file_md5(path)?.eq_ignore_ascii_case(expected.trim()))
}

pub fn fetch_archives<F: ArchiveFetcher + ?Sized>(
    fetcher: &F,
    tarballs: &[TarballRef],
    archive_dir: &Utf8Path,
) -> Result<FetchReport, BigscriptError> {
    ensure_dir(archive_dir)?;
    let mut items = Vec::with_capacity(tarballs.len());
    for tarball in tarballs {
        let item = fetch_one(fetcher, tarball, archive_dir);
        let item = match item {
            Ok(item) => item,
            Err(err) => {
                error!("failed to download {} from {}: {err}", tarball.name, tarball.url);
                FetchItem {
                    tarball: tarball.name.clone(),
                    action: FetchAction::Failed,
                    message: Some(err.to_string()),
                }
            }
        };
        items.push(item);
    }
    Ok(FetchReport { items })
}

fn fetch_one<F: ArchiveFetcher + ?Sized>(
    fetcher: &F,
    tarball: &TarballRef,
    archive_dir: &Utf8Path,
) -> Result<FetchItem, BigscriptError> {
    let out_path = archive_dir.join(&tarball.name);
    let has_checksum = !tarball.checksum.trim().is_empty();

    if out_path.as_std_path().exists() {
        if !has_checksum {
            info!("already exists: {out_path}");
            return Ok(present(tarball));
        }
        if checksum_matches(out_path.as_std_path(), &tarball.checksum)? {
            info!("already exists and checksum matches: {out_path}");
            return Ok(present(tarball));
        }
        warn!("checksum mismatch for {out_path}, re-downloading");
    }

    info!("downloading {} from {}", tarball.name, tarball.url);
    let partial = out_path.with_extension("xz.part");
    if let Err(err) = fetcher.download(&tarball.url, partial.as_std_path()) {
        if let Err(cleanup) = std::fs::remove_file(partial.as_std_path()) {
            if cleanup.kind() != std::io::ErrorKind::NotFound {
                warn!("could not remove partial download {partial}: {cleanup}");
            }
        }
        return Err(err);
    }
    std::fs::rename(partial.as_std_path(), out_path.as_std_path())
        .map_err(|err| BigscriptError::Filesystem(err.to_string()))?;

    if has_checksum && !checksum_matches(out_path.as_std_path(), &tarball.checksum)? {
        warn!("checksum mismatch after download for {out_path}");
        return Ok(FetchItem {
            tarball: tarball.name.clone(),
            action: FetchAction::ChecksumMismatch,
            message: Some(format!("expected md5 {}", tarball.checksum)),
        });
    }
    info!("saved to {out_path}");
    Ok(FetchItem {
        tarball: tarball.name.clone(),
        action: FetchAction::Downloaded,
        message: None,
    })
}

fn present(tarball: &TarballRef) -> FetchItem {
    FetchItem {
        tarball: tarball.name.clone(),
        action: FetchAction::Present,
        message: None,
    }
}
