use std::path::PathBuf;
use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::info;

use crate::error::BigscriptError;
use crate::manifest::ManifestRow;
use crate::plan::path_depth;
use crate::scheduler::find_in_path;

pub trait Extractor {
    fn extract(
        &self,
        row: &ManifestRow,
        archive_dir: &Utf8Path,
        output_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf, BigscriptError>;
}

#[derive(Debug, Clone)]
pub struct TarExtractor {
    tar: Option<PathBuf>,
}

impl TarExtractor {
    pub fn new() -> Self {
        Self {
            tar: find_in_path("tar"),
        }
    }
}

impl Default for TarExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for TarExtractor {
    fn extract(
        &self,
        row: &ManifestRow,
        archive_dir: &Utf8Path,
        output_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf, BigscriptError> {
        let tarball = archive_dir.join(&row.tarball_name);
        if !tarball.as_std_path().exists() {
            return Err(BigscriptError::MissingArchive(
                tarball.as_std_path().to_path_buf(),
            ));
        }
        let tar = self
            .tar
            .as_ref()
            .ok_or_else(|| BigscriptError::MissingTool("tar".to_string()))?;

        info!(
            "extracting {} from {tarball} to {output_dir}",
            row.path_in_tarball
        );
        let output = Command::new(tar)
            .arg("-xvf")
            .arg(tarball.as_std_path())
            .arg("-C")
            .arg(output_dir.as_std_path())
            .arg(&row.path_in_tarball)
            .arg("--strip-components")
            .arg(path_depth(&row.path_in_tarball).to_string())
            .output()
            .map_err(|err| BigscriptError::ExtractionFailed(err.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(BigscriptError::ExtractionFailed(format!(
                "tar exited with {} for {} in {tarball}: {stderr}",
                output.status, row.path_in_tarball
            )));
        }

        let name = row
            .path_in_tarball
            .rsplit('/')
            .next()
            .unwrap_or(&row.path_in_tarball);
        Ok(output_dir.join(name))
    }
}

pub fn extract_rows<E: Extractor + ?Sized>(
    extractor: &E,
    rows: &[&ManifestRow],
    archive_dir: &Utf8Path,
    output_dir: &Utf8Path,
) -> Result<Vec<Utf8PathBuf>, BigscriptError> {
    rows.iter()
        .map(|row| extractor.extract(row, archive_dir, output_dir))
        .collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn missing_tarball_is_reported_before_running_tar() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let row = ManifestRow {
            sample_id: "SAMN00000001".to_string(),
            species_label: String::new(),
            tarball_name: "absent.tar.xz".to_string(),
            tarball_url: String::new(),
            tarball_checksum: String::new(),
            path_in_tarball: "a/SAMN00000001.fa".to_string(),
        };
        let err = TarExtractor::new().extract(&row, &dir, &dir).unwrap_err();
        assert_matches!(err, BigscriptError::MissingArchive(_));
        assert!(err.to_string().contains("fetch-atb"));
    }
}
