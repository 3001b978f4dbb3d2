use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, Read};

use camino::Utf8Path;
use flate2::read::MultiGzDecoder;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{AccessionSet, SpeciesName};
use crate::error::BigscriptError;
use crate::store::Store;

const CACHE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRow {
    #[serde(rename = "sample")]
    pub sample_id: String,
    #[serde(rename = "species_sylph", default)]
    pub species_label: String,
    #[serde(rename = "tar_xz")]
    pub tarball_name: String,
    #[serde(rename = "tar_xz_url", default)]
    pub tarball_url: String,
    #[serde(rename = "tar_xz_md5", default)]
    pub tarball_checksum: String,
    #[serde(rename = "filename_in_tar_xz")]
    pub path_in_tarball: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    rows: Vec<ManifestRow>,
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    manifest: Manifest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TarballRef {
    pub name: String,
    pub url: String,
    pub checksum: String,
}

impl Manifest {
    pub fn from_rows(rows: Vec<ManifestRow>) -> Self {
        Self { rows }
    }

    // A cache that exists is trusted as-is.
    pub fn load(source: &Utf8Path, cache_path: &Utf8Path) -> Result<Self, BigscriptError> {
        if cache_path.as_std_path().exists() {
            info!("loading file list cache from {cache_path}");
            return Self::read_cache(cache_path);
        }
        if !source.as_std_path().exists() {
            return Err(BigscriptError::ManifestMissing(source.as_std_path().to_path_buf()));
        }
        info!("creating file list cache from {source} to {cache_path}");
        let manifest = Self::parse_tsv(source)?;
        manifest.write_cache(cache_path)?;
        Ok(manifest)
    }

    pub fn parse_tsv(path: &Utf8Path) -> Result<Self, BigscriptError> {
        let file = File::open(path.as_std_path())
            .map_err(|err| BigscriptError::ManifestParse(format!("open {path}: {err}")))?;
        let reader: Box<dyn Read> = if path.extension() == Some("gz") {
            Box::new(MultiGzDecoder::new(BufReader::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };
        Self::from_reader(reader)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, BigscriptError> {
        let mut tsv = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(b'\t')
            .quoting(false)
            .from_reader(reader);
        let mut rows = Vec::new();
        for record in tsv.deserialize() {
            let row: ManifestRow =
                record.map_err(|err| BigscriptError::ManifestParse(err.to_string()))?;
            rows.push(row);
        }
        info!("parsed {} file list rows", rows.len());
        Ok(Self { rows })
    }

    fn read_cache(path: &Utf8Path) -> Result<Self, BigscriptError> {
        let file = File::open(path.as_std_path())
            .map_err(|err| BigscriptError::ManifestCache(format!("open {path}: {err}")))?;
        let cache: CacheFile = bincode::deserialize_from(BufReader::new(file))
            .map_err(|err| BigscriptError::ManifestCache(format!("{path}: {err}")))?;
        if cache.version != CACHE_VERSION {
            return Err(BigscriptError::ManifestCache(format!(
                "{path}: unsupported cache version {}",
                cache.version
            )));
        }
        Ok(cache.manifest)
    }

    fn write_cache(&self, path: &Utf8Path) -> Result<(), BigscriptError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| BigscriptError::Filesystem(err.to_string()))?;
        }
        let cache = CacheFile {
            version: CACHE_VERSION,
            manifest: self.clone(),
        };
        let bytes = bincode::serialize(&cache)
            .map_err(|err| BigscriptError::ManifestCache(err.to_string()))?;
        Store::write_bytes_atomic(path, &bytes)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[ManifestRow] {
        &self.rows
    }

    pub fn filter<F>(&self, mut predicate: F) -> Vec<&ManifestRow>
    where
        F: FnMut(&ManifestRow) -> bool,
    {
        self.rows.iter().filter(|row| predicate(row)).collect()
    }

    pub fn rows_for(&self, accessions: &AccessionSet) -> Vec<&ManifestRow> {
        self.filter(|row| accessions.contains(&row.sample_id))
    }

    pub fn rows_for_species_exact(&self, species: &SpeciesName) -> Vec<&ManifestRow> {
        let label = species.to_string();
        self.filter(|row| row.species_label == label)
    }

    pub fn tarballs(&self) -> Vec<TarballRef> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for row in &self.rows {
            if seen.insert(row.tarball_name.as_str()) {
                out.push(TarballRef {
                    name: row.tarball_name.clone(),
                    url: row.tarball_url.clone(),
                    checksum: row.tarball_checksum.clone(),
                });
            }
        }
        out
    }
}

pub fn unique_samples<'a, I>(rows: I) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a ManifestRow>,
{
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|row| seen.insert(row.sample_id.as_str()))
        .map(|row| row.sample_id.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TSV: &str = "sample\tspecies_sylph\ttar_xz\ttar_xz_url\ttar_xz_md5\tfilename_in_tar_xz\textra\n\
SAMN00000001\tEscherichia coli\tbatch.1.tar.xz\thttps://x/batch.1.tar.xz\tabc\tbatch.1/SAMN00000001.fa\tz\n\
SAMN00000002\tSalmonella enterica\tbatch.2.tar.xz\thttps://x/batch.2.tar.xz\tdef\tbatch.2/SAMN00000002.fa\tz\n";

    #[test]
    fn parse_ignores_extra_columns() {
        let manifest = Manifest::from_reader(TSV.as_bytes()).unwrap();
        assert_eq!(manifest.len(), 2);
        let row = &manifest.rows()[1];
        assert_eq!(row.sample_id, "SAMN00000002");
        assert_eq!(row.species_label, "Salmonella enterica");
        assert_eq!(row.tarball_name, "batch.2.tar.xz");
        assert_eq!(row.tarball_checksum, "def");
        assert_eq!(row.path_in_tarball, "batch.2/SAMN00000002.fa");
    }

    #[test]
    fn parse_requires_core_columns() {
        let tsv = "sample\tspecies_sylph\nSAMN1\tE coli\n";
        assert!(Manifest::from_reader(tsv.as_bytes()).is_err());
    }

    #[test]
    fn tarballs_are_distinct() {
        let mut text = TSV.to_string();
        text.push_str(
            "SAMN00000003\tEscherichia coli\tbatch.1.tar.xz\thttps://x/batch.1.tar.xz\tabc\tbatch.1/SAMN00000003.fa\tz\n",
        );
        let manifest = Manifest::from_reader(text.as_bytes()).unwrap();
        let names = manifest
            .tarballs()
            .into_iter()
            .map(|t| t.name)
            .collect::<Vec<_>>();
        assert_eq!(names, ["batch.1.tar.xz", "batch.2.tar.xz"]);
    }
}
