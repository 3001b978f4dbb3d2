use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::BigscriptError;

pub const MIN_ACCESSION_LEN: usize = 8;

const SPECIES_SYNONYMS: &[(&str, &str)] = &[("Clostridium difficile", "Clostridioides difficile")];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpeciesName {
    genus: String,
    epithet: String,
}

impl SpeciesName {
    pub fn genus(&self) -> &str {
        &self.genus
    }

    pub fn epithet(&self) -> &str {
        &self.epithet
    }

    pub fn canonical(&self) -> SpeciesName {
        let full = self.to_string();
        SPECIES_SYNONYMS
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(&full))
            .and_then(|(_, target)| target.parse().ok())
            .unwrap_or_else(|| self.clone())
    }
}

impl fmt::Display for SpeciesName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.genus, self.epithet)
    }
}

impl FromStr for SpeciesName {
    type Err = BigscriptError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parts = value.split_whitespace().collect::<Vec<_>>();
        match parts.as_slice() {
            [genus, epithet] => Ok(Self {
                genus: genus.to_string(),
                epithet: epithet.to_string(),
            }),
            _ => Err(BigscriptError::InvalidSpecies(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessionSet {
    ids: Vec<String>,
    #[serde(skip)]
    index: HashSet<String>,
}

impl AccessionSet {
    pub fn new<I, S>(ids: I) -> Result<Self, BigscriptError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self {
            ids: Vec::new(),
            index: HashSet::new(),
        };
        for id in ids {
            set.insert(id.as_ref());
        }
        if set.ids.is_empty() {
            return Err(BigscriptError::EmptyAccessionList);
        }
        Ok(set)
    }

    fn insert(&mut self, id: &str) {
        let id = id.trim();
        if id.is_empty() || self.index.contains(id) {
            return;
        }
        self.index.insert(id.to_string());
        self.ids.push(id.to_string());
    }

    pub fn union(mut self, other: &AccessionSet) -> Self {
        for id in &other.ids {
            self.insert(id);
        }
        self
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }
}

// `<base>/<id[:-6]>/<id[:-3]>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedFolder {
    path: Utf8PathBuf,
}

impl HashedFolder {
    pub fn for_accession(accession: &str, base: &Utf8Path) -> Result<Self, BigscriptError> {
        if !accession.is_ascii() {
            return Err(BigscriptError::NonAsciiAccession(accession.to_string()));
        }
        if accession.len() < MIN_ACCESSION_LEN {
            return Err(BigscriptError::AccessionTooShort(accession.to_string()));
        }
        let first = &accession[..accession.len() - 6];
        let second = &accession[..accession.len() - 3];
        Ok(Self {
            path: base.join(first).join(second),
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn create(&self) -> Result<(), BigscriptError> {
        fs::create_dir_all(self.path.as_std_path())
            .map_err(|err| BigscriptError::Filesystem(format!("create {}: {err}", self.path)))
    }
}

pub fn create_folder_structure(
    accession: &str,
    base: &Utf8Path,
) -> Result<Utf8PathBuf, BigscriptError> {
    let folder = HashedFolder::for_accession(accession, base)?;
    folder.create()?;
    Ok(folder.path)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractMode {
    Assembly,
    Composition,
}

impl fmt::Display for ExtractMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractMode::Assembly => write!(f, "assembly"),
            ExtractMode::Composition => write!(f, "composition"),
        }
    }
}
