use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::domain::{ExtractMode, HashedFolder};
use crate::error::BigscriptError;
use crate::manifest::ManifestRow;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupMember {
    pub sample_id: String,
    pub path_in_tarball: String,
}

impl GroupMember {
    pub fn file_name(&self) -> &str {
        self.path_in_tarball
            .rsplit('/')
            .next()
            .unwrap_or(&self.path_in_tarball)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TarballGroup {
    pub tarball_name: String,
    pub members: Vec<GroupMember>,
}

impl TarballGroup {
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.path_in_tarball.as_str())
    }

    // Every member must sit at the same depth; a mixed group would mis-strip.
    pub fn strip_depth(&self) -> Result<usize, BigscriptError> {
        let Some(first) = self.members.first() else {
            return Ok(0);
        };
        let expected = path_depth(&first.path_in_tarball);
        for member in &self.members[1..] {
            let found = path_depth(&member.path_in_tarball);
            if found != expected {
                return Err(BigscriptError::MixedStripDepth {
                    tarball: self.tarball_name.clone(),
                    first: first.path_in_tarball.clone(),
                    path: member.path_in_tarball.clone(),
                    expected,
                    found,
                });
            }
        }
        Ok(expected)
    }
}

pub fn path_depth(path: &str) -> usize {
    path.matches('/').count()
}

pub fn group_by_tarball<'a, I>(rows: I) -> Vec<TarballGroup>
where
    I: IntoIterator<Item = &'a ManifestRow>,
{
    let mut index = HashMap::<&str, usize>::new();
    let mut groups = Vec::<TarballGroup>::new();
    for row in rows {
        let slot = *index.entry(row.tarball_name.as_str()).or_insert_with(|| {
            groups.push(TarballGroup {
                tarball_name: row.tarball_name.clone(),
                members: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].members.push(GroupMember {
            sample_id: row.sample_id.clone(),
            path_in_tarball: row.path_in_tarball.clone(),
        });
    }
    groups
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resources {
    pub time_limit: String,
    pub memory: String,
    pub cpus: u32,
}

impl Resources {
    pub fn for_mode(mode: ExtractMode) -> Self {
        match mode {
            ExtractMode::Assembly => Self {
                time_limit: "02:00:00".to_string(),
                memory: "4G".to_string(),
                cpus: 4,
            },
            ExtractMode::Composition => Self {
                time_limit: "04:00:00".to_string(),
                memory: "4G".to_string(),
                cpus: 4,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum PostProcess {
    MoveAndCompress {
        file: Utf8PathBuf,
        destination: Utf8PathBuf,
    },
    CountBases {
        file: Utf8PathBuf,
        results: Utf8PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSpec {
    pub name: String,
    pub mode: ExtractMode,
    pub script_path: Utf8PathBuf,
    pub stdout_log: Utf8PathBuf,
    pub stderr_log: Utf8PathBuf,
    pub resources: Resources,
    pub archive: Utf8PathBuf,
    pub strip_depth: usize,
    pub scratch_dir: Utf8PathBuf,
    pub members: Vec<String>,
    pub results_file: Option<Utf8PathBuf>,
    pub steps: Vec<PostProcess>,
}

impl JobSpec {
    pub fn destinations(&self) -> impl Iterator<Item = &Utf8Path> {
        self.steps.iter().filter_map(|step| match step {
            PostProcess::MoveAndCompress { destination, .. } => Some(destination.as_path()),
            PostProcess::CountBases { .. } => None,
        })
    }
}

// xz streams the whole tarball however few members are wanted, so every
// requested file from one tarball goes into a single job.
pub fn plan<'a, I>(
    rows: I,
    store: &Store,
    archive_dir: &Utf8Path,
    mode: ExtractMode,
) -> Result<Vec<JobSpec>, BigscriptError>
where
    I: IntoIterator<Item = &'a ManifestRow>,
{
    group_by_tarball(rows)
        .into_iter()
        .enumerate()
        .map(|(index, group)| plan_group(index, &group, store, archive_dir, mode))
        .collect()
}

fn plan_group(
    index: usize,
    group: &TarballGroup,
    store: &Store,
    archive_dir: &Utf8Path,
    mode: ExtractMode,
) -> Result<JobSpec, BigscriptError> {
    let name = format!("extract_{index}");
    let strip_depth = group.strip_depth()?;
    let scratch_dir = store.scratch_dir().to_path_buf();
    let results_file = match mode {
        ExtractMode::Assembly => None,
        ExtractMode::Composition => Some(store.results_path(index)),
    };

    let mut steps = Vec::with_capacity(group.members.len());
    for member in &group.members {
        let file = scratch_dir.join(member.file_name());
        let step = match &results_file {
            None => {
                let folder = HashedFolder::for_accession(&member.sample_id, store.output_root())?;
                PostProcess::MoveAndCompress {
                    file,
                    destination: folder.path().to_path_buf(),
                }
            }
            Some(results) => PostProcess::CountBases {
                file,
                results: results.clone(),
            },
        };
        steps.push(step);
    }

    Ok(JobSpec {
        script_path: store.script_path(&name),
        stdout_log: store.stdout_log(&name),
        stderr_log: store.stderr_log(&name),
        resources: Resources::for_mode(mode),
        archive: archive_dir.join(&group.tarball_name),
        strip_depth,
        scratch_dir,
        members: group.paths().map(str::to_string).collect(),
        results_file,
        steps,
        mode,
        name,
    })
}
