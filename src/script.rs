use std::fmt::Write as _;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::info;

use crate::composition::RESULTS_HEADER;
use crate::error::BigscriptError;
use crate::plan::{JobSpec, PostProcess};
use crate::store::{Store, ensure_dir};

pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"/._-+:=,@".contains(&b))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

pub fn render(spec: &JobSpec, tool: &Utf8Path) -> String {
    let mut out = String::new();
    let cpus = spec.resources.cpus;
    let _ = writeln!(out, "#!/bin/bash");
    let _ = writeln!(out, "#SBATCH --job-name={}", spec.name);
    let _ = writeln!(out, "#SBATCH --output={}", spec.stdout_log);
    let _ = writeln!(out, "#SBATCH --error={}", spec.stderr_log);
    let _ = writeln!(out, "#SBATCH --time={}", spec.resources.time_limit);
    let _ = writeln!(out, "#SBATCH --mem={}", spec.resources.memory);
    let _ = writeln!(out, "#SBATCH --cpus-per-task={cpus}");
    let _ = writeln!(out);
    let _ = writeln!(out, "set -e");
    let _ = writeln!(out);

    let members = spec
        .members
        .iter()
        .map(|m| shell_quote(m))
        .collect::<Vec<_>>()
        .join(" ");
    let _ = writeln!(
        out,
        "tar --use-compress-program='xz -T{cpus}' -xvf {} --strip-components={} -C {} {members}",
        shell_quote(spec.archive.as_str()),
        spec.strip_depth,
        shell_quote(spec.scratch_dir.as_str()),
    );

    if let Some(results) = &spec.results_file {
        if let Some(parent) = results.parent() {
            let _ = writeln!(out, "mkdir -p {}", shell_quote(parent.as_str()));
        }
        let _ = writeln!(
            out,
            "printf '{}\\n' > {}",
            RESULTS_HEADER.replace('\t', "\\t"),
            shell_quote(results.as_str())
        );
    }

    for step in &spec.steps {
        match step {
            PostProcess::MoveAndCompress { file, destination } => {
                let target = destination.join(file.file_name().unwrap_or(file.as_str()));
                let _ = writeln!(
                    out,
                    "mv {} {}/",
                    shell_quote(file.as_str()),
                    shell_quote(destination.as_str())
                );
                let _ = writeln!(out, "pigz -p {cpus} {}", shell_quote(target.as_str()));
            }
            PostProcess::CountBases { file, results } => {
                let _ = writeln!(
                    out,
                    "{} count-bases {} >> {}",
                    shell_quote(tool.as_str()),
                    shell_quote(file.as_str()),
                    shell_quote(results.as_str())
                );
                let _ = writeln!(out, "rm -f {}", shell_quote(file.as_str()));
            }
        }
    }
    out
}

// Stale composition results are removed so the job's appends start clean.
pub fn write_scripts(
    specs: &[JobSpec],
    store: &Store,
    tool: &Utf8Path,
) -> Result<Vec<Utf8PathBuf>, BigscriptError> {
    store.ensure_batch_dirs()?;
    let mut written = Vec::with_capacity(specs.len());
    for spec in specs {
        for destination in spec.destinations() {
            ensure_dir(destination)?;
        }
        if let Some(results) = &spec.results_file {
            if let Some(parent) = results.parent() {
                ensure_dir(parent)?;
            }
            Store::remove_file_if_exists(results)?;
        }
        Store::write_bytes_atomic(&spec.script_path, render(spec, tool).as_bytes())?;
        Store::make_executable(&spec.script_path)?;
        info!("SLURM extraction script created at {}", spec.script_path);
        written.push(spec.script_path.clone());
    }
    Ok(written)
}

pub fn declared_error_log(script: &str) -> Option<Utf8PathBuf> {
    script
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("#SBATCH"))
        .find_map(|line| line.split_once("--error="))
        .and_then(|(_, rest)| rest.split_whitespace().next())
        .map(Utf8PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting() {
        assert_eq!(shell_quote("a/b_c.fa"), "a/b_c.fa");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn error_log_directive() {
        let script = "#!/bin/bash\n#SBATCH --output=/l/x.out\n#SBATCH --error=/l/x.err\n";
        assert_eq!(declared_error_log(script), Some(Utf8PathBuf::from("/l/x.err")));
        assert_eq!(declared_error_log("#!/bin/bash\necho --error=x\n"), None);
    }
}
