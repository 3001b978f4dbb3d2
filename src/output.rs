use std::io::{self, Write};

use serde::Serialize;

use crate::app::{BatchOutcome, BatchResult, ExtractResult, JobStatusResult};
use crate::composition::BaseCounts;
use crate::fetch::{FetchAction, FetchReport};
use crate::reconcile::{KillReport, render_table};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_extract(result: &ExtractResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_batch(result: &BatchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_status(result: &JobStatusResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_kill(result: &KillReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_fetch(result: &FetchReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_counts(file: &str, counts: &BaseCounts) -> io::Result<()> {
        #[derive(Serialize)]
        struct Counts<'a> {
            file: &'a str,
            #[serde(flatten)]
            counts: &'a BaseCounts,
            gc_fraction: Option<f64>,
        }
        Self::print_json(&Counts {
            file,
            counts,
            gc_fraction: counts.gc_fraction(),
        })
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_extract(result: &ExtractResult) -> io::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(
            out,
            "{} files for {} accessions ({})",
            result.files, result.accessions, result.mode
        )?;
        for path in &result.extracted {
            writeln!(out, "extracted {path}")?;
        }
        if !result.scripts.is_empty() {
            writeln!(
                out,
                "{} scripts written under {}",
                result.scripts.len(),
                result.output_dir
            )?;
        }
        if let Some(submission) = &result.submission {
            writeln!(
                out,
                "{} jobs submitted, {} failed; job table: {}",
                submission.ledger.len(),
                submission.failures.len(),
                submission.ledger_path
            )?;
            for failure in &submission.failures {
                writeln!(out, "  {}: {}", failure.script, failure.message)?;
            }
        }
        Ok(())
    }

    pub fn print_batch(result: &BatchResult) -> io::Result<()> {
        let mut out = io::stdout().lock();
        for item in &result.items {
            let outcome = match item.outcome {
                BatchOutcome::Planned => "planned",
                BatchOutcome::Skipped => "skipped (exists)",
                BatchOutcome::NotFound => "not in file list",
            };
            writeln!(out, "{}\t{outcome}\t{}", item.species, item.output_dir)?;
        }
        Ok(())
    }

    pub fn print_status(result: &JobStatusResult) -> io::Result<()> {
        let mut out = io::stdout().lock();
        render_table(&result.ledger, &mut out)
    }

    pub fn print_kill(result: &KillReport) -> io::Result<()> {
        println!("cancelled {} jobs for {}", result.cancelled, result.user);
        Ok(())
    }

    pub fn print_fetch(result: &FetchReport) -> io::Result<()> {
        println!(
            "{} present, {} downloaded, {} checksum mismatches, {} failed",
            result.count(FetchAction::Present),
            result.count(FetchAction::Downloaded),
            result.count(FetchAction::ChecksumMismatch),
            result.count(FetchAction::Failed)
        );
        Ok(())
    }
}
