//! End-to-end run: scan, load, resolve, emit, write

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::config::SiftConfig;
use crate::database::DatabaseSet;
use crate::emitter::{emit_self_contained, FieldFilter};
use crate::error::{Result, SiftError};
use crate::resolver::{resolve, UnresolvedCitation};
use crate::scanner::{scan, RequestedKeySet};

/// Inputs of one run
#[derive(Debug, Clone)]
pub struct Job {
    /// Root LaTeX document
    pub manuscript: PathBuf,
    /// Databases, highest priority first
    pub databases: Vec<PathBuf>,
    pub output: PathBuf,
    pub config: SiftConfig,
}

/// What a finished run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub output: PathBuf,
    /// Citekeys written, in output order
    pub written: Vec<String>,
    pub unresolved: Vec<UnresolvedCitation>,
}

impl Report {
    /// True when every requested and cross-referenced key was found
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// In-memory result of resolving and emitting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sifted {
    pub text: String,
    pub written: Vec<String>,
    pub unresolved: Vec<UnresolvedCitation>,
}

/// Resolve requested keys against databases and render the output text
pub fn sift(requested: &RequestedKeySet, databases: &DatabaseSet, filter: &FieldFilter) -> Sifted {
    let resolution = resolve(requested, databases);
    let text = emit_self_contained(&resolution.resolved, databases, filter);
    Sifted {
        text,
        written: resolution
            .resolved
            .keys()
            .into_iter()
            .map(str::to_string)
            .collect(),
        unresolved: resolution.unresolved,
    }
}

/// Run a job.
///
/// Every fatal condition is detected before the output file is touched, and
/// the output is written in a single call once its full text is known.
pub fn run(job: &Job) -> Result<Report> {
    job.config.validate()?;

    if !job.config.force_overwrite && job.output.exists() {
        return Err(SiftError::OutputExists(job.output.clone()));
    }

    let requested = scan(&[&job.manuscript], &job.config.cite_commands)?;
    tracing::debug!(
        "Found {} cited keys in {}",
        requested.len(),
        job.manuscript.display()
    );

    let databases = DatabaseSet::load(&job.databases)?;
    let sifted = sift(&requested, &databases, &job.config.field_filter());

    write_output(&job.output, &sifted.text, job.config.force_overwrite)?;
    tracing::info!(
        "Wrote {} entries to {} ({} unresolved)",
        sifted.written.len(),
        job.output.display(),
        sifted.unresolved.len()
    );

    Ok(Report {
        output: job.output.clone(),
        written: sifted.written,
        unresolved: sifted.unresolved,
    })
}

/// Write the output file; unless forced, refuse to replace one that appeared
/// since the run started
fn write_output(path: &Path, text: &str, force: bool) -> Result<()> {
    if force {
        return fs::write(path, text).map_err(|err| SiftError::io(path, err));
    }

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|err| match err.kind() {
            ErrorKind::AlreadyExists => SiftError::OutputExists(path.to_path_buf()),
            _ => SiftError::io(path, err),
        })?;
    file.write_all(text.as_bytes())
        .map_err(|err| SiftError::io(path, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::EntryStore;
    use tempfile::TempDir;

    #[test]
    fn test_sift_reports_written_and_missing() {
        let databases = DatabaseSet::new(vec![EntryStore::parse(
            Path::new("refs.bib"),
            "@misc{A, crossref = {P}}\n@misc{P}",
        )
        .unwrap()]);
        let requested: RequestedKeySet = ["A", "Z"].into_iter().collect();

        let sifted = sift(&requested, &databases, &FieldFilter::default());
        assert_eq!(sifted.written, vec!["A", "P"]);
        assert_eq!(sifted.unresolved.len(), 1);
        assert_eq!(sifted.text, "@misc{A, crossref = {P}}\n\n@misc{P}\n");
    }

    #[test]
    fn test_write_output_never_replaces_unless_forced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("local.bib");
        fs::write(&path, "% appeared meanwhile\n").unwrap();

        match write_output(&path, "@misc{A}\n", false) {
            Err(SiftError::OutputExists(reported)) => assert_eq!(reported, path),
            other => panic!("expected OutputExists, got {other:?}"),
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), "% appeared meanwhile\n");

        write_output(&path, "@misc{A}\n", true).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "@misc{A}\n");
    }

    #[test]
    fn test_write_output_creates_new_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fresh.bib");
        write_output(&path, "", false).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }
}
