// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Directory spool sink.
//
// Every printer is a subdirectory of the spool root and every job becomes
// one file inside it. Files are written under a `.part` name and renamed
// when complete, so anything watching the directory only sees whole jobs.

use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use printrelay_core::error::SinkError;

use crate::traits::{PrintSink, PrinterCatalog};

/// Extension of finished job files.
pub const JOB_EXTENSION: &str = "prn";

/// Writes each job to `<root>/<printer>/<timestamp>-<id>.prn`.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory backing `printer_name` if it is missing.
    pub fn ensure_printer(&self, printer_name: &str) -> Result<PathBuf, SinkError> {
        let dir = self
            .printer_dir(printer_name)
            .ok_or_else(|| SinkError::NotFound(printer_name.to_string()))?;
        fs::create_dir_all(&dir).map_err(|e| {
            SinkError::DeliveryFailed(format!("create {}: {e}", dir.display()))
        })?;
        Ok(dir)
    }

    /// Directory for a printer, or `None` when the name would escape the root.
    fn printer_dir(&self, printer_name: &str) -> Option<PathBuf> {
        let mut components = Path::new(printer_name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Some(self.root.join(printer_name)),
            _ => None,
        }
    }
}

impl PrintSink for DirectorySink {
    fn kind(&self) -> &'static str {
        "directory"
    }

    fn deliver(&self, printer_name: &str, data: &[u8]) -> Result<(), SinkError> {
        let dir = match self.printer_dir(printer_name) {
            Some(dir) if dir.is_dir() => dir,
            _ => return Err(SinkError::NotFound(printer_name.to_string())),
        };

        let stem = format!(
            "{}-{}",
            Utc::now().format("%Y%m%dT%H%M%S%.3fZ"),
            Uuid::new_v4().simple()
        );
        let partial = dir.join(format!("{stem}.part"));
        let finished = dir.join(format!("{stem}.{JOB_EXTENSION}"));

        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&partial)?;
            file.write_all(data)?;
            file.sync_all()?;
            fs::rename(&partial, &finished)
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&partial);
            return Err(SinkError::DeliveryFailed(format!(
                "write {}: {e}",
                finished.display()
            )));
        }

        debug!(path = %finished.display(), "job file written");
        info!(printer = printer_name, bytes = data.len(), "job spooled to directory");
        Ok(())
    }
}

impl PrinterCatalog for DirectorySink {
    fn list_printers(&self) -> Result<Vec<String>, SinkError> {
        let entries = fs::read_dir(&self.root).map_err(|e| {
            SinkError::DeliveryFailed(format!("read {}: {e}", self.root.display()))
        })?;

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_files(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        files.sort();
        files
    }

    #[test]
    fn writes_one_file_per_job() {
        let root = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(root.path());
        let dir = sink.ensure_printer("Office").unwrap();

        sink.deliver("Office", b"first").unwrap();
        sink.deliver("Office", b"second").unwrap();

        let files = job_files(&dir);
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.extension().unwrap() == JOB_EXTENSION));

        let mut contents: Vec<Vec<u8>> = files.iter().map(|f| fs::read(f).unwrap()).collect();
        contents.sort();
        assert_eq!(contents, vec![b"first".to_vec(), b"second".to_vec()]);
    }

    #[test]
    fn binary_payload_is_untouched() {
        let root = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(root.path());
        let dir = sink.ensure_printer("Label").unwrap();

        let payload: Vec<u8> = (0..=255u8).cycle().take(70_000).collect();
        sink.deliver("Label", &payload).unwrap();

        let files = job_files(&dir);
        assert_eq!(fs::read(&files[0]).unwrap(), payload);
    }

    #[test]
    fn missing_printer_dir_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(root.path());
        assert_eq!(
            sink.deliver("Nowhere", b"x"),
            Err(SinkError::NotFound("Nowhere".into()))
        );
    }

    #[test]
    fn path_like_names_are_rejected() {
        let root = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(root.path().join("spool"));
        fs::create_dir_all(root.path().join("spool")).unwrap();

        for name in ["..", "../spool", "a/b", ""] {
            assert!(
                matches!(sink.deliver(name, b"x"), Err(SinkError::NotFound(_))),
                "{name:?} should be rejected"
            );
        }
        assert!(sink.ensure_printer("../escape").is_err());
    }

    #[test]
    fn lists_printer_directories_sorted() {
        let root = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(root.path());
        sink.ensure_printer("Zebra").unwrap();
        sink.ensure_printer("Office").unwrap();
        fs::write(root.path().join("README"), "not a printer").unwrap();

        assert_eq!(sink.list_printers().unwrap(), vec!["Office", "Zebra"]);
    }
}
