// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// JSON settings file.
//
// Settings are looked up in order: an explicit `--config` path, then
// `config.json` in the working directory, then the data directory. The
// first file that reads and parses wins; missing keys take their defaults.
// Saving goes back to the file that was loaded, falling back through the
// same list when it is not writable.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use printrelay_core::ServerConfig;

use super::data_dir;

pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigStoreError {
    #[error("could not save settings to any location (last error at {path}: {source})")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("encode settings: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Settings file locations plus the one that was actually loaded.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    candidates: Vec<PathBuf>,
    loaded_from: Option<PathBuf>,
}

impl ConfigStore {
    /// The standard lookup list, led by `explicit` when given.
    pub fn discover(explicit: Option<PathBuf>) -> Self {
        let mut candidates: Vec<PathBuf> = explicit.into_iter().collect();
        candidates.push(PathBuf::from(CONFIG_FILE));
        candidates.push(data_dir::data_dir().join(CONFIG_FILE));
        Self::with_candidates(candidates)
    }

    pub fn with_candidates(candidates: Vec<PathBuf>) -> Self {
        Self {
            candidates,
            loaded_from: None,
        }
    }

    /// File the current settings came from, if any.
    pub fn loaded_from(&self) -> Option<&Path> {
        self.loaded_from.as_deref()
    }

    /// Load the first readable settings file, or defaults when there is none.
    pub fn load(&mut self) -> ServerConfig {
        for path in &self.candidates {
            if !path.is_file() {
                debug!(path = %path.display(), "no settings file here");
                continue;
            }
            let text = match fs::read_to_string(path) {
                Ok(text) => text,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "settings file unreadable");
                    continue;
                }
            };
            match serde_json::from_str::<ServerConfig>(&text) {
                Ok(config) => {
                    info!(path = %path.display(), "settings loaded");
                    self.loaded_from = Some(path.clone());
                    return config;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "settings file is not valid JSON");
                }
            }
        }

        info!("no settings file found; using defaults");
        self.loaded_from = None;
        ServerConfig::default()
    }

    /// Write `config` as pretty JSON. Returns the path written.
    pub fn save(&mut self, config: &ServerConfig) -> Result<PathBuf, ConfigStoreError> {
        let json = serde_json::to_string_pretty(config)?;

        let mut targets: Vec<PathBuf> = self.loaded_from.iter().cloned().collect();
        for path in &self.candidates {
            if !targets.contains(path) {
                targets.push(path.clone());
            }
        }

        let mut last_error = None;
        for path in targets {
            match write_file(&path, &json) {
                Ok(()) => {
                    info!(path = %path.display(), "settings saved");
                    self.loaded_from = Some(path.clone());
                    return Ok(path);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "could not save settings here");
                    last_error = Some((path, e));
                }
            }
        }

        let (path, source) = last_error.unwrap_or_else(|| {
            (
                PathBuf::from(CONFIG_FILE),
                std::io::Error::new(std::io::ErrorKind::NotFound, "no settings location"),
            )
        });
        Err(ConfigStoreError::Write { path, source })
    }
}

fn write_file(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_parsable_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.json");
        let good = dir.path().join("good.json");
        fs::write(&broken, "{ not json").unwrap();
        fs::write(&good, r#"{"printer_name": "Office", "port": 9200}"#).unwrap();

        let mut store = ConfigStore::with_candidates(vec![
            dir.path().join("missing.json"),
            broken,
            good.clone(),
        ]);
        let config = store.load();

        assert_eq!(config.printer_name, "Office");
        assert_eq!(config.port, 9200);
        assert_eq!(store.loaded_from(), Some(good.as_path()));
    }

    #[test]
    fn missing_keys_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, r#"{"printer_name": "Label"}"#).unwrap();

        let config = ConfigStore::with_candidates(vec![path]).load();

        assert_eq!(config.printer_name, "Label");
        assert_eq!(config.port, 9100);
        assert!(config.minimize_to_tray);
        assert!(!config.auto_start);
    }

    #[test]
    fn nothing_found_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ConfigStore::with_candidates(vec![dir.path().join(CONFIG_FILE)]);
        assert_eq!(store.load(), ServerConfig::default());
        assert!(store.loaded_from().is_none());
    }

    #[test]
    fn save_returns_to_loaded_file() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.json");
        let loaded = dir.path().join("loaded.json");
        fs::write(&loaded, "{}").unwrap();

        let mut store = ConfigStore::with_candidates(vec![first.clone(), loaded.clone()]);
        let mut config = store.load();
        config.printer_name = "Office".into();

        assert_eq!(store.save(&config).unwrap(), loaded);
        assert!(!first.exists());

        let reread = ConfigStore::with_candidates(vec![loaded]).load();
        assert_eq!(reread.printer_name, "Office");
    }

    #[test]
    fn save_falls_back_when_location_is_unwritable() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where a directory is needed makes the first target fail.
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        let unwritable = blocker.join(CONFIG_FILE);
        let fallback = dir.path().join("nested").join(CONFIG_FILE);

        let mut store = ConfigStore::with_candidates(vec![unwritable, fallback.clone()]);
        store.load();

        assert_eq!(store.save(&ServerConfig::new("Office", 9100)).unwrap(), fallback);
        assert_eq!(store.loaded_from(), Some(fallback.as_path()));
    }
}
