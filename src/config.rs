//! Configuration.
//!
//! Read from `config.toml` in the platform config directory
//! (~/.config/tally/config.toml on Linux). Every key is optional:
//!
//! ```toml
//! database = "/home/me/finance/tally.db"
//! checkpoint_dir = "/mnt/backup/tally"
//! auto_retention = 5
//! busy_timeout = "5s"
//! log_level = "info"
//! ```
//!
//! Command line flags override the file.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::checkpoint::{CheckpointManager, DEFAULT_AUTO_RETENTION};
use crate::cli::Cli;
use crate::error::{Error, Result};

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    database: Option<PathBuf>,
    checkpoint_dir: Option<PathBuf>,
    auto_retention: Option<usize>,
    busy_timeout: Option<String>,
    log_level: Option<String>,
}

#[derive(Debug)]
pub struct Config {
    pub database: PathBuf,
    pub checkpoint_dir: Option<PathBuf>,
    pub auto_retention: usize,
    pub busy_timeout: Duration,
    pub log_level: String,
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "tally")
}

/// Default database path (~/.local/share/tally/tally.db or platform equivalent)
pub fn default_db_path() -> Result<PathBuf> {
    let data_dir = project_dirs()
        .ok_or_else(|| Error::Config("could not determine data directory".into()))?
        .data_dir()
        .to_path_buf();

    std::fs::create_dir_all(&data_dir)
        .map_err(Error::io(format!("failed to create {}", data_dir.display())))?;
    Ok(data_dir.join("tally.db"))
}

fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

impl Config {
    /// Load the config file (if any) and apply command line overrides
    pub fn load(cli: &Cli) -> Result<Self> {
        let file = match cli.config.clone().or_else(default_config_path) {
            Some(path) if path.exists() => read_file(&path)?,
            Some(path) if cli.config.is_some() => {
                return Err(Error::Config(format!("config file {} does not exist", path.display())));
            }
            _ => FileConfig::default(),
        };

        let database = match cli.db.clone().or(file.database) {
            Some(path) => path,
            None => default_db_path()?,
        };

        let busy_timeout = match file.busy_timeout {
            Some(s) => humantime::parse_duration(&s)
                .map_err(|e| Error::Config(format!("invalid busy_timeout {s:?}: {e}")))?,
            None => Duration::from_secs(5),
        };

        let log_level = if cli.verbose {
            "debug".to_string()
        } else {
            file.log_level.unwrap_or_else(|| "info".to_string())
        };

        Ok(Config {
            database,
            checkpoint_dir: cli.checkpoint_dir.clone().or(file.checkpoint_dir),
            auto_retention: file.auto_retention.unwrap_or(DEFAULT_AUTO_RETENTION),
            busy_timeout,
            log_level,
        })
    }

    pub fn manager(&self) -> Result<CheckpointManager> {
        let manager = match &self.checkpoint_dir {
            Some(dir) => CheckpointManager::with_checkpoint_dir(&self.database, dir)?,
            None => CheckpointManager::new(&self.database)?,
        };
        Ok(manager.with_auto_retention(self.auto_retention))
    }
}

fn read_file(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(Error::io(format!("failed to read config {}", path.display())))?;
    parse(&content).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
}

fn parse(content: &str) -> std::result::Result<FileConfig, toml::de::Error> {
    toml::from_str(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("tally").chain(args.iter().copied()))
    }

    #[test]
    fn parses_all_keys() {
        let file = parse(
            r#"
            database = "/data/tally.db"
            checkpoint_dir = "/backup"
            auto_retention = 3
            busy_timeout = "250ms"
            log_level = "warn"
            "#,
        )
        .unwrap();

        assert_eq!(file.database, Some(PathBuf::from("/data/tally.db")));
        assert_eq!(file.auto_retention, Some(3));
        assert_eq!(file.busy_timeout.as_deref(), Some("250ms"));
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(parse("retention = 3").is_err());
    }

    #[test]
    fn file_values_apply_and_flags_override() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(
            &config_path,
            "database = \"/data/tally.db\"\nauto_retention = 2\nbusy_timeout = \"2s\"\n",
        )
        .unwrap();
        let config_arg = config_path.to_str().unwrap();

        let config = Config::load(&cli(&["--config", config_arg, "checkpoint", "list"])).unwrap();
        assert_eq!(config.database, PathBuf::from("/data/tally.db"));
        assert_eq!(config.auto_retention, 2);
        assert_eq!(config.busy_timeout, Duration::from_secs(2));
        assert_eq!(config.log_level, "info");

        let config = Config::load(&cli(&[
            "--config", config_arg, "--db", "/other.db", "-v", "checkpoint", "list",
        ]))
        .unwrap();
        assert_eq!(config.database, PathBuf::from("/other.db"));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn bad_busy_timeout_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, "busy_timeout = \"soon\"\n").unwrap();

        let err = Config::load(&cli(&["--config", config_path.to_str().unwrap(), "--db", "/x.db", "checkpoint", "list"]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let err = Config::load(&cli(&["--config", "/nonexistent/tally.toml", "checkpoint", "list"])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
