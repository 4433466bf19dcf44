//! `roster.toml` and `ROSTER_*` environment settings.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::Context as _;
use roster_engine::EngineConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RosterConfig {
  /// Path to the SQLite database file. A leading `~/` is expanded.
  pub store_path:  PathBuf,
  /// Deadline for one change request, in milliseconds.
  pub deadline_ms: u64,
  /// `tracing` filter directives used when `RUST_LOG` is unset.
  pub log_filter:  String,
}

impl Default for RosterConfig {
  fn default() -> Self {
    Self {
      store_path:  PathBuf::from("roster.db"),
      deadline_ms: 10_000,
      log_filter:  "info".to_owned(),
    }
  }
}

impl RosterConfig {
  /// Layer the optional config file under `ROSTER_*` environment variables.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("ROSTER"))
      .build()
      .with_context(|| format!("failed to read config file {path:?}"))?
      .try_deserialize()
      .context("failed to deserialise RosterConfig")
  }

  pub fn engine(&self) -> EngineConfig {
    EngineConfig { deadline: Duration::from_millis(self.deadline_ms) }
  }

  pub fn store_path(&self) -> PathBuf { expand_tilde(&self.store_path) }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use config::{Config, File, FileFormat};

  use super::*;

  fn parse(toml: &str) -> RosterConfig {
    Config::builder()
      .add_source(File::from_str(toml, FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap()
  }

  #[test]
  fn missing_keys_fall_back_to_defaults() {
    let cfg = parse("store_path = \"/var/lib/roster.db\"");
    assert_eq!(cfg.store_path, PathBuf::from("/var/lib/roster.db"));
    assert_eq!(cfg.deadline_ms, 10_000);
    assert_eq!(cfg.log_filter, "info");
  }

  #[test]
  fn deadline_maps_to_engine_config() {
    let cfg = parse("deadline_ms = 250");
    assert_eq!(cfg.engine().deadline, Duration::from_millis(250));
  }

  #[test]
  fn absolute_paths_are_left_alone() {
    assert_eq!(expand_tilde(Path::new("/tmp/r.db")), PathBuf::from("/tmp/r.db"));
  }
}
