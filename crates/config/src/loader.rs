use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::SwitchboardConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "switchboard.toml",
    "switchboard.yaml",
    "switchboard.yml",
    "switchboard.json",
];

/// File name of the resume-id store inside the data dir.
const RESUME_STORE_FILENAME: &str = "resume-ids.json";

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<SwitchboardConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./switchboard.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/switchboard/switchboard.{toml,yaml,yml,json}` (user-global)
///
/// Returns `SwitchboardConfig::default()` if no config file is found.
pub fn discover_and_load() -> SwitchboardConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    SwitchboardConfig::default()
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let config_dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| config_dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/switchboard/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "switchboard").map(|d| d.config_dir().to_path_buf())
}

/// Returns the user data directory (`~/.local/share/switchboard/` on Linux).
pub fn data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "switchboard").map(|d| d.data_dir().to_path_buf())
}

/// Resolve where the resume-id store lives: the configured path, else the
/// data dir, else the working directory.
pub fn resume_store_path(config: &SwitchboardConfig) -> PathBuf {
    if let Some(path) = &config.sessions.store_path {
        return path.clone();
    }
    data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(RESUME_STORE_FILENAME)
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<SwitchboardConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("switchboard.toml");
        std::fs::write(&path, "[server]\nport = 9000\n").unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.bind, "127.0.0.1");
    }

    #[test]
    fn loads_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("switchboard.yaml");
        std::fs::write(&path, "approval:\n  timeout_secs: 42\n").unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.approval.timeout_secs, 42);
    }

    #[test]
    fn loads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("switchboard.json");
        std::fs::write(&path, r#"{"agent": {"binary": "agent-cli"}}"#).unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.agent.binary, "agent-cli");
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("switchboard.ini");
        std::fs::write(&path, "port=1").unwrap();

        assert!(load_config(&path).is_err());
    }

    #[test]
    fn explicit_store_path_wins() {
        let mut cfg = SwitchboardConfig::default();
        cfg.sessions.store_path = Some(PathBuf::from("/tmp/ids.json"));
        assert_eq!(resume_store_path(&cfg), PathBuf::from("/tmp/ids.json"));
    }
}
