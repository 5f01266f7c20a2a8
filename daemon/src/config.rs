use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::event::DaemonEvent;

pub const MIN_TIMEOUT_MS: u64 = 50;
pub const MAX_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 500;

/// Root configuration structure. Deserialized from `<config dir>/earkey/config.toml`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Debounce window in milliseconds: how long a multi-button trigger may
    /// take from its first press. Clamped to [50, 5000].
    pub timeout_ms: u64,
    /// Mapping file location. Relative paths are resolved against the config
    /// directory; unset means `mappings.ekmap` next to this file.
    pub mappings_file: Option<PathBuf>,
    /// Play a short tone when a mode is activated or deactivated.
    pub audio: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            mappings_file: None,
            audio: false,
        }
    }
}

impl Config {
    /// Returns the debounce window, clamped to the supported range.
    pub fn effective_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS))
    }

    /// Returns the mapping file path, falling back to `default`.
    pub fn mappings_path(&self, config_dir: &Path, default: &Path) -> PathBuf {
        match &self.mappings_file {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => config_dir.join(p),
            None => default.to_path_buf(),
        }
    }
}

/// Loads the config file at `path`, returning `Config::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Watches the parent directory of every path in `files` and sends
/// `ReloadRequested` whenever one of them is created or modified.
///
/// Parsing happens on the event loop, not here, so a reload never races
/// with button handling.
pub async fn watch_config(files: Vec<PathBuf>, tx: mpsc::Sender<DaemonEvent>) {
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Event>(16);

    let mut watcher = match RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = watch_tx.blocking_send(event);
            }
        },
        NotifyConfig::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            error!("Failed to create file watcher: {e}");
            return;
        }
    };

    // Watch parent directories rather than the files directly so we catch
    // editor-style atomic saves (write-new + rename).
    let mut dirs: Vec<PathBuf> = files
        .iter()
        .filter_map(|f| f.parent().map(Path::to_path_buf))
        .collect();
    dirs.sort();
    dirs.dedup();

    for dir in &dirs {
        if let Err(e) = watcher.watch(dir, RecursiveMode::NonRecursive) {
            error!("Failed to watch {}: {e}", dir.display());
        }
    }

    while let Some(event) = watch_rx.recv().await {
        if is_relevant(&event, &files) {
            debug!(paths = ?event.paths, "watched file changed");
            if tx.send(DaemonEvent::ReloadRequested).await.is_err() {
                break;
            }
        }
    }
}

fn is_relevant(event: &notify::Event, files: &[PathBuf]) -> bool {
    let affects_watched = event.paths.iter().any(|p| files.iter().any(|f| f == p));
    let is_write = matches!(
        event.kind,
        notify::EventKind::Create(_) | notify::EventKind::Modify(_)
    );
    affects_watched && is_write
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn config_default_values() {
        let c = Config::default();
        assert_eq!(c.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert!(c.mappings_file.is_none());
        assert!(!c.audio);
        assert_eq!(c.effective_timeout(), Duration::from_millis(500));
    }

    // ── effective_timeout ─────────────────────────────────────────────────────

    #[test]
    fn effective_timeout_clamps_below_min() {
        let c = Config { timeout_ms: 1, ..Config::default() };
        assert_eq!(c.effective_timeout(), Duration::from_millis(MIN_TIMEOUT_MS));
    }

    #[test]
    fn effective_timeout_clamps_above_max() {
        let c = Config { timeout_ms: 60_000, ..Config::default() };
        assert_eq!(c.effective_timeout(), Duration::from_millis(MAX_TIMEOUT_MS));
    }

    #[test]
    fn effective_timeout_passes_through_in_range() {
        let c = Config { timeout_ms: 750, ..Config::default() };
        assert_eq!(c.effective_timeout(), Duration::from_millis(750));
    }

    // ── mappings_path ─────────────────────────────────────────────────────────

    #[test]
    fn mappings_path_defaults() {
        let c = Config::default();
        let dir = Path::new("/cfg");
        assert_eq!(
            c.mappings_path(dir, Path::new("/cfg/mappings.ekmap")),
            PathBuf::from("/cfg/mappings.ekmap")
        );
    }

    #[test]
    fn mappings_path_relative_is_under_config_dir() {
        let c = Config {
            mappings_file: Some(PathBuf::from("work.ekmap")),
            ..Config::default()
        };
        assert_eq!(
            c.mappings_path(Path::new("/cfg"), Path::new("/cfg/mappings.ekmap")),
            PathBuf::from("/cfg/work.ekmap")
        );
    }

    #[cfg(unix)]
    #[test]
    fn mappings_path_absolute_is_kept() {
        let c = Config {
            mappings_file: Some(PathBuf::from("/etc/earkey.ekmap")),
            ..Config::default()
        };
        assert_eq!(
            c.mappings_path(Path::new("/cfg"), Path::new("/cfg/mappings.ekmap")),
            PathBuf::from("/etc/earkey.ekmap")
        );
    }

    // ── load_or_default ───────────────────────────────────────────────────────

    #[test]
    fn load_or_default_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonexistent.toml");
        let config = load_or_default(&path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_or_default_parses_valid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "timeout_ms = 300\nmappings_file = \"alt.ekmap\"\naudio = true\n",
        )
        .unwrap();

        let config = load_or_default(&path).unwrap();
        assert_eq!(config.timeout_ms, 300);
        assert_eq!(config.mappings_file, Some(PathBuf::from("alt.ekmap")));
        assert!(config.audio);
    }

    #[test]
    fn load_or_default_partial_toml_uses_field_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "timeout_ms = 800\n").unwrap();

        let config = load_or_default(&path).unwrap();
        assert_eq!(config.timeout_ms, 800);
        assert!(config.mappings_file.is_none());
    }

    #[test]
    fn load_or_default_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is not valid toml ][[[").unwrap();
        assert!(load_or_default(&path).is_err());
    }

    #[test]
    fn load_or_default_wrong_type_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "timeout_ms = \"fast\"\n").unwrap();
        assert!(load_or_default(&path).is_err());
    }

    // ── is_relevant ───────────────────────────────────────────────────────────

    #[test]
    fn only_writes_to_watched_files_are_relevant() {
        use notify::event::{CreateKind, ModifyKind, RemoveKind};
        use notify::{Event, EventKind};

        let watched = vec![PathBuf::from("/cfg/config.toml")];
        let modify = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/cfg/config.toml"));
        let create_other = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/cfg/other.toml"));
        let remove = Event::new(EventKind::Remove(RemoveKind::File))
            .add_path(PathBuf::from("/cfg/config.toml"));

        assert!(is_relevant(&modify, &watched));
        assert!(!is_relevant(&create_other, &watched));
        assert!(!is_relevant(&remove, &watched));
    }
}
