use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::warn;

use crate::dispatcher::{ModeChange, ModeObserver};
use crate::mode_stack::ModeStack;

/// Current operational state of the daemon.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "lowercase")]
pub enum DaemonState {
    /// No mode is active; only global triggers apply.
    Idle,
    /// At least one mode is active.
    Mode,
}

/// Runtime status written to `<config dir>/earkey/status.toml`.
/// Status bars and scripts read this file to show the active mode.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DaemonStatus {
    /// Daemon binary version (set from Cargo.toml at compile time).
    pub version: String,
    pub state: DaemonState,
    /// Active modes, innermost last.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub active_modes: Vec<String>,
    /// RFC 3339 timestamp of the most recent mode transition, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_mode_change: Option<String>,
    /// Most recent reload failure, cleared by the next successful reload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonStatus {
    /// Constructs the initial idle status on daemon startup.
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: DaemonState::Idle,
            active_modes: Vec::new(),
            last_mode_change: None,
            error: None,
        }
    }

    /// Copies the active scopes out of `modes` and derives `state` from them.
    pub fn set_modes(&mut self, modes: &ModeStack) {
        self.active_modes = modes
            .active_scopes()
            .iter()
            .map(|m| m.as_str().to_string())
            .collect();
        self.state = if self.active_modes.is_empty() {
            DaemonState::Idle
        } else {
            DaemonState::Mode
        };
    }
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializes `status` to TOML and writes it to `path`.
/// Creates the parent directory if it does not exist.
/// A status write failure is logged and otherwise ignored.
pub fn write_status(path: &Path, status: &DaemonStatus) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!("Failed to create directory {}: {e}", parent.display());
            return;
        }
    }
    match toml::to_string_pretty(status) {
        Ok(content) => {
            if let Err(e) = std::fs::write(path, content) {
                warn!("Failed to write status file: {e}");
            }
        }
        Err(e) => warn!("Failed to serialize status: {e}"),
    }
}

pub type SharedStatus = Rc<RefCell<DaemonStatus>>;

/// Mode observer that rewrites the status file on every transition.
///
/// The status is shared with the event loop, which also records reload
/// errors and writes the final state at shutdown.
pub struct StatusObserver {
    path: PathBuf,
    status: SharedStatus,
}

impl StatusObserver {
    pub fn new(path: PathBuf, status: SharedStatus) -> Self {
        Self { path, status }
    }
}

impl ModeObserver for StatusObserver {
    fn on_mode_change(&mut self, _change: &ModeChange, modes: &ModeStack) {
        let mut status = self.status.borrow_mut();
        status.set_modes(modes);
        status.last_mode_change = Some(chrono::Local::now().to_rfc3339());
        write_status(&self.path, &status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger_table::ModeId;

    // ── DaemonStatus::new ─────────────────────────────────────────────────────

    #[test]
    fn new_starts_idle() {
        let s = DaemonStatus::new();
        assert_eq!(s.state, DaemonState::Idle);
        assert!(s.active_modes.is_empty());
    }

    #[test]
    fn new_has_no_optional_fields() {
        let s = DaemonStatus::new();
        assert!(s.last_mode_change.is_none());
        assert!(s.error.is_none());
    }

    #[test]
    fn new_version_matches_cargo_pkg() {
        let s = DaemonStatus::new();
        assert_eq!(s.version, env!("CARGO_PKG_VERSION"));
    }

    // ── set_modes ─────────────────────────────────────────────────────────────

    #[test]
    fn set_modes_tracks_stack_order_and_state() {
        let mut modes = ModeStack::new();
        modes.push(ModeId::new("<Play><Up>"));
        modes.push(ModeId::new("<Down><Down>"));

        let mut s = DaemonStatus::new();
        s.set_modes(&modes);
        assert_eq!(s.state, DaemonState::Mode);
        assert_eq!(s.active_modes, vec!["<Play><Up>", "<Down><Down>"]);

        s.set_modes(&ModeStack::new());
        assert_eq!(s.state, DaemonState::Idle);
        assert!(s.active_modes.is_empty());
    }

    // ── DaemonState serialization ─────────────────────────────────────────────

    #[test]
    fn state_serializes_to_lowercase() {
        // TOML requires a root table, so verify the value via DaemonStatus.
        let mut s = DaemonStatus::new();
        let idle = toml::to_string_pretty(&s).unwrap();
        assert!(idle.contains("state = \"idle\""));

        s.state = DaemonState::Mode;
        let mode = toml::to_string_pretty(&s).unwrap();
        assert!(mode.contains("state = \"mode\""));
    }

    // ── write_status ──────────────────────────────────────────────────────────

    #[test]
    fn write_status_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("dir").join("status.toml");
        write_status(&path, &DaemonStatus::new());
        assert!(path.exists());
    }

    #[test]
    fn write_status_content_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.toml");

        let mut original = DaemonStatus::new();
        original.state = DaemonState::Mode;
        original.active_modes = vec!["<Play><Up>".to_string()];

        write_status(&path, &original);

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: DaemonStatus = toml::from_str(&content).unwrap();
        assert_eq!(parsed.state, DaemonState::Mode);
        assert_eq!(parsed.active_modes, vec!["<Play><Up>"]);
    }

    #[test]
    fn write_status_omits_empty_optional_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.toml");
        write_status(&path, &DaemonStatus::new());

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("active_modes"));
        assert!(!content.contains("last_mode_change"));
        assert!(!content.contains("error"));
    }

    // ── StatusObserver ────────────────────────────────────────────────────────

    #[test]
    fn observer_writes_post_transition_stack() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.toml");
        let shared: SharedStatus = Rc::default();
        let mut observer = StatusObserver::new(path.clone(), Rc::clone(&shared));

        let nav = ModeId::new("nav");
        let mut modes = ModeStack::new();
        modes.push(nav.clone());
        observer.on_mode_change(&ModeChange::Activated(nav), &modes);

        let parsed: DaemonStatus =
            toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.state, DaemonState::Mode);
        assert_eq!(parsed.active_modes, vec!["nav"]);
        assert!(parsed.last_mode_change.is_some());
        assert_eq!(shared.borrow().active_modes, vec!["nav"]);
    }
}
