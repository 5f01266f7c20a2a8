/// Loading config.toml and the mapping file together.
///
/// Startup and reload fail differently. A reload that hits any error keeps
/// the running table, so [`Sources::load`] is strict. At startup there is no
/// running table: [`Sources::load_startup`] falls back piece by piece. A bad
/// config.toml means default settings (the mapping file is still read), and
/// only a bad mapping file means built-in mappings.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::error;

use crate::config::{self, Config};
use crate::mappings;
use crate::paths;
use crate::trigger_table::{MappingSet, TriggerTable};

/// Where the daemon reads its configuration from.
pub struct Sources {
    config_dir: PathBuf,
    config_path: PathBuf,
    default_mappings: PathBuf,
}

/// Result of a startup load. `problems` holds every error that forced a
/// fallback, in the order they occurred.
pub struct Startup {
    pub config: Config,
    pub table: TriggerTable,
    pub problems: Vec<String>,
}

impl Startup {
    /// Every fallback problem on one line, for `status.toml`.
    pub fn error_summary(&self) -> Option<String> {
        (!self.problems.is_empty()).then(|| self.problems.join("; "))
    }
}

impl Sources {
    pub fn locate() -> Result<Self> {
        Ok(Self {
            config_dir: paths::app_config_dir()?,
            config_path: paths::config_file_path()?,
            default_mappings: paths::default_mappings_path()?,
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn mappings_path(&self, config: &Config) -> PathBuf {
        config.mappings_path(&self.config_dir, &self.default_mappings)
    }

    /// Reads config.toml and the mapping file it points at. Any error fails
    /// the whole load.
    pub fn load(&self) -> Result<(Config, MappingSet)> {
        let config = config::load_or_default(&self.config_path)?;
        let set = mappings::load(&self.mappings_path(&config))?;
        Ok((config, set))
    }

    /// Loads what it can, substituting defaults for the parts that fail.
    pub fn load_startup(&self) -> Result<Startup> {
        let mut problems = Vec::new();

        let config = match config::load_or_default(&self.config_path) {
            Ok(config) => config,
            Err(e) => {
                error!("{e:#} (using default settings)");
                problems.push(format!("{e:#}"));
                Config::default()
            }
        };

        let set = match mappings::load(&self.mappings_path(&config)) {
            Ok(set) => set,
            Err(e) => {
                error!("{e:#} (using built-in mappings)");
                problems.push(format!("{e:#}"));
                MappingSet::builtin()
            }
        };

        let table = match TriggerTable::build(set) {
            Ok(table) => table,
            Err(e) => {
                error!("Invalid mappings: {e} (using built-in mappings)");
                problems.push(format!("Invalid mappings: {e}"));
                TriggerTable::build(MappingSet::builtin())
                    .context("built-in mappings are invalid")?
            }
        };

        Ok(Startup {
            config,
            table,
            problems,
        })
    }
}

#[cfg(test)]
impl Sources {
    fn in_dir(dir: &Path) -> Self {
        Self {
            config_dir: dir.to_path_buf(),
            config_path: dir.join(paths::CONFIG_FILE_NAME),
            default_mappings: dir.join(paths::MAPPINGS_FILE_NAME),
        }
    }
}
