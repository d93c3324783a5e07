//! Storage root resolution.
//!
//! The engine's only configuration surface is the root directory runs are
//! persisted under. Precedence: an explicit path from the caller, then the
//! `BLUEPRINT_DATA_DIR` environment variable, then a fixed anchor under the
//! user's home directory — so the default never depends on the process's
//! working directory.

use std::path::{Path, PathBuf};

/// Environment variable overriding the storage root.
pub const DATA_DIR_ENV: &str = "BLUEPRINT_DATA_DIR";

const DEFAULT_ANCHOR: &str = ".blueprint";
const RUNS_DIR: &str = "runs";

/// Resolved storage configuration for a [`crate::run::store::RunStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    root: PathBuf,
}

impl StoreConfig {
    /// Resolve the storage root from an optional explicit path, the
    /// environment, and the home-directory anchor, in that order.
    pub fn resolve(explicit: Option<PathBuf>) -> Self {
        let env = std::env::var_os(DATA_DIR_ENV).map(PathBuf::from);
        Self::resolve_with(explicit, env, dirs::home_dir())
    }

    fn resolve_with(
        explicit: Option<PathBuf>,
        env: Option<PathBuf>,
        home: Option<PathBuf>,
    ) -> Self {
        let root = explicit.or(env).unwrap_or_else(|| {
            home.unwrap_or_else(|| PathBuf::from("."))
                .join(DEFAULT_ANCHOR)
                .join(RUNS_DIR)
        });
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
