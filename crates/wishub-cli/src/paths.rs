//! Platform-appropriate directory locations for wishub-skill's server state.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

const APP_QUALIFIER: &str = "skill";
const APP_ORGANIZATION: &str = "wishub";
const APP_NAME: &str = "wishub";

#[derive(Debug, Clone)]
pub struct WishubPaths {
    pub data_dir: PathBuf,
    pub config_dir: PathBuf,
    pub database_path: PathBuf,
    pub artifact_root: PathBuf,
}

impl WishubPaths {
    /// Platform defaults: `~/.local/share/wishub` on Linux,
    /// `~/Library/Application Support/wishub` on macOS, `%APPDATA%\wishub` on Windows.
    pub fn new() -> Result<Self> {
        let project_dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .context("failed to determine system directories")?;

        let data_dir = project_dirs.data_dir().to_path_buf();
        let config_dir = project_dirs.config_dir().to_path_buf();

        Ok(WishubPaths {
            database_path: data_dir.join("wishub.db"),
            artifact_root: data_dir.join("artifacts"),
            data_dir,
            config_dir,
        })
    }

    /// All paths rooted under a single directory; used by tests.
    pub fn with_root<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        WishubPaths {
            data_dir: root.clone(),
            config_dir: root.join("config"),
            database_path: root.join("wishub.db"),
            artifact_root: root.join("artifacts"),
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.data_dir, &self.config_dir, &self.artifact_root] {
            if !dir.exists() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create directory: {}", dir.display()))?;
            }
        }
        Ok(())
    }

    pub fn default_config_file(&self) -> PathBuf {
        self.config_dir.join("config.yaml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_root_places_everything_under_one_directory() {
        let dir = tempfile::tempdir().unwrap();
        let paths = WishubPaths::with_root(dir.path());
        assert!(paths.database_path.starts_with(dir.path()));
        assert!(paths.artifact_root.starts_with(dir.path()));
        paths.ensure_directories().unwrap();
        assert!(paths.artifact_root.exists());
    }
}
