//! svnmeld configuration (`svnmeld.toml`).
//!
//! Everything has a default, so running without a config file is the
//! normal case. The file exists for hosts with several Subversion
//! installations and for sites that want the destination lock-step check
//! always on or a different identity on namespace commits.
//!
//! ```toml
//! [svn]
//! svn = "/opt/svn-1.14/bin/svn"
//! svnadmin = "/opt/svn-1.14/bin/svnadmin"
//!
//! [merge]
//! verify_destination = true
//! username = "history-import"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::svn::SvnTools;

/// Default config file name, looked up in the working directory when no
/// `--config` path is given.
pub const DEFAULT_CONFIG_FILE: &str = "svnmeld.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level svnmeld configuration.
///
/// Missing fields use defaults; a missing default-location file means all
/// defaults (no error). An explicitly-passed path must exist.
#[derive(Clone, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MeldConfig {
    /// Subversion tool locations.
    #[serde(default)]
    pub svn: SvnConfig,

    /// Merge behavior.
    #[serde(default)]
    pub merge: MergeBehavior,
}

// ---------------------------------------------------------------------------
// SvnConfig
// ---------------------------------------------------------------------------

/// Paths to the Subversion binaries.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SvnConfig {
    /// The `svn` client binary (default: resolved via `PATH`).
    #[serde(default = "default_svn")]
    pub svn: PathBuf,

    /// The `svnadmin` binary (default: resolved via `PATH`).
    #[serde(default = "default_svnadmin")]
    pub svnadmin: PathBuf,

    /// The `svnlook` binary (default: resolved via `PATH`).
    #[serde(default = "default_svnlook")]
    pub svnlook: PathBuf,
}

impl Default for SvnConfig {
    fn default() -> Self {
        Self {
            svn: default_svn(),
            svnadmin: default_svnadmin(),
            svnlook: default_svnlook(),
        }
    }
}

impl From<&SvnConfig> for SvnTools {
    fn from(cfg: &SvnConfig) -> Self {
        Self {
            svn: cfg.svn.clone(),
            svnadmin: cfg.svnadmin.clone(),
            svnlook: cfg.svnlook.clone(),
        }
    }
}

fn default_svn() -> PathBuf {
    PathBuf::from("svn")
}

fn default_svnadmin() -> PathBuf {
    PathBuf::from("svnadmin")
}

fn default_svnlook() -> PathBuf {
    PathBuf::from("svnlook")
}

// ---------------------------------------------------------------------------
// MergeBehavior
// ---------------------------------------------------------------------------

/// Merge behavior settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergeBehavior {
    /// Check after every commit that the destination's youngest revision
    /// matches the merge counter (default: off; also reachable via
    /// `--verify`).
    #[serde(default)]
    pub verify_destination: bool,

    /// Username recorded on namespace-creation commits.
    #[serde(default = "default_username")]
    pub username: String,

    /// Log message for namespace-creation commits.
    #[serde(default = "default_namespace_message")]
    pub namespace_message: String,
}

impl Default for MergeBehavior {
    fn default() -> Self {
        Self {
            verify_destination: false,
            username: default_username(),
            namespace_message: default_namespace_message(),
        }
    }
}

fn default_username() -> String {
    "svnmeld".to_owned()
}

fn default_namespace_message() -> String {
    "Create directory to hold a merged-in repository history".to_owned()
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// A configuration file could not be read or parsed.
#[derive(Debug)]
pub struct ConfigError {
    /// The file involved, when known.
    pub path: Option<PathBuf>,
    /// Human-readable description of the problem.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "config error in '{}': {}", path.display(), self.message),
            None => write!(f, "config error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load configuration.
///
/// With `Some(path)`, the file must exist and parse. With `None`, the
/// default location is tried and a missing file simply yields defaults.
///
/// # Errors
/// [`ConfigError`] on unreadable or unparsable files.
pub fn load(explicit: Option<&Path>) -> Result<MeldConfig, ConfigError> {
    let (path, required) = match explicit {
        Some(path) => (path.to_owned(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };

    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound && !required => {
            return Ok(MeldConfig::default());
        }
        Err(err) => {
            return Err(ConfigError {
                path: Some(path),
                message: err.to_string(),
            });
        }
    };

    toml::from_str(&text).map_err(|err| ConfigError {
        path: Some(path),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let cfg = MeldConfig::default();
        assert_eq!(cfg.svn.svn, PathBuf::from("svn"));
        assert!(!cfg.merge.verify_destination);
        assert_eq!(cfg.merge.username, "svnmeld");
    }

    #[test]
    fn parses_partial_file() {
        let cfg: MeldConfig = toml::from_str(
            r#"
            [merge]
            verify_destination = true
            username = "importer"
            "#,
        )
        .unwrap();
        assert!(cfg.merge.verify_destination);
        assert_eq!(cfg.merge.username, "importer");
        // Untouched sections keep their defaults.
        assert_eq!(cfg.svn.svnadmin, PathBuf::from("svnadmin"));
        assert_eq!(
            cfg.merge.namespace_message,
            default_namespace_message()
        );
    }

    #[test]
    fn unknown_fields_rejected() {
        let result: Result<MeldConfig, _> = toml::from_str("[merge]\nshiny = true\n");
        assert!(result.is_err());
    }

    #[test]
    fn tool_paths_override() {
        let cfg: MeldConfig = toml::from_str(
            r#"
            [svn]
            svn = "/opt/svn/bin/svn"
            svnadmin = "/opt/svn/bin/svnadmin"
            svnlook = "/opt/svn/bin/svnlook"
            "#,
        )
        .unwrap();
        let tools = SvnTools::from(&cfg.svn);
        assert_eq!(tools.svnadmin, PathBuf::from("/opt/svn/bin/svnadmin"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = load(Some(&missing)).unwrap_err();
        assert_eq!(err.path.as_deref(), Some(missing.as_path()));
    }

    #[test]
    fn explicit_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svnmeld.toml");
        std::fs::write(&path, "[merge]\nverify_destination = true\n").unwrap();
        let cfg = load(Some(&path)).unwrap();
        assert!(cfg.merge.verify_destination);
    }

    #[test]
    fn unparsable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svnmeld.toml");
        std::fs::write(&path, "this is not toml [").unwrap();
        assert!(load(Some(&path)).is_err());
    }
}
