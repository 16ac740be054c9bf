//! Runtime configuration from environment variables
//!
//! All knobs are read once at startup into an immutable [`Settings`] value
//! that is threaded through command execution. Nothing here is a process-wide
//! singleton; tests construct their own `Settings` directly.

use std::env;
use std::path::PathBuf;

use crate::{A4fError, A4fResult};

/// Which scanner command flavor to invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScancodeFlavor {
    /// Plain `scancode` on the PATH.
    Native,
    /// Containerized `scancode-wrapper` helper.
    Wrapper,
}

/// Immutable runtime configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Pool base directory (`A4F_POOL`, required).
    pub pool_path: PathBuf,
    /// Whether existing pool artifacts short-circuit derivation (`A4F_CACHE`).
    pub pool_cached: bool,
    /// Log filter (`A4F_LOGLEVEL`).
    pub log_level: String,
    /// Scanner flavor (`A4F_SCANCODE`).
    pub scancode: ScancodeFlavor,
    /// Echo produced documents to stdout (`A4F_PRINTRESULT`).
    pub print_result: bool,
    /// External SPDX tag-value <-> RDF/XML converter (`SPDX_TOOLS_CMD`).
    pub spdx_tools_cmd: String,
    /// Disclaimer text attached to generated SPDX documents.
    pub spdx_disclaimer: String,
    /// Suffix appended to harvested package ids (`PACKAGE_ID_EXT`).
    pub package_id_ext: String,
    /// Clearing server credentials and coordinates.
    pub fossy_user: String,
    pub fossy_password: String,
    pub fossy_group_id: u32,
    pub fossy_server: String,
    /// Key presented on session lock/unlock operations (`A4F_LOCK_KEY`).
    pub lock_key: Option<String>,
    /// Mirror database coordinates (`MIRROR_DB_*`). The db name doubles as
    /// the SQLite file path.
    pub mirror_db: MirrorDb,
}

#[derive(Debug, Clone, Default)]
pub struct MirrorDb {
    pub host: String,
    pub port: String,
    pub dbname: String,
    pub user: String,
    pub password: String,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => v.eq_ignore_ascii_case("true") || v == "1",
        Err(_) => default,
    }
}

impl Settings {
    /// Build settings from the process environment.
    ///
    /// Only `A4F_POOL` is mandatory; everything else has a default that works
    /// against a local Fossology test instance.
    pub fn from_env() -> A4fResult<Self> {
        let pool_path = env::var("A4F_POOL")
            .map_err(|_| A4fError::Config("A4F_POOL is not set".to_string()))?;
        if pool_path.trim().is_empty() {
            return Err(A4fError::Config("A4F_POOL is empty".to_string()));
        }

        let scancode = match env_or("A4F_SCANCODE", "native").to_lowercase().as_str() {
            "wrapper" => ScancodeFlavor::Wrapper,
            _ => ScancodeFlavor::Native,
        };

        let fossy_group_id = env_or("FOSSY_GROUP_ID", "3")
            .parse::<u32>()
            .map_err(|_| A4fError::Config("FOSSY_GROUP_ID must be an integer".to_string()))?;

        Ok(Settings {
            pool_path: PathBuf::from(pool_path),
            pool_cached: env_bool("A4F_CACHE", true),
            log_level: env_or("A4F_LOGLEVEL", "INFO"),
            scancode,
            print_result: env_bool("A4F_PRINTRESULT", false),
            spdx_tools_cmd: env_or("SPDX_TOOLS_CMD", "spdx-tools-convert"),
            spdx_disclaimer: env_or("SPDX_DISCLAIMER", ""),
            package_id_ext: env_or("PACKAGE_ID_EXT", "a4f"),
            fossy_user: env_or("FOSSY_USER", "fossy"),
            fossy_password: env_or("FOSSY_PASSWORD", "fossy"),
            fossy_group_id,
            fossy_server: env_or("FOSSY_SERVER", "http://localhost/repo"),
            lock_key: env::var("A4F_LOCK_KEY").ok().filter(|k| !k.is_empty()),
            mirror_db: MirrorDb {
                host: env_or("MIRROR_DB_HOST", "localhost"),
                port: env_or("MIRROR_DB_PORT", "5432"),
                dbname: env_or("MIRROR_DB_DBNAME", "a4f_mirror.db"),
                user: env_or("MIRROR_DB_USER", ""),
                password: env_or("MIRROR_DB_PASSWORD", ""),
            },
        })
    }

    /// Settings for tests: pool under the given directory, cache on,
    /// everything external pointed at placeholders.
    pub fn for_tests(pool_path: &std::path::Path) -> Self {
        Settings {
            pool_path: pool_path.to_path_buf(),
            pool_cached: true,
            log_level: "DEBUG".to_string(),
            scancode: ScancodeFlavor::Native,
            print_result: false,
            spdx_tools_cmd: "spdx-tools-convert".to_string(),
            spdx_disclaimer: String::new(),
            package_id_ext: "a4f".to_string(),
            fossy_user: "fossy".to_string(),
            fossy_password: "fossy".to_string(),
            fossy_group_id: 3,
            fossy_server: "http://localhost/repo".to_string(),
            lock_key: None,
            mirror_db: MirrorDb::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_pool_is_a_config_error() {
        env::remove_var("A4F_POOL");
        let err = Settings::from_env().unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_settings_have_sane_defaults() {
        let dir = std::env::temp_dir();
        let s = Settings::for_tests(&dir);
        assert!(s.pool_cached);
        assert_eq!(s.fossy_group_id, 3);
        assert_eq!(s.scancode, ScancodeFlavor::Native);
    }
}
