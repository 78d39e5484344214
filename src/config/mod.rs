use std::{
    collections::HashMap,
    env,
    fs,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::bail;
use directories::BaseDirs;

use crate::pipeline::DatabaseParams;

#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    /// Load defaults, then the rc file (if any), then matching environment variables.
    ///
    /// The default rc file is optional; a path given explicitly must exist.
    pub fn load(path_override: Option<&Path>) -> anyhow::Result<Self> {
        let config_path = match path_override {
            Some(path) => {
                if !path.is_file() {
                    bail!("config file '{}' does not exist", path.display());
                }
                path.to_path_buf()
            }
            None => default_config_path(),
        };
        Ok(Self::load_with_env(config_path, env::vars()))
    }

    fn load_with_env(config_path: PathBuf, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut map = default_map();

        if config_path.exists() {
            if let Ok(file) = fs::File::open(&config_path) {
                let reader = BufReader::new(file);
                for line in reader.lines().map_while(Result::ok) {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    if let Some((k, v)) = line.split_once('=') {
                        map.insert(k.trim().to_string(), v.trim().to_string());
                    }
                }
            }
        }

        // Environment takes precedence over the rc file
        for (k, v) in vars {
            if let Some(key) = config_key(&k) {
                map.insert(key, v);
            }
        }

        Self { inner: map, config_path }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).filter(|v| !v.is_empty()).cloned()
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.inner.insert(key.to_string(), value.into());
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.parse::<u64>().ok())
    }

    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).map(PathBuf::from)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.get_u64("PROCESS_TIMEOUT_MS").unwrap_or(DEFAULT_TIMEOUT_MS))
    }

    pub fn database(&self) -> DatabaseParams {
        let field = |key: &str| self.get(key).unwrap_or_default();
        DatabaseParams {
            host: field("DB_HOST"),
            port: field("DB_PORT"),
            database: field("DB_NAME"),
            user: field("DB_USER"),
            password: field("DB_PASSWORD"),
        }
    }

    pub fn output_root(&self) -> PathBuf {
        self.get_path("OUTPUT_ROOT")
            .or_else(|| env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn output_dir_pattern(&self) -> String {
        self.get("OUTPUT_DIR_PATTERN")
            .unwrap_or_else(|| DEFAULT_OUTPUT_DIR_PATTERN.to_string())
    }

    pub fn log_dir(&self) -> PathBuf {
        self.get_path("LOG_DIR")
            .unwrap_or_else(|| env::temp_dir().join("specimport"))
    }
}

pub const DEFAULT_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_OUTPUT_DIR_PATTERN: &str = "output_%Y%m%d_%H%M%S";

const KEYS: &[&str] = &[
    "PYTHON_PATH",
    "SCRIPT_DIR",
    "SPEC_SCRIPT",
    "CABLE_SCRIPT",
    "WORKS_SCRIPT",
    "EXPORT_SCRIPT",
    "DB_HOST",
    "DB_PORT",
    "DB_NAME",
    "DB_USER",
    "DB_PASSWORD",
    "PROCESS_TIMEOUT_MS",
    "OUTPUT_ROOT",
    "OUTPUT_DIR_PATTERN",
    "OPEN_OUTPUT_DIR",
    "LOG_DIR",
];

/// Map an environment variable to a config key (`SPECIMPORT_DB_HOST` or bare `DB_HOST`).
fn config_key(k: &str) -> Option<String> {
    let stripped = k.strip_prefix("SPECIMPORT_").unwrap_or(k);
    KEYS.contains(&stripped).then(|| stripped.to_string())
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("specimport").join(".specimportrc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();

    // Scripts
    m.insert("SPEC_SCRIPT".into(), "spec_parser.py".into());
    m.insert("CABLE_SCRIPT".into(), "cable_parser.py".into());
    m.insert("WORKS_SCRIPT".into(), "SpecifiedWork_parser.py".into());
    m.insert("EXPORT_SCRIPT".into(), "spec_export.py".into());

    // Database
    m.insert("DB_HOST".into(), "localhost".into());
    m.insert("DB_PORT".into(), "5432".into());
    m.insert("DB_NAME".into(), "cable_db".into());
    m.insert("DB_USER".into(), "postgres".into());
    m.insert("DB_PASSWORD".into(), "test1".into());

    // Run
    m.insert("PROCESS_TIMEOUT_MS".into(), DEFAULT_TIMEOUT_MS.to_string());
    m.insert("OUTPUT_DIR_PATTERN".into(), DEFAULT_OUTPUT_DIR_PATTERN.into());
    m.insert("OPEN_OUTPUT_DIR".into(), "false".into());

    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn load(contents: &str, vars: &[(&str, &str)]) -> Config {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        let vars = vars.iter().map(|(k, v)| (k.to_string(), v.to_string()));
        Config::load_with_env(file.path().to_path_buf(), vars)
    }

    #[test]
    fn defaults_match_original_connection() {
        let cfg = load("", &[]);
        let db = cfg.database();
        assert_eq!(db.host, "localhost");
        assert_eq!(db.port, "5432");
        assert_eq!(db.database, "cable_db");
        assert_eq!(db.user, "postgres");
        assert_eq!(cfg.timeout(), Duration::from_secs(120));
    }

    #[test]
    fn rc_file_overrides_defaults_and_skips_comments() {
        let cfg = load("# comment\nDB_HOST = db.internal\n\nPROCESS_TIMEOUT_MS=500\n", &[]);
        assert_eq!(cfg.get("DB_HOST").as_deref(), Some("db.internal"));
        assert_eq!(cfg.timeout(), Duration::from_millis(500));
    }

    #[test]
    fn environment_beats_rc_file() {
        let cfg = load(
            "DB_NAME=from_file\n",
            &[("SPECIMPORT_DB_NAME", "from_env"), ("HOME", "/ignored")],
        );
        assert_eq!(cfg.get("DB_NAME").as_deref(), Some("from_env"));
        assert!(cfg.get("HOME").is_none());
    }

    #[test]
    fn explicit_config_path_must_exist() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&tmp.path().join("missing-rc"))).unwrap_err();
        assert!(err.to_string().contains("does not exist"), "{err}");

        let rc = tmp.path().join("rc");
        fs::write(&rc, "DB_HOST=from_rc\n").unwrap();
        let cfg = Config::load(Some(&rc)).unwrap();
        assert_eq!(cfg.config_path, rc);
    }

    #[test]
    fn empty_values_read_as_unset() {
        let cfg = load("PYTHON_PATH=\n", &[]);
        assert!(cfg.get_path("PYTHON_PATH").is_none());
    }
}
