use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Invalid {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("batch_size must be at least 1")]
    InvalidBatchSize,
}

/// Run settings. Every option is about where files live or how much
/// parallelism runs; none of them alter the rewrite policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub work_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Courses handed to the pool per wave.
    pub batch_size: usize,
    /// Worker pool size; 0 means one worker per CPU.
    pub workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            source_dir: PathBuf::from("./source-courses"),
            output_dir: PathBuf::from("./optimized-courses"),
            work_dir: PathBuf::from("./tmp"),
            log_dir: PathBuf::from("./logs"),
            batch_size: 2,
            workers: 2,
        }
    }
}

impl Config {
    /// Load settings from a TOML file; absent keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&raw).map_err(|source| ConfigError::Invalid {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }
        Ok(())
    }

    /// Worker pool size with the `0 = all CPUs` rule applied.
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.source_dir, PathBuf::from("./source-courses"));
        assert_eq!(config.output_dir, PathBuf::from("./optimized-courses"));
        assert_eq!(config.work_dir, PathBuf::from("./tmp"));
        assert_eq!(config.log_dir, PathBuf::from("./logs"));
        assert_eq!(config.batch_size, 2);
        assert_eq!(config.workers, 2);
    }

    #[test]
    fn test_load_full_file() {
        let file = write_config(
            r#"
source_dir = "/data/in"
output_dir = "/data/out"
work_dir = "/data/tmp"
log_dir = "/data/logs"
batch_size = 4
workers = 8
"#,
        );

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.source_dir, PathBuf::from("/data/in"));
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.workers, 8);
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let file = write_config("workers = 6\n");

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.workers, 6);
        assert_eq!(config.batch_size, 2);
        assert_eq!(config.source_dir, PathBuf::from("./source-courses"));
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let file = write_config("batch_size = 0\n");
        let result = Config::load(file.path());
        assert!(matches!(result, Err(ConfigError::InvalidBatchSize)));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let file = write_config("no_such_option = true\n");
        let result = Config::load(file.path());
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::Unreadable { .. })));
    }

    #[test]
    fn test_zero_workers_resolves_to_cpu_count() {
        let file = write_config("workers = 0\n");
        let config = Config::load(file.path()).unwrap();
        assert!(config.effective_workers() >= 1);
    }
}
