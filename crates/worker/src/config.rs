use std::path::PathBuf;
use std::time::Duration;

use radiarch_pacs::dicomweb::DicomWebConfig;

/// Invalid configuration value.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be {expected} (got {value:?})")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Worker configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development; with nothing
/// set the worker runs on the volatile store, the built-in sample study
/// and no PACS push.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// SQLite URL of the durable store. `None` selects the volatile store.
    pub database_url: Option<String>,
    /// Root for `summaries/` and `simulations/` output.
    pub artifact_dir: PathBuf,
    pub worker_count: usize,
    /// How often the poller looks for queued jobs.
    pub poll_interval: Duration,
    /// Limit after which a job fails with stage `timeout`.
    pub soft_time_limit: Duration,
    /// Limit after which the pool aborts the job task.
    pub hard_time_limit: Duration,
    pub force_synthetic: bool,
    /// Persist `stage`/`eta_seconds` in the durable store.
    pub persist_transient_fields: bool,
    pub retry_max_attempts: u32,
    pub retry_backoff_max: Duration,
    /// STOW-RS push target. `None` disables the push.
    pub dicomweb: Option<DicomWebConfig>,
    /// DICOMweb archive for study/segmentation lookups. `None` selects
    /// the built-in sample data.
    pub pacs: Option<DicomWebConfig>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            artifact_dir: PathBuf::from("./data/artifacts"),
            worker_count: 4,
            poll_interval: Duration::from_millis(1000),
            soft_time_limit: Duration::from_secs(1500),
            hard_time_limit: Duration::from_secs(1800),
            force_synthetic: false,
            persist_transient_fields: true,
            retry_max_attempts: 3,
            retry_backoff_max: Duration::from_secs(120),
            dicomweb: None,
            pacs: None,
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                              | Default              |
    /// |--------------------------------------|----------------------|
    /// | `RADIARCH_DATABASE_URL`              | unset (memory store) |
    /// | `RADIARCH_ARTIFACT_DIR`              | `./data/artifacts`   |
    /// | `RADIARCH_WORKER_COUNT`              | `4`                  |
    /// | `RADIARCH_POLL_INTERVAL_MS`          | `1000`               |
    /// | `RADIARCH_SOFT_TIME_LIMIT_SECS`      | `1500`               |
    /// | `RADIARCH_HARD_TIME_LIMIT_SECS`      | `1800`               |
    /// | `RADIARCH_FORCE_SYNTHETIC`           | `false`              |
    /// | `RADIARCH_PERSIST_TRANSIENT_FIELDS`  | `true`               |
    /// | `RADIARCH_RETRY_MAX_ATTEMPTS`        | `3`                  |
    /// | `RADIARCH_RETRY_BACKOFF_MAX_SECS`    | `120`                |
    /// | `RADIARCH_DICOMWEB_URL`              | unset (no push)      |
    /// | `RADIARCH_DICOMWEB_USERNAME`         | unset                |
    /// | `RADIARCH_DICOMWEB_PASSWORD`         | unset                |
    /// | `RADIARCH_PACS_URL`                  | unset (sample data)  |
    /// | `RADIARCH_PACS_USERNAME`             | unset                |
    /// | `RADIARCH_PACS_PASSWORD`             | unset                |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);
        let defaults = Self::default();

        let config = Self {
            database_url: env.string("RADIARCH_DATABASE_URL"),
            artifact_dir: env
                .string("RADIARCH_ARTIFACT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.artifact_dir),
            worker_count: env
                .parse("RADIARCH_WORKER_COUNT", "a positive integer")?
                .unwrap_or(defaults.worker_count),
            poll_interval: env
                .parse("RADIARCH_POLL_INTERVAL_MS", "a positive integer")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            soft_time_limit: env
                .parse("RADIARCH_SOFT_TIME_LIMIT_SECS", "a positive integer")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.soft_time_limit),
            hard_time_limit: env
                .parse("RADIARCH_HARD_TIME_LIMIT_SECS", "a positive integer")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.hard_time_limit),
            force_synthetic: env
                .flag("RADIARCH_FORCE_SYNTHETIC")?
                .unwrap_or(defaults.force_synthetic),
            persist_transient_fields: env
                .flag("RADIARCH_PERSIST_TRANSIENT_FIELDS")?
                .unwrap_or(defaults.persist_transient_fields),
            retry_max_attempts: env
                .parse("RADIARCH_RETRY_MAX_ATTEMPTS", "a positive integer")?
                .unwrap_or(defaults.retry_max_attempts),
            retry_backoff_max: env
                .parse("RADIARCH_RETRY_BACKOFF_MAX_SECS", "a positive integer")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry_backoff_max),
            dicomweb: env.dicomweb("RADIARCH_DICOMWEB"),
            pacs: env.dicomweb("RADIARCH_PACS"),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive: [(&'static str, bool, String); 4] = [
            (
                "RADIARCH_WORKER_COUNT",
                self.worker_count > 0,
                self.worker_count.to_string(),
            ),
            (
                "RADIARCH_POLL_INTERVAL_MS",
                !self.poll_interval.is_zero(),
                self.poll_interval.as_millis().to_string(),
            ),
            (
                "RADIARCH_SOFT_TIME_LIMIT_SECS",
                !self.soft_time_limit.is_zero(),
                self.soft_time_limit.as_secs().to_string(),
            ),
            (
                "RADIARCH_RETRY_MAX_ATTEMPTS",
                self.retry_max_attempts > 0,
                self.retry_max_attempts.to_string(),
            ),
        ];
        for (name, ok, value) in positive {
            if !ok {
                return Err(ConfigError::Invalid {
                    name,
                    value,
                    expected: "a positive integer",
                });
            }
        }
        if self.hard_time_limit < self.soft_time_limit {
            return Err(ConfigError::Invalid {
                name: "RADIARCH_HARD_TIME_LIMIT_SECS",
                value: self.hard_time_limit.as_secs().to_string(),
                expected: "at least the soft time limit",
            });
        }
        Ok(())
    }
}

/// Typed access to a variable lookup. Empty values count as unset.
struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: std::str::FromStr>(
        &self,
        name: &'static str,
        expected: &'static str,
    ) -> Result<Option<T>, ConfigError> {
        self.string(name)
            .map(|value| {
                value.parse().map_err(|_| ConfigError::Invalid {
                    name,
                    value,
                    expected,
                })
            })
            .transpose()
    }

    fn flag(&self, name: &'static str) -> Result<Option<bool>, ConfigError> {
        self.string(name)
            .map(|value| match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::Invalid {
                    name,
                    value,
                    expected: "a boolean",
                }),
            })
            .transpose()
    }

    /// `<PREFIX>_URL` plus optional `_USERNAME` / `_PASSWORD`.
    fn dicomweb(&self, prefix: &str) -> Option<DicomWebConfig> {
        let url = self.string(&format!("{prefix}_URL"))?;
        Some(DicomWebConfig::new(&url).with_credentials(
            self.string(&format!("{prefix}_USERNAME")),
            self.string(&format!("{prefix}_PASSWORD")),
        ))
    }
}
