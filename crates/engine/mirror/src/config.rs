use std::{env, path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;

/// Errors raised while reading or validating configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
    #[error("{0}")]
    OutOfRange(&'static str),
}

/// Runtime configuration for the mirror.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorConfig {
    /// Catalog service base URL (e.g. `http://127.0.0.1:8000`).
    pub catalog_url: String,
    /// Scene whose models are mirrored.
    pub scene_id: String,
    /// Address the command ingress listener binds to.
    pub bind_address: String,
    /// Distance moved per movement command.
    pub move_speed: f32,
    pub tick_hz: u32,
    /// Capacity of the push-back queue.
    pub push_queue: usize,
    /// Threads answering immediate commands.
    pub workers: usize,
    /// Per-request timeout for catalog calls. `None` waits forever.
    pub request_timeout: Option<Duration>,
    /// Where downloads are staged. `None` uses the system temp dir.
    pub download_dir: Option<PathBuf>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            catalog_url: "http://127.0.0.1:8000".into(),
            scene_id: "fbb72e89-0f35-4418-aa62-d5a99550732a".into(),
            bind_address: "127.0.0.1:53148".into(),
            move_speed: 0.5,
            tick_hz: 30,
            push_queue: 64,
            workers: 4,
            request_timeout: None,
            download_dir: None,
        }
    }
}

impl MirrorConfig {
    /// Builds a configuration from `MIRROR_*` environment variables, falling
    /// back to the defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            catalog_url: lookup("MIRROR_CATALOG_URL").unwrap_or(defaults.catalog_url),
            scene_id: lookup("MIRROR_SCENE_ID").unwrap_or(defaults.scene_id),
            bind_address: lookup("MIRROR_BIND").unwrap_or(defaults.bind_address),
            move_speed: parse_var(&lookup, "MIRROR_MOVE_SPEED")?.unwrap_or(defaults.move_speed),
            tick_hz: parse_var(&lookup, "MIRROR_TICK_HZ")?.unwrap_or(defaults.tick_hz),
            push_queue: parse_var(&lookup, "MIRROR_PUSH_QUEUE")?.unwrap_or(defaults.push_queue),
            workers: parse_var(&lookup, "MIRROR_WORKERS")?.unwrap_or(defaults.workers),
            request_timeout: parse_var::<f64>(&lookup, "MIRROR_REQUEST_TIMEOUT_SECS")?
                .map(timeout_from_secs)
                .transpose()?,
            download_dir: lookup("MIRROR_DOWNLOAD_DIR")
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_hz < 1 {
            return Err(ConfigError::OutOfRange("tick rate must be >= 1"));
        }
        if self.push_queue < 1 {
            return Err(ConfigError::OutOfRange("push queue must be >= 1"));
        }
        if self.workers < 1 {
            return Err(ConfigError::OutOfRange("workers must be >= 1"));
        }
        if !self.move_speed.is_finite() {
            return Err(ConfigError::OutOfRange("move speed must be finite"));
        }
        if self
            .request_timeout
            .is_some_and(|timeout| timeout.is_zero())
        {
            return Err(ConfigError::OutOfRange("request timeout must be > 0"));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.tick_hz.max(1)
    }
}

/// Converts a timeout given in seconds, rejecting values `Duration` cannot hold.
pub fn timeout_from_secs(secs: f64) -> Result<Duration, ConfigError> {
    const OUT_OF_RANGE: ConfigError =
        ConfigError::OutOfRange("request timeout must be a positive number of seconds");

    if secs.is_nan() || secs <= 0.0 {
        return Err(OUT_OF_RANGE);
    }
    Duration::try_from_secs_f64(secs).map_err(|_| OUT_OF_RANGE)
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
