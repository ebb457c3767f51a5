use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_STREAM_URL: &str = "https://adsb.chrisnyc.net/KJFK";
pub const DEFAULT_OUT_PATH: &str = "/opt/globe/html/data/aircraft.json";
pub const DEFAULT_USER_AGENT: &str = "tar1090-adapter/1.0";

/// Upper bound for every seconds-valued key (one day).
pub const MAX_SECONDS: f64 = 86_400.0;

/// When the snapshot cadence check runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WriteCadence {
    /// Once per line received from the feed. A silent feed writes nothing.
    Line,
    /// Per line and on a timer, so snapshots keep flowing while the feed is idle.
    Timer,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub stream_url: String,
    pub out_path: PathBuf,
    /// Minimum seconds between snapshot writes (fractional)
    pub write_every_s: f64,
    /// Retention window in whole seconds
    pub buffer_sec: i64,
    pub reconnect_delay: Duration,
    /// Connect timeout and per-read timeout on the feed
    pub request_timeout: Duration,
    pub user_agent: String,
    pub write_cadence: WriteCadence,
    pub rust_log: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            stream_url: DEFAULT_STREAM_URL.to_string(),
            out_path: PathBuf::from(DEFAULT_OUT_PATH),
            write_every_s: 1.0,
            buffer_sec: 15,
            reconnect_delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            write_cadence: WriteCadence::Line,
            rust_log: "info".to_string(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from environment variables
    ///
    /// Every key is optional. A key that is present but malformed is an error,
    /// so a typo fails at startup instead of silently falling back.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`RelayConfig::from_env`] but reads keys through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let stream_url = lookup("STREAM_URL").unwrap_or(defaults.stream_url);
        if !stream_url.starts_with("http://") && !stream_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "STREAM_URL must start with http:// or https://".to_string(),
            ));
        }

        let out_path = lookup("OUT_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.out_path);
        if out_path.file_name().is_none() {
            return Err(ConfigError::InvalidValue(format!(
                "OUT_PATH must name a file, got '{}'",
                out_path.display()
            )));
        }

        let write_every_s = match lookup("WRITE_EVERY_S") {
            Some(raw) => parse_seconds("WRITE_EVERY_S", &raw)?.as_secs_f64(),
            None => defaults.write_every_s,
        };

        let buffer_sec = match lookup("BUFFER_SEC") {
            Some(raw) => {
                let value = raw.trim().parse::<i64>().map_err(|_| {
                    ConfigError::InvalidValue(format!("BUFFER_SEC must be an integer, got '{}'", raw))
                })?;
                if value < 0 {
                    return Err(ConfigError::InvalidValue(format!(
                        "BUFFER_SEC must not be negative, got {}",
                        value
                    )));
                }
                value
            }
            None => defaults.buffer_sec,
        };

        let reconnect_delay = match lookup("RECONNECT_DELAY_S") {
            Some(raw) => parse_seconds("RECONNECT_DELAY_S", &raw)?,
            None => defaults.reconnect_delay,
        };

        let request_timeout = match lookup("REQUEST_TIMEOUT_S") {
            Some(raw) => {
                let timeout = parse_seconds("REQUEST_TIMEOUT_S", &raw)?;
                if timeout.is_zero() {
                    return Err(ConfigError::InvalidValue(
                        "REQUEST_TIMEOUT_S must be greater than zero".to_string(),
                    ));
                }
                timeout
            }
            None => defaults.request_timeout,
        };

        let user_agent = lookup("USER_AGENT").unwrap_or(defaults.user_agent);

        let write_cadence = match lookup("WRITE_CADENCE") {
            Some(raw) => match raw.trim().to_lowercase().as_str() {
                "line" => WriteCadence::Line,
                "timer" => WriteCadence::Timer,
                _ => {
                    return Err(ConfigError::InvalidValue(format!(
                        "WRITE_CADENCE must be 'line' or 'timer', got '{}'",
                        raw
                    )))
                }
            },
            None => defaults.write_cadence,
        };

        let rust_log = lookup("RUST_LOG").unwrap_or(defaults.rust_log);

        Ok(Self {
            stream_url,
            out_path,
            write_every_s,
            buffer_sec,
            reconnect_delay,
            request_timeout,
            user_agent,
            write_cadence,
            rust_log,
        })
    }
}

fn parse_seconds(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    let value = raw.trim().parse::<f64>().map_err(|_| {
        ConfigError::InvalidValue(format!("{} must be a number of seconds, got '{}'", key, raw))
    })?;

    if !(0.0..=MAX_SECONDS).contains(&value) {
        return Err(ConfigError::InvalidValue(format!(
            "{} must be between 0 and {} seconds, got '{}'",
            key, MAX_SECONDS, raw
        )));
    }

    Duration::try_from_secs_f64(value).map_err(|e| {
        ConfigError::InvalidValue(format!("{} is not a valid duration ('{}'): {}", key, raw, e))
    })
}
