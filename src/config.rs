use crate::error::ConfigError;
use crate::producer::Producer;
use crate::settle::SettlePolicy;
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_DATA_FILE: &str = "project_data_new.csv";
pub const DEFAULT_PRODUCER: &str = "backend/smart_auto.py";
pub const DEFAULT_PRODUCER_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(2);
pub const DEFAULT_SETTLE_POLL: Duration = Duration::from_millis(250);

/// Producer location and launch settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProducerConfig {
    pub program: PathBuf,
    pub interpreter: Option<String>,
    pub timeout: Duration,
}

impl ProducerConfig {
    pub fn build(&self) -> Producer {
        Producer::new(&self.program, self.interpreter.clone(), self.timeout)
    }
}

/// Runtime settings for the dashboard server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub bind: SocketAddr,
    pub data_file: PathBuf,
    pub producer: Option<ProducerConfig>,
    pub settle: SettlePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            data_file: PathBuf::from(DEFAULT_DATA_FILE),
            producer: Some(ProducerConfig {
                program: PathBuf::from(DEFAULT_PRODUCER),
                interpreter: infer_interpreter(Path::new(DEFAULT_PRODUCER)),
                timeout: DEFAULT_PRODUCER_TIMEOUT,
            }),
            settle: SettlePolicy::Poll {
                interval: DEFAULT_SETTLE_POLL,
                timeout: DEFAULT_SETTLE,
            },
        }
    }
}

/// Interpreter implied by a script's extension, if any.
pub fn infer_interpreter(program: &Path) -> Option<String> {
    match program.extension().and_then(|e| e.to_str()) {
        Some("py") => Some("python".to_string()),
        Some("sh") => Some("sh".to_string()),
        _ => None,
    }
}

fn parse_var<T: FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
        name,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

impl Config {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read settings through `lookup`, falling back to defaults for unset
    /// variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match lookup("PORT") {
            Some(raw) => parse_var::<u16>("PORT", &raw)?,
            None => DEFAULT_PORT,
        };
        let host = match lookup("DASHBOARD_HOST") {
            Some(raw) => parse_var::<IpAddr>("DASHBOARD_HOST", &raw)?,
            None => IpAddr::from([0, 0, 0, 0]),
        };
        let data_file = lookup("DASHBOARD_DATA_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_FILE));

        let timeout = match lookup("DASHBOARD_PRODUCER_TIMEOUT_MS") {
            Some(raw) => Duration::from_millis(parse_var("DASHBOARD_PRODUCER_TIMEOUT_MS", &raw)?),
            None => DEFAULT_PRODUCER_TIMEOUT,
        };
        let program = lookup("DASHBOARD_PRODUCER").unwrap_or_else(|| DEFAULT_PRODUCER.to_string());
        let producer = if program.trim().is_empty() {
            None
        } else {
            let program = PathBuf::from(program);
            let interpreter = match lookup("DASHBOARD_PRODUCER_INTERPRETER") {
                Some(raw) if raw.trim().is_empty() => None,
                Some(raw) => Some(raw.trim().to_string()),
                None => infer_interpreter(&program),
            };
            Some(ProducerConfig {
                program,
                interpreter,
                timeout,
            })
        };

        let settle_window = match lookup("DASHBOARD_SETTLE_MS") {
            Some(raw) => Duration::from_millis(parse_var("DASHBOARD_SETTLE_MS", &raw)?),
            None => DEFAULT_SETTLE,
        };
        let poll_interval = match lookup("DASHBOARD_SETTLE_POLL_MS") {
            Some(raw) => Duration::from_millis(parse_var("DASHBOARD_SETTLE_POLL_MS", &raw)?),
            None => DEFAULT_SETTLE_POLL,
        };
        let settle = match lookup("DASHBOARD_SETTLE_MODE").as_deref().map(str::trim) {
            None | Some("") | Some("poll") => SettlePolicy::Poll {
                interval: poll_interval,
                timeout: settle_window,
            },
            Some("fixed") => SettlePolicy::Fixed(settle_window),
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "DASHBOARD_SETTLE_MODE",
                    value: other.to_string(),
                    reason: "expected 'poll' or 'fixed'".to_string(),
                });
            }
        };

        Ok(Config {
            bind: SocketAddr::new(host, port),
            data_file,
            producer,
            settle,
        })
    }
}
