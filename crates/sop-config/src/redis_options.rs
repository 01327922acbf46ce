//! Redis connection options.
//!
//! Accepts either a single `redis://` / `rediss://` URL or the comma separated
//! form `host1:6379,host2:6380,password=secret,defaultDatabase=2,allowAdmin=true`.

use sop_core::SopError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Port used when an endpoint omits one.
pub const DEFAULT_REDIS_PORT: u16 = 6379;

/// Connect timeout used when the options do not set one.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A single `host:port` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Creates an endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = SopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SopError::Configuration("empty Redis endpoint".to_string()));
        }

        // [ipv6]:port or [ipv6]
        if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(|| {
                SopError::Configuration(format!("unterminated IPv6 endpoint '{}'", s))
            })?;
            let port = match tail.strip_prefix(':') {
                Some(port) => parse_port(port, s)?,
                None if tail.is_empty() => DEFAULT_REDIS_PORT,
                None => {
                    return Err(SopError::Configuration(format!("invalid Redis endpoint '{}'", s)))
                }
            };
            return Ok(Self::new(host, port));
        }

        match s.rsplit_once(':') {
            Some((host, port)) => Ok(Self::new(host, parse_port(port, s)?)),
            None => Ok(Self::new(s, DEFAULT_REDIS_PORT)),
        }
    }
}

fn parse_port(port: &str, endpoint: &str) -> Result<u16, SopError> {
    port.parse::<u16>()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| SopError::Configuration(format!("invalid port in Redis endpoint '{}'", endpoint)))
}

/// Parsed connection options for the key-value store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisOptions {
    /// Known endpoints. Data commands go to the first one.
    pub endpoints: Vec<Endpoint>,
    /// ACL user name.
    pub username: Option<String>,
    /// Password.
    pub password: Option<String>,
    /// Logical database index.
    pub database: i64,
    /// Permit administrative commands such as `FLUSHDB`.
    pub allow_admin: bool,
    /// Use TLS.
    pub ssl: bool,
    /// Connect timeout.
    pub connect_timeout: Duration,
}

impl Default for RedisOptions {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            username: None,
            password: None,
            database: 0,
            allow_admin: false,
            ssl: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl RedisOptions {
    /// Parses an options string.
    ///
    /// # Errors
    ///
    /// `SopError::ConfigurationMissing` for an empty string and
    /// `SopError::Configuration` for malformed input.
    pub fn parse(input: &str) -> Result<Self, SopError> {
        input.parse()
    }

    fn parse_url(input: &str) -> Result<Self, SopError> {
        let url = Url::parse(input)
            .map_err(|e| SopError::Configuration(format!("invalid Redis URL: {}", e)))?;

        let host = url
            .host_str()
            .ok_or_else(|| SopError::Configuration("Redis URL has no host".to_string()))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();

        let mut options = Self {
            endpoints: vec![Endpoint::new(host, url.port().unwrap_or(DEFAULT_REDIS_PORT))],
            ssl: url.scheme() == "rediss",
            ..Self::default()
        };

        if !url.username().is_empty() {
            options.username = Some(url.username().to_string());
        }
        options.password = url.password().map(ToString::to_string);

        let path = url.path().trim_start_matches('/');
        if !path.is_empty() {
            options.database = path
                .parse()
                .map_err(|_| SopError::Configuration(format!("invalid database index '{}'", path)))?;
        }

        for (key, value) in url.query_pairs() {
            options.apply(&key, &value)?;
        }

        Ok(options)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), SopError> {
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "password" => self.password = Some(value.to_string()),
            "user" | "username" => self.username = Some(value.to_string()),
            "defaultdatabase" | "db" => {
                self.database = value.parse().map_err(|_| {
                    SopError::Configuration(format!("invalid database index '{}'", value))
                })?;
            }
            "allowadmin" => self.allow_admin = parse_bool(key, value)?,
            "ssl" => self.ssl = parse_bool(key, value)?,
            "connecttimeout" => {
                let millis: u64 = value.parse().map_err(|_| {
                    SopError::Configuration(format!("invalid connectTimeout '{}'", value))
                })?;
                self.connect_timeout = Duration::from_millis(millis);
            }
            other => {
                return Err(SopError::Configuration(format!(
                    "unknown Redis connection option '{}'",
                    other
                )))
            }
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, SopError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(SopError::Configuration(format!(
            "option '{}' expects a boolean, got '{}'",
            key, value
        ))),
    }
}

impl FromStr for RedisOptions {
    type Err = SopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SopError::ConfigurationMissing);
        }

        if s.starts_with("redis://") || s.starts_with("rediss://") {
            return Self::parse_url(s);
        }

        let mut options = Self::default();
        for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match token.split_once('=') {
                Some((key, value)) => options.apply(key, value)?,
                None => options.endpoints.push(token.parse()?),
            }
        }

        if options.endpoints.is_empty() {
            return Err(SopError::Configuration(
                "Redis connection options name no endpoints".to_string(),
            ));
        }

        Ok(options)
    }
}
