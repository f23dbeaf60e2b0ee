//! Server configuration, read once from `INNCONTROL_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    /// Directory holding `inncontrol.wal`.
    pub data_dir: PathBuf,
    /// Shared cleartext password for every pgwire login.
    pub password: String,
    pub max_connections: usize,
    /// WAL appends since the last compaction that trigger a new one.
    pub compact_threshold: u64,
    /// How long a mutation waits for a room lock before giving up.
    pub lock_timeout: Duration,
    /// Period of the day-rollover reconciliation sweep.
    pub reconcile_interval: Duration,
    pub metrics_port: Option<u16>,
    /// Certificate and key for pgwire TLS. Plaintext when unset.
    pub tls: Option<TlsPaths>,
}

/// PEM files for the TLS acceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5433,
            data_dir: PathBuf::from("./data"),
            password: "inncontrol".into(),
            max_connections: 256,
            compact_threshold: 1000,
            lock_timeout: Duration::from_millis(5000),
            reconcile_interval: Duration::from_secs(60),
            metrics_port: None,
            tls: None,
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, BoxError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`. Unset variables take their
    /// defaults; set but malformed ones are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, BoxError> {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let config = Self {
            bind: var("INNCONTROL_BIND").unwrap_or(defaults.bind),
            port: parse(&var, "INNCONTROL_PORT")?.unwrap_or(defaults.port),
            data_dir: var("INNCONTROL_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            password: var("INNCONTROL_PASSWORD").unwrap_or(defaults.password),
            max_connections: parse(&var, "INNCONTROL_MAX_CONNECTIONS")?
                .unwrap_or(defaults.max_connections),
            compact_threshold: parse(&var, "INNCONTROL_COMPACT_THRESHOLD")?
                .unwrap_or(defaults.compact_threshold),
            lock_timeout: parse(&var, "INNCONTROL_LOCK_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_timeout),
            reconcile_interval: parse(&var, "INNCONTROL_RECONCILE_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.reconcile_interval),
            metrics_port: parse(&var, "INNCONTROL_METRICS_PORT")?,
            tls: match (var("INNCONTROL_TLS_CERT"), var("INNCONTROL_TLS_KEY")) {
                (None, None) => None,
                (Some(cert), Some(key)) => Some(TlsPaths {
                    cert: cert.into(),
                    key: key.into(),
                }),
                _ => {
                    return Err(
                        "INNCONTROL_TLS_CERT and INNCONTROL_TLS_KEY must be set together".into(),
                    );
                }
            },
        };

        if config.max_connections == 0 {
            return Err("INNCONTROL_MAX_CONNECTIONS must be at least 1".into());
        }
        if config.reconcile_interval.is_zero() {
            return Err("INNCONTROL_RECONCILE_INTERVAL_SECS must be at least 1".into());
        }
        Ok(config)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("inncontrol.wal")
    }
}

fn parse<T>(var: impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>, BoxError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    var(name)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| -> BoxError { format!("{name}={raw:?}: {e}").into() })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config, BoxError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config.listen_addr(), "0.0.0.0:5433");
        assert_eq!(config.wal_path(), PathBuf::from("./data/inncontrol.wal"));
        assert_eq!(config.password, "inncontrol");
        assert_eq!(config.max_connections, 256);
        assert_eq!(config.lock_timeout, Duration::from_secs(5));
        assert_eq!(config.reconcile_interval, Duration::from_secs(60));
        assert!(config.metrics_port.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = from_pairs(&[
            ("INNCONTROL_PORT", "6543"),
            ("INNCONTROL_DATA_DIR", "/var/lib/inncontrol"),
            ("INNCONTROL_LOCK_TIMEOUT_MS", "250"),
            ("INNCONTROL_RECONCILE_INTERVAL_SECS", "5"),
            ("INNCONTROL_METRICS_PORT", "9100"),
            ("INNCONTROL_COMPACT_THRESHOLD", " 42 "),
        ])
        .unwrap();
        assert_eq!(config.port, 6543);
        assert_eq!(
            config.wal_path(),
            PathBuf::from("/var/lib/inncontrol/inncontrol.wal")
        );
        assert_eq!(config.lock_timeout, Duration::from_millis(250));
        assert_eq!(config.reconcile_interval, Duration::from_secs(5));
        assert_eq!(config.metrics_port, Some(9100));
        assert_eq!(config.compact_threshold, 42);
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = from_pairs(&[("INNCONTROL_PORT", "seventy")]).unwrap_err();
        assert!(err.to_string().contains("INNCONTROL_PORT"));
        assert!(from_pairs(&[("INNCONTROL_MAX_CONNECTIONS", "0")]).is_err());
        assert!(from_pairs(&[("INNCONTROL_RECONCILE_INTERVAL_SECS", "0")]).is_err());
    }

    #[test]
    fn empty_values_fall_back_to_defaults() {
        let config = from_pairs(&[("INNCONTROL_BIND", ""), ("INNCONTROL_TLS_CERT", " ")]).unwrap();
        assert_eq!(config.bind, "0.0.0.0");
        assert!(config.tls.is_none());
    }

    #[test]
    fn tls_needs_cert_and_key() {
        let err = from_pairs(&[("INNCONTROL_TLS_CERT", "/etc/inncontrol/cert.pem")]).unwrap_err();
        assert!(err.to_string().contains("INNCONTROL_TLS_KEY"));

        let config = from_pairs(&[
            ("INNCONTROL_TLS_CERT", "/etc/inncontrol/cert.pem"),
            ("INNCONTROL_TLS_KEY", "/etc/inncontrol/key.pem"),
        ])
        .unwrap();
        assert_eq!(
            config.tls,
            Some(TlsPaths {
                cert: PathBuf::from("/etc/inncontrol/cert.pem"),
                key: PathBuf::from("/etc/inncontrol/key.pem"),
            })
        );
    }
}
