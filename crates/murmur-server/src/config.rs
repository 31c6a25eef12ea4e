use std::path::PathBuf;

use thiserror::Error;

/// Secrets that ship in docs and sample env files. Refusing them keeps a
/// forgotten default from signing real tokens.
const PLACEHOLDER_SECRETS: &[&str] = &["dev-secret-change-me", "changeme", "secret", ""];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("MURMUR_JWT_SECRET is not set")]
    MissingSecret,
    #[error("MURMUR_JWT_SECRET is a placeholder value; set a real secret")]
    PlaceholderSecret,
    #[error("invalid {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
}

impl ServerConfig {
    /// Read `MURMUR_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same rules as `from_env`, with an injectable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("MURMUR_JWT_SECRET").ok_or(ConfigError::MissingSecret)?;
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.trim()) {
            return Err(ConfigError::PlaceholderSecret);
        }

        let host = lookup("MURMUR_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = match lookup("MURMUR_PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: "MURMUR_PORT",
                value: raw,
            })?,
            None => 3000,
        };
        let db_path = PathBuf::from(lookup("MURMUR_DB_PATH").unwrap_or_else(|| "murmur.db".into()));

        Ok(Self {
            host,
            port,
            db_path,
            jwt_secret,
        })
    }

    /// Host and port for `TcpListener::bind`. The host may be a name such
    /// as `localhost`; it is resolved at bind time.
    pub fn bind_target(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }

    pub fn in_memory_db(&self) -> bool {
        self.db_path.as_os_str() == ":memory:"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let cfg = config(&[("MURMUR_JWT_SECRET", "a-real-secret")]).unwrap();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.db_path, PathBuf::from("murmur.db"));
        assert_eq!(cfg.bind_target(), ("0.0.0.0", 3000));
        assert!(!cfg.in_memory_db());
    }

    #[test]
    fn secret_is_required_and_placeholders_are_refused() {
        assert!(matches!(config(&[]), Err(ConfigError::MissingSecret)));
        assert!(matches!(
            config(&[("MURMUR_JWT_SECRET", "dev-secret-change-me")]),
            Err(ConfigError::PlaceholderSecret)
        ));
        assert!(matches!(
            config(&[("MURMUR_JWT_SECRET", "  ")]),
            Err(ConfigError::PlaceholderSecret)
        ));
    }

    #[test]
    fn bad_port_is_reported() {
        let err = config(&[("MURMUR_JWT_SECRET", "s"), ("MURMUR_PORT", "http")]);
        assert!(matches!(err, Err(ConfigError::Invalid { name: "MURMUR_PORT", .. })));
    }

    #[test]
    fn overrides_are_read() {
        let cfg = config(&[
            ("MURMUR_JWT_SECRET", "s3"),
            ("MURMUR_HOST", "127.0.0.1"),
            ("MURMUR_PORT", "8080"),
            ("MURMUR_DB_PATH", ":memory:"),
        ])
        .unwrap();
        assert_eq!(cfg.bind_target(), ("127.0.0.1", 8080));
        assert!(cfg.in_memory_db());
    }

    #[tokio::test]
    async fn hostname_binds() {
        let cfg = config(&[
            ("MURMUR_JWT_SECRET", "s3"),
            ("MURMUR_HOST", "localhost"),
            ("MURMUR_PORT", "0"),
        ])
        .unwrap();
        let listener = tokio::net::TcpListener::bind(cfg.bind_target()).await.unwrap();
        assert!(listener.local_addr().unwrap().ip().is_loopback());
    }
}
