//! Runtime configuration from environment variables.
//!
//! Missing optional values fall back to development defaults with a warning.

use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

use formadesk_infra::mail::SmtpConfig;

const DEV_JWT_SECRET: &str = "dev-secret";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_LEGAL_DIR: &str = "legal";
const DEFAULT_MAIL_FROM: &str = "Formadesk <no-reply@formadesk.local>";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is set but empty")]
    Empty { name: &'static str },

    #[error("SMTP_USERNAME and SMTP_PASSWORD must be set together")]
    PartialSmtpCredentials,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub jwt_secret: String,
    pub bind_addr: String,
    /// Postgres when set; in-memory stores otherwise.
    pub database_url: Option<String>,
    /// Directory holding `<name>.txt` legal texts.
    pub legal_dir: PathBuf,
    /// SMTP delivery when `SMTP_HOST` is set; log-only mail otherwise.
    pub smtp: Option<SmtpConfig>,
    /// JSON file of profiles registered at startup.
    pub seed_profiles: Option<PathBuf>,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let jwt_secret = match lookup("JWT_SECRET") {
            Some(secret) if secret.trim().is_empty() => {
                return Err(ConfigError::Empty { name: "JWT_SECRET" });
            }
            Some(secret) => secret,
            None => {
                warn!("JWT_SECRET not set; using insecure dev default");
                DEV_JWT_SECRET.to_string()
            }
        };

        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());

        let database_url = non_empty(lookup("DATABASE_URL"));
        if database_url.is_none() {
            warn!("DATABASE_URL not set; using in-memory stores (data is lost on restart)");
        }

        let legal_dir = non_empty(lookup("LEGAL_DIR"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LEGAL_DIR));

        let smtp = match non_empty(lookup("SMTP_HOST")) {
            Some(host) => {
                let username = non_empty(lookup("SMTP_USERNAME"));
                let password = non_empty(lookup("SMTP_PASSWORD"));
                if username.is_some() != password.is_some() {
                    return Err(ConfigError::PartialSmtpCredentials);
                }
                Some(SmtpConfig {
                    host,
                    username,
                    password,
                    from: non_empty(lookup("MAIL_FROM")).unwrap_or_else(|| DEFAULT_MAIL_FROM.to_string()),
                })
            }
            None => None,
        };

        Ok(Self {
            jwt_secret,
            bind_addr,
            database_url,
            legal_dir,
            smtp,
            seed_profiles: non_empty(lookup("SEED_PROFILES")).map(PathBuf::from),
        })
    }

    /// In-memory, log-only configuration (tests and local runs).
    pub fn for_tests(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            bind_addr: "127.0.0.1:0".to_string(),
            database_url: None,
            legal_dir: PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/../../legal")),
            smtp: None,
            seed_profiles: None,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_are_in_memory_and_log_only() {
        let config = ApiConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.jwt_secret, DEV_JWT_SECRET);
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert!(config.database_url.is_none());
        assert!(config.smtp.is_none());
        assert_eq!(config.legal_dir, PathBuf::from("legal"));
    }

    #[test]
    fn smtp_is_enabled_by_host() {
        let config = ApiConfig::from_lookup(lookup(&[
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_USERNAME", "mailer"),
            ("SMTP_PASSWORD", "hunter2"),
            ("MAIL_FROM", "desk@example.com"),
        ]))
        .unwrap();
        let smtp = config.smtp.unwrap();
        assert_eq!(smtp.host, "smtp.example.com");
        assert_eq!(smtp.from, "desk@example.com");
    }

    #[test]
    fn half_credentials_are_refused() {
        let err = ApiConfig::from_lookup(lookup(&[("SMTP_HOST", "smtp.example.com"), ("SMTP_USERNAME", "mailer")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::PartialSmtpCredentials);
    }

    #[test]
    fn empty_secret_is_refused() {
        let err = ApiConfig::from_lookup(lookup(&[("JWT_SECRET", "  ")])).unwrap_err();
        assert_eq!(err, ConfigError::Empty { name: "JWT_SECRET" });
    }

    #[test]
    fn blank_database_url_means_in_memory() {
        let config = ApiConfig::from_lookup(lookup(&[("DATABASE_URL", "")])).unwrap();
        assert!(config.database_url.is_none());
    }
}
