use std::{env, fmt::Display, fs::read_to_string, path::PathBuf, str::FromStr};

use anyhow::Context;
use tracing::{debug, info, warn};

pub const DEFAULT_PORT: &str = "8787";
pub const DEFAULT_UPLOAD_DIR: &str = "./uploads";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
    pub public_base_url: Option<String>,
    /// When set, uploads need `Authorization: Bearer <token>`.
    pub upload_token: Option<String>,
    pub upload_dir: PathBuf,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok(), read_secret)
    }

    /// Builds the config from `var` for plain settings, falling back to
    /// `secret` for the token and base URL.
    pub fn from_lookup(
        var: impl Fn(&str) -> Option<String>,
        secret: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let non_empty = |key: &str| {
            var(key)
                .or_else(|| secret(key))
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Ok(Self {
            port: try_load(&var, "BABI_UPLOAD_PORT", DEFAULT_PORT)?,
            allowed_origins: parse_origins(&var("ALLOWED_ORIGINS").unwrap_or_default()),
            public_base_url: non_empty("PUBLIC_BASE_URL"),
            upload_token: non_empty("UPLOAD_TOKEN"),
            upload_dir: var("UPLOAD_DIR")
                .filter(|dir| !dir.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_UPLOAD_DIR.to_string())
                .into(),
        })
    }
}

fn try_load<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: &str,
) -> anyhow::Result<T>
where
    T::Err: Display + Send + Sync + std::error::Error + 'static,
{
    let raw = var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.trim()
        .parse()
        .with_context(|| format!("invalid {key} value: {raw}"))
}

/// Comma-separated list; blanks are dropped.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    match read_to_string(&path) {
        Ok(value) => {
            debug!("loaded {secret_name} from secrets");
            Some(value.trim().to_string())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        Err(err) => {
            warn!("Failed to read {secret_name} from file: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = Config::from_lookup(lookup(&[]), |_| None).expect("config");
        assert_eq!(cfg.port, 8787);
        assert!(cfg.allowed_origins.is_empty());
        assert_eq!(cfg.public_base_url, None);
        assert_eq!(cfg.upload_token, None);
        assert_eq!(cfg.upload_dir, PathBuf::from(DEFAULT_UPLOAD_DIR));
    }

    #[test]
    fn reads_env_and_secrets() {
        let cfg = Config::from_lookup(
            lookup(&[
                ("BABI_UPLOAD_PORT", "9000"),
                ("ALLOWED_ORIGINS", " https://a.example, ,https://b.example "),
                ("PUBLIC_BASE_URL", "https://cdn.example/"),
            ]),
            |name| (name == "UPLOAD_TOKEN").then(|| "s3cret\n".to_string()),
        )
        .expect("config");
        assert_eq!(cfg.port, 9000);
        assert_eq!(
            cfg.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(cfg.public_base_url.as_deref(), Some("https://cdn.example/"));
        assert_eq!(cfg.upload_token.as_deref(), Some("s3cret"));
    }

    #[test]
    fn bad_port_is_an_error() {
        assert!(Config::from_lookup(lookup(&[("BABI_UPLOAD_PORT", "http")]), |_| None).is_err());
    }
}
