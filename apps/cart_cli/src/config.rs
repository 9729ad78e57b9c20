use std::{fs, path::Path, time::Duration};

use anyhow::{bail, Context};
use client_core::SubmitPolicy;
use storage::DEFAULT_CART_KEY;
use tracing::warn;
use url::Url;

pub const SETTINGS_FILE: &str = "cart.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_base: String,
    pub database_url: String,
    pub cart_key: String,
    pub token_env: String,
    pub submit_policy: SubmitPolicy,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base: "http://127.0.0.1:8080/api".into(),
            database_url: "sqlite://./data/cart.db".into(),
            cart_key: DEFAULT_CART_KEY.into(),
            token_env: "CART_TOKEN".into(),
            submit_policy: SubmitPolicy::LockDuringSubmit,
            request_timeout_secs: 15,
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then the settings file, then environment variables. Unreadable
/// values are skipped with a warning.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match raw.parse::<toml::Table>() {
            Ok(file_cfg) => {
                let get = |key: &str| file_value(&file_cfg, key);
                if let Some(v) = get("api_base") {
                    settings.api_base = v;
                }
                if let Some(v) = get("database_url") {
                    settings.database_url = v;
                }
                if let Some(v) = get("cart_key") {
                    settings.cart_key = v;
                }
                if let Some(v) = get("token_env") {
                    settings.token_env = v;
                }
                if let Some(v) = get("submit_policy") {
                    apply_policy(&mut settings, &v);
                }
                if let Some(v) = get("request_timeout_secs") {
                    apply_timeout(&mut settings, &v);
                }
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "ignoring unreadable settings file");
            }
        }
    }

    if let Some(v) = env("CART_API_BASE") {
        settings.api_base = v;
    }
    if let Some(v) = env("APP__API_BASE") {
        settings.api_base = v;
    }

    if let Some(v) = env("CART_DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = env("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = env("APP__CART_KEY") {
        settings.cart_key = v;
    }
    if let Some(v) = env("APP__TOKEN_ENV") {
        settings.token_env = v;
    }
    if let Some(v) = env("APP__SUBMIT_POLICY") {
        apply_policy(&mut settings, &v);
    }
    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        apply_timeout(&mut settings, &v);
    }

    settings
}

fn file_value(table: &toml::Table, key: &str) -> Option<String> {
    match table.get(key)? {
        toml::Value::String(value) => Some(value.clone()),
        toml::Value::Integer(value) => Some(value.to_string()),
        other => {
            warn!(key, value = %other, "ignoring non-string setting");
            None
        }
    }
}

fn apply_policy(settings: &mut Settings, raw: &str) {
    match raw.parse::<SubmitPolicy>() {
        Ok(policy) => settings.submit_policy = policy,
        Err(error) => warn!(%error, "ignoring submit policy setting"),
    }
}

fn apply_timeout(settings: &mut Settings, raw: &str) {
    match raw.trim().parse::<u64>() {
        Ok(secs) => settings.request_timeout_secs = secs,
        Err(error) => warn!(value = raw, %error, "ignoring request timeout setting"),
    }
}

/// Checks the API base is an absolute http(s) URL and drops trailing slashes
/// so endpoint paths can be appended directly.
pub fn normalize_api_base(raw_api_base: &str) -> anyhow::Result<String> {
    let raw_api_base = raw_api_base.trim();
    let url = Url::parse(raw_api_base)
        .with_context(|| format!("invalid api base url '{raw_api_base}'"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!(
            "api base url '{raw_api_base}' must use http or https, not '{}'",
            url.scheme()
        );
    }
    Ok(raw_api_base.trim_end_matches('/').to_string())
}

pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
