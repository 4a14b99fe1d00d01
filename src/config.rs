use std::{env, path::PathBuf};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DATA_PATH: &str = "data/transactions.json";

/// Settings for the hosted database, auth and realtime service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub url: String,
    pub anon_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminCredentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub data_path: PathBuf,
    pub remote: Option<RemoteConfig>,
    pub local_admin: Option<AdminCredentials>,
}

impl Config {
    /// Where the hosted session is kept between runs, next to the data file.
    pub fn session_path(&self) -> PathBuf {
        self.data_path.with_extension("session.json")
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup. Blank values count as unset, and
    /// the remote service is only configured when both URL and key are given.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let port = get("PORT")
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);
        let data_path = get("APP_DATA_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_PATH));

        let remote = match (get("FINANCE_REMOTE_URL"), get("FINANCE_REMOTE_KEY")) {
            (Some(url), Some(anon_key)) => Some(RemoteConfig {
                url: url.trim_end_matches('/').to_string(),
                anon_key,
            }),
            _ => None,
        };

        let local_admin = match (get("FINANCE_ADMIN_EMAIL"), get("FINANCE_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminCredentials { email, password }),
            _ => None,
        };

        Self {
            port,
            data_path,
            remote,
            local_admin,
        }
    }
}
