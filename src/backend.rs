use crate::auth::{IdentityProvider, LocalIdentity, RemoteIdentity};
use crate::config::Config;
use crate::errors::BackendError;
use crate::models::BackendMode;
use crate::remote::{RemoteClient, RemoteStore};
use crate::storage::{LocalStore, TransactionStore};
use std::sync::Arc;
use tracing::{info, warn};

/// Persistence and identity chosen for the lifetime of the process.
pub struct Backend {
    pub mode: BackendMode,
    pub store: Arc<dyn TransactionStore>,
    pub identity: Arc<dyn IdentityProvider>,
    /// Present only in remote mode; used to open the realtime channel.
    pub remote: Option<Arc<RemoteClient>>,
}

impl Backend {
    pub fn local(config: &Config) -> Self {
        Self {
            mode: BackendMode::Local,
            store: Arc::new(LocalStore::new(config.data_path.clone())),
            identity: Arc::new(LocalIdentity::new(config.local_admin.clone())),
            remote: None,
        }
    }

    pub fn remote(client: Arc<RemoteClient>) -> Self {
        Self {
            mode: BackendMode::Remote,
            store: Arc::new(RemoteStore::new(Arc::clone(&client))),
            identity: Arc::new(RemoteIdentity::new(Arc::clone(&client))),
            remote: Some(client),
        }
    }
}

fn connect_remote(config: &Config) -> Result<Arc<RemoteClient>, BackendError> {
    let remote = config
        .remote
        .as_ref()
        .ok_or(BackendError::ConfigurationAbsent)?;
    let client = RemoteClient::new(remote)?.with_session_file(config.session_path());
    Ok(Arc::new(client))
}

/// Remote when configured and constructible, local otherwise. Never fails.
pub fn select_backend(config: &Config) -> Backend {
    match connect_remote(config) {
        Ok(client) => {
            info!(url = client.base_url(), "remote backend enabled");
            Backend::remote(client)
        }
        Err(BackendError::ConfigurationAbsent) => {
            info!(path = %config.data_path.display(), "using local storage");
            Backend::local(config)
        }
        Err(err) => {
            warn!("{err}, falling back to local storage");
            Backend::local(config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteConfig;

    fn config(remote: Option<RemoteConfig>) -> Config {
        Config {
            port: 0,
            data_path: "data/test.json".into(),
            remote,
            local_admin: None,
        }
    }

    #[test]
    fn absent_configuration_selects_local() {
        let backend = select_backend(&config(None));
        assert_eq!(backend.mode, BackendMode::Local);
        assert!(backend.remote.is_none());
    }

    #[test]
    fn construction_failure_falls_back_to_local() {
        let backend = select_backend(&config(Some(RemoteConfig {
            url: "::not-a-url::".into(),
            anon_key: "key".into(),
        })));
        assert_eq!(backend.mode, BackendMode::Local);
    }

    #[test]
    fn valid_configuration_selects_remote() {
        let backend = select_backend(&config(Some(RemoteConfig {
            url: "https://xyz.supabase.co".into(),
            anon_key: "key".into(),
        })));
        assert_eq!(backend.mode, BackendMode::Remote);
        assert!(backend.remote.is_some());
    }
}
