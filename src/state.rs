use crate::auth::IdentityProvider;
use crate::backend::Backend;
use crate::models::{BackendMode, SessionResponse, Transaction, TransactionId, User};
use crate::storage::TransactionStore;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::Mutex;
use tracing::{debug, error};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub privileged: bool,
    pub user: Option<User>,
}

impl Session {
    pub fn signed_in(user: User) -> Self {
        Self {
            privileged: true,
            user: Some(user),
        }
    }

    pub fn to_response(&self) -> SessionResponse {
        SessionResponse {
            privileged: self.privileged,
            user: self.user.clone(),
        }
    }
}

/// Cached copy of the backend's list. Replaced wholesale on every reload.
#[derive(Debug, Default)]
pub struct Ledger {
    pub transactions: Vec<Transaction>,
    /// Bumped whenever a reload installs a list that differs from the last.
    pub revision: u64,
    installed_ticket: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub mode: BackendMode,
    pub store: Arc<dyn TransactionStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub ledger: Arc<Mutex<Ledger>>,
    pub session: Arc<Mutex<Session>>,
    reload_tickets: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(backend: &Backend) -> Self {
        Self::from_parts(
            backend.mode,
            Arc::clone(&backend.store),
            Arc::clone(&backend.identity),
        )
    }

    pub fn from_parts(
        mode: BackendMode,
        store: Arc<dyn TransactionStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            mode,
            store,
            identity,
            ledger: Arc::new(Mutex::new(Ledger::default())),
            session: Arc::new(Mutex::new(Session::default())),
            reload_tickets: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Refetches the full list and installs it. Query failures degrade to an
    /// empty list. A fetch that finishes after a later-started one has been
    /// installed is discarded, so concurrent reloads cannot roll the cache
    /// back. Returns the revision in effect afterwards.
    pub async fn reload(&self) -> u64 {
        let ticket = self.reload_tickets.fetch_add(1, Ordering::SeqCst) + 1;
        let transactions = match self.store.load_all().await {
            Ok(list) => list,
            Err(err) => {
                error!("failed to load transactions: {err}");
                Vec::new()
            }
        };

        let mut ledger = self.ledger.lock().await;
        if ticket < ledger.installed_ticket {
            debug!(ticket, installed = ledger.installed_ticket, "discarding stale reload");
            return ledger.revision;
        }
        ledger.installed_ticket = ticket;
        if ledger.transactions != transactions {
            ledger.transactions = transactions;
            ledger.revision += 1;
        }
        ledger.revision
    }

    pub async fn transactions(&self) -> Vec<Transaction> {
        self.ledger.lock().await.transactions.clone()
    }

    pub async fn find(&self, id: &TransactionId) -> Option<Transaction> {
        self.ledger
            .lock()
            .await
            .transactions
            .iter()
            .find(|tx| &tx.id == id)
            .cloned()
    }

    pub async fn session(&self) -> Session {
        self.session.lock().await.clone()
    }

    pub async fn is_privileged(&self) -> bool {
        self.session.lock().await.privileged
    }
}
