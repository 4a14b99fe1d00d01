use crate::errors::StoreError;
use crate::models::{NewTransaction, Transaction, TransactionId, TransactionPatch};
use async_trait::async_trait;
use chrono::Utc;
use std::{
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
};
use tokio::{fs, sync::Mutex};
use tracing::{debug, error};

/// Uniform persistence interface. One implementation is chosen at startup
/// and shared by every request.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// All records, ascending by date.
    async fn load_all(&self) -> Result<Vec<Transaction>, StoreError>;

    async fn insert(&self, record: NewTransaction) -> Result<Transaction, StoreError>;

    async fn update(
        &self,
        id: &TransactionId,
        patch: TransactionPatch,
    ) -> Result<Transaction, StoreError>;

    async fn delete(&self, id: &TransactionId) -> Result<(), StoreError>;
}

/// Stable sort, so records sharing a date keep their stored order.
pub fn sort_ascending(list: &mut [Transaction]) {
    list.sort_by_key(|tx| tx.date);
}

/// Whole-list JSON document on disk. Every write replaces the file.
pub struct LocalStore {
    path: PathBuf,
    write_lock: Mutex<()>,
    last_id: AtomicU64,
}

impl LocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
            last_id: AtomicU64::new(0),
        }
    }

    /// Missing, unreadable or malformed documents all read as an empty list.
    pub async fn load(&self) -> Vec<Transaction> {
        let mut list: Vec<Transaction> = match fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(list) => list,
                Err(err) => {
                    error!(path = %self.path.display(), "failed to parse transactions file: {err}");
                    Vec::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => {
                error!(path = %self.path.display(), "failed to read transactions file: {err}");
                Vec::new()
            }
        };
        sort_ascending(&mut list);
        list
    }

    pub async fn save_all(&self, list: &[Transaction]) -> Result<(), StoreError> {
        let payload =
            serde_json::to_vec_pretty(list).map_err(|err| StoreError::Write(err.to_string()))?;
        fs::write(&self.path, payload)
            .await
            .map_err(|err| StoreError::Write(err.to_string()))?;
        debug!(count = list.len(), "saved transactions");
        Ok(())
    }

    /// Millisecond timestamp token, bumped past the last one issued so two
    /// records created in the same millisecond still differ.
    pub fn generate_id(&self) -> TransactionId {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        let mut last = self.last_id.load(Ordering::SeqCst);
        loop {
            let next = now.max(last + 1);
            match self
                .last_id
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return TransactionId::new(format!("loc_{next}")),
                Err(actual) => last = actual,
            }
        }
    }
}

#[async_trait]
impl TransactionStore for LocalStore {
    async fn load_all(&self) -> Result<Vec<Transaction>, StoreError> {
        Ok(self.load().await)
    }

    async fn insert(&self, record: NewTransaction) -> Result<Transaction, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut list = self.load().await;
        let mut id = self.generate_id();
        while list.iter().any(|tx| tx.id == id) {
            id = self.generate_id();
        }
        let created = record.with_id(id);
        list.push(created.clone());
        self.save_all(&list).await?;
        Ok(created)
    }

    async fn update(
        &self,
        id: &TransactionId,
        patch: TransactionPatch,
    ) -> Result<Transaction, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut list = self.load().await;
        let updated = {
            let entry = list
                .iter_mut()
                .find(|tx| &tx.id == id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            patch.apply(entry);
            entry.clone()
        };
        self.save_all(&list).await?;
        Ok(updated)
    }

    async fn delete(&self, id: &TransactionId) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut list = self.load().await;
        let before = list.len();
        list.retain(|tx| &tx.id != id);
        if list.len() == before {
            return Err(StoreError::NotFound(id.clone()));
        }
        self.save_all(&list).await
    }
}
