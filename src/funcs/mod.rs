use std::{collections::HashMap, future::Future, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::misc::{IdentityRecord, Role};

pub mod mongo;

pub use mongo::MongoStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("identity store unavailable: {0}")]
    Unavailable(String),
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

pub type SharedStore = Arc<dyn IdentityStore>;

/// Persistence for identity records, keyed by actor id.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find(&self, actor_id: i64) -> Result<Option<IdentityRecord>, StoreError>;

    /// Stores `record` unless the actor already holds a role.
    ///
    /// Returns `false` when an existing record blocked the write. Concurrent
    /// calls for the same actor must not both return `true`.
    async fn register(&self, record: &IdentityRecord) -> Result<bool, StoreError>;

    async fn find_tutor_by_code(&self, code: &str) -> Result<Option<IdentityRecord>, StoreError>;

    /// Students linked with `code`, oldest registration first.
    async fn students_of(&self, code: &str) -> Result<Vec<IdentityRecord>, StoreError>;
}

/// Runs `op`, retrying it once if the store reported itself unavailable.
pub async fn retry_once<T, F, Fut>(mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    match op().await {
        Err(StoreError::Unavailable(reason)) => {
            log::warn!("Store call failed, retrying once: {reason}");
            op().await
        }
        other => other,
    }
}

/// Process-local store for running without MongoDB.
#[derive(Default)]
pub struct MemStore {
    records: Mutex<HashMap<i64, IdentityRecord>>,
    #[cfg(test)]
    failures: std::sync::atomic::AtomicUsize,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` store calls fail as unavailable.
    #[cfg(test)]
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, std::sync::atomic::Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        #[cfg(test)]
        {
            use std::sync::atomic::Ordering;
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError::Unavailable("injected failure".into()));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for MemStore {
    async fn find(&self, actor_id: i64) -> Result<Option<IdentityRecord>, StoreError> {
        self.check_available()?;
        Ok(self.records.lock().await.get(&actor_id).cloned())
    }

    async fn register(&self, record: &IdentityRecord) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut records = self.records.lock().await;
        if records
            .get(&record.actor_id)
            .is_some_and(|existing| existing.role.is_set())
        {
            return Ok(false);
        }
        records.insert(record.actor_id, record.clone());
        Ok(true)
    }

    async fn find_tutor_by_code(&self, code: &str) -> Result<Option<IdentityRecord>, StoreError> {
        self.check_available()?;
        Ok(self
            .records
            .lock()
            .await
            .values()
            .find(|r| r.role == Role::Tutor && r.link_code.as_deref() == Some(code))
            .cloned())
    }

    async fn students_of(&self, code: &str) -> Result<Vec<IdentityRecord>, StoreError> {
        self.check_available()?;
        let mut students: Vec<IdentityRecord> = self
            .records
            .lock()
            .await
            .values()
            .filter(|r| r.role == Role::Student && r.link_code.as_deref() == Some(code))
            .cloned()
            .collect();
        students.sort_by_key(|r| (r.registered_at, r.actor_id));
        Ok(students)
    }
}
