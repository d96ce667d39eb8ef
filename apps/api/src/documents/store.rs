//! Resume collection store: the service's view of each user's documents.
//!
//! CRITICAL: collections are only ever replaced wholesale by `refresh`.
//! Score and feedback are server-computed, so mutations are never patched
//! in locally; they are followed by a refresh instead (`invalidate_after`).

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::document::{Document, DocumentId};
use crate::remote::{RemoteError, RemoteProcessor};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to refresh documents for user {user_id}: {source}")]
    Refresh {
        user_id: String,
        source: RemoteError,
    },

    #[error("Document operation failed: {0}")]
    Mutation(RemoteError),
}

struct CachedCollection {
    generation: u64,
    // None after an eviction: the next read must refetch.
    documents: Option<Arc<[Document]>>,
    refreshed_at: DateTime<Utc>,
}

pub struct ResumeCollectionStore {
    remote: Arc<dyn RemoteProcessor>,
    collections: RwLock<HashMap<String, CachedCollection>>,
    generations: AtomicU64,
}

impl ResumeCollectionStore {
    pub fn new(remote: Arc<dyn RemoteProcessor>) -> Self {
        Self {
            remote,
            collections: RwLock::new(HashMap::new()),
            generations: AtomicU64::new(0),
        }
    }

    /// Fetches the user's full document set and replaces the cached one.
    ///
    /// A refresh that started before another completed refresh or eviction
    /// never overwrites it.
    pub async fn refresh(&self, user_id: &str) -> Result<Arc<[Document]>, StoreError> {
        let generation = self.next_generation();

        let documents: Arc<[Document]> = self
            .remote
            .list_documents(user_id)
            .await
            .map_err(|source| StoreError::Refresh {
                user_id: user_id.to_string(),
                source,
            })?
            .into();

        let mut collections = self.collections.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = collections.get(user_id) {
            if existing.generation > generation {
                debug!("Discarding stale document refresh for user {user_id}");
                return Ok(existing.documents.clone().unwrap_or(documents));
            }
        }

        info!(
            "Refreshed {} documents for user {} ({} analyzed)",
            documents.len(),
            user_id,
            documents.iter().filter(|d| d.is_analyzed()).count()
        );
        collections.insert(
            user_id.to_string(),
            CachedCollection {
                generation,
                documents: Some(Arc::clone(&documents)),
                refreshed_at: Utc::now(),
            },
        );
        Ok(documents)
    }

    /// Cached collection, if one is held.
    pub fn documents(&self, user_id: &str) -> Option<Arc<[Document]>> {
        self.collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .and_then(|c| c.documents.clone())
    }

    pub fn refreshed_at(&self, user_id: &str) -> Option<DateTime<Utc>> {
        self.collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .filter(|c| c.documents.is_some())
            .map(|c| c.refreshed_at)
    }

    pub fn document(&self, user_id: &str, document_id: &DocumentId) -> Option<Document> {
        self.documents(user_id)?
            .iter()
            .find(|d| &d.id == document_id)
            .cloned()
    }

    /// Cached collection, fetched on first use.
    pub async fn get_or_refresh(&self, user_id: &str) -> Result<Arc<[Document]>, StoreError> {
        match self.documents(user_id) {
            Some(documents) => Ok(documents),
            None => self.refresh(user_id).await,
        }
    }

    /// Drops the cached collection; in-flight refreshes that started earlier are ignored.
    pub fn evict(&self, user_id: &str) {
        let generation = self.next_generation();
        self.collections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                user_id.to_string(),
                CachedCollection {
                    generation,
                    documents: None,
                    refreshed_at: Utc::now(),
                },
            );
    }

    /// Runs a mutating remote operation, then refreshes the user's collection.
    ///
    /// The refresh happens whether or not the mutation succeeded, since a
    /// failed call may still have changed server state. If the refresh fails
    /// the cached collection is evicted rather than left stale.
    pub async fn invalidate_after<T, Fut>(&self, user_id: &str, mutation: Fut) -> Result<T, StoreError>
    where
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let outcome = mutation.await;

        if let Err(e) = self.refresh(user_id).await {
            warn!("{e}; evicting cached documents");
            self.evict(user_id);
            if outcome.is_ok() {
                return Err(e);
            }
        }

        outcome.map_err(StoreError::Mutation)
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::SeqCst) + 1
    }
}
