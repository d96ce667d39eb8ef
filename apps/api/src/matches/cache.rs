use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::models::candidate::MatchedCandidate;
use crate::models::document::DocumentId;
use crate::remote::{RemoteError, RemoteProcessor};

pub const DEFAULT_CAPACITY: usize = 256;

type Shared = Arc<[MatchedCandidate]>;
type FlightResult = Result<Shared, String>;

/// Raw match lists per document, least recently used evicted first.
/// A list is immutable once received; a refetch replaces it whole.
///
/// Concurrent requests for the same document share one remote fetch: the
/// first caller fetches, later callers subscribe to its result.
pub struct MatchCache {
    state: Mutex<CacheState>,
}

struct CacheState {
    entries: LruCache<DocumentId, Shared>,
    in_flight: HashMap<DocumentId, InFlight>,
    next_ticket: u64,
}

struct InFlight {
    ticket: u64,
    sender: broadcast::Sender<FlightResult>,
}

enum Role {
    Hit(Shared),
    Wait(broadcast::Receiver<FlightResult>),
    Lead(u64),
}

impl MatchCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                in_flight: HashMap::new(),
                next_ticket: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub fn get(&self, document_id: &DocumentId) -> Option<Shared> {
        self.lock().entries.get(document_id).cloned()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Cached list, or a fresh fetch when absent or `refresh` is set.
    pub async fn get_or_fetch(
        &self,
        remote: &dyn RemoteProcessor,
        document_id: &DocumentId,
        refresh: bool,
    ) -> Result<Shared, RemoteError> {
        loop {
            let ticket = match self.claim(document_id, refresh) {
                Role::Hit(cached) => return Ok(cached),
                Role::Lead(ticket) => ticket,
                Role::Wait(mut rx) => match rx.recv().await {
                    Ok(Ok(candidates)) => return Ok(candidates),
                    Ok(Err(message)) => return Err(RemoteError::Coalesced(message)),
                    // The fetching request went away without a result.
                    Err(_) => continue,
                },
            };

            let flight = Flight {
                cache: self,
                document_id,
                ticket,
            };
            let outcome = remote.fetch_matches(document_id).await.map(Shared::from);
            if let Ok(candidates) = &outcome {
                info!(
                    "Fetched {} matched jobs for document {}",
                    candidates.len(),
                    document_id
                );
            }
            flight.finish(&outcome);
            return outcome;
        }
    }

    /// Decides under the lock whether this caller reads the cache, waits on
    /// a fetch already running, or fetches itself.
    fn claim(&self, document_id: &DocumentId, refresh: bool) -> Role {
        let mut state = self.lock();
        if !refresh {
            if let Some(cached) = state.entries.get(document_id) {
                return Role::Hit(Arc::clone(cached));
            }
        }
        if let Some(flight) = state.in_flight.get(document_id) {
            debug!("Joining in-flight match fetch for {document_id}");
            return Role::Wait(flight.sender.subscribe());
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        let (sender, _) = broadcast::channel(1);
        state
            .in_flight
            .insert(document_id.clone(), InFlight { ticket, sender });
        Role::Lead(ticket)
    }

    /// Ends a fetch. Only the fetch that still owns the slot stores its
    /// result; one superseded by `invalidate` is discarded.
    fn settle(&self, document_id: &DocumentId, ticket: u64, outcome: Option<FlightResult>) {
        let mut state = self.lock();
        let Some(flight) = state.in_flight.get(document_id) else {
            return;
        };
        if flight.ticket != ticket {
            return;
        }
        let Some(flight) = state.in_flight.remove(document_id) else {
            return;
        };
        if let Some(Ok(candidates)) = &outcome {
            state
                .entries
                .put(document_id.clone(), Arc::clone(candidates));
        }
        drop(state);

        // Dropping the sender without a value sends waiters back to `claim`.
        if let Some(outcome) = outcome {
            let _ = flight.sender.send(outcome);
        }
    }

    pub fn invalidate(&self, document_id: &DocumentId) {
        let mut state = self.lock();
        state.entries.pop(document_id);
        state.in_flight.remove(document_id);
    }
}

/// The leader's claim on an in-flight fetch. Released on drop so a caller
/// that gives up mid-fetch does not wedge the document.
struct Flight<'a> {
    cache: &'a MatchCache,
    document_id: &'a DocumentId,
    ticket: u64,
}

impl Flight<'_> {
    fn finish(self, outcome: &Result<Shared, RemoteError>) {
        let result = match outcome {
            Ok(candidates) => Ok(Arc::clone(candidates)),
            Err(e) => Err(e.to_string()),
        };
        self.cache.settle(self.document_id, self.ticket, Some(result));
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        // No-op after `finish`: the slot is already gone.
        self.cache.settle(self.document_id, self.ticket, None);
    }
}
