//! The review queue consistency engine.
//!
//! # Architecture
//!
//! ```text
//! Engine (Clone, Arc<Inner>)
//!     │
//!     ├── Mutex<EngineState>      ← CacheStore + Ledger + Selection + in-flight
//!     │                              fetches; never held across .await
//!     ├── fetch.rs                ← dedup via Shared, generations, abort
//!     ├── coordinator.rs          ← approve / override / edit / escalate
//!     ├── poller.rs               ← interval subscriptions, dropped = stopped
//!     └── broadcast<EngineEvent>  ← change notifications (SSE upstream)
//! ```
//!
//! Every state transition happens under one lock acquisition. The only
//! suspension points are remote calls, and their results are applied under
//! a fresh acquisition that re-checks generations and holders.

mod coordinator;
mod error;
mod fetch;
mod poller;


pub use coordinator::{Callbacks, MutationOutcome};
pub use error::{FetchError, MutationError};
pub use poller::{Poller, Subscription};

use futures::future::{BoxFuture, Shared};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::AbortHandle;

use reviewq_core::aggregate::{Drift, StatsSnapshot};
use reviewq_core::cache::{CacheKey, CachePolicy, CacheStore, CacheValue, QueueKey};
use reviewq_core::config::Config;
use reviewq_core::mutation::{Ledger, MutationId};
use reviewq_core::selection::Selection;
use reviewq_core::types::{
    ActionCard, CardId, ConversationThread, ObjectiveId, QueueFilter, QueuePage, ViewBucket,
};
use reviewq_core::ReviewError;
use reviewq_remote::{QueueService, RetryPolicy};

const EVENT_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    CacheUpdated {
        key: String,
    },
    MutationApplied {
        mutation: MutationId,
        card: CardId,
        kind: &'static str,
    },
    MutationSettled {
        mutation: MutationId,
        card: CardId,
        kind: &'static str,
    },
    MutationRolledBack {
        mutation: MutationId,
        card: CardId,
        kind: &'static str,
        message: String,
    },
    SelectionChanged {
        selection: Selection,
    },
    SessionExpired,
    DriftDetected {
        drift: Vec<Drift>,
    },
}

// ---------------------------------------------------------------------------
// Read results
// ---------------------------------------------------------------------------

/// A cached value plus the error from the last refresh attempt, if it failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Loaded<T> {
    pub data: Option<T>,
    #[serde(serialize_with = "error_message")]
    pub error: Option<FetchError>,
}

fn error_message<S: Serializer>(err: &Option<FetchError>, s: S) -> Result<S::Ok, S::Error> {
    err.as_ref().map(FetchError::user_message).serialize(s)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregates {
    pub stats: Loaded<StatsSnapshot>,
    pub drift: Vec<Drift>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub(crate) type SharedFetch = Shared<BoxFuture<'static, Result<(), FetchError>>>;

pub(crate) struct InFlight {
    pub(crate) generation: u64,
    pub(crate) fut: SharedFetch,
    pub(crate) abort: AbortHandle,
}

pub(crate) struct EngineState {
    pub(crate) store: CacheStore,
    pub(crate) ledger: Ledger,
    pub(crate) selection: Selection,
    pub(crate) inflight: HashMap<CacheKey, InFlight>,
}

struct Inner {
    service: Arc<dyn QueueService>,
    retry: RetryPolicy,
    queue_poll: Duration,
    stats_poll: Duration,
    state: Mutex<EngineState>,
    events: broadcast::Sender<EngineEvent>,
}

#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    pub fn new(service: Arc<dyn QueueService>, config: &Config) -> Self {
        Self::with_retry(service, config, RetryPolicy::from_config(&config.retry))
    }

    pub fn with_retry(service: Arc<dyn QueueService>, config: &Config, retry: RetryPolicy) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                service,
                retry,
                queue_poll: config.cache.queue_poll(),
                stats_poll: config.cache.stats_poll(),
                state: Mutex::new(EngineState {
                    store: CacheStore::new(CachePolicy::from_config(config)),
                    ledger: Ledger::new(),
                    selection: Selection::default(),
                    inflight: HashMap::new(),
                }),
                events,
            }),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        let _ = self.inner.events.send(event);
    }

    /// Tokio's clock, so paused-time tests move staleness too.
    pub(crate) fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    pub fn service(&self) -> &Arc<dyn QueueService> {
        &self.inner.service
    }

    // -----------------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------------

    pub(crate) fn expire_session(&self) {
        if !self.inner.service.has_session() {
            return;
        }
        self.inner.service.invalidate_session();
        tracing::warn!("remote service rejected credentials; session cleared");
        self.emit(EngineEvent::SessionExpired);
    }

    pub fn reauthenticate(&self, token: String) {
        self.inner.service.set_token(Some(token));
        tracing::info!("session token replaced");
    }

    pub fn has_session(&self) -> bool {
        self.inner.service.has_session()
    }

    // -----------------------------------------------------------------------
    // Read accessors
    // -----------------------------------------------------------------------

    pub async fn queue(&self, key: QueueKey) -> Loaded<QueuePage> {
        let (value, error) = self.load(&CacheKey::Queue(key)).await;
        Loaded {
            data: match value {
                Some(CacheValue::Queue(page)) => Some(page),
                _ => None,
            },
            error,
        }
    }

    /// The slice for the active view and filter.
    pub async fn current_queue(&self) -> Loaded<QueuePage> {
        let key = self.lock().selection.queue_key();
        self.queue(key).await
    }

    /// Whatever is cached for `key`, without touching the network.
    pub fn cached_queue(&self, key: QueueKey) -> Option<QueuePage> {
        self.lock().store.queue(&key).cloned()
    }

    pub async fn aggregates(&self) -> Aggregates {
        let (value, error) = self.load(&CacheKey::Stats).await;
        let drift = self.lock().store.drift();
        Aggregates {
            stats: Loaded {
                data: match value {
                    Some(CacheValue::Stats(stats)) => Some(stats),
                    _ => None,
                },
                error,
            },
            drift,
        }
    }

    pub fn cached_stats(&self) -> Option<StatsSnapshot> {
        self.lock().store.stats().cloned()
    }

    // -----------------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------------

    pub fn selection(&self) -> Selection {
        self.lock().selection.clone()
    }

    pub fn set_view(&self, view: ViewBucket) -> Selection {
        let (changed, selection) = {
            let mut st = self.lock();
            let changed = st.selection.set_view(view);
            (changed, st.selection.clone())
        };
        if changed {
            self.emit(EngineEvent::SelectionChanged {
                selection: selection.clone(),
            });
        }
        selection
    }

    pub fn set_filter(&self, filter: QueueFilter) -> Selection {
        let (changed, selection) = {
            let mut st = self.lock();
            let changed = st.selection.set_filter(filter);
            (changed, st.selection.clone())
        };
        if changed {
            self.emit(EngineEvent::SelectionChanged {
                selection: selection.clone(),
            });
        }
        selection
    }

    /// Select a card the store already knows about. Its own cache key starts
    /// tracking it so mutations keep the detail view consistent too.
    pub fn select_card(&self, id: &CardId) -> Result<Selection, ReviewError> {
        let now = self.now();
        let selection = {
            let mut st = self.lock();
            let card = st
                .store
                .find_card(id)
                .cloned()
                .ok_or_else(|| ReviewError::CardNotFound(id.to_string()))?;
            st.selection.select(&card);
            if !st.store.has_entry(&CacheKey::Card(id.clone())) {
                st.store.track_card(card, now);
            }
            st.selection.clone()
        };
        self.emit(EngineEvent::SelectionChanged {
            selection: selection.clone(),
        });
        Ok(selection)
    }

    pub fn clear_selection(&self) -> Selection {
        let selection = {
            let mut st = self.lock();
            st.selection.clear();
            st.selection.clone()
        };
        self.emit(EngineEvent::SelectionChanged {
            selection: selection.clone(),
        });
        selection
    }

    pub fn selected_card(&self) -> Option<ActionCard> {
        let st = self.lock();
        let id = st.selection.selected_card()?;
        st.store.find_card(id).cloned()
    }

    // -----------------------------------------------------------------------
    // Conversation Linker
    // -----------------------------------------------------------------------

    /// The thread for the selected objective, fetched on first use.
    pub async fn conversation(&self) -> Option<Loaded<ConversationThread>> {
        let objective = self.lock().selection.objective().cloned()?;
        Some(self.conversation_for(&objective).await)
    }

    pub async fn conversation_for(&self, objective: &ObjectiveId) -> Loaded<ConversationThread> {
        let (value, error) = self.load(&CacheKey::Conversation(objective.clone())).await;
        Loaded {
            data: match value {
                Some(CacheValue::Conversation(thread)) => Some(thread),
                _ => None,
            },
            error,
        }
    }

    // -----------------------------------------------------------------------
    // Focus
    // -----------------------------------------------------------------------

    /// Window regained focus: refresh stats, the visible slice and the open
    /// conversation if they are stale. Returns the keys being refetched.
    pub fn focus(&self) -> Vec<CacheKey> {
        let (queue, objective) = {
            let st = self.lock();
            (st.selection.queue_key(), st.selection.objective().cloned())
        };
        let mut keys = vec![CacheKey::Stats, CacheKey::Queue(queue)];
        keys.extend(objective.map(CacheKey::Conversation));
        let started: Vec<CacheKey> = keys.into_iter().filter(|k| self.revalidate(k)).collect();
        tracing::debug!(refetching = started.len(), "focus revalidation");
        started
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub fn is_pending(&self, card: &CardId) -> bool {
        self.lock().ledger.is_pending(card)
    }

    pub fn mutations_in_flight(&self) -> usize {
        self.lock().ledger.in_flight()
    }

    pub fn last_error(&self, key: &CacheKey) -> Option<String> {
        self.lock().store.last_error(key).map(str::to_string)
    }
}
