use futures::FutureExt;

use reviewq_core::cache::{CacheKey, CacheValue, FetchApply, QueueKey};
use reviewq_core::types::{CardId, QueueFilter, ViewBucket};
use reviewq_remote::{QueueService, RemoteError};

use super::{Engine, EngineEvent, FetchError, InFlight, SharedFetch};

impl Engine {
    /// Start (or join) the fetch for `key`. A running fetch is joined only
    /// if no invalidation happened since it started. Card keys have no
    /// endpoint of their own and return `None`.
    pub(crate) fn start_fetch(&self, key: &CacheKey) -> Option<SharedFetch> {
        if matches!(key, CacheKey::Card(_)) {
            return None;
        }
        let mut st = self.lock();
        let current = st.store.generation(key);
        if let Some(running) = st.inflight.get(key) {
            if Some(running.generation) == current {
                tracing::debug!(%key, "joining in-flight fetch");
                return Some(running.fut.clone());
            }
        }

        let generation = st.store.begin_fetch(key);
        let engine = self.clone();
        let owned = key.clone();
        let handle = tokio::spawn(async move { engine.run_fetch(owned, generation).await });
        let abort = handle.abort_handle();
        let fut = async move {
            match handle.await {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => Ok(()),
                Err(e) => Err(FetchError::Task(e.to_string())),
            }
        }
        .boxed()
        .shared();
        let superseded = st.inflight.insert(
            key.clone(),
            InFlight {
                generation,
                fut: fut.clone(),
                abort,
            },
        );
        if let Some(stale) = superseded {
            // Started before the key was invalidated or cancelled; its answer
            // would be discarded anyway.
            stale.abort.abort();
            tracing::debug!(%key, stale = stale.generation, "superseded fetch aborted");
        }
        tracing::debug!(%key, generation, "fetch started");
        Some(fut)
    }

    async fn run_fetch(self, key: CacheKey, generation: u64) -> Result<(), FetchError> {
        let service = self.service().clone();
        let svc: &dyn QueueService = service.as_ref();
        let k = &key;
        let result = self
            .inner
            .retry
            .read(&key.to_string(), move || remote_value(svc, k))
            .await;

        let now = self.now();
        let mut st = self.lock();
        if st
            .inflight
            .get(&key)
            .is_some_and(|f| f.generation == generation)
        {
            st.inflight.remove(&key);
        }
        match result {
            Ok(value) => {
                let applied = st.store.complete_fetch(&key, generation, value, now);
                let drift = match (&key, applied) {
                    (CacheKey::Stats, FetchApply::Stored) => st.store.drift(),
                    (CacheKey::Queue(q), FetchApply::Stored) if q.filter == QueueFilter::All => {
                        st.store.drift()
                    }
                    _ => Vec::new(),
                };
                drop(st);
                if applied == FetchApply::Stored {
                    tracing::debug!(%key, "fetch stored");
                    self.emit(EngineEvent::CacheUpdated {
                        key: key.to_string(),
                    });
                }
                if !drift.is_empty() {
                    tracing::debug!(?drift, "navigation counts disagree with cached lists");
                    self.emit(EngineEvent::DriftDetected { drift });
                }
                Ok(())
            }
            Err(e) => {
                st.store.fail_fetch(&key, generation, e.user_message());
                drop(st);
                tracing::warn!(%key, error = %e, "fetch failed; keeping last known value");
                if e.is_unauthorized() {
                    self.expire_session();
                }
                Err(e.into())
            }
        }
    }

    /// Serve `key` from cache when fresh; otherwise fetch (or join the
    /// running fetch) first. A key held by a mutation is served as-is.
    pub(crate) async fn load(&self, key: &CacheKey) -> (Option<CacheValue>, Option<FetchError>) {
        let now = self.now();
        let stale = {
            let st = self.lock();
            st.store.needs_fetch(key, now) && !st.store.is_held(key)
        };
        let mut error = None;
        if stale {
            if let Some(fut) = self.start_fetch(key) {
                error = fut.await.err();
            }
        }
        let value = self.lock().store.value(key).cloned();
        (value, error)
    }

    /// Force a refetch of `key` and wait for it.
    pub async fn refresh(&self, key: &CacheKey) -> Result<(), FetchError> {
        match self.start_fetch(key) {
            Some(fut) => fut.await,
            None => Ok(()),
        }
    }

    /// Start a background fetch if `key` is stale and not held.
    pub fn revalidate(&self, key: &CacheKey) -> bool {
        let now = self.now();
        let stale = {
            let st = self.lock();
            st.store.needs_fetch(key, now) && !st.store.is_held(key)
        };
        stale && self.start_fetch(key).is_some()
    }

    pub(crate) fn refetch(&self, keys: &[CacheKey]) {
        for key in keys {
            self.start_fetch(key);
        }
    }

    /// Wait until no fetch is in flight.
    pub async fn quiesce(&self) {
        loop {
            let pending: Vec<SharedFetch> = {
                let mut st = self.lock();
                st.inflight.retain(|_, f| f.fut.peek().is_none());
                st.inflight.values().map(|f| f.fut.clone()).collect()
            };
            if pending.is_empty() {
                return;
            }
            futures::future::join_all(pending).await;
        }
    }

    /// Make sure some cached list contains `id`, loading the unfiltered
    /// list of each bucket until one does.
    pub(crate) async fn locate(&self, id: &CardId) -> bool {
        if self.lock().store.find_card(id).is_some() {
            return true;
        }
        for bucket in ViewBucket::all() {
            let key = CacheKey::Queue(QueueKey::new(*bucket, QueueFilter::All));
            let _ = self.load(&key).await;
            if self.lock().store.find_card(id).is_some() {
                return true;
            }
        }
        false
    }
}

async fn remote_value(
    service: &dyn QueueService,
    key: &CacheKey,
) -> Result<CacheValue, RemoteError> {
    Ok(match key {
        CacheKey::Queue(q) => CacheValue::Queue(service.list_queue(q.status, q.filter).await?),
        CacheKey::Stats => CacheValue::Stats(service.get_stats().await?),
        CacheKey::Conversation(objective) => {
            CacheValue::Conversation(service.get_conversation(objective).await?)
        }
        CacheKey::Card(id) => {
            return Err(RemoteError::Validation(format!(
                "card {id} has no endpoint of its own"
            )))
        }
    })
}
