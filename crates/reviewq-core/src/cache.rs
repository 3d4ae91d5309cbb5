//! Cache Store: fetched snapshots keyed by `(resource, parameters)`.
//!
//! The store is plain data. It never performs I/O: the engine asks it which
//! keys need fetching, records fetch generations, and hands results back
//! through [`CacheStore::complete_fetch`], which refuses results that were
//! cancelled or that would overwrite a key held by an unsettled mutation.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use crate::aggregate::{detect_drift, Drift, NavigationCount, StatsSnapshot};
use crate::config::Config;
use crate::mutation::MutationId;
use crate::types::{
    ActionCard, CardId, ConversationThread, ObjectiveId, QueueFilter, QueuePage, ViewBucket,
};

// ---------------------------------------------------------------------------
// Keys and values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct QueueKey {
    pub status: ViewBucket,
    pub filter: QueueFilter,
}

impl QueueKey {
    pub fn new(status: ViewBucket, filter: QueueFilter) -> Self {
        Self { status, filter }
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.status, self.filter)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKey {
    Queue(QueueKey),
    Stats,
    Conversation(ObjectiveId),
    Card(CardId),
}

impl CacheKey {
    pub fn is_queue(&self) -> bool {
        matches!(self, CacheKey::Queue(_))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Queue(q) => write!(f, "queue:{q}"),
            CacheKey::Stats => f.write_str("stats"),
            CacheKey::Conversation(o) => write!(f, "conversation:{o}"),
            CacheKey::Card(c) => write!(f, "card:{c}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheValue {
    Queue(QueuePage),
    Stats(StatsSnapshot),
    Conversation(ConversationThread),
    Card(ActionCard),
}

// ---------------------------------------------------------------------------
// CachePolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct CachePolicy {
    pub queue_stale: Duration,
    pub stats_stale: Duration,
    pub conversation_stale: Duration,
    pub urgent_threshold: u32,
    pub low_confidence_threshold: u8,
}

impl CachePolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            queue_stale: Duration::from_secs(config.cache.queue_stale_secs),
            stats_stale: Duration::from_secs(config.cache.stats_stale_secs),
            conversation_stale: Duration::from_secs(config.cache.conversation_stale_secs),
            urgent_threshold: config.policy.urgent_threshold,
            low_confidence_threshold: config.policy.low_confidence_threshold,
        }
    }

    pub fn stale_after(&self, key: &CacheKey) -> Duration {
        match key {
            CacheKey::Queue(_) | CacheKey::Card(_) => self.queue_stale,
            CacheKey::Stats => self.stats_stale,
            CacheKey::Conversation(_) => self.conversation_stale,
        }
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Missing,
    Stale,
    Fresh,
}

#[derive(Debug, Clone, Default)]
pub struct Entry {
    value: Option<CacheValue>,
    fetched_at: Option<Instant>,
    invalidated: bool,
    last_error: Option<String>,
    generation: u64,
    /// In-flight mutations that wrote this key, in the order they started.
    holders: Vec<MutationId>,
}

impl Entry {
    pub fn value(&self) -> Option<&CacheValue> {
        self.value.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_held(&self) -> bool {
        !self.holders.is_empty()
    }
}

/// What happened to a completed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchApply {
    Stored,
    /// The key was cancelled after the fetch started.
    Cancelled,
    /// A mutation holds an optimistic value for the key.
    Held,
}

// ---------------------------------------------------------------------------
// CacheStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct CacheStore {
    policy: CachePolicy,
    entries: BTreeMap<CacheKey, Entry>,
    /// Store-wide clock. Every generation is a distinct tick, so generations
    /// order fetch starts against invalidations across keys.
    tick: u64,
    /// Tick of the latest stats invalidation. Queue pages whose fetch began
    /// earlier carry counts older than the refetch it asked for.
    stats_epoch: u64,
}

impl CacheStore {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            entries: BTreeMap::new(),
            tick: 0,
            stats_epoch: 0,
        }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    pub fn entry(&self, key: &CacheKey) -> Option<&Entry> {
        self.entries.get(key)
    }

    pub fn has_entry(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn value(&self, key: &CacheKey) -> Option<&CacheValue> {
        self.entries.get(key).and_then(|e| e.value.as_ref())
    }

    pub fn queue(&self, key: &QueueKey) -> Option<&QueuePage> {
        match self.value(&CacheKey::Queue(*key)) {
            Some(CacheValue::Queue(page)) => Some(page),
            _ => None,
        }
    }

    pub fn stats(&self) -> Option<&StatsSnapshot> {
        match self.value(&CacheKey::Stats) {
            Some(CacheValue::Stats(stats)) => Some(stats),
            _ => None,
        }
    }

    pub fn conversation(&self, objective: &ObjectiveId) -> Option<&ConversationThread> {
        match self.value(&CacheKey::Conversation(objective.clone())) {
            Some(CacheValue::Conversation(thread)) => Some(thread),
            _ => None,
        }
    }

    pub fn card(&self, id: &CardId) -> Option<&ActionCard> {
        match self.value(&CacheKey::Card(id.clone())) {
            Some(CacheValue::Card(card)) => Some(card),
            _ => None,
        }
    }

    pub fn last_error(&self, key: &CacheKey) -> Option<&str> {
        self.entries.get(key).and_then(|e| e.last_error())
    }

    // -----------------------------------------------------------------------
    // Staleness
    // -----------------------------------------------------------------------

    pub fn freshness(&self, key: &CacheKey, now: Instant) -> Freshness {
        let Some(entry) = self.entries.get(key) else {
            return Freshness::Missing;
        };
        let (Some(_), Some(fetched_at)) = (&entry.value, entry.fetched_at) else {
            return Freshness::Missing;
        };
        let age = now.saturating_duration_since(fetched_at);
        if entry.invalidated || age >= self.policy.stale_after(key) {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }

    pub fn needs_fetch(&self, key: &CacheKey, now: Instant) -> bool {
        self.freshness(key, now) != Freshness::Fresh
    }

    // -----------------------------------------------------------------------
    // Fetch lifecycle
    // -----------------------------------------------------------------------

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Register a fetch for `key` and return the generation it must present
    /// when it completes. Any earlier fetch of the key is superseded.
    pub fn begin_fetch(&mut self, key: &CacheKey) -> u64 {
        let generation = self.next_tick();
        self.entries.entry(key.clone()).or_default().generation = generation;
        generation
    }

    /// Move the generation on so any fetch already started for `key` is
    /// ignored.
    pub fn cancel(&mut self, key: &CacheKey) {
        let generation = self.next_tick();
        if let Some(entry) = self.entries.get_mut(key) {
            entry.generation = generation;
        }
    }

    pub fn generation(&self, key: &CacheKey) -> Option<u64> {
        self.entries.get(key).map(|e| e.generation)
    }

    pub fn complete_fetch(
        &mut self,
        key: &CacheKey,
        generation: u64,
        value: CacheValue,
        now: Instant,
    ) -> FetchApply {
        let threshold = self.policy.urgent_threshold;
        let entry = self.entries.entry(key.clone()).or_default();
        if entry.generation != generation {
            tracing::debug!(%key, "discarding cancelled fetch");
            return FetchApply::Cancelled;
        }
        if entry.is_held() {
            tracing::debug!(%key, "discarding fetch for key held by a mutation");
            return FetchApply::Held;
        }
        let value = match value {
            CacheValue::Stats(stats) => CacheValue::Stats(stats.reconciled(threshold)),
            other => other,
        };
        let (counts, listed) = match &value {
            CacheValue::Queue(page) => (page.counts, page.cards.clone()),
            _ => (None, Vec::new()),
        };
        entry.value = Some(value);
        entry.fetched_at = Some(now);
        entry.invalidated = false;
        entry.last_error = None;
        if let Some(counts) = counts {
            if generation > self.stats_epoch {
                self.absorb_counts(counts);
            } else {
                tracing::debug!(%key, "ignoring counts fetched before stats were invalidated");
            }
        }
        for card in listed {
            self.refresh_card(card, now);
        }
        FetchApply::Stored
    }

    /// Card keys have no endpoint of their own; a listed copy refreshes an
    /// existing, unheld card entry.
    fn refresh_card(&mut self, card: ActionCard, now: Instant) {
        let Some(entry) = self.entries.get_mut(&CacheKey::Card(card.id.clone())) else {
            return;
        };
        if entry.is_held() {
            return;
        }
        entry.value = Some(CacheValue::Card(card));
        entry.fetched_at = Some(now);
        entry.invalidated = false;
        entry.last_error = None;
    }

    /// Seed a card's own key from a list, e.g. when it becomes the selection.
    pub fn track_card(&mut self, card: ActionCard, now: Instant) {
        let key = CacheKey::Card(card.id.clone());
        let entry = self.entries.entry(key).or_default();
        if entry.is_held() {
            return;
        }
        entry.value = Some(CacheValue::Card(card));
        entry.fetched_at = Some(now);
        entry.invalidated = false;
    }

    /// Record a failed fetch. The last good value stays in place.
    pub fn fail_fetch(&mut self, key: &CacheKey, generation: u64, message: impl Into<String>) {
        if let Some(entry) = self.entries.get_mut(key) {
            if entry.generation == generation {
                entry.last_error = Some(message.into());
            }
        }
    }

    /// Feed server-reported counts from a queue page into the stats entry,
    /// unless a mutation currently holds it.
    pub fn absorb_counts(&mut self, counts: NavigationCount) -> bool {
        let threshold = self.policy.urgent_threshold;
        let Some(entry) = self.entries.get_mut(&CacheKey::Stats) else {
            return false;
        };
        if entry.is_held() {
            return false;
        }
        match entry.value.as_mut() {
            Some(CacheValue::Stats(stats)) => {
                stats.apply_counts(counts, threshold);
                true
            }
            _ => {
                entry.value = Some(CacheValue::Stats(StatsSnapshot::from_counts(
                    counts, threshold,
                )));
                true
            }
        }
    }

    // -----------------------------------------------------------------------
    // Invalidation
    // -----------------------------------------------------------------------

    /// Mark `key` stale and cancel any fetch already running for it, so the
    /// next fetch reflects the server as of now.
    pub fn invalidate(&mut self, key: &CacheKey) -> bool {
        let generation = self.next_tick();
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };
        entry.invalidated = true;
        entry.generation = generation;
        if *key == CacheKey::Stats {
            self.stats_epoch = generation;
        }
        true
    }

    /// Invalidate every key matching `pred`; returns the keys touched.
    pub fn invalidate_where(&mut self, pred: impl Fn(&CacheKey) -> bool) -> Vec<CacheKey> {
        let keys: Vec<CacheKey> = self.entries.keys().filter(|k| pred(k)).cloned().collect();
        for key in &keys {
            self.invalidate(key);
        }
        keys
    }

    pub fn is_invalidated(&self, key: &CacheKey) -> bool {
        self.entries.get(key).is_some_and(|e| e.invalidated)
    }

    // -----------------------------------------------------------------------
    // Mutation ownership
    // -----------------------------------------------------------------------

    pub fn is_held(&self, key: &CacheKey) -> bool {
        self.entries.get(key).is_some_and(Entry::is_held)
    }

    pub fn holders(&self, key: &CacheKey) -> &[MutationId] {
        self.entries
            .get(key)
            .map(|e| e.holders.as_slice())
            .unwrap_or(&[])
    }

    pub(crate) fn hold(&mut self, key: &CacheKey, id: MutationId) {
        let entry = self.entries.entry(key.clone()).or_default();
        if !entry.holders.contains(&id) {
            entry.holders.push(id);
            entry.holders.sort();
        }
    }

    /// Drop `id` from the holders; returns `true` when the key is now free.
    pub(crate) fn release(&mut self, key: &CacheKey, id: MutationId) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.holders.retain(|h| *h != id);
                entry.holders.is_empty()
            }
            None => true,
        }
    }

    pub(crate) fn set_value(&mut self, key: &CacheKey, value: Option<CacheValue>) {
        self.entries.entry(key.clone()).or_default().value = value;
    }

    // -----------------------------------------------------------------------
    // Queries across keys
    // -----------------------------------------------------------------------

    pub fn keys(&self) -> impl Iterator<Item = &CacheKey> {
        self.entries.keys()
    }

    pub fn queue_keys(&self) -> Vec<QueueKey> {
        self.entries
            .keys()
            .filter_map(|k| match k {
                CacheKey::Queue(q) => Some(*q),
                _ => None,
            })
            .collect()
    }

    /// Queue keys whose cached page currently lists `id`.
    pub fn keys_containing(&self, id: &CardId) -> Vec<QueueKey> {
        self.queue_keys()
            .into_iter()
            .filter(|k| self.queue(k).is_some_and(|p| p.contains(id)))
            .collect()
    }

    /// The freshest copy of a card: its own key first, then any list.
    pub fn find_card(&self, id: &CardId) -> Option<&ActionCard> {
        self.card(id).or_else(|| {
            self.entries.values().find_map(|e| match &e.value {
                Some(CacheValue::Queue(page)) => page.get(id),
                _ => None,
            })
        })
    }

    /// Buckets whose stats count disagrees with the cached unfiltered list.
    pub fn drift(&self) -> Vec<Drift> {
        let Some(stats) = self.stats() else {
            return Vec::new();
        };
        let lists: Vec<(ViewBucket, &QueuePage)> = ViewBucket::all()
            .iter()
            .filter_map(|b| {
                self.queue(&QueueKey::new(*b, QueueFilter::All))
                    .map(|p| (*b, p))
            })
            .collect();
        detect_drift(&stats.navigation_counts, lists)
    }
}
