//! Optimistic mutations as command objects.
//!
//! A [`Mutation`] captures, per cache key it touches, a snapshot of the value
//! it found there, and knows how to re-apply its own optimistic transform to
//! any value of that key. The [`Ledger`] owns every in-flight mutation and
//! runs the protocol:
//!
//! ```text
//! begin:    cancel → snapshot → optimistic write   (one call, no I/O)
//! settle:   fold into earlier holders → reconcile with server card
//! rollback: restore snapshot → replay later holders
//! ```
//!
//! Two in-flight mutations on different cards may hold the same key (both
//! cards are listed in it). Snapshots are therefore kept consistent across
//! holders: a rollback rebuilds the key from its own snapshot and replays
//! every later holder on top; a success folds its transform into earlier
//! holders' snapshots so their own rollback cannot resurrect the card.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use crate::cache::{CacheKey, CacheStore, CacheValue, QueueKey};
use crate::error::{Result, ReviewError};
use crate::types::{ActionCard, CardId, QueueFilter, QueuePage, ViewBucket};

// ---------------------------------------------------------------------------
// Identifiers and kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MutationId(pub u64);

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MutationKind {
    Approve,
    Override { reason: String },
    Edit { content: String },
    Escalate { reason: String },
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Approve => "approve",
            MutationKind::Override { .. } => "override",
            MutationKind::Edit { .. } => "edit",
            MutationKind::Escalate { .. } => "escalate",
        }
    }

    /// Approve and override take the card out of the pending population.
    pub fn removes_card(&self) -> bool {
        matches!(self, MutationKind::Approve | MutationKind::Override { .. })
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `Idle → OptimisticApplied → (Settled | RolledBack)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationPhase {
    Idle,
    OptimisticApplied,
    Settled,
    RolledBack,
}

impl MutationPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            MutationPhase::Idle => "idle",
            MutationPhase::OptimisticApplied => "optimistic_applied",
            MutationPhase::Settled => "settled",
            MutationPhase::RolledBack => "rolled_back",
        }
    }
}

// ---------------------------------------------------------------------------
// Mutation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Mutation {
    pub id: MutationId,
    pub card_id: CardId,
    pub kind: MutationKind,
    /// Timestamp written into `updatedAt` by an optimistic edit.
    pub requested_at: DateTime<Utc>,
    phase: MutationPhase,
    /// The card as found before the optimistic write.
    original: Option<ActionCard>,
    /// In capture order.
    snapshots: Vec<(CacheKey, Option<CacheValue>)>,
}

impl Mutation {
    pub fn new(
        id: MutationId,
        card_id: CardId,
        kind: MutationKind,
        requested_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            card_id,
            kind,
            requested_at,
            phase: MutationPhase::Idle,
            original: None,
            snapshots: Vec::new(),
        }
    }

    pub fn phase(&self) -> MutationPhase {
        self.phase
    }

    pub fn original(&self) -> Option<&ActionCard> {
        self.original.as_ref()
    }

    pub fn keys(&self) -> impl Iterator<Item = &CacheKey> {
        self.snapshots.iter().map(|(k, _)| k)
    }

    /// Every key whose predicate could include `card`: the card's bucket
    /// lists whose filter matches, any list that currently contains it, its
    /// own key, and stats when the card leaves the pending population.
    /// Only keys the store knows about are returned.
    pub fn matching_keys(&self, card: &ActionCard, store: &CacheStore) -> Vec<CacheKey> {
        let threshold = store.policy().low_confidence_threshold;
        let mut keys: Vec<CacheKey> = QueueFilter::all()
            .iter()
            .filter(|f| f.matches(card, threshold))
            .map(|f| CacheKey::Queue(QueueKey::new(card.bucket(), *f)))
            .chain(
                store
                    .keys_containing(&card.id)
                    .into_iter()
                    .map(CacheKey::Queue),
            )
            .chain(std::iter::once(CacheKey::Card(card.id.clone())))
            .chain(self.kind.removes_card().then_some(CacheKey::Stats))
            .filter(|k| store.has_entry(k))
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// The optimistic value of `key` given its current value.
    pub fn transform(
        &self,
        key: &CacheKey,
        value: Option<CacheValue>,
        urgent_threshold: u32,
    ) -> Option<CacheValue> {
        let value = value?;
        Some(match (key, value) {
            (CacheKey::Queue(_), CacheValue::Queue(page)) => {
                CacheValue::Queue(self.transform_page(page))
            }
            (CacheKey::Card(_), CacheValue::Card(card)) => {
                CacheValue::Card(self.transform_card(card))
            }
            (CacheKey::Stats, CacheValue::Stats(mut stats)) => {
                if let Some(original) = &self.original {
                    let credit = matches!(self.kind, MutationKind::Approve);
                    stats.remove_card(original.bucket(), credit, urgent_threshold);
                }
                CacheValue::Stats(stats)
            }
            (_, other) => other,
        })
    }

    fn transform_page(&self, mut page: QueuePage) -> QueuePage {
        if self.kind.removes_card() {
            page.cards.retain(|c| c.id != self.card_id);
        } else {
            page.cards = page
                .cards
                .into_iter()
                .map(|c| {
                    if c.id == self.card_id {
                        self.transform_card(c)
                    } else {
                        c
                    }
                })
                .collect();
        }
        page
    }

    fn transform_card(&self, mut card: ActionCard) -> ActionCard {
        match &self.kind {
            MutationKind::Edit { content } => {
                card.proposed_action = content.clone();
                card.updated_at = self.requested_at;
            }
            MutationKind::Escalate { .. } => card.escalated = true,
            MutationKind::Approve | MutationKind::Override { .. } => {}
        }
        card
    }

    fn snapshot_mut(&mut self, key: &CacheKey) -> Option<&mut Option<CacheValue>> {
        self.snapshots
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    fn expect_phase(&self, expected: MutationPhase, to: MutationPhase) -> Result<()> {
        if self.phase != expected {
            return Err(ReviewError::InvalidTransition {
                from: self.phase.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Another mutation on the same card has not settled yet.
    InFlight,
    /// The card was approved or overridden earlier in this session.
    AlreadyResolved,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Begin {
    Applied {
        id: MutationId,
        /// Keys whose in-flight fetches must be aborted.
        keys: Vec<CacheKey>,
        original: ActionCard,
    },
    Skipped(SkipReason),
}

/// Result of settling or rolling back a mutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settlement {
    /// Keys to refetch now: invalidated and no longer held.
    pub refetch: Vec<CacheKey>,
}

#[derive(Debug, Default)]
pub struct Ledger {
    next_id: u64,
    in_flight: BTreeMap<MutationId, Mutation>,
    by_card: HashMap<CardId, MutationId>,
    resolved: HashSet<CardId>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_pending(&self, card: &CardId) -> bool {
        self.by_card.contains_key(card)
    }

    pub fn is_resolved(&self, card: &CardId) -> bool {
        self.resolved.contains(card)
    }

    pub fn get(&self, id: MutationId) -> Option<&Mutation> {
        self.in_flight.get(&id)
    }

    /// Cancel, snapshot, and optimistically write every matching key.
    pub fn begin(
        &mut self,
        store: &mut CacheStore,
        card_id: &CardId,
        kind: MutationKind,
        at: DateTime<Utc>,
    ) -> Result<Begin> {
        if self.by_card.contains_key(card_id) {
            return Ok(Begin::Skipped(SkipReason::InFlight));
        }
        if self.resolved.contains(card_id) {
            return Ok(Begin::Skipped(SkipReason::AlreadyResolved));
        }
        let original = store
            .find_card(card_id)
            .cloned()
            .ok_or_else(|| ReviewError::CardNotFound(card_id.to_string()))?;

        self.next_id += 1;
        let id = MutationId(self.next_id);
        let mut mutation = Mutation::new(id, card_id.clone(), kind, at);
        mutation.original = Some(original.clone());

        let threshold = store.policy().urgent_threshold;
        let keys = mutation.matching_keys(&original, store);
        for key in &keys {
            store.cancel(key);
            let current = store.value(key).cloned();
            mutation.snapshots.push((key.clone(), current.clone()));
            store.hold(key, id);
            let next = mutation.transform(key, current, threshold);
            store.set_value(key, next);
        }
        mutation.phase = MutationPhase::OptimisticApplied;

        tracing::debug!(
            mutation = %id,
            card = %card_id,
            kind = %mutation.kind,
            keys = keys.len(),
            "optimistic write applied"
        );
        self.by_card.insert(card_id.clone(), id);
        self.in_flight.insert(id, mutation);
        Ok(Begin::Applied { id, keys, original })
    }

    /// The server confirmed the mutation and returned its canonical card.
    pub fn settle(
        &mut self,
        store: &mut CacheStore,
        id: MutationId,
        server_card: ActionCard,
    ) -> Result<(Mutation, Settlement)> {
        let mut mutation = self.take(id)?;
        mutation.expect_phase(MutationPhase::OptimisticApplied, MutationPhase::Settled)?;
        let threshold = store.policy().urgent_threshold;

        // Earlier holders snapshotted before this write; fold it in so their
        // own rollback keeps the confirmed effect.
        let mut freed = Vec::new();
        for (key, _) in &mutation.snapshots {
            let earlier: Vec<MutationId> = store
                .holders(key)
                .iter()
                .copied()
                .filter(|h| *h < id)
                .collect();
            for h in earlier {
                if let Some(other) = self.in_flight.get_mut(&h) {
                    if let Some(snap) = other.snapshot_mut(key) {
                        *snap = mutation.transform(key, snap.take(), threshold);
                    }
                }
            }
            if store.release(key, id) {
                freed.push(key.clone());
            }
        }

        match &mutation.kind {
            MutationKind::Approve | MutationKind::Override { .. } => {
                self.resolved.insert(mutation.card_id.clone());
                let card_key = CacheKey::Card(mutation.card_id.clone());
                if store.has_entry(&card_key) {
                    self.confirm(store, &card_key, |_| {
                        Some(CacheValue::Card(server_card.clone()))
                    });
                }
                store.invalidate_where(|k| k.is_queue() || *k == CacheKey::Stats);
            }
            MutationKind::Edit { .. } => {
                for key in store.keys_containing(&server_card.id) {
                    let key = CacheKey::Queue(key);
                    self.confirm(store, &key, |v| merge_card(v, &server_card));
                    store.invalidate(&key);
                }
                let card_key = CacheKey::Card(server_card.id.clone());
                self.confirm(store, &card_key, |_| {
                    Some(CacheValue::Card(server_card.clone()))
                });
                store.invalidate(&card_key);
            }
            MutationKind::Escalate { .. } => {
                self.place_escalated(store, &mutation, &server_card);
            }
        }

        let refetch = refetchable(store);
        mutation.phase = MutationPhase::Settled;
        tracing::debug!(
            mutation = %id,
            card = %mutation.card_id,
            kind = %mutation.kind,
            freed = freed.len(),
            refetch = refetch.len(),
            "mutation settled"
        );
        Ok((mutation, Settlement { refetch }))
    }

    /// The remote call failed: restore every snapshot in reverse capture
    /// order, replaying later holders on top of each.
    pub fn rollback(
        &mut self,
        store: &mut CacheStore,
        id: MutationId,
    ) -> Result<(Mutation, Settlement)> {
        let mut mutation = self.take(id)?;
        mutation.expect_phase(MutationPhase::OptimisticApplied, MutationPhase::RolledBack)?;
        let threshold = store.policy().urgent_threshold;

        for (key, snapshot) in mutation.snapshots.iter().rev() {
            let later: Vec<MutationId> = store
                .holders(key)
                .iter()
                .copied()
                .filter(|h| *h > id)
                .collect();
            let mut value = snapshot.clone();
            for h in later {
                if let Some(other) = self.in_flight.get_mut(&h) {
                    if let Some(snap) = other.snapshot_mut(key) {
                        *snap = value.clone();
                    }
                    value = other.transform(key, value, threshold);
                }
            }
            store.set_value(key, value);
            store.release(key, id);
        }

        mutation.phase = MutationPhase::RolledBack;
        tracing::debug!(mutation = %id, card = %mutation.card_id, "mutation rolled back");
        Ok((
            mutation,
            Settlement {
                refetch: refetchable(store),
            },
        ))
    }

    fn take(&mut self, id: MutationId) -> Result<Mutation> {
        let mutation = self
            .in_flight
            .remove(&id)
            .ok_or_else(|| ReviewError::InvalidTransition {
                from: "unknown".to_string(),
                to: format!("settle {id}"),
            })?;
        self.by_card.remove(&mutation.card_id);
        Ok(mutation)
    }

    /// Apply a confirmed change to `key` and to every holder's snapshot of it.
    fn confirm(
        &mut self,
        store: &mut CacheStore,
        key: &CacheKey,
        f: impl Fn(Option<CacheValue>) -> Option<CacheValue>,
    ) {
        for h in store.holders(key).to_vec() {
            if let Some(other) = self.in_flight.get_mut(&h) {
                if let Some(snap) = other.snapshot_mut(key) {
                    *snap = f(snap.take());
                }
            }
        }
        let current = store.value(key).cloned();
        store.set_value(key, f(current));
    }

    /// Move an escalated card to wherever the server put it. The card never
    /// leaves the store: its own key always holds the server copy.
    fn place_escalated(
        &mut self,
        store: &mut CacheStore,
        mutation: &Mutation,
        server_card: &ActionCard,
    ) {
        let threshold = store.policy().low_confidence_threshold;
        let urgent = store.policy().urgent_threshold;
        let target = server_card.bucket();

        for qk in store.queue_keys() {
            let key = CacheKey::Queue(qk);
            let belongs = qk.status == target && qk.filter.matches(server_card, threshold);
            let listed = store.queue(&qk).is_some_and(|p| p.contains(&server_card.id));
            if !belongs && !listed {
                continue;
            }
            self.confirm(store, &key, |v| place_card(v, server_card, belongs));
        }

        let card_key = CacheKey::Card(server_card.id.clone());
        self.confirm(store, &card_key, |_| {
            Some(CacheValue::Card(server_card.clone()))
        });

        let from = mutation
            .original()
            .map(ActionCard::bucket)
            .unwrap_or(ViewBucket::NeedsDecision);
        if from != target && store.has_entry(&CacheKey::Stats) {
            self.confirm(store, &CacheKey::Stats, |v| match v {
                Some(CacheValue::Stats(mut s)) => {
                    s.move_card(from, target, urgent);
                    Some(CacheValue::Stats(s))
                }
                other => other,
            });
            store.invalidate(&CacheKey::Stats);
        }
    }
}

fn merge_card(value: Option<CacheValue>, card: &ActionCard) -> Option<CacheValue> {
    match value {
        Some(CacheValue::Queue(mut page)) => {
            for c in page.cards.iter_mut().filter(|c| c.id == card.id) {
                *c = card.clone();
            }
            Some(CacheValue::Queue(page))
        }
        other => other,
    }
}

fn place_card(value: Option<CacheValue>, card: &ActionCard, belongs: bool) -> Option<CacheValue> {
    match value {
        Some(CacheValue::Queue(mut page)) => {
            match (page.position(&card.id), belongs) {
                (Some(i), true) => page.cards[i] = card.clone(),
                (Some(i), false) => {
                    page.cards.remove(i);
                }
                (None, true) => page.cards.push(card.clone()),
                (None, false) => {}
            }
            Some(CacheValue::Queue(page))
        }
        other => other,
    }
}

fn refetchable(store: &CacheStore) -> Vec<CacheKey> {
    store
        .keys()
        .filter(|k| store.is_invalidated(k) && !store.is_held(k))
        .cloned()
        .collect()
}
