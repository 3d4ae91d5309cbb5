//! Mutation Coordinator: the optimistic protocol around the four card
//! actions. The ledger does the cache bookkeeping; this module drives the
//! remote call, the callbacks and the follow-up refetches.

use chrono::Utc;
use serde::Serialize;

use reviewq_core::mutation::{Begin, MutationId, MutationKind, SkipReason};
use reviewq_core::types::{ActionCard, CardId};
use reviewq_remote::{QueueService, RemoteError};

use super::{Engine, EngineEvent, MutationError};

pub type SuccessCallback = Box<dyn FnOnce(&ActionCard) + Send + 'static>;
pub type ErrorCallback = Box<dyn FnOnce(&MutationError) + Send + 'static>;

/// Per-call notifications. At most one of them fires, exactly once, when the
/// mutation settles or rolls back. A skipped mutation fires neither.
#[derive(Default)]
pub struct Callbacks {
    on_success: Option<SuccessCallback>,
    on_error: Option<ErrorCallback>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_success(mut self, f: impl FnOnce(&ActionCard) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnOnce(&MutationError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    fn success(self, card: &ActionCard) {
        if let Some(f) = self.on_success {
            f(card);
        }
    }

    fn error(self, err: &MutationError) {
        if let Some(f) = self.on_error {
            f(err);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MutationOutcome {
    Settled { card: ActionCard },
    Skipped { reason: SkipReason },
}

enum Started {
    Applied(MutationId),
    Skipped(SkipReason),
}

impl Engine {
    pub async fn approve(
        &self,
        card: &CardId,
        callbacks: Callbacks,
    ) -> Result<MutationOutcome, MutationError> {
        self.mutate(card.clone(), MutationKind::Approve, callbacks).await
    }

    pub async fn override_card(
        &self,
        card: &CardId,
        reason: &str,
        callbacks: Callbacks,
    ) -> Result<MutationOutcome, MutationError> {
        let kind = MutationKind::Override {
            reason: reason.to_string(),
        };
        self.mutate(card.clone(), kind, callbacks).await
    }

    pub async fn edit(
        &self,
        card: &CardId,
        content: &str,
        callbacks: Callbacks,
    ) -> Result<MutationOutcome, MutationError> {
        let kind = MutationKind::Edit {
            content: content.to_string(),
        };
        self.mutate(card.clone(), kind, callbacks).await
    }

    pub async fn escalate(
        &self,
        card: &CardId,
        reason: &str,
        callbacks: Callbacks,
    ) -> Result<MutationOutcome, MutationError> {
        let kind = MutationKind::Escalate {
            reason: reason.to_string(),
        };
        self.mutate(card.clone(), kind, callbacks).await
    }

    /// Apply `kind` optimistically, then confirm it with the remote service.
    ///
    /// The remote half runs on its own task: dropping the returned future
    /// does not strand the optimistic write, the mutation still settles or
    /// rolls back.
    pub async fn mutate(
        &self,
        card: CardId,
        kind: MutationKind,
        callbacks: Callbacks,
    ) -> Result<MutationOutcome, MutationError> {
        if let Some(reason) = self.skip_reason(&card) {
            tracing::debug!(%card, %kind, ?reason, "mutation skipped");
            return Ok(MutationOutcome::Skipped { reason });
        }
        if !self.locate(&card).await {
            let err = MutationError::CardNotFound(card);
            callbacks.error(&err);
            return Err(err);
        }

        let started = match self.begin(&card, &kind) {
            Ok(started) => started,
            Err(err) => {
                callbacks.error(&err);
                return Err(err);
            }
        };
        let id = match started {
            Started::Applied(id) => id,
            Started::Skipped(reason) => {
                tracing::debug!(%card, %kind, ?reason, "mutation skipped");
                return Ok(MutationOutcome::Skipped { reason });
            }
        };

        let engine = self.clone();
        let task = tokio::spawn(async move { engine.finish(id, card, kind, callbacks).await });
        match task.await {
            Ok(result) => result,
            Err(e) => Err(MutationError::Internal(e.to_string())),
        }
    }

    fn skip_reason(&self, card: &CardId) -> Option<SkipReason> {
        let st = self.lock();
        if st.ledger.is_pending(card) {
            Some(SkipReason::InFlight)
        } else if st.ledger.is_resolved(card) {
            Some(SkipReason::AlreadyResolved)
        } else {
            None
        }
    }

    /// Cancel, snapshot and write, all under one lock acquisition.
    fn begin(&self, card: &CardId, kind: &MutationKind) -> Result<Started, MutationError> {
        let (id, selection) = {
            let mut guard = self.lock();
            let st = &mut *guard;
            let before = st.store.queue(&st.selection.queue_key()).cloned();
            let begun = st
                .ledger
                .begin(&mut st.store, card, kind.clone(), Utc::now())
                .map_err(|e| MutationError::from_core(card, e))?;
            let (id, keys) = match begun {
                Begin::Applied { id, keys, .. } => (id, keys),
                Begin::Skipped(reason) => return Ok(Started::Skipped(reason)),
            };
            for key in &keys {
                if let Some(running) = st.inflight.remove(key) {
                    running.abort.abort();
                }
            }
            let moved = kind.removes_card()
                && before.is_some_and(|page| st.selection.after_removal(card, &page));
            (id, moved.then(|| st.selection.clone()))
        };

        self.emit(EngineEvent::MutationApplied {
            mutation: id,
            card: card.clone(),
            kind: kind.as_str(),
        });
        if let Some(selection) = selection {
            self.emit(EngineEvent::SelectionChanged { selection });
        }
        Ok(Started::Applied(id))
    }

    async fn finish(
        self,
        id: MutationId,
        card: CardId,
        kind: MutationKind,
        callbacks: Callbacks,
    ) -> Result<MutationOutcome, MutationError> {
        let service = self.service().clone();
        let svc: &dyn QueueService = service.as_ref();
        let (c, k) = (&card, &kind);
        let result = self
            .inner
            .retry
            .mutation(kind.as_str(), move || call(svc, c, k))
            .await;

        match result {
            Ok(server_card) => {
                let settled = {
                    let mut guard = self.lock();
                    let st = &mut *guard;
                    st.ledger.settle(&mut st.store, id, server_card.clone())
                };
                match settled {
                    Ok((_, settlement)) => {
                        tracing::info!(mutation = %id, %card, %kind, "mutation confirmed");
                        self.refetch(&settlement.refetch);
                        self.emit(EngineEvent::MutationSettled {
                            mutation: id,
                            card: card.clone(),
                            kind: kind.as_str(),
                        });
                        callbacks.success(&server_card);
                        Ok(MutationOutcome::Settled { card: server_card })
                    }
                    Err(e) => {
                        let err = MutationError::from_core(&card, e);
                        tracing::error!(mutation = %id, %card, error = %err, "settle failed");
                        callbacks.error(&err);
                        Err(err)
                    }
                }
            }
            Err(remote) => {
                let rolled = {
                    let mut guard = self.lock();
                    let st = &mut *guard;
                    st.ledger.rollback(&mut st.store, id)
                };
                match &rolled {
                    Ok((_, settlement)) => self.refetch(&settlement.refetch),
                    Err(e) => tracing::error!(mutation = %id, error = %e, "rollback failed"),
                }
                tracing::warn!(
                    mutation = %id,
                    %card,
                    %kind,
                    error = %remote,
                    "mutation rolled back"
                );
                if remote.is_unauthorized() {
                    self.expire_session();
                }
                let err = MutationError::Remote {
                    kind: kind.as_str(),
                    card: card.clone(),
                    source: remote,
                };
                self.emit(EngineEvent::MutationRolledBack {
                    mutation: id,
                    card,
                    kind: kind.as_str(),
                    message: err.user_message(),
                });
                callbacks.error(&err);
                Err(err)
            }
        }
    }
}

async fn call(
    service: &dyn QueueService,
    card: &CardId,
    kind: &MutationKind,
) -> Result<ActionCard, RemoteError> {
    match kind {
        MutationKind::Approve => service.approve(card).await,
        MutationKind::Override { reason } => service.override_card(card, reason).await,
        MutationKind::Edit { content } => service.edit(card, content).await,
        MutationKind::Escalate { reason } => service.escalate(card, reason).await,
    }
}
