use reviewq_core::types::CardId;
use reviewq_core::ReviewError;
use reviewq_remote::RemoteError;
use thiserror::Error;

/// A read that could not refresh its key. The last good value, if any, is
/// still served alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("fetch task failed: {0}")]
    Task(String),
}

impl FetchError {
    pub fn user_message(&self) -> String {
        match self {
            FetchError::Remote(e) => e.user_message(),
            FetchError::Task(_) => "Something went wrong loading this view.".to_string(),
        }
    }
}

/// A mutation that was rolled back, or could not start.
#[derive(Debug, Clone, Error)]
pub enum MutationError {
    #[error("{kind} of card {card} was rolled back")]
    Remote {
        kind: &'static str,
        card: CardId,
        #[source]
        source: RemoteError,
    },

    #[error("card not found: {0}")]
    CardNotFound(CardId),

    #[error("mutation task failed: {0}")]
    Internal(String),
}

impl MutationError {
    pub(crate) fn from_core(card: &CardId, err: ReviewError) -> Self {
        match err {
            ReviewError::CardNotFound(_) => MutationError::CardNotFound(card.clone()),
            other => MutationError::Internal(other.to_string()),
        }
    }

    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            MutationError::Remote { source, .. } => Some(source),
            _ => None,
        }
    }

    /// What the dashboard shows after the rollback.
    pub fn user_message(&self) -> String {
        match self {
            MutationError::Remote { source, .. } => source.user_message(),
            MutationError::CardNotFound(id) => format!("Card {id} is no longer in the queue."),
            MutationError::Internal(_) => "Something went wrong. Your change was undone.".into(),
        }
    }
}
