//! `reviewq-remote`: the contract with the remote review queue service.
//!
//! # Architecture
//!
//! ```text
//! QueueService (trait)
//!     │
//!     ├── HttpQueueService      ← reqwest, bearer token, JSON camelCase
//!     └── InMemoryQueueService  ← offline demo mode and tests
//!
//! RetryPolicy                   ← backoff for reads, one retry for mutations
//! RemoteError                   ← status-code classification
//! ```
//!
//! The engine in `reviewq-server` holds an `Arc<dyn QueueService>` and never
//! knows which implementation it talks to.

pub mod error;
pub mod http;
pub mod memory;
pub mod retry;

use async_trait::async_trait;
use reviewq_core::aggregate::StatsSnapshot;
use reviewq_core::types::{
    ActionCard, CardId, ConversationThread, ObjectiveId, QueueFilter, QueuePage, ViewBucket,
};

pub use error::RemoteError;
pub use http::HttpQueueService;
pub use memory::{InMemoryQueueService, Op};
pub use retry::RetryPolicy;

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, RemoteError>;

/// The remote source of truth for cards, stats and conversations.
#[async_trait]
pub trait QueueService: Send + Sync {
    async fn list_queue(&self, status: ViewBucket, filter: QueueFilter) -> Result<QueuePage>;

    async fn approve(&self, id: &CardId) -> Result<ActionCard>;

    async fn override_card(&self, id: &CardId, reason: &str) -> Result<ActionCard>;

    async fn edit(&self, id: &CardId, content: &str) -> Result<ActionCard>;

    async fn escalate(&self, id: &CardId, reason: &str) -> Result<ActionCard>;

    async fn get_stats(&self) -> Result<StatsSnapshot>;

    async fn get_conversation(&self, objective: &ObjectiveId) -> Result<ConversationThread>;

    /// Drop the current credentials after an authorization failure.
    fn invalidate_session(&self);

    /// Install new credentials after re-authentication.
    fn set_token(&self, token: Option<String>);

    fn has_session(&self) -> bool;
}
