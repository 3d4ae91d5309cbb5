use std::sync::Arc;

use crate::engine::{Engine, Poller};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    poller: Option<Arc<Poller>>,
}

impl AppState {
    /// Wrap `engine` and start its polling loops. Polling is skipped outside
    /// a Tokio runtime (sync unit tests).
    pub fn new(engine: Engine) -> Self {
        let poller = tokio::runtime::Handle::try_current()
            .is_ok()
            .then(|| Arc::new(engine.start_polling()));
        Self { engine, poller }
    }

    /// Without background polling; reads still fetch on demand.
    pub fn without_polling(engine: Engine) -> Self {
        Self {
            engine,
            poller: None,
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_some()
    }
}
