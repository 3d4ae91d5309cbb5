pub mod card;
pub mod config;
pub mod queue;
pub mod serve;

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;

use reviewq_core::config::Config;
use reviewq_remote::{HttpQueueService, InMemoryQueueService, QueueService};
use reviewq_server::engine::Engine;

/// Load the config at `path` (defaults if absent) and build an engine over
/// either the demo backend or the configured remote service.
pub fn connect(path: &Path, offline: bool) -> anyhow::Result<Engine> {
    let config = Config::load_or_default(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    let service: Arc<dyn QueueService> = if offline {
        tracing::info!("using the in-memory demo queue");
        Arc::new(InMemoryQueueService::demo())
    } else {
        let http = HttpQueueService::new(&config.remote)?;
        if !http.has_session() {
            tracing::warn!(
                token_env = %config.remote.token_env,
                "no bearer token set; the service will likely reject requests"
            );
        }
        Arc::new(http)
    };
    Ok(Engine::new(service, &config))
}

/// One-shot commands run on a throwaway runtime.
pub fn block_on<F: std::future::Future>(fut: F) -> anyhow::Result<F::Output> {
    let rt = tokio::runtime::Runtime::new()?;
    Ok(rt.block_on(fut))
}
