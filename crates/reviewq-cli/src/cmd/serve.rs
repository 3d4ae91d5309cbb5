use std::path::Path;

use super::{block_on, connect};

pub fn run(config: &Path, offline: bool, port: u16, open: bool) -> anyhow::Result<()> {
    block_on(async move {
        let engine = connect(config, offline)?;
        let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{port}")).await?;
        reviewq_server::serve_on(engine, listener, open).await
    })?
}
