//! MCP server initialization for the stdio transport.
//!
//! Wires the engine and the tool handler into a running server. Stdout
//! carries only MCP JSON-RPC; all logging goes to stderr.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use rmcp::ServiceExt;

use crate::config::MemorixConfig;
use crate::engine::Engine;
use crate::tools::MemorixTools;

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: MemorixConfig) -> Result<()> {
    tracing::info!("starting Memorix MCP server on stdio");

    // Startup touches the filesystem and may run migrations; keep it off the
    // async runtime threads.
    let engine = tokio::task::spawn_blocking(move || Engine::init(&config)).await??;
    tracing::info!(
        project = %engine.canonical_project_id(),
        backend = engine.embedding_backend().unwrap_or("lexical-only"),
        "engine ready"
    );

    let tools = MemorixTools::new(Arc::new(Mutex::new(engine)));
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running — waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}
