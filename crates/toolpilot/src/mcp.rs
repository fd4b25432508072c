//! Tool discovery and invocation over the Model Context Protocol.
//!
//! [`McpServer`] exposes any [`Toolbox`] as an rmcp server handler and
//! [`McpToolbox`] turns a connected [`McpClient`] back into a [`Toolbox`], so
//! the agent uses local and discovered tools the same way.

pub mod client;
pub mod server;
pub mod toolbox;

pub use client::McpClient;
pub use server::McpServer;
pub use toolbox::McpToolbox;

use std::sync::Arc;

use anyhow::Result;

use crate::registry::Toolbox;

/// Serve `toolbox` from an in-process MCP server and connect a client to it
pub async fn connect_in_process(toolbox: Arc<dyn Toolbox>) -> Result<McpToolbox> {
    let server = McpServer::new(toolbox)?;
    let client = McpClient::in_process(server).await?;
    Ok(McpToolbox::connect(client).await?)
}
