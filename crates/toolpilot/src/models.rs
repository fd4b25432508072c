//! These models represent the objects passed around by the agent
//!
//! There are a few related formats we need to interact with:
//! - openai-compatible messages/tools, sent from the agent to the LLM
//! - mcp tool descriptors and call results, exchanged with tool servers
//! - tool calls, sent from the agent to the toolbox providing capabilities
//!
//! We always immediately convert those data models into the internal structs
//! using to/from helpers, so the internal models are not an exact match to any
//! of these formats.
pub mod content;
pub mod conversation;
pub mod message;
pub mod role;
pub mod tool;
