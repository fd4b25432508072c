pub mod agent;
pub mod bridge;
pub mod builtin;
pub mod errors;
pub mod invoker;
pub mod mcp;
pub mod models;
pub mod providers;
pub mod registry;
