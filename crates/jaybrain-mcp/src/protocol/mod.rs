//! MCP Protocol
//!
//! JSON-RPC 2.0 types, the MCP message shapes, and the stdio transport.

pub mod messages;
pub mod stdio;
pub mod types;
