//! Model Context Protocol (MCP) server over stdio
//!
//! Line framing, JSON-RPC envelopes, the handshake state and request routing.

pub mod rpc;
pub mod server;
pub mod session;
pub mod transport;
