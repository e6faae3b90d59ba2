//! Tool registry, background loading and deadline-bound dispatch
//!
//! Everything here is independent of the wire protocol; `mcp` drives it.

pub mod dispatch;
pub mod loader;
pub mod registry;
pub mod services;
pub mod tools;
