// Library root: the binary entry point is src/main.rs.  Everything the
// binary wires together is public so integration tests can drive it.

pub mod analysis;
pub mod config;
pub mod error;
pub mod logger;
pub mod orchestrator;
pub mod query;
pub mod registry;
pub mod router;
pub mod subsystems;
pub mod verifier;
