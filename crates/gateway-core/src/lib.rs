//! Wire types, error taxonomy, configuration and identifier generation
//! shared by every crate in the gateway workspace.

pub mod config;
pub mod error;
pub mod identifiers;
pub mod jsonrpc;
pub mod protocol_version;
pub mod schema;
pub mod types;

pub use config::Config;
pub use error::{GatewayError, GatewayResult};
