//! The OAuth 2.1 authorization server and bearer-token minting subsystem:
//! `TokenCodec`, `PkceVerifier`, `OAuthStateStore`, `UpstreamAuthClient`,
//! and the `AuthServer` HTTP surface.

pub mod pkce;
pub mod redirect_policy;
pub mod server;
pub mod state_store;
pub mod token;
pub mod upstream;

pub use server::{router, AuthServerState};
pub use state_store::OAuthStateStore;
pub use token::TokenCodec;
pub use upstream::UpstreamAuthClient;
