//! Vigora API client
//!
//! Layers, bottom up:
//! - [`Transport`](transport::Transport) sends one HTTP request
//!   ([`HttpTransport`] in production)
//! - [`RefreshCoordinator`](refresh::RefreshCoordinator) serializes token
//!   refreshes per client
//! - [`VigoraClient`] attaches the session's bearer token, recovers from
//!   expired tokens and implements the typed API traits

pub mod api;
#[cfg(test)]
pub mod mock;
pub mod models;
pub mod refresh;
pub mod transport;
pub mod vigora;

pub use api::{AuthApi, QrApi};
pub use transport::HttpTransport;
pub use vigora::VigoraClient;
