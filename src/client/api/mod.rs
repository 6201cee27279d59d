//! API trait definitions split by responsibility
//!
//! - [`AuthApi`] - Password login and token refresh
//! - [`QrApi`] - QR login handshake

mod auth;
mod qr;

pub use auth::AuthApi;
pub use qr::QrApi;
