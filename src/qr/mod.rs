//! QR login handshake drivers
//!
//! - [`QrPoller`] - waits for a signed-out device's code to be approved
//! - [`QrDisplay`] - keeps the one token a signed-in device is showing

mod display;
mod poller;

pub use display::QrDisplay;
pub use poller::{QrLoginOutcome, QrPoller};
