//! Wallet connection state machine
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Ready | NetworkMismatch
//!                     \-> Error -> Disconnected
//! ```
//!
//! Wallet-side events (account or chain changes) may move the state at any
//! time; they are queued by the [`EventBridge`] and applied by the
//! [`ConnectionController`] between operations.

mod state;
mod events;
mod controller;

pub use state::*;
pub use events::*;
pub use controller::*;
