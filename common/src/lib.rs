//! FxGate Common Types
//!
//! Shared types used across the FxGate crates: currency codes, rate snapshots,
//! the clock port and the error taxonomy every component reports through.

pub mod currency;
pub mod snapshot;
pub mod error;
pub mod time;

pub use currency::*;
pub use snapshot::*;
pub use error::*;
pub use time::*;
