//! FxGate Gateway
//!
//! Wires the admission limiter, the conversion engine and the exchangerate.host
//! client into one facade, and hosts the `fxgate` binary.

pub mod config;
pub mod error;
pub mod gateway;
pub mod upstream;

pub use config::{GatewayConfig, UpstreamConfig};
pub use error::{GatewayError, GatewayResult};
pub use gateway::{Gateway, Outcome};
pub use upstream::ExchangeRateHostClient;
