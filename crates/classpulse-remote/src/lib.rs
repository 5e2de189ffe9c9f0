//! Remote integrations for classpulse.
//!
//! Implements the `classpulse-core` traits against real services: the REST
//! document store facade ([`store::RestStore`]) and the HTTP risk prediction
//! service ([`predict::HttpPredictor`]), plus in-memory mocks for tests and
//! the TOML configuration layer that wires everything together.

pub mod config;
pub mod mock;
pub mod predict;
pub mod store;
