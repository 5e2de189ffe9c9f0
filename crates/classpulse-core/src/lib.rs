//! classpulse-core — Aggregation, caching, and risk-scoring core.
//!
//! This crate defines the data model, the metric aggregator, the memoizing
//! cache layer, the risk engine with its rule-based fallback, and the
//! dashboard orchestration engine that the rest of classpulse builds on.

pub mod aggregate;
pub mod cache;
pub mod engine;
pub mod error;
pub mod model;
pub mod risk;
pub mod traits;
