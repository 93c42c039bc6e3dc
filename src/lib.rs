//! KESTREL Trading Engine Core
//!
//! This library provides the per-user control loops of an automated
//! trading system: a continuous quoting engine, a stateful risk gate,
//! and a periodic research-and-execute engine. Market data, order
//! routing, persistence, strategies, and notifications are collaborators
//! behind the traits in `domain::repositories`.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod telemetry;
