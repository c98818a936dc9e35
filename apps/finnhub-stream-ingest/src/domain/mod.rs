//! Domain Layer - Core market data types and business logic.
//!
//! This layer contains the canonical event types, the trade normalizer,
//! and the active-symbol subscription state. Everything here is pure Rust
//! with no I/O: the infrastructure layer feeds it and carries its outputs.

/// Canonical trade and mark-price event types.
pub mod event;

/// Raw-record normalization and direction inference.
pub mod normalize;

/// Active-symbol subscription state.
pub mod subscription;
