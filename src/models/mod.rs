//! Core data models for the asset publisher.
//!
//! `asset` holds the reconciliation-side types (descriptors, observed records,
//! lifecycle tags). `bucket`, `object` and `metadata` map to the tables of the
//! local storage backend via `sqlx::FromRow` and serialize via `serde`.

pub mod asset;
pub mod bucket;
pub mod metadata;
pub mod object;
