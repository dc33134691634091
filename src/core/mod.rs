//! In-memory authoritative store and index helpers.

/// Helper index aliases.
pub mod indices;
/// Authoritative book store and snapshot reconciliation.
pub mod store;
