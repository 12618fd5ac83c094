//! Storage gateway for face and person metadata.
//!
//! - [`persistence`]: the repository traits and their key-value and SQLite
//!   backends, bound together by [`persistence::Gateway`].
//! - [`import`]: bulk import of per-face JSON documents and person derivation.
//! - [`health`]: a read probe against the configured backend.
//! - [`config`]: environment-driven settings.
//!
//! The library only emits `tracing` events; installing a subscriber is left to
//! the binary.

pub mod config;
pub mod health;
pub mod import;
pub mod persistence;
