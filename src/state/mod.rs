// src/state/mod.rs

//! Persisted per-target execution state.
//!
//! - [`machine`] holds the [`State`] enum, its transition table and the
//!   [`TargetState`] record with its timestamps.
//! - [`store`] persists records in an embedded database shared by every
//!   process working on the same workflow.
//! - [`lock`] is the file lock that serializes access to that database.

pub mod lock;
pub mod machine;
pub mod store;

pub use machine::{State, TargetState, Timestamp};
pub use store::StateStore;
