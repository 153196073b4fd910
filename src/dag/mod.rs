// src/dag/mod.rs

//! Target dependency graph.
//!
//! [`graph`] derives dependency/dependent adjacency from the files targets
//! declare, rejects cycles, and exposes the orders the scheduler walks.

pub mod graph;

pub use graph::Graph;
