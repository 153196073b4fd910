// src/config/mod.rs

//! Workflow file loading and validation.
//!
//! - `model.rs` is the TOML-backed data model.
//! - `validate.rs` checks file-level invariants (`TryFrom<RawWorkflowFile>`).
//! - `loader.rs` reads the file, resolves targets and builds the [`Graph`](crate::dag::Graph).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{DEFAULT_WORKFLOW_FILE, Workflow, load_and_validate, load_from_path};
pub use model::{ConfigSection, DefaultsSection, RawWorkflowFile, TargetConfig, WorkflowFile};
pub use validate::validate_backend_name;
