// src/clean.rs

//! Output removal for `clean`.

use std::path::PathBuf;

use tracing::{debug, info};

use crate::errors::Result;
use crate::fs::FileSystem;
use crate::target::Target;

/// Delete the declared outputs of `targets`. Returns the files actually removed.
pub fn remove_outputs<'t, I>(fs: &dyn FileSystem, targets: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator<Item = &'t Target>,
{
    let mut removed = Vec::new();
    for target in targets {
        for output in &target.outputs {
            if fs.remove_file(output)? {
                debug!(target = %target.name, path = ?output, "removed output");
                removed.push(output.clone());
            }
        }
    }
    info!(files = removed.len(), "clean finished");
    Ok(removed)
}
