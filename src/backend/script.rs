// src/backend/script.rs

//! Submission scripts.
//!
//! A script is what the external scheduler actually runs on the compute node:
//! the backend's header and variables, then a call back into this binary's
//! `exec` subcommand for one target.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::Backend;
use crate::errors::BackendError;
use crate::target::Target;

#[derive(Debug, Clone)]
pub struct ScriptWriter {
    scripts_dir: PathBuf,
    executable: PathBuf,
    workflow_path: PathBuf,
}

impl ScriptWriter {
    /// `executable` is the binary the job calls back into.
    pub fn new(
        scripts_dir: impl Into<PathBuf>,
        executable: impl Into<PathBuf>,
        workflow_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
            executable: executable.into(),
            workflow_path: workflow_path.into(),
        }
    }

    /// One script per target. Names never contain path separators, so
    /// distinct targets never share a file.
    pub fn script_path(&self, target: &Target) -> PathBuf {
        self.scripts_dir.join(format!("{}.sh", target.name))
    }

    /// Write the script body for `target` to `out`.
    pub fn compile(
        &self,
        backend: &dyn Backend,
        target: &Target,
        out: &mut dyn Write,
    ) -> io::Result<()> {
        writeln!(out, "#!/bin/bash")?;
        backend.write_script_header(out, &target.options)?;
        writeln!(out)?;
        backend.write_script_variables(out)?;
        writeln!(out)?;
        writeln!(out, "cd {}", shell_quote(&target.working_dir))?;
        writeln!(
            out,
            "exec {} --workflow {} exec {}",
            shell_quote(&self.executable),
            shell_quote(&self.workflow_path),
            shell_quote(Path::new(&target.name)),
        )
    }

    /// Compile and write the script for `target`; returns its path.
    pub fn write(&self, backend: &dyn Backend, target: &Target) -> Result<PathBuf, BackendError> {
        fs::create_dir_all(&self.scripts_dir)?;
        let path = self.script_path(target);

        let mut body = Vec::new();
        self.compile(backend, target, &mut body)?;
        fs::write(&path, &body)?;
        make_executable(&path)?;

        debug!(target = %target.name, path = ?path, "wrote submission script");
        Ok(path)
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Single-quote `path` for bash.
fn shell_quote(path: &Path) -> String {
    let raw = path.to_string_lossy();
    format!("'{}'", raw.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TestingBackend;
    use tempfile::TempDir;

    #[test]
    fn script_calls_back_into_exec() {
        let writer = ScriptWriter::new("/meta/scripts", "/bin/clusterflow", "/w/workflow.toml");
        let target = Target::empty("Target1", "/w/it's here").with_option("cores", "4");

        let mut out = Vec::new();
        writer
            .compile(&TestingBackend::new(), &target, &mut out)
            .unwrap();
        let script = String::from_utf8(out).unwrap();

        assert!(script.starts_with("#!/bin/bash\n#TESTING cores=4\n"));
        assert!(script.contains("export CLUSTERFLOW_BACKEND=testing"));
        assert!(script.contains(r"cd '/w/it'\''s here'"));
        assert!(script.ends_with(
            "exec '/bin/clusterflow' --workflow '/w/workflow.toml' exec 'Target1'\n"
        ));
    }

    #[test]
    fn write_creates_executable_file() {
        let dir = TempDir::new().unwrap();
        let writer = ScriptWriter::new(dir.path().join("scripts"), "/bin/cf", "/w/wf.toml");
        let target = Target::empty("a_b", "/w");

        let path = writer.write(&TestingBackend::new(), &target).unwrap();
        assert_eq!(path, dir.path().join("scripts/a_b.sh"));
        assert!(fs::read_to_string(&path).unwrap().contains("exec 'a_b'"));
    }
}
