use std::{
    ffi::OsStr,
    fs, io,
    ops::Deref,
    path::{Path, PathBuf},
    process::Command,
};
use thiserror::Error;
use tracing::{debug, info};

/// Environment variable that carries the sandbox path to every subprocess
pub const SANDBOX_VAR: &str = "SCRATCH";

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Sandbox {0:?} already exists, sandboxes are never reused")]
    Exists(PathBuf),
    #[error("Failed to create sandbox {path:?}: {source}")]
    Create { path: PathBuf, source: io::Error },
}

/// A single use working directory for one job run.
///
/// The sandbox keeps concurrently running jobs on one node from clobbering each
/// other's files, and keeps the scheduler from shipping the whole working
/// directory back to the submit host. It is left on disk when the job ends,
/// successful or not.
#[derive(Debug)]
pub struct Sandbox {
    path: PathBuf,
}

impl Sandbox {
    /// Create `base/name`, failing if anything already exists there
    pub fn enter(base: &Path, name: impl AsRef<OsStr>) -> Result<Self, SandboxError> {
        let path = base.join(name.as_ref());

        match fs::create_dir(&path) {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {
                return Err(SandboxError::Exists(path));
            }
            Err(source) => return Err(SandboxError::Create { path, source }),
        }

        let path = path
            .canonicalize()
            .map_err(|source| SandboxError::Create {
                path: path.clone(),
                source,
            })?;

        info!(sandbox = ?path, "Entered sandbox");

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// variable and value exposing the sandbox to subprocesses
    pub fn env(&self) -> (&'static str, &Path) {
        (SANDBOX_VAR, &self.path)
    }

    /// A command that runs inside the sandbox with the sandbox variable set
    pub fn command(&self, program: impl AsRef<OsStr>) -> Command {
        let (key, value) = self.env();
        let mut command = Command::new(program);
        command.current_dir(&self.path).env(key, value);

        command
    }

    /// Leave the sandbox, its contents stay in place for inspection
    pub fn exit(self) -> PathBuf {
        debug!(sandbox = ?self.path, "Left sandbox");

        self.path
    }
}

impl Deref for Sandbox {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandboxes_are_never_reused() {
        let base = tempfile::tempdir().unwrap();

        let sandbox = Sandbox::enter(base.path(), "scratch").unwrap();
        assert!(sandbox.path().is_absolute());
        assert!(sandbox.is_dir());

        let left = sandbox.exit();
        assert!(left.is_dir());

        assert!(matches!(
            Sandbox::enter(base.path(), "scratch"),
            Err(SandboxError::Exists(_))
        ));
    }

    #[test]
    fn missing_base_is_a_create_error() {
        let base = tempfile::tempdir().unwrap();

        assert!(matches!(
            Sandbox::enter(&base.path().join("missing"), "scratch"),
            Err(SandboxError::Create { .. })
        ));
    }

    #[test]
    fn commands_run_inside() {
        let base = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::enter(base.path(), "scratch").unwrap();

        let output = sandbox
            .command("sh")
            .args(["-c", "pwd; echo $SCRATCH"])
            .output()
            .unwrap();
        let stdout = String::from_utf8(output.stdout).unwrap();
        let lines = stdout.lines().collect::<Vec<_>>();

        assert_eq!(lines[0], sandbox.path().to_string_lossy());
        assert_eq!(lines[1], sandbox.path().to_string_lossy());
    }
}
