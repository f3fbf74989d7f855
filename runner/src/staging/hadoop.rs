use super::{StagingError, StorageBackend};
use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};
use tracing::{debug, instrument};

/// Store transport driven through the `hadoop fs` command line client
#[derive(Debug, Clone)]
pub struct HadoopTransport {
    transport: PathBuf,
}

impl HadoopTransport {
    pub fn new(transport: impl Into<PathBuf>) -> Self {
        Self {
            transport: transport.into(),
        }
    }

    #[instrument(level = "debug", skip(self))]
    fn fs<I, S>(&self, args: I, from: &Path, to: &Path) -> Result<(), StagingError>
    where
        I: IntoIterator<Item = S> + std::fmt::Debug,
        S: AsRef<OsStr>,
    {
        let transport = self.transport.to_string_lossy().into_owned();
        let output = Command::new(&self.transport)
            .arg("fs")
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| StagingError::SpawnTransport {
                transport: transport.clone(),
                source,
            })?;

        if output.status.success() {
            debug!("Transport finished");
            Ok(())
        } else {
            Err(StagingError::Transport {
                transport,
                status: output.status,
                from: from.to_path_buf(),
                to: to.to_path_buf(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl StorageBackend for HadoopTransport {
    fn retrieve(&self, source: &Path, destination: &Path) -> Result<(), StagingError> {
        self.fs(
            [OsStr::new("-copyToLocal"), source.as_os_str(), destination.as_os_str()],
            source,
            destination,
        )
    }

    fn publish(&self, source: &Path, destination: &Path) -> Result<(), StagingError> {
        // -f: a destination left over from an earlier attempt is overwritten
        self.fs(
            [
                OsStr::new("-copyFromLocal"),
                OsStr::new("-f"),
                source.as_os_str(),
                destination.as_os_str(),
            ],
            source,
            destination,
        )
    }

    fn ensure_dir(&self, directory: &Path) -> Result<(), StagingError> {
        self.fs(
            [OsStr::new("-mkdir"), OsStr::new("-p"), directory.as_os_str()],
            directory,
            directory,
        )
    }

    fn remove(&self, path: &Path) -> Result<(), StagingError> {
        self.fs(
            [OsStr::new("-rm"), OsStr::new("-r"), OsStr::new("-f"), path.as_os_str()],
            path,
            path,
        )
    }

    fn is_dir(&self, path: &Path) -> bool {
        // -test exits with 0 only for an existing directory
        Command::new(&self.transport)
            .args([OsStr::new("fs"), OsStr::new("-test"), OsStr::new("-d"), path.as_os_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}
