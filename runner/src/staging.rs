pub mod hadoop;
pub mod local;
pub mod util;

#[cfg(test)]
mod util_test;

/*
 * Staging moves files between the worker's sandbox and their long term home.
 *
 * Which side of a transfer lives on the distributed store is decided by a path
 * prefix alone (e.g. `/hdfs/...`). Store transfers go through a transport
 * client, everything else is a plain local copy. Neither kind of transfer has a
 * partial success state: a copy either finishes or returns an error, and a
 * failed copy-out destination is overwritten unconditionally on the next
 * attempt.
 */

use flate2::read::MultiGzDecoder;
use serde::{Deserialize, Serialize};
use std::{
    fmt::Debug,
    fs::{self, File},
    io::{self, BufReader, BufWriter},
    path::{Path, PathBuf},
    process::ExitStatus,
};
use thiserror::Error;
use tracing::{debug, info, instrument};
use util::{decompressed_name, resolve, strip_store_prefix};

/// Local mount point of the distributed store
pub const DEFAULT_STORE_PREFIX: &str = "/hdfs";
/// Client used for store transfers
pub const DEFAULT_TRANSPORT: &str = "hadoop";

#[derive(Error, Debug)]
pub enum StagingError {
    #[error("Source {0:?} does not exist")]
    MissingSource(PathBuf),
    #[error("Failed to create parent directory of {path:?}: {source}")]
    CreateParent { path: PathBuf, source: io::Error },
    #[error("Failed to copy {from:?} to {to:?}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
    #[error("Failed to start store transport {transport}: {source}")]
    SpawnTransport { transport: String, source: io::Error },
    #[error("Store transport {transport} failed ({status}) on {from:?} -> {to:?}: {stderr}")]
    Transport {
        transport: String,
        status: ExitStatus,
        from: PathBuf,
        to: PathBuf,
        stderr: String,
    },
    #[error("Failed to decompress {path:?}: {source}")]
    Decompress { path: PathBuf, source: io::Error },
}

/// Where one side of a transfer lives
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    Local,
    Distributed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// A resolved transfer, as carried out by the stager
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagingEntry {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub kind: EntryKind,
    pub backend: Backend,
}

/// An unresolved `(source, destination)` pair from a staging plan
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct StagingPair {
    pub source: String,
    pub destination: String,
}

impl StagingPair {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

/// Copy primitives of the distributed store.
///
/// All paths handed to a backend are paths inside the store, with the local
/// mount prefix already removed.
pub trait StorageBackend: Debug {
    /// fetch `source` from the store into the local path `destination`
    fn retrieve(&self, source: &Path, destination: &Path) -> Result<(), StagingError>;
    /// put the local path `source` at `destination`, replacing what is there
    fn publish(&self, source: &Path, destination: &Path) -> Result<(), StagingError>;
    /// create `directory` and all its parents
    fn ensure_dir(&self, directory: &Path) -> Result<(), StagingError>;
    /// delete `path` recursively, a missing path is not an error
    fn remove(&self, path: &Path) -> Result<(), StagingError>;
    fn is_dir(&self, path: &Path) -> bool;
}

impl<T: StorageBackend + ?Sized> StorageBackend for &T {
    fn retrieve(&self, source: &Path, destination: &Path) -> Result<(), StagingError> {
        (**self).retrieve(source, destination)
    }

    fn publish(&self, source: &Path, destination: &Path) -> Result<(), StagingError> {
        (**self).publish(source, destination)
    }

    fn ensure_dir(&self, directory: &Path) -> Result<(), StagingError> {
        (**self).ensure_dir(directory)
    }

    fn remove(&self, path: &Path) -> Result<(), StagingError> {
        (**self).remove(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        (**self).is_dir(path)
    }
}

/// Result of a copy-in: where the data ended up after optional decompression
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Staged {
    pub entry: StagingEntry,
    pub resolved: PathBuf,
}

impl Staged {
    pub fn was_decompressed(&self) -> bool {
        self.entry.destination != self.resolved
    }
}

/// Performs transfers relative to an explicit working directory
#[derive(Debug, Clone)]
pub struct Stager<B: StorageBackend> {
    prefix: PathBuf,
    working_dir: PathBuf,
    store: B,
}

impl<B: StorageBackend> Stager<B> {
    pub fn new(prefix: impl Into<PathBuf>, working_dir: impl Into<PathBuf>, store: B) -> Self {
        Self {
            prefix: prefix.into(),
            working_dir: working_dir.into(),
            store,
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn store(&self) -> &B {
        &self.store
    }

    pub fn backend_for(&self, path: &Path) -> Backend {
        if path.starts_with(&self.prefix) {
            Backend::Distributed
        } else {
            Backend::Local
        }
    }

    fn kind_of(&self, path: &Path, backend: Backend) -> EntryKind {
        let is_dir = match strip_store_prefix(path, &self.prefix) {
            Some(inner) if backend == Backend::Distributed => self.store.is_dir(&inner),
            _ => path.is_dir(),
        };

        if is_dir {
            EntryKind::Directory
        } else {
            EntryKind::File
        }
    }

    /// Copy `source` into the working area at `destination`.
    ///
    /// A `.gz` file is decompressed in place once it has arrived, the returned
    /// [`Staged::resolved`] path is the one to use from then on.
    #[instrument(skip(self), level = "info")]
    pub fn copy_in(&self, source: &str, destination: &str) -> Result<Staged, StagingError> {
        let source_path = Path::new(source);
        let backend = self.backend_for(source_path);
        let destination = resolve(&self.working_dir, Path::new(destination));

        let entry = match backend {
            Backend::Distributed => {
                let inner = strip_store_prefix(source_path, &self.prefix)
                    .ok_or_else(|| StagingError::MissingSource(source_path.to_path_buf()))?;
                let kind = self.kind_of(source_path, backend);

                self.store.retrieve(&inner, &destination)?;

                StagingEntry {
                    source: source_path.to_path_buf(),
                    destination,
                    kind,
                    backend,
                }
            }
            Backend::Local => {
                let source_path = resolve(&self.working_dir, source_path);

                if !source_path.exists() {
                    return Err(StagingError::MissingSource(source_path));
                }

                let kind = self.kind_of(&source_path, backend);
                local::replace(&source_path, &destination)?;

                StagingEntry {
                    source: source_path,
                    destination,
                    kind,
                    backend,
                }
            }
        };

        let resolved = match (entry.kind, decompressed_name(&entry.destination)) {
            (EntryKind::File, Some(target)) => {
                decompress(&entry.destination, &target)?;
                target
            }
            _ => entry.destination.clone(),
        };

        info!(resolved = ?resolved, "Copied in");

        Ok(Staged { entry, resolved })
    }

    /// Copy `source` from the working area to `destination`, creating the
    /// destination's parent directory first.
    #[instrument(skip(self), level = "info")]
    pub fn copy_out(&self, source: &str, destination: &str) -> Result<StagingEntry, StagingError> {
        let source = resolve(&self.working_dir, Path::new(source));
        let destination_path = Path::new(destination);
        let backend = self.backend_for(destination_path);

        if !source.exists() {
            return Err(StagingError::MissingSource(source));
        }

        let kind = self.kind_of(&source, Backend::Local);

        let destination = match backend {
            Backend::Distributed => {
                let inner = strip_store_prefix(destination_path, &self.prefix)
                    .ok_or_else(|| StagingError::MissingSource(destination_path.to_path_buf()))?;

                if let Some(parent) = inner.parent() {
                    self.store.ensure_dir(parent)?;
                }
                // the store nests a directory inside an existing one
                if kind == EntryKind::Directory {
                    self.store.remove(&inner)?;
                }
                self.store.publish(&source, &inner)?;

                destination_path.to_path_buf()
            }
            Backend::Local => {
                let destination = resolve(&self.working_dir, destination_path);

                if let Some(parent) = destination.parent() {
                    fs::create_dir_all(parent).map_err(|source| StagingError::CreateParent {
                        path: destination.clone(),
                        source,
                    })?;
                }
                local::replace(&source, &destination)?;

                destination
            }
        };

        info!("Copied out");

        Ok(StagingEntry {
            source,
            destination,
            kind,
            backend,
        })
    }
}

/// gunzip `path` into `target` and remove the compressed file
fn decompress(path: &Path, target: &Path) -> Result<(), StagingError> {
    let error = |source| StagingError::Decompress {
        path: path.to_path_buf(),
        source,
    };

    debug!(path = ?path, "Decompressing");

    let mut decoder = MultiGzDecoder::new(BufReader::new(File::open(path).map_err(error)?));
    let mut output = BufWriter::new(File::create(target).map_err(error)?);

    io::copy(&mut decoder, &mut output).map_err(error)?;
    output
        .into_inner()
        .map_err(|e| error(e.into_error()))?
        .sync_all()
        .map_err(error)?;

    fs::remove_file(path).map_err(error)
}
