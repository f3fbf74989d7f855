use super::StagingError;
use ignore::WalkBuilder;
use std::{
    fs::{self, File},
    path::Path,
};
use tracing::{debug, trace};

fn copy_error(from: &Path, to: &Path) -> impl FnOnce(std::io::Error) -> StagingError {
    let from = from.to_path_buf();
    let to = to.to_path_buf();

    move |source| StagingError::Copy { from, to, source }
}

/// Copy a single file, keeping its permissions and modification time
pub fn copy_file(from: &Path, to: &Path) -> Result<(), StagingError> {
    fs::copy(from, to).map_err(copy_error(from, to))?;

    let modified = fs::metadata(from)
        .and_then(|metadata| metadata.modified())
        .map_err(copy_error(from, to))?;

    File::open(to)
        .and_then(|file| file.set_modified(modified))
        .map_err(copy_error(from, to))
}

/// Recursively copy a directory tree, `to` must not exist yet
pub fn copy_tree(from: &Path, to: &Path) -> Result<(), StagingError> {
    // plain walk: hidden files and ignore files are part of the tree as well
    let walker = WalkBuilder::new(from)
        .standard_filters(false)
        .follow_links(false)
        .build();

    for entry in walker {
        let entry = entry.map_err(|error| StagingError::Copy {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source: error
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("failed to walk directory")),
        })?;

        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|_| StagingError::MissingSource(entry.path().to_path_buf()))?;
        let target = to.join(relative);

        match entry.file_type() {
            Some(file_type) if file_type.is_dir() => {
                trace!(path = ?target, "Creating directory");
                fs::create_dir_all(&target).map_err(copy_error(entry.path(), &target))?;
            }
            _ => copy_file(entry.path(), &target)?,
        }
    }

    Ok(())
}

/// Copy `from` onto `to`, replacing whatever is there.
///
/// A directory is never merged into an existing one: the old tree is removed
/// first. A file copied onto an existing directory lands inside it, the same
/// way the store transport places it.
pub fn replace(from: &Path, to: &Path) -> Result<(), StagingError> {
    if from.is_dir() {
        if to.is_dir() {
            debug!(path = ?to, "Removing existing directory before copy");
            fs::remove_dir_all(to).map_err(copy_error(from, to))?;
        } else if to.exists() {
            fs::remove_file(to).map_err(copy_error(from, to))?;
        }

        copy_tree(from, to)
    } else if from.is_file() {
        match (to.is_dir(), from.file_name()) {
            (true, Some(name)) => copy_file(from, &to.join(name)),
            _ => copy_file(from, to),
        }
    } else {
        Err(StagingError::MissingSource(from.to_path_buf()))
    }
}
