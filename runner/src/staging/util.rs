use std::path::{Component, Path, PathBuf};

pub const COMPRESSED_EXTENSION: &str = "gz";

/// Path inside the store for a prefixed path, e.g. `/hdfs/user/a` -> `/user/a`
pub fn strip_store_prefix(path: &Path, prefix: &Path) -> Option<PathBuf> {
    path.strip_prefix(prefix)
        .ok()
        .map(|rest| Path::new("/").join(rest))
}

/// The name a compressed file has once decompressed, `None` if not compressed
pub fn decompressed_name(path: &Path) -> Option<PathBuf> {
    match path.extension() {
        Some(extension) if extension == COMPRESSED_EXTENSION => {
            let stem = path.file_stem()?;
            Some(path.with_file_name(stem))
        }
        _ => None,
    }
}

/// File name with up to two extensions removed, `events.hepmc.gz` -> `events`
pub fn output_stem(path: &Path) -> String {
    let first = Path::new(path.file_stem().unwrap_or_default());

    first
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .into_owned()
}

/// Resolve a relative path against an explicit working directory
pub fn resolve(working_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_dir.join(path)
    }
}

/// Express `path` relative to `base` if it lies below it
pub fn relative_to(path: &Path, base: &Path) -> PathBuf {
    path.strip_prefix(base)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}

/// true if `path` would step outside of the directory it is joined onto
pub fn escapes(path: &Path) -> bool {
    path.components()
        .any(|component| matches!(component, Component::ParentDir | Component::RootDir))
}
