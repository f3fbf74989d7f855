use crate::config::ConfigErrors;
use globset::{GlobBuilder, GlobMatcher};
use ignore::{DirEntry, WalkBuilder};
use itertools::Itertools;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// file names a detector simulation job accepts as input
pub const INPUT_GLOB: &str = "*.{lhe,hepmc,gz,tgz}";

/// Sorted list of the input files found in one directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputCollector {
    paths: Vec<PathBuf>,
}

fn matcher() -> Result<GlobMatcher, ConfigErrors> {
    Ok(GlobBuilder::new(INPUT_GLOB)
        .case_insensitive(true)
        .literal_separator(true)
        .build()?
        .compile_matcher())
}

impl InputCollector {
    /// Collect the acceptable files directly inside `dir`, subdirectories are
    /// not searched.
    pub fn collect(dir: &Path) -> Result<Self, ConfigErrors> {
        let glob = matcher()?;
        debug!("Filtering with glob: {glob:?}");

        let paths = WalkBuilder::new(dir)
            .standard_filters(false)
            .max_depth(Some(1))
            .build()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().map_or(false, |kind| kind.is_file()))
            .filter(|entry| glob.is_match(entry.file_name()))
            .map(DirEntry::into_path)
            .sorted()
            .collect_vec();

        if paths.is_empty() {
            return Err(ConfigErrors::NoInputs(dir.to_path_buf()));
        }

        info!("Collected {} input files from {:?}", paths.len(), dir);

        Ok(Self { paths })
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Group the inputs into jobs of at most `per_job` files, the last group
    /// takes the remainder.
    pub fn batches(&self, per_job: usize) -> Vec<Vec<PathBuf>> {
        self.paths
            .iter()
            .chunks(per_job.max(1))
            .into_iter()
            .map(|chunk| chunk.cloned().collect_vec())
            .collect_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), name).unwrap();
    }

    #[test]
    fn only_accepted_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.hepmc", "a.LHE", "c.hepmc.gz", "d.tar.gz", "e.tgz", "notes.txt", "x.root"] {
            touch(dir.path(), name);
        }
        fs::create_dir_all(dir.path().join("nested.lhe")).unwrap();
        touch(&dir.path().join("nested.lhe"), "deep.lhe");

        let collector = InputCollector::collect(dir.path()).unwrap();
        let names = collector
            .paths()
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect_vec();

        assert_eq!(names, ["a.LHE", "b.hepmc", "c.hepmc.gz", "d.tar.gz", "e.tgz"]);
    }

    #[test]
    fn empty_directory_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "readme.md");

        assert!(matches!(
            InputCollector::collect(dir.path()),
            Err(ConfigErrors::NoInputs(_))
        ));
    }

    #[test]
    fn batches_of_two() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["1.lhe", "2.lhe", "3.lhe", "4.lhe", "5.lhe"] {
            touch(dir.path(), name);
        }

        let batches = InputCollector::collect(dir.path()).unwrap().batches(2);

        assert_eq!(
            batches.iter().map(Vec::len).collect_vec(),
            [2, 2, 1]
        );
        assert_eq!(batches[2][0], dir.path().join("5.lhe"));
    }
}
