use super::util::{decompressed_name, escapes, output_stem, relative_to, resolve, strip_store_prefix};
use std::path::{Path, PathBuf};

#[test]
pub fn strip_prefix_store_path() {
    assert_eq!(
        strip_store_prefix(Path::new("/hdfs/user/rob/out"), Path::new("/hdfs")),
        Some(PathBuf::from("/user/rob/out"))
    );
    assert_eq!(
        strip_store_prefix(Path::new("/hdfsx/user"), Path::new("/hdfs")),
        None
    );
    assert_eq!(
        strip_store_prefix(Path::new("/users/rob/hdfs"), Path::new("/hdfs")),
        None
    );
}

#[test]
pub fn decompressed_names() {
    assert_eq!(
        decompressed_name(Path::new("events.hepmc.gz")),
        Some(PathBuf::from("events.hepmc"))
    );
    assert_eq!(
        decompressed_name(Path::new("in/events.lhe.gz")),
        Some(PathBuf::from("in/events.lhe"))
    );
    assert_eq!(decompressed_name(Path::new("events.hepmc")), None);
    assert_eq!(decompressed_name(Path::new("delphes.tgz")), None);
}

#[test]
pub fn output_stems() {
    assert_eq!(output_stem(Path::new("/a/b/events_seed1.hepmc.gz")), "events_seed1");
    assert_eq!(output_stem(Path::new("events.tar.gz")), "events");
    assert_eq!(output_stem(Path::new("events.lhe")), "events");
}

#[test]
pub fn resolve_against_working_dir() {
    let sandbox = Path::new("/work/scratch");

    assert_eq!(resolve(sandbox, Path::new("mc.exe")), PathBuf::from("/work/scratch/mc.exe"));
    assert_eq!(resolve(sandbox, Path::new("/abs/file")), PathBuf::from("/abs/file"));
    assert_eq!(
        relative_to(Path::new("/work/scratch/a/b"), sandbox),
        PathBuf::from("a/b")
    );
    assert_eq!(relative_to(Path::new("/elsewhere"), sandbox), PathBuf::from("/elsewhere"));
}

#[test]
pub fn escaping_paths() {
    assert!(escapes(Path::new("../up")));
    assert!(escapes(Path::new("/abs")));
    assert!(!escapes(Path::new("input_cards/card.cmnd")));
}
