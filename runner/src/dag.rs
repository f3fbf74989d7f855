use crate::{
    config::StoreConfig,
    job::JobDescriptor,
    staging::{DEFAULT_STORE_PREFIX, DEFAULT_TRANSPORT},
};
use std::{
    collections::HashSet,
    fmt,
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::info;

/// seconds between two node status snapshots
pub const STATUS_INTERVAL: u32 = 30;

#[derive(Error, Debug)]
pub enum DagError {
    #[error("Node {0} appears twice in one graph")]
    DuplicateNode(String),
    #[error("A job graph needs at least one node")]
    Empty,
    #[error("DAGMan cannot read the path {0:?}, it contains whitespace")]
    Whitespace(PathBuf),
    #[error("Failed to write {path:?}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Quote a single worker argument for the double quoted form of HTCondor's
/// `arguments`: a literal `"` is doubled, whitespace or `'` needs single quotes.
pub fn quote_argument(argument: &str) -> String {
    let argument = argument.replace('"', "\"\"");

    if argument.is_empty() {
        "''".to_string()
    } else if argument.contains(|c: char| c.is_whitespace() || c == '\'') {
        format!("'{}'", argument.replace('\'', "''"))
    } else {
        argument
    }
}

/// JOB and NODE_STATUS_FILE take bare paths
fn check_bare_path(path: &Path) -> Result<(), DagError> {
    if path.to_string_lossy().contains(char::is_whitespace) {
        return Err(DagError::Whitespace(path.to_path_buf()));
    }
    Ok(())
}

/// escape a value for a double quoted `VARS` field
fn escape_vars(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DagNode {
    pub name: String,
    pub arguments: Vec<String>,
}

impl DagNode {
    /// the worker command line as one string
    pub fn opts(&self) -> String {
        self.arguments
            .iter()
            .map(|argument| quote_argument(argument))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A finished job graph, ready to be handed to the scheduler
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobGraph {
    comments: Vec<String>,
    template: PathBuf,
    nodes: Vec<DagNode>,
    status_file: PathBuf,
    interval: u32,
    log_dir: PathBuf,
    log_file: String,
}

impl JobGraph {
    pub fn nodes(&self) -> &[DagNode] {
        &self.nodes
    }

    pub fn status_file(&self) -> &Path {
        &self.status_file
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn write_to<W: Write>(&self, mut out: W) -> io::Result<()> {
        for comment in &self.comments {
            writeln!(out, "# {comment}")?;
        }

        let template = self.template.to_string_lossy();
        let log_dir = self.log_dir.to_string_lossy();

        for node in &self.nodes {
            writeln!(out, "JOB {} {template}", node.name)?;
            writeln!(
                out,
                "VARS {} opts=\"{}\" logdir=\"{}\" logfile=\"{}\"",
                node.name,
                escape_vars(&node.opts()),
                escape_vars(&log_dir),
                escape_vars(&self.log_file)
            )?;
        }

        writeln!(
            out,
            "NODE_STATUS_FILE {} {}",
            self.status_file.to_string_lossy(),
            self.interval
        )
    }

    /// Write the graph to `path`, creating its directory
    pub fn write(&self, path: &Path) -> Result<(), DagError> {
        let error = |source| DagError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(error)?;
        }

        let mut out = BufWriter::new(File::create(path).map_err(error)?);
        self.write_to(&mut out).map_err(error)?;
        out.flush().map_err(error)?;

        info!(nodes = self.nodes.len(), "DAG file: {}", path.to_string_lossy());

        Ok(())
    }
}

impl fmt::Display for JobGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer).map_err(|_| fmt::Error)?;

        f.write_str(&String::from_utf8_lossy(&buffer))
    }
}

/// Turns job descriptors into a [`JobGraph`]
#[derive(Clone, Debug)]
pub struct DagWriter {
    template: PathBuf,
    status_file: PathBuf,
    interval: u32,
    log_dir: PathBuf,
    log_file: String,
    comments: Vec<String>,
    store_prefix: Option<PathBuf>,
    transport: Option<PathBuf>,
}

impl DagWriter {
    pub fn new(template: impl Into<PathBuf>, status_file: impl Into<PathBuf>) -> Self {
        let status_file = status_file.into();
        let log_file = crate::config::file_stem(&status_file);

        Self {
            template: template.into(),
            status_file,
            interval: STATUS_INTERVAL,
            log_dir: PathBuf::from("."),
            log_file,
            comments: Vec::new(),
            store_prefix: None,
            transport: None,
        }
    }

    pub fn with_log(mut self, log_dir: impl Into<PathBuf>, log_file: impl Into<String>) -> Self {
        self.log_dir = log_dir.into();
        self.log_file = log_file.into();
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comments.push(comment.into());
        self
    }

    pub fn with_interval(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    /// Workers only get told about store settings that differ from their defaults
    pub fn with_store(mut self, store: &StoreConfig) -> Self {
        self.store_prefix =
            (store.prefix != Path::new(DEFAULT_STORE_PREFIX)).then(|| store.prefix.clone());
        self.transport =
            (store.transport != Path::new(DEFAULT_TRANSPORT)).then(|| store.transport.clone());
        self
    }

    /// One node per descriptor, named `<index>_<label>`
    pub fn build(&self, label: &str, descriptors: &[JobDescriptor]) -> Result<JobGraph, DagError> {
        if descriptors.is_empty() {
            return Err(DagError::Empty);
        }
        check_bare_path(&self.template)?;
        check_bare_path(&self.status_file)?;

        let mut seen = HashSet::new();
        let mut nodes = Vec::with_capacity(descriptors.len());

        for descriptor in descriptors {
            let name = descriptor.node_name(label);
            if !seen.insert(name.clone()) {
                return Err(DagError::DuplicateNode(name));
            }

            let mut plan = descriptor.plan();
            plan.store_prefix = self.store_prefix.clone();
            plan.transport = self.transport.clone();

            let mut arguments = vec!["worker".to_string()];
            arguments.extend(plan.to_args());

            nodes.push(DagNode { name, arguments });
        }

        Ok(JobGraph {
            comments: self.comments.clone(),
            template: self.template.clone(),
            nodes,
            status_file: self.status_file.clone(),
            interval: self.interval,
            log_dir: self.log_dir.clone(),
            log_file: self.log_file.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{params::ParameterMap, staging::StagingPair};

    fn descriptor(index: u64, args: &[&str]) -> JobDescriptor {
        let mut descriptor = JobDescriptor::new(index, None);
        descriptor.parameters = ParameterMap::from_args(args.iter().copied());
        descriptor.executable = Some("mc.exe".to_string());
        descriptor
    }

    #[test]
    fn quoting() {
        assert_eq!(quote_argument("plain"), "plain");
        assert_eq!(quote_argument("with space"), "'with space'");
        assert_eq!(quote_argument("it's"), "'it''s'");
        assert_eq!(quote_argument(""), "''");
        assert_eq!(quote_argument(r#"a"b"#), r#"a""b"#);
        assert_eq!(quote_argument(r#"say "hi""#), r#"'say ""hi""'"#);
        assert_eq!(escape_vars(r#"a "b" \c"#), r#"a \"b\" \\c"#);
    }

    #[test]
    fn graph_text() {
        let mut first = descriptor(1, &["--seed", "1"]);
        first.outputs = vec![StagingPair::new("out.hepmc", "/hdfs/out dir/out.hepmc")];
        let second = descriptor(2, &["--seed", "2"]);

        let graph = DagWriter::new("HTCondor/mcJob.condor", "/work/ma4_120000.status")
            .with_log("/work/logs", "ma4_120000")
            .with_comment("DAG for channel ggh")
            .build("ggh", &[first, second])
            .unwrap();

        assert_eq!(
            graph.to_string(),
            "# DAG for channel ggh\n\
             JOB 1_ggh HTCondor/mcJob.condor\n\
             VARS 1_ggh opts=\"worker --exe mc.exe --copy-out out.hepmc '/hdfs/out dir/out.hepmc' --args --seed 1\" logdir=\"/work/logs\" logfile=\"ma4_120000\"\n\
             JOB 2_ggh HTCondor/mcJob.condor\n\
             VARS 2_ggh opts=\"worker --exe mc.exe --args --seed 2\" logdir=\"/work/logs\" logfile=\"ma4_120000\"\n\
             NODE_STATUS_FILE /work/ma4_120000.status 30\n"
        );
    }

    #[test]
    fn duplicate_and_empty_graphs_are_rejected() {
        let writer = DagWriter::new("t.condor", "s.status");

        assert!(matches!(
            writer.build("ggh", &[descriptor(1, &[]), descriptor(1, &[])]),
            Err(DagError::DuplicateNode(name)) if name == "1_ggh"
        ));
        assert!(matches!(writer.build("ggh", &[]), Err(DagError::Empty)));
    }

    #[test]
    fn bare_paths_with_whitespace_are_rejected() {
        let spaced_template = DagWriter::new("my jobs/mcJob.condor", "s.status");
        assert!(matches!(
            spaced_template.build("ggh", &[descriptor(1, &[])]),
            Err(DagError::Whitespace(path)) if path == Path::new("my jobs/mcJob.condor")
        ));

        let spaced_status = DagWriter::new("t.condor", "/work dir/ma4.status");
        assert!(matches!(
            spaced_status.build("ggh", &[descriptor(1, &[])]),
            Err(DagError::Whitespace(_))
        ));

        // quoted VARS values may hold whitespace
        assert!(DagWriter::new("t.condor", "s.status")
            .with_log("/work dir/logs", "ma 4")
            .build("ggh", &[descriptor(1, &[])])
            .is_ok());
    }

    #[test]
    fn store_settings_only_when_changed() {
        let mut store = StoreConfig::default();
        let plain = DagWriter::new("t.condor", "s.status")
            .with_store(&store)
            .build("a", &[descriptor(1, &[])])
            .unwrap();
        assert!(!plain.nodes()[0].arguments.contains(&"--store-prefix".to_string()));

        store.prefix = PathBuf::from("/mnt/store");
        let changed = DagWriter::new("t.condor", "s.status")
            .with_store(&store)
            .build("a", &[descriptor(1, &[])])
            .unwrap();
        assert!(changed.nodes()[0].opts().contains("--store-prefix /mnt/store"));
        assert!(!changed.nodes()[0].opts().contains("--transport"));
    }

    #[test]
    fn write_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("13TeV/ggh/01_Jan_24/ma4.dag");

        let graph = DagWriter::new("t.condor", "ma4.status")
            .with_interval(60)
            .build("ggh", &[descriptor(1, &[])])
            .unwrap();
        graph.write(&path).unwrap();

        assert_eq!(fs::read_to_string(path).unwrap(), graph.to_string());
        assert_eq!(graph.log_dir(), Path::new("."));
        assert!(graph.to_string().ends_with("NODE_STATUS_FILE ma4.status 60\n"));
    }
}
