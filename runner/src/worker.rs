pub mod exec;

use crate::{
    card::{make_card, TemplateError},
    sandbox::{Sandbox, SandboxError},
    staging::{
        hadoop::HadoopTransport,
        util::{escapes, relative_to, resolve},
        Staged, Stager, StagingEntry, StagingError, StagingPair, StorageBackend,
        DEFAULT_STORE_PREFIX, DEFAULT_TRANSPORT,
    },
};
use clap::Args;
use exec::{run_tool, RunOutput};
use itertools::Itertools;
use once_cell::sync::Lazy;
use std::{
    collections::{BTreeMap, HashMap},
    ffi::{OsStr, OsString},
    fs, io,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    process::ExitStatus,
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Marks the start of the arguments forwarded verbatim to the domain tool
pub const PASS_THROUGH: &str = "--args";

/// Directory the detector simulation installation unpacks into
pub const DELPHES_DIR: &str = "delphes";
pub const DELPHES_HEPMC: &str = "delphes/DelphesHepMC";
pub const DELPHES_LHEF: &str = "delphes/DelphesLHEF";

static EXECUTABLE_BY_EXTENSION: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("hepmc", DELPHES_HEPMC),
        ("lhe", DELPHES_LHEF),
        ("lhef", DELPHES_LHEF),
    ])
});

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error(transparent)]
    Staging(#[from] StagingError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("Failed to start {program}: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("Failed to wait for tool")]
    Wait(#[source] io::Error),
    #[error("{program} exited with {status}")]
    Execution { program: String, status: ExitStatus },
    #[error("{program} did not finish within {}s", .timeout.as_secs())]
    Timeout { program: String, timeout: Duration },
    #[error("Failed to unpack {archive:?}: {reason}")]
    Unpack { archive: PathBuf, reason: String },
    #[error("Cannot determine which executable processes {0:?}")]
    NoExecutable(PathBuf),
    #[error("Card fields and per file processing need a --card")]
    MissingCard,
    #[error("{0:?} points outside of the sandbox")]
    OutsideSandbox(PathBuf),
    #[error("Failed to rename {from:?} to {to:?}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
    #[error("Failed to remove {path:?}: {source}")]
    Cleanup { path: PathBuf, source: io::Error },
    #[error("Failed to make {path:?} executable: {source}")]
    Permissions { path: PathBuf, source: io::Error },
}

/// Split a command line at the first `--args`.
///
/// Everything before it is for the worker itself, everything after it goes to
/// the domain tool untouched, including tokens that look like worker flags.
pub fn split_pass_through<I>(argv: I) -> (Vec<OsString>, Vec<String>)
where
    I: IntoIterator<Item = OsString>,
{
    let mut argv = argv.into_iter();
    let head = argv
        .by_ref()
        .take_while(|arg| arg != PASS_THROUGH)
        .collect::<Vec<_>>();
    let tail = argv
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect::<Vec<_>>();

    (head, tail)
}

/// Command line of the worker, everything up to `--args`
#[derive(Args, Debug, Clone, Default)]
pub struct WorkerArgs {
    /// Copy SOURCE into the sandbox as DEST before running, repeatable
    #[arg(long = "copy-in", num_args = 2, value_names = ["SOURCE", "DEST"])]
    pub copy_in: Vec<String>,
    /// Extract a copied in tarball inside the sandbox, repeatable
    #[arg(long, value_name = "ARCHIVE")]
    pub unpack: Vec<String>,
    /// Executable to run, relative paths point into the sandbox
    #[arg(long)]
    pub exe: Option<String>,
    /// Card handed to per file processing
    #[arg(long)]
    pub card: Option<String>,
    /// Set the card field KEY to VALUE before running, repeatable
    #[arg(long, num_args = 2, value_names = ["KEY", "VALUE"])]
    pub set: Vec<String>,
    /// Process INPUT into OUTPUT one file at a time, repeatable
    #[arg(long, num_args = 2, value_names = ["INPUT", "OUTPUT"])]
    pub process: Vec<String>,
    /// Rename FROM to TO inside the sandbox after running, repeatable
    #[arg(long, num_args = 2, value_names = ["FROM", "TO"])]
    pub rename: Vec<String>,
    /// Copy SOURCE out of the sandbox to DEST after running, repeatable
    #[arg(long = "copy-out", num_args = 2, value_names = ["SOURCE", "DEST"])]
    pub copy_out: Vec<String>,
    /// Paths below this prefix live on the distributed store
    #[arg(long)]
    pub store_prefix: Option<PathBuf>,
    /// Client used for store transfers
    #[arg(long)]
    pub transport: Option<PathBuf>,
    /// Sandbox directory, must not exist yet
    #[arg(long, default_value = "scratch")]
    pub sandbox: PathBuf,
    /// Kill the tool after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,
}

impl WorkerArgs {
    /// Combine the parsed flags with the pass-through arguments
    pub fn plan(&self, args: Vec<String>) -> WorkerPlan {
        WorkerPlan {
            copy_in: pairs(&self.copy_in),
            unpack: self.unpack.clone(),
            exe: self.exe.clone(),
            card: self.card.clone(),
            set: self.set.iter().cloned().tuples().collect(),
            process: pairs(&self.process),
            rename: pairs(&self.rename),
            copy_out: pairs(&self.copy_out),
            args,
            store_prefix: self.store_prefix.clone(),
            transport: self.transport.clone(),
        }
    }

    /// Run the plan against the store reached through the transport client
    pub fn run(&self, args: Vec<String>) -> Result<WorkerReport, WorkerError> {
        let plan = self.plan(args);
        let store = HadoopTransport::new(plan.transport());

        let (base, name) = match (self.sandbox.parent(), self.sandbox.file_name()) {
            (Some(parent), Some(name)) => (parent.to_path_buf(), name.to_os_string()),
            _ => (PathBuf::from("."), self.sandbox.clone().into_os_string()),
        };

        Worker::new(store, plan.store_prefix(), base, name)
            .with_timeout(self.timeout.map(Duration::from_secs))
            .run(&plan)
    }
}

fn pairs(flat: &[String]) -> Vec<StagingPair> {
    flat.iter()
        .cloned()
        .tuples()
        .map(|(source, destination)| StagingPair::new(source, destination))
        .collect()
}

/// Everything a worker process does for one job
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkerPlan {
    pub copy_in: Vec<StagingPair>,
    pub unpack: Vec<String>,
    pub exe: Option<String>,
    pub card: Option<String>,
    pub set: BTreeMap<String, String>,
    pub process: Vec<StagingPair>,
    pub rename: Vec<StagingPair>,
    pub copy_out: Vec<StagingPair>,
    pub args: Vec<String>,
    pub store_prefix: Option<PathBuf>,
    pub transport: Option<PathBuf>,
}

impl WorkerPlan {
    pub fn store_prefix(&self) -> PathBuf {
        self.store_prefix
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PREFIX))
    }

    pub fn transport(&self) -> PathBuf {
        self.transport
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TRANSPORT))
    }

    /// The worker command line for this plan, as written into a graph node
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        let push_pairs = |args: &mut Vec<String>, flag: &str, pairs: &[StagingPair]| {
            for pair in pairs {
                args.extend([flag.to_string(), pair.source.clone(), pair.destination.clone()]);
            }
        };

        push_pairs(&mut args, "--copy-in", &self.copy_in);
        for archive in &self.unpack {
            args.extend(["--unpack".to_string(), archive.clone()]);
        }
        if let Some(exe) = &self.exe {
            args.extend(["--exe".to_string(), exe.clone()]);
        }
        if let Some(card) = &self.card {
            args.extend(["--card".to_string(), card.clone()]);
        }
        for (key, value) in &self.set {
            args.extend(["--set".to_string(), key.clone(), value.clone()]);
        }
        push_pairs(&mut args, "--process", &self.process);
        push_pairs(&mut args, "--rename", &self.rename);
        push_pairs(&mut args, "--copy-out", &self.copy_out);

        if let Some(prefix) = &self.store_prefix {
            args.extend(["--store-prefix".to_string(), prefix.to_string_lossy().into_owned()]);
        }
        if let Some(transport) = &self.transport {
            args.extend(["--transport".to_string(), transport.to_string_lossy().into_owned()]);
        }

        if !self.args.is_empty() {
            args.push(PASS_THROUGH.to_string());
            args.extend(self.args.iter().cloned());
        }

        args
    }
}

/// What a finished worker run did
#[derive(Debug, Default)]
pub struct WorkerReport {
    pub sandbox: PathBuf,
    pub copied_in: Vec<Staged>,
    pub runs: Vec<RunOutput>,
    pub copied_out: Vec<StagingEntry>,
}

/// Pick the per file executable from the input's extension
pub fn select_executable(input: &Path) -> Option<&'static str> {
    let extension = input.extension()?.to_str()?.to_ascii_lowercase();

    EXECUTABLE_BY_EXTENSION.get(extension.as_str()).copied()
}

#[derive(Debug)]
pub struct Worker<B: StorageBackend> {
    store: B,
    prefix: PathBuf,
    base: PathBuf,
    sandbox: OsString,
    timeout: Option<Duration>,
}

impl<B: StorageBackend> Worker<B> {
    pub fn new(
        store: B,
        prefix: impl Into<PathBuf>,
        base: impl Into<PathBuf>,
        sandbox: impl AsRef<OsStr>,
    ) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            base: base.into(),
            sandbox: sandbox.as_ref().to_os_string(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Execute `plan` inside a fresh sandbox.
    ///
    /// The sandbox stays on disk afterwards, on failure it holds whatever the
    /// job got to before the error.
    pub fn run(&self, plan: &WorkerPlan) -> Result<WorkerReport, WorkerError> {
        let host = nix::unistd::gethostname()
            .map(|host| host.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!(host = %host, "Starting job");
        debug!(plan = ?plan);

        let sandbox = Sandbox::enter(&self.base, &self.sandbox)?;
        let stager = Stager::new(&self.prefix, sandbox.path(), &self.store);

        let result = self.run_in(&sandbox, &stager, plan);
        let path = sandbox.exit();

        match result {
            Ok(mut report) => {
                info!(runs = report.runs.len(), "Job finished");
                report.sandbox = path;
                Ok(report)
            }
            Err(e) => {
                error!(sandbox = ?path, "Job failed: {e}");
                Err(e)
            }
        }
    }

    fn run_in(
        &self,
        sandbox: &Sandbox,
        stager: &Stager<&B>,
        plan: &WorkerPlan,
    ) -> Result<WorkerReport, WorkerError> {
        let mut report = WorkerReport::default();
        // local name as given on the command line -> name after decompression
        let mut resolved_names = HashMap::new();

        for pair in &plan.copy_in {
            let staged = stager.copy_in(&pair.source, &pair.destination)?;

            if staged.was_decompressed() {
                let resolved = relative_to(&staged.resolved, sandbox.path());
                resolved_names.insert(
                    pair.destination.clone(),
                    resolved.to_string_lossy().into_owned(),
                );
            }
            report.copied_in.push(staged);
        }

        for archive in &plan.unpack {
            unpack(sandbox, archive)?;
        }

        if !plan.set.is_empty() {
            let card = plan.card.as_ref().ok_or(WorkerError::MissingCard)?;
            if escapes(Path::new(card)) {
                return Err(WorkerError::OutsideSandbox(PathBuf::from(card)));
            }

            let card = sandbox.join(card);
            make_card(&card, &card, &plan.set)?;
        }

        for pair in &plan.process {
            let (staged, output, entry) = self.process_file(sandbox, stager, plan, pair)?;
            report.copied_in.push(staged);
            report.runs.push(output);
            report.copied_out.push(entry);
        }

        match (&plan.exe, plan.process.is_empty()) {
            (Some(exe), true) => {
                let args = plan
                    .args
                    .iter()
                    .map(|arg| resolved_names.get(arg).unwrap_or(arg))
                    .collect::<Vec<_>>();

                let mut command = sandbox.command(executable(sandbox, exe)?);
                command.args(args);

                report.runs.push(run_tool(&mut command, self.timeout)?);
            }
            (None, true) => warn!("No executable given, only staging files"),
            _ => {}
        }

        for pair in &plan.rename {
            rename(sandbox, pair)?;
        }

        for pair in &plan.copy_out {
            report
                .copied_out
                .push(stager.copy_out(&pair.source, &pair.destination)?);
        }

        Ok(report)
    }

    /// copy in a single input, run the tool over it and copy the result out
    fn process_file(
        &self,
        sandbox: &Sandbox,
        stager: &Stager<&B>,
        plan: &WorkerPlan,
        pair: &StagingPair,
    ) -> Result<(Staged, RunOutput, StagingEntry), WorkerError> {
        let in_local = base_name(&pair.source);
        let out_local = base_name(&pair.destination);

        let staged = stager.copy_in(&pair.source, &in_local)?;
        let input = relative_to(&staged.resolved, sandbox.path());

        let program = match &plan.exe {
            Some(exe) => executable(sandbox, exe)?,
            None => {
                let exe = select_executable(&input)
                    .ok_or_else(|| WorkerError::NoExecutable(input.clone()))?;
                executable(sandbox, exe)?
            }
        };
        let card = plan.card.as_ref().ok_or(WorkerError::MissingCard)?;

        let mut command = sandbox.command(program);
        command.arg(card).arg(&out_local).arg(&input);
        let output = run_tool(&mut command, self.timeout)?;

        let entry = stager.copy_out(&out_local, &pair.destination)?;

        for local in [sandbox.join(&out_local), staged.resolved.clone()] {
            fs::remove_file(&local).map_err(|source| WorkerError::Cleanup {
                path: local.clone(),
                source,
            })?;
        }

        Ok((staged, output, entry))
    }
}

fn base_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// Relative executables are looked up in the sandbox first, then on PATH.
///
/// One found in the sandbox gets mode 0555, store transfers drop the mode bits.
fn executable(sandbox: &Sandbox, exe: &str) -> Result<PathBuf, WorkerError> {
    let path = Path::new(exe);
    let inside = resolve(sandbox.path(), path);

    if !inside.starts_with(sandbox.path()) || !inside.is_file() {
        return Ok(if inside.exists() { inside } else { path.to_path_buf() });
    }

    fs::set_permissions(&inside, fs::Permissions::from_mode(0o555)).map_err(|source| {
        WorkerError::Permissions {
            path: inside.clone(),
            source,
        }
    })?;

    Ok(inside)
}

fn unpack(sandbox: &Sandbox, archive: &str) -> Result<(), WorkerError> {
    let path = resolve(sandbox.path(), Path::new(archive));
    let error = |reason: String| WorkerError::Unpack {
        archive: path.clone(),
        reason,
    };

    info!(archive, "Unpacking");

    let status = sandbox
        .command("tar")
        .arg("xzf")
        .arg(&path)
        .status()
        .map_err(|e| error(e.to_string()))?;

    if !status.success() {
        return Err(error(format!("tar exited with {status}")));
    }

    fs::remove_file(&path).map_err(|e| error(e.to_string()))
}

fn rename(sandbox: &Sandbox, pair: &StagingPair) -> Result<(), WorkerError> {
    let (from, to) = (Path::new(&pair.source), Path::new(&pair.destination));

    for path in [from, to] {
        if escapes(path) {
            return Err(WorkerError::OutsideSandbox(path.to_path_buf()));
        }
    }

    let (from, to) = (sandbox.join(from), sandbox.join(to));
    debug!(from = ?from, to = ?to, "Renaming");

    fs::rename(&from, &to).map_err(|source| WorkerError::Rename { from, to, source })
}
