use crate::{
    card::{read_field, substitute, TemplateError},
    jobspace::{JobRange, ScanRange},
    naming::OutputFormat,
    params::ParameterMap,
    staging::{util::escapes, DEFAULT_STORE_PREFIX, DEFAULT_TRANSPORT},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    env,
    fs::{self, File},
    io::Error,
    num::ParseIntError,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{error, warn};

/// generator flag for the centre of mass energy in TeV
pub const ENERGY_FLAG: &str = "--energy";
/// MG5_aMC card fields managed per job
pub const SEED_FIELD: &str = "iseed";
pub const EVENTS_FIELD: &str = "nevents";

// check if a file is executable
pub fn check_executable(path: &Path) -> Result<bool, ConfigErrors> {
    if !path.is_file() {
        Err(ConfigErrors::FileNotFound(path.to_path_buf()))
    } else {
        match File::open(path).map(|file| file.metadata()) {
            Ok(Ok(metadata)) => Ok((metadata.mode() & 0o111) != 0),
            Ok(Err(e)) | Err(e) => Err(ConfigErrors::MetadataNotFound(e)),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Invalid range: {0}")]
    InvalidRange(String),
    #[error("Scheduler not supported: {0}")]
    UnsupportedScheduler(String),
    #[error("File not found: {0:?}")]
    FileNotFound(PathBuf),
    #[error("Metadata not found")]
    MetadataNotFound(#[from] Error),
    #[error("Failed to read config {path:?}: {source}")]
    Read { path: PathBuf, source: Error },
    #[error("Failed to parse config")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid input glob")]
    InvalidGlob(#[from] globset::Error),
    #[error("No acceptable input file in {0:?}")]
    NoInputs(PathBuf),
    #[error("Config is missing {0}")]
    Missing(&'static str),
    #[error(transparent)]
    Card(#[from] TemplateError),
    #[error("Card sets {field} to {value:?}, expected a number")]
    CardValue { field: &'static str, value: String },
    #[error("Preflight checks failed with {0} error(s)")]
    PreflightFailed(usize),
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct SubmitConfig {
    // Event generation fanned out over seeds and an optional parameter scan
    #[serde(default)]
    pub generator: Option<GeneratorConfig>,
    // Detector simulation over a directory of generated files
    #[serde(default)]
    pub delphes: Option<DelphesConfig>,
    // MG5_aMC event generation driven by a command card
    #[serde(default)]
    pub mg5: Option<Mg5Config>,

    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    // Directory that receives the DAG, status and log files
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct GeneratorConfig {
    pub card: PathBuf,
    pub executable: PathBuf,
    pub jobs: JobRange,
    #[serde(default)]
    pub scan: Option<ScanRange>,
    // centre of mass energy in TeV, `--energy` in `args` takes precedence
    #[serde(default)]
    pub energy: Option<u32>,
    // shorthand for adding bare `--hepmc`/`--lhe`/`--root` flags to `args`
    #[serde(default)]
    pub formats: Vec<OutputFormat>,
    // passed to the generator as is, after the managed flags have been applied
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_generator_template")]
    pub template: PathBuf,
    // generated from the store settings if not given
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DelphesInput {
    Hepmc,
    Lhe,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct DelphesConfig {
    pub card: PathBuf,
    pub input_dir: PathBuf,
    // fixes the Delphes executable, otherwise picked per input file
    #[serde(default, rename = "type")]
    pub input_type: Option<DelphesInput>,
    // defaults to <input_dir>/../delphes/<card stem>
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default = "default_files_per_job")]
    pub files_per_job: usize,
    // tarball of the Delphes installation, unpacked on the worker
    pub installation: String,
    #[serde(default = "default_delphes_template")]
    pub template: PathBuf,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct Mg5Config {
    // command card, its `output` names the channel and `ebeam1` the energy
    pub card: PathBuf,
    pub jobs: JobRange,
    // written to the card as `nevents`, otherwise the card's own value is used
    #[serde(default)]
    pub events: Option<u64>,
    // tarball of the MG5_aMC installation, unpacked on the worker
    pub installation: String,
    // launcher inside the unpacked installation
    #[serde(default = "default_mg5_executable")]
    pub executable: String,
    // further card fields set for every job, e.g. `pythia8_path`
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default = "default_generator_template")]
    pub template: PathBuf,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

/// What an MG5_aMC card decides about its own run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mg5Process {
    pub channel: String,
    pub energy: u32,
    pub events: u64,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    // paths below this prefix live on the distributed store
    #[serde(default = "default_store_prefix")]
    pub prefix: PathBuf,
    // client binary used for store transfers
    #[serde(default = "default_transport")]
    pub transport: PathBuf,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_project")]
    pub project: String,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    // Name of the selected scheduler, see Schedulers::load for the selection proccess
    #[serde(default = "default_scheduler")]
    pub name: String,
    #[serde(default = "default_submit")]
    pub submit: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            prefix: default_store_prefix(),
            transport: default_transport(),
            user: default_user(),
            project: default_project(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: default_scheduler(),
            submit: default_submit(),
        }
    }
}

impl StoreConfig {
    /// user scoped project area on the store
    pub fn user_area(&self) -> PathBuf {
        self.prefix
            .join("user")
            .join(&self.user)
            .join(&self.project)
    }

    pub fn is_store_path(&self, path: &Path) -> bool {
        path.starts_with(&self.prefix)
    }
}

impl SubmitConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let file = File::open(path).map_err(|source| ConfigErrors::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(serde_yaml::from_reader(file)?)
    }

    /// Check everything that can be checked before a single job is built.
    ///
    /// Every problem is logged, so users can fix them in one go.
    pub fn preflight_checks(&self) -> Result<(), ConfigErrors> {
        let mut errors = 0;

        let configured = [
            self.generator.is_some(),
            self.delphes.is_some(),
            self.mg5.is_some(),
        ]
        .into_iter()
        .filter(|&configured| configured)
        .count();

        match configured {
            0 => {
                error!("None of `generator`, `delphes` or `mg5` is configured, nothing to submit");
                errors += 1;
            }
            1 => {}
            _ => {
                error!("Only one of `generator`, `delphes` and `mg5` can be submitted at a time");
                errors += 1;
            }
        }

        if let Some(generator) = &self.generator {
            errors += generator.preflight_checks();
        }

        if let Some(delphes) = &self.delphes {
            errors += delphes.preflight_checks(&self.store);
        }

        if let Some(mg5) = &self.mg5 {
            errors += mg5.preflight_checks(&self.store);
        }

        errors += check_bare_path("workdir", &self.workdir);

        if !self.store.prefix.is_absolute() {
            error!(
                "store.prefix must be an absolute path, got {}",
                self.store.prefix.to_string_lossy()
            );
            errors += 1;
        }

        if self.store.user.is_empty() {
            error!("store.user is empty and neither LOGNAME nor USER is set");
            errors += 1;
        }

        if self.workdir.is_file() {
            error!(
                "workdir {} already exists as a file",
                self.workdir.to_string_lossy()
            );
            errors += 1;
        }

        if errors == 0 {
            Ok(())
        } else {
            Err(ConfigErrors::PreflightFailed(errors))
        }
    }
}

/// DAGMan reads node templates and status files as bare paths
fn check_bare_path(field: &str, path: &Path) -> usize {
    if path.to_string_lossy().contains(char::is_whitespace) {
        error!(
            "{field} {} contains whitespace, which job graphs cannot refer to",
            path.to_string_lossy()
        );
        1
    } else {
        0
    }
}

/// log a problem with a file that has to exist, returns the number of errors
fn check_file(field: &str, path: &Path) -> usize {
    if path.is_file() {
        0
    } else {
        error!(
            "Failed to find {field}. Either not a file or not found at {}",
            path.to_string_lossy()
        );
        1
    }
}

impl GeneratorConfig {
    fn preflight_checks(&self) -> usize {
        let mut errors = check_file("generator.card", &self.card);

        match check_executable(&self.executable) {
            Ok(true) => {}
            Ok(false) => {
                error!(
                    "generator.executable {} is not executable",
                    self.executable.to_string_lossy()
                );
                errors += 1;
            }
            Err(e) => {
                error!(
                    "Failed to determine if generator.executable ({}) is an executable: {e}",
                    self.executable.to_string_lossy()
                );
                errors += 1;
            }
        }

        if let Err(e) = self.jobs.validate() {
            error!("generator.jobs: {e}");
            errors += 1;
        }

        if let Some(scan) = &self.scan {
            if let Err(e) = scan.validate() {
                error!("generator.scan: {e}");
                errors += 1;
            }

            if self.args.iter().any(|arg| *arg == scan.flag()) {
                warn!(
                    "generator.args contains {}, it will be overridden by the scan",
                    scan.flag()
                );
            }
        }

        match (self.args_energy(), self.energy) {
            (Some(Err(e)), _) => {
                error!("generator.args: {ENERGY_FLAG} must be a whole number of TeV ({e})");
                errors += 1;
            }
            (Some(Ok(from_args)), Some(energy)) if from_args != energy => {
                error!("generator.energy is {energy} but generator.args sets {ENERGY_FLAG} {from_args}");
                errors += 1;
            }
            _ => {}
        }

        errors += check_file("generator.template", &self.template);
        errors += check_bare_path("generator.template", &self.template);
        errors += check_bare_path("generator.card", Path::new(&self.channel()));

        if self.card.parent().map_or(true, |parent| parent.as_os_str().is_empty()) {
            error!("generator.card must live inside a cards directory, which is staged to every job");
            errors += 1;
        }

        errors
    }

    /// generator channel, the card file name without extension
    pub fn channel(&self) -> String {
        file_stem(&self.card)
    }

    /// Energy the generator runs at: `--energy` in `args`, then `energy`,
    /// then 13 TeV
    pub fn energy(&self) -> u32 {
        match self.args_energy() {
            Some(Ok(energy)) => energy,
            _ => self.energy.unwrap_or_else(default_energy),
        }
    }

    fn args_energy(&self) -> Option<Result<u32, ParseIntError>> {
        ParameterMap::from_args(&self.args)
            .value_of(&[ENERGY_FLAG])
            .map(str::parse)
    }
}

impl DelphesConfig {
    fn preflight_checks(&self, store: &StoreConfig) -> usize {
        let mut errors = check_file("delphes.card", &self.card);

        if !self.input_dir.is_dir() {
            error!(
                "delphes.input_dir {} is not a directory",
                self.input_dir.to_string_lossy()
            );
            errors += 1;
        }

        if self.files_per_job == 0 {
            error!("delphes.files_per_job must be at least 1");
            errors += 1;
        }

        let installation = Path::new(&self.installation);
        if !store.is_store_path(installation) {
            errors += check_file("delphes.installation", installation);
        }

        errors += check_file("delphes.template", &self.template);
        errors += check_bare_path("delphes.template", &self.template);
        errors += check_bare_path("delphes.card", Path::new(&file_stem(&self.card)));

        if self.card.parent().map_or(true, |parent| parent.as_os_str().is_empty()) {
            error!("delphes.card must live inside a cards directory, which is staged to every job");
            errors += 1;
        }

        errors
    }

    pub fn card_name(&self) -> String {
        self.card
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl Mg5Config {
    fn preflight_checks(&self, store: &StoreConfig) -> usize {
        let mut errors = check_file("mg5.card", &self.card);

        if self.card.parent().map_or(true, |parent| parent.as_os_str().is_empty()) {
            error!("mg5.card must live inside a cards directory, which is staged to every job");
            errors += 1;
        }

        if let Err(e) = self.jobs.validate() {
            error!("mg5.jobs: {e}");
            errors += 1;
        }

        if self.events == Some(0) {
            error!("mg5.events must be at least 1");
            errors += 1;
        }

        let installation = Path::new(&self.installation);
        if !store.is_store_path(installation) {
            errors += check_file("mg5.installation", installation);
        }

        let executable = Path::new(&self.executable);
        if executable.is_absolute() || escapes(executable) {
            error!(
                "mg5.executable {} must be a path inside the unpacked installation",
                self.executable
            );
            errors += 1;
        }

        errors += check_file("mg5.template", &self.template);
        errors += check_bare_path("mg5.template", &self.template);

        if self.card.is_file() {
            match self.process() {
                Ok(process) => {
                    errors += check_bare_path("mg5.card output", Path::new(&process.channel))
                }
                Err(e) => {
                    error!("mg5.card: {e}");
                    errors += 1;
                }
            }

            // every job edits the same fields, the first one stands for all
            let card = fs::read_to_string(&self.card).unwrap_or_default();
            if let Err(e) = substitute(&card, &self.job_fields(self.jobs.start)) {
                error!("mg5.card cannot be set up per job: {e}");
                errors += 1;
            }
        }

        errors
    }

    pub fn card_name(&self) -> String {
        self.card
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Card fields written for the job with `index`
    pub fn job_fields(&self, index: u64) -> BTreeMap<String, String> {
        let mut fields = self.fields.clone();
        if let Some(events) = self.events {
            fields.insert(EVENTS_FIELD.to_string(), events.to_string());
        }
        fields.insert(SEED_FIELD.to_string(), index.to_string());

        fields
    }

    /// Read the channel, the energy and the number of events from the card
    pub fn process(&self) -> Result<Mg5Process, ConfigErrors> {
        let card = fs::read_to_string(&self.card).map_err(|source| TemplateError::Read {
            path: self.card.clone(),
            source,
        })?;
        let field = |key: &'static str| {
            read_field(&card, key)
                .and_then(|value| value.split_whitespace().next())
                .ok_or_else(|| TemplateError::MissingKey(key.to_string()))
        };

        let channel = field("output")?.to_string();

        let ebeam = field("ebeam1")?;
        let energy = ebeam
            .parse::<f64>()
            .map_err(|_| ConfigErrors::CardValue {
                field: "ebeam1",
                value: ebeam.to_string(),
            })?;

        let events = match self.events {
            Some(events) => events,
            None => {
                let events = field(EVENTS_FIELD)?;
                events.parse().map_err(|_| ConfigErrors::CardValue {
                    field: EVENTS_FIELD,
                    value: events.to_string(),
                })?
            }
        };

        Ok(Mg5Process {
            channel,
            // two beams, GeV to TeV
            energy: (energy * 2.0 / 1000.0).round() as u32,
            events,
        })
    }
}

pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn default_workdir() -> PathBuf {
    PathBuf::from(".")
}

fn default_energy() -> u32 {
    13
}

fn default_mg5_executable() -> String {
    "MG5_aMC_v2_3_3/bin/mg5_aMC".to_string()
}

fn default_files_per_job() -> usize {
    2
}

fn default_generator_template() -> PathBuf {
    PathBuf::from("HTCondor/mcJob.condor")
}

fn default_delphes_template() -> PathBuf {
    PathBuf::from("HTCondor/runDelphes.condor")
}

fn default_store_prefix() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_PREFIX)
}

fn default_transport() -> PathBuf {
    PathBuf::from(DEFAULT_TRANSPORT)
}

fn default_user() -> String {
    env::var("LOGNAME")
        .or_else(|_| env::var("USER"))
        .unwrap_or_default()
}

fn default_project() -> String {
    "NMSSMPheno".to_string()
}

fn default_scheduler() -> String {
    "condor".to_string()
}

fn default_submit() -> PathBuf {
    PathBuf::from("condor_submit_dag")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs, os::unix::fs::PermissionsExt};
    use tempfile::TempDir;

    fn setup() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("input_cards")).unwrap();
        fs::create_dir_all(dir.path().join("HTCondor")).unwrap();
        fs::write(dir.path().join("input_cards/ggh.cmnd"), "Main:numberOfEvents = 10\n").unwrap();
        fs::write(dir.path().join("HTCondor/mcJob.condor"), "queue\n").unwrap();

        let exe = dir.path().join("generateMC.exe");
        fs::write(&exe, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();

        dir
    }

    fn config_yaml(dir: &Path, body: &str) -> SubmitConfig {
        let yaml = body.replace("$DIR", &dir.to_string_lossy());

        serde_yaml::from_str(&yaml).unwrap()
    }

    #[test]
    fn minimal_generator_config() {
        let dir = setup();
        let config = config_yaml(
            dir.path(),
            "
generator:
  card: $DIR/input_cards/ggh.cmnd
  executable: $DIR/generateMC.exe
  template: $DIR/HTCondor/mcJob.condor
  jobs: { start: 1, end: 3 }
store:
  user: someone
",
        );

        let generator = config.generator.as_ref().unwrap();
        assert_eq!(generator.energy(), 13);
        assert_eq!(generator.channel(), "ggh");
        assert_eq!(config.store.prefix, PathBuf::from("/hdfs"));
        assert_eq!(config.scheduler.name, "condor");
        assert!(config.preflight_checks().is_ok());
    }

    #[test]
    fn conflicting_energies_fail_preflight() {
        let dir = setup();
        let mut config = config_yaml(
            dir.path(),
            "
generator:
  card: $DIR/input_cards/ggh.cmnd
  executable: $DIR/generateMC.exe
  template: $DIR/HTCondor/mcJob.condor
  jobs: { start: 1, end: 3 }
  energy: 8
  args: [--energy, '13']
store:
  user: someone
",
        );

        assert!(matches!(
            config.preflight_checks(),
            Err(ConfigErrors::PreflightFailed(1))
        ));

        let generator = config.generator.as_mut().unwrap();
        generator.energy = None;
        assert_eq!(generator.energy(), 13);
        assert!(config.preflight_checks().is_ok());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = serde_yaml::from_str::<SubmitConfig>("generators: {}\n");

        assert!(result.is_err());
    }

    #[test]
    fn preflight_counts_every_problem() {
        let dir = setup();
        let config = config_yaml(
            dir.path(),
            "
generator:
  card: $DIR/input_cards/missing.cmnd
  executable: $DIR/input_cards/ggh.cmnd
  template: $DIR/HTCondor/mcJob.condor
  jobs: { start: 0, end: 3 }
  scan: { start: 8.0, stop: 4.0, step: 1.0 }
store:
  user: someone
",
        );

        // missing card, non-executable exe, bad job range, bad scan
        assert!(matches!(
            config.preflight_checks(),
            Err(ConfigErrors::PreflightFailed(4))
        ));
    }

    #[test]
    fn nothing_to_submit() {
        let config = serde_yaml::from_str::<SubmitConfig>("store: { user: someone }\n").unwrap();

        assert!(matches!(
            config.preflight_checks(),
            Err(ConfigErrors::PreflightFailed(1))
        ));
    }

    #[test]
    fn executable_bit_is_checked() {
        let dir = setup();

        assert!(check_executable(&dir.path().join("generateMC.exe")).unwrap());
        assert!(!check_executable(&dir.path().join("input_cards/ggh.cmnd")).unwrap());
        assert!(matches!(
            check_executable(&dir.path().join("nope")),
            Err(ConfigErrors::FileNotFound(_))
        ));
    }

    #[test]
    fn whitespace_in_graph_paths_fails_preflight() {
        let dir = setup();
        let config = config_yaml(
            dir.path(),
            "
generator:
  card: $DIR/input_cards/ggh.cmnd
  executable: $DIR/generateMC.exe
  template: $DIR/HTCondor/mcJob.condor
  jobs: { start: 1, end: 3 }
store:
  user: someone
workdir: $DIR/my runs
",
        );

        assert!(matches!(
            config.preflight_checks(),
            Err(ConfigErrors::PreflightFailed(1))
        ));
    }

    fn mg5_config(dir: &Path, card: &str, extra: &str) -> SubmitConfig {
        fs::write(dir.join("input_cards/run.txt"), card).unwrap();
        fs::write(dir.join("MG5_aMC.tgz"), "tar").unwrap();

        config_yaml(
            dir,
            &format!(
                "
mg5:
  card: $DIR/input_cards/run.txt
  installation: $DIR/MG5_aMC.tgz
  template: $DIR/HTCondor/mcJob.condor
  jobs: {{ start: 1, end: 10 }}
{extra}store:
  user: someone
"
            ),
        )
    }

    const MG5_CARD: &str = "import model sm\n\
output ggh_4tau -nojpeg\n\
launch\n\
set run_card ebeam1 6500.0\n\
set run_card nevents 200\n\
set run_card iseed 0\n";

    #[test]
    fn mg5_card_decides_channel_energy_and_events() {
        let dir = setup();
        let config = mg5_config(dir.path(), MG5_CARD, "");
        let mg5 = config.mg5.as_ref().unwrap();

        assert!(config.preflight_checks().is_ok());
        assert_eq!(
            mg5.process().unwrap(),
            Mg5Process {
                channel: "ggh_4tau".to_string(),
                energy: 13,
                events: 200,
            }
        );
        assert_eq!(mg5.executable, "MG5_aMC_v2_3_3/bin/mg5_aMC");
    }

    #[test]
    fn mg5_events_and_fields_go_into_every_card() {
        let dir = setup();
        let config = mg5_config(
            dir.path(),
            MG5_CARD,
            "  events: 5000\n  fields: { pythia8_path: /opt/pythia8 }\n",
        );
        let mg5 = config.mg5.as_ref().unwrap();

        assert_eq!(mg5.process().unwrap().events, 5000);
        assert_eq!(
            mg5.job_fields(7),
            BTreeMap::from([
                ("iseed".to_string(), "7".to_string()),
                ("nevents".to_string(), "5000".to_string()),
                ("pythia8_path".to_string(), "/opt/pythia8".to_string()),
            ])
        );
        // the card has no pythia8_path line to rewrite
        assert!(matches!(
            config.preflight_checks(),
            Err(ConfigErrors::PreflightFailed(1))
        ));
    }

    #[test]
    fn mg5_card_needs_a_numeric_beam_energy() {
        let dir = setup();
        let config = mg5_config(
            dir.path(),
            &MG5_CARD.replace("6500.0", "lots"),
            "",
        );

        assert!(matches!(
            config.mg5.as_ref().unwrap().process(),
            Err(ConfigErrors::CardValue { field: "ebeam1", .. })
        ));
        assert!(config.preflight_checks().is_err());
    }

    #[test]
    fn only_one_workflow_per_submission() {
        let dir = setup();
        let mut config = mg5_config(dir.path(), MG5_CARD, "");
        config.generator = config_yaml(
            dir.path(),
            "
generator:
  card: $DIR/input_cards/ggh.cmnd
  executable: $DIR/generateMC.exe
  template: $DIR/HTCondor/mcJob.condor
  jobs: { start: 1, end: 3 }
",
        )
        .generator;

        assert!(matches!(
            config.preflight_checks(),
            Err(ConfigErrors::PreflightFailed(1))
        ));
    }
}
