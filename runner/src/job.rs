//! Job descriptors and the builders that fan a configuration out into them.
//!
//! A descriptor carries everything the worker of one graph node needs: the
//! index that seeds the job, the final tool arguments and the staging plan.
//! Builders only produce descriptors, writing them out is up to the dag module.

use crate::{
    config::{DelphesConfig, DelphesInput, GeneratorConfig, Mg5Config, Mg5Process, ENERGY_FLAG},
    jobspace::{JobPoint, JobRange},
    naming::{ensure_unique, qualify, NamingError, NamingPolicy, OutputFormat},
    params::ParameterMap,
    staging::{util::output_stem, StagingPair},
    worker::{WorkerPlan, DELPHES_HEPMC, DELPHES_LHEF},
};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// name of the card directory inside every sandbox
pub const CARDS_DIR: &str = "input_cards";
/// name of the generator executable inside every sandbox
pub const STAGED_EXECUTABLE: &str = "mc.exe";
/// name of the detector simulation installation inside every sandbox
pub const INSTALLATION_ARCHIVE: &str = "delphes.tgz";
/// name of the MG5_aMC installation inside every sandbox
pub const MG5_ARCHIVE: &str = "MG5_aMC.tgz";

/// files MG5_aMC leaves in `<channel>/Events/run_01`, with the format and
/// the output subdirectory they end up in
const MG5_EVENTS: [(&str, OutputFormat, &str); 2] = [
    ("events.lhe.gz", OutputFormat::Lhe, "lhe"),
    ("events_PYTHIA8_0.hepmc.gz", OutputFormat::Hepmc, "hepmc"),
];

const EVENT_FLAGS: [&str; 2] = ["--number", "-n"];
const SEED_FLAG: &str = "--seed";
const CARD_FLAG: &str = "--card";

#[derive(Clone, Debug, PartialEq)]
pub struct JobDescriptor {
    pub index: u64,
    pub value: Option<f64>,
    pub parameters: ParameterMap,
    pub inputs: Vec<StagingPair>,
    pub outputs: Vec<StagingPair>,
    pub unpack: Vec<String>,
    pub executable: Option<String>,
    pub card: Option<String>,
    // card fields the worker sets before running
    pub fields: BTreeMap<String, String>,
    pub process: Vec<StagingPair>,
    pub rename: Vec<StagingPair>,
}

impl JobDescriptor {
    pub fn new(index: u64, value: Option<f64>) -> Self {
        Self {
            index,
            value,
            parameters: ParameterMap::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            unpack: Vec::new(),
            executable: None,
            card: None,
            fields: BTreeMap::new(),
            process: Vec::new(),
            rename: Vec::new(),
        }
    }

    /// graph node name, stable for a given index and label
    pub fn node_name(&self, label: &str) -> String {
        format!("{}_{label}", self.index)
    }

    /// every destination this job writes to
    pub fn destinations(&self) -> impl Iterator<Item = &str> {
        self.outputs
            .iter()
            .chain(self.process.iter())
            .map(|pair| pair.destination.as_str())
    }

    pub fn plan(&self) -> WorkerPlan {
        WorkerPlan {
            copy_in: self.inputs.clone(),
            unpack: self.unpack.clone(),
            exe: self.executable.clone(),
            card: self.card.clone(),
            set: self.fields.clone(),
            process: self.process.clone(),
            rename: self.rename.clone(),
            copy_out: self.outputs.clone(),
            args: self.parameters.to_args(),
            ..Default::default()
        }
    }
}

/// Fail if any two descriptors share a destination
pub fn check_destinations(descriptors: &[JobDescriptor]) -> Result<(), NamingError> {
    ensure_unique(descriptors.iter().flat_map(|descriptor| {
        descriptor
            .destinations()
            .map(move |destination| (descriptor.index, destination))
    }))
}

fn join(dir: &str, name: &str) -> String {
    format!("{}/{name}", dir.trim_end_matches('/'))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Builds generator jobs, one per `(index, value)` point
#[derive(Clone, Debug)]
pub struct GeneratorJobs {
    base: ParameterMap,
    scan_flag: Option<String>,
    // a value fixed in the arguments names the outputs when nothing is scanned
    fixed_value: Option<f64>,
    card: String,
    executable: String,
    policy: NamingPolicy,
    output_dir: String,
}

impl GeneratorJobs {
    pub fn new(config: &GeneratorConfig, output_dir: impl Into<String>) -> Self {
        let mut base = ParameterMap::from_args(&config.args);
        for format in &config.formats {
            base = base.with_switch(&format.flag());
        }
        if !OutputFormat::ALL
            .iter()
            .any(|format| base.contains(&format.flag()))
        {
            base = base.with_switch(&OutputFormat::Hepmc.flag());
        }

        // the tool and the output names see the same energy
        let energy = config.energy();
        base = base.with_override(ENERGY_FLAG, energy.to_string());

        let events = match base.value_of(&EVENT_FLAGS).map(str::parse::<u64>) {
            Some(Ok(events)) => events,
            Some(Err(e)) => {
                warn!("Number of events is not a number ({e}) - assuming 1");
                1
            }
            None => {
                warn!("Number of events not specified - assuming 1");
                1
            }
        };

        let scan_flag = config.scan.as_ref().map(|scan| scan.flag());
        let fixed_value = match &scan_flag {
            Some(_) => None,
            None => base
                .get("--mass")
                .flatten()
                .and_then(|value| value.parse().ok()),
        };

        Self {
            base,
            scan_flag,
            fixed_value,
            card: file_name(&config.card),
            executable: file_name(&config.executable),
            policy: NamingPolicy::new(config.channel(), energy, events),
            output_dir: output_dir.into(),
        }
    }

    pub fn policy(&self) -> &NamingPolicy {
        &self.policy
    }

    pub fn descriptor(&self, point: JobPoint) -> Result<JobDescriptor, NamingError> {
        let JobPoint { index, value } = point;
        let naming_value = value.or(self.fixed_value);

        let mut parameters = self
            .base
            .with_override(CARD_FLAG, format!("{CARDS_DIR}/{}", self.card));
        if let (Some(flag), Some(value)) = (&self.scan_flag, value) {
            // full precision for the tool, names use the rounded form
            parameters = parameters.with_override(flag, value.to_string());
        }
        parameters = parameters.with_override(SEED_FLAG, index.to_string());

        let mut outputs = Vec::new();
        for format in OutputFormat::ALL {
            let flag = format.flag();
            let name = match parameters.get(&flag) {
                None => continue,
                Some(Some(requested)) => qualify(requested, index, format)?,
                Some(None) => self.policy.name(naming_value, index, format),
            };

            parameters = parameters.with_override(&flag, name.clone());
            outputs.push(StagingPair::new(name.clone(), join(&self.output_dir, &name)));
        }

        let mut descriptor = JobDescriptor::new(index, value);
        descriptor.parameters = parameters;
        descriptor.inputs = vec![
            StagingPair::new(join(&self.output_dir, CARDS_DIR), CARDS_DIR),
            StagingPair::new(join(&self.output_dir, &self.executable), STAGED_EXECUTABLE),
        ];
        descriptor.outputs = outputs;
        descriptor.executable = Some(STAGED_EXECUTABLE.to_string());

        Ok(descriptor)
    }

    /// Descriptors for `points`, checked for colliding destinations
    pub fn descriptors<I>(&self, points: I) -> Result<Vec<JobDescriptor>, NamingError>
    where
        I: IntoIterator<Item = JobPoint>,
    {
        let descriptors = points
            .into_iter()
            .map(|point| self.descriptor(point))
            .collect::<Result<Vec<_>, _>>()?;

        check_destinations(&descriptors)?;
        debug!("Built {} generator jobs", descriptors.len());

        Ok(descriptors)
    }
}

/// Builds detector simulation jobs over batches of input files
#[derive(Clone, Debug)]
pub struct DelphesJobs {
    card: String,
    executable: Option<&'static str>,
    installation: String,
    output_dir: String,
}

impl DelphesJobs {
    pub fn new(config: &DelphesConfig, output_dir: impl Into<String>) -> Self {
        Self {
            card: config.card_name(),
            executable: config.input_type.map(|input| match input {
                DelphesInput::Hepmc => DELPHES_HEPMC,
                DelphesInput::Lhe => DELPHES_LHEF,
            }),
            installation: config.installation.clone(),
            output_dir: output_dir.into(),
        }
    }

    /// each input is processed into `<output>/<stem>.root`
    pub fn descriptor(&self, index: u64, inputs: &[PathBuf]) -> JobDescriptor {
        let mut descriptor = JobDescriptor::new(index, None);

        descriptor.inputs = vec![
            StagingPair::new(self.installation.clone(), INSTALLATION_ARCHIVE),
            StagingPair::new(join(&self.output_dir, CARDS_DIR), CARDS_DIR),
        ];
        descriptor.unpack = vec![INSTALLATION_ARCHIVE.to_string()];
        descriptor.executable = self.executable.map(str::to_string);
        descriptor.card = Some(format!("{CARDS_DIR}/{}", self.card));
        descriptor.process = inputs
            .iter()
            .map(|input| {
                let output = format!("{}.root", output_stem(input));
                StagingPair::new(input.to_string_lossy(), join(&self.output_dir, &output))
            })
            .collect();

        descriptor
    }

    /// One descriptor per batch, indexed from 0
    pub fn descriptors(&self, batches: &[Vec<PathBuf>]) -> Result<Vec<JobDescriptor>, NamingError> {
        let descriptors = batches
            .iter()
            .enumerate()
            .map(|(index, batch)| self.descriptor(index as u64, batch))
            .collect::<Vec<_>>();

        check_destinations(&descriptors)?;
        debug!("Built {} detector simulation jobs", descriptors.len());

        Ok(descriptors)
    }
}

/// Builds MG5_aMC jobs, one per index, all running the same command card
#[derive(Clone, Debug)]
pub struct Mg5Jobs {
    config: Mg5Config,
    policy: NamingPolicy,
    output_dir: String,
}

impl Mg5Jobs {
    pub fn new(config: &Mg5Config, process: &Mg5Process, output_dir: impl Into<String>) -> Self {
        Self {
            config: config.clone(),
            policy: NamingPolicy::new(&process.channel, process.energy, process.events),
            output_dir: output_dir.into(),
        }
    }

    pub fn policy(&self) -> &NamingPolicy {
        &self.policy
    }

    /// the job's card gets `iseed` set to the index, its events are renamed
    /// after the channel and copied to `<output>/lhe` and `<output>/hepmc`
    pub fn descriptor(&self, index: u64) -> JobDescriptor {
        let card = format!("{CARDS_DIR}/{}", self.config.card_name());
        let events_dir = format!("{}/Events/run_01", self.policy.channel);

        let mut descriptor = JobDescriptor::new(index, None);
        descriptor.inputs = vec![
            StagingPair::new(self.config.installation.clone(), MG5_ARCHIVE),
            StagingPair::new(join(&self.output_dir, CARDS_DIR), CARDS_DIR),
        ];
        descriptor.unpack = vec![MG5_ARCHIVE.to_string()];
        descriptor.executable = Some(self.config.executable.clone());
        descriptor.parameters = ParameterMap::from_args([card.clone()]);
        descriptor.card = Some(card);
        descriptor.fields = self.config.job_fields(index);

        for (produced, format, subdir) in MG5_EVENTS {
            let name = format!("{}.gz", self.policy.name(None, index, format));
            descriptor
                .rename
                .push(StagingPair::new(format!("{events_dir}/{produced}"), name.clone()));
            descriptor.outputs.push(StagingPair::new(
                name.clone(),
                join(&join(&self.output_dir, subdir), &name),
            ));
        }

        descriptor
    }

    pub fn descriptors(&self, range: JobRange) -> Result<Vec<JobDescriptor>, NamingError> {
        let descriptors = (range.start..=range.end)
            .map(|index| self.descriptor(index))
            .collect::<Vec<_>>();

        check_destinations(&descriptors)?;
        debug!("Built {} MG5_aMC jobs", descriptors.len());

        Ok(descriptors)
    }
}
