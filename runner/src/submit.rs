/*
 * Submission of a configured workflow:
 * 1. Preflight checks on the whole config, nothing is written if they fail
 * 2. Build the job descriptors and one job graph per batch
 *    (a generator batch per scanned value, a single MG5_aMC or detector
 *    simulation batch)
 * 3. Write the graph files and create the log directories
 * 4. Unless this is a dry run: stage cards and executables next to the outputs
 *    and hand every graph to the scheduler
 */

use crate::{
    collector::InputCollector,
    config::{
        file_stem, DelphesConfig, GeneratorConfig, Mg5Config, Mg5Process, StoreConfig,
        SubmitConfig,
    },
    dag::{DagWriter, JobGraph},
    error::RunnerError,
    job::{check_destinations, DelphesJobs, GeneratorJobs, Mg5Jobs, CARDS_DIR},
    jobspace::JobSpace,
    naming::format_value,
    schedulers::Schedulers,
    staging::{Stager, StorageBackend},
};
use chrono::NaiveDateTime;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// day level directory shared by every submission of one day, e.g. `05_Oct_15`
pub fn date_dir(now: &NaiveDateTime) -> String {
    now.format("%d_%b_%y").to_string()
}

fn time_stamp(now: &NaiveDateTime) -> String {
    now.format("%H%M%S").to_string()
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// A job graph together with the files it is written to
#[derive(Clone, Debug)]
pub struct Submission {
    pub dag: PathBuf,
    pub status: PathBuf,
    pub graph: JobGraph,
}

impl Submission {
    /// write the graph file and make sure the scheduler can write its logs
    pub fn write(&self) -> Result<(), RunnerError> {
        let log_dir = self.graph.log_dir();
        fs::create_dir_all(log_dir).map_err(|source| RunnerError::CreateDir {
            path: log_dir.to_path_buf(),
            source,
        })?;

        self.graph.write(&self.dag)?;

        Ok(())
    }
}

/// Generator jobs over seeds and an optional scan
#[derive(Debug)]
pub struct GeneratorBatch<'a> {
    config: &'a GeneratorConfig,
    store: &'a StoreConfig,
    workdir: &'a Path,
    now: NaiveDateTime,
}

impl<'a> GeneratorBatch<'a> {
    pub fn new(
        config: &'a GeneratorConfig,
        store: &'a StoreConfig,
        workdir: &'a Path,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            config,
            store,
            workdir,
            now,
        }
    }

    fn energy_dir(&self) -> PathBuf {
        PathBuf::from(format!("{}TeV", self.config.energy()))
            .join(self.config.channel())
            .join(date_dir(&self.now))
    }

    /// local directory holding the graph and status files
    pub fn subdir(&self) -> PathBuf {
        self.workdir.join(self.energy_dir())
    }

    pub fn output_dir(&self) -> String {
        match &self.config.output {
            Some(output) => output.clone(),
            None => path_string(&self.store.user_area().join(self.energy_dir())),
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        self.config
            .log_dir
            .clone()
            .unwrap_or_else(|| self.subdir().join("logs"))
    }

    /// One submission per scanned value, so node names stay unique per graph
    #[instrument(level = "debug", skip(self), fields(channel = %self.config.channel()))]
    pub fn build(&self) -> Result<Vec<Submission>, RunnerError> {
        let space = JobSpace::new(self.config.jobs, self.config.scan.as_ref())?;
        let output = self.output_dir();
        let jobs = GeneratorJobs::new(self.config, output.clone());
        let channel = self.config.channel();
        let time = time_stamp(&self.now);
        let subdir = self.subdir();

        let mut submissions = Vec::new();
        let mut all = Vec::new();

        for value in space.values() {
            let descriptors = jobs.descriptors(space.points_for(*value))?;
            let stem = match value {
                Some(value) => format!("ma{}_{time}", format_value(*value)),
                None => format!("{channel}_{time}"),
            };

            let status = subdir.join(format!("{stem}.status"));
            let graph = DagWriter::new(&self.config.template, &status)
                .with_log(self.log_dir(), &stem)
                .with_comment(format!("DAG for channel {channel}"))
                .with_comment(format!("Outputting to {output}"))
                .with_store(self.store)
                .build(&channel, &descriptors)?;

            submissions.push(Submission {
                dag: subdir.join(format!("{stem}.dag")),
                status,
                graph,
            });
            all.extend(descriptors);
        }

        check_destinations(&all)?;
        info!(
            "Built {} jobs in {} graph(s) for channel {channel}",
            all.len(),
            submissions.len()
        );

        Ok(submissions)
    }

    /// Put the card directory and the executable next to the outputs, where
    /// every job copies them in from
    pub fn stage<B: StorageBackend>(&self, stager: &Stager<B>) -> Result<(), RunnerError> {
        let output = self.output_dir();
        let cards = self.config.card.parent().unwrap_or_else(|| Path::new("."));
        let executable = self
            .config
            .executable
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        stager.copy_out(&path_string(cards), &format!("{output}/{CARDS_DIR}"))?;
        stager.copy_out(
            &path_string(&self.config.executable),
            &format!("{output}/{executable}"),
        )?;

        Ok(())
    }
}

/// Detector simulation over every acceptable file of an input directory
#[derive(Debug)]
pub struct DelphesBatch<'a> {
    config: &'a DelphesConfig,
    store: &'a StoreConfig,
    workdir: &'a Path,
    now: NaiveDateTime,
}

impl<'a> DelphesBatch<'a> {
    pub fn new(
        config: &'a DelphesConfig,
        store: &'a StoreConfig,
        workdir: &'a Path,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            config,
            store,
            workdir,
            now,
        }
    }

    pub fn subdir(&self) -> PathBuf {
        self.workdir
            .join(file_stem(&self.config.card))
            .join(date_dir(&self.now))
    }

    /// defaults to `<input_dir>/../delphes/<card stem>`
    pub fn output_dir(&self) -> String {
        match &self.config.output {
            Some(output) => output.clone(),
            None => {
                let parent = self
                    .config
                    .input_dir
                    .parent()
                    .unwrap_or_else(|| Path::new("/"));
                path_string(&parent.join("delphes").join(file_stem(&self.config.card)))
            }
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        self.config
            .log_dir
            .clone()
            .unwrap_or_else(|| self.subdir().join("logs"))
    }

    #[instrument(level = "debug", skip(self), fields(card = %self.config.card_name()))]
    pub fn build(&self) -> Result<Vec<Submission>, RunnerError> {
        let inputs = InputCollector::collect(&self.config.input_dir)?;
        let batches = inputs.batches(self.config.files_per_job);
        let output = self.output_dir();
        let descriptors = DelphesJobs::new(self.config, output.clone()).descriptors(&batches)?;
        let stem = time_stamp(&self.now);
        let card = self.config.card_name();

        let subdir = self.subdir();
        let status = subdir.join(format!("{stem}.status"));

        let graph = DagWriter::new(&self.config.template, &status)
            .with_log(self.log_dir(), &stem)
            .with_comment(format!("DAG for card {card}"))
            .with_comment(format!("Outputting to {output}"))
            .with_store(self.store)
            .build(&card, &descriptors)?;

        info!(
            "Built {} jobs over {} input files for card {card}",
            descriptors.len(),
            inputs.paths().len()
        );

        Ok(vec![Submission {
            dag: subdir.join(format!("{stem}.dag")),
            status,
            graph,
        }])
    }

    pub fn stage<B: StorageBackend>(&self, stager: &Stager<B>) -> Result<(), RunnerError> {
        let cards = self.config.card.parent().unwrap_or_else(|| Path::new("."));

        stager.copy_out(
            &path_string(cards),
            &format!("{}/{CARDS_DIR}", self.output_dir()),
        )?;

        Ok(())
    }
}

/// MG5_aMC jobs over a range of seeds, all from one command card
#[derive(Debug)]
pub struct Mg5Batch<'a> {
    config: &'a Mg5Config,
    process: Mg5Process,
    store: &'a StoreConfig,
    workdir: &'a Path,
    now: NaiveDateTime,
}

impl<'a> Mg5Batch<'a> {
    /// reads the channel and energy from the card
    pub fn new(
        config: &'a Mg5Config,
        store: &'a StoreConfig,
        workdir: &'a Path,
        now: NaiveDateTime,
    ) -> Result<Self, RunnerError> {
        Ok(Self {
            config,
            process: config.process()?,
            store,
            workdir,
            now,
        })
    }

    pub fn process(&self) -> &Mg5Process {
        &self.process
    }

    fn energy_dir(&self) -> PathBuf {
        PathBuf::from(format!("{}TeV", self.process.energy))
            .join(&self.process.channel)
            .join(date_dir(&self.now))
    }

    pub fn subdir(&self) -> PathBuf {
        self.workdir.join(self.energy_dir())
    }

    /// defaults to `<user area>/MG5_aMC/<energy>TeV/<channel>/<date>`
    pub fn output_dir(&self) -> String {
        match &self.config.output {
            Some(output) => output.clone(),
            None => path_string(
                &self
                    .store
                    .user_area()
                    .join("MG5_aMC")
                    .join(self.energy_dir()),
            ),
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        self.config
            .log_dir
            .clone()
            .unwrap_or_else(|| self.subdir().join("logs"))
    }

    #[instrument(level = "debug", skip(self), fields(channel = %self.process.channel))]
    pub fn build(&self) -> Result<Vec<Submission>, RunnerError> {
        let output = self.output_dir();
        let descriptors =
            Mg5Jobs::new(self.config, &self.process, output.clone()).descriptors(self.config.jobs)?;
        let channel = &self.process.channel;
        let stem = time_stamp(&self.now);

        let subdir = self.subdir();
        let status = subdir.join(format!("{stem}.status"));

        let graph = DagWriter::new(&self.config.template, &status)
            .with_log(self.log_dir(), &stem)
            .with_comment(format!("DAG for channel {channel}"))
            .with_comment(format!("Outputting to {output}"))
            .with_store(self.store)
            .build(channel, &descriptors)?;

        info!("Built {} MG5_aMC jobs for channel {channel}", descriptors.len());

        Ok(vec![Submission {
            dag: subdir.join(format!("{stem}.dag")),
            status,
            graph,
        }])
    }

    pub fn stage<B: StorageBackend>(&self, stager: &Stager<B>) -> Result<(), RunnerError> {
        let cards = self.config.card.parent().unwrap_or_else(|| Path::new("."));

        stager.copy_out(
            &path_string(cards),
            &format!("{}/{CARDS_DIR}", self.output_dir()),
        )?;

        Ok(())
    }
}

/// Run a whole submission and return what was written
pub fn submit<B: StorageBackend>(
    config: &SubmitConfig,
    scheduler: &Schedulers,
    stager: &Stager<B>,
    now: NaiveDateTime,
) -> Result<Vec<Submission>, RunnerError> {
    config.preflight_checks()?;
    debug!("Preflight checks passed");

    let mut submissions = Vec::new();

    if let Some(generator) = &config.generator {
        let batch = GeneratorBatch::new(generator, &config.store, &config.workdir, now);
        let built = batch.build()?;
        write_all(&built)?;

        if !scheduler.is_dry() {
            batch.stage(stager)?;
        }
        submissions.extend(built);
    }

    if let Some(delphes) = &config.delphes {
        let batch = DelphesBatch::new(delphes, &config.store, &config.workdir, now);
        let built = batch.build()?;
        write_all(&built)?;

        if !scheduler.is_dry() {
            batch.stage(stager)?;
        }
        submissions.extend(built);
    }

    if let Some(mg5) = &config.mg5 {
        let batch = Mg5Batch::new(mg5, &config.store, &config.workdir, now)?;
        let built = batch.build()?;
        write_all(&built)?;

        if !scheduler.is_dry() {
            batch.stage(stager)?;
        }
        submissions.extend(built);
    }

    for submission in &submissions {
        scheduler.submit(&submission.dag, &submission.status)?;
    }

    Ok(submissions)
}

fn write_all(submissions: &[Submission]) -> Result<(), RunnerError> {
    for submission in submissions {
        submission.write()?;
        info!(
            "Condor log files written to: {}",
            submission.graph.log_dir().to_string_lossy()
        );
    }

    Ok(())
}
