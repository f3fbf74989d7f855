mod condor;

pub use condor::CondorScheduler;

use crate::config::{ConfigErrors, SchedulerConfig};
use std::{
    io,
    path::{Path, PathBuf},
    process::ExitStatus,
};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Failed to run {program}: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("{program} rejected {dag:?} ({status}): {stderr}")]
    Rejected {
        program: String,
        dag: PathBuf,
        status: ExitStatus,
        stderr: String,
    },
}

/// Where finished job graphs are handed off to
#[derive(Clone, Debug)]
pub enum Schedulers {
    Condor(CondorScheduler),
    Dry,
}

impl Schedulers {
    /// Select the scheduler named in the config, `dry` overrides the choice
    pub fn load(config: &SchedulerConfig, dry: bool) -> Result<Self, ConfigErrors> {
        if dry {
            return Ok(Self::Dry);
        }

        match config.name.as_str() {
            "condor" => Ok(Self::Condor(CondorScheduler::load(config))),
            "dry" => Ok(Self::Dry),
            _ => Err(ConfigErrors::UnsupportedScheduler(config.name.clone())),
        }
    }

    pub fn is_dry(&self) -> bool {
        matches!(self, Self::Dry)
    }

    pub fn submit(&self, dag: &Path, status: &Path) -> Result<(), SchedulerError> {
        match self {
            Self::Condor(scheduler) => scheduler.submit(dag, status),
            Self::Dry => {
                warn!("Dry run - not submitting {}", dag.to_string_lossy());
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection() {
        let mut config = SchedulerConfig::default();

        assert!(matches!(Schedulers::load(&config, false), Ok(Schedulers::Condor(_))));
        assert!(Schedulers::load(&config, true).unwrap().is_dry());

        config.name = "dry".to_string();
        assert!(Schedulers::load(&config, false).unwrap().is_dry());

        config.name = "slurm".to_string();
        assert!(matches!(
            Schedulers::load(&config, false),
            Err(ConfigErrors::UnsupportedScheduler(name)) if name == "slurm"
        ));
    }

    #[test]
    fn dry_submits_nothing() {
        assert!(Schedulers::Dry
            .submit(Path::new("/missing/a.dag"), Path::new("/missing/a.status"))
            .is_ok());
    }
}
