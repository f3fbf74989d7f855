use crate::{
    card::TemplateError, config::ConfigErrors, dag::DagError, naming::NamingError,
    schedulers::SchedulerError, staging::StagingError, worker::WorkerError,
};
use std::{io, path::PathBuf};
use thiserror::Error;

/// Everything that can end a run of the binary
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigErrors),
    #[error(transparent)]
    Naming(#[from] NamingError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Dag(#[from] DagError),
    #[error(transparent)]
    Staging(#[from] StagingError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Worker(#[from] WorkerError),
    #[error("Failed to create {path:?}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("Failed to determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),
}
