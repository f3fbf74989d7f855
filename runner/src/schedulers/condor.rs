use super::SchedulerError;
use crate::config::SchedulerConfig;
use std::{
    path::{Path, PathBuf},
    process::{Command, Stdio},
};
use tracing::{debug, info, instrument};

/// Hands job graphs to HTCondor's DAGMan through its submit client
#[derive(Clone, Debug)]
pub struct CondorScheduler {
    submit: PathBuf,
}

impl CondorScheduler {
    pub fn load(config: &SchedulerConfig) -> Self {
        Self {
            submit: config.submit.clone(),
        }
    }

    #[instrument(level = "debug", skip(self))]
    pub fn submit(&self, dag: &Path, status: &Path) -> Result<(), SchedulerError> {
        let program = self.submit.to_string_lossy().into_owned();

        let output = Command::new(&self.submit)
            .arg(dag)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| SchedulerError::Spawn {
                program: program.clone(),
                source,
            })?;

        debug!("{}", String::from_utf8_lossy(&output.stdout).trim());

        if !output.status.success() {
            return Err(SchedulerError::Rejected {
                program,
                dag: dag.to_path_buf(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        info!("Check status with:");
        info!("DAGstatus.py {}", status.to_string_lossy());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scheduler(submit: &str) -> CondorScheduler {
        CondorScheduler::load(&SchedulerConfig {
            name: "condor".to_string(),
            submit: PathBuf::from(submit),
        })
    }

    #[test]
    fn accepted_submission() {
        let dir = tempfile::tempdir().unwrap();
        let dag = dir.path().join("a.dag");
        fs::write(&dag, "JOB 1_a t.condor\n").unwrap();

        assert!(scheduler("true").submit(&dag, Path::new("a.status")).is_ok());
    }

    #[test]
    fn rejected_submission() {
        let result = scheduler("false").submit(Path::new("a.dag"), Path::new("a.status"));

        assert!(matches!(result, Err(SchedulerError::Rejected { .. })));
    }

    #[test]
    fn missing_client() {
        let result = scheduler("/no/such/condor_submit_dag")
            .submit(Path::new("a.dag"), Path::new("a.status"));

        assert!(matches!(result, Err(SchedulerError::Spawn { .. })));
    }
}
