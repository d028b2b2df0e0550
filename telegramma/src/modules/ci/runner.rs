//! CI job runner.

use super::CiJob;
use crate::config::CiConfig;
use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, error};

/// Errors raised while running a CI job.
#[derive(Debug, Error)]
pub enum CiRunError {
    /// No script is configured.
    #[error("no CI script configured")]
    NotConfigured,

    /// The script could not be started.
    #[error("failed to start CI script: {0}")]
    Spawn(#[source] std::io::Error),

    /// The script exited unsuccessfully.
    #[error("{0}")]
    Exit(String),
}

/// Runs CI jobs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CiRunner: Send + Sync {
    /// Builds the job's project, returning once the build finished.
    async fn run(&self, job: &CiJob) -> Result<(), CiRunError>;
}

/// Runs the configured script as `<script> <project> [arguments...]`.
#[derive(Debug, Clone)]
pub struct ProcessCiRunner {
    config: CiConfig,
}

impl ProcessCiRunner {
    /// Creates a runner from the `ci` module configuration.
    #[must_use]
    pub fn new(config: CiConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl CiRunner for ProcessCiRunner {
    async fn run(&self, job: &CiJob) -> Result<(), CiRunError> {
        let script = self.config.script().map_err(|_| CiRunError::NotConfigured)?;

        let mut command = Command::new(script);
        command.arg(&job.project).args(&job.args).kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }

        let output = command.output().await.map_err(CiRunError::Spawn)?;
        if output.status.success() {
            debug!(project = %job.project, "CI script succeeded");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        error!(
            project = %job.project,
            status = %output.status,
            stderr = %stderr.trim_end(),
            "CI script failed"
        );
        Err(CiRunError::Exit(output.status.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatId;
    use std::path::PathBuf;

    fn job(project: &str) -> CiJob {
        CiJob {
            project: project.to_string(),
            args: vec!["--clean".to_string()],
            chat: ChatId::new("42"),
            message_id: 7,
        }
    }

    fn runner(script: &str) -> ProcessCiRunner {
        ProcessCiRunner::new(CiConfig {
            script: Some(PathBuf::from(script)),
            working_dir: None,
        })
    }

    #[tokio::test]
    async fn test_successful_script() {
        runner("true").run(&job("twrp")).await.unwrap();
    }

    #[tokio::test]
    async fn test_failing_script_reports_status() {
        let err = runner("false").run(&job("twrp")).await.unwrap_err();
        match err {
            CiRunError::Exit(status) => assert!(status.contains('1')),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_script() {
        let err = runner("/nonexistent/ci.sh").run(&job("twrp")).await.unwrap_err();
        assert!(matches!(err, CiRunError::Spawn(_)));

        let err = ProcessCiRunner::new(CiConfig::default())
            .run(&job("twrp"))
            .await
            .unwrap_err();
        assert!(matches!(err, CiRunError::NotConfigured));
    }
}
