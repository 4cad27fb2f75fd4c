use crate::PostProcessConfig;
use crate::filename::{GroupToken, StoredFilename};
use std::future::Future;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Environment variable carrying the batch's grouping token.
pub const GROUP_ENV: &str = "IMAGEDROP_GROUP";
/// Environment variable carrying the batch's stored filenames, one per line.
pub const FILES_ENV: &str = "IMAGEDROP_FILES";

#[derive(Debug, Error)]
pub enum PostProcessError {
    #[error("Failed to launch {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },

    #[error("Process timed out after {0:?}")]
    TimedOut(Duration),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// What a single post-processing run operates on.
#[derive(Debug, Clone)]
pub struct PostProcessJob {
    /// Directory that actually holds the batch's files
    pub target: PathBuf,
    pub group: Option<GroupToken>,
    pub files: Vec<StoredFilename>,
}

/// Launches the configured external command after an upload batch.
#[derive(Debug, Clone)]
pub struct PostProcessor {
    command: Option<Vec<String>>,
    timeout: Duration,
}

impl PostProcessor {
    pub fn new(config: &PostProcessConfig) -> Self {
        let command = config
            .command
            .clone()
            .filter(|command| command.first().is_some_and(|program| !program.is_empty()));

        Self {
            command,
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
        }
    }

    pub fn disabled() -> Self {
        Self {
            command: None,
            timeout: Duration::from_secs(1),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.command.is_some()
    }

    /// Hand the job off and return immediately. The returned handle may be
    /// dropped; the outcome is only ever logged.
    pub fn trigger(&self, job: PostProcessJob) -> Option<JoinHandle<()>> {
        let Some(command) = self.command.clone() else {
            debug!("Post-processing disabled, skipping {:?}", job.target);
            return None;
        };

        info!(
            "Triggering post-processing for {} file(s) in {:?}",
            job.files.len(),
            job.target
        );
        let timeout = self.timeout;
        Some(spawn_detached("post-process", run(command, timeout, job)))
    }
}

/// Spawn `task` without awaiting it. Success and failure are reported to the log under `label`.
pub fn spawn_detached<F>(label: &'static str, task: F) -> JoinHandle<()>
where
    F: Future<Output = Result<(), PostProcessError>> + Send + 'static,
{
    tokio::spawn(async move {
        match task.await {
            Ok(()) => info!("{} finished", label),
            Err(e) => error!("{} failed: {}", label, e),
        }
    })
}

async fn run(
    command: Vec<String>,
    timeout: Duration,
    job: PostProcessJob,
) -> Result<(), PostProcessError> {
    let Some((program, args)) = command.split_first() else {
        return Ok(());
    };

    let files = job
        .files
        .iter()
        .map(StoredFilename::as_str)
        .collect::<Vec<_>>()
        .join("\n");

    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args)
        .arg(&job.target)
        .env(FILES_ENV, files)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(group) = &job.group {
        cmd.env(GROUP_ENV, group.as_str());
    }

    let child = cmd.spawn().map_err(|source| PostProcessError::SpawnFailed {
        program: program.clone(),
        source,
    })?;

    // Dropping the wait future on timeout kills the child via kill_on_drop
    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| PostProcessError::TimedOut(timeout))??;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        debug!("post-process stdout: {}", stdout.trim());
    }

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.is_empty() {
            warn!("post-process exited with {} and no stderr", output.status);
        }
        Err(PostProcessError::Failed {
            status: output.status,
            stderr,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn job(target: PathBuf) -> PostProcessJob {
        PostProcessJob {
            target,
            group: Some(GroupToken::parse("session42").unwrap()),
            files: vec![
                StoredFilename::parse("a.png").unwrap(),
                StoredFilename::parse("b.jpg").unwrap(),
            ],
        }
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_run_passes_target_and_environment() {
        let temp_dir = TempDir::new().unwrap();
        // With `sh -c`, the appended target directory becomes $0
        let script = r#"printf '%s|%s' "$IMAGEDROP_GROUP" "$IMAGEDROP_FILES" > "$0/out.txt""#;

        run(sh(script), Duration::from_secs(10), job(temp_dir.path().to_path_buf()))
            .await
            .unwrap();

        let written = std::fs::read_to_string(temp_dir.path().join("out.txt")).unwrap();
        assert_eq!(written, "session42|a.png\nb.jpg");
    }

    #[tokio::test]
    async fn test_run_reports_failure_status() {
        let temp_dir = TempDir::new().unwrap();
        let result = run(
            sh("echo broken >&2; exit 3"),
            Duration::from_secs(10),
            job(temp_dir.path().to_path_buf()),
        )
        .await;

        match result {
            Err(PostProcessError::Failed { status, stderr }) => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr, "broken");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let temp_dir = TempDir::new().unwrap();
        let result = run(
            sh("sleep 5"),
            Duration::from_millis(100),
            job(temp_dir.path().to_path_buf()),
        )
        .await;
        assert!(matches!(result, Err(PostProcessError::TimedOut(_))));
    }

    #[tokio::test]
    async fn test_run_missing_program() {
        let temp_dir = TempDir::new().unwrap();
        let result = run(
            vec!["/nonexistent/imagedrop-post-process".to_string()],
            Duration::from_secs(1),
            job(temp_dir.path().to_path_buf()),
        )
        .await;
        assert!(matches!(result, Err(PostProcessError::SpawnFailed { .. })));
    }

    #[tokio::test]
    async fn test_trigger_is_detached_and_logs_failure() {
        let temp_dir = TempDir::new().unwrap();
        let processor = PostProcessor::new(&PostProcessConfig {
            command: Some(vec!["/nonexistent/imagedrop-post-process".to_string()]),
            timeout_secs: 1,
        });

        let handle = processor
            .trigger(job(temp_dir.path().to_path_buf()))
            .expect("enabled processor returns a handle");
        // The failure is swallowed by the detached task
        handle.await.unwrap();
    }

    #[test]
    fn test_empty_command_disables() {
        let processor = PostProcessor::new(&PostProcessConfig {
            command: Some(vec![]),
            timeout_secs: 1,
        });
        assert!(!processor.is_enabled());
        assert!(!PostProcessor::disabled().is_enabled());
        assert!(!PostProcessor::new(&PostProcessConfig::default()).is_enabled());
    }
}
