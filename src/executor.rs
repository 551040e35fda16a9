//! Automation-runner client and the bounded submit-and-poll loop.
//!
//! Submitting a drain is fire-and-forget on the runner side; this module
//! owns the job for exactly one submit-and-poll cycle, reducing per-host
//! task results into a single verdict. A timed-out orchestration leaves the
//! external job running and must be read as "unknown outcome", not rolled
//! back.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("runner request failed: {0}")]
    Transport(String),
    #[error("runner did not start a job: {0}")]
    NotStarted(String),
    #[error("unexpected runner response: {0}")]
    Payload(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Successful,
    Failed,
}

impl JobStatus {
    /// A status the runner will not transition away from.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Successful | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task: String,
    pub passed: bool,
    #[serde(default)]
    pub output: String,
}

/// Per-host task results, keyed by host name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutput {
    pub output: BTreeMap<String, Vec<TaskResult>>,
}

/// One observation of a job, as submitted or polled.
#[derive(Debug, Clone, Deserialize)]
pub struct JobState {
    #[serde(default)]
    pub id: Option<u64>,
    pub status: JobStatus,
    #[serde(default)]
    pub result: Option<JobOutput>,
}

/// The drain/undrain action handed to the runner.
#[derive(Debug, Clone)]
pub struct ActionParams {
    pub device: String,
    pub interface: String,
    pub dry_run: bool,
    pub undrain: bool,
}

/// Final verdict of one orchestration cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub job_id: u64,
    pub passed: bool,
    pub message: String,
}

#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn submit(&self, params: &ActionParams) -> Result<JobState, ExecutorError>;
    async fn poll(&self, job_id: u64) -> Result<JobState, ExecutorError>;
}

/// HTTP client for the automation runner's task API.
pub struct RunnerClient {
    base_url: String,
    token: String,
    project: String,
    http: Client,
}

impl RunnerClient {
    pub fn new(base_url: &str, token: &str, project: &str) -> Result<Self, ExecutorError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ExecutorError::Transport(format!("building HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            project: project.to_string(),
            http,
        })
    }

    /// Action params merged with the runner's fixed submission vars.
    fn submission_body(&self, params: &ActionParams) -> serde_json::Value {
        json!({
            "interface": params.interface,
            "dry_run": params.dry_run,
            "undrain": params.undrain,
            "limit": params.device,
            "project": self.project,
            "vars_file": "shared/variables.yaml",
            "default_vars_file": "shared/defaults.yaml",
            "use_vault_creds": true,
        })
    }
}

#[async_trait]
impl JobExecutor for RunnerClient {
    async fn submit(&self, params: &ActionParams) -> Result<JobState, ExecutorError> {
        let url = format!("{}/tasks/", self.base_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&self.submission_body(params))
            .send()
            .await
            .map_err(|e| ExecutorError::Transport(format!("POST {url}: {e}")))?;
        if !resp.status().is_success() {
            return Err(ExecutorError::Transport(format!(
                "{url} returned {}",
                resp.status()
            )));
        }
        resp.json::<JobState>()
            .await
            .map_err(|e| ExecutorError::Payload(format!("parsing response from {url}: {e}")))
    }

    async fn poll(&self, job_id: u64) -> Result<JobState, ExecutorError> {
        let url = format!("{}/tasks/?job_id={}", self.base_url, job_id);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ExecutorError::Transport(format!("GET {url}: {e}")))?;
        if !resp.status().is_success() {
            return Err(ExecutorError::Transport(format!(
                "{url} returned {}",
                resp.status()
            )));
        }
        resp.json::<JobState>()
            .await
            .map_err(|e| ExecutorError::Payload(format!("parsing response from {url}: {e}")))
    }
}

/// Outcome of the polling phase.
enum Poll {
    Terminal(JobState),
    TimedOut,
}

pub struct JobOrchestrator<'a> {
    executor: &'a dyn JobExecutor,
    poll_interval: Duration,
    max_wait: Duration,
}

impl<'a> JobOrchestrator<'a> {
    pub fn new(executor: &'a dyn JobExecutor, poll_interval: Duration, max_wait: Duration) -> Self {
        Self {
            executor,
            poll_interval,
            max_wait,
        }
    }

    /// Submit an action and wait for a terminal status under the deadline.
    ///
    /// Submission failure is a hard error. Once a job id exists, every
    /// other outcome (timeout included) comes back as a `JobResult` so the
    /// id is never lost.
    pub async fn submit_and_await(
        &self,
        params: &ActionParams,
    ) -> Result<JobResult, ExecutorError> {
        let submitted = self.executor.submit(params).await?;
        let job_id = submitted
            .id
            .ok_or_else(|| ExecutorError::NotStarted("runner returned no job id".to_string()))?;
        info!(job_id, device = %params.device, interface = %params.interface, "job submitted");

        if submitted.status.is_terminal() {
            return Ok(reduce(job_id, submitted));
        }
        match self.poll_until_terminal(job_id).await {
            Poll::Terminal(state) => Ok(reduce(job_id, state)),
            Poll::TimedOut => Ok(JobResult {
                job_id,
                passed: false,
                message: format!("Timed out waiting for job {job_id} to finish"),
            }),
        }
    }

    /// Poll until a terminal status or the deadline. Poll errors are logged
    /// and retried on the next interval; only the deadline stops the loop.
    async fn poll_until_terminal(&self, job_id: u64) -> Poll {
        let start = Instant::now();
        while start.elapsed() < self.max_wait {
            sleep(self.poll_interval).await;
            match self.executor.poll(job_id).await {
                Ok(state) if state.status.is_terminal() => return Poll::Terminal(state),
                Ok(state) => {
                    debug!(job_id, status = ?state.status, "job still running");
                }
                Err(e) => {
                    warn!(job_id, error = %e, "job poll failed, will retry");
                }
            }
        }
        Poll::TimedOut
    }
}

/// Flatten per-host task results into one verdict.
fn reduce(job_id: u64, state: JobState) -> JobResult {
    let Some(out) = state.result else {
        return JobResult {
            job_id,
            passed: false,
            message: "Failed to run task".to_string(),
        };
    };
    let mut messages = Vec::new();
    let mut passed = true;
    for (host, results) in &out.output {
        for task in results {
            if !task.passed {
                messages.push(format!(
                    "Task {} on host {} failed with output {}",
                    task.task, host, task.output
                ));
                passed = false;
            }
        }
    }
    // A failed job that reported no failing task still must not pass.
    if passed && state.status == JobStatus::Failed {
        passed = false;
        messages.push(format!("Job {job_id} finished with status failed"));
    }
    JobResult {
        job_id,
        passed,
        message: messages.join("\n"),
    }
}
