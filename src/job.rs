//! One migration run: its inputs, progress and log.
//!
//! A `Job` is shared between the worker that drives it and any number of
//! callers polling it, so all mutable state sits behind one mutex. The lock
//! is never held across an `.await`.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::importer::ImportResult;

/// What the caller supplies to start a job.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub source: PathBuf,
    /// Owning role; `<database>_user` when absent.
    pub role: Option<String>,
    pub role_password: String,
    pub server: ServerConfig,
    /// Where artifacts are written.
    pub working_dir: PathBuf,
}

impl JobSpec {
    pub fn new(
        source: impl Into<PathBuf>,
        role_password: impl Into<String>,
        server: ServerConfig,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source: source.into(),
            role: None,
            role_password: role_password.into(),
            server,
            working_dir: working_dir.into(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}

/// Pipeline position. Each phase is entered once, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Created,
    RegistryBuilt,
    SchemaTransformed,
    Provisioned,
    SchemaLoaded,
    RowsLoaded,
    Finished,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Created => "created",
            Phase::RegistryBuilt => "registry-built",
            Phase::SchemaTransformed => "schema-transformed",
            Phase::Provisioned => "provisioned",
            Phase::SchemaLoaded => "schema-loaded",
            Phase::RowsLoaded => "rows-loaded",
            Phase::Finished => "finished",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => f.write_str("INFO"),
            LogLevel::Warn => f.write_str("WARN"),
            LogLevel::Error => f.write_str("ERROR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.at.format("%Y-%m-%d %H:%M:%S"),
            self.level,
            self.message
        )
    }
}

/// Terminal states are `Succeeded`, `Failed` and `Crashed`; the first one
/// recorded wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum JobState {
    Running,
    Succeeded,
    /// The pipeline returned a fatal error.
    Failed { reason: String },
    /// The worker panicked or vanished without reporting.
    Crashed { reason: String },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Running)
    }
}

/// Snapshot returned to pollers.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub id: Uuid,
    pub state: JobState,
    pub phase: Phase,
    /// True only after the last table was attempted.
    pub finished: bool,
    pub log: String,
}

#[derive(Debug)]
struct JobInner {
    phase: Phase,
    state: JobState,
    log: Vec<LogEntry>,
    result: Option<ImportResult>,
    ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct Job {
    id: Uuid,
    created_at: DateTime<Utc>,
    inner: Mutex<JobInner>,
    /// Flips to `true` once, when the job reaches a terminal state.
    ended: watch::Sender<bool>,
}

impl Default for Job {
    fn default() -> Self {
        Self::new()
    }
}

impl Job {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            inner: Mutex::new(JobInner {
                phase: Phase::Created,
                state: JobState::Running,
                log: Vec::new(),
                result: None,
                ended_at: None,
            }),
            ended: watch::Sender::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn lock(&self) -> MutexGuard<'_, JobInner> {
        // A poisoned lock only means a writer panicked; the log is still
        // worth reading.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append to the job log and mirror the line to tracing.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info => info!(job = %self.id, "{message}"),
            LogLevel::Warn => warn!(job = %self.id, "{message}"),
            LogLevel::Error => error!(job = %self.id, "{message}"),
        }
        self.lock().log.push(LogEntry {
            at: Utc::now(),
            level,
            message,
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    pub fn advance(&self, phase: Phase) {
        let mut inner = self.lock();
        debug_assert!(phase >= inner.phase, "phase moved backwards");
        inner.phase = phase;
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub fn state(&self) -> JobState {
        self.lock().state.clone()
    }

    pub fn is_terminal(&self) -> bool {
        self.lock().state.is_terminal()
    }

    /// The completion flag: set only by a successful run.
    pub fn is_finished(&self) -> bool {
        let inner = self.lock();
        inner.state == JobState::Succeeded && inner.phase == Phase::Finished
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.lock().ended_at
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().log.clone()
    }

    /// Entries after the first `seen`, for incremental polling.
    pub fn entries_since(&self, seen: usize) -> Vec<LogEntry> {
        self.lock().log.iter().skip(seen).cloned().collect()
    }

    pub fn log_text(&self) -> String {
        render(&self.lock().log)
    }

    pub fn status(&self) -> JobStatus {
        let inner = self.lock();
        JobStatus {
            id: self.id,
            state: inner.state.clone(),
            phase: inner.phase,
            finished: inner.state == JobState::Succeeded && inner.phase == Phase::Finished,
            log: render(&inner.log),
        }
    }

    /// Available once the job has succeeded.
    pub fn result(&self) -> Option<ImportResult> {
        self.lock().result.clone()
    }

    /// Resolves once the job has succeeded, failed or crashed.
    pub async fn ended(&self) {
        let mut ended = self.ended.subscribe();
        // The sender lives as long as `self`, so this cannot see a closed channel.
        let _ = ended.wait_for(|done| *done).await;
    }

    fn end(&self, state: JobState, result: Option<ImportResult>) -> bool {
        {
            let mut inner = self.lock();
            if inner.state.is_terminal() {
                return false;
            }
            if state == JobState::Succeeded {
                inner.phase = Phase::Finished;
            }
            inner.state = state;
            inner.result = result;
            inner.ended_at = Some(Utc::now());
        }
        self.ended.send_replace(true);
        true
    }

    pub fn succeed(&self, result: ImportResult) -> bool {
        self.end(JobState::Succeeded, Some(result))
    }

    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.end(JobState::Failed { reason: reason.into() }, None)
    }

    pub fn crash(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        error!(job = %self.id, %reason, "import worker crashed");
        self.end(JobState::Crashed { reason }, None)
    }
}

fn render(log: &[LogEntry]) -> String {
    let mut text = String::new();
    for entry in log {
        text.push_str(&entry.to_string());
        text.push('\n');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> ImportResult {
        ImportResult {
            database: "sales".into(),
            role: "sales_user".into(),
            schema: Default::default(),
            tables: Vec::new(),
            log: String::new(),
        }
    }

    #[test]
    fn test_new_job_is_running() {
        let job = Job::new();
        let status = job.status();
        assert_eq!(status.state, JobState::Running);
        assert_eq!(status.phase, Phase::Created);
        assert!(!status.finished);
        assert!(job.result().is_none());
    }

    #[test]
    fn test_log_text_keeps_order() {
        let job = Job::new();
        job.info("first");
        job.warn("second");
        job.error("third");

        let text = job.log_text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("[INFO] first"));
        assert!(lines[1].ends_with("[WARN] second"));
        assert!(lines[2].ends_with("[ERROR] third"));
        assert_eq!(job.entries_since(2).len(), 1);
    }

    #[test]
    fn test_success_sets_finished() {
        let job = Job::new();
        job.advance(Phase::RowsLoaded);
        assert!(job.succeed(result()));
        assert!(job.is_finished());
        assert_eq!(job.phase(), Phase::Finished);
        assert!(job.result().is_some());
        assert!(job.ended_at().is_some());
    }

    #[test]
    fn test_failure_is_not_finished_and_keeps_log() {
        let job = Job::new();
        job.info("Reading source");
        job.advance(Phase::RegistryBuilt);
        assert!(job.fail("cannot connect"));

        let status = job.status();
        assert!(!status.finished);
        assert_eq!(status.phase, Phase::RegistryBuilt);
        assert_eq!(status.state, JobState::Failed { reason: "cannot connect".into() });
        assert!(status.log.contains("Reading source"));
        assert!(job.result().is_none());
    }

    #[test]
    fn test_first_terminal_state_wins() {
        let job = Job::new();
        assert!(job.fail("boom"));
        assert!(!job.crash("later"));
        assert!(matches!(job.state(), JobState::Failed { .. }));
    }

    #[tokio::test]
    async fn test_ended_wakes_waiters() {
        let job = std::sync::Arc::new(Job::new());
        let waiter = {
            let job = std::sync::Arc::clone(&job);
            tokio::spawn(async move {
                job.ended().await;
                job.state()
            })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        job.crash("worker vanished");
        let state = tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("waiter woke up")
            .unwrap();
        assert_eq!(state, JobState::Crashed { reason: "worker vanished".into() });

        // already ended: returns at once
        job.ended().await;
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::SchemaTransformed.to_string(), "schema-transformed");
        assert!(Phase::Provisioned < Phase::SchemaLoaded);
    }
}
