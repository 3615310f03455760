//! Process Supervisor: one lifecycle state machine per workspace, driving a
//! dependency install then a long-running dev server and capturing both
//! output streams into the Log Bus (§4.4).
//!
//! Per-workspace transitions are serialized by a `tokio::sync::Mutex` held
//! for the duration of `start`/`stop`, so two overlapping requests for the
//! same workspace never race past the IDLE check.

use crate::config::ProcessConfig;
use crate::error::{AppError, AppResult};
use crate::logbus::{LogBus, LogEvent};
use crate::ports::PortAllocator;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;

/// Marker file a workspace must carry before a dev server can be started.
const PROJECT_MARKER: &str = "package.json";
/// Directory whose presence means dependencies are already installed.
const DEPENDENCY_DIR: &str = "node_modules";
const INSTALL_COMMAND: (&str, &[&str]) = ("npm", &["install"]);
const DEV_COMMAND: (&str, &[&str]) = ("npm", &["run", "dev"]);
/// Env var carrying the allocated port into the child, alongside `--port`.
const PORT_ENV_VAR: &str = "PORT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Idle,
    Preparing,
    Starting,
    Running,
    Failed,
    Stopped,
}

struct Lease {
    state: ProcessState,
    port: Option<u16>,
    child: Option<tokio::process::Child>,
}

impl Default for Lease {
    fn default() -> Self {
        Self {
            state: ProcessState::Idle,
            port: None,
            child: None,
        }
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct Status {
    pub running: bool,
    pub port: Option<u16>,
}

pub struct ProcessSupervisor {
    config: ProcessConfig,
    ports: Arc<PortAllocator>,
    log_bus: LogBus,
    leases: Mutex<HashMap<i64, Arc<Mutex<Lease>>>>,
}

impl ProcessSupervisor {
    pub fn new(config: ProcessConfig, ports: Arc<PortAllocator>, log_bus: LogBus) -> Self {
        Self {
            config,
            ports,
            log_bus,
            leases: Mutex::new(HashMap::new()),
        }
    }

    async fn lease_for(&self, app_id: i64) -> Arc<Mutex<Lease>> {
        let mut leases = self.leases.lock().await;
        leases.entry(app_id).or_default().clone()
    }

    pub async fn status(&self, app_id: i64) -> Status {
        let lease = self.lease_for(app_id).await;
        let lease = lease.lock().await;
        Status {
            running: lease.state == ProcessState::Running,
            port: lease.port,
        }
    }

    /// Start the workspace's dev server. Returns the allocated port.
    ///
    /// If already RUNNING, returns the existing port. If mid-transition,
    /// fails — the caller is expected to retry, not to race a fresh start.
    pub async fn start(&self, app_id: i64, workspace_root: PathBuf) -> AppResult<u16> {
        let lease_handle = self.lease_for(app_id).await;
        let mut lease = lease_handle.lock().await;

        match lease.state {
            ProcessState::Running => {
                return lease
                    .port
                    .ok_or_else(|| AppError::Internal(anyhow::anyhow!("running with no port")));
            }
            ProcessState::Preparing | ProcessState::Starting => {
                return Err(AppError::Conflict("workspace is already starting".to_string()));
            }
            ProcessState::Idle | ProcessState::Failed | ProcessState::Stopped => {}
        }

        if !workspace_root.join(PROJECT_MARKER).exists() {
            lease.state = ProcessState::Failed;
            return Err(AppError::Validation("workspace is not initialized".to_string()));
        }

        lease.state = ProcessState::Preparing;

        if !workspace_root.join(DEPENDENCY_DIR).exists() {
            self.log_bus
                .publish(app_id, LogEvent::new("installing dependencies", false))
                .await;

            let install = self.run_to_completion(
                app_id,
                &workspace_root,
                INSTALL_COMMAND.0,
                INSTALL_COMMAND.1,
                None,
                self.config.install_timeout,
            )
            .await;

            match install {
                Ok(true) => {}
                Ok(false) => {
                    lease.state = ProcessState::Failed;
                    self.log_bus
                        .publish(app_id, LogEvent::new("dependency install failed", true))
                        .await;
                    return Err(AppError::Upstream("dependency install failed".to_string()));
                }
                Err(err) => {
                    lease.state = ProcessState::Failed;
                    return Err(err);
                }
            }
        }

        lease.state = ProcessState::Starting;

        let port = self.ports.acquire()?;

        let spawned = Command::new(DEV_COMMAND.0)
            .args(DEV_COMMAND.1)
            .arg("--port")
            .arg(port.to_string())
            .env(PORT_ENV_VAR, port.to_string())
            .current_dir(&workspace_root)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(err) => {
                self.ports.release(port);
                lease.state = ProcessState::Failed;
                return Err(AppError::Internal(anyhow::anyhow!(err)));
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        self.spawn_log_readers(app_id, stdout, stderr);

        lease.port = Some(port);
        lease.child = Some(child);
        lease.state = ProcessState::Running;

        self.log_bus.publish(app_id, LogEvent::new("running", false)).await;

        self.spawn_exit_watcher(app_id, lease_handle.clone());

        Ok(port)
    }

    /// Idempotent: returns `false` if the workspace was not running.
    pub async fn stop(&self, app_id: i64) -> bool {
        let lease_handle = self.lease_for(app_id).await;
        let mut lease = lease_handle.lock().await;

        if lease.state != ProcessState::Running {
            return false;
        }

        if let Some(mut child) = lease.child.take() {
            if let Some(pid) = child.id() {
                let _ = nix::sys::signal::kill(
                    nix::unistd::Pid::from_raw(pid as i32),
                    nix::sys::signal::Signal::SIGTERM,
                );
            }

            let graceful = tokio::time::timeout(self.config.stop_grace_period, child.wait()).await;
            if graceful.is_err() {
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
        }

        if let Some(port) = lease.port.take() {
            self.ports.release(port);
        }
        lease.state = ProcessState::Stopped;

        self.log_bus.publish(app_id, LogEvent::new("stopped", false)).await;

        true
    }

    /// Stop every workspace's process. Called on server shutdown.
    pub async fn stop_all(&self) {
        let ids: Vec<i64> = self.leases.lock().await.keys().copied().collect();
        for id in ids {
            self.stop(id).await;
        }
    }

    fn spawn_log_readers(
        &self,
        app_id: i64,
        stdout: Option<tokio::process::ChildStdout>,
        stderr: Option<tokio::process::ChildStderr>,
    ) {
        if let Some(stdout) = stdout {
            let bus = self.log_bus.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    bus.publish(app_id, LogEvent::stdout(line)).await;
                }
            });
        }
        if let Some(stderr) = stderr {
            let bus = self.log_bus.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    bus.publish(app_id, LogEvent::stderr(line)).await;
                }
            });
        }
    }

    fn spawn_exit_watcher(&self, app_id: i64, lease_handle: Arc<Mutex<Lease>>) {
        let bus = self.log_bus.clone();
        let ports = self.ports.clone();
        tokio::spawn(async move {
            loop {
                let mut lease = lease_handle.lock().await;
                let Some(child) = lease.child.as_mut() else {
                    return;
                };
                match child.try_wait() {
                    Ok(Some(status)) => {
                        lease.child = None;
                        if let Some(port) = lease.port.take() {
                            ports.release(port);
                        }
                        lease.state = ProcessState::Stopped;
                        drop(lease);
                        let code = status.code();
                        let message = match code {
                            Some(code) => format!("process exited with code {code}"),
                            None => "process exited".to_string(),
                        };
                        bus.publish(app_id, LogEvent::new(message, code != Some(0))).await;
                        return;
                    }
                    Ok(None) => {
                        drop(lease);
                        tokio::time::sleep(std::time::Duration::from_millis(250)).await;
                    }
                    Err(_) => return,
                }
            }
        });
    }

    /// Run a command to completion with a timeout, streaming its output to
    /// the Log Bus. Returns `Ok(true)` on zero exit, `Ok(false)` on non-zero,
    /// `Err` on timeout or spawn failure.
    async fn run_to_completion(
        &self,
        app_id: i64,
        cwd: &std::path::Path,
        program: &str,
        args: &[&str],
        env: Option<(&str, &str)>,
        timeout: std::time::Duration,
    ) -> AppResult<bool> {
        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some((key, value)) = env {
            command.env(key, value);
        }

        let mut child = command
            .spawn()
            .map_err(|err| AppError::Internal(anyhow::anyhow!(err)))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        self.spawn_log_readers(app_id, stdout, stderr);

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(exit)) => Ok(exit.success()),
            Ok(Err(err)) => Err(AppError::Internal(anyhow::anyhow!(err))),
            Err(_) => {
                let _ = child.start_kill();
                Err(AppError::Upstream("dependency install timed out".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_supervisor() -> ProcessSupervisor {
        ProcessSupervisor::new(
            ProcessConfig {
                base_port: 6000,
                max_ports: 10,
                install_timeout: std::time::Duration::from_secs(5),
                stop_grace_period: std::time::Duration::from_millis(200),
            },
            Arc::new(PortAllocator::new(6000, 10)),
            LogBus::new(),
        )
    }

    #[tokio::test]
    async fn start_fails_fast_when_project_marker_is_missing() {
        let supervisor = test_supervisor();
        let dir = tempfile::tempdir().unwrap();
        let err = supervisor.start(1, dir.path().to_path_buf()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn stop_on_idle_workspace_is_a_no_op() {
        let supervisor = test_supervisor();
        assert!(!supervisor.stop(99).await);
    }

    #[tokio::test]
    async fn status_of_unknown_workspace_is_not_running() {
        let supervisor = test_supervisor();
        let status = supervisor.status(42).await;
        assert!(!status.running);
        assert!(status.port.is_none());
    }
}
