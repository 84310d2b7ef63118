//! Process spawning abstraction
//!
//! The supervisor never touches `tokio::process` directly. It asks a
//! [`ProcessSpawner`] for a child and gets back a handle plus a channel of
//! lifecycle events. Hosts can plug in their own process manager, and tests
//! can count spawns without launching anything.
//!
//! # Example
//!
//! ```rust,ignore
//! use inference_gateway::process::{ProcessEvent, ProcessSpawner, SpawnRequest, TokioProcessSpawner};
//!
//! let spawner = TokioProcessSpawner::new();
//! let (mut rx, handle) = spawner.spawn(SpawnRequest::new("/opt/engines/engine-server")).await?;
//!
//! while let Some(event) = rx.recv().await {
//!     match event {
//!         ProcessEvent::Terminated(code) => break,
//!         ProcessEvent::Error(e) => eprintln!("{}", e),
//!     }
//! }
//! ```

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Lifecycle event from a spawned process
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    /// Waiting on the process failed
    Error(String),
    /// Process terminated with optional exit code
    Terminated(Option<i32>),
}

/// Handle to a spawned process
pub trait ProcessHandle: Send + Sync {
    /// Get the process ID
    fn pid(&self) -> u32;
    /// Ask the process to terminate
    fn kill(&self) -> Result<(), String>;
}

/// What to launch and how
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpawnRequest {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Variables added to (or replacing) the inherited environment
    pub env: Vec<(String, String)>,
    pub current_dir: Option<PathBuf>,
}

impl SpawnRequest {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Look up a variable set on this request
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Trait for spawning external processes
#[async_trait]
pub trait ProcessSpawner: Send + Sync {
    /// Spawn a process
    ///
    /// # Returns
    /// A tuple of (event receiver, process handle). The receiver yields a
    /// single terminal event when the process exits.
    async fn spawn(
        &self,
        request: SpawnRequest,
    ) -> Result<(mpsc::Receiver<ProcessEvent>, Box<dyn ProcessHandle>), String>;
}

// ============================================================================
// Tokio Process Spawner
// ============================================================================

#[cfg(feature = "std-process")]
mod tokio_process {
    use super::*;
    use std::process::Stdio;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tokio::process::{Child, Command};

    const EXIT_POLL_MS: u64 = 100;

    /// Tokio child process handle
    struct TokioProcessHandle {
        child: Arc<Mutex<Option<Child>>>,
        pid: u32,
    }

    impl ProcessHandle for TokioProcessHandle {
        fn pid(&self) -> u32 {
            self.pid
        }

        fn kill(&self) -> Result<(), String> {
            let mut guard = self.child.lock();
            if let Some(child) = guard.as_mut() {
                child
                    .start_kill()
                    .map_err(|e| format!("Failed to kill process: {}", e))?;
            }
            Ok(())
        }
    }

    /// Process spawner backed by `tokio::process`
    ///
    /// Children inherit the parent's stdio, so engine output lands wherever
    /// the host sends its own.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct TokioProcessSpawner;

    impl TokioProcessSpawner {
        pub fn new() -> Self {
            Self
        }
    }

    #[async_trait]
    impl ProcessSpawner for TokioProcessSpawner {
        async fn spawn(
            &self,
            request: SpawnRequest,
        ) -> Result<(mpsc::Receiver<ProcessEvent>, Box<dyn ProcessHandle>), String> {
            if !request.program.exists() {
                return Err(format!(
                    "Binary not found: {}",
                    request.program.display()
                ));
            }

            let mut command = Command::new(&request.program);
            command
                .args(&request.args)
                .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());
            if let Some(dir) = &request.current_dir {
                command.current_dir(dir);
            }

            let child = command
                .spawn()
                .map_err(|e| format!("Failed to spawn {}: {}", request.program.display(), e))?;

            let pid = child.id().unwrap_or_default();
            let (tx, rx) = mpsc::channel(4);
            let child_arc = Arc::new(Mutex::new(Some(child)));

            // Spawn process monitor
            let child_arc_clone = child_arc.clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(tokio::time::Duration::from_millis(EXIT_POLL_MS)).await;

                    // Check process status without holding lock across await
                    let check_result = {
                        let mut guard = child_arc_clone.lock();
                        match guard.as_mut() {
                            Some(child) => match child.try_wait() {
                                Ok(Some(status)) => {
                                    guard.take();
                                    Ok(Some(status))
                                }
                                other => other,
                            },
                            None => break,
                        }
                    };

                    match check_result {
                        Ok(Some(status)) => {
                            let _ = tx.send(ProcessEvent::Terminated(status.code())).await;
                            break;
                        }
                        Ok(None) => continue,
                        Err(e) => {
                            let _ = tx
                                .send(ProcessEvent::Error(format!("Wait error: {}", e)))
                                .await;
                            break;
                        }
                    }
                }
            });

            let handle = TokioProcessHandle {
                child: child_arc,
                pid,
            };

            Ok((rx, Box::new(handle)))
        }
    }
}

#[cfg(feature = "std-process")]
pub use tokio_process::TokioProcessSpawner;
