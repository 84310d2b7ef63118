//! Local engine subprocess supervision
//!
//! Owns the single native engine process: spawns it, polls `/healthz` until
//! it answers, watches for exit and kills it on stop. The lifecycle is
//!
//! ```text
//! Stopped → Starting → HealthChecking → Running → Stopping → Stopped
//! ```
//!
//! Start and stop are serialized, so concurrent `start` calls launch one
//! process. A crash clears the handle and returns to `Stopped`; nothing is
//! restarted automatically.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

use crate::config::LocalEngineConfig;
use crate::constants::{endpoints, env_vars, timeouts};
use crate::engine::EngineError;
use crate::process::{ProcessEvent, ProcessHandle, ProcessSpawner, SpawnRequest};

/// Lifecycle state of the engine subprocess
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubprocessState {
    Stopped,
    Starting,
    HealthChecking,
    Running,
    Stopping,
}

struct Inner {
    state: SubprocessState,
    handle: Option<Box<dyn ProcessHandle>>,
    /// Bumped on every spawn so a stale exit monitor cannot touch a newer process
    generation: u64,
}

/// Shared state plus the channel that publishes its transitions
#[derive(Clone)]
struct Shared {
    inner: Arc<Mutex<Inner>>,
    transitions: broadcast::Sender<SubprocessState>,
}

impl Shared {
    fn state(&self) -> SubprocessState {
        self.inner.lock().state
    }

    fn set_state(&self, state: SubprocessState) {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, state);
    }

    fn transition(&self, inner: &mut Inner, state: SubprocessState) {
        if inner.state == state {
            return;
        }
        log::debug!("Local engine: {:?} -> {:?}", inner.state, state);
        inner.state = state;
        // No subscribers is fine
        let _ = self.transitions.send(state);
    }
}

/// Supervisor for the local engine process
pub struct LocalEngineSupervisor {
    config: LocalEngineConfig,
    spawner: Arc<dyn ProcessSpawner>,
    http: reqwest::Client,
    shared: Shared,
    lifecycle: tokio::sync::Mutex<()>,
}

impl LocalEngineSupervisor {
    pub fn new(
        config: LocalEngineConfig,
        spawner: Arc<dyn ProcessSpawner>,
        http: reqwest::Client,
    ) -> Self {
        let (transitions, _) = broadcast::channel(16);
        Self {
            config,
            spawner,
            http,
            shared: Shared {
                inner: Arc::new(Mutex::new(Inner {
                    state: SubprocessState::Stopped,
                    handle: None,
                    generation: 0,
                })),
                transitions,
            },
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> &LocalEngineConfig {
        &self.config
    }

    pub fn state(&self) -> SubprocessState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == SubprocessState::Running
    }

    /// PID of the supervised process, if one is held
    pub fn pid(&self) -> Option<u32> {
        self.shared.inner.lock().handle.as_ref().map(|h| h.pid())
    }

    /// Receive every state transition from now on
    pub fn subscribe_state(&self) -> broadcast::Receiver<SubprocessState> {
        self.shared.transitions.subscribe()
    }

    /// Locate the engine binary: the configured directory first, then `PATH`
    pub fn resolve_binary(&self) -> Option<PathBuf> {
        let configured = self.config.binary_path();
        if configured.is_file() {
            return Some(configured);
        }
        which::which(&self.config.binary_name).ok()
    }

    /// Start the engine and wait until it answers health checks
    ///
    /// A no-op when already running. On any failure the child is killed and
    /// the state returns to `Stopped`.
    pub async fn start(&self) -> Result<(), EngineError> {
        let _lifecycle = self.lifecycle.lock().await;

        if self.state() == SubprocessState::Running {
            log::debug!("Local engine already running");
            return Ok(());
        }

        self.shared.set_state(SubprocessState::Starting);

        let Some(binary) = self.resolve_binary() else {
            self.shared.set_state(SubprocessState::Stopped);
            return Err(EngineError::BinaryMissing(
                self.config.binary_path().display().to_string(),
            ));
        };

        let request = self.spawn_request(&binary);
        log::info!(
            "Starting local engine: {} on {}:{}",
            binary.display(),
            self.config.host,
            self.config.port
        );

        let (mut events, handle) = match self.spawner.spawn(request).await {
            Ok(spawned) => spawned,
            Err(e) => {
                self.shared.set_state(SubprocessState::Stopped);
                return Err(EngineError::StartupFailed(e));
            }
        };

        let generation = {
            let mut inner = self.shared.inner.lock();
            inner.generation += 1;
            inner.handle = Some(handle);
            self.shared.transition(&mut inner, SubprocessState::HealthChecking);
            inner.generation
        };

        let outcome = tokio::select! {
            healthy = tokio::time::timeout(self.config.startup_timeout(), self.wait_healthy()) => {
                healthy.map_err(|_| {
                    EngineError::StartupFailed(format!(
                        "Engine did not become healthy within {:?}",
                        self.config.startup_timeout()
                    ))
                })
            }
            event = wait_exit(&mut events) => {
                Err(EngineError::StartupFailed(format!(
                    "Engine exited during startup: {:?}",
                    event
                )))
            }
        };

        match outcome {
            Ok(()) => {
                self.shared.set_state(SubprocessState::Running);
                self.spawn_exit_monitor(events, generation);
                log::info!("Local engine running at {}", self.config.base_url());
                Ok(())
            }
            Err(e) => {
                log::error!("Local engine failed to start: {}", e);
                let handle = self.shared.inner.lock().handle.take();
                if let Some(handle) = handle {
                    if let Err(kill_err) = handle.kill() {
                        log::warn!("Failed to kill engine after startup failure: {}", kill_err);
                    }
                }
                self.shared.set_state(SubprocessState::Stopped);
                Err(e)
            }
        }
    }

    /// Stop the engine. Never fails.
    ///
    /// With a handle the process is killed. Without one, the engine may
    /// still be running from an earlier session, so it is asked to shut
    /// itself down.
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;

        let handle = {
            let mut inner = self.shared.inner.lock();
            let handle = inner.handle.take();
            if handle.is_some() {
                self.shared.transition(&mut inner, SubprocessState::Stopping);
            }
            handle
        };

        match handle {
            Some(handle) => {
                let mut transitions = self.subscribe_state();
                log::info!("Stopping local engine (pid {})", handle.pid());
                if let Err(e) = handle.kill() {
                    log::warn!("Failed to kill local engine: {}", e);
                }
                let exited = tokio::time::timeout(self.config.stop_timeout(), async {
                    loop {
                        match transitions.recv().await {
                            Ok(SubprocessState::Stopped) => break,
                            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                })
                .await;
                if exited.is_err() {
                    log::warn!("Local engine did not report exit within {:?}", self.config.stop_timeout());
                }
            }
            None => {
                let url = self.config.url(endpoints::DESTROY);
                match self
                    .http
                    .delete(&url)
                    .timeout(self.config.stop_timeout())
                    .send()
                    .await
                {
                    Ok(response) => log::debug!("Destroy request returned {}", response.status()),
                    Err(e) => log::debug!("Destroy request failed: {}", e),
                }
            }
        }

        self.shared.set_state(SubprocessState::Stopped);
    }

    fn spawn_request(&self, binary: &Path) -> SpawnRequest {
        let engine_dir = binary
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.engine_dir.clone());
        let port = self.config.port.to_string();

        SpawnRequest::new(binary)
            .arg("--host")
            .arg(self.config.host.clone())
            .arg("--port")
            .arg(port.clone())
            .env(env_vars::VISIBLE_DEVICES, self.config.visible_devices.clone())
            .env(env_vars::ENGINE_PATH, self.config.data_dir.display().to_string())
            .env(env_vars::ENGINE_PORT, port)
            .env(env_vars::PATH, append_search_path(env_vars::PATH, &engine_dir))
            .env(
                env_vars::LIBRARY_PATH,
                append_search_path(env_vars::LIBRARY_PATH, &engine_dir),
            )
            .current_dir(engine_dir)
    }

    /// Poll `/healthz` until it returns 200
    async fn wait_healthy(&self) {
        let url = self.config.url(endpoints::HEALTHZ);
        loop {
            match self
                .http
                .get(&url)
                .timeout(Duration::from_millis(timeouts::HEALTH_PROBE_MS))
                .send()
                .await
            {
                Ok(response) if response.status() == reqwest::StatusCode::OK => return,
                Ok(response) => {
                    log::debug!("Health check returned status {}, retrying...", response.status())
                }
                Err(e) => log::debug!("Health check failed: {}, retrying...", e),
            }
            tokio::time::sleep(self.config.health_interval()).await;
        }
    }

    fn spawn_exit_monitor(&self, mut events: mpsc::Receiver<ProcessEvent>, generation: u64) {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            // A closed channel means exits cannot be observed for this process
            let Some(event) = events.recv().await else {
                return;
            };

            let mut inner = shared.inner.lock();
            if inner.generation != generation {
                return;
            }
            match &event {
                ProcessEvent::Terminated(code) => {
                    log::info!("Local engine exited with code {:?}", code)
                }
                ProcessEvent::Error(e) => log::warn!("Lost track of local engine: {}", e),
            }
            inner.handle = None;
            shared.transition(&mut inner, SubprocessState::Stopped);
        });
    }
}

/// Wait for the first process event. A closed channel never resolves.
async fn wait_exit(events: &mut mpsc::Receiver<ProcessEvent>) -> ProcessEvent {
    match events.recv().await {
        Some(event) => event,
        None => std::future::pending().await,
    }
}

/// The current value of a search-path variable with `dir` appended
fn append_search_path(var: &str, dir: &Path) -> String {
    let existing = std::env::var_os(var).unwrap_or_default();
    let paths = std::env::split_paths(&existing)
        .filter(|p| !p.as_os_str().is_empty())
        .chain(std::iter::once(dir.to_path_buf()));
    std::env::join_paths(paths)
        .unwrap_or_else(|_| OsString::from(dir.as_os_str()))
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeHandle;

    impl ProcessHandle for FakeHandle {
        fn pid(&self) -> u32 {
            42
        }

        fn kill(&self) -> Result<(), String> {
            Ok(())
        }
    }

    /// Spawner that hands out the sender so tests can end the "process"
    #[derive(Default)]
    struct FakeSpawner {
        spawned: AtomicUsize,
        requests: Mutex<Vec<SpawnRequest>>,
        senders: Mutex<Vec<mpsc::Sender<ProcessEvent>>>,
    }

    #[async_trait]
    impl ProcessSpawner for FakeSpawner {
        async fn spawn(
            &self,
            request: SpawnRequest,
        ) -> Result<(mpsc::Receiver<ProcessEvent>, Box<dyn ProcessHandle>), String> {
            self.spawned.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().push(request);
            let (tx, rx) = mpsc::channel(4);
            self.senders.lock().push(tx);
            Ok((rx, Box::new(FakeHandle)))
        }
    }

    fn config_with_binary(dir: &tempfile::TempDir, port: u16) -> LocalEngineConfig {
        let binary_name = "engine-under-test".to_string();
        std::fs::write(dir.path().join(&binary_name), b"").unwrap();
        LocalEngineConfig {
            port,
            engine_dir: dir.path().to_path_buf(),
            binary_name,
            health_interval_ms: 20,
            startup_timeout_secs: 5,
            stop_timeout_ms: 200,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_missing_binary_fails_without_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let spawner = Arc::new(FakeSpawner::default());
        let config = LocalEngineConfig {
            engine_dir: dir.path().to_path_buf(),
            binary_name: "no-such-engine-binary-for-tests".into(),
            ..Default::default()
        };
        let supervisor = LocalEngineSupervisor::new(config, spawner.clone(), reqwest::Client::new());

        let err = supervisor.start().await.unwrap_err();
        assert!(matches!(err, EngineError::BinaryMissing(_)));
        assert_eq!(supervisor.state(), SubprocessState::Stopped);
        assert_eq!(spawner.spawned.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_spawn_request_sets_environment() {
        let dir = tempfile::tempdir().unwrap();
        let spawner = Arc::new(FakeSpawner::default());
        let config = config_with_binary(&dir, 3999);
        let supervisor = LocalEngineSupervisor::new(config, spawner, reqwest::Client::new());

        let binary = supervisor.resolve_binary().unwrap();
        let request = supervisor.spawn_request(&binary);
        assert_eq!(request.args, vec!["--host", "127.0.0.1", "--port", "3999"]);
        assert_eq!(request.env_var("CUDA_VISIBLE_DEVICES"), Some("0"));
        assert_eq!(request.env_var("ENGINE_PORT"), Some("3999"));
        assert_eq!(request.current_dir.as_deref(), Some(dir.path()));
        let path = request.env_var("PATH").unwrap();
        assert!(path.ends_with(&dir.path().display().to_string()));
    }

    #[tokio::test]
    async fn test_exit_while_health_checking_fails_start() {
        let dir = tempfile::tempdir().unwrap();
        let spawner = Arc::new(FakeSpawner::default());
        // Nothing listens on this port, so health checks keep failing
        let config = config_with_binary(&dir, 1);
        let supervisor = Arc::new(LocalEngineSupervisor::new(
            config,
            spawner.clone(),
            reqwest::Client::new(),
        ));

        let starting = tokio::spawn({
            let supervisor = supervisor.clone();
            async move { supervisor.start().await }
        });

        while spawner.senders.lock().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let sender = spawner.senders.lock()[0].clone();
        sender.send(ProcessEvent::Terminated(Some(1))).await.unwrap();

        let err = starting.await.unwrap().unwrap_err();
        assert!(matches!(err, EngineError::StartupFailed(_)));
        assert_eq!(supervisor.state(), SubprocessState::Stopped);
        assert_eq!(supervisor.pid(), None);
    }

    #[tokio::test]
    async fn test_startup_timeout_returns_to_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let spawner = Arc::new(FakeSpawner::default());
        let mut config = config_with_binary(&dir, 1);
        config.startup_timeout_secs = 0;
        let supervisor = LocalEngineSupervisor::new(config, spawner, reqwest::Client::new());

        let err = supervisor.start().await.unwrap_err();
        assert!(matches!(err, EngineError::StartupFailed(_)));
        assert_eq!(supervisor.state(), SubprocessState::Stopped);
    }

    #[test]
    fn test_append_search_path() {
        let joined = append_search_path("INFERENCE_GATEWAY_UNSET_VAR", Path::new("/opt/engines"));
        assert_eq!(joined, "/opt/engines");
    }
}
