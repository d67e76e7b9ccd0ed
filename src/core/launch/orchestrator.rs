// ─── Launch Orchestrator ───
// Install-then-launch state machine. One worker task per run, at most one
// active run; progress and phase changes arrive on an event channel.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::command::CommandBuilder;
use crate::core::auth::{generate_username, IdentityMode, IdentityStore, LaunchOptions};
use crate::core::error::{ErrorKind, LauncherError, LauncherResult};
use crate::core::loaders::LoaderKind;
use crate::core::process::ProcessRunner;
use crate::core::progress::{ProgressSink, ProgressState};
use crate::core::version::VersionInstaller;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub version_id: String,
    /// Offline name; a random one is generated when absent or blank.
    pub username: Option<String>,
    pub loader: LoaderKind,
    pub identity_mode: IdentityMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    InstallingBase,
    InstallingLoader,
    ResolvingIdentity,
    BuildingCommand,
    Launching,
    Done,
    Failed,
    Cancelled,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunPhase::Idle => "idle",
            RunPhase::InstallingBase => "installing game",
            RunPhase::InstallingLoader => "installing loader",
            RunPhase::ResolvingIdentity => "resolving identity",
            RunPhase::BuildingCommand => "building command",
            RunPhase::Launching => "launching",
            RunPhase::Done => "done",
            RunPhase::Failed => "failed",
            RunPhase::Cancelled => "cancelled",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Done,
    Cancelled,
    Failed { kind: ErrorKind, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Phase(RunPhase),
    Progress(ProgressState),
    Finished(RunOutcome),
}

/// State shared between a run's worker and its handle.
struct RunShared {
    cancelled: AtomicBool,
    phase: Mutex<RunPhase>,
}

impl RunShared {
    fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            phase: Mutex::new(RunPhase::Idle),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn phase(&self) -> RunPhase {
        *lock(&self.phase)
    }

    fn set_phase(&self, phase: RunPhase) {
        *lock(&self.phase) = phase;
    }
}

type ActiveSlot = Arc<Mutex<Option<Arc<RunShared>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Free the slot if it still holds `run`.
fn release(slot: &ActiveSlot, run: &Arc<RunShared>) {
    let mut active = lock(slot);
    if active.as_ref().is_some_and(|a| Arc::ptr_eq(a, run)) {
        *active = None;
    }
}

/// Progress sink that forwards every update as a [`RunEvent::Progress`].
struct ChannelProgress {
    tx: mpsc::UnboundedSender<RunEvent>,
    state: Mutex<ProgressState>,
}

impl ChannelProgress {
    fn update(&self, apply: impl FnOnce(&mut ProgressState)) {
        let snapshot = {
            let mut state = lock(&self.state);
            apply(&mut state);
            state.clone()
        };
        let _ = self.tx.send(RunEvent::Progress(snapshot));
    }
}

impl ProgressSink for ChannelProgress {
    fn set_label(&self, label: &str) {
        self.update(|s| s.label = label.to_string());
    }

    fn set_value(&self, value: u64) {
        self.update(|s| s.value = value);
    }

    fn set_max(&self, max: u64) {
        self.update(|s| s.max = max);
    }
}

/// Caller's side of one run.
pub struct RunHandle {
    pub events: mpsc::UnboundedReceiver<RunEvent>,
    shared: Arc<RunShared>,
    task: Option<JoinHandle<()>>,
    slot: ActiveSlot,
    tx: mpsc::UnboundedSender<RunEvent>,
}

impl RunHandle {
    /// Ask the worker to stop at its next phase boundary.
    pub fn cancel(&self) {
        debug!("Cancellation requested");
        self.shared.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn phase(&self) -> RunPhase {
        self.shared.phase()
    }

    /// Cancel, give the worker `grace` to reach a checkpoint, then abort it.
    pub async fn terminate(&mut self, grace: Duration) {
        self.cancel();
        let Some(mut task) = self.task.take() else {
            return;
        };

        if tokio::time::timeout(grace, &mut task).await.is_ok() {
            return;
        }

        warn!("Run did not stop within {:?}, aborting it", grace);
        task.abort();
        let _ = task.await;
        self.shared.set_phase(RunPhase::Cancelled);
        release(&self.slot, &self.shared);
        let _ = self.tx.send(RunEvent::Finished(RunOutcome::Cancelled));
    }

    /// Drain events until the run finishes.
    pub async fn wait(&mut self) -> Option<RunOutcome> {
        while let Some(event) = self.events.recv().await {
            if let RunEvent::Finished(outcome) = event {
                return Some(outcome);
            }
        }
        None
    }
}

/// Services a run is driven through.
#[derive(Clone)]
struct RunContext {
    installer: Arc<dyn VersionInstaller>,
    commands: Arc<dyn CommandBuilder>,
    runner: Arc<dyn ProcessRunner>,
    identities: IdentityStore,
    install_dir: PathBuf,
}

pub struct LaunchOrchestrator {
    ctx: RunContext,
    active: ActiveSlot,
}

enum Flow {
    Done,
    Cancelled,
}

impl LaunchOrchestrator {
    pub fn new(
        installer: Arc<dyn VersionInstaller>,
        commands: Arc<dyn CommandBuilder>,
        runner: Arc<dyn ProcessRunner>,
        identities: IdentityStore,
        install_dir: PathBuf,
    ) -> Self {
        Self {
            ctx: RunContext {
                installer,
                commands,
                runner,
                identities,
                install_dir,
            },
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.active).is_some()
    }

    /// Start a run on a background task.
    pub fn start(&self, request: LaunchRequest) -> LauncherResult<RunHandle> {
        if request.version_id.trim().is_empty() {
            return Err(LauncherError::Install("No version selected".into()));
        }

        let shared = Arc::new(RunShared::new());
        {
            let mut active = lock(&self.active);
            if active.is_some() {
                return Err(LauncherError::AlreadyRunning);
            }
            *active = Some(shared.clone());
        }

        info!(
            "Starting run for {} (loader {}, {:?})",
            request.version_id, request.loader, request.identity_mode
        );
        let (tx, events) = mpsc::unbounded_channel();
        let task = tokio::spawn(drive(
            self.ctx.clone(),
            request,
            shared.clone(),
            self.active.clone(),
            tx.clone(),
        ));

        Ok(RunHandle {
            events,
            shared,
            task: Some(task),
            slot: self.active.clone(),
            tx,
        })
    }
}

async fn drive(
    ctx: RunContext,
    request: LaunchRequest,
    shared: Arc<RunShared>,
    slot: ActiveSlot,
    tx: mpsc::UnboundedSender<RunEvent>,
) {
    let result = run_phases(&ctx, &request, &shared, &tx).await;

    let (phase, outcome) = match result {
        Ok(Flow::Done) => (RunPhase::Done, RunOutcome::Done),
        Ok(Flow::Cancelled) | Err(LauncherError::UserCancelled) => {
            (RunPhase::Cancelled, RunOutcome::Cancelled)
        }
        Err(e) => {
            warn!("Run for {} failed: {}", request.version_id, e);
            (
                RunPhase::Failed,
                RunOutcome::Failed {
                    kind: e.kind(),
                    message: e.to_string(),
                },
            )
        }
    };

    shared.set_phase(phase);
    let _ = tx.send(RunEvent::Phase(phase));
    release(&slot, &shared);
    let _ = tx.send(RunEvent::Finished(outcome));
}

async fn run_phases(
    ctx: &RunContext,
    request: &LaunchRequest,
    shared: &RunShared,
    tx: &mpsc::UnboundedSender<RunEvent>,
) -> LauncherResult<Flow> {
    let enter = |phase: RunPhase| {
        shared.set_phase(phase);
        let _ = tx.send(RunEvent::Phase(phase));
        debug!("Run phase: {}", phase);
    };
    let progress = ChannelProgress {
        tx: tx.clone(),
        state: Mutex::new(ProgressState::default()),
    };

    // licensed runs fail before touching the install dir
    let record = match request.identity_mode {
        IdentityMode::Licensed => Some(ctx.identities.load().ok_or(LauncherError::NoIdentity)?),
        IdentityMode::Offline => None,
    };

    if shared.is_cancelled() {
        return Ok(Flow::Cancelled);
    }
    enter(RunPhase::InstallingBase);
    ctx.installer
        .ensure_installed(&request.version_id, &ctx.install_dir, &progress)
        .await?;

    let mut launch_id = request.version_id.clone();
    if request.loader != LoaderKind::None {
        if shared.is_cancelled() {
            return Ok(Flow::Cancelled);
        }
        enter(RunPhase::InstallingLoader);
        launch_id = ctx
            .installer
            .install_loader(request.loader, &request.version_id, &ctx.install_dir, &progress)
            .await?;
    }

    if shared.is_cancelled() {
        return Ok(Flow::Cancelled);
    }
    enter(RunPhase::ResolvingIdentity);
    let options = match record {
        Some(record) => LaunchOptions::licensed(&record),
        None => {
            let name = request
                .username
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .unwrap_or_else(generate_username);
            LaunchOptions::offline(&name)
        }
    };

    if shared.is_cancelled() {
        return Ok(Flow::Cancelled);
    }
    enter(RunPhase::BuildingCommand);
    let command = ctx
        .commands
        .build(&launch_id, &ctx.install_dir, &options)
        .await?;

    if shared.is_cancelled() {
        return Ok(Flow::Cancelled);
    }
    enter(RunPhase::Launching);
    if shared.is_cancelled() {
        return Ok(Flow::Cancelled);
    }
    let pid = ctx.runner.start(&command)?;
    info!("{} launched as {} (pid {})", launch_id, options.username, pid);

    Ok(Flow::Done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::IdentityRecord;
    use crate::core::process::{LaunchCommand, MockProcessRunner};
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    /// Installer that downloads nothing. Optionally blocks in the base phase
    /// until `gate` is notified.
    #[derive(Default)]
    struct FakeInstaller {
        gate: Option<Arc<Notify>>,
        loader_unsupported: bool,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl VersionInstaller for FakeInstaller {
        async fn ensure_installed(
            &self,
            _version_id: &str,
            _install_dir: &Path,
            progress: &dyn ProgressSink,
        ) -> LauncherResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            progress.set_label("Downloading client");
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            Ok(())
        }

        async fn install_loader(
            &self,
            kind: LoaderKind,
            base_version_id: &str,
            _install_dir: &Path,
            _progress: &dyn ProgressSink,
        ) -> LauncherResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.loader_unsupported {
                return Err(LauncherError::UnsupportedVersion {
                    loader: kind.to_string(),
                    version: base_version_id.to_string(),
                });
            }
            Ok(format!("{}-{}", base_version_id, kind))
        }
    }

    /// Records the identity each build was asked for.
    #[derive(Default)]
    struct RecordingCommands {
        seen: Mutex<Vec<(String, LaunchOptions)>>,
    }

    #[async_trait::async_trait]
    impl CommandBuilder for RecordingCommands {
        async fn build(
            &self,
            version_id: &str,
            install_dir: &Path,
            options: &LaunchOptions,
        ) -> LauncherResult<LaunchCommand> {
            lock(&self.seen).push((version_id.to_string(), options.clone()));
            Ok(LaunchCommand {
                program: PathBuf::from("java"),
                args: vec![options.username.clone()],
                working_dir: install_dir.to_path_buf(),
                hide_console: true,
            })
        }
    }

    struct Fixture {
        orchestrator: LaunchOrchestrator,
        installer: Arc<FakeInstaller>,
        commands: Arc<RecordingCommands>,
        data_dir: tempfile::TempDir,
    }

    fn fixture(installer: FakeInstaller, runner: MockProcessRunner) -> Fixture {
        let data_dir = tempfile::tempdir().unwrap();
        let installer = Arc::new(installer);
        let commands = Arc::new(RecordingCommands::default());
        let orchestrator = LaunchOrchestrator::new(
            installer.clone(),
            commands.clone(),
            Arc::new(runner),
            IdentityStore::new(data_dir.path()),
            data_dir.path().join("install"),
        );
        Fixture {
            orchestrator,
            installer,
            commands,
            data_dir,
        }
    }

    fn request(loader: LoaderKind, identity_mode: IdentityMode) -> LaunchRequest {
        LaunchRequest {
            version_id: "1.20.1".into(),
            username: None,
            loader,
            identity_mode,
        }
    }

    /// Phases and outcome of a finished run, progress events skipped.
    async fn collect(handle: &mut RunHandle) -> (Vec<RunPhase>, RunOutcome) {
        let mut phases = Vec::new();
        while let Some(event) = handle.events.recv().await {
            match event {
                RunEvent::Phase(p) => phases.push(p),
                RunEvent::Progress(_) => {}
                RunEvent::Finished(outcome) => return (phases, outcome),
            }
        }
        panic!("event channel closed before Finished");
    }

    async fn wait_for_phase(handle: &mut RunHandle, phase: RunPhase) {
        while let Some(event) = handle.events.recv().await {
            if event == RunEvent::Phase(phase) {
                return;
            }
        }
        panic!("run never reached {:?}", phase);
    }

    fn runner_expecting(times: usize) -> MockProcessRunner {
        let mut runner = MockProcessRunner::new();
        runner.expect_start().times(times).returning(|_| Ok(4242));
        runner
    }

    #[tokio::test]
    async fn offline_run_with_installed_files_launches() {
        let f = fixture(FakeInstaller::default(), runner_expecting(1));

        let mut handle = f
            .orchestrator
            .start(request(LoaderKind::None, IdentityMode::Offline))
            .unwrap();
        let (phases, outcome) = collect(&mut handle).await;

        assert_eq!(outcome, RunOutcome::Done);
        assert_eq!(
            phases,
            vec![
                RunPhase::InstallingBase,
                RunPhase::ResolvingIdentity,
                RunPhase::BuildingCommand,
                RunPhase::Launching,
                RunPhase::Done,
            ]
        );
        let seen = lock(&f.commands.seen).clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "1.20.1");
        assert!(!seen[0].1.username.is_empty());
        assert!(seen[0].1.auth_token.is_empty());
        assert!(!f.orchestrator.is_running());
    }

    #[tokio::test]
    async fn loader_id_becomes_launch_target() {
        let f = fixture(FakeInstaller::default(), runner_expecting(1));
        let mut req = request(LoaderKind::Fabric, IdentityMode::Offline);
        req.username = Some("  Alex ".into());

        let mut handle = f.orchestrator.start(req).unwrap();
        let (phases, outcome) = collect(&mut handle).await;

        assert_eq!(outcome, RunOutcome::Done);
        assert_eq!(phases[1], RunPhase::InstallingLoader);
        let seen = lock(&f.commands.seen).clone();
        assert_eq!(seen[0].0, "1.20.1-fabric");
        assert_eq!(seen[0].1.username, "Alex");
    }

    #[tokio::test]
    async fn missing_forge_build_fails_after_base_install() {
        let installer = FakeInstaller {
            loader_unsupported: true,
            ..FakeInstaller::default()
        };
        let f = fixture(installer, runner_expecting(0));

        let mut handle = f
            .orchestrator
            .start(request(LoaderKind::Forge, IdentityMode::Offline))
            .unwrap();
        let (phases, outcome) = collect(&mut handle).await;

        assert_eq!(
            phases,
            vec![
                RunPhase::InstallingBase,
                RunPhase::InstallingLoader,
                RunPhase::Failed
            ]
        );
        assert!(matches!(
            outcome,
            RunOutcome::Failed { kind: ErrorKind::UnsupportedVersion, .. }
        ));
    }

    #[tokio::test]
    async fn licensed_run_without_identity_does_no_install_work() {
        let f = fixture(FakeInstaller::default(), runner_expecting(0));

        let mut handle = f
            .orchestrator
            .start(request(LoaderKind::None, IdentityMode::Licensed))
            .unwrap();
        let (phases, outcome) = collect(&mut handle).await;

        assert_eq!(phases, vec![RunPhase::Failed]);
        assert!(matches!(
            outcome,
            RunOutcome::Failed { kind: ErrorKind::NoIdentity, .. }
        ));
        assert_eq!(f.installer.calls.load(Ordering::SeqCst), 0);
        assert!(!f.data_dir.path().join("install").exists());
    }

    #[tokio::test]
    async fn licensed_run_uses_saved_record() {
        let f = fixture(FakeInstaller::default(), runner_expecting(1));
        IdentityStore::new(f.data_dir.path())
            .save(&IdentityRecord {
                access_token: "mc-token".into(),
                account_id: "0123abcd".into(),
                display_name: "Notch".into(),
            })
            .unwrap();
        let mut req = request(LoaderKind::None, IdentityMode::Licensed);
        req.username = Some("Ignored".into());

        let mut handle = f.orchestrator.start(req).unwrap();
        assert_eq!(handle.wait().await, Some(RunOutcome::Done));

        let seen = lock(&f.commands.seen).clone();
        assert_eq!(seen[0].1.username, "Notch");
        assert_eq!(seen[0].1.auth_token, "mc-token");
        assert!(seen[0].1.licensed);
    }

    #[tokio::test]
    async fn cancel_before_launch_never_starts_process() {
        let gate = Arc::new(Notify::new());
        let installer = FakeInstaller {
            gate: Some(gate.clone()),
            ..FakeInstaller::default()
        };
        let f = fixture(installer, runner_expecting(0));

        let mut handle = f
            .orchestrator
            .start(request(LoaderKind::None, IdentityMode::Offline))
            .unwrap();
        wait_for_phase(&mut handle, RunPhase::InstallingBase).await;
        handle.cancel();
        gate.notify_one();

        assert_eq!(handle.wait().await, Some(RunOutcome::Cancelled));
        assert_eq!(handle.phase(), RunPhase::Cancelled);
        assert!(lock(&f.commands.seen).is_empty());
    }

    #[tokio::test]
    async fn second_start_is_rejected_while_running() {
        let gate = Arc::new(Notify::new());
        let installer = FakeInstaller {
            gate: Some(gate.clone()),
            ..FakeInstaller::default()
        };
        let f = fixture(installer, runner_expecting(1));

        let mut handle = f
            .orchestrator
            .start(request(LoaderKind::None, IdentityMode::Offline))
            .unwrap();
        wait_for_phase(&mut handle, RunPhase::InstallingBase).await;

        let err = f
            .orchestrator
            .start(request(LoaderKind::None, IdentityMode::Offline))
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::AlreadyRunning);
        assert_eq!(handle.phase(), RunPhase::InstallingBase);

        gate.notify_one();
        assert_eq!(handle.wait().await, Some(RunOutcome::Done));
        assert!(f
            .orchestrator
            .start(request(LoaderKind::None, IdentityMode::Offline))
            .is_ok());
    }

    #[tokio::test]
    async fn terminate_aborts_a_stuck_worker() {
        let installer = FakeInstaller {
            gate: Some(Arc::new(Notify::new())),
            ..FakeInstaller::default()
        };
        let f = fixture(installer, runner_expecting(0));

        let mut handle = f
            .orchestrator
            .start(request(LoaderKind::None, IdentityMode::Offline))
            .unwrap();
        wait_for_phase(&mut handle, RunPhase::InstallingBase).await;
        handle.terminate(Duration::from_millis(50)).await;

        assert_eq!(handle.wait().await, Some(RunOutcome::Cancelled));
        assert_eq!(handle.phase(), RunPhase::Cancelled);
        assert!(!f.orchestrator.is_running());
    }

    #[tokio::test]
    async fn blank_version_is_rejected_up_front() {
        let f = fixture(FakeInstaller::default(), runner_expecting(0));
        let mut req = request(LoaderKind::None, IdentityMode::Offline);
        req.version_id = "  ".into();

        let err = f.orchestrator.start(req).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Install);
        assert!(!f.orchestrator.is_running());
    }

    #[tokio::test]
    async fn progress_is_forwarded_as_events() {
        let f = fixture(FakeInstaller::default(), runner_expecting(1));
        let mut handle = f
            .orchestrator
            .start(request(LoaderKind::None, IdentityMode::Offline))
            .unwrap();

        let mut labels = Vec::new();
        while let Some(event) = handle.events.recv().await {
            match event {
                RunEvent::Progress(state) => labels.push(state.label),
                RunEvent::Finished(_) => break,
                RunEvent::Phase(_) => {}
            }
        }
        assert_eq!(labels, vec!["Downloading client".to_string()]);
    }
}
