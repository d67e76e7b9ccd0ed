use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::core::auth::microsoft::XboxExchange;
use crate::core::auth::{AuthSession, ConsoleLoginSurface, IdentityMode, IdentityStore};
use crate::core::bootstrap::{BootstrapConfig, Bootstrapper};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::java::resolve_java_binary;
use crate::core::launch::{
    JavaCommandBuilder, LaunchOrchestrator, LaunchRequest, RunEvent, RunOutcome,
};
use crate::core::loaders::installer::LoaderKind;
use crate::core::process::DetachedProcessRunner;
use crate::core::progress::{ProgressSink, ProgressState};
use crate::core::release::ReleaseFetcher;
use crate::core::state::{AppState, KeyValueStore, TextFileStore, VersionFilter, SAVED_USERNAME_KEY};
use crate::core::version::{MinecraftInstaller, VersionManifest};

const TERMINATE_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(
    name = "unixlauncher",
    version,
    about = "Install, sign in to and launch Minecraft"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Install (if needed) and launch a version")]
    Play {
        #[arg(help = "Minecraft version id, e.g. 1.20.1")]
        version: String,

        #[arg(short, long, help = "Offline username; defaults to the last one used")]
        username: Option<String>,

        #[arg(short, long, default_value = "none", help = "none, fabric, quilt or forge")]
        loader: LoaderKind,

        #[arg(long, help = "Launch with the saved Microsoft account")]
        licensed: bool,
    },

    #[command(about = "Sign in with a Microsoft account")]
    Login,

    #[command(about = "Forget the saved Microsoft account")]
    Logout,

    #[command(about = "List versions from the Mojang manifest")]
    Versions {
        #[arg(long, help = "Ignore the version filter in settings")]
        all: bool,
    },

    #[command(about = "Download the latest launcher release and start it")]
    Bootstrap {
        #[arg(long)]
        owner: Option<String>,

        #[arg(long)]
        repo: Option<String>,

        #[arg(long, help = "Executable to look for inside the package")]
        exe: Option<String>,

        #[arg(long, help = "Install directory, defaults to the current one")]
        dir: Option<PathBuf>,
    },

    #[command(about = "Show or change launcher settings")]
    Settings {
        #[arg(long, help = "Heap size in megabytes")]
        memory: Option<u32>,

        #[arg(long, help = "Java binary used for launches")]
        java: Option<PathBuf>,
    },
}

pub async fn execute(cli: Cli, mut state: AppState) -> LauncherResult<()> {
    match cli.command {
        Commands::Play {
            version,
            username,
            loader,
            licensed,
        } => play(&state, version, username, loader, licensed).await,
        Commands::Login => login(&state).await,
        Commands::Logout => {
            IdentityStore::new(&state.data_dir).delete()?;
            println!("Signed out.");
            Ok(())
        }
        Commands::Versions { all } => list_versions(&state, all).await,
        Commands::Bootstrap {
            owner,
            repo,
            exe,
            dir,
        } => bootstrap(&state, owner, repo, exe, dir).await,
        Commands::Settings { memory, java } => {
            if memory.is_some() || java.is_some() {
                if let Some(memory) = memory {
                    state.launcher_settings.memory_mb = memory;
                }
                if let Some(java) = java {
                    state.launcher_settings.java_path = (!java.as_os_str().is_empty()).then_some(java);
                }
                state.save_settings()?;
                info!("Settings saved");
            }
            println!("{}", serde_json::to_string_pretty(&state.launcher_settings)?);
            Ok(())
        }
    }
}

// ─── Play ───

async fn play(
    state: &AppState,
    version: String,
    username: Option<String>,
    loader: LoaderKind,
    licensed: bool,
) -> LauncherResult<()> {
    let saved = TextFileStore::new(&state.data_dir);
    let username = match username.filter(|u| !u.trim().is_empty()) {
        Some(name) => {
            if let Err(e) = saved.save(SAVED_USERNAME_KEY, &name) {
                warn!("Could not remember username: {}", e);
            }
            Some(name)
        }
        None => saved.load(SAVED_USERNAME_KEY),
    };

    let settings = state.launcher_settings.clone();
    let java = resolve_java_binary(settings.java_path.as_deref());
    let installer = MinecraftInstaller::new(state.downloader.clone(), state.endpoints.clone(), java);
    let orchestrator = LaunchOrchestrator::new(
        Arc::new(installer),
        Arc::new(JavaCommandBuilder::new(settings)),
        Arc::new(DetachedProcessRunner),
        IdentityStore::new(&state.data_dir),
        state.install_dir.clone(),
    );

    let mut handle = orchestrator.start(LaunchRequest {
        version_id: version,
        username,
        loader,
        identity_mode: if licensed {
            IdentityMode::Licensed
        } else {
            IdentityMode::Offline
        },
    })?;

    let mut interrupts = interrupts()?;
    let bar = TerminalBar::new();
    let mut interrupted = false;
    let outcome = loop {
        tokio::select! {
            event = handle.events.recv() => match event {
                Some(RunEvent::Phase(phase)) => bar.bar.set_prefix(phase.to_string()),
                Some(RunEvent::Progress(progress)) => bar.draw(&progress),
                Some(RunEvent::Finished(outcome)) => break outcome,
                None => break RunOutcome::Cancelled,
            },
            Some(()) = interrupts.recv() => {
                if interrupted {
                    bar.bar.set_message("Stopping");
                    handle.terminate(TERMINATE_GRACE).await;
                } else {
                    interrupted = true;
                    bar.bar.set_message("Cancelling, press Ctrl-C again to stop now");
                    handle.cancel();
                }
            }
        }
    };
    bar.bar.finish_and_clear();

    match outcome {
        RunOutcome::Done => {
            println!("Game started.");
            Ok(())
        }
        RunOutcome::Cancelled => {
            println!("Cancelled.");
            Ok(())
        }
        RunOutcome::Failed { kind, message } => {
            Err(LauncherError::Other(format!("{} ({})", message, kind)))
        }
    }
}

/// Ctrl-C as a stream, registered once so presses between polls are kept.
#[cfg(unix)]
fn interrupts() -> std::io::Result<tokio::signal::unix::Signal> {
    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
}

#[cfg(windows)]
fn interrupts() -> std::io::Result<tokio::signal::windows::CtrlC> {
    tokio::signal::windows::ctrl_c()
}

const BAR_TEMPLATE: &str = "{prefix:>18.cyan} [{bar:30}] {pos}/{len} {wide_msg}";
const SPINNER_TEMPLATE: &str = "{prefix:>18.cyan} {spinner} {wide_msg}";

/// Progress bar that shows a spinner while the total is unknown.
#[derive(Clone)]
struct TerminalBar {
    bar: ProgressBar,
    spinning: Arc<AtomicBool>,
}

impl TerminalBar {
    fn new() -> Self {
        let bar = Self::with_bar(ProgressBar::new(0));
        bar.bar.enable_steady_tick(Duration::from_millis(120));
        bar
    }

    fn with_bar(bar: ProgressBar) -> Self {
        apply_style(&bar, SPINNER_TEMPLATE);
        Self {
            bar,
            spinning: Arc::new(AtomicBool::new(true)),
        }
    }

    fn set_total(&self, max: u64) {
        let spin = max == 0;
        if self.spinning.swap(spin, Ordering::SeqCst) != spin {
            apply_style(&self.bar, if spin { SPINNER_TEMPLATE } else { BAR_TEMPLATE });
        }
        self.bar.set_length(max);
    }

    fn draw(&self, progress: &ProgressState) {
        self.bar.set_message(progress.label.clone());
        self.set_total(progress.max);
        self.bar.set_position(progress.value.min(progress.max));
    }
}

fn apply_style(bar: &ProgressBar, template: &str) {
    match ProgressStyle::with_template(template) {
        Ok(style) => bar.set_style(style.progress_chars("=> ")),
        Err(e) => warn!("Invalid progress template: {}", e),
    }
}

/// Feeds installer progress straight into a terminal bar.
struct BarProgress(TerminalBar);

impl ProgressSink for BarProgress {
    fn set_label(&self, label: &str) {
        self.0.bar.set_message(label.to_string());
    }

    fn set_value(&self, value: u64) {
        self.0.bar.set_position(value);
    }

    fn set_max(&self, max: u64) {
        self.0.set_total(max);
    }
}

// ─── Accounts ───

async fn login(state: &AppState) -> LauncherResult<()> {
    let session = AuthSession::new(
        Arc::new(ConsoleLoginSurface::stdin()),
        XboxExchange::new(state.http_client.clone(), state.endpoints.clone()),
        IdentityStore::new(&state.data_dir),
    );
    match session.login().await {
        Ok(Some(record)) => {
            println!("Signed in as {}.", record.display_name);
            Ok(())
        }
        Ok(None) => {
            println!("This account does not own Minecraft: Java Edition. Nothing was saved.");
            Ok(())
        }
        Err(LauncherError::UserCancelled) => {
            println!("Login cancelled.");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

// ─── Versions ───

async fn list_versions(state: &AppState, all: bool) -> LauncherResult<()> {
    let manifest = VersionManifest::fetch(&state.http_client, &state.endpoints.version_manifest).await?;
    let filter = if all {
        VersionFilter::default()
    } else {
        state.launcher_settings.versions.clone()
    };
    for entry in manifest.filtered(&filter) {
        println!("{:<24} {}", entry.id, entry.version_type);
    }
    Ok(())
}

// ─── Bootstrap ───

async fn bootstrap(
    state: &AppState,
    owner: Option<String>,
    repo: Option<String>,
    exe: Option<String>,
    dir: Option<PathBuf>,
) -> LauncherResult<()> {
    let dir = match dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let mut config = BootstrapConfig::new(dir);
    if let Some(owner) = owner {
        config.owner = owner;
    }
    if let Some(repo) = repo {
        config.repo = repo;
    }
    if let Some(exe) = exe {
        config.exe_name = exe;
    }

    let bootstrapper = Bootstrapper::new(
        config,
        ReleaseFetcher::new(state.http_client.clone(), state.endpoints.github_api.clone()),
        Arc::new(DetachedProcessRunner),
    );
    let bar = TerminalBar::new();
    bar.bar.set_prefix("bootstrap");
    let result = bootstrapper.run(&BarProgress(bar.clone())).await;
    bar.bar.finish_and_clear();

    let outcome = result?;
    if outcome.downloaded {
        println!("Installed and started {:?} (pid {}).", outcome.exe_path, outcome.pid);
    } else {
        println!("Started {:?} (pid {}).", outcome.exe_path, outcome.pid);
    }
    Ok(())
}
