mod commands;
mod core;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::commands::Cli;
use crate::core::state::AppState;

pub fn run() {
    // Logs go to stderr so they don't tear the progress bar on stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,unixlauncher_lib=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: could not start the async runtime: {}", e);
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(async {
        let state = AppState::new()?;
        tracing::debug!(
            "Data dir {:?}, install dir {:?}",
            state.data_dir,
            state.install_dir
        );
        commands::execute(cli, state).await
    });

    if let Err(e) = result {
        tracing::error!("{}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
