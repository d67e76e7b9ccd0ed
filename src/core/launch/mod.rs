pub mod command;
pub mod orchestrator;

pub use command::{CommandBuilder, JavaCommandBuilder};
pub use orchestrator::{
    LaunchOrchestrator, LaunchRequest, RunEvent, RunHandle, RunOutcome, RunPhase,
};
