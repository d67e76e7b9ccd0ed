// ─── Process Runner ───
// Starts external programs detached from the launcher.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;

use tracing::{debug, info};

use crate::core::error::{LauncherError, LauncherResult};

/// Fully resolved program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub hide_console: bool,
}

impl LaunchCommand {
    /// Copy/paste-able rendering for logs.
    pub fn display(&self) -> String {
        let program = shell_escape(&self.program.to_string_lossy());
        let args = self
            .args
            .iter()
            .map(|arg| shell_escape(arg))
            .collect::<Vec<_>>()
            .join(" ");

        if args.is_empty() {
            program
        } else {
            format!("{} {}", program, args)
        }
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait ProcessRunner: Send + Sync {
    /// Spawn the command and return its pid without waiting for it.
    fn start(&self, command: &LaunchCommand) -> LauncherResult<u32>;
}

/// Spawns children with no inherited stdio in their own process group.
pub struct DetachedProcessRunner;

impl ProcessRunner for DetachedProcessRunner {
    fn start(&self, command: &LaunchCommand) -> LauncherResult<u32> {
        let launch_error = |message: String| LauncherError::Launch {
            program: command.program.clone(),
            message,
        };

        if is_explicit_path(&command.program) && !command.program.is_file() {
            return Err(launch_error("executable not found".into()));
        }
        if !command.working_dir.is_dir() {
            return Err(launch_error(format!(
                "working directory {:?} does not exist",
                command.working_dir
            )));
        }

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .current_dir(&command.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        configure_platform_spawn(&mut cmd, command.hide_console);

        debug!("Command (copy/paste): {}", command.display());

        let mut child = cmd.spawn().map_err(|e| launch_error(e.to_string()))?;
        let pid = child.id();
        info!("Started {:?} (pid {})", command.program, pid);

        // reap the child when it exits so it never lingers as a zombie
        std::thread::spawn(move || {
            let _ = child.wait();
        });

        Ok(pid)
    }
}

fn is_explicit_path(program: &Path) -> bool {
    program.is_absolute() || program.components().count() > 1
}

fn configure_platform_spawn(cmd: &mut Command, hide_console: bool) {
    #[cfg(target_os = "windows")]
    {
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        let mut flags = CREATE_NEW_PROCESS_GROUP;
        if hide_console {
            flags |= CREATE_NO_WINDOW;
        }
        cmd.creation_flags(flags);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        let _ = hide_console;
        cmd.process_group(0);
    }
}

fn shell_escape(raw: &str) -> String {
    if raw.is_empty() {
        return "\"\"".to_string();
    }

    if raw.chars().all(|ch| {
        ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '\\' | '=')
    }) {
        return raw.to_string();
    }

    format!("\"{}\"", raw.replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    #[test]
    fn display_quotes_only_when_needed() {
        let command = LaunchCommand {
            program: PathBuf::from("/usr/bin/java"),
            args: vec![
                "-Xmx2G".into(),
                "--username".into(),
                "Some Name".into(),
                String::new(),
            ],
            working_dir: PathBuf::from("/tmp"),
            hide_console: true,
        };
        assert_eq!(
            command.display(),
            "/usr/bin/java -Xmx2G --username \"Some Name\" \"\""
        );
    }

    #[test]
    fn missing_executable_is_a_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let command = LaunchCommand {
            program: dir.path().join("nope.exe"),
            args: vec![],
            working_dir: dir.path().to_path_buf(),
            hide_console: false,
        };

        let err = DetachedProcessRunner.start(&command).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Launch);
    }

    #[test]
    fn missing_working_dir_is_a_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let command = LaunchCommand {
            program: PathBuf::from("java"),
            args: vec![],
            working_dir: dir.path().join("gone"),
            hide_console: false,
        };

        let err = DetachedProcessRunner.start(&command).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Launch);
    }

    #[cfg(unix)]
    #[test]
    fn starts_without_waiting_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let command = LaunchCommand {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".into(), "pwd > where.txt".into()],
            working_dir: dir.path().to_path_buf(),
            hide_console: true,
        };

        let pid = DetachedProcessRunner.start(&command).unwrap();
        assert!(pid > 0);

        let marker = dir.path().join("where.txt");
        for _ in 0..100 {
            if std::fs::read_to_string(&marker).map(|s| !s.is_empty()).unwrap_or(false) {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        let written = std::fs::read_to_string(&marker).unwrap();
        let expected = std::fs::canonicalize(dir.path()).unwrap();
        assert_eq!(
            std::fs::canonicalize(written.trim()).unwrap(),
            expected
        );
    }
}
