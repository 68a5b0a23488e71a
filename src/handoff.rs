use std::io;
use std::process::Command;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("no command to launch")]
    EmptyCommand,
    #[error("{program}: command not found")]
    NotFound { program: String },
    #[error("{program}: permission denied")]
    PermissionDenied { program: String },
    #[error("{program}: cannot execute: {source}")]
    Exec {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl LaunchError {
    pub fn from_io(program: &str, err: io::Error) -> Self {
        let program = program.to_string();
        match err.kind() {
            io::ErrorKind::NotFound => LaunchError::NotFound { program },
            io::ErrorKind::PermissionDenied => LaunchError::PermissionDenied { program },
            _ => LaunchError::Exec {
                program,
                source: err,
            },
        }
    }

    /// Shell conventions: 127 when there is nothing to run, 126 when it cannot run.
    pub fn exit_code(&self) -> u8 {
        match self {
            LaunchError::EmptyCommand | LaunchError::NotFound { .. } => 127,
            LaunchError::PermissionDenied { .. } | LaunchError::Exec { .. } => 126,
        }
    }
}

/// Transfers control to `argv`. On Unix the current process image is
/// replaced, so this only returns on failure. Elsewhere the command runs as
/// a child and its exit code is returned for the caller to forward.
pub fn hand_off(argv: &[String]) -> Result<u8, LaunchError> {
    let (program, args) = argv.split_first().ok_or(LaunchError::EmptyCommand)?;
    let mut command = Command::new(program);
    command.args(args);
    replace_process(program, command)
}

#[cfg(unix)]
fn replace_process(program: &str, mut command: Command) -> Result<u8, LaunchError> {
    use std::os::unix::process::CommandExt;

    let err = command.exec();
    Err(LaunchError::from_io(program, err))
}

#[cfg(not(unix))]
fn replace_process(program: &str, mut command: Command) -> Result<u8, LaunchError> {
    let status = command
        .status()
        .map_err(|e| LaunchError::from_io(program, e))?;
    Ok(forwarded_exit_code(status.code()))
}

/// Codes outside 0..=255 (Windows NTSTATUS values, for one) become 1 rather
/// than being truncated, so a failing child can never be reported as success.
#[cfg(any(not(unix), test))]
fn forwarded_exit_code(code: Option<i32>) -> u8 {
    code.and_then(|code| u8::try_from(code).ok()).unwrap_or(1)
}
