use std::path::PathBuf;

/// Malfunctions of the sandbox itself, as opposed to failures of the executed code.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("failed to create execution directory: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("failed to launch {}: {source}", interpreter.display())]
    Spawn {
        interpreter: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("child {0} pipe was not captured")]
    MissingPipe(&'static str),

    #[error("failed waiting for child: {0}")]
    Wait(#[source] std::io::Error),

    #[error("failed reading child output: {0}")]
    Capture(#[source] std::io::Error),

    #[error("executor is shut down")]
    Closed,
}
