use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command '{0}' failed with exit code {1}")]
    CommandFailed(String, i32),

    #[error("Command '{0}' not found; is it installed?")]
    CommandNotFound(String),

    #[error("Setup cancelled by user")]
    Cancelled,

    #[error("Do not run archsetup as root; it calls sudo when it needs to")]
    RunningAsRoot,

    #[error(
        "Missing required packages: {}. Install them manually with: sudo pacman -S {}",
        .0.join(", "),
        .0.join(" ")
    )]
    MissingDependencies(Vec<String>),

    #[error("No internet connection (could not reach {0})")]
    Offline(String),

    #[error("Prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error("Invalid config file {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{}: {} not found", .path.display(), .what)]
    PatternNotFound { path: PathBuf, what: String },

    #[error("Secure Boot is not in Setup Mode; clear the platform keys in the firmware first")]
    SecureBootNotInSetupMode,

    #[error("Another archsetup run holds {}", .0.display())]
    Locked(PathBuf),

    #[error("Could not initialise logging: {0}")]
    Logging(String),
}
