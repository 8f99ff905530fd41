use std::collections::TryReserveError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error types for the vamp library.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The selected mode has no matching config section.
    #[error("missing config section [{section}]")]
    ConfigMissing {
        /// Section (mode) name that was looked up
        section: String,
    },

    /// A required key is absent or empty in the selected section.
    #[error("missing '{key}' in config section [{section}]")]
    MissingKey {
        /// Section the key was looked up in
        section: String,
        /// Key that was required
        key: String,
    },

    /// Run configuration validation error.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Detailed error message
        message: String,
    },

    /// IO error with context about the file path.
    #[error("IO error accessing '{path}': {message}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// A buffer could not be grown to the size it needed.
    #[error("out of memory: {context}")]
    Allocation {
        /// What was being allocated
        context: String,
    },

    /// An external program could not be started.
    #[error("failed to run '{program}': {message}")]
    Spawn {
        /// Program that was spawned
        program: String,
        /// Error message
        message: String,
    },

    /// An external program ran but did not exit successfully.
    #[error("'{program}' failed with {status}")]
    CommandFailed {
        /// Program that was run
        program: String,
        /// Rendered exit status
        status: String,
    },
}

impl Error {
    /// Creates an IO error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Creates a run configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a missing section error.
    #[must_use]
    pub fn config_missing(section: impl Into<String>) -> Self {
        Self::ConfigMissing {
            section: section.into(),
        }
    }

    /// Creates a missing key error.
    #[must_use]
    pub fn missing_key(section: impl Into<String>, key: impl Into<String>) -> Self {
        Self::MissingKey {
            section: section.into(),
            key: key.into(),
        }
    }

    /// Creates an allocation failure error.
    #[must_use]
    pub fn allocation(context: impl Into<String>) -> Self {
        Self::Allocation {
            context: context.into(),
        }
    }

    /// Creates a spawn failure error.
    #[must_use]
    pub fn spawn(program: impl Into<String>, source: &std::io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            message: source.to_string(),
        }
    }

    /// Creates a command failure from the exit code (`None` when killed by a signal).
    #[must_use]
    pub fn command_failed(program: impl Into<String>, code: Option<i32>) -> Self {
        let status = match code {
            Some(code) => format!("exit code {code}"),
            None => "signal".to_string(),
        };
        Self::CommandFailed {
            program: program.into(),
            status,
        }
    }

    /// Returns true if this is an IO error.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// Returns true if this is a configuration error of any kind.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::ConfigMissing { .. } | Self::MissingKey { .. }
        )
    }

    /// Returns true if an external command could not be run or failed.
    #[must_use]
    pub const fn is_command(&self) -> bool {
        matches!(self, Self::Spawn { .. } | Self::CommandFailed { .. })
    }
}

impl From<TryReserveError> for Error {
    fn from(e: TryReserveError) -> Self {
        Self::Allocation {
            context: e.to_string(),
        }
    }
}
