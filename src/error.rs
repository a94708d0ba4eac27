//! Error taxonomy and process exit codes

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used across the library
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of failures, used for exit codes and log fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unexpected I/O or other internal failure
    Internal,
    /// The service's configuration checker rejected the file
    ValidationFailed,
    /// The service manager failed to reload
    ReloadFailed,
    /// A required input file is missing or unusable
    MissingInput,
    /// The live file does not have the shape the legacy editor expects
    StructuralMismatch,
    /// Another instance holds the lock file
    LockHeld,
}

impl ErrorKind {
    /// Process exit status for this kind of failure
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::Internal => 1,
            ErrorKind::ValidationFailed => 2,
            ErrorKind::ReloadFailed => 3,
            ErrorKind::MissingInput => 4,
            ErrorKind::StructuralMismatch => 5,
            ErrorKind::LockHeld => 6,
        }
    }

    /// Stable identifier for structured logs
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Internal => "INTERNAL_ERROR",
            ErrorKind::ValidationFailed => "VALIDATION_FAILED",
            ErrorKind::ReloadFailed => "RELOAD_FAILED",
            ErrorKind::MissingInput => "MISSING_INPUT",
            ErrorKind::StructuralMismatch => "STRUCTURAL_MISMATCH",
            ErrorKind::LockHeld => "LOCK_HELD",
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("template {path} is missing or unreadable: {source}")]
    TemplateUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template {path} does not contain placeholder {placeholder}")]
    MissingPlaceholder {
        path: PathBuf,
        placeholder: &'static str,
    },

    #[error("site configuration not found: {}", .0.display())]
    SiteConfigMissing(PathBuf),

    #[error("could not find {expected} in site configuration")]
    StructuralMismatch { expected: String },

    #[error("configuration check failed:\n{diagnostics}")]
    ValidationFailed { diagnostics: String },

    #[error("service reload failed:\n{diagnostics}")]
    ReloadFailed { diagnostics: String },

    #[error("failed to run `{command}`: {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("another instance holds the lock file {}", .0.display())]
    LockHeld(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TemplateUnavailable { .. }
            | Error::MissingPlaceholder { .. }
            | Error::SiteConfigMissing(_) => ErrorKind::MissingInput,
            Error::StructuralMismatch { .. } => ErrorKind::StructuralMismatch,
            Error::ValidationFailed { .. } => ErrorKind::ValidationFailed,
            Error::ReloadFailed { .. } => ErrorKind::ReloadFailed,
            Error::LockHeld(_) => ErrorKind::LockHeld,
            Error::CommandSpawn { .. } | Error::Config(_) | Error::Io(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn mismatch(expected: impl Into<String>) -> Self {
        Error::StructuralMismatch {
            expected: expected.into(),
        }
    }
}

/// Exit code for an error surfaced at the binary boundary
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<Error>())
        .map(|e| e.kind().exit_code())
        .unwrap_or(1)
}
