use std::path::PathBuf;

/// Classified provisioning failures.
///
/// These travel as the root cause inside an `anyhow::Error`; callers classify
/// with `err.chain().find_map(|cause| cause.downcast_ref::<ProvisionError>())`.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("transport failure fetching {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("sha256 mismatch for {path} (expected {expected}, got {actual})")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("ed25519 signature rejected for {path}")]
    SignatureInvalid { path: PathBuf },

    #[error("unexpected archive layout: {detail}: {path}")]
    ArchiveLayout { path: PathBuf, detail: String },

    #[error("{context}: status={status} stdout='{stdout}' stderr='{stderr}'")]
    CommandFailed {
        context: String,
        status: String,
        stdout: String,
        stderr: String,
    },

    #[error("{context}: command failed to start: {program}")]
    CommandSpawn {
        context: String,
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("inconsistent state: expected {what} at {path}")]
    InconsistentState { what: String, path: PathBuf },

    #[error(
        "workspace {path} was provisioned with {installed}; refusing to install {requested} over it (clear the workspace first)"
    )]
    StaleWorkspace {
        path: PathBuf,
        installed: String,
        requested: String,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ProvisionError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::ChecksumMismatch { .. } | Self::SignatureInvalid { .. } => "integrity",
            Self::ArchiveLayout { .. } => "archive",
            Self::CommandFailed { .. } | Self::CommandSpawn { .. } => "external-process",
            Self::InconsistentState { .. } | Self::StaleWorkspace { .. } => "inconsistent-state",
            Self::InvalidConfig(_) => "config",
        }
    }

    /// Finds the first classified failure in an error chain.
    pub fn find_in(err: &anyhow::Error) -> Option<&ProvisionError> {
        err.chain()
            .find_map(|cause| cause.downcast_ref::<ProvisionError>())
    }
}
